use std::fmt::Write;

use crate::bytecode::{Chunk, Op};

/// Human-readable dump of a chunk, used by `--dump` and the REPL's
/// `.bytecode-dump` toggle.
pub fn disassemble_chunk(name: &str, chunk: &Chunk) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "======= {} =======", name);

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(&mut out, chunk, offset);
    }

    let _ = writeln!(out, "======= end {} =======", name);
    out
}

pub fn disassemble_instruction(out: &mut String, chunk: &Chunk, offset: usize) -> usize {
    let _ = write!(out, "{} |\t", offset);

    let Some(op) = Op::from_byte(chunk.code[offset]) else {
        let _ = writeln!(out, "Unknown opcode '{}'.", chunk.code[offset]);
        return offset + 1;
    };

    match op {
        Op::PushConstant | Op::DefineGlobal | Op::GetGlobal | Op::SetGlobal => {
            constant_instruction(out, op, chunk, offset)
        }
        Op::GetLocal | Op::SetLocal | Op::Call => byte_instruction(out, op, chunk, offset),
        Op::JumpIfFalse | Op::Jump => jump_instruction(out, op, chunk, 1, offset),
        Op::Loop => jump_instruction(out, op, chunk, -1, offset),
        _ => simple_instruction(out, op, offset),
    }
}

fn simple_instruction(out: &mut String, op: Op, offset: usize) -> usize {
    let _ = writeln!(out, "Op::{:?}", op);
    offset + 1
}

fn byte_instruction(out: &mut String, op: Op, chunk: &Chunk, offset: usize) -> usize {
    let operand = chunk.code[offset + 1];
    let _ = writeln!(out, "Op::{:?}\t{}", op, operand);
    offset + 2
}

fn jump_instruction(out: &mut String, op: Op, chunk: &Chunk, sign: i64, offset: usize) -> usize {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]) as i64;
    let target = (offset as i64 + 3) + sign * jump;
    let _ = writeln!(out, "Op::{:?}\t{} -> {}", op, offset, target);
    offset + 3
}

fn constant_instruction(out: &mut String, op: Op, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.code[offset + 1];
    let _ = writeln!(
        out,
        "Op::{:?}\tIndex: {} ({})",
        op,
        index,
        chunk.get_constant(index)
    );
    offset + 2
}
