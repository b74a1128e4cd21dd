use std::fmt::Write;

use super::constant::Constant;
use super::opcode::Opcode;

/// A decoded instruction: its offset, opcode, and operand bytes.
#[derive(Clone, Copy, Debug)]
pub struct Instruction<'a> {
  pub pc: usize,
  pub opcode: Opcode,
  pub operands: &'a [u8],
}

/// Iterator over the instruction stream. Yields `Err` with the offending
/// byte's offset when the stream is malformed.
pub struct Instructions<'a> {
  bytecode: &'a [u8],
  pc: usize,
}

pub fn instructions(bytecode: &[u8]) -> Instructions<'_> {
  Instructions { bytecode, pc: 0 }
}

impl<'a> Iterator for Instructions<'a> {
  type Item = Result<Instruction<'a>, usize>;

  fn next(&mut self) -> Option<Self::Item> {
    let pc = self.pc;
    let byte = *self.bytecode.get(pc)?;
    let Ok(opcode) = Opcode::try_from(byte) else {
      self.pc = self.bytecode.len();
      return Some(Err(pc));
    };
    let end = pc + 1 + opcode.operand_count();
    if end > self.bytecode.len() {
      self.pc = self.bytecode.len();
      return Some(Err(pc));
    }
    self.pc = end;
    Some(Ok(Instruction {
      pc,
      opcode,
      operands: &self.bytecode[pc + 1..end],
    }))
  }
}

/// Render the instruction stream with resolved constants, one instruction
/// per line.
pub fn disassemble(bytecode: &[u8], pool: &[Constant]) -> String {
  let mut out = String::new();
  for instruction in instructions(bytecode) {
    match instruction {
      Ok(instruction) => {
        let _ = write!(out, "{:4}  {}", instruction.pc, instruction.opcode.name());
        for &operand in instruction.operands {
          if instruction.opcode.has_raw_operand() {
            let _ = write!(out, " {operand}");
          } else {
            match pool.get(operand as usize) {
              Some(constant) => {
                let _ = write!(out, " [{operand}]={constant}");
              }
              None => {
                let _ = write!(out, " [{operand}]=<out of range>");
              }
            }
          }
        }
        out.push('\n');
      }
      Err(pc) => {
        let _ = writeln!(out, "{pc:4}  <malformed>");
      }
    }
  }
  out
}
