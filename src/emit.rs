//! AST → bytecode lowering.

mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::error::Error as StdError;
use std::fmt::Display;

use crate::bytecode::builder::PoolOverflow;
use crate::bytecode::{disasm, BytecodeBuilder, Constant, Label, Opcode, Program};
use crate::span::Span;
use crate::syntax::ast;

/// What to do when the lowerer meets a construct it cannot lower.
///
/// `Strict` aborts emission; `Lossy` logs a diagnostic and substitutes an
/// `UNDEFINED` placeholder so the rest of the program still lowers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
  #[default]
  Strict,
  Lossy,
}

#[derive(Debug)]
pub enum EmitError {
  UnsupportedNode { kind: String, span: Span },
  MisplacedControl { keyword: &'static str, span: Span },
  TooManyArguments { count: usize, span: Span },
  PoolOverflow,
  /// Reserved: displacements live in the pool, so no distance limit applies
  /// under the current encoding.
  #[allow(dead_code)]
  JumpTooFar,
}

impl From<PoolOverflow> for EmitError {
  fn from(_: PoolOverflow) -> Self {
    EmitError::PoolOverflow
  }
}

impl Display for EmitError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EmitError::UnsupportedNode { kind, span } => {
        write!(f, "cannot lower {kind} at {span}")
      }
      EmitError::MisplacedControl { keyword, span } => {
        write!(f, "`{keyword}` outside of a loop at {span}")
      }
      EmitError::TooManyArguments { count, span } => {
        write!(f, "{count} arguments exceed the encodable maximum at {span}")
      }
      EmitError::PoolOverflow => write!(f, "constant pool exceeds the operand encoding width"),
      EmitError::JumpTooFar => write!(f, "jump displacement out of range"),
    }
  }
}

impl StdError for EmitError {}

/// Lower a module to bytecode and its constant pool.
pub fn emit(module: &ast::Module<'_>, mode: Mode) -> Result<Program, EmitError> {
  let mut state = State {
    builder: BytecodeBuilder::new(),
    mode,
    breakables: Vec::new(),
    try_depth: 0,
  };
  for stmt in &module.body {
    state.emit_stmt(stmt)?;
  }
  state.terminate();
  let (bytecode, pool) = state.builder.finish();
  Ok(Program { bytecode, pool })
}

/// An enclosing construct `break`/`continue` may target. `try_depth`
/// records how many try regions enclosed the construct when it was
/// entered; jumping out of deeper regions must first close their frames.
struct Breakable {
  brk: Label,
  cont: Option<ContinueTarget>,
  try_depth: usize,
}

enum ContinueTarget {
  /// Loop header already emitted; continue jumps backward to it.
  Backward(usize),
  /// Update clause not yet emitted; continue jumps forward.
  Forward(Label),
}

struct State {
  builder: BytecodeBuilder,
  mode: Mode,
  breakables: Vec<Breakable>,
  try_depth: usize,
}

impl State {
  fn constant(&mut self, constant: Constant) -> Result<u8, EmitError> {
    Ok(self.builder.constant_pool_builder().insert(constant)?)
  }

  /// Guarantee the stream ends in RETURN.
  fn terminate(&mut self) {
    let last = disasm::instructions(self.builder.as_bytes())
      .filter_map(|i| i.ok())
      .last();
    if !matches!(last.map(|i| i.opcode), Some(Opcode::Return)) {
      self.builder.emit(Opcode::Undefined);
      self.builder.emit(Opcode::Return);
    }
  }
}
