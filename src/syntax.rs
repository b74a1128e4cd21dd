//! Frontend for the input language: a C-family scripting dialect with
//! `var`/`function` declarations, curly-brace blocks and semicolon-terminated
//! statements. The parser produces the AST consumed by the lowerer.

pub mod ast;
pub mod lexer;
pub mod parser;

use std::error::Error as StdError;
use std::fmt::Display;

use crate::span::Span;

pub use parser::parse;

#[derive(Clone, Debug)]
pub struct SyntaxError {
  pub message: String,
  pub span: Span,
}

impl SyntaxError {
  pub fn new(message: impl Into<String>, span: impl Into<Span>) -> Self {
    SyntaxError {
      message: message.into(),
      span: span.into(),
    }
  }
}

impl Display for SyntaxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "syntax error at {}: {}", self.span, self.message)
  }
}

impl StdError for SyntaxError {}
