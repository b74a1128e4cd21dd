use std::error::Error as StdError;
use std::fmt::Display;

use crate::emit::EmitError;
use crate::syntax::SyntaxError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Top-level compile error.
///
/// Any of these aborts emission; the batch entry point maps them to a
/// non-zero exit status.
#[derive(Debug)]
pub enum Error {
  Parse(Vec<SyntaxError>),
  Emit(EmitError),
  Io(std::io::Error),
}

impl From<Vec<SyntaxError>> for Error {
  fn from(value: Vec<SyntaxError>) -> Self {
    Error::Parse(value)
  }
}

impl From<EmitError> for Error {
  fn from(value: EmitError) -> Self {
    Error::Emit(value)
  }
}

impl From<std::io::Error> for Error {
  fn from(value: std::io::Error) -> Self {
    Error::Io(value)
  }
}

impl Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::Parse(errors) => {
        for (i, e) in errors.iter().enumerate() {
          if i > 0 {
            writeln!(f)?;
          }
          write!(f, "{e}")?;
        }
        Ok(())
      }
      Error::Emit(e) => write!(f, "{e}"),
      Error::Io(e) => write!(f, "{e}"),
    }
  }
}

impl StdError for Error {}
