use std::fmt::Display;

/// A constant pool entry.
///
/// `Str` holds program string literals and operator names; `Name` holds
/// identifiers referenced by variable and property opcodes; `Params` and
/// `Body` carry the pieces `CREATE_FUNCTION` reifies a callable from;
/// `Offset` holds a signed jump displacement. `Reserved` only exists while a
/// forward jump is waiting to be patched and never survives `finish`.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
  Reserved,
  Num(f64),
  Bool(bool),
  Str(String),
  Name(String),
  Offset(i32),
  Params(Vec<String>),
  Body(String),
}

impl Constant {
  pub fn as_offset(&self) -> Option<i32> {
    if let Constant::Offset(v) = self {
      Some(*v)
    } else {
      None
    }
  }

  /// Textual payload, for the entries that have one.
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Constant::Str(v) | Constant::Name(v) | Constant::Body(v) => Some(v),
      _ => None,
    }
  }
}

impl Display for Constant {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Constant::Reserved => write!(f, "<reserved>"),
      Constant::Num(v) => write!(f, "{v}"),
      Constant::Bool(v) => write!(f, "{v}"),
      Constant::Str(v) => write!(f, "{v:?}"),
      Constant::Name(v) => write!(f, "{v}"),
      Constant::Offset(v) => write!(f, "{v:+}"),
      Constant::Params(v) => write!(f, "({})", v.join(", ")),
      Constant::Body(_) => write!(f, "<body>"),
    }
  }
}

/// Structural key used for deduplication at insertion time. Floats key on
/// their bit pattern; offsets are reserve/commit slots and never deduplicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PoolKey {
  Num(u64),
  Bool(bool),
  Str(String),
  Name(String),
  Params(Vec<String>),
  Body(String),
}

impl Constant {
  pub(crate) fn key(&self) -> Option<PoolKey> {
    match self {
      Constant::Num(v) => Some(PoolKey::Num(v.to_bits())),
      Constant::Bool(v) => Some(PoolKey::Bool(*v)),
      Constant::Str(v) => Some(PoolKey::Str(v.clone())),
      Constant::Name(v) => Some(PoolKey::Name(v.clone())),
      Constant::Params(v) => Some(PoolKey::Params(v.clone())),
      Constant::Body(v) => Some(PoolKey::Body(v.clone())),
      Constant::Reserved | Constant::Offset(_) => None,
    }
  }
}
