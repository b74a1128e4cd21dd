use std::cell::RefCell;
use std::fmt::{Debug, Display};
use std::rc::Rc;

use indexmap::IndexMap;

use super::VmError;
use crate::bytecode::Program;

/// A runtime value. Lists, objects and functions are reference types;
/// everything else copies.
#[derive(Clone)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Num(f64),
  Str(Rc<str>),
  List(Rc<RefCell<Vec<Value>>>),
  Object(Rc<RefCell<IndexMap<String, Value>>>),
  Func(Rc<Function>),
  Native(Native),
}

/// A callable reified by `CREATE_FUNCTION`. The body is source text,
/// compiled through the crate's own frontend on first call; the defining
/// scope is captured so lookups walk the chain.
pub struct Function {
  pub name: String,
  pub params: Vec<String>,
  pub body: String,
  pub scope: Scope,
  pub compiled: RefCell<Option<Rc<Program>>>,
}

/// A host-provided function.
#[derive(Clone)]
pub struct Native {
  pub name: &'static str,
  pub f: Rc<dyn Fn(&[Value]) -> Result<Value, VmError>>,
}

impl Value {
  pub fn str(value: impl Into<String>) -> Value {
    Value::Str(Rc::from(value.into().into_boxed_str()))
  }

  pub fn list(items: Vec<Value>) -> Value {
    Value::List(Rc::new(RefCell::new(items)))
  }

  pub fn object() -> Value {
    Value::Object(Rc::new(RefCell::new(IndexMap::new())))
  }

  pub fn native(
    name: &'static str,
    f: impl Fn(&[Value]) -> Result<Value, VmError> + 'static,
  ) -> Value {
    Value::Native(Native {
      name,
      f: Rc::new(f),
    })
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Value::Undefined)
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(v) => *v,
      Value::Num(v) => *v != 0.0 && !v.is_nan(),
      Value::Str(v) => !v.is_empty(),
      Value::List(_) | Value::Object(_) | Value::Func(_) | Value::Native(_) => true,
    }
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null | Value::List(_) | Value::Object(_) => "object",
      Value::Bool(_) => "boolean",
      Value::Num(_) => "number",
      Value::Str(_) => "string",
      Value::Func(_) | Value::Native(_) => "function",
    }
  }

  pub fn to_number(&self) -> f64 {
    match self {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(true) => 1.0,
      Value::Bool(false) => 0.0,
      Value::Num(v) => *v,
      Value::Str(v) => {
        let trimmed = v.trim();
        if trimmed.is_empty() {
          0.0
        } else {
          trimmed.parse().unwrap_or(f64::NAN)
        }
      }
      Value::List(_) | Value::Object(_) | Value::Func(_) | Value::Native(_) => f64::NAN,
    }
  }

  /// 32-bit truncation for the bitwise operators.
  pub fn to_int32(&self) -> i32 {
    let n = self.to_number();
    if !n.is_finite() {
      return 0;
    }
    n as i64 as i32
  }

  pub fn to_display(&self) -> String {
    match self {
      Value::Undefined => "undefined".into(),
      Value::Null => "null".into(),
      Value::Bool(v) => v.to_string(),
      Value::Num(v) => num_to_display(*v),
      Value::Str(v) => v.to_string(),
      Value::List(items) => {
        let items = items.borrow();
        items
          .iter()
          .map(|v| v.to_display())
          .collect::<Vec<_>>()
          .join(",")
      }
      Value::Object(_) => "[object Object]".into(),
      Value::Func(f) => format!("function {}", f.name),
      Value::Native(f) => format!("function {}", f.name),
    }
  }

  pub fn strict_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Num(a), Value::Num(b)) => a == b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
      (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
      (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
      (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.f, &b.f),
      _ => false,
    }
  }

  pub fn loose_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
      (Value::Num(a), Value::Num(b)) => a == b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::Bool(_), _) => Value::Num(self.to_number()).loose_eq(other),
      (_, Value::Bool(_)) => self.loose_eq(&Value::Num(other.to_number())),
      (Value::Num(a), Value::Str(_)) => *a == other.to_number(),
      (Value::Str(_), Value::Num(b)) => self.to_number() == *b,
      _ => self.strict_eq(other),
    }
  }
}

/// JavaScript-flavored number rendering: integral values print without a
/// fractional part.
pub fn num_to_display(n: f64) -> String {
  if n.is_nan() {
    "NaN".into()
  } else if n.is_infinite() {
    if n > 0.0 {
      "Infinity".into()
    } else {
      "-Infinity".into()
    }
  } else if n == n.trunc() && n.abs() < 1e21 {
    format!("{}", n as i64)
  } else {
    format!("{n}")
  }
}

/// Structural equality, used by tests: primitives by value, containers
/// element-wise, callables by identity.
impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
      (Value::Object(a), Value::Object(b)) => *a.borrow() == *b.borrow(),
      _ => self.strict_eq(other),
    }
  }
}

impl Debug for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Value::Str(v) => write!(f, "{v:?}"),
      Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
      Value::Object(entries) => f
        .debug_map()
        .entries(entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
        .finish(),
      other => write!(f, "{}", other.to_display()),
    }
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.to_display())
  }
}

/// A name→value mapping with an optional parent; lookups walk the chain.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeData>>);

struct ScopeData {
  vars: IndexMap<String, Value>,
  parent: Option<Scope>,
}

impl Scope {
  pub fn new() -> Self {
    Scope(Rc::new(RefCell::new(ScopeData {
      vars: IndexMap::new(),
      parent: None,
    })))
  }

  pub fn child(&self) -> Scope {
    Scope(Rc::new(RefCell::new(ScopeData {
      vars: IndexMap::new(),
      parent: Some(self.clone()),
    })))
  }

  pub fn get(&self, name: &str) -> Option<Value> {
    let data = self.0.borrow();
    match data.vars.get(name) {
      Some(value) => Some(value.clone()),
      None => data.parent.as_ref().and_then(|parent| parent.get(name)),
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    let data = self.0.borrow();
    data.vars.contains_key(name)
      || data
        .parent
        .as_ref()
        .map(|parent| parent.contains(name))
        .unwrap_or(false)
  }

  /// Bind in this scope, shadowing any outer binding.
  pub fn declare(&self, name: &str, value: Value) {
    self.0.borrow_mut().vars.insert(name.to_string(), value);
  }

  /// Assign where the name is bound; fall back to declaring here.
  pub fn assign(&self, name: &str, value: Value) {
    if self.assign_existing(name, &value) {
      return;
    }
    self.declare(name, value);
  }

  fn assign_existing(&self, name: &str, value: &Value) -> bool {
    let mut data = self.0.borrow_mut();
    if let Some(slot) = data.vars.get_mut(name) {
      *slot = value.clone();
      return true;
    }
    match &data.parent {
      Some(parent) => parent.assign_existing(name, value),
      None => false,
    }
  }
}

impl Default for Scope {
  fn default() -> Self {
    Scope::new()
  }
}
