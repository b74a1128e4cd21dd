//! Operator and property-access semantics, JavaScript-flavored: loose
//! coercions for arithmetic, int32 truncation for bitwise operators, and
//! intrinsic methods surfaced as bound natives.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use super::value::Value;
use super::VmError;

pub fn binary(op: &str, a: Value, b: Value) -> Result<Value, VmError> {
  Ok(match op {
    "+" => {
      if concatenates(&a) || concatenates(&b) {
        Value::str(format!("{}{}", a.to_display(), b.to_display()))
      } else {
        Value::Num(a.to_number() + b.to_number())
      }
    }
    "-" => Value::Num(a.to_number() - b.to_number()),
    "*" => Value::Num(a.to_number() * b.to_number()),
    "/" => Value::Num(a.to_number() / b.to_number()),
    "%" => Value::Num(a.to_number() % b.to_number()),
    "<<" => Value::Num((a.to_int32() << (b.to_int32() & 31)) as f64),
    ">>" => Value::Num((a.to_int32() >> (b.to_int32() & 31)) as f64),
    ">>>" => Value::Num(((a.to_int32() as u32) >> (b.to_int32() & 31)) as f64),
    "&" => Value::Num((a.to_int32() & b.to_int32()) as f64),
    "|" => Value::Num((a.to_int32() | b.to_int32()) as f64),
    "^" => Value::Num((a.to_int32() ^ b.to_int32()) as f64),
    "==" => Value::Bool(a.loose_eq(&b)),
    "!=" => Value::Bool(!a.loose_eq(&b)),
    "===" => Value::Bool(a.strict_eq(&b)),
    "!==" => Value::Bool(!a.strict_eq(&b)),
    "<" => Value::Bool(compare(&a, &b) == Some(Ordering::Less)),
    "<=" => Value::Bool(matches!(
      compare(&a, &b),
      Some(Ordering::Less | Ordering::Equal)
    )),
    ">" => Value::Bool(compare(&a, &b) == Some(Ordering::Greater)),
    ">=" => Value::Bool(matches!(
      compare(&a, &b),
      Some(Ordering::Greater | Ordering::Equal)
    )),
    "in" => contains_key(&a, &b)?,
    "instanceof" => instance_of(&a, &b)?,
    _ => return Err(VmError::BadOperator(op.to_string())),
  })
}

pub fn unary(op: &str, a: Value) -> Result<Value, VmError> {
  Ok(match op {
    "+" => Value::Num(a.to_number()),
    "-" => Value::Num(-a.to_number()),
    "!" => Value::Bool(!a.truthy()),
    "~" => Value::Num(!a.to_int32() as f64),
    "typeof" => Value::str(a.type_of()),
    "void" => Value::Undefined,
    // the operand is already evaluated by the time the handler runs, so
    // delete degenerates to its result value
    "delete" => Value::Bool(true),
    _ => return Err(VmError::BadOperator(op.to_string())),
  })
}

/// String concatenation wins over numeric addition for these.
fn concatenates(value: &Value) -> bool {
  matches!(
    value,
    Value::Str(_) | Value::List(_) | Value::Object(_) | Value::Func(_) | Value::Native(_)
  )
}

/// Relational comparison: lexicographic when both sides are strings,
/// numeric otherwise; any NaN makes every comparison false.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  if let (Value::Str(a), Value::Str(b)) = (a, b) {
    return Some(a.cmp(b));
  }
  a.to_number().partial_cmp(&b.to_number())
}

fn contains_key(key: &Value, target: &Value) -> Result<Value, VmError> {
  match target {
    Value::Object(entries) => Ok(Value::Bool(
      entries.borrow().contains_key(&property_key(key)),
    )),
    Value::List(items) => {
      let index = key.to_number();
      Ok(Value::Bool(
        index >= 0.0 && index == index.trunc() && (index as usize) < items.borrow().len(),
      ))
    }
    other => Err(VmError::TypeMismatch(format!(
      "cannot use `in` on a {}",
      other.type_of()
    ))),
  }
}

/// Instances made by `NEW_INSTANCE` record their constructor; instanceof
/// compares against it by identity.
fn instance_of(value: &Value, ctor: &Value) -> Result<Value, VmError> {
  if !matches!(ctor, Value::Func(_) | Value::Native(_)) {
    return Err(VmError::TypeMismatch(
      "right-hand side of instanceof is not callable".into(),
    ));
  }
  let Value::Object(entries) = value else {
    return Ok(Value::Bool(false));
  };
  let found = entries
    .borrow()
    .get(CONSTRUCTOR_KEY)
    .map(|stored| stored.strict_eq(ctor))
    .unwrap_or(false);
  Ok(Value::Bool(found))
}

/// Key under which `NEW_INSTANCE` records the constructor on the instance.
pub const CONSTRUCTOR_KEY: &str = "constructor";

pub fn property_key(key: &Value) -> String {
  key.to_display()
}

pub fn get_property(target: &Value, name: &str) -> Result<Value, VmError> {
  match target {
    Value::Object(entries) => Ok(entries.borrow().get(name).cloned().unwrap_or(Value::Undefined)),
    Value::List(items) => Ok(list_property(items, name)),
    Value::Str(text) => Ok(string_property(text, name)),
    Value::Func(f) => Ok(match name {
      "name" => Value::str(f.name.clone()),
      "length" => Value::Num(f.params.len() as f64),
      _ => Value::Undefined,
    }),
    Value::Native(f) => Ok(match name {
      "name" => Value::str(f.name),
      _ => Value::Undefined,
    }),
    Value::Num(_) | Value::Bool(_) => Ok(Value::Undefined),
    Value::Undefined | Value::Null => Err(VmError::TypeMismatch(format!(
      "cannot read property `{name}` of {}",
      target.to_display()
    ))),
  }
}

pub fn set_property(target: &Value, name: &str, value: Value) -> Result<(), VmError> {
  match target {
    Value::Object(entries) => {
      entries.borrow_mut().insert(name.to_string(), value);
      Ok(())
    }
    other => Err(VmError::TypeMismatch(format!(
      "cannot set property `{name}` on a {}",
      other.type_of()
    ))),
  }
}

pub fn get_index(target: &Value, key: &Value) -> Result<Value, VmError> {
  match target {
    Value::List(items) => {
      let index = key.to_number();
      if index >= 0.0 && index == index.trunc() {
        Ok(
          items
            .borrow()
            .get(index as usize)
            .cloned()
            .unwrap_or(Value::Undefined),
        )
      } else {
        get_property(target, &property_key(key))
      }
    }
    Value::Str(text) => {
      let index = key.to_number();
      if index >= 0.0 && index == index.trunc() {
        Ok(
          text
            .chars()
            .nth(index as usize)
            .map(|c| Value::str(c.to_string()))
            .unwrap_or(Value::Undefined),
        )
      } else {
        get_property(target, &property_key(key))
      }
    }
    _ => get_property(target, &property_key(key)),
  }
}

pub fn set_index(target: &Value, key: &Value, value: Value) -> Result<(), VmError> {
  match target {
    Value::List(items) => {
      let index = key.to_number();
      if index < 0.0 || index != index.trunc() {
        return Err(VmError::TypeMismatch(format!(
          "invalid array index {}",
          key.to_display()
        )));
      }
      let index = index as usize;
      let mut items = items.borrow_mut();
      if index >= items.len() {
        items.resize(index + 1, Value::Undefined);
      }
      items[index] = value;
      Ok(())
    }
    _ => set_property(target, &property_key(key), value),
  }
}

/// List methods, bound to their receiver at access time so calls through
/// the stack machine need no separate `this` plumbing.
fn list_property(items: &Rc<RefCell<Vec<Value>>>, name: &str) -> Value {
  match name {
    "length" => Value::Num(items.borrow().len() as f64),
    "push" => {
      let items = items.clone();
      Value::native("push", move |args| {
        let mut items = items.borrow_mut();
        for arg in args {
          items.push(arg.clone());
        }
        Ok(Value::Num(items.len() as f64))
      })
    }
    "pop" => {
      let items = items.clone();
      Value::native("pop", move |_| {
        Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined))
      })
    }
    "join" => {
      let items = items.clone();
      Value::native("join", move |args| {
        let sep = match args.first() {
          Some(Value::Undefined) | None => ",".to_string(),
          Some(sep) => sep.to_display(),
        };
        let joined = items
          .borrow()
          .iter()
          .map(|v| v.to_display())
          .collect::<Vec<_>>()
          .join(&sep);
        Ok(Value::str(joined))
      })
    }
    "indexOf" => {
      let items = items.clone();
      Value::native("indexOf", move |args| {
        let needle = args.first().cloned().unwrap_or(Value::Undefined);
        let found = items
          .borrow()
          .iter()
          .position(|v| v.strict_eq(&needle))
          .map(|i| i as f64)
          .unwrap_or(-1.0);
        Ok(Value::Num(found))
      })
    }
    "slice" => {
      let items = items.clone();
      Value::native("slice", move |args| {
        let items = items.borrow();
        let len = items.len() as f64;
        let start = clamp_index(args.first(), 0.0, len);
        let end = clamp_index(args.get(1), len, len);
        let (start, end) = (start as usize, (end as usize).max(start as usize));
        Ok(Value::list(items[start..end].to_vec()))
      })
    }
    _ => Value::Undefined,
  }
}

fn string_property(text: &Rc<str>, name: &str) -> Value {
  match name {
    "length" => Value::Num(text.chars().count() as f64),
    "toUpperCase" => {
      let text = text.clone();
      Value::native("toUpperCase", move |_| Ok(Value::str(text.to_uppercase())))
    }
    "toLowerCase" => {
      let text = text.clone();
      Value::native("toLowerCase", move |_| Ok(Value::str(text.to_lowercase())))
    }
    "trim" => {
      let text = text.clone();
      Value::native("trim", move |_| Ok(Value::str(text.trim().to_string())))
    }
    "charAt" => {
      let text = text.clone();
      Value::native("charAt", move |args| {
        let index = args.first().map(|v| v.to_number()).unwrap_or(0.0);
        let c = if index >= 0.0 && index == index.trunc() {
          text.chars().nth(index as usize)
        } else {
          None
        };
        Ok(Value::str(c.map(String::from).unwrap_or_default()))
      })
    }
    "indexOf" => {
      let text = text.clone();
      Value::native("indexOf", move |args| {
        let needle = args.first().map(|v| v.to_display()).unwrap_or_default();
        let found = text
          .find(&needle)
          .map(|byte| text[..byte].chars().count() as f64)
          .unwrap_or(-1.0);
        Ok(Value::Num(found))
      })
    }
    "substring" => {
      let text = text.clone();
      Value::native("substring", move |args| {
        let len = text.chars().count() as f64;
        let mut start = clamp_index(args.first(), 0.0, len) as usize;
        let mut end = clamp_index(args.get(1), len, len) as usize;
        if start > end {
          std::mem::swap(&mut start, &mut end);
        }
        let taken: String = text.chars().skip(start).take(end - start).collect();
        Ok(Value::str(taken))
      })
    }
    "split" => {
      let text = text.clone();
      Value::native("split", move |args| {
        let parts = match args.first() {
          Some(Value::Str(sep)) if !sep.is_empty() => text
            .split(sep.as_ref())
            .map(Value::str)
            .collect::<Vec<_>>(),
          Some(Value::Str(_)) => text.chars().map(|c| Value::str(c.to_string())).collect(),
          _ => vec![Value::str(text.to_string())],
        };
        Ok(Value::list(parts))
      })
    }
    _ => Value::Undefined,
  }
}

/// Negative indices count from the end, everything clamps to `[0, len]`.
fn clamp_index(arg: Option<&Value>, default: f64, len: f64) -> f64 {
  let raw = match arg {
    Some(Value::Undefined) | None => default,
    Some(v) => v.to_number(),
  };
  if raw.is_nan() {
    return 0.0;
  }
  let adjusted = if raw < 0.0 { len + raw } else { raw };
  adjusted.clamp(0.0, len).trunc()
}
