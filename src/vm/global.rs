//! Host intrinsics seeded into scope before dispatch begins. Every name in
//! [`crate::names::RESERVED_INTRINSICS`] is bound here.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use super::value::{Scope, Value};
use super::VmError;

pub fn install(scope: &Scope) {
  scope.declare("undefined", Value::Undefined);
  scope.declare("NaN", Value::Num(f64::NAN));
  scope.declare("Infinity", Value::Num(f64::INFINITY));

  scope.declare("console", console());
  scope.declare("Math", math());
  scope.declare("JSON", json());
  scope.declare("Date", date());

  scope.declare(
    "parseInt",
    Value::native("parseInt", |args| {
      let text = args.first().map(|v| v.to_display()).unwrap_or_default();
      // radix 0 means unspecified: decimal, with 0x auto-detection
      let radix = match args.get(1).map(|v| v.to_number()) {
        Some(r) if r.is_finite() && r != 0.0 => r as u32,
        _ => 0,
      };
      Ok(Value::Num(parse_int(&text, radix)))
    }),
  );
  scope.declare(
    "parseFloat",
    Value::native("parseFloat", |args| {
      let text = args.first().map(|v| v.to_display()).unwrap_or_default();
      Ok(Value::Num(parse_float(&text)))
    }),
  );
  scope.declare(
    "isNaN",
    Value::native("isNaN", |args| {
      let n = args.first().map(|v| v.to_number()).unwrap_or(f64::NAN);
      Ok(Value::Bool(n.is_nan()))
    }),
  );
  scope.declare(
    "isFinite",
    Value::native("isFinite", |args| {
      let n = args.first().map(|v| v.to_number()).unwrap_or(f64::NAN);
      Ok(Value::Bool(n.is_finite()))
    }),
  );

  scope.declare(
    "String",
    Value::native("String", |args| {
      Ok(Value::str(
        args.first().map(|v| v.to_display()).unwrap_or_default(),
      ))
    }),
  );
  scope.declare(
    "Number",
    Value::native("Number", |args| {
      Ok(Value::Num(args.first().map(|v| v.to_number()).unwrap_or(0.0)))
    }),
  );
  scope.declare(
    "Boolean",
    Value::native("Boolean", |args| {
      Ok(Value::Bool(args.first().map(|v| v.truthy()).unwrap_or(false)))
    }),
  );
  scope.declare(
    "Array",
    Value::native("Array", |args| {
      // a single numeric argument is a length, anything else an element list
      if let [Value::Num(n)] = args {
        if *n >= 0.0 && *n == n.trunc() {
          return Ok(Value::list(vec![Value::Undefined; *n as usize]));
        }
      }
      Ok(Value::list(args.to_vec()))
    }),
  );
  scope.declare("Object", Value::native("Object", |_| Ok(Value::object())));
  scope.declare(
    "Error",
    Value::native("Error", |args| {
      let error = Value::object();
      if let Value::Object(entries) = &error {
        let mut entries = entries.borrow_mut();
        entries.insert("name".into(), Value::str("Error"));
        entries.insert(
          "message".into(),
          Value::str(args.first().map(|v| v.to_display()).unwrap_or_default()),
        );
      }
      Ok(error)
    }),
  );
}

fn console() -> Value {
  let console = Value::object();
  if let Value::Object(entries) = &console {
    entries.borrow_mut().insert(
      "log".into(),
      Value::native("log", |args| {
        let line = args
          .iter()
          .map(|v| v.to_display())
          .collect::<Vec<_>>()
          .join(" ");
        println!("{line}");
        Ok(Value::Undefined)
      }),
    );
  }
  console
}

fn math() -> Value {
  let math = Value::object();
  let Value::Object(entries) = &math else {
    unreachable!()
  };
  let mut entries = entries.borrow_mut();
  entries.insert("PI".into(), Value::Num(std::f64::consts::PI));
  entries.insert("E".into(), Value::Num(std::f64::consts::E));

  let unary = |name: &'static str, f: fn(f64) -> f64| {
    Value::native(name, move |args: &[Value]| {
      let n = args.first().map(|v| v.to_number()).unwrap_or(f64::NAN);
      Ok(Value::Num(f(n)))
    })
  };
  entries.insert("floor".into(), unary("floor", f64::floor));
  entries.insert("ceil".into(), unary("ceil", f64::ceil));
  // half-up rounding, like the host language
  entries.insert("round".into(), unary("round", |n| (n + 0.5).floor()));
  entries.insert("abs".into(), unary("abs", f64::abs));
  entries.insert("sqrt".into(), unary("sqrt", f64::sqrt));

  entries.insert(
    "pow".into(),
    Value::native("pow", |args| {
      let base = args.first().map(|v| v.to_number()).unwrap_or(f64::NAN);
      let exp = args.get(1).map(|v| v.to_number()).unwrap_or(f64::NAN);
      Ok(Value::Num(base.powf(exp)))
    }),
  );
  entries.insert(
    "min".into(),
    Value::native("min", |args| {
      Ok(Value::Num(fold_numeric(args, f64::INFINITY, f64::min)))
    }),
  );
  entries.insert(
    "max".into(),
    Value::native("max", |args| {
      Ok(Value::Num(fold_numeric(args, f64::NEG_INFINITY, f64::max)))
    }),
  );
  entries.insert(
    "random".into(),
    Value::native("random", |_| {
      Ok(Value::Num(rand::thread_rng().gen::<f64>()))
    }),
  );
  drop(entries);
  math
}

fn fold_numeric(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
  let mut acc = init;
  for arg in args {
    let n = arg.to_number();
    if n.is_nan() {
      return f64::NAN;
    }
    acc = f(acc, n);
  }
  acc
}

fn json() -> Value {
  let json = Value::object();
  let Value::Object(entries) = &json else {
    unreachable!()
  };
  let mut entries = entries.borrow_mut();
  entries.insert(
    "stringify".into(),
    Value::native("stringify", |args| {
      let value = args.first().cloned().unwrap_or(Value::Undefined);
      match to_json(&value) {
        Some(json) => Ok(Value::str(json.to_string())),
        None => Ok(Value::Undefined),
      }
    }),
  );
  entries.insert(
    "parse".into(),
    Value::native("parse", |args| {
      let text = args.first().map(|v| v.to_display()).unwrap_or_default();
      let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        VmError::Thrown(Value::str(format!("SyntaxError: {e}")))
      })?;
      Ok(from_json(&parsed))
    }),
  );
  drop(entries);
  json
}

/// `undefined` and callables have no JSON form: `None` means the entry is
/// skipped in objects and nulled in arrays, like the host serializer does.
fn to_json(value: &Value) -> Option<serde_json::Value> {
  Some(match value {
    Value::Undefined | Value::Func(_) | Value::Native(_) => return None,
    Value::Null => serde_json::Value::Null,
    Value::Bool(v) => serde_json::Value::Bool(*v),
    Value::Num(v) => serde_json::Number::from_f64(*v)
      .map(serde_json::Value::Number)
      .unwrap_or(serde_json::Value::Null),
    Value::Str(v) => serde_json::Value::String(v.to_string()),
    Value::List(items) => serde_json::Value::Array(
      items
        .borrow()
        .iter()
        .map(|v| to_json(v).unwrap_or(serde_json::Value::Null))
        .collect(),
    ),
    Value::Object(entries) => serde_json::Value::Object(
      entries
        .borrow()
        .iter()
        .filter_map(|(k, v)| to_json(v).map(|v| (k.clone(), v)))
        .collect(),
    ),
  })
}

fn from_json(json: &serde_json::Value) -> Value {
  match json {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(v) => Value::Bool(*v),
    serde_json::Value::Number(v) => Value::Num(v.as_f64().unwrap_or(f64::NAN)),
    serde_json::Value::String(v) => Value::str(v.clone()),
    serde_json::Value::Array(items) => Value::list(items.iter().map(from_json).collect()),
    serde_json::Value::Object(entries) => {
      let object = Value::object();
      if let Value::Object(map) = &object {
        let mut map = map.borrow_mut();
        for (k, v) in entries {
          map.insert(k.clone(), from_json(v));
        }
      }
      object
    }
  }
}

fn date() -> Value {
  let date = Value::object();
  if let Value::Object(entries) = &date {
    entries.borrow_mut().insert(
      "now".into(),
      Value::native("now", |_| {
        let millis = SystemTime::now()
          .duration_since(UNIX_EPOCH)
          .map(|d| d.as_millis() as f64)
          .unwrap_or(0.0);
        Ok(Value::Num(millis))
      }),
    );
  }
  date
}

/// Radix 0 stands for "unspecified": base 10 unless a 0x prefix selects 16.
fn parse_int(text: &str, radix: u32) -> f64 {
  let trimmed = text.trim();
  let (negative, rest) = match trimmed.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
  };
  let (radix, rest) = if radix == 0 || radix == 16 {
    match rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
      Some(hex) => (16, hex),
      None => (if radix == 0 { 10 } else { 16 }, rest),
    }
  } else {
    (radix, rest)
  };
  if !(2..=36).contains(&radix) {
    return f64::NAN;
  }
  let digits: String = rest
    .chars()
    .take_while(|c| c.is_digit(radix))
    .collect();
  if digits.is_empty() {
    return f64::NAN;
  }
  let value = i64::from_str_radix(&digits, radix).map(|v| v as f64).unwrap_or(f64::NAN);
  if negative {
    -value
  } else {
    value
  }
}

fn parse_float(text: &str) -> f64 {
  let trimmed = text.trim();
  let mut end = 0;
  let bytes = trimmed.as_bytes();
  let mut seen_dot = false;
  let mut seen_exp = false;
  while end < bytes.len() {
    let c = bytes[end] as char;
    let ok = c.is_ascii_digit()
      || (end == 0 && (c == '+' || c == '-'))
      || (c == '.' && !seen_dot && !seen_exp)
      || ((c == 'e' || c == 'E') && !seen_exp && end > 0)
      || ((c == '+' || c == '-') && end > 0 && matches!(bytes[end - 1], b'e' | b'E'));
    if !ok {
      break;
    }
    seen_dot |= c == '.';
    seen_exp |= c == 'e' || c == 'E';
    end += 1;
  }
  trimmed[..end].parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::names::RESERVED_INTRINSICS;

  #[test]
  fn every_reserved_intrinsic_is_seeded() {
    let scope = Scope::new();
    install(&scope);
    for name in RESERVED_INTRINSICS {
      assert!(scope.contains(name), "missing intrinsic {name}");
    }
  }

  #[test]
  fn parse_int_handles_radixes_and_garbage() {
    assert_eq!(parse_int("42", 10), 42.0);
    assert_eq!(parse_int("  -7px", 10), -7.0);
    assert_eq!(parse_int("0xff", 0), 255.0);
    assert_eq!(parse_int("0xff", 16), 255.0);
    // an explicit decimal radix does not auto-detect hex
    assert_eq!(parse_int("0xff", 10), 0.0);
    assert_eq!(parse_int("ff", 16), 255.0);
    assert!(parse_int("zzz", 10).is_nan());
  }

  #[test]
  fn parse_float_takes_the_longest_prefix() {
    assert_eq!(parse_float("3.25rem"), 3.25);
    assert_eq!(parse_float(" 1e3 "), 1000.0);
    assert!(parse_float("x1").is_nan());
  }
}
