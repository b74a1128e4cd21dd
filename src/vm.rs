//! The reference interpreter: executes a sealed program natively with the
//! exact semantics the emitted interpreter implements on its target host.
//!
//! Dispatch reads one opcode, its operand bytes per the static arity table,
//! and runs the handler. Handler failures unwind to the innermost try
//! frame, which receives the exception on the stack at its catch pc.

pub mod global;
mod ops;
pub mod value;

#[cfg(test)]
mod tests;

use std::fmt::Display;
use std::rc::Rc;

use crate::bytecode::{Constant, Opcode, Program};
use crate::codec::{self, CodecError, SealedProgram};
use crate::emit;
use crate::syntax;

pub use value::{Function, Scope, Value};

#[cfg(feature = "check-recursion-limit")]
const RECURSION_LIMIT: usize = 64;

#[derive(Debug)]
pub enum VmError {
  BadOpcode(u8),
  BadOperator(String),
  StackUnderflow,
  TypeMismatch(String),
  BadConstant(usize),
  UnexpectedEnd,
  #[cfg(feature = "check-recursion-limit")]
  RecursionLimit,
  Thrown(Value),
  Codec(CodecError),
}

impl VmError {
  /// The value a catch block observes for this failure.
  fn into_thrown(self) -> Value {
    match self {
      VmError::Thrown(value) => value,
      other => Value::str(other.to_string()),
    }
  }
}

impl From<CodecError> for VmError {
  fn from(value: CodecError) -> Self {
    VmError::Codec(value)
  }
}

impl Display for VmError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      VmError::BadOpcode(byte) => write!(f, "bad opcode 0x{byte:02x}"),
      VmError::BadOperator(op) => write!(f, "bad operator `{op}`"),
      VmError::StackUnderflow => write!(f, "stack underflow"),
      VmError::TypeMismatch(detail) => write!(f, "{detail}"),
      VmError::BadConstant(index) => write!(f, "constant {index} out of range"),
      VmError::UnexpectedEnd => write!(f, "unexpected end of bytecode"),
      #[cfg(feature = "check-recursion-limit")]
      VmError::RecursionLimit => write!(f, "call depth limit exceeded"),
      VmError::Thrown(value) => write!(f, "uncaught exception: {}", value.to_display()),
      VmError::Codec(e) => write!(f, "{e}"),
    }
  }
}

impl std::error::Error for VmError {}

enum Flow {
  Next,
  Jump(i32),
  Return(Value),
}

struct TryFrame {
  catch_pc: usize,
  #[allow(dead_code)] // recorded per the program format; unwinding only targets catch_pc
  finally_pc: usize,
}

pub struct Vm {
  globals: Scope,
  depth: usize,
  last_popped: Option<Value>,
}

impl Vm {
  pub fn new() -> Self {
    let globals = Scope::new();
    global::install(&globals);
    Self {
      globals,
      depth: 0,
      last_popped: None,
    }
  }

  pub fn globals(&self) -> &Scope {
    &self.globals
  }

  /// Decrypt, decode and run a sealed program. The result is the explicit
  /// RETURN value when the program produced one, and otherwise the value
  /// of the last expression statement (the terminal stack value).
  pub fn eval(&mut self, sealed: &SealedProgram) -> Result<Value, VmError> {
    let bytecode = codec::open(sealed)?;
    let pool = codec::decode_pool(&sealed.pool, sealed.pool_key.as_deref())?;
    self.last_popped = None;
    let scope = self.globals.child();
    let returned = self.execute(&bytecode, &pool, scope, Value::Undefined)?;
    if returned.is_undefined() {
      Ok(self.last_popped.take().unwrap_or(Value::Undefined))
    } else {
      Ok(returned)
    }
  }

  /// Run an unencrypted program against the global scope.
  pub fn run(&mut self, program: &Program) -> Result<Value, VmError> {
    let scope = self.globals.child();
    self.execute(&program.bytecode, &program.pool, scope, Value::Undefined)
  }

  fn execute(
    &mut self,
    bytecode: &[u8],
    pool: &[Constant],
    scope: Scope,
    this: Value,
  ) -> Result<Value, VmError> {
    let mut stack: Vec<Value> = Vec::new();
    let mut try_blocks: Vec<TryFrame> = Vec::new();
    let mut pc = 0usize;

    loop {
      let op_pc = pc;
      let result = self.step(bytecode, pool, &scope, &this, &mut stack, &mut try_blocks, &mut pc);
      match result {
        Ok(Flow::Next) => {}
        Ok(Flow::Jump(displacement)) => {
          // displacement is relative to op_pc + 1; pc already advanced
          // past the operand byte
          pc = (op_pc as i64 + 1 + displacement as i64) as usize;
        }
        Ok(Flow::Return(value)) => return Ok(value),
        Err(error) => match try_blocks.pop() {
          Some(frame) => {
            stack.push(error.into_thrown());
            pc = frame.catch_pc;
          }
          None => return Err(error),
        },
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn step(
    &mut self,
    bytecode: &[u8],
    pool: &[Constant],
    scope: &Scope,
    this: &Value,
    stack: &mut Vec<Value>,
    try_blocks: &mut Vec<TryFrame>,
    pc: &mut usize,
  ) -> Result<Flow, VmError> {
    let op_pc = *pc;
    let byte = *bytecode.get(op_pc).ok_or(VmError::UnexpectedEnd)?;
    let opcode = Opcode::try_from(byte).map_err(VmError::BadOpcode)?;
    *pc += 1;
    let count = opcode.operand_count();
    if *pc + count > bytecode.len() {
      return Err(VmError::UnexpectedEnd);
    }
    let operands = &bytecode[*pc..*pc + count];
    *pc += count;

    match opcode {
      Opcode::LoadConst => {
        let constant = const_at(pool, operands[0])?;
        stack.push(constant_value(constant));
      }
      Opcode::LoadVar => {
        let name = name_at(pool, operands[0])?;
        stack.push(scope.get(name).unwrap_or(Value::Undefined));
      }
      Opcode::StoreVar => {
        let name = name_at(pool, operands[0])?;
        let value = pop(stack)?;
        scope.assign(name, value);
      }
      Opcode::BinaryOp => {
        let op = name_at(pool, operands[0])?;
        let b = pop(stack)?;
        let a = pop(stack)?;
        stack.push(ops::binary(op, a, b)?);
      }
      Opcode::UnaryOp => {
        let op = name_at(pool, operands[0])?;
        let a = pop(stack)?;
        stack.push(ops::unary(op, a)?);
      }
      Opcode::LogicalOp => {
        let op = name_at(pool, operands[0])?;
        let b = pop(stack)?;
        let a = pop(stack)?;
        let result = match op {
          "&&" => {
            if a.truthy() {
              b
            } else {
              a
            }
          }
          "||" => {
            if a.truthy() {
              a
            } else {
              b
            }
          }
          "??" => {
            if a.is_nullish() {
              b
            } else {
              a
            }
          }
          other => return Err(VmError::BadOperator(other.to_string())),
        };
        stack.push(result);
      }
      Opcode::CallFunction => {
        let argc = operands[0] as usize;
        let args = pop_args(stack, argc)?;
        let callee = pop(stack)?;
        let result = self.call_value(callee, args, Value::Undefined)?;
        stack.push(result);
      }
      Opcode::NewInstance => {
        let argc = operands[0] as usize;
        let args = pop_args(stack, argc)?;
        let ctor = pop(stack)?;
        let result = self.construct(ctor, args)?;
        stack.push(result);
      }
      Opcode::Return => {
        let value = pop(stack)?;
        return Ok(Flow::Return(value));
      }
      Opcode::Jump => {
        return Ok(Flow::Jump(offset_at(pool, operands[0])?));
      }
      Opcode::JumpIfTrue => {
        let condition = pop(stack)?;
        if condition.truthy() {
          return Ok(Flow::Jump(offset_at(pool, operands[0])?));
        }
      }
      Opcode::JumpIfFalse => {
        let condition = pop(stack)?;
        if !condition.truthy() {
          return Ok(Flow::Jump(offset_at(pool, operands[0])?));
        }
      }
      Opcode::CreateFunction => {
        let name = name_at(pool, operands[0])?.to_string();
        let params = match const_at(pool, operands[1])? {
          Constant::Params(params) => params.clone(),
          other => {
            return Err(VmError::TypeMismatch(format!(
              "expected a parameter list constant, found {other}"
            )))
          }
        };
        let body = match const_at(pool, operands[2])? {
          Constant::Body(body) => body.clone(),
          other => {
            return Err(VmError::TypeMismatch(format!(
              "expected a body constant, found {other}"
            )))
          }
        };
        stack.push(Value::Func(Rc::new(Function {
          name,
          params,
          body,
          scope: scope.clone(),
          compiled: Default::default(),
        })));
      }
      Opcode::CreateObject => stack.push(Value::object()),
      Opcode::LoadProperty => {
        let name = name_at(pool, operands[0])?;
        let target = pop(stack)?;
        stack.push(ops::get_property(&target, name)?);
      }
      Opcode::StoreProperty => {
        let name = name_at(pool, operands[0])?;
        let value = pop(stack)?;
        let target = pop(stack)?;
        ops::set_property(&target, name, value.clone())?;
        stack.push(value);
      }
      Opcode::Pop => {
        let value = pop(stack)?;
        self.last_popped = Some(value);
      }
      Opcode::Duplicate => {
        let top = stack.last().ok_or(VmError::StackUnderflow)?.clone();
        stack.push(top);
      }
      Opcode::CreateArray => stack.push(Value::list(Vec::new())),
      Opcode::ArrayPush => {
        let value = pop(stack)?;
        let target = pop(stack)?;
        match &target {
          Value::List(items) => items.borrow_mut().push(value),
          other => {
            return Err(VmError::TypeMismatch(format!(
              "cannot push onto a {}",
              other.type_of()
            )))
          }
        }
        stack.push(target);
      }
      Opcode::LoadIndex => {
        let key = pop(stack)?;
        let target = pop(stack)?;
        stack.push(ops::get_index(&target, &key)?);
      }
      Opcode::StoreIndex => {
        let value = pop(stack)?;
        let key = pop(stack)?;
        let target = pop(stack)?;
        ops::set_index(&target, &key, value.clone())?;
        stack.push(value);
      }
      Opcode::TryBegin => {
        let catch = offset_at(pool, operands[0])?;
        let finally = offset_at(pool, operands[1])?;
        try_blocks.push(TryFrame {
          catch_pc: (op_pc as i64 + 1 + catch as i64) as usize,
          finally_pc: (op_pc as i64 + 1 + finally as i64) as usize,
        });
      }
      Opcode::TryEnd => {
        if try_blocks.pop().is_none() {
          return Err(VmError::TypeMismatch(
            "TRY_END without an active try frame".into(),
          ));
        }
      }
      Opcode::Catch => {
        let name = name_at(pool, operands[0])?;
        let exception = stack.last().ok_or(VmError::StackUnderflow)?.clone();
        scope.declare(name, exception);
      }
      Opcode::Throw => {
        let value = pop(stack)?;
        return Err(VmError::Thrown(value));
      }
      Opcode::Undefined => stack.push(Value::Undefined),
      Opcode::Null => stack.push(Value::Null),
      Opcode::This => stack.push(this.clone()),
      Opcode::Nop => {}
    }
    Ok(Flow::Next)
  }

  pub fn call_value(
    &mut self,
    callee: Value,
    args: Vec<Value>,
    this: Value,
  ) -> Result<Value, VmError> {
    match callee {
      Value::Native(native) => (native.f)(&args),
      Value::Func(function) => self.call_function(&function, args, this),
      other => Err(VmError::TypeMismatch(format!(
        "{} is not a function",
        other.type_of()
      ))),
    }
  }

  /// Compile the body on first call, then re-enter dispatch with a fresh
  /// frame: a child of the defining scope with parameters bound.
  fn call_function(
    &mut self,
    function: &Function,
    args: Vec<Value>,
    this: Value,
  ) -> Result<Value, VmError> {
    #[cfg(feature = "check-recursion-limit")]
    if self.depth >= RECURSION_LIMIT {
      return Err(VmError::RecursionLimit);
    }
    let program = self.compiled(function)?;
    let scope = function.scope.child();
    for (i, param) in function.params.iter().enumerate() {
      scope.declare(param, args.get(i).cloned().unwrap_or(Value::Undefined));
    }
    self.depth += 1;
    let result = self.execute(&program.bytecode, &program.pool, scope, this);
    self.depth -= 1;
    result
  }

  /// The host dynamic-compile facility backing `CREATE_FUNCTION`: the
  /// crate's own parser and lowerer, invoked lazily and cached.
  fn compiled(&self, function: &Function) -> Result<Rc<Program>, VmError> {
    if let Some(program) = function.compiled.borrow().as_ref() {
      return Ok(program.clone());
    }
    let module = syntax::parse(&function.body).map_err(|errors| {
      let detail = errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "invalid function body".into());
      VmError::Thrown(Value::str(format!("SyntaxError: {detail}")))
    })?;
    let program = emit::emit(&module, emit::Mode::Strict)
      .map_err(|e| VmError::Thrown(Value::str(format!("CompileError: {e}"))))?;
    let program = Rc::new(program);
    *function.compiled.borrow_mut() = Some(program.clone());
    Ok(program)
  }

  /// `new Ctor(...)`: allocate the instance, record the constructor for
  /// `instanceof`, and keep the instance unless the constructor returned
  /// an object of its own.
  fn construct(&mut self, ctor: Value, args: Vec<Value>) -> Result<Value, VmError> {
    match &ctor {
      Value::Native(native) => (native.f)(&args),
      Value::Func(_) => {
        let instance = Value::object();
        if let Value::Object(entries) = &instance {
          entries
            .borrow_mut()
            .insert(ops::CONSTRUCTOR_KEY.to_string(), ctor.clone());
        }
        let result = self.call_value(ctor, args, instance.clone())?;
        Ok(match result {
          Value::Object(_) | Value::List(_) => result,
          _ => instance,
        })
      }
      other => Err(VmError::TypeMismatch(format!(
        "{} is not a constructor",
        other.type_of()
      ))),
    }
  }
}

impl Default for Vm {
  fn default() -> Self {
    Self::new()
  }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, VmError> {
  stack.pop().ok_or(VmError::StackUnderflow)
}

fn pop_args(stack: &mut Vec<Value>, count: usize) -> Result<Vec<Value>, VmError> {
  if stack.len() < count {
    return Err(VmError::StackUnderflow);
  }
  Ok(stack.split_off(stack.len() - count))
}

fn const_at(pool: &[Constant], index: u8) -> Result<&Constant, VmError> {
  pool
    .get(index as usize)
    .ok_or(VmError::BadConstant(index as usize))
}

fn name_at(pool: &[Constant], index: u8) -> Result<&str, VmError> {
  let constant = const_at(pool, index)?;
  constant.as_text().ok_or_else(|| {
    VmError::TypeMismatch(format!("expected a textual constant, found {constant}"))
  })
}

fn offset_at(pool: &[Constant], index: u8) -> Result<i32, VmError> {
  let constant = const_at(pool, index)?;
  constant.as_offset().ok_or_else(|| {
    VmError::TypeMismatch(format!("expected an offset constant, found {constant}"))
  })
}

fn constant_value(constant: &Constant) -> Value {
  match constant {
    Constant::Reserved => Value::Undefined,
    Constant::Num(v) => Value::Num(*v),
    Constant::Bool(v) => Value::Bool(*v),
    Constant::Str(v) | Constant::Name(v) | Constant::Body(v) => Value::str(v.clone()),
    Constant::Offset(v) => Value::Num(*v as f64),
    Constant::Params(params) => {
      Value::list(params.iter().map(|p| Value::str(p.clone())).collect())
    }
  }
}
