use std::cell::{Cell, RefCell};
use std::fmt::Display;

use indexmap::IndexMap;

use super::constant::{Constant, PoolKey};
use super::opcode::Opcode;

/// Highest encodable pool index. Operand bytes must never be 0xFF: the
/// runtime strips every 0xFF byte as NOP padding after decryption, so 0xFF
/// anywhere but an opcode position would corrupt the stream.
pub const MAX_POOL_INDEX: usize = 0xfe;

/// Raised when the pool outgrows the one-byte operand encoding.
#[derive(Clone, Copy, Debug)]
pub struct PoolOverflow;

impl Display for PoolOverflow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "constant pool exceeds {} entries", MAX_POOL_INDEX + 1)
  }
}

impl std::error::Error for PoolOverflow {}

#[derive(Default)]
pub struct BytecodeBuilder {
  bytecode: Vec<u8>,
  constant_pool_builder: ConstantPoolBuilder,
  unbound_jumps: usize,
}

/// A forward jump target. Supports any number of referrers so loop exits
/// and switch arms can all share one label.
pub struct Label {
  name: &'static str,
  referrers: RefCell<Vec<Referrer>>,
  bound: Cell<bool>,
}

#[derive(Clone, Copy)]
struct Referrer {
  opcode_offset: usize,
  operand_offset: usize,
}

impl BytecodeBuilder {
  pub fn new() -> Self {
    Self {
      bytecode: Vec::new(),
      constant_pool_builder: ConstantPoolBuilder::new(),
      unbound_jumps: 0,
    }
  }

  /// Offset of the next instruction to be emitted.
  pub fn pc(&self) -> usize {
    self.bytecode.len()
  }

  /// The instruction stream emitted so far.
  pub fn as_bytes(&self) -> &[u8] {
    &self.bytecode
  }

  /// Emit an operand-less instruction.
  pub fn emit(&mut self, opcode: Opcode) {
    assert_eq!(
      opcode.operand_count(),
      0,
      "{} takes operands, use emit_with",
      opcode.name()
    );
    self.bytecode.push(opcode as u8);
  }

  /// Emit an instruction with its operand bytes.
  pub fn emit_with(&mut self, opcode: Opcode, operands: &[u8]) {
    assert!(!opcode.is_jump(), "use emit_jump to emit jump instructions");
    assert_eq!(
      opcode.operand_count(),
      operands.len(),
      "operand count mismatch for {}",
      opcode.name()
    );
    self.bytecode.push(opcode as u8);
    self.bytecode.extend_from_slice(operands);
  }

  pub fn constant_pool_builder(&mut self) -> &mut ConstantPoolBuilder {
    &mut self.constant_pool_builder
  }

  /// Create an empty label. Used with `emit_jump`.
  pub fn label(&self, name: &'static str) -> Label {
    Label {
      name,
      referrers: RefCell::new(Vec::new()),
      bound: Cell::new(false),
    }
  }

  /// Emit a forward jump. The displacement constant is reserved now and
  /// committed when the label is bound.
  pub fn emit_jump(&mut self, opcode: Opcode, label: &Label) -> Result<(), PoolOverflow> {
    assert!(opcode.is_jump(), "{} is not a jump", opcode.name());
    assert!(!label.bound.get(), "jump to already-bound label {}", label.name);
    let opcode_offset = self.bytecode.len();
    let slot = self.constant_pool_builder.reserve()?;
    self.unbound_jumps += 1;
    label.referrers.borrow_mut().push(Referrer {
      opcode_offset,
      operand_offset: opcode_offset + 1,
    });
    self.bytecode.push(opcode as u8);
    self.bytecode.push(slot);
    Ok(())
  }

  /// Emit a jump to an already-emitted position, e.g. a loop header. The
  /// displacement is known, so the constant is committed immediately.
  pub fn emit_jump_back(&mut self, opcode: Opcode, target: usize) -> Result<(), PoolOverflow> {
    assert!(opcode.is_jump(), "{} is not a jump", opcode.name());
    let opcode_offset = self.bytecode.len();
    let displacement = target as i32 - (opcode_offset as i32 + 1);
    let slot = self.constant_pool_builder.reserve()?;
    self
      .constant_pool_builder
      .commit(Constant::Offset(displacement), slot);
    self.bytecode.push(opcode as u8);
    self.bytecode.push(slot);
    Ok(())
  }

  /// Emit `TRY_BEGIN` with displacement constants for the catch and finally
  /// labels, patched exactly like forward jumps.
  pub fn emit_try_begin(&mut self, catch: &Label, finally: &Label) -> Result<(), PoolOverflow> {
    let opcode_offset = self.bytecode.len();
    let catch_slot = self.constant_pool_builder.reserve()?;
    let finally_slot = self.constant_pool_builder.reserve()?;
    self.unbound_jumps += 2;
    catch.referrers.borrow_mut().push(Referrer {
      opcode_offset,
      operand_offset: opcode_offset + 1,
    });
    finally.referrers.borrow_mut().push(Referrer {
      opcode_offset,
      operand_offset: opcode_offset + 2,
    });
    self.bytecode.push(Opcode::TryBegin as u8);
    self.bytecode.push(catch_slot);
    self.bytecode.push(finally_slot);
    Ok(())
  }

  /// Bind `label` to the current offset and patch every referrer's
  /// displacement constant. A displacement is relative to the pc right
  /// after the opcode byte: `target - (opcode_offset + 1)`.
  pub fn bind_label(&mut self, label: &Label) {
    assert!(!label.bound.replace(true), "label {} bound twice", label.name);
    let target = self.bytecode.len();
    for referrer in label.referrers.borrow().iter() {
      assert!(
        target > referrer.opcode_offset,
        "label {} bound before its referrer",
        label.name
      );
      let displacement = target as i32 - (referrer.opcode_offset as i32 + 1);
      let slot = self.bytecode[referrer.operand_offset];
      self
        .constant_pool_builder
        .commit(Constant::Offset(displacement), slot);
      self.unbound_jumps -= 1;
    }
  }

  pub fn finish(self) -> (Vec<u8>, Vec<Constant>) {
    assert_eq!(self.unbound_jumps, 0, "bytecode finished with unbound jumps");
    (self.bytecode, self.constant_pool_builder.constants)
  }
}

#[derive(Default)]
pub struct ConstantPoolBuilder {
  constants: Vec<Constant>,
  dedup_map: IndexMap<PoolKey, usize>,
}

impl ConstantPoolBuilder {
  pub fn new() -> Self {
    Self {
      constants: Vec::new(),
      dedup_map: IndexMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.constants.len()
  }

  pub fn is_empty(&self) -> bool {
    self.constants.is_empty()
  }

  /// Insert a constant, deduplicating by structural key, and return its
  /// pool index.
  pub fn insert(&mut self, constant: Constant) -> Result<u8, PoolOverflow> {
    let key = constant
      .key()
      .expect("offsets go through reserve/commit, not insert");
    if let Some(index) = self.dedup_map.get(&key).copied() {
      return Ok(index as u8);
    }
    let index = self.push(constant)?;
    self.dedup_map.insert(key, index as usize);
    Ok(index)
  }

  /// Reserve a slot for a value committed later (jump patching).
  pub fn reserve(&mut self) -> Result<u8, PoolOverflow> {
    self.push(Constant::Reserved)
  }

  pub fn commit(&mut self, constant: Constant, index: u8) {
    self.constants[index as usize] = constant;
  }

  fn push(&mut self, constant: Constant) -> Result<u8, PoolOverflow> {
    let index = self.constants.len();
    if index > MAX_POOL_INDEX {
      return Err(PoolOverflow);
    }
    self.constants.push(constant);
    Ok(index as u8)
  }
}
