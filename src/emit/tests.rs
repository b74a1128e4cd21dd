use super::*;
use crate::syntax;

fn lower(src: &str) -> Program {
  let module = match syntax::parse(src) {
    Ok(module) => module,
    Err(errors) => panic!("parse failed: {errors:?}"),
  };
  emit(&module, Mode::Strict).unwrap()
}

fn opcodes(program: &Program) -> Vec<Opcode> {
  disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap().opcode)
    .collect()
}

/// Resolve a jump instruction's displacement constant to its absolute
/// target.
fn jump_target(program: &Program, instruction: disasm::Instruction<'_>) -> i32 {
  let slot = instruction.operands[0] as usize;
  let displacement = program.pool[slot].as_offset().unwrap();
  instruction.pc as i32 + 1 + displacement
}

#[test]
fn arithmetic_expression_statement() {
  let program = lower("1+2*3;");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::LoadConst,
      Opcode::LoadConst,
      Opcode::LoadConst,
      Opcode::BinaryOp,
      Opcode::BinaryOp,
      Opcode::Pop,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
  // inner product first, then the sum
  let ops: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .filter(|i| i.opcode == Opcode::BinaryOp)
    .map(|i| program.pool[i.operands[0] as usize].clone())
    .collect();
  assert_eq!(ops, [Constant::Str("*".into()), Constant::Str("+".into())]);
}

#[test]
fn var_and_assignment() {
  let program = lower("var x = 10; x = x + 5; x;");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::LoadConst,
      Opcode::StoreVar,
      Opcode::LoadVar,
      Opcode::LoadConst,
      Opcode::BinaryOp,
      Opcode::Duplicate,
      Opcode::StoreVar,
      Opcode::Pop,
      Opcode::LoadVar,
      Opcode::Pop,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
}

#[test]
fn var_without_initializer_stores_undefined() {
  let program = lower("var x;");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::Undefined,
      Opcode::StoreVar,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
}

#[test]
fn if_else_emits_one_conditional_and_one_unconditional_jump() {
  let program = lower("if (1<2) { 1 } else { 2 }");
  let conditionals: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .filter(|i| i.opcode == Opcode::JumpIfFalse)
    .collect();
  let unconditionals: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .filter(|i| i.opcode == Opcode::Jump)
    .collect();
  assert_eq!(conditionals.len(), 1);
  assert_eq!(unconditionals.len(), 1);

  // JUMP_IF_FALSE lands on the else branch: the instruction right after
  // the unconditional jump
  let else_target = jump_target(&program, conditionals[0]);
  assert_eq!(else_target, unconditionals[0].pc as i32 + 2);
  // the unconditional jump lands right after the else branch body
  let end_target = jump_target(&program, unconditionals[0]);
  let else_len = 1 + 1 + 1; // LOAD_CONST k; POP
  assert_eq!(end_target, else_target + else_len);
}

#[test]
fn constants_deduplicate_across_statements() {
  let program = lower("var a = 1; var b = 1; var c = \"s\"; var d = \"s\";");
  let numbers = program
    .pool
    .iter()
    .filter(|c| matches!(c, Constant::Num(v) if *v == 1.0))
    .count();
  let strings = program
    .pool
    .iter()
    .filter(|c| matches!(c, Constant::Str(v) if v == "s"))
    .count();
  assert_eq!(numbers, 1);
  assert_eq!(strings, 1);
}

#[test]
fn while_loop_shape() {
  let program = lower("var i = 0; while (i < 3) { i = i + 1; }");
  let instructions: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .collect();

  let exit = instructions
    .iter()
    .find(|i| i.opcode == Opcode::JumpIfFalse)
    .unwrap();
  let back = instructions.iter().find(|i| i.opcode == Opcode::Jump).unwrap();

  // the back-jump is negative and lands on the loop test
  let back_slot = back.operands[0] as usize;
  assert!(program.pool[back_slot].as_offset().unwrap() < 0);
  let test_pc = jump_target(&program, *back);
  assert!(test_pc < back.pc as i32);

  // the exit jump lands right past the back-jump
  assert_eq!(jump_target(&program, *exit), back.pc as i32 + 2);
}

#[test]
fn logical_and_skips_rhs() {
  let program = lower("a && b;");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::LoadVar,
      Opcode::Duplicate,
      Opcode::JumpIfFalse,
      Opcode::Pop,
      Opcode::LoadVar,
      Opcode::Pop,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
  // the conditional jump lands after the rhs
  let jump = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .find(|i| i.opcode == Opcode::JumpIfFalse)
    .unwrap();
  let rhs_end = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .filter(|i| i.opcode == Opcode::LoadVar)
    .nth(1)
    .unwrap();
  assert_eq!(
    jump_target(&program, jump),
    rhs_end.pc as i32 + 2 // past LOAD_VAR k
  );
}

#[test]
fn coalesce_tests_against_null() {
  let program = lower("a ?? b;");
  let ops = opcodes(&program);
  assert!(ops.contains(&Opcode::Null));
  assert!(ops.contains(&Opcode::JumpIfFalse));
  assert!(!ops.contains(&Opcode::LogicalOp));
}

#[test]
fn ternary_shape() {
  let program = lower("1 ? 2 : 3;");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::LoadConst,
      Opcode::JumpIfFalse,
      Opcode::LoadConst,
      Opcode::Jump,
      Opcode::LoadConst,
      Opcode::Pop,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
}

#[test]
fn object_literal_stores_and_pops_each_property() {
  let program = lower("var o = {a: 1, b: 2};");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::CreateObject,
      Opcode::Duplicate,
      Opcode::LoadConst,
      Opcode::StoreProperty,
      Opcode::Pop,
      Opcode::Duplicate,
      Opcode::LoadConst,
      Opcode::StoreProperty,
      Opcode::Pop,
      Opcode::StoreVar,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
}

#[test]
fn array_literal_pushes_each_element() {
  let program = lower("[1, 2];");
  assert_eq!(
    opcodes(&program),
    [
      Opcode::CreateArray,
      Opcode::Duplicate,
      Opcode::LoadConst,
      Opcode::ArrayPush,
      Opcode::Pop,
      Opcode::Duplicate,
      Opcode::LoadConst,
      Opcode::ArrayPush,
      Opcode::Pop,
      Opcode::Pop,
      Opcode::Undefined,
      Opcode::Return,
    ]
  );
}

#[test]
fn function_declaration_reifies_and_stores() {
  let program = lower("function f(x) { return x; }");
  assert_eq!(
    opcodes(&program),
    [Opcode::CreateFunction, Opcode::StoreVar, Opcode::Undefined, Opcode::Return]
  );
  assert!(program
    .pool
    .iter()
    .any(|c| matches!(c, Constant::Params(p) if p == &["x".to_string()])));
  assert!(program
    .pool
    .iter()
    .any(|c| matches!(c, Constant::Body(b) if b.contains("return x;"))));
}

#[test]
fn try_catch_finally_shape() {
  let program = lower("try { 1; } catch (e) { 2; } finally { 3; }");
  let instructions: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .collect();
  assert_eq!(instructions[0].opcode, Opcode::TryBegin);

  let catch_slot = instructions[0].operands[0] as usize;
  let finally_slot = instructions[0].operands[1] as usize;
  let catch_pc = 1 + program.pool[catch_slot].as_offset().unwrap();
  let finally_pc = 1 + program.pool[finally_slot].as_offset().unwrap();

  let catch = instructions
    .iter()
    .find(|i| i.opcode == Opcode::Catch)
    .unwrap();
  assert_eq!(catch_pc, catch.pc as i32);
  // the normal path jumps straight to the finally block
  let jump = instructions.iter().find(|i| i.opcode == Opcode::Jump).unwrap();
  assert_eq!(jump_target(&program, *jump), finally_pc);
  assert!(instructions.iter().any(|i| i.opcode == Opcode::TryEnd));
}

#[test]
fn switch_dispatch_keeps_discriminant_on_stack() {
  let program = lower("switch (2) { case 1: 10; break; case 2: 20; default: 30; }");
  let instructions: Vec<_> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap())
    .collect();

  // one strict-equality test per non-default arm
  let tests = instructions
    .iter()
    .filter(|i| i.opcode == Opcode::BinaryOp)
    .count();
  assert_eq!(tests, 2);
  let dups = instructions
    .iter()
    .filter(|i| i.opcode == Opcode::Duplicate)
    .count();
  assert_eq!(dups, 2);
  // every arm entry pops the discriminant: 3 entries plus none on the
  // miss path (the default entry handles it)
  assert!(instructions.iter().filter(|i| i.opcode == Opcode::Pop).count() >= 3);
}

#[test]
fn misplaced_break_is_rejected_in_strict_mode() {
  let module = syntax::parse("break;").unwrap();
  assert!(matches!(
    emit(&module, Mode::Strict),
    Err(EmitError::MisplacedControl { keyword: "break", .. })
  ));
}

#[test]
fn misplaced_break_is_dropped_in_lossy_mode() {
  let module = syntax::parse("break;").unwrap();
  let program = emit(&module, Mode::Lossy).unwrap();
  assert_eq!(opcodes(&program), [Opcode::Undefined, Opcode::Return]);
}

#[test]
fn stream_always_terminates_in_return() {
  for src in ["", "1;", "var x = 1;", "if (1) { 2; }"] {
    let program = lower(src);
    let last = disasm::instructions(&program.bytecode)
      .map(|i| i.unwrap())
      .last()
      .unwrap();
    assert_eq!(last.opcode, Opcode::Return);
  }
}

#[test]
fn every_jump_target_is_an_instruction_boundary() {
  let program = lower(
    "for (var i = 0; i < 3; i = i + 1) { if (i === 1) { continue; } } \
     switch (1) { case 1: 1; break; default: 2; } \
     try { 1 ? 2 : 3; } catch (e) { e && 1; } finally { 0; }",
  );
  let starts: std::collections::HashSet<usize> = disasm::instructions(&program.bytecode)
    .map(|i| i.unwrap().pc)
    .collect();
  for instruction in disasm::instructions(&program.bytecode) {
    let instruction = instruction.unwrap();
    if instruction.opcode.is_jump() || instruction.opcode == Opcode::TryBegin {
      for &operand in instruction.operands {
        let displacement = program.pool[operand as usize].as_offset().unwrap();
        let target = (instruction.pc as i32 + 1 + displacement) as usize;
        assert!(
          starts.contains(&target) || target == program.bytecode.len(),
          "target {target} of the {} at {} is inside an instruction",
          instruction.opcode.name(),
          instruction.pc
        );
      }
    }
  }
}

#[test]
fn operand_counts_round_trip_through_the_decoder() {
  let program = lower(
    "var x = {a: [1, 2]}; function f(n) { return n * 2; } \
     try { f(x.a[0]); } catch (e) { e; } \
     switch (x.a[1]) { case 2: 1; default: 0; } \
     for (var i = 0; i < 2; i = i + 1) { i && x; }",
  );
  let consumed: usize = disasm::instructions(&program.bytecode)
    .map(|i| 1 + i.unwrap().opcode.operand_count())
    .sum();
  assert_eq!(consumed, program.bytecode.len());
  // every pool-indexed operand is in range
  for instruction in disasm::instructions(&program.bytecode) {
    let instruction = instruction.unwrap();
    if !instruction.opcode.has_raw_operand() {
      for &operand in instruction.operands {
        assert!((operand as usize) < program.pool.len());
      }
    }
  }
  // no reserved slots survive emission
  assert!(!program.pool.iter().any(|c| matches!(c, Constant::Reserved)));
}
