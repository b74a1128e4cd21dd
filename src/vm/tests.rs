use indoc::indoc;

use super::*;
use crate::bytecode::Program;
use crate::codec::{self, SealOptions};
use crate::emit;
use crate::syntax;

/// Full pipeline: parse, lower, seal with the default options (string
/// encoding, padding, AES), then decrypt and dispatch.
fn compile(src: &str) -> codec::SealedProgram {
  let module = match syntax::parse(src) {
    Ok(module) => module,
    Err(errors) => panic!("parse failed: {errors:?}"),
  };
  let program = emit::emit(&module, emit::Mode::Strict).unwrap();
  codec::seal(program, &SealOptions::default())
}

fn eval(src: &str) -> Value {
  match Vm::new().eval(&compile(src)) {
    Ok(value) => value,
    Err(e) => panic!("execution failed: {e}"),
  }
}

fn eval_err(src: &str) -> VmError {
  match Vm::new().eval(&compile(src)) {
    Ok(value) => panic!("expected failure, got {value:?}"),
    Err(e) => e,
  }
}

#[test]
fn arithmetic() {
  assert_eq!(eval("1+2*3;"), Value::Num(7.0));
  assert_eq!(eval("(1+2)*3;"), Value::Num(9.0));
  assert_eq!(eval("7 % 4;"), Value::Num(3.0));
  assert_eq!(eval("1 / 0;"), Value::Num(f64::INFINITY));
}

#[test]
fn variables_and_assignment() {
  assert_eq!(eval("var x = 10; x = x + 5; x;"), Value::Num(15.0));
  assert_eq!(eval("var x; x;"), Value::Undefined);
  assert_eq!(eval("var a = 1, b = 2; a + b;"), Value::Num(3.0));
}

#[test]
fn assignment_is_an_expression() {
  assert_eq!(eval("var x; var y = (x = 4); x + y;"), Value::Num(8.0));
}

#[test]
fn objects() {
  assert_eq!(eval("var o = {a:1,b:2}; o.a + o.b;"), Value::Num(3.0));
  assert_eq!(eval("var o = {}; o.x = 5; o.x;"), Value::Num(5.0));
  assert_eq!(eval("var o = {a:1}; o.missing;"), Value::Undefined);
  // STORE_PROPERTY pushes the stored value
  assert_eq!(eval("var o = {}; (o.x = 3) + 1;"), Value::Num(4.0));
}

#[test]
fn arrays() {
  assert_eq!(eval("var a = [1,2,3]; a[1];"), Value::Num(2.0));
  assert_eq!(eval("var a = [1,2,3]; a.length;"), Value::Num(3.0));
  assert_eq!(eval("var a = []; a[2] = 9; a.length;"), Value::Num(3.0));
  // STORE_INDEX pushes the stored value
  assert_eq!(eval("var a = [0]; (a[0] = 7) + 1;"), Value::Num(8.0));
  assert_eq!(
    eval("var a = [1]; a.push(2); a.join(\"-\");"),
    Value::str("1-2")
  );
}

#[test]
fn functions_compile_at_call_time() {
  assert_eq!(eval("function f(x){return x*x;} f(4);"), Value::Num(16.0));
  assert_eq!(eval("var f = function(a, b) { return a - b; }; f(9, 4);"), Value::Num(5.0));
  assert_eq!(eval("var sq = x => x * x; sq(6);"), Value::Num(36.0));
  // missing arguments arrive as undefined
  assert_eq!(eval("function f(a, b) { return b; } typeof f(1);"), Value::str("undefined"));
}

#[test]
fn branches() {
  assert_eq!(eval("if (1<2) { 1 } else { 2 }"), Value::Num(1.0));
  assert_eq!(eval("if (1>2) { 1 } else { 2 }"), Value::Num(2.0));
  assert_eq!(eval("var x = 5; if (x > 3) { x = 0; } x;"), Value::Num(0.0));
  assert_eq!(eval("1 ? 2 : 3;"), Value::Num(2.0));
  assert_eq!(eval("0 ? 2 : 3;"), Value::Num(3.0));
}

#[test]
fn while_loops() {
  let src = indoc! {"
    var sum = 0;
    var i = 1;
    while (i <= 10) {
      sum = sum + i;
      i = i + 1;
    }
    sum;
  "};
  assert_eq!(eval(src), Value::Num(55.0));
}

#[test]
fn for_loops_with_break_and_continue() {
  let src = indoc! {"
    var sum = 0;
    for (var i = 0; i < 100; i = i + 1) {
      if (i % 2 === 1) { continue; }
      if (i >= 10) { break; }
      sum = sum + i;
    }
    sum;
  "};
  // 0 + 2 + 4 + 6 + 8
  assert_eq!(eval(src), Value::Num(20.0));
}

#[test]
fn nested_loops_break_innermost() {
  let src = indoc! {"
    var count = 0;
    for (var i = 0; i < 3; i = i + 1) {
      for (var j = 0; j < 10; j = j + 1) {
        if (j === 2) { break; }
        count = count + 1;
      }
    }
    count;
  "};
  assert_eq!(eval(src), Value::Num(6.0));
}

#[test]
fn switch_matches_and_falls_through() {
  let src = indoc! {r#"
    var r = [];
    var x = 1;
    switch (x) {
      case 0: r.push("a");
      case 1: r.push("b");
      case 2: r.push("c"); break;
      default: r.push("d");
    }
    r.join("");
  "#};
  assert_eq!(eval(src), Value::str("bc"));
}

#[test]
fn switch_default_arm() {
  let src = indoc! {r#"
    var r = "";
    switch (42) {
      case 1: r = "one"; break;
      default: r = "other";
    }
    r;
  "#};
  assert_eq!(eval(src), Value::str("other"));
}

#[test]
fn switch_without_match_or_default_is_a_no_op() {
  assert_eq!(eval("switch (9) { case 1: 1; } 5;"), Value::Num(5.0));
}

#[test]
fn try_catch_finally() {
  let src = indoc! {r#"
    var r = [];
    try {
      r.push(1);
      throw "boom";
    } catch (e) {
      r.push(e);
    } finally {
      r.push(2);
    }
    r.join(",");
  "#};
  assert_eq!(eval(src), Value::str("1,boom,2"));
}

#[test]
fn catch_binds_runtime_errors_too() {
  let src = indoc! {r#"
    var caught = "";
    try { null.x; } catch (e) { caught = "caught"; }
    caught;
  "#};
  assert_eq!(eval(src), Value::str("caught"));
}

#[test]
fn throw_inside_catch_unwinds_to_the_outer_frame() {
  let src = indoc! {r#"
    var msg = "";
    try {
      try { throw "inner"; } catch (e) { throw "outer"; }
    } catch (e) {
      msg = e;
    }
    msg;
  "#};
  assert_eq!(eval(src), Value::str("outer"));
}

#[test]
fn finally_without_catch_reruns_the_throw() {
  let src = indoc! {r#"
    var r = [];
    try {
      try { throw "x"; } finally { r.push("cleanup"); }
    } catch (e) {
      r.push(e);
    }
    r.join(",");
  "#};
  assert_eq!(eval(src), Value::str("cleanup,x"));
}

#[test]
fn breaking_out_of_a_try_region_closes_its_frame() {
  let src = indoc! {r#"
    var r = [];
    for (var i = 0; i < 3; i = i + 1) {
      try {
        if (i === 1) { break; }
        r.push(i);
      } catch (e) {
        r.push("caught");
      }
    }
    try { null.x; } catch (e) { r.push("after"); }
    r.join(",");
  "#};
  // a stale try frame from the loop would swallow the later exception
  assert_eq!(eval(src), Value::str("0,after"));
}

#[test]
fn uncaught_throw_propagates() {
  match eval_err("throw 42;") {
    VmError::Thrown(value) => assert_eq!(value, Value::Num(42.0)),
    other => panic!("expected a thrown value, got {other}"),
  }
}

#[test]
fn closures_capture_their_defining_scope() {
  let src = indoc! {"
    function counter() {
      var n = 0;
      return function() { n = n + 1; return n; };
    }
    var c = counter();
    c(); c(); c();
  "};
  assert_eq!(eval(src), Value::Num(3.0));
}

#[test]
fn sibling_closures_share_one_environment() {
  let src = indoc! {"
    function make() {
      var n = 0;
      return {
        bump: function() { n = n + 1; return n; },
        read: function() { return n; }
      };
    }
    var m = make();
    m.bump(); m.bump();
    m.read();
  "};
  assert_eq!(eval(src), Value::Num(2.0));
}

#[test]
fn recursion_works_below_the_limit() {
  let src = indoc! {"
    function fib(n) {
      if (n < 2) { return n; }
      return fib(n - 1) + fib(n - 2);
    }
    fib(10);
  "};
  assert_eq!(eval(src), Value::Num(55.0));
}

#[cfg(feature = "check-recursion-limit")]
#[test]
fn runaway_recursion_is_stopped() {
  match eval_err("function r() { return r(); } r();") {
    VmError::RecursionLimit => {}
    other => panic!("expected the recursion limit, got {other}"),
  }
}

#[test]
fn logical_operators_short_circuit() {
  let src = indoc! {"
    var log = [];
    function t() { log.push(1); return true; }
    function f() { log.push(2); return false; }
    f() && t();
    log.length;
  "};
  assert_eq!(eval(src), Value::Num(1.0));

  let src = indoc! {"
    var log = [];
    function t() { log.push(1); return true; }
    t() || t();
    log.length;
  "};
  assert_eq!(eval(src), Value::Num(1.0));
}

#[test]
fn logical_results_keep_operand_values() {
  assert_eq!(eval("0 || 5;"), Value::Num(5.0));
  assert_eq!(eval("3 && 5;"), Value::Num(5.0));
  assert_eq!(eval("0 && 5;"), Value::Num(0.0));
  assert_eq!(eval("null ?? 7;"), Value::Num(7.0));
  assert_eq!(eval("undefined ?? 7;"), Value::Num(7.0));
  // 0 is not nullish
  assert_eq!(eval("0 ?? 7;"), Value::Num(0.0));
}

#[test]
fn equality_and_relational_operators() {
  assert_eq!(eval("1 == \"1\";"), Value::Bool(true));
  assert_eq!(eval("1 === \"1\";"), Value::Bool(false));
  assert_eq!(eval("null == undefined;"), Value::Bool(true));
  assert_eq!(eval("null === undefined;"), Value::Bool(false));
  assert_eq!(eval("\"abc\" < \"abd\";"), Value::Bool(true));
  assert_eq!(eval("\"a\" in {a: 1};"), Value::Bool(true));
  assert_eq!(eval("\"b\" in {a: 1};"), Value::Bool(false));
}

#[test]
fn bitwise_operators() {
  assert_eq!(eval("5 & 3;"), Value::Num(1.0));
  assert_eq!(eval("5 | 3;"), Value::Num(7.0));
  assert_eq!(eval("5 ^ 3;"), Value::Num(6.0));
  assert_eq!(eval("1 << 4;"), Value::Num(16.0));
  assert_eq!(eval("-8 >> 1;"), Value::Num(-4.0));
  assert_eq!(eval("-1 >>> 28;"), Value::Num(15.0));
  assert_eq!(eval("~5;"), Value::Num(-6.0));
}

#[test]
fn unary_operators() {
  assert_eq!(eval("typeof 1;"), Value::str("number"));
  assert_eq!(eval("typeof \"s\";"), Value::str("string"));
  assert_eq!(eval("typeof missing;"), Value::str("undefined"));
  assert_eq!(eval("typeof {};"), Value::str("object"));
  assert_eq!(eval("void 1;"), Value::Undefined);
  assert_eq!(eval("-\"3\";"), Value::Num(-3.0));
  assert_eq!(eval("!0;"), Value::Bool(true));
}

#[test]
fn string_concatenation() {
  assert_eq!(eval("\"a\" + 1;"), Value::str("a1"));
  assert_eq!(eval("1 + \"a\";"), Value::str("1a"));
  assert_eq!(eval("\"n=\" + null;"), Value::str("n=null"));
}

#[test]
fn string_methods() {
  assert_eq!(eval("\"hello\".toUpperCase();"), Value::str("HELLO"));
  assert_eq!(eval("\"a,b,c\".split(\",\").length;"), Value::Num(3.0));
  assert_eq!(eval("\"hello\".indexOf(\"ll\");"), Value::Num(2.0));
  assert_eq!(eval("\"hello\".substring(1, 3);"), Value::str("el"));
  assert_eq!(eval("\"hello\"[1];"), Value::str("e"));
}

#[test]
fn intrinsics() {
  assert_eq!(eval("Math.floor(3.7);"), Value::Num(3.0));
  assert_eq!(eval("Math.max(1, 9, 4);"), Value::Num(9.0));
  assert_eq!(eval("Math.pow(2, 10);"), Value::Num(1024.0));
  assert_eq!(eval("parseInt(\"2f\", 16);"), Value::Num(47.0));
  assert_eq!(eval("parseFloat(\"2.5em\");"), Value::Num(2.5));
  assert_eq!(eval("isNaN(\"x\");"), Value::Bool(true));
  assert_eq!(eval("String(12);"), Value::str("12"));
  assert_eq!(eval("Number(\"8\");"), Value::Num(8.0));
  assert_eq!(eval("Array(3).length;"), Value::Num(3.0));
}

#[test]
fn json_round_trip() {
  assert_eq!(
    eval("JSON.stringify({a: [1, 2], b: \"x\"});"),
    Value::str(r#"{"a":[1,2],"b":"x"}"#)
  );
  assert_eq!(eval("JSON.parse(\"[1,2,3]\")[2];"), Value::Num(3.0));
  assert_eq!(eval("JSON.parse(JSON.stringify({n: 5})).n;"), Value::Num(5.0));
}

#[test]
fn constructors_bind_this_and_instanceof() {
  let src = indoc! {"
    function Point(x, y) {
      this.x = x;
      this.y = y;
    }
    var p = new Point(3, 4);
    p.x + p.y;
  "};
  assert_eq!(eval(src), Value::Num(7.0));

  let src = indoc! {"
    function Point(x, y) { this.x = x; }
    var p = new Point(1, 2);
    p instanceof Point ? 1 : 0;
  "};
  assert_eq!(eval(src), Value::Num(1.0));
}

#[test]
fn top_level_return_wins_over_the_last_expression() {
  assert_eq!(eval("return 99; 1;"), Value::Num(99.0));
}

#[test]
fn logical_op_handler_runs_post_evaluation() {
  // the lowerer emits short-circuit branches instead, but the opcode is
  // part of the instruction set and must dispatch
  let program = Program {
    bytecode: vec![0x01, 0x00, 0x01, 0x01, 0x16, 0x02, 0x06],
    pool: vec![
      Constant::Bool(false),
      Constant::Num(5.0),
      Constant::Str("||".into()),
    ],
  };
  assert_eq!(Vm::new().run(&program).unwrap(), Value::Num(5.0));
}

#[test]
fn gap_bytes_are_bad_opcodes() {
  for byte in [0x17u8, 0x18, 0x1d, 0x21, 0x00] {
    let program = Program {
      bytecode: vec![byte],
      pool: vec![],
    };
    match Vm::new().run(&program) {
      Err(VmError::BadOpcode(b)) => assert_eq!(b, byte),
      other => panic!("expected BadOpcode, got {other:?}"),
    }
  }
}

#[test]
fn unknown_operator_is_rejected() {
  let program = Program {
    bytecode: vec![0x01, 0x00, 0x01, 0x00, 0x04, 0x01, 0x06],
    pool: vec![Constant::Num(1.0), Constant::Str("@@".into())],
  };
  match Vm::new().run(&program) {
    Err(VmError::BadOperator(op)) => assert_eq!(op, "@@"),
    other => panic!("expected BadOperator, got {other:?}"),
  }
}

#[test]
fn popping_an_empty_stack_underflows() {
  let program = Program {
    bytecode: vec![0x0e],
    pool: vec![],
  };
  assert!(matches!(
    Vm::new().run(&program),
    Err(VmError::StackUnderflow)
  ));
}
