//! Fresh-identifier generation and identifier collection.
//!
//! Every emission allocates one fresh name per interpreter-internal role so
//! two runs over the same input produce lexically distinct output. The
//! collector walks the AST once and records every identifier the program
//! mentions; generated names must avoid all of them.

use indexmap::IndexSet;
use rand::Rng;

use crate::syntax::ast;

/// Host-intrinsic names the lowerer must never rename or shadow, and which
/// the interpreter seeds into scope before dispatch begins.
pub const RESERVED_INTRINSICS: &[&str] = &[
  "Math",
  "JSON",
  "Date",
  "String",
  "Number",
  "Boolean",
  "Array",
  "Object",
  "console",
  "parseInt",
  "parseFloat",
  "isNaN",
  "isFinite",
  "NaN",
  "Infinity",
  "undefined",
  "Error",
];

const FIRST_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz$_";
const REST_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789$_";

/// Allocates unique random identifiers of a fixed length.
pub struct NameManager {
  length: usize,
  issued: IndexSet<String>,
  avoid: IndexSet<String>,
}

impl NameManager {
  pub fn new(length: usize, avoid: IndexSet<String>) -> Self {
    Self {
      length: length.max(2),
      issued: IndexSet::new(),
      avoid,
    }
  }

  /// Generate a fresh name, distinct from every previously issued name,
  /// every collected source identifier, and every reserved intrinsic.
  pub fn fresh(&mut self, rng: &mut impl Rng) -> String {
    loop {
      let mut name = String::with_capacity(self.length);
      name.push(FIRST_CHARS[rng.gen_range(0..FIRST_CHARS.len())] as char);
      for _ in 1..self.length {
        name.push(REST_CHARS[rng.gen_range(0..REST_CHARS.len())] as char);
      }
      if self.issued.contains(&name)
        || self.avoid.contains(&name)
        || RESERVED_INTRINSICS.contains(&name.as_str())
      {
        continue;
      }
      self.issued.insert(name.clone());
      return name;
    }
  }

  pub fn issued(&self) -> &IndexSet<String> {
    &self.issued
  }
}

/// Every identifier mentioned by a module, in first-occurrence order.
#[derive(Default)]
pub struct IdentifierSet {
  names: IndexSet<String>,
}

impl IdentifierSet {
  pub fn contains(&self, name: &str) -> bool {
    self.names.contains(name)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// Collected identifiers that name host intrinsics; these must survive
  /// obfuscation untouched.
  pub fn reserved_hits(&self) -> impl Iterator<Item = &str> {
    self
      .names
      .iter()
      .map(|n| n.as_str())
      .filter(|n| RESERVED_INTRINSICS.contains(n))
  }

  pub fn into_names(self) -> IndexSet<String> {
    self.names
  }

  fn record(&mut self, name: &str) {
    if !self.names.contains(name) {
      self.names.insert(name.to_string());
    }
  }
}

/// Pre-order walk recording every identifier occurrence: declarations,
/// references, parameters, and property names.
pub fn collect(module: &ast::Module<'_>) -> IdentifierSet {
  let mut set = IdentifierSet::default();
  for stmt in &module.body {
    collect_stmt(&mut set, stmt);
  }
  set
}

fn collect_stmt(set: &mut IdentifierSet, stmt: &ast::Stmt<'_>) {
  match &**stmt {
    ast::StmtKind::Var(decl) => {
      for (name, init) in &decl.decls {
        set.record(name);
        if let Some(init) = init {
          collect_expr(set, init);
        }
      }
    }
    ast::StmtKind::Func(func) => collect_func(set, func),
    ast::StmtKind::If(stmt) => {
      collect_expr(set, &stmt.cond);
      collect_stmt(set, &stmt.then);
      if let Some(otherwise) = &stmt.otherwise {
        collect_stmt(set, otherwise);
      }
    }
    ast::StmtKind::While(stmt) => {
      collect_expr(set, &stmt.cond);
      collect_stmt(set, &stmt.body);
    }
    ast::StmtKind::For(stmt) => {
      match &stmt.init {
        Some(ast::ForInit::Var(decl)) => {
          for (name, init) in &decl.decls {
            set.record(name);
            if let Some(init) = init {
              collect_expr(set, init);
            }
          }
        }
        Some(ast::ForInit::Expr(expr)) => collect_expr(set, expr),
        None => {}
      }
      if let Some(cond) = &stmt.cond {
        collect_expr(set, cond);
      }
      if let Some(update) = &stmt.update {
        collect_expr(set, update);
      }
      collect_stmt(set, &stmt.body);
    }
    ast::StmtKind::Switch(stmt) => {
      collect_expr(set, &stmt.disc);
      for arm in &stmt.arms {
        if let Some(test) = &arm.test {
          collect_expr(set, test);
        }
        for stmt in &arm.body {
          collect_stmt(set, stmt);
        }
      }
    }
    ast::StmtKind::Try(stmt) => {
      for stmt in &stmt.body {
        collect_stmt(set, stmt);
      }
      if let Some((name, body)) = &stmt.catch {
        set.record(name);
        for stmt in body {
          collect_stmt(set, stmt);
        }
      }
      if let Some(body) = &stmt.finally {
        for stmt in body {
          collect_stmt(set, stmt);
        }
      }
    }
    ast::StmtKind::Throw(expr) => collect_expr(set, expr),
    ast::StmtKind::Return(expr) => {
      if let Some(expr) = expr {
        collect_expr(set, expr);
      }
    }
    ast::StmtKind::Break | ast::StmtKind::Continue => {}
    ast::StmtKind::Block(body) => {
      for stmt in body {
        collect_stmt(set, stmt);
      }
    }
    ast::StmtKind::Expr(expr) => collect_expr(set, expr),
  }
}

fn collect_func(set: &mut IdentifierSet, func: &ast::Func<'_>) {
  if let Some(name) = &func.name {
    set.record(name);
  }
  for param in &func.params {
    set.record(param);
  }
}

fn collect_expr(set: &mut IdentifierSet, expr: &ast::Expr<'_>) {
  match &**expr {
    ast::ExprKind::Literal(_) | ast::ExprKind::This => {}
    ast::ExprKind::GetVar(get) => set.record(&get.name),
    ast::ExprKind::SetVar(assign) => {
      set.record(&assign.name);
      collect_expr(set, &assign.value);
    }
    ast::ExprKind::GetField(get) => {
      collect_expr(set, &get.target);
      set.record(&get.name);
    }
    ast::ExprKind::SetField(assign) => {
      collect_expr(set, &assign.target);
      set.record(&assign.name);
      collect_expr(set, &assign.value);
    }
    ast::ExprKind::GetIndex(get) => {
      collect_expr(set, &get.target);
      collect_expr(set, &get.key);
    }
    ast::ExprKind::SetIndex(assign) => {
      collect_expr(set, &assign.target);
      collect_expr(set, &assign.key);
      collect_expr(set, &assign.value);
    }
    ast::ExprKind::Binary(binary) => {
      collect_expr(set, &binary.left);
      collect_expr(set, &binary.right);
    }
    ast::ExprKind::Logical(logical) => {
      collect_expr(set, &logical.left);
      collect_expr(set, &logical.right);
    }
    ast::ExprKind::Unary(unary) => collect_expr(set, &unary.expr),
    ast::ExprKind::Ternary(ternary) => {
      collect_expr(set, &ternary.cond);
      collect_expr(set, &ternary.then);
      collect_expr(set, &ternary.otherwise);
    }
    ast::ExprKind::Call(call) | ast::ExprKind::New(call) => {
      collect_expr(set, &call.target);
      for arg in &call.args {
        collect_expr(set, arg);
      }
    }
    ast::ExprKind::Func(func) => collect_func(set, func),
    ast::ExprKind::Array(items) => {
      for item in items {
        collect_expr(set, item);
      }
    }
    ast::ExprKind::Object(entries) => {
      for (key, value) in entries {
        set.record(key);
        collect_expr(set, value);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng;

  use super::*;
  use crate::syntax;

  #[test]
  fn collects_in_first_occurrence_order() {
    let module = syntax::parse("var a = b; function f(c) {} a.prop;").unwrap();
    let set = collect(&module);
    let names: Vec<_> = set.names.iter().cloned().collect();
    assert_eq!(names, ["a", "b", "f", "c", "prop"]);
  }

  #[test]
  fn reserved_hits_flags_intrinsics() {
    let module = syntax::parse("Math.floor(JSON.parse(x));").unwrap();
    let set = collect(&module);
    let hits: Vec<_> = set.reserved_hits().collect();
    assert!(hits.contains(&"Math"));
    assert!(hits.contains(&"JSON"));
    assert!(!hits.contains(&"x"));
  }

  #[test]
  fn fresh_names_are_unique_and_well_formed() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut names = NameManager::new(6, IndexSet::new());
    let mut seen = IndexSet::new();
    for _ in 0..500 {
      let name = names.fresh(&mut rng);
      assert_eq!(name.len(), 6);
      let first = name.as_bytes()[0];
      assert!(first.is_ascii_alphabetic() || first == b'$' || first == b'_');
      assert!(seen.insert(name));
    }
  }

  #[test]
  fn fresh_names_avoid_collected_identifiers() {
    let mut avoid = IndexSet::new();
    for a in FIRST_CHARS {
      for b in REST_CHARS {
        avoid.insert(format!("{}{}", *a as char, *b as char));
      }
    }
    // remove a single name, the only one the manager can now produce
    avoid.shift_remove("zz");
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut names = NameManager::new(2, avoid);
    assert_eq!(names.fresh(&mut rng), "zz");
  }
}
