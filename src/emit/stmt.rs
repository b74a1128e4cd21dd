use super::*;

impl State {
  pub(super) fn emit_stmt(&mut self, stmt: &ast::Stmt<'_>) -> Result<(), EmitError> {
    match &**stmt {
      ast::StmtKind::Var(v) => self.emit_var_stmt(v),
      ast::StmtKind::Func(v) => self.emit_func_stmt(v),
      ast::StmtKind::If(v) => self.emit_if_stmt(v),
      ast::StmtKind::While(v) => self.emit_while_stmt(v),
      ast::StmtKind::For(v) => self.emit_for_stmt(v),
      ast::StmtKind::Switch(v) => self.emit_switch_stmt(v),
      ast::StmtKind::Try(v) => self.emit_try_stmt(v),
      ast::StmtKind::Throw(v) => self.emit_throw_stmt(v),
      ast::StmtKind::Return(v) => self.emit_return_stmt(v.as_deref()),
      ast::StmtKind::Break => self.emit_break_stmt(stmt.span),
      ast::StmtKind::Continue => self.emit_continue_stmt(stmt.span),
      ast::StmtKind::Block(v) => self.emit_stmt_list(v),
      ast::StmtKind::Expr(v) => self.emit_expr_stmt(v),
    }
  }

  fn emit_stmt_list(&mut self, list: &[ast::Stmt<'_>]) -> Result<(), EmitError> {
    for stmt in list {
      self.emit_stmt(stmt)?;
    }
    Ok(())
  }

  /// `STORE_VAR` consumes its value, so declarations need no trailing POP.
  fn emit_var_stmt(&mut self, stmt: &ast::VarDecl<'_>) -> Result<(), EmitError> {
    for (name, init) in &stmt.decls {
      match init {
        Some(init) => self.emit_expr(init)?,
        None => self.builder.emit(Opcode::Undefined),
      }
      let name = self.constant(Constant::Name(name.to_string()))?;
      self.builder.emit_with(Opcode::StoreVar, &[name]);
    }
    Ok(())
  }

  fn emit_func_stmt(&mut self, stmt: &ast::Func<'_>) -> Result<(), EmitError> {
    self.emit_func(stmt)?;
    let name = stmt
      .name
      .as_ref()
      .expect("function statements always carry a name");
    let name = self.constant(Constant::Name(name.to_string()))?;
    self.builder.emit_with(Opcode::StoreVar, &[name]);
    Ok(())
  }

  fn emit_if_stmt(&mut self, stmt: &ast::If<'_>) -> Result<(), EmitError> {
    self.emit_expr(&stmt.cond)?;
    let otherwise = self.builder.label("else");
    self.builder.emit_jump(Opcode::JumpIfFalse, &otherwise)?;
    self.emit_stmt(&stmt.then)?;
    match &stmt.otherwise {
      Some(alt) => {
        let end = self.builder.label("end");
        self.builder.emit_jump(Opcode::Jump, &end)?;
        self.builder.bind_label(&otherwise);
        self.emit_stmt(alt)?;
        self.builder.bind_label(&end);
      }
      None => self.builder.bind_label(&otherwise),
    }
    Ok(())
  }

  fn emit_while_stmt(&mut self, stmt: &ast::While<'_>) -> Result<(), EmitError> {
    let test = self.builder.pc();
    self.emit_expr(&stmt.cond)?;
    let end = self.builder.label("end");
    self.builder.emit_jump(Opcode::JumpIfFalse, &end)?;

    self.breakables.push(Breakable {
      brk: end,
      cont: Some(ContinueTarget::Backward(test)),
      try_depth: self.try_depth,
    });
    self.emit_stmt(&stmt.body)?;
    let end = self.breakables.pop().expect("loop context pushed above").brk;

    self.builder.emit_jump_back(Opcode::Jump, test)?;
    self.builder.bind_label(&end);
    Ok(())
  }

  /// Classic `for` desugars to a while loop with the update clause between
  /// the body and the back-jump; `continue` targets the update clause.
  fn emit_for_stmt(&mut self, stmt: &ast::For<'_>) -> Result<(), EmitError> {
    match &stmt.init {
      Some(ast::ForInit::Var(decl)) => self.emit_var_stmt(decl)?,
      Some(ast::ForInit::Expr(expr)) => {
        self.emit_expr(expr)?;
        self.builder.emit(Opcode::Pop);
      }
      None => {}
    }

    let test = self.builder.pc();
    let end = self.builder.label("end");
    if let Some(cond) = &stmt.cond {
      self.emit_expr(cond)?;
      self.builder.emit_jump(Opcode::JumpIfFalse, &end)?;
    }

    let update_label = self.builder.label("update");
    self.breakables.push(Breakable {
      brk: end,
      cont: Some(ContinueTarget::Forward(update_label)),
      try_depth: self.try_depth,
    });
    self.emit_stmt(&stmt.body)?;
    let context = self.breakables.pop().expect("loop context pushed above");
    let end = context.brk;
    let Some(ContinueTarget::Forward(update_label)) = context.cont else {
      unreachable!("for loops always use a forward continue target");
    };

    self.builder.bind_label(&update_label);
    if let Some(update) = &stmt.update {
      self.emit_expr(update)?;
      self.builder.emit(Opcode::Pop);
    }
    self.builder.emit_jump_back(Opcode::Jump, test)?;
    self.builder.bind_label(&end);
    Ok(())
  }

  /// The discriminant rides the stack through the dispatch ladder. Every
  /// arm entry starts by popping it; fallthrough jumps past the next arm's
  /// POP so the bodies run back to back exactly as written.
  fn emit_switch_stmt(&mut self, stmt: &ast::Switch<'_>) -> Result<(), EmitError> {
    self.emit_expr(&stmt.disc)?;

    let end = self.builder.label("end");
    let entries: Vec<Label> = stmt.arms.iter().map(|_| self.builder.label("arm")).collect();
    let bodies: Vec<Label> = stmt.arms.iter().map(|_| self.builder.label("body")).collect();

    let eq = self.constant(Constant::Str("===".into()))?;
    let mut default = None;
    for (i, arm) in stmt.arms.iter().enumerate() {
      match &arm.test {
        Some(test) => {
          self.builder.emit(Opcode::Duplicate);
          self.emit_expr(test)?;
          self.builder.emit_with(Opcode::BinaryOp, &[eq]);
          self.builder.emit_jump(Opcode::JumpIfTrue, &entries[i])?;
        }
        None => default = Some(i),
      }
    }
    match default {
      // the default entry pops the discriminant itself
      Some(i) => self.builder.emit_jump(Opcode::Jump, &entries[i])?,
      None => {
        self.builder.emit(Opcode::Pop);
        self.builder.emit_jump(Opcode::Jump, &end)?;
      }
    }

    self.breakables.push(Breakable {
      brk: end,
      cont: None,
      try_depth: self.try_depth,
    });
    for (i, arm) in stmt.arms.iter().enumerate() {
      self.builder.bind_label(&entries[i]);
      self.builder.emit(Opcode::Pop);
      self.builder.bind_label(&bodies[i]);
      self.emit_stmt_list(&arm.body)?;
      if i + 1 < stmt.arms.len() {
        self.builder.emit_jump(Opcode::Jump, &bodies[i + 1])?;
      }
    }
    let end = self.breakables.pop().expect("switch context pushed above").brk;
    self.builder.bind_label(&end);
    Ok(())
  }

  /// Layout: `TRY_BEGIN c,f; body; TRY_END; JUMP f; c: CATCH k; POP;
  /// catch-body; f: finally-body`. A catch-less try synthesizes a handler
  /// that runs the finally body and rethrows.
  fn emit_try_stmt(&mut self, stmt: &ast::Try<'_>) -> Result<(), EmitError> {
    let catch = self.builder.label("catch");
    let finally = self.builder.label("finally");

    self.builder.emit_try_begin(&catch, &finally)?;
    self.try_depth += 1;
    self.emit_stmt_list(&stmt.body)?;
    self.builder.emit(Opcode::TryEnd);
    self.try_depth -= 1;
    self.builder.emit_jump(Opcode::Jump, &finally)?;

    self.builder.bind_label(&catch);
    match &stmt.catch {
      Some((name, body)) => {
        let name = self.constant(Constant::Name(name.to_string()))?;
        self.builder.emit_with(Opcode::Catch, &[name]);
        self.builder.emit(Opcode::Pop);
        self.emit_stmt_list(body)?;
      }
      None => {
        // exception is on the stack; run the cleanup, then rethrow
        let body = stmt
          .finally
          .as_ref()
          .expect("the parser requires catch or finally");
        self.emit_stmt_list(body)?;
        self.builder.emit(Opcode::Throw);
      }
    }

    self.builder.bind_label(&finally);
    if let Some(body) = &stmt.finally {
      self.emit_stmt_list(body)?;
    }
    Ok(())
  }

  fn emit_throw_stmt(&mut self, expr: &ast::Expr<'_>) -> Result<(), EmitError> {
    self.emit_expr(expr)?;
    self.builder.emit(Opcode::Throw);
    Ok(())
  }

  fn emit_return_stmt(&mut self, expr: Option<&ast::Expr<'_>>) -> Result<(), EmitError> {
    match expr {
      Some(expr) => self.emit_expr(expr)?,
      None => self.builder.emit(Opcode::Undefined),
    }
    self.builder.emit(Opcode::Return);
    Ok(())
  }

  fn emit_break_stmt(&mut self, span: crate::span::Span) -> Result<(), EmitError> {
    match self.breakables.last() {
      Some(context) => {
        // close the frames of any try regions the jump leaves
        for _ in context.try_depth..self.try_depth {
          self.builder.emit(Opcode::TryEnd);
        }
        self.builder.emit_jump(Opcode::Jump, &context.brk)?;
        Ok(())
      }
      None => {
        let error = EmitError::MisplacedControl {
          keyword: "break",
          span,
        };
        match self.mode {
          Mode::Strict => Err(error),
          Mode::Lossy => {
            log::warn!("{error}; ignoring");
            Ok(())
          }
        }
      }
    }
  }

  fn emit_continue_stmt(&mut self, span: crate::span::Span) -> Result<(), EmitError> {
    let context = self.breakables.iter().rev().find(|c| c.cont.is_some());
    match context {
      Some(context) => {
        for _ in context.try_depth..self.try_depth {
          self.builder.emit(Opcode::TryEnd);
        }
        match context.cont.as_ref().expect("filtered on cont above") {
          ContinueTarget::Backward(pc) => {
            let pc = *pc;
            self.builder.emit_jump_back(Opcode::Jump, pc)?;
          }
          ContinueTarget::Forward(label) => {
            self.builder.emit_jump(Opcode::Jump, label)?;
          }
        }
        Ok(())
      }
      None => {
        let error = EmitError::MisplacedControl {
          keyword: "continue",
          span,
        };
        match self.mode {
          Mode::Strict => Err(error),
          Mode::Lossy => {
            log::warn!("{error}; ignoring");
            Ok(())
          }
        }
      }
    }
  }

  fn emit_expr_stmt(&mut self, expr: &ast::Expr<'_>) -> Result<(), EmitError> {
    self.emit_expr(expr)?;
    self.builder.emit(Opcode::Pop);
    Ok(())
  }
}
