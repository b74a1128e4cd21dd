use super::*;

/// Raw argument counts share the operand byte space with pool indices, so
/// the same 0xFF exclusion applies.
const MAX_ARGS: usize = 0xfe;

impl State {
  pub(super) fn emit_expr(&mut self, expr: &ast::Expr<'_>) -> Result<(), EmitError> {
    match &**expr {
      ast::ExprKind::Literal(v) => self.emit_literal_expr(v),
      ast::ExprKind::GetVar(v) => self.emit_get_var_expr(v),
      ast::ExprKind::SetVar(v) => self.emit_set_var_expr(v),
      ast::ExprKind::GetField(v) => self.emit_get_field_expr(v),
      ast::ExprKind::SetField(v) => self.emit_set_field_expr(v),
      ast::ExprKind::GetIndex(v) => self.emit_get_index_expr(v),
      ast::ExprKind::SetIndex(v) => self.emit_set_index_expr(v),
      ast::ExprKind::Binary(v) => self.emit_binary_expr(v),
      ast::ExprKind::Logical(v) => self.emit_logical_expr(v),
      ast::ExprKind::Unary(v) => self.emit_unary_expr(v),
      ast::ExprKind::Ternary(v) => self.emit_ternary_expr(v),
      ast::ExprKind::Call(v) => self.emit_call_expr(v, expr.span),
      ast::ExprKind::New(v) => self.emit_new_expr(v, expr.span),
      ast::ExprKind::Func(v) => self.emit_func(v),
      ast::ExprKind::Array(v) => self.emit_array_expr(v),
      ast::ExprKind::Object(v) => self.emit_object_expr(v),
      ast::ExprKind::This => {
        self.builder.emit(Opcode::This);
        Ok(())
      }
    }
  }

  fn emit_literal_expr(&mut self, literal: &ast::Literal<'_>) -> Result<(), EmitError> {
    match literal {
      ast::Literal::Null => self.builder.emit(Opcode::Null),
      ast::Literal::Undefined => self.builder.emit(Opcode::Undefined),
      ast::Literal::Bool(v) => {
        let idx = self.constant(Constant::Bool(*v))?;
        self.builder.emit_with(Opcode::LoadConst, &[idx]);
      }
      ast::Literal::Num(v) => {
        let idx = self.constant(Constant::Num(*v))?;
        self.builder.emit_with(Opcode::LoadConst, &[idx]);
      }
      ast::Literal::Str(v) => {
        let idx = self.constant(Constant::Str(v.to_string()))?;
        self.builder.emit_with(Opcode::LoadConst, &[idx]);
      }
    }
    Ok(())
  }

  fn emit_get_var_expr(&mut self, expr: &ast::GetVar<'_>) -> Result<(), EmitError> {
    let name = self.constant(Constant::Name(expr.name.to_string()))?;
    self.builder.emit_with(Opcode::LoadVar, &[name]);
    Ok(())
  }

  /// Assignments are expressions: duplicate the value so one copy survives
  /// the popping `STORE_VAR`.
  fn emit_set_var_expr(&mut self, expr: &ast::SetVar<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.value)?;
    self.builder.emit(Opcode::Duplicate);
    let name = self.constant(Constant::Name(expr.name.to_string()))?;
    self.builder.emit_with(Opcode::StoreVar, &[name]);
    Ok(())
  }

  fn emit_get_field_expr(&mut self, expr: &ast::GetField<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    let name = self.constant(Constant::Name(expr.name.to_string()))?;
    self.builder.emit_with(Opcode::LoadProperty, &[name]);
    Ok(())
  }

  /// `STORE_PROPERTY` pushes the stored value, which is exactly the
  /// assignment expression's result.
  fn emit_set_field_expr(&mut self, expr: &ast::SetField<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    self.emit_expr(&expr.value)?;
    let name = self.constant(Constant::Name(expr.name.to_string()))?;
    self.builder.emit_with(Opcode::StoreProperty, &[name]);
    Ok(())
  }

  fn emit_get_index_expr(&mut self, expr: &ast::GetIndex<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    self.emit_expr(&expr.key)?;
    self.builder.emit(Opcode::LoadIndex);
    Ok(())
  }

  fn emit_set_index_expr(&mut self, expr: &ast::SetIndex<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    self.emit_expr(&expr.key)?;
    self.emit_expr(&expr.value)?;
    self.builder.emit(Opcode::StoreIndex);
    Ok(())
  }

  fn emit_binary_expr(&mut self, expr: &ast::Binary<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.left)?;
    self.emit_expr(&expr.right)?;
    let op = self.constant(Constant::Str(expr.op.as_str().into()))?;
    self.builder.emit_with(Opcode::BinaryOp, &[op]);
    Ok(())
  }

  /// Logical operators short-circuit: the left operand is duplicated for
  /// the test and the right operand is only evaluated when the test does
  /// not decide the result.
  fn emit_logical_expr(&mut self, expr: &ast::Logical<'_>) -> Result<(), EmitError> {
    let end = self.builder.label("end");
    self.emit_expr(&expr.left)?;
    self.builder.emit(Opcode::Duplicate);
    match expr.op {
      ast::LogicalOp::And => {
        self.builder.emit_jump(Opcode::JumpIfFalse, &end)?;
      }
      ast::LogicalOp::Or => {
        self.builder.emit_jump(Opcode::JumpIfTrue, &end)?;
      }
      ast::LogicalOp::Coalesce => {
        // `a == null` covers both null and undefined
        self.builder.emit(Opcode::Null);
        let eq = self.constant(Constant::Str("==".into()))?;
        self.builder.emit_with(Opcode::BinaryOp, &[eq]);
        self.builder.emit_jump(Opcode::JumpIfFalse, &end)?;
      }
    }
    self.builder.emit(Opcode::Pop);
    self.emit_expr(&expr.right)?;
    self.builder.bind_label(&end);
    Ok(())
  }

  fn emit_unary_expr(&mut self, expr: &ast::Unary<'_>) -> Result<(), EmitError> {
    self.emit_expr(&expr.expr)?;
    let op = self.constant(Constant::Str(expr.op.as_str().into()))?;
    self.builder.emit_with(Opcode::UnaryOp, &[op]);
    Ok(())
  }

  fn emit_ternary_expr(&mut self, expr: &ast::Ternary<'_>) -> Result<(), EmitError> {
    let otherwise = self.builder.label("else");
    let end = self.builder.label("end");
    self.emit_expr(&expr.cond)?;
    self.builder.emit_jump(Opcode::JumpIfFalse, &otherwise)?;
    self.emit_expr(&expr.then)?;
    self.builder.emit_jump(Opcode::Jump, &end)?;
    self.builder.bind_label(&otherwise);
    self.emit_expr(&expr.otherwise)?;
    self.builder.bind_label(&end);
    Ok(())
  }

  fn emit_call_expr(&mut self, expr: &ast::Call<'_>, span: crate::span::Span) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    let count = self.emit_args(&expr.args, span)?;
    self.builder.emit_with(Opcode::CallFunction, &[count]);
    Ok(())
  }

  fn emit_new_expr(&mut self, expr: &ast::Call<'_>, span: crate::span::Span) -> Result<(), EmitError> {
    self.emit_expr(&expr.target)?;
    let count = self.emit_args(&expr.args, span)?;
    self.builder.emit_with(Opcode::NewInstance, &[count]);
    Ok(())
  }

  fn emit_args(&mut self, args: &[ast::Expr<'_>], span: crate::span::Span) -> Result<u8, EmitError> {
    if args.len() > MAX_ARGS {
      return Err(EmitError::TooManyArguments {
        count: args.len(),
        span,
      });
    }
    for arg in args {
      self.emit_expr(arg)?;
    }
    Ok(args.len() as u8)
  }

  pub(super) fn emit_func(&mut self, func: &ast::Func<'_>) -> Result<(), EmitError> {
    let name = func
      .name
      .as_ref()
      .map(|n| n.to_string())
      .unwrap_or_default();
    let params = func.params.iter().map(|p| p.to_string()).collect();
    let name = self.constant(Constant::Name(name))?;
    let params = self.constant(Constant::Params(params))?;
    let body = self.constant(Constant::Body(func.body.to_string()))?;
    self
      .builder
      .emit_with(Opcode::CreateFunction, &[name, params, body]);
    Ok(())
  }

  fn emit_array_expr(&mut self, items: &[ast::Expr<'_>]) -> Result<(), EmitError> {
    self.builder.emit(Opcode::CreateArray);
    for item in items {
      self.builder.emit(Opcode::Duplicate);
      self.emit_expr(item)?;
      self.builder.emit(Opcode::ArrayPush);
      self.builder.emit(Opcode::Pop);
    }
    Ok(())
  }

  fn emit_object_expr(
    &mut self,
    entries: &[(ast::Ident<'_>, ast::Expr<'_>)],
  ) -> Result<(), EmitError> {
    self.builder.emit(Opcode::CreateObject);
    for (key, value) in entries {
      self.builder.emit(Opcode::Duplicate);
      self.emit_expr(value)?;
      let key = self.constant(Constant::Name(key.to_string()))?;
      self.builder.emit_with(Opcode::StoreProperty, &[key]);
      self.builder.emit(Opcode::Pop);
    }
    Ok(())
  }
}
