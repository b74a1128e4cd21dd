use beef::lean::Cow;

use super::ast::{self, Expr, ExprKind, Ident, Module, Stmt, StmtKind};
use super::lexer::TokenKind::*;
use super::lexer::{tokenize, Token, TokenKind};
use super::SyntaxError;
use crate::span::{Span, Spanned};

pub fn parse(src: &str) -> Result<Module<'_>, Vec<SyntaxError>> {
  let tokens = match tokenize(src) {
    Ok(tokens) => tokens,
    Err(e) => return Err(vec![e]),
  };
  Parser {
    src,
    tokens,
    pos: 0,
    errors: Vec::new(),
  }
  .module()
}

struct Parser<'src> {
  src: &'src str,
  tokens: Vec<Token>,
  pos: usize,
  errors: Vec<SyntaxError>,
}

type Parsed<T> = Result<T, SyntaxError>;

impl<'src> Parser<'src> {
  fn module(mut self) -> Result<Module<'src>, Vec<SyntaxError>> {
    let mut body = Vec::new();
    while !self.at(Tok_Eof) {
      match self.stmt() {
        Ok(stmt) => body.push(stmt),
        Err(e) => {
          self.errors.push(e);
          self.synchronize();
        }
      }
    }
    if self.errors.is_empty() {
      Ok(Module { body })
    } else {
      Err(self.errors)
    }
  }

  /// Skip forward to a likely statement boundary after an error.
  fn synchronize(&mut self) {
    while !self.at(Tok_Eof) {
      let kind = self.current().kind;
      self.advance();
      if matches!(kind, Tok_Semicolon | Brk_CurlyR) {
        break;
      }
    }
  }

  fn current(&self) -> Token {
    self.tokens[self.pos]
  }

  fn previous(&self) -> Token {
    self.tokens[self.pos.saturating_sub(1)]
  }

  fn at(&self, kind: TokenKind) -> bool {
    self.current().kind == kind
  }

  fn advance(&mut self) {
    if self.pos + 1 < self.tokens.len() {
      self.pos += 1;
    }
  }

  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.at(kind) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, kind: TokenKind) -> Parsed<Token> {
    let token = self.current();
    if token.kind == kind {
      self.advance();
      Ok(token)
    } else {
      Err(SyntaxError::new(
        format!("expected `{}`, found `{}`", kind.name(), token.kind.name()),
        token.span,
      ))
    }
  }

  fn lexeme(&self, token: Token) -> &'src str {
    &self.src[token.span.range()]
  }

  fn ident(&mut self) -> Parsed<Ident<'src>> {
    let token = self.expect(Lit_Ident)?;
    Ok(Spanned::new(token.span, Cow::borrowed(self.lexeme(token))))
  }

  // --- statements -----------------------------------------------------------

  fn stmt(&mut self) -> Parsed<Stmt<'src>> {
    match self.current().kind {
      Kw_Var => self.var_stmt(),
      Kw_Function => self.func_stmt(),
      Kw_If => self.if_stmt(),
      Kw_While => self.while_stmt(),
      Kw_For => self.for_stmt(),
      Kw_Switch => self.switch_stmt(),
      Kw_Try => self.try_stmt(),
      Kw_Throw => self.throw_stmt(),
      Kw_Return => self.return_stmt(),
      Kw_Break => self.break_stmt(),
      Kw_Continue => self.continue_stmt(),
      Brk_CurlyL => self.block_stmt(),
      _ => self.expr_stmt(),
    }
  }

  fn var_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    let decl = self.var_decl()?;
    self.eat(Tok_Semicolon);
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Var(Box::new(decl)),
    ))
  }

  fn var_decl(&mut self) -> Parsed<ast::VarDecl<'src>> {
    self.advance(); // `var`, `let` or `const`
    let mut decls = Vec::new();
    loop {
      let name = self.ident()?;
      let init = if self.eat(Op_Equal) {
        Some(self.assignment()?)
      } else {
        None
      };
      decls.push((name, init));
      if !self.eat(Tok_Comma) {
        break;
      }
    }
    Ok(ast::VarDecl { decls })
  }

  fn func_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `function`
    let name = self.ident()?;
    let func = self.func_rest(Some(name))?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Func(Box::new(func)),
    ))
  }

  /// Parses `(params) { body }`. The body is parsed once for early error
  /// reporting, but only its source text is kept; it is re-compiled at the
  /// point of call.
  fn func_rest(&mut self, name: Option<Ident<'src>>) -> Parsed<ast::Func<'src>> {
    self.expect(Brk_ParenL)?;
    let mut params = Vec::new();
    if !self.at(Brk_ParenR) {
      loop {
        params.push(self.ident()?);
        if !self.eat(Tok_Comma) {
          break;
        }
      }
    }
    self.expect(Brk_ParenR)?;
    let body = self.func_body()?;
    Ok(ast::Func { name, params, body })
  }

  fn func_body(&mut self) -> Parsed<Cow<'src, str>> {
    let open = self.expect(Brk_CurlyL)?;
    while !self.at(Brk_CurlyR) && !self.at(Tok_Eof) {
      self.stmt()?;
    }
    let close = self.expect(Brk_CurlyR)?;
    Ok(Cow::borrowed(&self.src[open.span.end..close.span.start]))
  }

  fn if_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `if`
    self.expect(Brk_ParenL)?;
    let cond = self.expr()?;
    self.expect(Brk_ParenR)?;
    let then = self.stmt()?;
    let otherwise = if self.eat(Kw_Else) {
      Some(self.stmt()?)
    } else {
      None
    };
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::If(Box::new(ast::If {
        cond,
        then,
        otherwise,
      })),
    ))
  }

  fn while_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `while`
    self.expect(Brk_ParenL)?;
    let cond = self.expr()?;
    self.expect(Brk_ParenR)?;
    let body = self.stmt()?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::While(Box::new(ast::While { cond, body })),
    ))
  }

  fn for_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `for`
    self.expect(Brk_ParenL)?;
    let init = if self.eat(Tok_Semicolon) {
      None
    } else if self.at(Kw_Var) {
      let decl = self.var_decl()?;
      self.expect(Tok_Semicolon)?;
      Some(ast::ForInit::Var(decl))
    } else {
      let expr = self.expr()?;
      self.expect(Tok_Semicolon)?;
      Some(ast::ForInit::Expr(expr))
    };
    let cond = if self.at(Tok_Semicolon) {
      None
    } else {
      Some(self.expr()?)
    };
    self.expect(Tok_Semicolon)?;
    let update = if self.at(Brk_ParenR) {
      None
    } else {
      Some(self.expr()?)
    };
    self.expect(Brk_ParenR)?;
    let body = self.stmt()?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::For(Box::new(ast::For {
        init,
        cond,
        update,
        body,
      })),
    ))
  }

  fn switch_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `switch`
    self.expect(Brk_ParenL)?;
    let disc = self.expr()?;
    self.expect(Brk_ParenR)?;
    self.expect(Brk_CurlyL)?;
    let mut arms = Vec::new();
    let mut seen_default = false;
    while !self.at(Brk_CurlyR) && !self.at(Tok_Eof) {
      let test = if self.eat(Kw_Case) {
        let test = self.expr()?;
        Some(test)
      } else {
        let token = self.expect(Kw_Default)?;
        if seen_default {
          return Err(SyntaxError::new("duplicate `default` arm", token.span));
        }
        seen_default = true;
        None
      };
      self.expect(Tok_Colon)?;
      let mut body = Vec::new();
      while !matches!(self.current().kind, Kw_Case | Kw_Default | Brk_CurlyR | Tok_Eof) {
        body.push(self.stmt()?);
      }
      arms.push(ast::SwitchArm { test, body });
    }
    self.expect(Brk_CurlyR)?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Switch(Box::new(ast::Switch { disc, arms })),
    ))
  }

  fn try_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `try`
    let body = self.brace_list()?;
    let catch = if self.eat(Kw_Catch) {
      self.expect(Brk_ParenL)?;
      let name = self.ident()?;
      self.expect(Brk_ParenR)?;
      Some((name, self.brace_list()?))
    } else {
      None
    };
    let finally = if self.eat(Kw_Finally) {
      Some(self.brace_list()?)
    } else {
      None
    };
    if catch.is_none() && finally.is_none() {
      return Err(SyntaxError::new(
        "`try` requires a `catch` or `finally` clause",
        start,
      ));
    }
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Try(Box::new(ast::Try {
        body,
        catch,
        finally,
      })),
    ))
  }

  fn brace_list(&mut self) -> Parsed<Vec<Stmt<'src>>> {
    self.expect(Brk_CurlyL)?;
    let mut body = Vec::new();
    while !self.at(Brk_CurlyR) && !self.at(Tok_Eof) {
      body.push(self.stmt()?);
    }
    self.expect(Brk_CurlyR)?;
    Ok(body)
  }

  fn throw_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `throw`
    let value = self.expr()?;
    self.eat(Tok_Semicolon);
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Throw(Box::new(value)),
    ))
  }

  fn return_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    self.advance(); // `return`
    let value = if matches!(self.current().kind, Tok_Semicolon | Brk_CurlyR | Tok_Eof) {
      None
    } else {
      Some(Box::new(self.expr()?))
    };
    self.eat(Tok_Semicolon);
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Return(value),
    ))
  }

  fn break_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let span = self.current().span;
    self.advance();
    self.eat(Tok_Semicolon);
    Ok(Spanned::new(span, StmtKind::Break))
  }

  fn continue_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let span = self.current().span;
    self.advance();
    self.eat(Tok_Semicolon);
    Ok(Spanned::new(span, StmtKind::Continue))
  }

  fn block_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let start = self.current().span;
    let body = self.brace_list()?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      StmtKind::Block(body),
    ))
  }

  fn expr_stmt(&mut self) -> Parsed<Stmt<'src>> {
    let expr = self.expr()?;
    self.eat(Tok_Semicolon);
    let span = expr.span;
    Ok(Spanned::new(span, StmtKind::Expr(Box::new(expr))))
  }

  // --- expressions ----------------------------------------------------------

  fn expr(&mut self) -> Parsed<Expr<'src>> {
    self.assignment()
  }

  fn assignment(&mut self) -> Parsed<Expr<'src>> {
    let target = self.ternary()?;
    if !self.at(Op_Equal) {
      return Ok(target);
    }
    let equals = self.current().span;
    self.advance();
    let value = self.assignment()?;
    let span = target.span.join(value.span);
    let kind = match target.into_inner() {
      ExprKind::GetVar(get) => ExprKind::SetVar(Box::new(ast::SetVar {
        name: get.name,
        value,
      })),
      ExprKind::GetField(get) => ExprKind::SetField(Box::new(ast::SetField {
        target: get.target,
        name: get.name,
        value,
      })),
      ExprKind::GetIndex(get) => ExprKind::SetIndex(Box::new(ast::SetIndex {
        target: get.target,
        key: get.key,
        value,
      })),
      _ => return Err(SyntaxError::new("invalid assignment target", equals)),
    };
    Ok(Spanned::new(span, kind))
  }

  fn ternary(&mut self) -> Parsed<Expr<'src>> {
    let cond = self.coalesce()?;
    if !self.eat(Tok_Question) {
      return Ok(cond);
    }
    let then = self.assignment()?;
    self.expect(Tok_Colon)?;
    let otherwise = self.assignment()?;
    let span = cond.span.join(otherwise.span);
    Ok(Spanned::new(
      span,
      ExprKind::Ternary(Box::new(ast::Ternary {
        cond,
        then,
        otherwise,
      })),
    ))
  }

  fn coalesce(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.logic_or()?;
    while self.eat(Op_QuestionQuestion) {
      let right = self.logic_or()?;
      left = logical(ast::LogicalOp::Coalesce, left, right);
    }
    Ok(left)
  }

  fn logic_or(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.logic_and()?;
    while self.eat(Op_PipePipe) {
      let right = self.logic_and()?;
      left = logical(ast::LogicalOp::Or, left, right);
    }
    Ok(left)
  }

  fn logic_and(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.bit_or()?;
    while self.eat(Op_AndAnd) {
      let right = self.bit_or()?;
      left = logical(ast::LogicalOp::And, left, right);
    }
    Ok(left)
  }

  fn bit_or(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.bit_xor()?;
    while self.eat(Op_Pipe) {
      let right = self.bit_xor()?;
      left = binary(ast::BinaryOp::BitOr, left, right);
    }
    Ok(left)
  }

  fn bit_xor(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.bit_and()?;
    while self.eat(Op_Caret) {
      let right = self.bit_and()?;
      left = binary(ast::BinaryOp::BitXor, left, right);
    }
    Ok(left)
  }

  fn bit_and(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.equality()?;
    while self.eat(Op_And) {
      let right = self.equality()?;
      left = binary(ast::BinaryOp::BitAnd, left, right);
    }
    Ok(left)
  }

  fn equality(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.relational()?;
    loop {
      let op = match self.current().kind {
        Op_EqualEqual => ast::BinaryOp::Eq,
        Op_BangEqual => ast::BinaryOp::Neq,
        Op_EqualEqualEqual => ast::BinaryOp::StrictEq,
        Op_BangEqualEqual => ast::BinaryOp::StrictNeq,
        _ => break,
      };
      self.advance();
      let right = self.relational()?;
      left = binary(op, left, right);
    }
    Ok(left)
  }

  fn relational(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.shift()?;
    loop {
      let op = match self.current().kind {
        Op_Less => ast::BinaryOp::Less,
        Op_LessEqual => ast::BinaryOp::LessEq,
        Op_More => ast::BinaryOp::More,
        Op_MoreEqual => ast::BinaryOp::MoreEq,
        Kw_In => ast::BinaryOp::In,
        Kw_InstanceOf => ast::BinaryOp::InstanceOf,
        _ => break,
      };
      self.advance();
      let right = self.shift()?;
      left = binary(op, left, right);
    }
    Ok(left)
  }

  fn shift(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.additive()?;
    loop {
      let op = match self.current().kind {
        Op_Shl => ast::BinaryOp::Shl,
        Op_Shr => ast::BinaryOp::Shr,
        Op_UShr => ast::BinaryOp::UShr,
        _ => break,
      };
      self.advance();
      let right = self.additive()?;
      left = binary(op, left, right);
    }
    Ok(left)
  }

  fn additive(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.multiplicative()?;
    loop {
      let op = match self.current().kind {
        Op_Plus => ast::BinaryOp::Add,
        Op_Minus => ast::BinaryOp::Sub,
        _ => break,
      };
      self.advance();
      let right = self.multiplicative()?;
      left = binary(op, left, right);
    }
    Ok(left)
  }

  fn multiplicative(&mut self) -> Parsed<Expr<'src>> {
    let mut left = self.unary()?;
    loop {
      let op = match self.current().kind {
        Op_Star => ast::BinaryOp::Mul,
        Op_Slash => ast::BinaryOp::Div,
        Op_Percent => ast::BinaryOp::Rem,
        _ => break,
      };
      self.advance();
      let right = self.unary()?;
      left = binary(op, left, right);
    }
    Ok(left)
  }

  fn unary(&mut self) -> Parsed<Expr<'src>> {
    let op = match self.current().kind {
      Op_Plus => ast::UnaryOp::Plus,
      Op_Minus => ast::UnaryOp::Minus,
      Op_Bang => ast::UnaryOp::Not,
      Op_Tilde => ast::UnaryOp::BitNot,
      Kw_TypeOf => ast::UnaryOp::TypeOf,
      Kw_Void => ast::UnaryOp::Void,
      Kw_Delete => ast::UnaryOp::Delete,
      Kw_New => return self.new_expr(),
      _ => return self.postfix(),
    };
    let start = self.current().span;
    self.advance();
    let expr = self.unary()?;
    let span = start.join(expr.span);
    Ok(Spanned::new(
      span,
      ExprKind::Unary(Box::new(ast::Unary { op, expr })),
    ))
  }

  fn new_expr(&mut self) -> Parsed<Expr<'src>> {
    let start = self.current().span;
    self.advance(); // `new`
    // the callee binds member accesses but not calls
    let mut target = self.primary()?;
    loop {
      if self.eat(Op_Dot) {
        let name = self.ident()?;
        let span = target.span.join(name.span);
        target = Spanned::new(
          span,
          ExprKind::GetField(Box::new(ast::GetField { target, name })),
        );
      } else if self.eat(Brk_SquareL) {
        let key = self.expr()?;
        self.expect(Brk_SquareR)?;
        let span = target.span.join(self.previous().span);
        target = Spanned::new(
          span,
          ExprKind::GetIndex(Box::new(ast::GetIndex { target, key })),
        );
      } else {
        break;
      }
    }
    let args = if self.at(Brk_ParenL) {
      self.call_args()?
    } else {
      Vec::new()
    };
    let span = start.join(self.previous().span);
    let new = Spanned::new(span, ExprKind::New(Box::new(ast::Call { target, args })));
    self.postfix_chain(new)
  }

  fn postfix(&mut self) -> Parsed<Expr<'src>> {
    let expr = self.primary()?;
    self.postfix_chain(expr)
  }

  fn postfix_chain(&mut self, mut expr: Expr<'src>) -> Parsed<Expr<'src>> {
    loop {
      if self.eat(Op_Dot) {
        let name = self.ident()?;
        let span = expr.span.join(name.span);
        expr = Spanned::new(
          span,
          ExprKind::GetField(Box::new(ast::GetField { target: expr, name })),
        );
      } else if self.eat(Brk_SquareL) {
        let key = self.expr()?;
        self.expect(Brk_SquareR)?;
        let span = expr.span.join(self.previous().span);
        expr = Spanned::new(
          span,
          ExprKind::GetIndex(Box::new(ast::GetIndex { target: expr, key })),
        );
      } else if self.at(Brk_ParenL) {
        let args = self.call_args()?;
        let span = expr.span.join(self.previous().span);
        expr = Spanned::new(span, ExprKind::Call(Box::new(ast::Call { target: expr, args })));
      } else {
        break;
      }
    }
    Ok(expr)
  }

  fn call_args(&mut self) -> Parsed<Vec<Expr<'src>>> {
    self.expect(Brk_ParenL)?;
    let mut args = Vec::new();
    if !self.at(Brk_ParenR) {
      loop {
        args.push(self.assignment()?);
        if !self.eat(Tok_Comma) {
          break;
        }
      }
    }
    self.expect(Brk_ParenR)?;
    Ok(args)
  }

  fn primary(&mut self) -> Parsed<Expr<'src>> {
    let token = self.current();
    match token.kind {
      Lit_Null => self.literal(ast::Literal::Null),
      Lit_Undefined => self.literal(ast::Literal::Undefined),
      Lit_True => self.literal(ast::Literal::Bool(true)),
      Lit_False => self.literal(ast::Literal::Bool(false)),
      Lit_Number => {
        let value = self.lexeme(token).parse::<f64>().map_err(|_| {
          SyntaxError::new("number literal out of range", token.span)
        })?;
        self.literal(ast::Literal::Num(value))
      }
      Lit_String => {
        let value = unescape(self.lexeme(token));
        self.literal(ast::Literal::Str(value))
      }
      Kw_This => {
        self.advance();
        Ok(Spanned::new(token.span, ExprKind::This))
      }
      Kw_Function => {
        self.advance();
        let name = if self.at(Lit_Ident) {
          Some(self.ident()?)
        } else {
          None
        };
        let func = self.func_rest(name)?;
        let span = token.span.join(self.previous().span);
        Ok(Spanned::new(span, ExprKind::Func(Box::new(func))))
      }
      Lit_Ident => {
        if self.tokens[self.pos + 1].kind == Op_Arrow {
          return self.arrow_expr(vec![]);
        }
        let name = self.ident()?;
        Ok(Spanned::new(
          token.span,
          ExprKind::GetVar(Box::new(ast::GetVar { name })),
        ))
      }
      Brk_ParenL => {
        if let Some(params) = self.try_arrow_params() {
          return self.arrow_expr(params);
        }
        self.advance();
        let expr = self.expr()?;
        self.expect(Brk_ParenR)?;
        Ok(expr)
      }
      Brk_SquareL => self.array_expr(),
      Brk_CurlyL => self.object_expr(),
      _ => Err(SyntaxError::new(
        format!("unexpected token `{}`", token.kind.name()),
        token.span,
      )),
    }
  }

  fn literal(&mut self, value: ast::Literal<'src>) -> Parsed<Expr<'src>> {
    let span = self.current().span;
    self.advance();
    Ok(Spanned::new(span, ExprKind::Literal(Box::new(value))))
  }

  /// Attempt to read `( ident, ... ) =>` without committing; returns the
  /// parameter list on success and rewinds on failure.
  fn try_arrow_params(&mut self) -> Option<Vec<Ident<'src>>> {
    let saved = self.pos;
    self.advance(); // `(`
    let mut params = Vec::new();
    if !self.at(Brk_ParenR) {
      loop {
        if !self.at(Lit_Ident) {
          self.pos = saved;
          return None;
        }
        let token = self.current();
        params.push(Spanned::new(token.span, Cow::borrowed(self.lexeme(token))));
        self.advance();
        if !self.eat(Tok_Comma) {
          break;
        }
      }
    }
    if self.eat(Brk_ParenR) && self.at(Op_Arrow) {
      Some(params)
    } else {
      self.pos = saved;
      None
    }
  }

  /// Parses an arrow function at the `=>` (single-ident form) or just before
  /// it (parenthesized form, params already consumed).
  fn arrow_expr(&mut self, params: Vec<Ident<'src>>) -> Parsed<Expr<'src>> {
    let mut params = params;
    let start;
    if params.is_empty() && self.at(Lit_Ident) {
      let token = self.current();
      start = token.span;
      params.push(Spanned::new(token.span, Cow::borrowed(self.lexeme(token))));
      self.advance();
    } else {
      start = params.first().map(|p| p.span).unwrap_or(self.current().span);
    }
    self.expect(Op_Arrow)?;
    let body = if self.at(Brk_CurlyL) {
      self.func_body()?
    } else {
      let expr = self.assignment()?;
      Cow::owned(format!("return {};", &self.src[expr.span.range()]))
    };
    let span = start.join(self.previous().span);
    Ok(Spanned::new(
      span,
      ExprKind::Func(Box::new(ast::Func {
        name: None,
        params,
        body,
      })),
    ))
  }

  fn array_expr(&mut self) -> Parsed<Expr<'src>> {
    let start = self.current().span;
    self.advance(); // `[`
    let mut items = Vec::new();
    if !self.at(Brk_SquareR) {
      loop {
        items.push(self.assignment()?);
        if !self.eat(Tok_Comma) {
          break;
        }
        if self.at(Brk_SquareR) {
          break; // trailing comma
        }
      }
    }
    self.expect(Brk_SquareR)?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      ExprKind::Array(items),
    ))
  }

  fn object_expr(&mut self) -> Parsed<Expr<'src>> {
    let start = self.current().span;
    self.advance(); // `{`
    let mut entries = Vec::new();
    if !self.at(Brk_CurlyR) {
      loop {
        let key = self.property_key()?;
        self.expect(Tok_Colon)?;
        let value = self.assignment()?;
        entries.push((key, value));
        if !self.eat(Tok_Comma) {
          break;
        }
        if self.at(Brk_CurlyR) {
          break; // trailing comma
        }
      }
    }
    self.expect(Brk_CurlyR)?;
    Ok(Spanned::new(
      start.join(self.previous().span),
      ExprKind::Object(entries),
    ))
  }

  fn property_key(&mut self) -> Parsed<Ident<'src>> {
    let token = self.current();
    match token.kind {
      Lit_Ident => self.ident(),
      Lit_String => {
        self.advance();
        Ok(Spanned::new(token.span, unescape(self.lexeme(token))))
      }
      Lit_Number => {
        self.advance();
        Ok(Spanned::new(token.span, Cow::borrowed(self.lexeme(token))))
      }
      _ => Err(SyntaxError::new(
        format!("expected property key, found `{}`", token.kind.name()),
        token.span,
      )),
    }
  }
}

fn binary<'src>(op: ast::BinaryOp, left: Expr<'src>, right: Expr<'src>) -> Expr<'src> {
  let span = left.span.join(right.span);
  Spanned::new(span, ExprKind::Binary(Box::new(ast::Binary { op, left, right })))
}

fn logical<'src>(op: ast::LogicalOp, left: Expr<'src>, right: Expr<'src>) -> Expr<'src> {
  let span = left.span.join(right.span);
  Spanned::new(
    span,
    ExprKind::Logical(Box::new(ast::Logical { op, left, right })),
  )
}

/// Strip quotes and resolve escapes. Borrows when the literal contains no
/// escape sequences.
fn unescape(lexeme: &str) -> Cow<'_, str> {
  let inner = &lexeme[1..lexeme.len() - 1];
  if !inner.contains('\\') {
    return Cow::borrowed(inner);
  }
  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('0') => out.push('\0'),
      Some(other) => out.push(other),
      None => {}
    }
  }
  Cow::owned(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_ok(src: &str) -> Module<'_> {
    match parse(src) {
      Ok(module) => module,
      Err(errors) => panic!("parse failed: {errors:?}"),
    }
  }

  #[test]
  fn parses_statement_forms() {
    let module = parse_ok(
      "var x = 1, y; x = y + 2; if (x) { x; } else { y; } \
       while (x < 10) { x = x + 1; } \
       for (var i = 0; i < 3; i = i + 1) { continue; } \
       switch (x) { case 1: break; default: x; } \
       try { throw x; } catch (e) { e; } finally { y; } \
       function f(a, b) { return a + b; } f(1, 2);",
    );
    assert_eq!(module.body.len(), 9);
  }

  #[test]
  fn parses_expression_forms() {
    let module = parse_ok(
      "a ? b : c; a && b || c ?? d; a.b.c[0](1)(2); new Foo(1).bar; \
       [1, 2, 3]; ({ a: 1, 'b c': 2 }); x => x * x; (a, b) => { return a; }; \
       typeof a; -a; ~a; a >>> 2 | b & 3;",
    );
    assert_eq!(module.body.len(), 12);
  }

  #[test]
  fn arrow_body_keeps_source() {
    let module = parse_ok("var f = x => x * x;");
    let StmtKind::Var(decl) = &*module.body[0] else {
      panic!("expected var");
    };
    let Some(init) = &decl.decls[0].1 else {
      panic!("expected initializer")
    };
    let ExprKind::Func(func) = &**init else {
      panic!("expected function")
    };
    assert_eq!(func.params.len(), 1);
    assert_eq!(func.body.as_ref(), "return x * x;");
  }

  #[test]
  fn function_body_is_sliced_verbatim() {
    let module = parse_ok("function f(x) { return x * x; }");
    let StmtKind::Func(func) = &*module.body[0] else {
      panic!("expected function");
    };
    assert_eq!(func.body.as_ref(), " return x * x; ");
  }

  #[test]
  fn rejects_garbage() {
    assert!(parse("var = 1;").is_err());
    assert!(parse("if (x { }").is_err());
    assert!(parse("a = ;").is_err());
  }

  #[test]
  fn object_literal_is_not_a_block_in_expression_position() {
    // a parenthesized object literal parses as an expression statement
    let module = parse_ok("({ a: 1 });");
    assert!(matches!(&*module.body[0], StmtKind::Expr(_)));
  }
}
