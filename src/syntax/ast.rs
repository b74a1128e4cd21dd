#![allow(clippy::needless_lifetimes)]

use beef::lean::Cow;

use crate::span::Spanned;

pub type Ident<'src> = Spanned<Cow<'src, str>>;

#[cfg_attr(test, derive(Debug))]
pub struct Module<'src> {
  pub body: Vec<Stmt<'src>>,
}

pub type Stmt<'src> = Spanned<StmtKind<'src>>;

#[cfg_attr(test, derive(Debug))]
pub enum StmtKind<'src> {
  Var(Box<VarDecl<'src>>),
  Func(Box<Func<'src>>),
  If(Box<If<'src>>),
  While(Box<While<'src>>),
  For(Box<For<'src>>),
  Switch(Box<Switch<'src>>),
  Try(Box<Try<'src>>),
  Throw(Box<Expr<'src>>),
  Return(Option<Box<Expr<'src>>>),
  Break,
  Continue,
  Block(Vec<Stmt<'src>>),
  Expr(Box<Expr<'src>>),
}

#[cfg_attr(test, derive(Debug))]
pub struct VarDecl<'src> {
  pub decls: Vec<(Ident<'src>, Option<Expr<'src>>)>,
}

/// A function declaration or expression. `body` holds the body source text
/// verbatim; it is compiled on demand by whichever interpreter ends up
/// running the program.
#[cfg_attr(test, derive(Debug))]
pub struct Func<'src> {
  pub name: Option<Ident<'src>>,
  pub params: Vec<Ident<'src>>,
  pub body: Cow<'src, str>,
}

#[cfg_attr(test, derive(Debug))]
pub struct If<'src> {
  pub cond: Expr<'src>,
  pub then: Stmt<'src>,
  pub otherwise: Option<Stmt<'src>>,
}

#[cfg_attr(test, derive(Debug))]
pub struct While<'src> {
  pub cond: Expr<'src>,
  pub body: Stmt<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub enum ForInit<'src> {
  Var(VarDecl<'src>),
  Expr(Expr<'src>),
}

#[cfg_attr(test, derive(Debug))]
pub struct For<'src> {
  pub init: Option<ForInit<'src>>,
  pub cond: Option<Expr<'src>>,
  pub update: Option<Expr<'src>>,
  pub body: Stmt<'src>,
}

/// Arms are kept in source order so fallthrough works; `test` is `None` for
/// the `default` arm.
#[cfg_attr(test, derive(Debug))]
pub struct Switch<'src> {
  pub disc: Expr<'src>,
  pub arms: Vec<SwitchArm<'src>>,
}

#[cfg_attr(test, derive(Debug))]
pub struct SwitchArm<'src> {
  pub test: Option<Expr<'src>>,
  pub body: Vec<Stmt<'src>>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Try<'src> {
  pub body: Vec<Stmt<'src>>,
  pub catch: Option<(Ident<'src>, Vec<Stmt<'src>>)>,
  pub finally: Option<Vec<Stmt<'src>>>,
}

pub type Expr<'src> = Spanned<ExprKind<'src>>;

#[cfg_attr(test, derive(Debug))]
pub enum ExprKind<'src> {
  Literal(Box<Literal<'src>>),
  GetVar(Box<GetVar<'src>>),
  SetVar(Box<SetVar<'src>>),
  GetField(Box<GetField<'src>>),
  SetField(Box<SetField<'src>>),
  GetIndex(Box<GetIndex<'src>>),
  SetIndex(Box<SetIndex<'src>>),
  Binary(Box<Binary<'src>>),
  Logical(Box<Logical<'src>>),
  Unary(Box<Unary<'src>>),
  Ternary(Box<Ternary<'src>>),
  Call(Box<Call<'src>>),
  New(Box<Call<'src>>),
  Func(Box<Func<'src>>),
  Array(Vec<Expr<'src>>),
  Object(Vec<(Ident<'src>, Expr<'src>)>),
  This,
}

#[cfg_attr(test, derive(Debug))]
pub enum Literal<'src> {
  Null,
  Undefined,
  Bool(bool),
  Num(f64),
  Str(Cow<'src, str>),
}

#[cfg_attr(test, derive(Debug))]
pub struct GetVar<'src> {
  pub name: Ident<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct SetVar<'src> {
  pub name: Ident<'src>,
  pub value: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct GetField<'src> {
  pub target: Expr<'src>,
  pub name: Ident<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct SetField<'src> {
  pub target: Expr<'src>,
  pub name: Ident<'src>,
  pub value: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct GetIndex<'src> {
  pub target: Expr<'src>,
  pub key: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct SetIndex<'src> {
  pub target: Expr<'src>,
  pub key: Expr<'src>,
  pub value: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Binary<'src> {
  pub op: BinaryOp,
  pub left: Expr<'src>,
  pub right: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Logical<'src> {
  pub op: LogicalOp,
  pub left: Expr<'src>,
  pub right: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Unary<'src> {
  pub op: UnaryOp,
  pub expr: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Ternary<'src> {
  pub cond: Expr<'src>,
  pub then: Expr<'src>,
  pub otherwise: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Call<'src> {
  pub target: Expr<'src>,
  pub args: Vec<Expr<'src>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Shl,
  Shr,
  UShr,
  BitAnd,
  BitOr,
  BitXor,
  Eq,
  Neq,
  StrictEq,
  StrictNeq,
  Less,
  LessEq,
  More,
  MoreEq,
  In,
  InstanceOf,
}

impl BinaryOp {
  /// The operator name as the interpreter's handler expects it.
  pub fn as_str(&self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Rem => "%",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::UShr => ">>>",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitOr => "|",
      BinaryOp::BitXor => "^",
      BinaryOp::Eq => "==",
      BinaryOp::Neq => "!=",
      BinaryOp::StrictEq => "===",
      BinaryOp::StrictNeq => "!==",
      BinaryOp::Less => "<",
      BinaryOp::LessEq => "<=",
      BinaryOp::More => ">",
      BinaryOp::MoreEq => ">=",
      BinaryOp::In => "in",
      BinaryOp::InstanceOf => "instanceof",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Coalesce,
}

impl LogicalOp {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogicalOp::And => "&&",
      LogicalOp::Or => "||",
      LogicalOp::Coalesce => "??",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  Plus,
  Minus,
  Not,
  BitNot,
  TypeOf,
  Void,
  Delete,
}

impl UnaryOp {
  pub fn as_str(&self) -> &'static str {
    match self {
      UnaryOp::Plus => "+",
      UnaryOp::Minus => "-",
      UnaryOp::Not => "!",
      UnaryOp::BitNot => "~",
      UnaryOp::TypeOf => "typeof",
      UnaryOp::Void => "void",
      UnaryOp::Delete => "delete",
    }
  }
}
