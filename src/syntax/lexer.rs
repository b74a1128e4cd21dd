#![allow(non_camel_case_types)]

use logos::Logos;

use super::SyntaxError;
use crate::span::Span;

#[derive(Clone, Copy, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
}

/// Tokenize the whole source up front. Keeping the tokens in a flat buffer
/// makes the single backtracking point in the parser (arrow-function
/// parameter lists) a matter of saving and restoring an index.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
  let mut lexer = TokenKind::lexer(src);
  let mut tokens = Vec::new();
  while let Some(kind) = lexer.next() {
    let span = Span::from(lexer.span());
    match kind {
      Ok(kind) => tokens.push(Token { kind, span }),
      Err(()) => return Err(SyntaxError::new("unexpected character", span)),
    }
  }
  let end = src.len();
  tokens.push(Token {
    kind: TokenKind::Tok_Eof,
    span: Span {
      start: end,
      end,
    },
  });
  Ok(tokens)
}

#[derive(Clone, Copy, Debug, Logos, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum TokenKind {
  // Keywords
  #[token("var")]
  #[token("let")]
  #[token("const")]
  Kw_Var,
  #[token("function")]
  Kw_Function,
  #[token("return")]
  Kw_Return,
  #[token("if")]
  Kw_If,
  #[token("else")]
  Kw_Else,
  #[token("while")]
  Kw_While,
  #[token("for")]
  Kw_For,
  #[token("switch")]
  Kw_Switch,
  #[token("case")]
  Kw_Case,
  #[token("default")]
  Kw_Default,
  #[token("break")]
  Kw_Break,
  #[token("continue")]
  Kw_Continue,
  #[token("try")]
  Kw_Try,
  #[token("catch")]
  Kw_Catch,
  #[token("finally")]
  Kw_Finally,
  #[token("throw")]
  Kw_Throw,
  #[token("new")]
  Kw_New,
  #[token("this")]
  Kw_This,
  #[token("typeof")]
  Kw_TypeOf,
  #[token("void")]
  Kw_Void,
  #[token("delete")]
  Kw_Delete,
  #[token("in")]
  Kw_In,
  #[token("instanceof")]
  Kw_InstanceOf,

  // Brackets
  #[token("{")]
  Brk_CurlyL,
  #[token("}")]
  Brk_CurlyR,
  #[token("(")]
  Brk_ParenL,
  #[token(")")]
  Brk_ParenR,
  #[token("[")]
  Brk_SquareL,
  #[token("]")]
  Brk_SquareR,

  // Punctuation
  #[token(".")]
  Op_Dot,
  #[token(",")]
  Tok_Comma,
  #[token(";")]
  Tok_Semicolon,
  #[token(":")]
  Tok_Colon,
  #[token("?")]
  Tok_Question,
  #[token("=>")]
  Op_Arrow,

  // Operators
  #[token("=")]
  Op_Equal,
  #[token("==")]
  Op_EqualEqual,
  #[token("===")]
  Op_EqualEqualEqual,
  #[token("!=")]
  Op_BangEqual,
  #[token("!==")]
  Op_BangEqualEqual,
  #[token("+")]
  Op_Plus,
  #[token("-")]
  Op_Minus,
  #[token("*")]
  Op_Star,
  #[token("/")]
  Op_Slash,
  #[token("%")]
  Op_Percent,
  #[token("<")]
  Op_Less,
  #[token("<=")]
  Op_LessEqual,
  #[token(">")]
  Op_More,
  #[token(">=")]
  Op_MoreEqual,
  #[token("<<")]
  Op_Shl,
  #[token(">>")]
  Op_Shr,
  #[token(">>>")]
  Op_UShr,
  #[token("&")]
  Op_And,
  #[token("|")]
  Op_Pipe,
  #[token("^")]
  Op_Caret,
  #[token("~")]
  Op_Tilde,
  #[token("!")]
  Op_Bang,
  #[token("&&")]
  Op_AndAnd,
  #[token("||")]
  Op_PipePipe,
  #[token("??")]
  Op_QuestionQuestion,

  // Literals
  #[token("null")]
  Lit_Null,
  #[token("undefined")]
  Lit_Undefined,
  #[token("true")]
  Lit_True,
  #[token("false")]
  Lit_False,
  #[regex(r"[0-9]+(\.[0-9]+)?([Ee][+-]?[0-9]+)?")]
  Lit_Number,
  #[regex(r#""([^"\\]|\\.)*""#)]
  #[regex(r#"'([^'\\]|\\.)*'"#)]
  Lit_String,
  #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*")]
  Lit_Ident,

  Tok_Eof,
}

impl TokenKind {
  pub fn name(&self) -> &'static str {
    match self {
      TokenKind::Kw_Var => "var",
      TokenKind::Kw_Function => "function",
      TokenKind::Kw_Return => "return",
      TokenKind::Kw_If => "if",
      TokenKind::Kw_Else => "else",
      TokenKind::Kw_While => "while",
      TokenKind::Kw_For => "for",
      TokenKind::Kw_Switch => "switch",
      TokenKind::Kw_Case => "case",
      TokenKind::Kw_Default => "default",
      TokenKind::Kw_Break => "break",
      TokenKind::Kw_Continue => "continue",
      TokenKind::Kw_Try => "try",
      TokenKind::Kw_Catch => "catch",
      TokenKind::Kw_Finally => "finally",
      TokenKind::Kw_Throw => "throw",
      TokenKind::Kw_New => "new",
      TokenKind::Kw_This => "this",
      TokenKind::Kw_TypeOf => "typeof",
      TokenKind::Kw_Void => "void",
      TokenKind::Kw_Delete => "delete",
      TokenKind::Kw_In => "in",
      TokenKind::Kw_InstanceOf => "instanceof",
      TokenKind::Brk_CurlyL => "{",
      TokenKind::Brk_CurlyR => "}",
      TokenKind::Brk_ParenL => "(",
      TokenKind::Brk_ParenR => ")",
      TokenKind::Brk_SquareL => "[",
      TokenKind::Brk_SquareR => "]",
      TokenKind::Op_Dot => ".",
      TokenKind::Tok_Comma => ",",
      TokenKind::Tok_Semicolon => ";",
      TokenKind::Tok_Colon => ":",
      TokenKind::Tok_Question => "?",
      TokenKind::Op_Arrow => "=>",
      TokenKind::Op_Equal => "=",
      TokenKind::Op_EqualEqual => "==",
      TokenKind::Op_EqualEqualEqual => "===",
      TokenKind::Op_BangEqual => "!=",
      TokenKind::Op_BangEqualEqual => "!==",
      TokenKind::Op_Plus => "+",
      TokenKind::Op_Minus => "-",
      TokenKind::Op_Star => "*",
      TokenKind::Op_Slash => "/",
      TokenKind::Op_Percent => "%",
      TokenKind::Op_Less => "<",
      TokenKind::Op_LessEqual => "<=",
      TokenKind::Op_More => ">",
      TokenKind::Op_MoreEqual => ">=",
      TokenKind::Op_Shl => "<<",
      TokenKind::Op_Shr => ">>",
      TokenKind::Op_UShr => ">>>",
      TokenKind::Op_And => "&",
      TokenKind::Op_Pipe => "|",
      TokenKind::Op_Caret => "^",
      TokenKind::Op_Tilde => "~",
      TokenKind::Op_Bang => "!",
      TokenKind::Op_AndAnd => "&&",
      TokenKind::Op_PipePipe => "||",
      TokenKind::Op_QuestionQuestion => "??",
      TokenKind::Lit_Null => "null",
      TokenKind::Lit_Undefined => "undefined",
      TokenKind::Lit_True => "true",
      TokenKind::Lit_False => "false",
      TokenKind::Lit_Number => "number",
      TokenKind::Lit_String => "string",
      TokenKind::Lit_Ident => "identifier",
      TokenKind::Tok_Eof => "<eof>",
    }
  }
}
