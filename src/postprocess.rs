//! Source-level transforms applied to the emitted interpreter text.

use rand::Rng;

/// Review-style chatter injected between lines when dead-code injection is
/// enabled.
const DECOY_COMMENTS: &[&str] = &[
  "// TODO: revisit once the upstream API stabilizes",
  "// cache invalidation handled by the caller",
  "// reviewed 2023-11: no change needed",
  "// keep in sync with the settings panel",
  "// fallback for older runtimes",
  "// note: order matters here",
  "// see the migration notes in the changelog",
  "// benchmarked: loop is faster than map here",
  "// legacy path, kept for compatibility",
  "// upstream issue #482",
];

/// Rewrite every `.name` member access to `["name"]` indexing.
///
/// A single pass suffices for chains (`a.b.c`) because the scanner keys on
/// the previously *emitted* character, and the pass is idempotent: its
/// output contains no rewritable accesses.
pub fn rewrite_properties(source: &str) -> String {
  #[derive(PartialEq)]
  enum State {
    Normal,
    Str(char),
    LineComment,
    BlockComment,
  }

  let mut out = String::with_capacity(source.len());
  let mut state = State::Normal;
  let mut chars = source.chars().peekable();

  while let Some(c) = chars.next() {
    match state {
      State::Str(quote) => {
        out.push(c);
        if c == '\\' {
          if let Some(escaped) = chars.next() {
            out.push(escaped);
          }
        } else if c == quote {
          state = State::Normal;
        }
        continue;
      }
      State::LineComment => {
        out.push(c);
        if c == '\n' {
          state = State::Normal;
        }
        continue;
      }
      State::BlockComment => {
        out.push(c);
        if c == '*' && chars.peek() == Some(&'/') {
          out.push(chars.next().unwrap());
          state = State::Normal;
        }
        continue;
      }
      State::Normal => {}
    }

    match c {
      '"' | '\'' | '`' => {
        state = State::Str(c);
        out.push(c);
      }
      '/' if chars.peek() == Some(&'/') => {
        state = State::LineComment;
        out.push(c);
      }
      '/' if chars.peek() == Some(&'*') => {
        state = State::BlockComment;
        out.push(c);
      }
      '.' if accesses_member(out.chars().next_back().unwrap_or('\0')) => {
        match chars.peek() {
          Some(&first) if is_ident_start(first) => {
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
              if is_ident_part(n) {
                name.push(n);
                chars.next();
              } else {
                break;
              }
            }
            out.push_str("[\"");
            out.push_str(&name);
            out.push_str("\"]");
          }
          _ => out.push(c),
        }
      }
      other => out.push(other),
    }
  }
  out
}

fn accesses_member(previous: char) -> bool {
  is_ident_part(previous) || previous == ')' || previous == ']'
}

fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
  is_ident_start(c) || c.is_ascii_digit()
}

/// Insert innocuous comment lines at random line boundaries. Whole lines
/// only: a comment can land between any two lines without changing the
/// text of either.
pub fn inject_decoys(source: &str, entropy: f64, rng: &mut impl Rng) -> String {
  let lines: Vec<&str> = source.lines().collect();
  let count = ((lines.len() as f64 * 0.08 * entropy.clamp(0.0, 1.0)).ceil() as usize).max(2);

  let mut positions: Vec<usize> = (0..count).map(|_| rng.gen_range(0..=lines.len())).collect();
  positions.sort_unstable();

  let mut out = String::with_capacity(source.len() + count * 48);
  let mut position_iter = positions.iter().peekable();
  for (i, line) in lines.iter().enumerate() {
    while position_iter.peek() == Some(&&i) {
      position_iter.next();
      out.push_str(DECOY_COMMENTS[rng.gen_range(0..DECOY_COMMENTS.len())]);
      out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
  }
  for _ in position_iter {
    out.push_str(DECOY_COMMENTS[rng.gen_range(0..DECOY_COMMENTS.len())]);
    out.push('\n');
  }
  out
}

/// Control-flow flattening hook. The transform proper (function bodies as
/// state-machine switches) is not implemented; the hook is the stable,
/// idempotent seam it will run behind.
pub fn flatten(source: String) -> String {
  source
}
