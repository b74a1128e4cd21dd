//! Encryption of the lowered program: XOR + base64 wrapping for textual
//! pool entries, and AES-128-CBC (with a per-byte XOR fallback path) for
//! the instruction stream, padded with NOP bytes before encryption.

use std::error::Error as StdError;
use std::fmt::Display;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;

use crate::bytecode::{Constant, Opcode, Program};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Which bytecode cipher the program was sealed with. Recorded in the
/// program metadata; the interpreter falls back to the XOR path when the
/// host lacks a block-cipher facility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CipherKind {
  #[default]
  Aes128Cbc,
  Xor,
}

impl CipherKind {
  pub fn id(self) -> &'static str {
    match self {
      CipherKind::Aes128Cbc => "aes-128-cbc",
      CipherKind::Xor => "xor",
    }
  }
}

/// Textual pool entries keep their role through encoding so decoding can
/// restore the right constant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
  Str,
  Name,
  Body,
}

/// A constant-pool entry as it appears in the sealed program: either a bare
/// constant or an encoded wrapper around a textual one.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEntry {
  Plain(Constant),
  Encoded { kind: TextKind, value: String },
}

/// The sealed program tuple: ciphertext, iv, key, cipher id, the original
/// (pre-padding) bytecode length, and the encoded constant pool.
#[derive(Clone, Debug)]
pub struct SealedProgram {
  pub ciphertext: Vec<u8>,
  pub iv: [u8; 16],
  pub key: [u8; 16],
  pub cipher: CipherKind,
  pub original_len: usize,
  pub pool: Vec<PoolEntry>,
  pub pool_key: Option<String>,
}

#[derive(Debug)]
pub enum CodecError {
  Decrypt,
  Corrupted { expected: usize, actual: usize },
  BadPoolEntry(usize),
}

impl Display for CodecError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CodecError::Decrypt => write!(f, "bytecode decryption failed"),
      CodecError::Corrupted { expected, actual } => {
        write!(f, "decoded bytecode length {actual}, expected {expected}")
      }
      CodecError::BadPoolEntry(index) => write!(f, "constant pool entry {index} is malformed"),
    }
  }
}

impl StdError for CodecError {}

/// Knobs the sealing stage takes from the obfuscator configuration.
#[derive(Clone, Copy, Debug)]
pub struct SealOptions {
  pub string_encoding: bool,
  pub dead_code_injection: bool,
  pub entropy: f64,
  pub cipher: CipherKind,
}

impl Default for SealOptions {
  fn default() -> Self {
    Self {
      string_encoding: true,
      dead_code_injection: true,
      entropy: 0.9,
      cipher: CipherKind::default(),
    }
  }
}

/// Seal a lowered program: encode the pool, splice NOP padding, encrypt.
pub fn seal(program: Program, options: &SealOptions) -> SealedProgram {
  let mut rng = rand::thread_rng();
  let Program { bytecode, pool } = program;

  let mut pool: Vec<PoolEntry> = pool.into_iter().map(PoolEntry::Plain).collect();
  let pool_key = if options.string_encoding {
    let key = random_key(&mut rng, 24);
    encode_pool(&mut pool, &key);
    Some(key)
  } else {
    None
  };

  let original_len = bytecode.len();
  let padded = if options.dead_code_injection {
    splice_nops(bytecode, options.entropy, &mut rng)
  } else {
    bytecode
  };

  let mut key = [0u8; 16];
  let mut iv = [0u8; 16];
  rng.fill(&mut key[..]);
  rng.fill(&mut iv[..]);

  let ciphertext = match options.cipher {
    CipherKind::Aes128Cbc => {
      Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&padded)
    }
    CipherKind::Xor => xor_stream(&padded, &key),
  };

  log::debug!(
    "sealed {original_len} bytecode bytes as {} ciphertext bytes ({})",
    ciphertext.len(),
    options.cipher.id()
  );

  SealedProgram {
    ciphertext,
    iv,
    key,
    cipher: options.cipher,
    original_len,
    pool,
    pool_key,
  }
}

/// Recover the executable bytecode: decrypt, fall back to the XOR path on
/// failure, strip NOP padding, and verify the recorded length.
pub fn open(sealed: &SealedProgram) -> Result<Vec<u8>, CodecError> {
  let decrypted = match sealed.cipher {
    CipherKind::Aes128Cbc => {
      Aes128CbcDec::new(&sealed.key.into(), &sealed.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&sealed.ciphertext)
        .unwrap_or_else(|_| xor_stream(&sealed.ciphertext, &sealed.key))
    }
    CipherKind::Xor => xor_stream(&sealed.ciphertext, &sealed.key),
  };
  let stripped: Vec<u8> = decrypted
    .into_iter()
    .filter(|&b| b != Opcode::Nop as u8)
    .collect();
  if stripped.len() != sealed.original_len {
    return Err(CodecError::Corrupted {
      expected: sealed.original_len,
      actual: stripped.len(),
    });
  }
  Ok(stripped)
}

/// Wrap every textual entry as base64(xor(bytes, key)). Entries that are
/// already encoded are left untouched, so re-encoding is a no-op.
pub fn encode_pool(pool: &mut [PoolEntry], key: &str) {
  for entry in pool.iter_mut() {
    let (kind, text) = match entry {
      PoolEntry::Plain(Constant::Str(v)) => (TextKind::Str, v),
      PoolEntry::Plain(Constant::Name(v)) => (TextKind::Name, v),
      PoolEntry::Plain(Constant::Body(v)) => (TextKind::Body, v),
      _ => continue,
    };
    let value = BASE64.encode(xor_stream(text.as_bytes(), key.as_bytes()));
    *entry = PoolEntry::Encoded { kind, value };
  }
}

/// Restore the pool the interpreter dispatches over.
pub fn decode_pool(pool: &[PoolEntry], key: Option<&str>) -> Result<Vec<Constant>, CodecError> {
  pool
    .iter()
    .enumerate()
    .map(|(index, entry)| match entry {
      PoolEntry::Plain(constant) => Ok(constant.clone()),
      PoolEntry::Encoded { kind, value } => {
        let key = key.ok_or(CodecError::BadPoolEntry(index))?;
        let bytes = BASE64
          .decode(value)
          .map_err(|_| CodecError::BadPoolEntry(index))?;
        let text = String::from_utf8(xor_stream(&bytes, key.as_bytes()))
          .map_err(|_| CodecError::BadPoolEntry(index))?;
        Ok(match kind {
          TextKind::Str => Constant::Str(text),
          TextKind::Name => Constant::Name(text),
          TextKind::Body => Constant::Body(text),
        })
      }
    })
    .collect()
}

/// Symmetric per-byte XOR against cycled key material.
pub fn xor_stream(bytes: &[u8], key: &[u8]) -> Vec<u8> {
  bytes
    .iter()
    .zip(key.iter().cycle())
    .map(|(b, k)| b ^ k)
    .collect()
}

/// Splice `entropy * 0.3 * len` NOP bytes at random positions. Runs on the
/// plaintext: the runtime strips NOPs after decryption, and a block cipher
/// would not survive bytes inserted into its ciphertext.
fn splice_nops(mut bytecode: Vec<u8>, entropy: f64, rng: &mut impl Rng) -> Vec<u8> {
  let count = (entropy.clamp(0.0, 1.0) * 0.3 * bytecode.len() as f64).round() as usize;
  for _ in 0..count {
    let position = rng.gen_range(0..=bytecode.len());
    bytecode.insert(position, Opcode::Nop as u8);
  }
  bytecode
}

fn random_key(rng: &mut impl Rng, length: usize) -> String {
  const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
  (0..length)
    .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_program() -> Program {
    Program {
      bytecode: vec![0x01, 0x00, 0x01, 0x01, 0x04, 0x02, 0x0e, 0x1e, 0x06],
      pool: vec![
        Constant::Num(1.0),
        Constant::Num(2.0),
        Constant::Str("+".into()),
      ],
    }
  }

  #[test]
  fn seal_open_round_trips_with_padding() {
    let program = sample_program();
    let bytecode = program.bytecode.clone();
    let sealed = seal(program, &SealOptions::default());
    assert!(sealed.ciphertext.len() > bytecode.len());
    assert_eq!(open(&sealed).unwrap(), bytecode);
  }

  #[test]
  fn seal_open_round_trips_on_the_xor_path() {
    let program = sample_program();
    let bytecode = program.bytecode.clone();
    let sealed = seal(
      program,
      &SealOptions {
        cipher: CipherKind::Xor,
        ..SealOptions::default()
      },
    );
    assert_eq!(sealed.cipher.id(), "xor");
    assert_eq!(open(&sealed).unwrap(), bytecode);
  }

  #[test]
  fn padding_volume_scales_with_entropy() {
    let long = Program {
      bytecode: vec![0x0e; 1000],
      pool: vec![],
    };
    let sealed = seal(
      long,
      &SealOptions {
        entropy: 1.0,
        cipher: CipherKind::Xor,
        ..SealOptions::default()
      },
    );
    // ~300 NOPs for entropy 1.0
    assert_eq!(sealed.ciphertext.len(), 1300);
  }

  #[test]
  fn fresh_keys_make_distinct_ciphertexts() {
    let a = seal(sample_program(), &SealOptions::default());
    let b = seal(sample_program(), &SealOptions::default());
    assert_ne!(a.ciphertext, b.ciphertext);
    assert_ne!(a.key, b.key);
    assert_ne!(a.iv, b.iv);
  }

  #[test]
  fn tampered_ciphertext_is_rejected() {
    let mut sealed = seal(sample_program(), &SealOptions::default());
    sealed.ciphertext.truncate(sealed.ciphertext.len() / 2);
    assert!(open(&sealed).is_err());
  }

  #[test]
  fn pool_encoding_wraps_only_textual_entries() {
    let mut pool = vec![
      PoolEntry::Plain(Constant::Num(7.0)),
      PoolEntry::Plain(Constant::Str("hello".into())),
      PoolEntry::Plain(Constant::Name("x".into())),
      PoolEntry::Plain(Constant::Bool(true)),
      PoolEntry::Plain(Constant::Offset(-3)),
      PoolEntry::Plain(Constant::Params(vec!["a".into()])),
    ];
    encode_pool(&mut pool, "key");
    assert!(matches!(pool[0], PoolEntry::Plain(Constant::Num(_))));
    assert!(matches!(pool[1], PoolEntry::Encoded { kind: TextKind::Str, .. }));
    assert!(matches!(pool[2], PoolEntry::Encoded { kind: TextKind::Name, .. }));
    assert!(matches!(pool[3], PoolEntry::Plain(Constant::Bool(true))));
    assert!(matches!(pool[4], PoolEntry::Plain(Constant::Offset(-3))));
    assert!(matches!(pool[5], PoolEntry::Plain(Constant::Params(_))));
  }

  #[test]
  fn re_encoding_an_encoded_pool_is_a_no_op() {
    let mut pool = vec![PoolEntry::Plain(Constant::Str("hello".into()))];
    encode_pool(&mut pool, "key");
    let once = pool.clone();
    encode_pool(&mut pool, "other key");
    assert_eq!(pool, once);
  }

  #[test]
  fn pool_round_trips_through_decode() {
    let constants = vec![
      Constant::Num(1.5),
      Constant::Str("a string".into()),
      Constant::Name("ident".into()),
      Constant::Body("return 1;".into()),
      Constant::Offset(12),
    ];
    let mut pool: Vec<PoolEntry> = constants
      .iter()
      .cloned()
      .map(PoolEntry::Plain)
      .collect();
    encode_pool(&mut pool, "secret");
    let decoded = decode_pool(&pool, Some("secret")).unwrap();
    assert_eq!(decoded, constants);
  }

  #[test]
  fn decoding_encoded_pool_without_key_fails() {
    let mut pool = vec![PoolEntry::Plain(Constant::Str("s".into()))];
    encode_pool(&mut pool, "secret");
    assert!(decode_pool(&pool, None).is_err());
  }

  #[test]
  fn xor_stream_is_symmetric() {
    let data = b"the quick brown fox";
    let key = b"k3y";
    assert_eq!(xor_stream(&xor_stream(data, key), key), data.to_vec());
  }
}
