//! shroud is a source-to-bytecode virtualizing obfuscator for a C-family
//! scripting language. A source file is parsed, lowered to a stack-machine
//! bytecode, encrypted together with its constant pool, and wrapped in a
//! freshly-named interpreter emitted as a single self-contained script.
//!
//! ```no_run
//! let shroud = shroud::Shroud::default();
//! let output = shroud.obfuscate("var x = 2; x * 21;").unwrap();
//! ```
//!
//! The crate also ships a reference interpreter with the same semantics as
//! the emitted one, used to execute sealed programs natively:
//!
//! ```no_run
//! let shroud = shroud::Shroud::default();
//! let program = shroud.compile("1 + 2 * 3;").unwrap();
//! let result = shroud::vm::Vm::new().eval(&program).unwrap();
//! ```

pub mod bytecode;
pub mod codec;
pub mod codegen;
pub mod emit;
mod error;
pub mod names;
pub mod postprocess;
pub mod span;
pub mod syntax;
pub mod vm;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use codec::{CipherKind, SealOptions, SealedProgram};
use names::NameManager;

pub use error::{Error, Result};
pub use vm::{Value, Vm};

/// Obfuscation settings. All protections default to on; see
/// [`ShroudBuilder`] for the knobs.
#[derive(Clone, Debug)]
pub struct Config {
  pub string_encoding: bool,
  pub control_flow_flattening: bool,
  pub dead_code_injection: bool,
  pub self_defending: bool,
  pub debug_protection: bool,
  pub entropy: f64,
  pub transform_object_keys: bool,
  pub vm_name: Option<String>,
  pub ident_length: usize,
  pub strict: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      string_encoding: true,
      control_flow_flattening: true,
      dead_code_injection: true,
      self_defending: true,
      debug_protection: true,
      entropy: 0.9,
      transform_object_keys: true,
      vm_name: None,
      ident_length: 6,
      strict: true,
    }
  }
}

pub struct Shroud {
  config: Config,
}

impl Shroud {
  pub fn builder() -> ShroudBuilder {
    ShroudBuilder {
      config: Config::default(),
    }
  }

  pub fn with_config(config: Config) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Parse, lower and seal a source file without emitting an interpreter.
  pub fn compile(&self, source: &str) -> Result<SealedProgram> {
    let (program, _) = self.lower(source)?;
    Ok(codec::seal(program, &self.seal_options()))
  }

  /// The full pipeline: lower, seal, render the interpreter, post-process.
  pub fn obfuscate(&self, source: &str) -> Result<String> {
    let (program, identifiers) = self.lower(source)?;
    let sealed = codec::seal(program, &self.seal_options());

    let mut rng = rand::thread_rng();
    let mut manager = NameManager::new(self.config.ident_length, identifiers.into_names());
    let mut output = codegen::render(&sealed, &self.config, &mut manager, &mut rng);

    if self.config.transform_object_keys {
      output = postprocess::rewrite_properties(&output);
    }
    if self.config.control_flow_flattening {
      output = postprocess::flatten(output);
    }
    if self.config.dead_code_injection {
      output = postprocess::inject_decoys(&output, self.config.entropy, &mut rng);
    }
    log::debug!("emitted {} bytes of interpreter source", output.len());
    Ok(output)
  }

  /// Obfuscate every input into `output_dir`, keeping file names. Returns
  /// the number of files written.
  pub fn process_files(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = 0;
    for input in inputs {
      let source = std::fs::read_to_string(input)?;
      let output = self.obfuscate(&source)?;
      let name = input
        .file_name()
        .ok_or_else(|| {
          Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", input.display()),
          ))
        })?;
      let target = output_dir.join(name);
      std::fs::write(&target, output)?;
      log::info!("{} -> {}", input.display(), target.display());
      written += 1;
    }
    Ok(written)
  }

  fn lower(&self, source: &str) -> Result<(bytecode::Program, names::IdentifierSet)> {
    let module = syntax::parse(source)?;
    let identifiers = names::collect(&module);
    log::debug!("collected {} identifiers", identifiers.len());
    let mode = if self.config.strict {
      emit::Mode::Strict
    } else {
      emit::Mode::Lossy
    };
    let program = emit::emit(&module, mode)?;
    log::debug!(
      "lowered to {} bytecode bytes and {} constants",
      program.bytecode.len(),
      program.pool.len()
    );
    Ok((program, identifiers))
  }

  fn seal_options(&self) -> SealOptions {
    SealOptions {
      string_encoding: self.config.string_encoding,
      dead_code_injection: self.config.dead_code_injection,
      entropy: self.config.entropy,
      cipher: CipherKind::Aes128Cbc,
    }
  }
}

impl Default for Shroud {
  fn default() -> Self {
    Self {
      config: Config::default(),
    }
  }
}

pub struct ShroudBuilder {
  config: Config,
}

impl ShroudBuilder {
  pub fn string_encoding(mut self, enabled: bool) -> Self {
    self.config.string_encoding = enabled;
    self
  }

  pub fn control_flow_flattening(mut self, enabled: bool) -> Self {
    self.config.control_flow_flattening = enabled;
    self
  }

  pub fn dead_code_injection(mut self, enabled: bool) -> Self {
    self.config.dead_code_injection = enabled;
    self
  }

  pub fn self_defending(mut self, enabled: bool) -> Self {
    self.config.self_defending = enabled;
    self
  }

  pub fn debug_protection(mut self, enabled: bool) -> Self {
    self.config.debug_protection = enabled;
    self
  }

  pub fn entropy(mut self, entropy: f64) -> Self {
    self.config.entropy = entropy.clamp(0.0, 1.0);
    self
  }

  pub fn transform_object_keys(mut self, enabled: bool) -> Self {
    self.config.transform_object_keys = enabled;
    self
  }

  pub fn vm_name(mut self, name: impl Into<String>) -> Self {
    self.config.vm_name = Some(name.into());
    self
  }

  pub fn ident_length(mut self, length: usize) -> Self {
    self.config.ident_length = length;
    self
  }

  /// Lossy lowering: diagnose unsupported constructs and continue with
  /// `UNDEFINED` placeholders instead of aborting.
  pub fn lossy(mut self) -> Self {
    self.config.strict = false;
    self
  }

  pub fn build(self) -> Shroud {
    Shroud {
      config: self.config,
    }
  }
}
