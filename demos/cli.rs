use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use shroud::{Shroud, Vm};

/// Obfuscate scripts, or run them on the reference interpreter.
#[derive(Parser)]
struct Args {
  /// Input script files
  inputs: Vec<PathBuf>,

  /// Directory the obfuscated outputs are written to
  #[arg(short, long, default_value = "obfuscated")]
  output: PathBuf,

  /// Execute on the reference interpreter instead of emitting output
  #[arg(long)]
  run: bool,

  /// Override the generated root interpreter identifier
  #[arg(long)]
  vm_name: Option<String>,

  /// Padding and decoy volume, 0.0..=1.0
  #[arg(long, default_value_t = 0.9)]
  entropy: f64,

  /// Disable constant-pool string encoding
  #[arg(long)]
  no_string_encoding: bool,

  /// Disable anti-debug and self-defense probes
  #[arg(long)]
  no_protections: bool,
}

fn main() -> Result<()> {
  let args = Args::parse();
  if args.inputs.is_empty() {
    bail!("no input files");
  }

  let mut builder = Shroud::builder()
    .entropy(args.entropy)
    .string_encoding(!args.no_string_encoding);
  if args.no_protections {
    builder = builder.self_defending(false).debug_protection(false);
  }
  if let Some(name) = args.vm_name {
    builder = builder.vm_name(name);
  }
  let shroud = builder.build();

  if args.run {
    let mut vm = Vm::new();
    for input in &args.inputs {
      let source = std::fs::read_to_string(input)?;
      let program = shroud.compile(&source)?;
      match vm.eval(&program) {
        Ok(value) => println!("{value}"),
        Err(e) => bail!("{}: {e}", input.display()),
      }
    }
    return Ok(());
  }

  let written = shroud.process_files(&args.inputs, &args.output)?;
  eprintln!("wrote {written} file(s) to {}", args.output.display());
  Ok(())
}
