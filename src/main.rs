use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use emc2_kyra::compile::compile;
use emc2_kyra::decompile::decompile;

/// Lossless assembler/disassembler for EMC2 conversation scripts.
#[derive(Parser)]
#[command(name = "emc2-kyra", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompile an EMC2 binary script into Kyra source text.
    Decode {
        /// Path to the EMC2 FORM container.
        input: PathBuf,
        /// Where to write the Kyra source. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile Kyra source text into an EMC2 binary script.
    Encode {
        /// Path to the Kyra source file.
        input: PathBuf,
        /// Where to write the EMC2 container. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Decode { input, output } => {
            let bytes = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let source = decompile(&bytes).with_context(|| format!("decompiling {}", input.display()))?;
            write_output(output.as_deref(), source.as_bytes())
        }
        Command::Encode { input, output } => {
            let source = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let bytes = compile(&source).with_context(|| format!("compiling {}", input.display()))?;
            write_output(output.as_deref(), &bytes)
        }
    }
}

fn write_output(path: Option<&std::path::Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, bytes).with_context(|| format!("writing {}", path.display())),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(bytes).context("writing to stdout")
        }
    }
}
