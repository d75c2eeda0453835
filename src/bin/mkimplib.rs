//! Command-line frontend: dump a DLL's export directory as JSON records,
//! build an import library from records, or go DLL to `.lib` in one step.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use implib_writer::{read_exports, DllImports};

#[derive(Parser)]
#[command(
    name = "mkimplib",
    version,
    about = "Synthesize Windows import libraries (.lib) without the Microsoft toolchain"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a DLL's export directory as a JSON symbol listing
    Dump {
        dll: PathBuf,
        /// Defaults to the DLL name with a .json extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build an import library from a JSON symbol listing
    Build {
        records: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build an import library straight from a DLL's export directory
    FromDll {
        dll: PathBuf,
        /// Defaults to the DLL name with a .lib extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    match cli.command {
        Commands::Dump { dll, output } => {
            let records = dump(&dll)?;
            let output = output.unwrap_or_else(|| dll.with_extension("json"));
            fs::write(&output, serde_json::to_string_pretty(&records)?)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("wrote {} records to {}", records.symbols.len(), output.display());
        }
        Commands::Build { records, output } => {
            let text = fs::read_to_string(&records)
                .with_context(|| format!("reading {}", records.display()))?;
            let records: DllImports = serde_json::from_str(&text)
                .with_context(|| "parsing the symbol listing".to_string())?;
            fs::write(&output, records.build()?)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("wrote import library {}", output.display());
        }
        Commands::FromDll { dll, output } => {
            let records = dump(&dll)?;
            let output = output.unwrap_or_else(|| dll.with_extension("lib"));
            fs::write(&output, records.build()?)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("wrote import library {}", output.display());
        }
    }
    Ok(())
}

fn dump(dll: &Path) -> Result<DllImports> {
    let data = fs::read(dll).with_context(|| format!("reading {}", dll.display()))?;
    let name = dll
        .file_name()
        .and_then(|name| name.to_str())
        .context("DLL path has no file name")?;
    Ok(read_exports(&data, name)?)
}
