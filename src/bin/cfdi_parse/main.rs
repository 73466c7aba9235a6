//! cfdiparse - Extract CFDI 4.0 invoice data into an Excel file.
//!
//! Without path arguments this asks for the Excel file name and directory,
//! then reads CFDI XML file paths one at a time and appends a row for each document.
//! With path arguments all XML files found are processed without prompting.

mod config;
mod logger;
mod parse;
mod record;
mod schema;
mod session;
mod sink;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

pub use crate::config::Config;
use crate::logger::FileLogger;
use crate::session::Session;

/// Command line arguments for cfdiparse.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Extract CFDI 4.0 invoice data into an Excel file"
)]
pub struct CfdiParseArgs {
    /// Optional XML files or directories to process without prompting
    #[arg(value_hint = clap::ValueHint::AnyPath)]
    pub path: Vec<PathBuf>,

    /// Output directory for the Excel file
    #[arg(short, long, name = "OUTPUT_DIR")]
    pub output: Option<String>,

    /// Excel file name without extension
    #[arg(short, long, name = "NAME")]
    pub name: Option<String>,

    /// Append to an existing Excel file instead of recreating it
    #[arg(short, long)]
    pub keep: bool,

    /// Write a session log file
    #[arg(short = 'g', long)]
    pub log: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    pub completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let args = CfdiParseArgs::parse();
    if let Some(ref shell) = args.completion {
        return cfdi_tools::generate_shell_completion(*shell, CfdiParseArgs::command(), env!("CARGO_BIN_NAME"));
    }

    let config = Config::from_args(&args)?;
    let logger = if config.log {
        FileLogger::new()
            .inspect_err(|error| cfdi_tools::print_warning!("Session log disabled: {error}"))
            .ok()
    } else {
        None
    };

    let mut session = Session::new(config, io::stdin().lock(), io::stdout());
    if let Some(logger) = logger {
        session = session.with_logger(logger);
    }
    session.run()?;
    Ok(())
}
