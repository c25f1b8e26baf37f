mod commands;

use crate::commands::ask::{handle_ask, AskArgs};
use crate::commands::init::{handle_init, InitArgs};
use crate::commands::schema::{handle_schema, SchemaSubcommand};
use clap::{Parser, Subcommand};
use common::error::AskError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "askdb", about = "Ask questions of a relational database in plain language")]
pub struct Cli {
    #[arg(
        long = "config-path",
        short = 'c',
        help = "directory containing askdb-project.yml",
        global = true
    )]
    pub config_path: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Write a starter project and connections file
    Init(InitArgs),
    /// Answer one question and print the JSON response
    Ask(AskArgs),
    /// Extract or inspect the cached schema snapshot
    #[command(subcommand)]
    Schema(SchemaSubcommand),
}

fn run_cmd(func: Result<(), AskError>) {
    if let Err(e) = func {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn main() {
    logging::init_compact_logger();
    let cli = Cli::parse();

    match cli.command {
        Cmd::Init(args) => {
            if let Err(e) = handle_init(&args) {
                eprintln!(
                    "Failed to initialize project at {}: {}",
                    args.path.display(),
                    e
                );
                std::process::exit(1);
            }
        }
        Cmd::Ask(args) => run_cmd(handle_ask(&args, cli.config_path)),
        Cmd::Schema(cmd) => run_cmd(handle_schema(&cmd, cli.config_path)),
    }
}
