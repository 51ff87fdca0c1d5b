//! Command-line interface for watermarker
//!
//! clap derive definitions plus dispatch to the command implementations.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
mod output;

pub use output::Output;

/// Watermarker - memory-aware batch watermarking
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path (TOML, JSON or YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable quiet output (minimal)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Watermark every image in the input folder
    Run(commands::run::RunArgs),
    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Process-pool worker (reads tasks on stdin, replies on stdout)
    #[command(hide = true)]
    Worker,
    /// Show version information
    Version,
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default watermarker.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the effective configuration
    Validate,
    /// Show the effective configuration as TOML
    Show,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        crate::logging::init(self.verbose, self.quiet);
        let output = Output::new(self.verbose, self.quiet);
        let config = self.config.as_deref();

        match self.command {
            Some(Commands::Run(args)) => commands::run::execute(args, config, &output).await,
            Some(Commands::Config(cmd)) => commands::config::execute(cmd, config, &output).await,
            Some(Commands::Worker) => commands::worker::execute().await,
            Some(Commands::Version) => commands::version::execute(&output).await,
            None => {
                // Show help when no command is provided
                let mut cmd = Cli::command();
                cmd.print_help()?;
                Ok(())
            }
        }
    }
}
