//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wildprompt - wildcard expansion and prompt pipeline
#[derive(Parser, Debug)]
#[command(name = "wildprompt")]
#[command(about = "Expand wildcard prompt templates and run the prompt pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Wildcard directory; overrides the configured one
    #[arg(short, long, global = true)]
    pub wildcards: Option<PathBuf>,

    /// Seed for reproducible random choices
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand a comma-separated tag list and print the result
    Expand {
        /// Template text, e.g. "<hair>, __pose__, smile"
        text: String,
    },

    /// Run the full pipeline over a JSON request
    Process {
        /// Path to the request JSON file
        #[arg(long)]
        request: PathBuf,

        /// Session file carrying sequential progress; rewritten after the run
        #[arg(long)]
        session: Option<PathBuf>,

        /// Print the whole resulting context as JSON
        #[arg(long)]
        json: bool,
    },

    /// List loaded wildcards with their entry counts
    List,

    /// Run a script against tag lists
    Script {
        /// Path to the script source
        #[arg(long)]
        file: PathBuf,

        /// Input variable as name=tag,tag (repeatable)
        #[arg(long = "tags", value_name = "NAME=TAGS")]
        tags: Vec<String>,
    },

    /// Watch the wildcard directory and reload on change until Ctrl-C
    Watch,
}
