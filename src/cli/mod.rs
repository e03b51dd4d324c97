//! CLI interface for classpix

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "classpix")]
#[command(version = "1.0.0")]
#[command(about = "Kindergarten photo sharing and classroom management server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default classpix.toml configuration file
    Init,

    /// Create the database schema and insert demo data
    InitDb {
        /// Skip inserting demo rows
        #[arg(long)]
        no_seed: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
