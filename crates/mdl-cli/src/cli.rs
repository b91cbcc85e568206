use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "medledger",
    about = "MedLedger: queued, replicated medical asset ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server and the periodic job applier
    Serve(ServeArgs),
    /// Ask a Redis server whether it may be used as the job store
    CheckPolicy(CheckPolicyArgs),
    /// Print the canonical encoding and digest of a JSON file
    Canonical(CanonicalArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct CheckPolicyArgs {
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    pub redis: String,
}

#[derive(Args)]
pub struct CanonicalArgs {
    pub file: PathBuf,
    /// Also check that the document is a valid asset
    #[arg(long)]
    pub asset: bool,
}
