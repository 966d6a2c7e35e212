//! specforge command-line tool
//!
//! Diffs schema snapshots, writes migration artifacts and applies bulk
//! resource documents to a local store.

mod commands;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use formatter::OutputFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// specforge command-line tool
#[derive(Parser, Debug)]
#[command(name = "specforge")]
#[command(version, about = "Schema migration planning and bulk resource processing")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show attribute changes between two schema snapshots
    Diff {
        /// Snapshot already applied
        previous: PathBuf,
        /// Target snapshot
        current: PathBuf,
    },

    /// Plan a migration and write its artifacts
    Plan {
        /// Snapshot already applied
        previous: PathBuf,
        /// Target snapshot
        current: PathBuf,
        /// Artifact directory
        #[arg(short, long, default_value = "database/migrations")]
        out: PathBuf,
        /// Print the plan without writing artifacts
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply a JSON:API bulk document to one entity
    Bulk {
        /// Database directory
        #[arg(long, default_value = "./data")]
        db: PathBuf,
        /// Schema snapshot of the generated models
        #[arg(long)]
        schema: PathBuf,
        /// Runtime policy configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Entity class name
        #[arg(short, long)]
        entity: String,
        /// Operation to apply
        #[arg(long, value_enum)]
        op: BulkOp,
        /// Bulk document
        input: PathBuf,
    },
}

/// Bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BulkOp {
    /// Create new rows
    Create,
    /// Update existing rows
    Update,
    /// Delete existing rows
    Delete,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "specforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let format = args.format;
    let formatter = formatter::create_formatter(format);

    match commands::execute(args.command, &*formatter) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            match format {
                OutputFormat::Json => println!("{}", formatter.format_error(&e)),
                OutputFormat::Table => eprintln!("{}", formatter.format_error(&e)),
            }
            std::process::exit(1);
        }
    }
}
