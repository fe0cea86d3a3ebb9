use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use outlay::{ConfigLoader, TransactionService};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "outlay", version, about = "Import card statements and categorize spending")]
struct Cli {
    /// Read config files and the default database from this directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a statement file and store its transactions
    Import {
        file: PathBuf,

        /// Institution id from parsers.toml (inferred from the extension when omitted)
        #[arg(long = "fi")]
        financial_institution: Option<String>,

        /// Report what would be imported without writing
        #[arg(long)]
        dry_run: bool,

        /// Categorize transactions before saving
        #[arg(long)]
        categorize: bool,
    },

    /// Totals and top categories for one month
    Summary { year: i32, month: u32 },

    /// Apply categorization rules to stored transactions
    Categorize {
        /// Replace categories that are already set
        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Show the categorization rule chain in priority order
    Rules,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::from_user_dirs()?,
    };
    let mut service = TransactionService::from_config(&loader)
        .with_context(|| format!("loading configuration from {}", loader.config_dir().display()))?;

    match cli.command {
        Command::Import {
            file,
            financial_institution,
            dry_run,
            categorize,
        } => {
            let fi = match financial_institution {
                Some(fi) => fi,
                None => service.detect_institution(&file)?,
            };
            let result = service
                .import_statement(&file, &fi, dry_run, categorize)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("{result}");

            let listed = if dry_run { &result.imported } else { &result.skipped };
            if !listed.is_empty() {
                println!("\n{}:", if dry_run { "Would import" } else { "Skipped" });
                for txn in listed {
                    println!("  {txn}  [{}]", txn.category_or_default());
                }
            }
        }

        Command::Summary { year, month } => {
            let summary = service.get_monthly_summary(year, month)?;
            println!("{summary}");
        }

        Command::Categorize { overwrite, start, end } => {
            let count = service.categorize_transactions(start, end, overwrite)?;
            println!("Categorized {count} transactions");
        }

        Command::Rules => {
            for line in service.engine().describe() {
                println!("{line}");
            }
        }
    }

    Ok(())
}
