use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::Overrides;

#[derive(Parser)]
#[command(name = "index-financials")]
#[command(about = "Scrape index constituents and enrich them with per-symbol financials")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pipeline configuration JSON (defaults to assets/configs/sp500.json, then builtin)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the CSV files and data package are written to
    #[arg(short, long, global = true, default_value = "data")]
    pub data_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape the constituents table into constituents.csv
    Constituents(ScrapeArgs),

    /// Fetch financials for every constituent and write the merged file
    Financials(FetchArgs),

    /// Scrape, then fetch financials
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Check the written files against the data package schema
    Validate,

    /// Print a CSV file as a table
    Show {
        /// Path to the CSV file
        file: PathBuf,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Clone, Default)]
pub struct ScrapeArgs {
    /// Read the source page from a saved HTML file instead of downloading it
    #[arg(long)]
    pub html: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct FetchArgs {
    /// Symbols per request
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Batches allowed in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Minimum delay between requests, in milliseconds
    #[arg(long)]
    pub min_interval_ms: Option<u64>,

    /// Cache raw responses in this directory and reuse them on later runs
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Drop symbols missing from a response instead of aborting
    #[arg(long)]
    pub skip_missing: bool,
}

impl FetchArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            min_interval_ms: self.min_interval_ms,
            cache_dir: self.cache_dir.clone(),
            skip_missing: self.skip_missing,
        }
    }
}

pub fn show_banner() {
    println!("# ------------------------------------------------------------------------ #");
    println!("# Index constituents & financials");
    println!("# Executing date: {}", crate::utils::current_human_timestamp());
    println!("# ------------------------------------------------------------------------ #");
}
