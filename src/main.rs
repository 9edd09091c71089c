use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use index_financials::app::{resolve_config, AppController, Overrides};
use index_financials::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    let overrides = match &cli.command {
        Commands::Financials(fetch) | Commands::Run { fetch, .. } => fetch.overrides(),
        _ => Overrides::default(),
    };
    let config = resolve_config(cli.config.as_deref(), &root, &overrides)?;
    let app = AppController::new(config, &cli.data_dir);

    match &cli.command {
        Commands::Constituents(scrape) => {
            app.scrape(scrape.html.as_deref()).await?;
        }
        Commands::Financials(_) => {
            run_financials(&app).await?;
        }
        Commands::Run { scrape, .. } => {
            cli::show_banner();
            app.scrape(scrape.html.as_deref()).await?;
            run_financials(&app).await?;
        }
        Commands::Validate => {
            let report = app.validate()?;
            print!("{report}");
            if !report.is_valid() {
                bail!("the data did not pass validation");
            }
        }
        Commands::Show { file, limit } => {
            print!("{}", app.show(file, *limit)?);
        }
    }

    Ok(())
}

async fn run_financials(app: &AppController) -> Result<()> {
    let outcome = app.financials().await?;
    if !outcome.skipped.is_empty() {
        println!(
            "Skipped {} symbols with no data: {}",
            outcome.skipped.len(),
            outcome.skipped.join(", ")
        );
    }
    info!("Finished. Data package written to {}", app.package_path().display());
    Ok(())
}
