mod browser;
mod config;
mod error;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::browser::ChromeDriver;
use crate::config::AppConfig;
use crate::loader::TokioPause;
use crate::pipeline::Pipeline;
use crate::scraper::ApiSource;

#[derive(Parser)]
#[command(
    name = "the-rankings",
    about = "Times Higher Education world university rankings scraper",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch tables from the JSON endpoints (general + subject tables)
    Api {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Scrape the rendered rankings page with headless Chrome
    Browser {
        #[command(flatten)]
        run: RunArgs,

        /// Run Chrome headless (true/false)
        #[arg(long, value_name = "BOOL")]
        headless: Option<bool>,

        /// Page load timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Per-tab budget for loading more rows, in seconds
        #[arg(long, value_name = "SECS")]
        scroll_wait: Option<u64>,

        /// Write the data endpoints each page called to api_endpoints_{year}.txt
        #[arg(long)]
        save_endpoints: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Years or ranges, e.g. `2025` or `2011-2026,2030`
    #[arg(long, value_delimiter = ',')]
    years: Vec<String>,

    /// Test mode: at most this many rows per table
    #[arg(long, conflicts_with = "full")]
    limit: Option<usize>,

    /// Target the full dataset (drops any configured limit)
    #[arg(long)]
    full: bool,

    /// Subject slugs to scrape besides the general table
    #[arg(long, value_delimiter = ',')]
    subjects: Vec<String>,

    /// Output directory
    #[arg(long, env = "THE_OUTDIR")]
    outdir: Option<PathBuf>,
}

impl RunArgs {
    /// Flags win over config files and environment.
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if !self.years.is_empty() {
            let mut years = Vec::new();
            for spec in &self.years {
                years.extend(
                    utils::parse_years(spec).with_context(|| format!("Bad --years '{}'", spec))?,
                );
            }
            years.sort_unstable();
            years.dedup();
            config.run.years = years;
        }
        if self.full {
            config.run.limit = None;
        }
        if let Some(limit) = self.limit {
            config.run.limit = Some(limit);
        }
        if !self.subjects.is_empty() {
            config.run.subjects = self.subjects.iter().map(|s| utils::slugify(s)).collect();
        }
        if let Some(dir) = &self.outdir {
            config.output.out_dir = dir.clone();
        }
        if config.run.years.is_empty() {
            bail!("No years to scrape");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "the_rankings=info,warn",
        1 => "the_rankings=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Api { run } => {
            run.apply(&mut config)?;
            let _t = utils::Timer::start("API scrape");

            let api = ApiSource::new(&config.scraper).context("Failed to build API client")?;
            let summary = Pipeline::new(config).run_api(&api).await?;
            summary.log();
        }

        Command::Browser {
            run,
            headless,
            timeout,
            scroll_wait,
            save_endpoints,
        } => {
            run.apply(&mut config)?;
            if let Some(headless) = headless {
                config.browser.headless = headless;
            }
            if let Some(secs) = timeout {
                config.browser.timeout_secs = secs;
            }
            if let Some(secs) = scroll_wait {
                config.browser.scroll_wait_secs = secs;
            }
            if save_endpoints {
                config.browser.save_endpoints = true;
            }
            let _t = utils::Timer::start("Browser scrape");

            let driver = ChromeDriver::launch(&config.browser)
                .await
                .context("Failed to launch Chrome")?;
            let result = Pipeline::new(config).run_browser(&driver, &TokioPause).await;
            driver.close().await;
            result?.log();
        }

        Command::Config { run } => {
            run.apply(&mut config)?;
            info!("Effective configuration:");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
