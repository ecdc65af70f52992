use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tripscrape::config::Settings;
use tripscrape::model::{Section, Watermark};
use tripscrape::process::Session;
use tripscrape::sink::read_url_list;
use tripscrape::{info_time, logging, Error, Result};

#[derive(Debug, Parser)]
#[command(name = "tripscrape", version, about)]
struct Cli {
    /// Settings file, defaults to `scraper.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Show the browser window and log at DEBUG level.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect place urls from one search results page.
    Urls {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "ATTRACTIONS")]
        section: Section,
    },
    /// Scrape metadata of every place in a url list.
    Places {
        /// Defaults to the configured url list.
        #[arg(long)]
        urls_file: Option<PathBuf>,
    },
    /// Scrape the reviews of a place written on or after `min_date`.
    Reviews {
        #[arg(long)]
        url: String,
        /// e.g. 2020-01-31
        #[arg(long)]
        min_date: NaiveDate,
        #[arg(long, default_value = "en")]
        lang: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.debug {
        settings.headless = false;
    }
    let _log_guard = logging::init(&settings, cli.debug)?;
    info!("Started scraping");

    let mut session = Session::open(settings);
    let outcome = tokio::select! {
        res = run(&mut session, cli.command) => res,
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
    };
    if let Err(e) = &outcome {
        error!("Run failed: {e:?}");
    }
    let closed = session.close().await;
    info_time!(start_time, "Full program time:");

    outcome.and(closed)
}

async fn run(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Urls { query, section } => {
            let urls = session.scrape_place_listings(&query, section).await?;
            info!(
                "Wrote {} urls to {}",
                urls.len(),
                session.settings().url_path().display()
            );
        }
        Command::Places { urls_file } => {
            let path = urls_file.unwrap_or_else(|| session.settings().url_path());
            let urls = read_url_list(&path).await?;
            for url in &urls {
                let place = session.scrape_place(url).await?;
                info!("Scraped {} ({}, {} reviews)", place.name, place.id, place.review_count);
            }
        }
        Command::Reviews {
            url,
            min_date,
            lang,
        } => {
            let summary = session
                .scrape_reviews(&url, Watermark::new(min_date), &lang)
                .await?;
            info!(
                "Wrote {} new reviews of {} ({:?})",
                summary.written, summary.total, summary.stopped
            );
        }
    }
    Ok(())
}
