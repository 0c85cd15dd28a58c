use anyhow::Result;
use clap::Parser;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod error;
mod fetcher;
mod harvester;
mod models;
mod scraper;
mod traits;

use crate::config::{Cli, SiteConfig};
use crate::database::Database;
use crate::fetcher::HttpFetcher;
use crate::harvester::{Harvester, Sink};
use crate::scraper::{DetailPageScraper, PaginationController};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.info {
        let database = Database::new(&cli.database_url).await?;
        info!("Total listings: {}", database.count_listings().await?);
        for (area, total) in database.count_by_area().await? {
            info!("  {}: {}", area, total);
        }
        return Ok(());
    }

    let site = SiteConfig::property24();

    if let Some(url) = &cli.details {
        let fetcher = HttpFetcher::new(&site.user_agent)?;
        match DetailPageScraper::new(&site)?.scrape(&fetcher, url).await {
            Some(details) => info!("{}", serde_json::to_string_pretty(&details)?),
            None => warn!("No details found for {}", url),
        }
        return Ok(());
    }

    info!("Starting {} listing harvester", site.name);

    let sink = if cli.dry_run {
        Sink::JsonFile(std::env::current_dir()?)
    } else {
        let database = Database::new(&cli.database_url).await?;
        if cli.clean {
            database.clear().await?;
        }
        Sink::Database(database)
    };

    let fetcher = HttpFetcher::new(&site.user_agent)?;
    let controller = PaginationController::new(site, fetcher, cli.harvest_options())?;
    let harvester = Harvester::new(controller, cli.areas.clone(), sink);

    // Run once immediately
    if let Err(e) = harvester.run_once().await {
        error!("Error during initial harvest: {}", e);
    }

    let Some(schedule) = cli.schedule else {
        return Ok(());
    };

    let sched = JobScheduler::new().await?;

    let job_harvester = harvester.clone();
    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let harvester = job_harvester.clone();
            Box::pin(async move {
                if let Err(e) = harvester.run_once().await {
                    error!("Error during scheduled harvest: {}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started - harvesting on '{}'", schedule);
    sched.start().await?;

    // Keep the program running
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    }
}
