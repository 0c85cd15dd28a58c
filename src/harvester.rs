use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::{info, warn};

use crate::database::Database;
use crate::models::Listing;
use crate::scraper::{AreaHarvest, PaginationController};
use crate::traits::PageFetcher;

/// Where a finished harvest goes
#[derive(Clone)]
pub enum Sink {
    Database(Database),
    /// Pretty JSON file written into this directory
    JsonFile(PathBuf),
}

pub struct Harvester<F> {
    controller: Arc<PaginationController<F>>,
    areas: Vec<String>,
    sink: Sink,
}

impl<F> Clone for Harvester<F> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            areas: self.areas.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<F: PageFetcher> Harvester<F> {
    pub fn new(controller: PaginationController<F>, areas: Vec<String>, sink: Sink) -> Self {
        Self {
            controller: Arc::new(controller),
            areas,
            sink,
        }
    }

    /// Harvest every configured area in order, each with its own pagination
    /// state. Areas are separated by twice the page delay.
    pub async fn harvest_all(&self) -> Vec<AreaHarvest> {
        let area_delay = self.controller.options().page_delay * 2;
        let mut harvests = Vec::with_capacity(self.areas.len());

        for (i, area) in self.areas.iter().enumerate() {
            info!("Area {}/{}: {}", i + 1, self.areas.len(), area);

            let harvest = self.controller.harvest_area(area).await;
            let with_images = harvest
                .listings
                .iter()
                .filter(|listing| !listing.images.is_empty())
                .count();
            info!(
                "Found {} listings in {} over {} pages ({} with images), stopped: {:?}",
                harvest.listings.len(),
                harvest.area,
                harvest.pages_fetched,
                with_images,
                harvest.stop_reason
            );
            harvests.push(harvest);

            if i + 1 < self.areas.len() && !area_delay.is_zero() {
                tokio::time::sleep(area_delay).await;
            }
        }

        harvests
    }

    /// One full pass: harvest, then store or export.
    pub async fn run_once(&self) -> Result<usize> {
        let listings: Vec<Listing> = self
            .harvest_all()
            .await
            .into_iter()
            .flat_map(|harvest| harvest.listings)
            .collect();

        if listings.is_empty() {
            warn!("No listings found");
            return Ok(0);
        }

        info!("Total listings harvested: {}", listings.len());

        match &self.sink {
            Sink::Database(database) => {
                let inserted = database.insert_new_listings(&listings).await?;
                info!("Stored {} new listings", inserted);
            }
            Sink::JsonFile(dir) => {
                let path = export_json(dir, &listings).await?;
                info!("Dry run - saved {} listings to {}", listings.len(), path.display());
            }
        }

        Ok(listings.len())
    }
}

async fn export_json(dir: &Path, listings: &[Listing]) -> Result<PathBuf> {
    let filename = format!("scraped_listings_{}.json", Local::now().format("%Y%m%d_%H%M%S"));
    let path = dir.join(filename);

    let json = serde_json::to_string_pretty(listings)?;
    tokio::fs::write(&path, json).await?;

    Ok(path)
}
