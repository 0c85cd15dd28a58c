//! SQLite persistence for harvested listings

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::Listing;

/// SQLite store for harvested listings. A listing whose URL is already stored
/// is skipped on insert; listings without a URL are always inserted.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            if let Some(parent) = sqlite_file_path(db_url).and_then(Path::parent)
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Bulk insert, returning how many listings were new
    pub async fn insert_new_listings(&self, listings: &[Listing]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for listing in listings {
            // Saturated prices clamp to the largest INTEGER SQLite holds
            let price = listing
                .price
                .map(|price| i64::try_from(price).unwrap_or(i64::MAX));

            let result = sqlx::query(
                r"
                INSERT OR IGNORE INTO listings (
                    title, area, price, bedrooms, bathrooms, size_sqm, price_per_sqm,
                    property_type, url, images, highlights, neighborhood_vibe,
                    selector_used, scraped_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&listing.title)
            .bind(&listing.area)
            .bind(price)
            .bind(listing.bedrooms.map(i64::from))
            .bind(listing.bathrooms.map(i64::from))
            .bind(listing.size_sqm.map(i64::from))
            .bind(listing.price_per_sqm())
            .bind(listing.property_type.to_string())
            .bind(&listing.url)
            .bind(serde_json::to_string(&listing.images)?)
            .bind(serde_json::to_string(&listing.highlights)?)
            .bind(&listing.neighborhood_vibe)
            .bind(&listing.selector_used)
            .bind(listing.scraped_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        info!(
            "Inserted {} new listings ({} already stored)",
            inserted,
            listings.len() as u64 - inserted
        );
        Ok(inserted)
    }

    pub async fn count_listings(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM listings")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("total"))
    }

    pub async fn count_by_area(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT area, COUNT(*) AS total FROM listings GROUP BY area ORDER BY area",
        )
        .fetch_all(&self.pool)
        .await?;

        let counts = rows
            .into_iter()
            .map(|row| (row.get::<String, _>("area"), row.get::<i64, _>("total")))
            .collect();

        Ok(counts)
    }

    /// Delete every stored listing
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM listings")
            .execute(&self.pool)
            .await?;

        info!("Deleted {} listings", result.rows_affected());
        Ok(result.rows_affected())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

fn sqlite_file_path(db_url: &str) -> Option<&Path> {
    let path = db_url.strip_prefix("sqlite:")?.trim_start_matches("//");
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty() && !path.contains(":memory:")).then(|| Path::new(path))
}
