//! Seam between the harvesting engine and the network

use anyhow::Result;
use async_trait::async_trait;

/// Raw response for one results page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Something that can download a page.
///
/// Retries, headers and timeouts belong to the implementation; the engine
/// treats any `Err` or non-200 status as the end of the current area.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its status and body
    ///
    /// # Arguments
    /// * `url` - Absolute URL of the results page
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}
