//! Gallery and description from a single listing's own page

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{error, info};
use url::Url;

use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::scraper::fields::resolve_url;
use crate::scraper::images::{ImageResolver, contains_any, parse_selector};
use crate::scraper::locator::flatten_text;
use crate::traits::PageFetcher;

pub const MAX_DETAIL_IMAGES: usize = 10;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingDetails {
    pub images: Vec<String>,
    pub description: Option<String>,
}

pub struct DetailPageScraper {
    origin: Url,
    image_keywords: Vec<String>,
    gallery_images: ImageResolver,
    gallery_selector: Selector,
    img_selector: Selector,
    description_selector: Selector,
}

impl DetailPageScraper {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: site.origin()?,
            image_keywords: site.image_keywords.clone(),
            gallery_images: ImageResolver::new(site)?.with_limit(MAX_DETAIL_IMAGES),
            gallery_selector: parse_selector(&site.detail_gallery_selector)?,
            img_selector: parse_selector("img[src]")?,
            description_selector: parse_selector(&site.detail_description_selector)?,
        })
    }

    /// Fetch a listing page and read its details. A failed fetch or a
    /// non-200 answer is logged and yields `None`.
    pub async fn scrape<F: PageFetcher>(&self, fetcher: &F, url: &str) -> Option<ListingDetails> {
        info!("Fetching details from: {}", url);

        let page = match fetcher.fetch(url).await {
            Ok(page) if page.is_ok() => page,
            Ok(page) => {
                error!("Failed to fetch listing page {}: status {}", url, page.status);
                return None;
            }
            Err(e) => {
                error!("Error fetching listing page {}: {}", url, e);
                return None;
            }
        };

        Some(self.read(&page.body))
    }

    /// Gallery photos first, then any other listing photo on the page, up to
    /// [`MAX_DETAIL_IMAGES`]. The description is cut at
    /// [`MAX_DESCRIPTION_CHARS`] characters.
    pub fn read(&self, html: &str) -> ListingDetails {
        let document = Html::parse_document(html);

        let mut images = document
            .select(&self.gallery_selector)
            .next()
            .map(|gallery| self.gallery_images.resolve(gallery))
            .unwrap_or_default();

        let page_images = document
            .select(&self.img_selector)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| contains_any(src, &self.image_keywords))
            .filter_map(|src| resolve_url(&self.origin, src));

        for url in page_images {
            if images.len() >= MAX_DETAIL_IMAGES {
                break;
            }
            if !images.contains(&url) {
                images.push(url);
            }
        }

        let description = document
            .select(&self.description_selector)
            .next()
            .map(|block| {
                flatten_text(block)
                    .chars()
                    .take(MAX_DESCRIPTION_CHARS)
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty());

        ListingDetails {
            images,
            description,
        }
    }
}
