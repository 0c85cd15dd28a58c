//! One results page in, deduplicated listings out

use std::collections::HashSet;

use chrono::Utc;
use scraper::Html;

use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::models::{Listing, TransactionType};
use crate::scraper::fields::FieldExtractor;
use crate::scraper::images::ImageResolver;
use crate::scraper::locator::FragmentLocator;

pub struct PageAssembler {
    locator: FragmentLocator,
    extractor: FieldExtractor,
    images: ImageResolver,
}

impl PageAssembler {
    pub fn new(site: &SiteConfig, transaction: TransactionType) -> Result<Self, ConfigError> {
        Ok(Self {
            locator: FragmentLocator::new(&site.listing_selectors)?,
            extractor: FieldExtractor::new(site, transaction)?,
            images: ImageResolver::new(site)?,
        })
    }

    /// Parse `html` and assemble its listings.
    ///
    /// The parsed document never leaves this call, so callers can hold the
    /// result across `.await` points.
    pub fn assemble(&self, html: &str, area: &str, extract_images: bool) -> Vec<Listing> {
        let document = Html::parse_document(html);
        self.assemble_document(&document, area, extract_images)
    }

    /// Listings in discovery order (selector priority, then document order).
    /// A listing whose (price, bedrooms, size) was already claimed on this
    /// page is dropped, which collapses the overlap between selectors.
    pub fn assemble_document(
        &self,
        document: &Html,
        area: &str,
        extract_images: bool,
    ) -> Vec<Listing> {
        let mut claimed = HashSet::new();
        let mut listings = Vec::new();

        for fragment in self.locator.locate(document) {
            let Some(fields) = self.extractor.extract(&fragment) else {
                continue;
            };

            let listing = Listing {
                title: fields.title,
                area: area.to_string(),
                price: fields.price,
                bedrooms: fields.bedrooms,
                bathrooms: fields.bathrooms,
                size_sqm: fields.size_sqm,
                property_type: fields.property_type,
                url: fields.url,
                images: Vec::new(),
                highlights: fields.highlights,
                neighborhood_vibe: fields.neighborhood_vibe,
                selector_used: fragment.selector.to_string(),
                scraped_at: Utc::now(),
            };

            if !claimed.insert(listing.dedup_key()) {
                continue;
            }

            let images = if extract_images {
                self.images.resolve(fragment.element)
            } else {
                Vec::new()
            };

            listings.push(Listing { images, ..listing });
        }

        listings
    }
}
