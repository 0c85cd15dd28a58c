//! Drives page fetches for one area until its listings run out

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::config::{HarvestOptions, SiteConfig};
use crate::error::ConfigError;
use crate::models::{Listing, normalize_area};
use crate::scraper::assembler::PageAssembler;
use crate::traits::PageFetcher;

/// Pages in a row without a single new listing before an area is abandoned
pub const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 2;

/// Why an area run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// No area code is configured; nothing was fetched
    UnknownArea,
    /// The next page would pass the configured ceiling
    PageCeiling,
    /// Consecutive pages yielded only empty or already seen listings
    NoNewListings,
    /// The portal answered with a non-200 status
    BadStatus(u16),
    /// The transport failed outright
    FetchFailed(String),
}

/// Everything collected for one area
#[derive(Debug, Clone)]
pub struct AreaHarvest {
    pub area: String,
    pub listings: Vec<Listing>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
}

enum Step {
    Fetching(u32),
    Assembling { page: u32, body: String },
    Stopped(StopReason),
}

struct PaginationState {
    page: u32,
    seen_urls: HashSet<String>,
    consecutive_empty: u32,
}

impl PaginationState {
    fn new() -> Self {
        Self {
            page: 1,
            seen_urls: HashSet::new(),
            consecutive_empty: 0,
        }
    }

    /// Keep listings whose URL has not been emitted yet in this run.
    /// Listings without a URL have no stable identity and always pass.
    fn admit(&mut self, listings: Vec<Listing>) -> Vec<Listing> {
        listings
            .into_iter()
            .filter(|listing| match &listing.url {
                Some(url) => self.seen_urls.insert(normalize_listing_url(url)),
                None => true,
            })
            .collect()
    }
}

/// Drop the fragment and any trailing slash so cosmetic variants of one
/// listing link compare equal
pub fn normalize_listing_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment.trim_end_matches('/').to_string()
}

pub struct PaginationController<F> {
    site: SiteConfig,
    assembler: PageAssembler,
    fetcher: F,
    options: HarvestOptions,
}

impl<F: PageFetcher> PaginationController<F> {
    pub fn new(site: SiteConfig, fetcher: F, options: HarvestOptions) -> Result<Self, ConfigError> {
        let assembler = PageAssembler::new(&site, options.transaction)?;

        Ok(Self {
            site,
            assembler,
            fetcher,
            options,
        })
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Harvest every results page of one area.
    ///
    /// Pages are fetched one at a time with the configured delay between
    /// them. The run ends on the page ceiling, after
    /// [`MAX_CONSECUTIVE_EMPTY_PAGES`] pages without new listings, or on the
    /// first failed fetch; listings gathered before a failure are kept.
    pub async fn harvest_area(&self, area: &str) -> AreaHarvest {
        let slug = normalize_area(area);

        let Some(area_code) = self.site.area_code(&slug) else {
            error!("Unknown area: {}", area);
            return AreaHarvest {
                area: slug,
                listings: Vec::new(),
                pages_fetched: 0,
                stop_reason: StopReason::UnknownArea,
            };
        };

        info!("Scraping {} ({})", slug, self.options.transaction);

        let mut state = PaginationState::new();
        let mut listings = Vec::new();
        let mut pages_fetched = 0;
        let mut step = self.next_step(&state);

        let stop_reason = loop {
            step = match step {
                Step::Fetching(page) => {
                    if page > 1 && !self.options.page_delay.is_zero() {
                        tokio::time::sleep(self.options.page_delay).await;
                    }

                    let url = self
                        .site
                        .page_url(self.options.transaction, &slug, area_code, page);
                    info!("Page {}: {}", page, url);

                    match self.fetcher.fetch(&url).await {
                        Ok(fetched) if fetched.is_ok() => {
                            pages_fetched += 1;
                            Step::Assembling {
                                page,
                                body: fetched.body,
                            }
                        }
                        Ok(fetched) => {
                            error!("Bad status code on page {}: {}", page, fetched.status);
                            Step::Stopped(StopReason::BadStatus(fetched.status))
                        }
                        Err(e) => {
                            error!("Error on page {}: {}", page, e);
                            Step::Stopped(StopReason::FetchFailed(e.to_string()))
                        }
                    }
                }
                Step::Assembling { page, body } => {
                    let page_listings =
                        self.assembler
                            .assemble(&body, &slug, self.options.extract_images);
                    let fresh = state.admit(page_listings);

                    if fresh.is_empty() {
                        warn!("No new listings on page {}", page);
                        state.consecutive_empty += 1;
                    } else {
                        info!("Found {} new listings on page {}", fresh.len(), page);
                        state.consecutive_empty = 0;
                    }

                    listings.extend(fresh);
                    state.page = page + 1;
                    self.next_step(&state)
                }
                Step::Stopped(reason) => break reason,
            };
        };

        info!(
            "Total listings found for {}: {} over {} pages ({:?})",
            slug,
            listings.len(),
            pages_fetched,
            stop_reason
        );

        AreaHarvest {
            area: slug,
            listings,
            pages_fetched,
            stop_reason,
        }
    }

    fn next_step(&self, state: &PaginationState) -> Step {
        if state.consecutive_empty >= MAX_CONSECUTIVE_EMPTY_PAGES {
            return Step::Stopped(StopReason::NoNewListings);
        }

        if let Some(max_pages) = self.options.max_pages
            && state.page > max_pages
        {
            info!("Reached maximum page limit ({})", max_pages);
            return Step::Stopped(StopReason::PageCeiling);
        }

        Step::Fetching(state.page)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::models::TransactionType;
    use crate::traits::FetchedPage;

    const BASE: &str = "https://www.property24.com/for-sale/sea-point/cape-town/western-cape/11021";

    /// Serves canned pages by URL and records every request
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: HashMap<String, String>,
        failing: HashSet<String>,
        requested: Mutex<Vec<String>>,
        fetched_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedFetcher {
        fn page(mut self, number: u32, body: String) -> Self {
            self.pages.insert(page_url(number), body);
            self
        }

        fn failing(mut self, number: u32) -> Self {
            self.failing.insert(page_url(number));
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<'a> PageFetcher for &'a ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.requested.lock().unwrap().push(url.to_string());
            self.fetched_at.lock().unwrap().push(Instant::now());

            if self.failing.contains(url) {
                return Err(anyhow!("connection reset"));
            }

            Ok(match self.pages.get(url) {
                Some(body) => FetchedPage {
                    status: 200,
                    body: body.clone(),
                },
                None => FetchedPage {
                    status: 404,
                    body: String::new(),
                },
            })
        }
    }

    fn page_url(number: u32) -> String {
        if number == 1 {
            BASE.to_string()
        } else {
            format!("{BASE}?Page={number}")
        }
    }

    fn tile(id: u32) -> String {
        format!(
            r#"<div class="p24_regularTile">
                 <a href="/for-sale/sea-point/cape-town/western-cape/11021/{id}?plId={id}">View</a>
                 <span>R 1 500 000</span> <span>2 Bed</span> <span>{id} m²</span>
                 <span>Apartment near the promenade</span>
               </div>"#
        )
    }

    fn unlinked_tile(size: u32) -> String {
        format!(
            r#"<div class="p24_regularTile">
                 <span>R 2 750 000</span> <span>3 Bed</span> <span>{size} m²</span>
                 <span>Private sale, contact the owner</span>
               </div>"#
        )
    }

    fn results_page(tiles: &[String]) -> String {
        format!("<html><body>{}</body></html>", tiles.concat())
    }

    fn options(max_pages: Option<u32>) -> HarvestOptions {
        HarvestOptions {
            transaction: TransactionType::ForSale,
            max_pages,
            extract_images: false,
            page_delay: Duration::ZERO,
        }
    }

    fn controller(
        fetcher: &ScriptedFetcher,
        max_pages: Option<u32>,
    ) -> PaginationController<&ScriptedFetcher> {
        PaginationController::new(SiteConfig::property24(), fetcher, options(max_pages)).unwrap()
    }

    #[tokio::test]
    async fn unknown_area_is_never_fetched() {
        let fetcher = ScriptedFetcher::default();

        let harvest = controller(&fetcher, Some(5)).harvest_area("Unknown Place").await;

        assert!(harvest.listings.is_empty());
        assert_eq!(harvest.stop_reason, StopReason::UnknownArea);
        assert_eq!(harvest.pages_fetched, 0);
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn two_duplicate_pages_stop_before_the_ceiling() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[tile(61), tile(62)]))
            .page(2, results_page(&[tile(61), tile(62)]))
            .page(3, results_page(&[tile(62)]))
            .page(4, results_page(&[tile(63)]));

        let harvest = controller(&fetcher, Some(10)).harvest_area("Sea Point").await;

        assert_eq!(harvest.stop_reason, StopReason::NoNewListings);
        assert_eq!(harvest.pages_fetched, 3);
        assert_eq!(harvest.listings.len(), 2);
        assert_eq!(fetcher.requested(), vec![page_url(1), page_url(2), page_url(3)]);

        let urls: HashSet<_> = harvest.listings.iter().filter_map(|l| l.url.clone()).collect();
        assert_eq!(urls.len(), harvest.listings.len());
    }

    #[tokio::test]
    async fn ceiling_limits_pages() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[tile(61)]))
            .page(2, results_page(&[tile(62)]))
            .page(3, results_page(&[tile(63)]));

        let harvest = controller(&fetcher, Some(2)).harvest_area("sea-point").await;

        assert_eq!(harvest.stop_reason, StopReason::PageCeiling);
        assert_eq!(harvest.pages_fetched, 2);
        assert_eq!(harvest.listings.len(), 2);
    }

    #[tokio::test]
    async fn bad_status_keeps_earlier_pages() {
        let fetcher = ScriptedFetcher::default().page(1, results_page(&[tile(61), tile(62)]));

        let harvest = controller(&fetcher, None).harvest_area("sea_point").await;

        assert_eq!(harvest.stop_reason, StopReason::BadStatus(404));
        assert_eq!(harvest.pages_fetched, 1);
        assert_eq!(harvest.listings.len(), 2);
        assert_eq!(harvest.area, "sea-point");
    }

    #[tokio::test]
    async fn transport_errors_end_the_run() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[tile(61)]))
            .failing(2);

        let harvest = controller(&fetcher, None).harvest_area("sea-point").await;

        assert!(matches!(harvest.stop_reason, StopReason::FetchFailed(_)));
        assert_eq!(harvest.listings.len(), 1);
    }

    #[tokio::test]
    async fn listings_without_url_are_never_deduplicated_across_pages() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[unlinked_tile(140)]))
            .page(2, results_page(&[unlinked_tile(140)]));

        let harvest = controller(&fetcher, Some(2)).harvest_area("sea-point").await;

        assert_eq!(harvest.listings.len(), 2);
        assert!(harvest.listings.iter().all(|l| l.url.is_none()));
        assert_eq!(harvest.stop_reason, StopReason::PageCeiling);
    }

    #[tokio::test]
    async fn empty_pages_count_towards_the_stop() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[]))
            .page(2, results_page(&[]))
            .page(3, results_page(&[tile(61)]));

        let harvest = controller(&fetcher, None).harvest_area("sea-point").await;

        assert_eq!(harvest.stop_reason, StopReason::NoNewListings);
        assert_eq!(harvest.pages_fetched, 2);
        assert!(harvest.listings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_page_fetches_only() {
        let fetcher = ScriptedFetcher::default()
            .page(1, results_page(&[tile(61)]))
            .page(2, results_page(&[tile(61)]))
            .page(3, results_page(&[tile(61)]));
        let delay = Duration::from_millis(1500);
        let controller = PaginationController::new(
            SiteConfig::property24(),
            &fetcher,
            HarvestOptions {
                page_delay: delay,
                ..options(None)
            },
        )
        .unwrap();

        let start = Instant::now();
        let harvest = controller.harvest_area("sea-point").await;
        let finished = Instant::now();

        assert_eq!(harvest.pages_fetched, 3);
        let fetched_at = fetcher.fetched_at.lock().unwrap().clone();
        assert_eq!(fetched_at.len(), 3);
        assert!(fetched_at[0] - start < Duration::from_millis(1));
        for pair in fetched_at.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= delay && gap < delay * 2, "gap was {gap:?}");
        }
        assert!(finished - fetched_at[2] < Duration::from_millis(1));
    }

    #[test]
    fn listing_urls_normalize_cosmetic_variants() {
        assert_eq!(
            normalize_listing_url("https://www.property24.com/for-sale/x/1/#gallery"),
            "https://www.property24.com/for-sale/x/1"
        );
        assert_eq!(
            normalize_listing_url("https://www.property24.com/for-sale/x/1?plId=1"),
            "https://www.property24.com/for-sale/x/1?plId=1"
        );
    }
}
