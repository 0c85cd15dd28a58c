//! Site description and runtime settings for a harvest

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::ConfigError;
use crate::models::{Highlight, TransactionType};

/// Static description of the portal being harvested.
///
/// Everything the extraction engine needs to know about the site lives here and
/// is handed to it at construction time; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Display name for the website
    pub name: String,
    /// Origin used to absolutize relative links and images
    pub base_url: String,
    /// Path between the area slug and the area code, e.g. `cape-town/western-cape`
    pub region_path: String,
    /// Area slug to the portal's numeric area code
    pub area_codes: BTreeMap<String, u32>,
    /// Listing selectors in priority order. Every one is applied to every page.
    pub listing_selectors: Vec<String>,
    /// An `<img>` URL must contain one of these to count as a listing photo
    pub image_keywords: Vec<String>,
    /// A `background-image` URL must contain one of these
    pub background_keywords: Vec<String>,
    /// JSON keys that hold image galleries in embedded data blocks
    pub gallery_keys: Vec<String>,
    /// Deepest nesting level searched in embedded data blocks
    pub gallery_max_depth: usize,
    /// Regex (matched against lowercased text) per highlight, in report order
    pub highlight_rules: Vec<(String, Highlight)>,
    /// Photo gallery container on a listing's own page
    pub detail_gallery_selector: String,
    /// Description block on a listing's own page
    pub detail_description_selector: String,
    /// User agent sent with every page request
    pub user_agent: String,
}

impl SiteConfig {
    /// Built-in description of Property24's Cape Town Atlantic Seaboard and City Bowl areas
    pub fn property24() -> Self {
        let area_codes = [
            ("sea-point", 11021),
            ("green-point", 11017),
            ("camps-bay", 11014),
            ("clifton", 11015),
            ("fresnaye", 11016),
            ("mouille-point", 11018),
            ("de-waterkant", 9141),
            ("gardens", 9145),
            ("oranjezicht", 9155),
            ("tamboerskloof", 9163),
            ("vredehoek", 9166),
        ]
        .into_iter()
        .map(|(slug, code)| (slug.to_string(), code))
        .collect();

        let listing_selectors = [
            r#"div[class*="listing"]"#,
            r#"div[class*="p24_"]"#,
            r#"div[class*="tile"]"#,
            r#"div[class*="property"]"#,
            r#"article[class*="listing"]"#,
            r#"div[class*="result"]"#,
            ".p24_regularTile",
            ".js_listingTile",
            "[data-listing-number]",
            r#"div[class*="sc_listingTile"]"#,
            r#"div[class*="ListingTile"]"#,
            r#"div[class*="propertyTile"]"#,
            r#"a[href*="/for-sale/"][href*="plId="]"#,
            r#"a[href*="/to-rent/"][href*="plId="]"#,
        ];

        let highlight_rules = [
            ("pool", Highlight::Pool),
            ("garage|parking", Highlight::Parking),
            ("garden", Highlight::Garden),
            ("security", Highlight::Security),
            ("balcony", Highlight::Balcony),
            (r"pet[\s-]?friendly", Highlight::PetFriendly),
            ("furnished", Highlight::Furnished),
            (r"sea[\s-]?view|ocean[\s-]?view", Highlight::SeaViews),
            (r"mountain[\s-]?view", Highlight::MountainViews),
        ];

        Self {
            name: "Property24".to_string(),
            base_url: "https://www.property24.com".to_string(),
            region_path: "cape-town/western-cape".to_string(),
            area_codes,
            listing_selectors: listing_selectors.iter().map(ToString::to_string).collect(),
            image_keywords: to_strings(&["property24", "listing", "property", "p24"]),
            background_keywords: to_strings(&["property", "listing"]),
            gallery_keys: to_strings(&["images", "gallery", "photos", "imageUrl", "image"]),
            gallery_max_depth: 5,
            highlight_rules: highlight_rules
                .iter()
                .map(|(pattern, highlight)| ((*pattern).to_string(), *highlight))
                .collect(),
            detail_gallery_selector: r#"div[class*="gallery"], div[class*="carousel"], div[class*="slider"], div[class*="images"]"#.to_string(),
            detail_description_selector: r#"div[class*="description"], div[class*="content"], div[class*="details"]"#.to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }

    /// Parsed site origin
    pub fn origin(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    /// Numeric code for an already normalized area slug
    pub fn area_code(&self, area_slug: &str) -> Option<u32> {
        self.area_codes.get(area_slug).copied()
    }

    /// Results page URL for one area. Page 1 carries no page parameter.
    pub fn page_url(
        &self,
        transaction: TransactionType,
        area_slug: &str,
        area_code: u32,
        page: u32,
    ) -> String {
        let mut url = format!(
            "{}/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            transaction.as_path(),
            area_slug,
            self.region_path,
            area_code
        );
        if page > 1 {
            url.push_str(&format!("?Page={page}"));
        }
        url
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Command line and environment settings
#[derive(Debug, Clone, Parser)]
#[command(name = "listing-harvester")]
#[command(about = "Harvest property listings from Property24 into SQLite")]
pub struct Cli {
    /// Areas to harvest, in order
    #[arg(
        long,
        env = "SCRAPE_AREAS",
        value_delimiter = ',',
        default_value = "sea-point,gardens,green-point"
    )]
    pub areas: Vec<String>,

    /// `for-sale` or `to-rent`
    #[arg(long, env = "SCRAPE_TRANSACTION", default_value = "for-sale")]
    pub transaction: TransactionType,

    /// Stop each area after this many pages
    #[arg(long, env = "SCRAPE_MAX_PAGES")]
    pub pages: Option<u32>,

    /// Skip image extraction
    #[arg(long)]
    pub no_images: bool,

    /// Pause between page fetches, in milliseconds
    #[arg(long, env = "SCRAPE_DELAY_MS", default_value_t = 1000)]
    pub delay_ms: u64,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:database/listings.db")]
    pub database_url: String,

    /// Write results to a JSON file instead of the database
    #[arg(long)]
    pub dry_run: bool,

    /// Print database statistics and exit
    #[arg(long)]
    pub info: bool,

    /// Delete every stored listing before harvesting
    #[arg(long)]
    pub clean: bool,

    /// Fetch one listing page, print its gallery and description, and exit
    #[arg(long, value_name = "URL")]
    pub details: Option<String>,

    /// Cron expression; when set the harvest repeats on this schedule
    #[arg(long, env = "SCRAPE_SCHEDULE")]
    pub schedule: Option<String>,
}

impl Cli {
    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            transaction: self.transaction,
            max_pages: self.pages,
            extract_images: !self.no_images,
            page_delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// Per-run policy values for the pagination controller
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub transaction: TransactionType,
    /// `None` means paginate until the listings run out
    pub max_pages: Option<u32>,
    pub extract_images: bool,
    /// Courtesy pause between page fetches; doubled between areas
    pub page_delay: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            transaction: TransactionType::ForSale,
            max_pages: None,
            extract_images: true,
            page_delay: Duration::from_secs(1),
        }
    }
}
