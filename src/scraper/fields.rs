//! Field extraction from a single listing fragment

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use tracing::debug;
use url::Url;

use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::models::{Highlight, PropertyType, TransactionType};
use crate::scraper::locator::ListingFragment;

/// Shorter than this is a label or badge, not a listing
pub const MIN_TEXT_LEN: usize = 30;
/// Longer than this is a page section that swallowed several listings
pub const MAX_TEXT_LEN: usize = 2000;

const WALKING_DISTANCE_VIBE: &str = "Walking distance to amenities";

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"R\s*(\d{1,3}(?:[\s,]*\d{3})+)").expect("price pattern"));
static BEDROOMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*[Bb]ed").expect("bedroom pattern"));
static BATHROOMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*[Bb]ath").expect("bathroom pattern"));
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*m[²2]").expect("size pattern"));

/// Everything read off one fragment before it is stamped with its area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFields {
    pub price: Option<u64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub size_sqm: Option<u32>,
    pub property_type: PropertyType,
    pub title: String,
    pub url: Option<String>,
    pub highlights: Vec<Highlight>,
    pub neighborhood_vibe: Option<String>,
}

pub struct FieldExtractor {
    origin: Url,
    link_marker: String,
    anchor_selector: Selector,
    highlight_rules: Vec<(Regex, Highlight)>,
}

impl FieldExtractor {
    pub fn new(site: &SiteConfig, transaction: TransactionType) -> Result<Self, ConfigError> {
        let anchor_selector = Selector::parse("a[href]").map_err(|e| ConfigError::InvalidSelector {
            selector: "a[href]".to_string(),
            reason: format!("{e:?}"),
        })?;

        let highlight_rules = site
            .highlight_rules
            .iter()
            .map(|(pattern, highlight)| {
                Regex::new(pattern)
                    .map(|re| (re, *highlight))
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            origin: site.origin()?,
            link_marker: transaction.listing_marker(),
            anchor_selector,
            highlight_rules,
        })
    }

    /// Read a listing out of a fragment, or `None` when it is not one
    pub fn extract(&self, fragment: &ListingFragment<'_>) -> Option<ListingFields> {
        let mut fields = self.extract_text(&fragment.text)?;
        fields.url = self.listing_url(fragment);
        Some(fields)
    }

    /// Text-only part of the extraction; leaves `url` empty.
    pub fn extract_text(&self, text: &str) -> Option<ListingFields> {
        let len = text.chars().count();
        if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&len) {
            return None;
        }

        let lower = text.to_lowercase();

        // Price anchors the record; a priceless tile only survives as a development.
        let (price, is_development) = match parse_price(text) {
            Some(price) => (Some(price), false),
            None if lower.contains("development") => (None, true),
            None => return None,
        };

        let bedrooms = first_count(&BEDROOMS_RE, text);
        let bathrooms = first_count(&BATHROOMS_RE, text);
        let size_sqm = first_count(&SIZE_RE, text);

        let property_type = if is_development {
            PropertyType::Development
        } else {
            classify(&lower)
        };

        let highlights = self
            .highlight_rules
            .iter()
            .filter(|(re, _)| re.is_match(&lower))
            .map(|(_, highlight)| *highlight)
            .collect();

        let title = match bedrooms {
            Some(beds) => format!("{beds} Bedroom {property_type}"),
            None => property_type.to_string(),
        };

        let neighborhood_vibe = lower
            .contains("walking distance")
            .then(|| WALKING_DISTANCE_VIBE.to_string());

        Some(ListingFields {
            price,
            bedrooms,
            bathrooms,
            size_sqm,
            property_type,
            title,
            url: None,
            highlights,
            neighborhood_vibe,
        })
    }

    fn listing_url(&self, fragment: &ListingFragment<'_>) -> Option<String> {
        fragment
            .element
            .select(&self.anchor_selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .find(|href| href.contains(&self.link_marker))
            .and_then(|href| resolve_url(&self.origin, href))
    }
}

fn parse_price(text: &str) -> Option<u64> {
    let digits: String = PRICE_RE
        .captures(text)?
        .get(1)?
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    // Only overflow can fail here; the capture is all digits
    match digits.parse() {
        Ok(price) => Some(price),
        Err(_) => {
            debug!("Price R{} does not fit, saturating", digits);
            Some(u64::MAX)
        }
    }
}

fn first_count(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// `townhouse` is tested before `house`, otherwise the substring match
/// would file every townhouse as a house.
fn classify(lower: &str) -> PropertyType {
    if lower.contains("apartment") || lower.contains("flat") {
        PropertyType::Apartment
    } else if lower.contains("townhouse") {
        PropertyType::Townhouse
    } else if lower.contains("house") {
        PropertyType::House
    } else {
        PropertyType::Property
    }
}

/// Absolute form of `raw` against the site origin. Handles `//host/..`,
/// `/path` and already absolute values.
pub fn resolve_url(origin: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    origin.join(raw).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&SiteConfig::property24(), TransactionType::ForSale).unwrap()
    }

    #[test]
    fn extracts_full_listing_text() {
        let fields = extractor()
            .extract_text("R 1 250 000 2 Bed 1 Bath 85m² Pool Security")
            .unwrap();

        assert_eq!(fields.price, Some(1_250_000));
        assert_eq!(fields.bedrooms, Some(2));
        assert_eq!(fields.bathrooms, Some(1));
        assert_eq!(fields.size_sqm, Some(85));
        assert_eq!(fields.highlights, vec![Highlight::Pool, Highlight::Security]);
        assert_eq!(fields.property_type, PropertyType::Property);
        assert_eq!(fields.title, "2 Bedroom Property");
        assert_eq!(fields.neighborhood_vibe, None);
    }

    #[test]
    fn length_gate_rejects_short_and_long_text() {
        let extractor = extractor();

        assert!(extractor.extract_text("Nice place to live").is_none());
        let long = format!("R 2 000 000 {}", "x".repeat(MAX_TEXT_LEN));
        assert!(extractor.extract_text(&long).is_none());
    }

    #[test]
    fn missing_price_is_rejected_unless_development() {
        let extractor = extractor();

        assert!(
            extractor
                .extract_text("Lovely 2 bed apartment with views, price on request")
                .is_none()
        );

        let fields = extractor
            .extract_text("New development launching soon, 1 and 2 Bed apartments")
            .unwrap();
        assert_eq!(fields.price, None);
        assert_eq!(fields.property_type, PropertyType::Development);
        assert_eq!(fields.bedrooms, Some(2));
        assert_eq!(fields.title, "2 Bedroom Development");
    }

    #[test]
    fn comma_grouped_prices_parse() {
        let fields = extractor()
            .extract_text("R3,450,000 | 3 bedroom house in Fresnaye with garden")
            .unwrap();

        assert_eq!(fields.price, Some(3_450_000));
        assert_eq!(fields.bedrooms, Some(3));
        assert_eq!(fields.property_type, PropertyType::House);
        assert_eq!(fields.highlights, vec![Highlight::Garden]);
    }

    #[test]
    fn oversized_prices_saturate_instead_of_rejecting() {
        let fields = extractor()
            .extract_text("R 100 000 000 000 000 000 000 2 Bed 80 m² apartment")
            .unwrap();

        assert_eq!(fields.price, Some(u64::MAX));
        assert_eq!(fields.property_type, PropertyType::Apartment);
        assert_eq!(fields.size_sqm, Some(80));
    }

    #[test]
    fn classifies_property_types() {
        let extractor = extractor();
        let kind = |text: &str| extractor.extract_text(text).unwrap().property_type;

        assert_eq!(kind("R 1 100 000 Studio flat near the promenade"), PropertyType::Apartment);
        assert_eq!(kind("R 4 900 000 Modern townhouse in a secure complex"), PropertyType::Townhouse);
        assert_eq!(kind("R 4 900 000 Townhouse next to a guest house"), PropertyType::Townhouse);
        assert_eq!(kind("R 9 900 000 Family house with double garage"), PropertyType::House);
        assert_eq!(kind("R 9 900 000 Vacant land, build your dream"), PropertyType::Property);
    }

    #[test]
    fn highlights_follow_vocabulary_order() {
        let fields = extractor()
            .extract_text("R 5 500 000 Mountain view, sea-view, pet friendly, furnished, parking, balcony")
            .unwrap();

        assert_eq!(
            fields.highlights,
            vec![
                Highlight::Parking,
                Highlight::Balcony,
                Highlight::PetFriendly,
                Highlight::Furnished,
                Highlight::SeaViews,
                Highlight::MountainViews,
            ]
        );
    }

    #[test]
    fn walking_distance_sets_vibe() {
        let fields = extractor()
            .extract_text("R 2 300 000 1 Bed flat, walking distance to shops")
            .unwrap();

        assert_eq!(fields.neighborhood_vibe.as_deref(), Some(WALKING_DISTANCE_VIBE));
        assert_eq!(fields.title, "1 Bedroom Apartment");
    }

    #[test]
    fn picks_first_listing_link_and_absolutizes_it() {
        let html = r#"
            <div class="tile">
              <a href="/agency/pam-golding">Agent</a>
              <a href="/for-sale/sea-point/cape-town/western-cape/11021/115?plId=42">R 1 850 000 2 Bed apartment 70 m2</a>
            </div>
        "#;
        let document = Html::parse_fragment(html);
        let selector = Selector::parse("div").unwrap();
        let element = document.select(&selector).next().unwrap();
        let fragment = ListingFragment {
            element,
            text: crate::scraper::locator::flatten_text(element),
            selector: "div",
        };

        let fields = extractor().extract(&fragment).unwrap();

        assert_eq!(
            fields.url.as_deref(),
            Some("https://www.property24.com/for-sale/sea-point/cape-town/western-cape/11021/115?plId=42")
        );
        assert_eq!(fields.size_sqm, Some(70));
    }

    #[test]
    fn resolves_relative_and_protocol_relative_urls() {
        let origin = Url::parse("https://www.property24.com").unwrap();

        assert_eq!(
            resolve_url(&origin, "//images.prop24.com/1.jpg").as_deref(),
            Some("https://images.prop24.com/1.jpg")
        );
        assert_eq!(
            resolve_url(&origin, "/listing/1.jpg").as_deref(),
            Some("https://www.property24.com/listing/1.jpg")
        );
        assert_eq!(resolve_url(&origin, "  "), None);
    }
}
