//! Data models for harvested property listings

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A property listing scraped from one results page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub area: String,
    pub price: Option<u64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub size_sqm: Option<u32>,
    pub property_type: PropertyType,
    pub url: Option<String>,
    pub images: Vec<String>,
    pub highlights: Vec<Highlight>,
    pub neighborhood_vibe: Option<String>,
    pub selector_used: String,
    pub scraped_at: DateTime<Utc>,
}

impl Listing {
    /// Key used to collapse the same listing matched by several selectors
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            price: self.price,
            bedrooms: self.bedrooms,
            size_sqm: self.size_sqm,
        }
    }

    /// Asking price per square metre, when both price and a non-zero size are known
    #[allow(clippy::cast_precision_loss)]
    pub fn price_per_sqm(&self) -> Option<f64> {
        match (self.price, self.size_sqm) {
            (Some(price), Some(size)) if size > 0 => {
                Some((price as f64 / f64::from(size) * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }
}

/// Same-page identity of a listing: (price, bedrooms, size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub price: Option<u64>,
    pub bedrooms: Option<u32>,
    pub size_sqm: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Apartment,
    House,
    Townhouse,
    Flat,
    Property,
    Development,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apartment => "Apartment",
            Self::House => "House",
            Self::Townhouse => "Townhouse",
            Self::Flat => "Flat",
            Self::Property => "Property",
            Self::Development => "Development",
        };
        f.write_str(name)
    }
}

/// Selling points picked out of the listing text.
///
/// Variant order is the order highlights are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Highlight {
    Pool,
    Parking,
    Garden,
    Security,
    Balcony,
    #[serde(rename = "Pet Friendly")]
    PetFriendly,
    Furnished,
    #[serde(rename = "Sea Views")]
    SeaViews,
    #[serde(rename = "Mountain Views")]
    MountainViews,
}

impl Highlight {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pool => "Pool",
            Self::Parking => "Parking",
            Self::Garden => "Garden",
            Self::Security => "Security",
            Self::Balcony => "Balcony",
            Self::PetFriendly => "Pet Friendly",
            Self::Furnished => "Furnished",
            Self::SeaViews => "Sea Views",
            Self::MountainViews => "Mountain Views",
        }
    }
}

impl fmt::Display for Highlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which side of the market a harvest targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionType {
    #[default]
    ForSale,
    ToRent,
}

impl TransactionType {
    /// Path segment used by the portal, e.g. `for-sale`
    pub const fn as_path(self) -> &'static str {
        match self {
            Self::ForSale => "for-sale",
            Self::ToRent => "to-rent",
        }
    }

    /// Substring an href must contain to count as a listing link
    pub fn listing_marker(self) -> String {
        format!("/{}/", self.as_path())
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for TransactionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "for-sale" => Ok(Self::ForSale),
            "to-rent" => Ok(Self::ToRent),
            other => Err(ConfigError::UnknownTransactionType(other.to_string())),
        }
    }
}

/// Normalize a user supplied area name to the portal's slug form.
///
/// `"Sea Point"` and `"sea_point"` both become `"sea-point"`.
pub fn normalize_area(area: &str) -> String {
    area.trim().to_lowercase().replace([' ', '_'], "-")
}
