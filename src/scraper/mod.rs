//! Listing extraction engine: locate fragments, read fields and photos,
//! deduplicate per page and paginate per area. Single listing pages are
//! read separately for their full gallery.

mod assembler;
mod details;
mod fields;
mod images;
mod json_walk;
mod locator;
mod pagination;

pub use details::DetailPageScraper;
pub use pagination::{AreaHarvest, PaginationController, StopReason};
