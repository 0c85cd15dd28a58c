//! Configuration errors raised while building the site description

use thiserror::Error;

/// Faults detected when a [`crate::config::SiteConfig`] is turned into
/// something the scraper can run with.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A CSS selector in the site description did not parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A highlight rule is not a valid regular expression
    #[error("invalid highlight pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The site origin is not an absolute URL
    #[error("invalid base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Transaction tag other than `for-sale` or `to-rent`
    #[error("unknown transaction type `{0}` (expected `for-sale` or `to-rent`)")]
    UnknownTransactionType(String),
}
