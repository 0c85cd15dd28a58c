//! Listing photo discovery.
//!
//! Portal markup hides photos in three places, each handled by its own
//! strategy:
//!
//! - **Tag attributes**: `<img>` tags, preferring the lazy-load `data-src`
//! - **Inline styles**: `background-image: url(...)` declarations
//! - **Embedded data**: `<script type="application/json">` gallery payloads
//!
//! Results are concatenated in that order, deduplicated keeping the first
//! occurrence and capped at [`MAX_IMAGES`]. A strategy that finds nothing, or
//! an image that cannot be parsed, is simply skipped.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::scraper::fields::resolve_url;
use crate::scraper::json_walk::JsonKeyWalker;

pub const MAX_IMAGES: usize = 5;

static CSS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*["']?([^"')]+)["']?\s*\)"#).expect("css url pattern"));

pub struct ImageResolver {
    origin: Url,
    image_keywords: Vec<String>,
    background_keywords: Vec<String>,
    gallery: JsonKeyWalker,
    img_selector: Selector,
    style_selector: Selector,
    script_selector: Selector,
    max_images: usize,
}

impl ImageResolver {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: site.origin()?,
            image_keywords: site.image_keywords.clone(),
            background_keywords: site.background_keywords.clone(),
            gallery: JsonKeyWalker::new(site.gallery_keys.iter().cloned(), site.gallery_max_depth),
            img_selector: parse_selector("img")?,
            style_selector: parse_selector(r#"[style*="background-image"]"#)?,
            script_selector: parse_selector(r#"script[type="application/json"]"#)?,
            max_images: MAX_IMAGES,
        })
    }

    /// Same strategies with a different cap
    pub fn with_limit(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    /// Up to [`MAX_IMAGES`] (or the configured limit) distinct absolute photo
    /// URLs for one fragment
    pub fn resolve(&self, fragment: ElementRef<'_>) -> Vec<String> {
        let candidates = self
            .from_img_tags(fragment)
            .into_iter()
            .chain(self.from_inline_styles(fragment))
            .chain(self.from_embedded_json(fragment));

        let mut seen = HashSet::new();
        let images: Vec<String> = candidates
            .filter(|url| seen.insert(url.clone()))
            .take(self.max_images)
            .collect();

        if !images.is_empty() {
            debug!("Found {} images for listing", images.len());
        }
        images
    }

    fn from_img_tags(&self, fragment: ElementRef<'_>) -> Vec<String> {
        fragment
            .select(&self.img_selector)
            .filter(|img| {
                !img.value()
                    .attr("class")
                    .is_some_and(|class| class.contains("icon"))
            })
            .filter_map(|img| {
                // Lazy-loaded tiles keep the real photo in data-src
                img.value()
                    .attr("data-src")
                    .filter(|src| !src.trim().is_empty())
                    .or_else(|| img.value().attr("src"))
            })
            .filter(|src| !src.contains("data:image") && !src.contains("placeholder"))
            .filter_map(|src| resolve_url(&self.origin, src))
            .filter(|url| contains_any(url, &self.image_keywords))
            .collect()
    }

    fn from_inline_styles(&self, fragment: ElementRef<'_>) -> Vec<String> {
        fragment
            .select(&self.style_selector)
            .filter_map(|el| el.value().attr("style"))
            .filter_map(|style| CSS_URL_RE.captures(style))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .filter_map(|raw| resolve_url(&self.origin, &raw))
            .filter(|url| contains_any(url, &self.background_keywords))
            .collect()
    }

    fn from_embedded_json(&self, fragment: ElementRef<'_>) -> Vec<String> {
        let mut images = Vec::new();

        for script in fragment.select(&self.script_selector) {
            let payload: String = script.text().collect();
            let Ok(data) = serde_json::from_str::<Value>(&payload) else {
                continue;
            };

            for gallery in self.gallery.find(&data) {
                collect_gallery_urls(gallery, &mut images);
            }
        }

        images
    }
}

/// Gallery entries are either bare URL strings or objects with a `url` field
fn collect_gallery_urls(gallery: &Value, images: &mut Vec<String>) {
    match gallery {
        Value::Array(entries) => {
            for entry in entries {
                push_entry(entry, images);
            }
        }
        entry => push_entry(entry, images),
    }
}

fn push_entry(entry: &Value, images: &mut Vec<String>) {
    let url = match entry {
        Value::Object(map) => map.get("url").and_then(Value::as_str),
        other => other.as_str(),
    };

    if let Some(url) = url
        && is_absolute(url)
    {
        images.push(url.to_string());
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub(crate) fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}

pub(crate) fn parse_selector(pattern: &str) -> Result<Selector, ConfigError> {
    Selector::parse(pattern).map_err(|e| ConfigError::InvalidSelector {
        selector: pattern.to_string(),
        reason: format!("{e:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn resolve(html: &str) -> Vec<String> {
        let resolver = ImageResolver::new(&SiteConfig::property24()).unwrap();
        let document = Html::parse_fragment(&format!(r#"<div id="tile">{html}</div>"#));
        let selector = Selector::parse("#tile").unwrap();
        let fragment = document.select(&selector).next().unwrap();
        resolver.resolve(fragment)
    }

    #[test]
    fn prefers_lazy_source_and_skips_noise() {
        let images = resolve(
            r#"
            <img src="/images/spinner.gif" data-src="https://images.prop24.com/listing/1.jpg">
            <img src="data:image/png;base64,AAAA">
            <img src="https://images.prop24.com/placeholder/property.png">
            <img class="p24_icon" src="https://www.property24.com/icons/pool.svg">
            <img src="https://cdn.example.com/banner.jpg">
            <img src="//images.prop24.com/p24/2.jpg">
            "#,
        );

        assert_eq!(
            images,
            vec![
                "https://images.prop24.com/listing/1.jpg",
                "https://images.prop24.com/p24/2.jpg",
            ]
        );
    }

    #[test]
    fn empty_lazy_source_falls_back_to_src() {
        let images = resolve(r#"<img data-src="" src="https://images.prop24.com/listing/7.jpg">"#);

        assert_eq!(images, vec!["https://images.prop24.com/listing/7.jpg"]);
    }

    #[test]
    fn reads_background_images() {
        let images = resolve(
            r#"
            <div style="background-image: url('/property/photos/3.jpg'); height: 200px"></div>
            <div style="background-image:url(https://cdn.example.com/texture.png)"></div>
            "#,
        );

        assert_eq!(images, vec!["https://www.property24.com/property/photos/3.jpg"]);
    }

    #[test]
    fn reads_embedded_gallery_json() {
        let images = resolve(
            r#"
            <script type="application/json">
              {"listing": {"photos": ["https://images.prop24.com/a.jpg", "relative.jpg",
                                      {"url": "https://images.prop24.com/b.jpg"}],
                           "imageUrl": "https://images.prop24.com/c.jpg"}}
            </script>
            <script type="application/json">{ not json</script>
            "#,
        );

        assert_eq!(images.len(), 3);
        assert!(images.contains(&"https://images.prop24.com/a.jpg".to_string()));
        assert!(images.contains(&"https://images.prop24.com/b.jpg".to_string()));
        assert!(images.contains(&"https://images.prop24.com/c.jpg".to_string()));
    }

    #[test]
    fn strategies_keep_priority_order_dedup_and_cap() {
        let images = resolve(
            r#"
            <img src="https://images.prop24.com/listing/1.jpg">
            <img data-src="https://images.prop24.com/listing/1.jpg">
            <img src="https://images.prop24.com/listing/2.jpg">
            <div style="background-image: url(https://images.prop24.com/listing/3.jpg)"></div>
            <script type="application/json">
              {"images": ["https://images.prop24.com/listing/2.jpg",
                          "https://images.prop24.com/listing/4.jpg",
                          "https://images.prop24.com/listing/5.jpg",
                          "https://images.prop24.com/listing/6.jpg"]}
            </script>
            "#,
        );

        assert_eq!(
            images,
            vec![
                "https://images.prop24.com/listing/1.jpg",
                "https://images.prop24.com/listing/2.jpg",
                "https://images.prop24.com/listing/3.jpg",
                "https://images.prop24.com/listing/4.jpg",
                "https://images.prop24.com/listing/5.jpg",
            ]
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let html = r#"
            <img data-src="https://images.prop24.com/listing/9.jpg">
            <div style="background-image: url('/listing/10.jpg')"></div>
        "#;

        assert_eq!(resolve(html), resolve(html));
    }
}
