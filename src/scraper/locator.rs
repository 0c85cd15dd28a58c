//! Finds candidate listing fragments on a results page

use scraper::{ElementRef, Html, Selector};

use crate::error::ConfigError;

/// An anchor match is widened to the first ancestor carrying at least this
/// much text, since the listing copy usually sits above the link.
pub const MIN_FRAGMENT_TEXT: usize = 50;

/// Elements whose text is never shown on the rendered page
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "template"];

/// A subtree of the page that may hold one listing
#[derive(Debug, Clone)]
pub struct ListingFragment<'a> {
    pub element: ElementRef<'a>,
    /// Text nodes trimmed and joined with single spaces
    pub text: String,
    /// Selector pattern that located this fragment
    pub selector: &'a str,
}

pub struct FragmentLocator {
    selectors: Vec<(String, Selector)>,
}

impl FragmentLocator {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let selectors = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Selector::parse(pattern)
                    .map(|selector| (pattern.to_string(), selector))
                    .map_err(|e| ConfigError::InvalidSelector {
                        selector: pattern.to_string(),
                        reason: format!("{e:?}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { selectors })
    }

    /// Apply every selector in priority order and return all matches.
    ///
    /// Different listing templates on one page match different selectors, so
    /// nothing is skipped here; overlapping matches are collapsed later by the
    /// page assembler.
    pub fn locate<'a>(&'a self, document: &'a Html) -> Vec<ListingFragment<'a>> {
        let mut fragments = Vec::new();

        for (pattern, selector) in &self.selectors {
            for element in document.select(selector) {
                let Some(container) = fragment_boundary(element) else {
                    continue;
                };

                fragments.push(ListingFragment {
                    element: container,
                    text: flatten_text(container),
                    selector: pattern.as_str(),
                });
            }
        }

        fragments
    }
}

/// Block matches are their own boundary. Anchors climb until enough text is
/// enclosed; an anchor with no such ancestor yields nothing.
fn fragment_boundary(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if element.value().name() != "a" {
        return Some(element);
    }

    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| raw_text_len(*ancestor) >= MIN_FRAGMENT_TEXT)
}

fn raw_text_len(element: ElementRef<'_>) -> usize {
    visible_text(element).map(|chunk| chunk.chars().count()).sum()
}

/// Text nodes under `element`, minus script, style and template payloads
fn visible_text<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
    element.descendants().filter_map(move |node| {
        let text = node.value().as_text()?;
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .filter_map(|ancestor| ancestor.value().as_element())
            .any(|el| HIDDEN_ELEMENTS.contains(&el.name()));
        (!hidden).then_some(&**text)
    })
}

pub fn flatten_text(element: ElementRef<'_>) -> String {
    visible_text(element)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
