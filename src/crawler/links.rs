//! Listing page link extraction
//!
//! Detail links are found by scanning every anchor in the document and
//! keeping those whose resolved URL satisfies [`DetailRules`]. Nothing here
//! depends on result-container classes or nesting, so a listing page that
//! wraps its cards differently still yields the same links.

use crate::url::{canonical_id, normalize_parsed, DetailRules};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A normalized link to one vehicle's detail page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetailLink {
    /// Normalized absolute URL
    pub url: Url,

    /// Storage key derived from `url`
    pub canonical_id: String,
}

impl DetailLink {
    /// Wraps a normalized URL and derives its canonical id
    pub fn new(url: Url) -> Self {
        let canonical_id = canonical_id(&url);
        Self { url, canonical_id }
    }
}

/// Extracts detail links from a listing page's HTML
///
/// # Rules
///
/// - Every `<a href>` in the document is considered, wherever it sits
/// - `href` is resolved against `page_url`, then normalized (fragment and
///   tracking parameters dropped, trailing slash stripped)
/// - A link is kept when [`DetailRules::is_detail_url`] accepts it
/// - Duplicates are dropped, keeping the first occurrence
///
/// An empty result means the page has no results; it is not an error.
///
/// # Example
///
/// ```
/// use url::Url;
/// use vehicle_crawl::crawler::extract_detail_links;
/// use vehicle_crawl::url::DetailRules;
///
/// let page = Url::parse("https://ksa.yallamotor.com/new-cars/search?page=1").unwrap();
/// let rules = DetailRules::for_site(&Url::parse("https://ksa.yallamotor.com").unwrap()).unwrap();
/// let html = r#"<div class="card"><a href="/new-cars/toyota-camry-2024">Camry</a></div>"#;
///
/// let links = extract_detail_links(html, &page, &rules);
/// assert_eq!(links[0].url.as_str(), "https://ksa.yallamotor.com/new-cars/toyota-camry-2024");
/// ```
pub fn extract_detail_links(html: &str, page_url: &Url, rules: &DetailRules) -> Vec<DetailLink> {
    let document = Html::parse_document(html);

    let Ok(anchor_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let Some(url) = resolve_detail_link(href, page_url, rules) else {
            continue;
        };

        if seen.insert(url.as_str().to_string()) {
            links.push(DetailLink::new(url));
        }
    }

    links
}

/// Resolves one href and returns its normalized URL if it is a detail link
///
/// Returns None if the link should be excluded:
/// - empty, fragment-only, javascript:, mailto:, tel:, data: hrefs
/// - hrefs that do not resolve to an absolute http(s) URL
/// - URLs that fail [`DetailRules::is_detail_url`]
fn resolve_detail_link(href: &str, page_url: &Url, rules: &DetailRules) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = page_url.join(href).ok()?;
    let normalized = normalize_parsed(absolute).ok()?;

    rules.is_detail_url(&normalized).then_some(normalized)
}
