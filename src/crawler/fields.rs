//! Detail page field extraction
//!
//! Every field has its own rule and every rule is total: a rule that finds
//! nothing leaves its field absent and never affects the others. Malformed
//! HTML is handled by the parser's error recovery, so [`extract_fields`]
//! cannot fail.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// Image URL fragment for the model gallery bucket
const CAR_MODEL_IMAGE_MARKER: &str = "/resized/car_model/";

/// Image variants preferred over thumbnails when present
const PREFERRED_IMAGE_VARIANTS: &[&str] = &["webp_listing_main", "webp_slide_show"];

/// Structured summary of one detail page
///
/// Absent fields are `None` or empty collections; absence is a valid state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSummary {
    pub title: Option<String>,

    /// Price as displayed, e.g. `SAR 125,000`
    pub price: Option<String>,

    /// Whole-currency amount parsed from `price`
    pub price_amount: Option<u64>,

    /// Specification label → value; first occurrence of a label wins
    pub attributes: BTreeMap<String, String>,

    pub breadcrumbs: Vec<String>,
    pub images: Vec<String>,
    pub features: Vec<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
}

impl ExtractedSummary {
    /// Returns true if no rule produced anything
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Derives an [`ExtractedSummary`] from raw detail page HTML
///
/// # Example
///
/// ```
/// use vehicle_crawl::crawler::extract_fields;
///
/// let summary = extract_fields("<h1> Toyota  Camry 2024 </h1><p>SAR 125,000</p>");
/// assert_eq!(summary.title.as_deref(), Some("Toyota Camry 2024"));
/// assert_eq!(summary.price_amount, Some(125_000));
/// ```
pub fn extract_fields(raw_html: &str) -> ExtractedSummary {
    let document = Html::parse_document(raw_html);

    let price = extract_price(&document);
    let price_amount = price.as_deref().and_then(parse_price_amount);

    ExtractedSummary {
        title: extract_title(&document),
        price,
        price_amount,
        attributes: extract_attributes(&document),
        breadcrumbs: extract_breadcrumbs(&document),
        images: extract_images(&document),
        features: extract_features(&document),
        description: extract_description(&document),
        canonical_url: extract_canonical(&document),
    }
}

/// Collapses runs of whitespace and trims
fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// First non-empty text among elements matching `css`
fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// First non-empty attribute value among elements matching `css`
fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_title(document: &Html) -> Option<String> {
    first_text(document, "#overview-panel h1")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| first_attr(document, "meta[property='og:title']", "content").map(|t| clean_text(&t)))
        .or_else(|| first_text(document, "title"))
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal, so compilation cannot fail
    PATTERN.get_or_init(|| Regex::new(r"SAR\s*\d[\d,]*(?:\.\d+)?").unwrap())
}

/// First `SAR <amount>` found in a text-bearing element, in document order
fn extract_price(document: &Html) -> Option<String> {
    let selector = Selector::parse("p, span, div").ok()?;
    document.select(&selector).find_map(|el| {
        let text = element_text(el);
        price_pattern().find(&text).map(|m| m.as_str().to_string())
    })
}

/// `SAR 125,000.50` → 125000
fn parse_price_amount(price: &str) -> Option<u64> {
    let digits: String = price
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Label/value pairs from the highlight and measurement lists, then any
/// definition lists on the page
fn extract_attributes(document: &Html) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();

    for list_css in [
        "[role='list'][aria-labelledby='vehicle-highlights'] [role='listitem']",
        "[role='list'][aria-label='Vehicle measurements'] [role='listitem']",
    ] {
        for (label, value) in labelled_items(document, list_css) {
            attributes.entry(label).or_insert(value);
        }
    }

    for (label, value) in definition_pairs(document) {
        attributes.entry(label).or_insert(value);
    }

    attributes
}

fn labelled_items(document: &Html, item_css: &str) -> Vec<(String, String)> {
    let (Ok(items), Ok(label_sel), Ok(value_sel)) = (
        Selector::parse(item_css),
        Selector::parse(".text-sm"),
        Selector::parse(".text-base"),
    ) else {
        return Vec::new();
    };

    document
        .select(&items)
        .filter_map(|item| {
            let label = item.select(&label_sel).next().map(element_text)?;
            let value = item.select(&value_sel).next().map(element_text)?;
            (!label.is_empty() && !value.is_empty()).then_some((label, value))
        })
        .collect()
}

/// `<dt>label</dt><dd>value</dd>` pairs
fn definition_pairs(document: &Html) -> Vec<(String, String)> {
    let Ok(terms) = Selector::parse("dl dt") else {
        return Vec::new();
    };

    document
        .select(&terms)
        .filter_map(|dt| {
            let dd = dt
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() != "dt")
                .filter(|el| el.value().name() == "dd")?;
            let label = element_text(dt);
            let value = element_text(dd);
            (!label.is_empty() && !value.is_empty()).then_some((label, value))
        })
        .collect()
}

fn extract_breadcrumbs(document: &Html) -> Vec<String> {
    for css in [
        "nav[aria-label='Breadcrumb'] ol > li",
        "nav.breadcrumbs ol > li",
    ] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let crumbs: Vec<String> = document
            .select(&selector)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !crumbs.is_empty() {
            return crumbs;
        }
    }
    Vec::new()
}

/// Gallery images from the car-model bucket, preferring full-size variants
fn extract_images(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for img in document.select(&selector) {
        let attrs = img.value();
        for name in ["src", "data-src"] {
            if let Some(value) = attrs.attr(name).map(str::trim).filter(|v| !v.is_empty()) {
                candidates.push(value.to_string());
            }
        }
        // Largest srcset entry is listed last
        if let Some(last) = attrs
            .attr("srcset")
            .and_then(|set| set.split(',').map(str::trim).filter(|s| !s.is_empty()).last())
            .and_then(|entry| entry.split_whitespace().next())
        {
            candidates.push(last.to_string());
        }
    }

    let gallery: Vec<&String> = candidates
        .iter()
        .filter(|src| src.contains(CAR_MODEL_IMAGE_MARKER))
        .collect();
    let preferred: Vec<&String> = gallery
        .iter()
        .copied()
        .filter(|src| PREFERRED_IMAGE_VARIANTS.iter().any(|v| src.contains(v)))
        .collect();

    let pick = if preferred.is_empty() { gallery } else { preferred };
    dedupe(pick.into_iter().cloned())
}

fn extract_features(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("span.text-base.capitalize[title]") else {
        return Vec::new();
    };

    dedupe(document.select(&selector).map(|span| {
        span.value()
            .attr("title")
            .map(clean_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| element_text(span))
    }))
}

fn extract_description(document: &Html) -> Option<String> {
    first_text(document, "[data-slot='card-content'].prose .line-clamp-3")
}

fn extract_canonical(document: &Html) -> Option<String> {
    first_attr(document, "link[rel='canonical']", "href")
        .or_else(|| first_attr(document, "meta[property='og:url']", "content"))
}

/// Drops empty strings and repeats, keeping first-seen order
fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}
