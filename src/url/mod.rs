//! URL handling module for Vehicle-Crawl
//!
//! This module provides URL normalization, canonical id derivation, listing
//! page URL construction, and the detail-page predicate used by the link
//! extractor.

mod normalize;

use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

// Re-export main functions
pub use normalize::{normalize_parsed, normalize_url};

/// Path segment under which both listing and detail pages live
pub const NEW_CARS_SEGMENT: &str = "/new-cars/";

/// Listing (search results) path, relative to the site root
pub const LISTING_PATH: &str = "/new-cars/search";

/// Derives the storage key for a normalized URL
///
/// The id is the hex SHA-256 of the normalized URL string, so every crawl of
/// the same page collides onto the same record.
///
/// # Examples
///
/// ```
/// use vehicle_crawl::url::{canonical_id, normalize_url};
///
/// let a = normalize_url("https://example.com/new-cars/camry/?utm_source=x").unwrap();
/// let b = normalize_url("https://example.com/new-cars/camry#specs").unwrap();
/// assert_eq!(canonical_id(&a), canonical_id(&b));
/// ```
pub fn canonical_id(normalized: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds `{base_url}/new-cars/search?page={n}`
pub fn listing_url(base_url: &Url, page: u32) -> Result<Url, UrlError> {
    let root = base_url.as_str().trim_end_matches('/');
    let raw = format!("{}{}?page={}", root, LISTING_PATH, page);
    Url::parse(&raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))
}

/// Decides which links on a listing page point at vehicle detail pages
///
/// A link is a detail link when it resolves to the site's own host and its
/// path starts with `<site root>/new-cars/` but is not the listing path
/// itself. Container markup plays no part in the decision.
#[derive(Debug, Clone)]
pub struct DetailRules {
    host: String,
    port: Option<u16>,
    detail_prefix: String,
    listing_path: String,
}

impl DetailRules {
    /// Derives the rules for a site root such as `https://ksa.yallamotor.com`
    /// or `https://ksa.yallamotor.com/ar`
    pub fn for_site(base_url: &Url) -> Result<Self, UrlError> {
        let host = base_url
            .host_str()
            .ok_or(UrlError::MissingDomain)?
            .to_lowercase();
        let root = base_url.path().trim_end_matches('/');

        Ok(Self {
            host,
            port: base_url.port_or_known_default(),
            detail_prefix: format!("{}{}", root, NEW_CARS_SEGMENT),
            listing_path: format!("{}{}", root, LISTING_PATH),
        })
    }

    /// Returns true if a URL path names a detail page
    pub fn is_detail_path(&self, path: &str) -> bool {
        if !path.starts_with(&self.detail_prefix) {
            return false;
        }

        let rest = &path[self.detail_prefix.len()..];
        if rest.trim_matches('/').is_empty() {
            return false;
        }

        // The listing path and anything under it are search pages
        !(path == self.listing_path || path.starts_with(&format!("{}/", self.listing_path)))
    }

    /// Returns true if an absolute URL is a detail page on this site
    pub fn is_detail_url(&self, url: &Url) -> bool {
        let same_host = url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.host));

        same_host && url.port_or_known_default() == self.port && self.is_detail_path(url.path())
    }
}
