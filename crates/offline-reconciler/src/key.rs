//! Mapping between request URLs and manifest keys

use crate::error::Result;
use url::Url;

/// Manifest key of the entry document
pub const ROOT_KEY: &str = "/";

/// Query strings of this form are cache-busting version suffixes, not part of the key
const VERSION_QUERY_PREFIX: &str = "v=";

/// Normalize a request URL to the manifest key it would be stored under.
///
/// Returns `None` for URLs on another origin. The root URL, hash-routed
/// root URLs (`/#/map`) and `/?v=...` all map to [`ROOT_KEY`].
pub fn resource_key(origin: &Url, url: &Url) -> Option<String> {
    if url.origin() != origin.origin() {
        return None;
    }

    let path = url.path();
    let mut key = path.strip_prefix('/').unwrap_or(path).to_string();

    if let Some(query) = url.query() {
        if !query.starts_with(VERSION_QUERY_PREFIX) {
            key.push('?');
            key.push_str(query);
        }
    }

    if key.is_empty() {
        return Some(ROOT_KEY.to_string());
    }
    Some(key)
}

/// URL a manifest key is fetched from
pub fn entry_url(origin: &Url, key: &str) -> Result<Url> {
    if key == ROOT_KEY {
        return Ok(origin.join("/")?);
    }
    Ok(origin.join(key.trim_start_matches('/'))?)
}

/// Reduce a URL to its origin root (`scheme://host:port/`)
pub fn origin_root(url: &Url) -> Result<Url> {
    Ok(Url::parse(&url.origin().ascii_serialization())?.join("/")?)
}
