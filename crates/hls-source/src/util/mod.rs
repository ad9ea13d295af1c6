use url::Url;

use crate::error::{HlsError, HlsResult};

pub mod http;

/// Strips all http query parameters from a media location.
pub fn strip_parameters(location: &str) -> &str {
    match location.find('?') {
        Some(index) if index > 0 => &location[..index],
        _ => location,
    }
}

/// Last path component of a location, without query parameters.
pub fn file_name(location: &str) -> &str {
    let path = strip_parameters(location);
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolves a location found inside a playlist against the playlist url.
///
/// Absolute `http(s)://` locations are used as is, anything else is joined
/// to the directory of the containing playlist.
pub fn resolve_location(playlist_url: &Url, location: &str) -> HlsResult<Url> {
    let location = location.trim();
    if location.is_empty() {
        return Err(HlsError::malformed("empty uri"));
    }

    let resolved = if location.starts_with("http://") || location.starts_with("https://") {
        Url::parse(location)
    } else {
        playlist_url.join(location)
    };
    resolved.map_err(|e| HlsError::malformed(format!("can not resolve {location}: {e}")))
}
