use url::Url;

use crate::error::{Result, SessionError};

/// Parse `raw` as an absolute site URI with any trailing `/` trimmed from a
/// non-root path, so `https://site/a/` and `https://site/a` address the same
/// site.
pub fn normalize_target(raw: &str) -> Result<Url> {
    let invalid = || SessionError::InvalidTarget(raw.to_string());

    let mut url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(invalid());
    }

    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed);
    }
    url.set_fragment(None);
    Ok(url)
}
