use crate::{CanonicalIdentifier, IntegrityError, Result};
use url::Url;

/// CDN resource types whose delivery URLs carry a `/upload/v<digits>/` version segment.
const VERSIONED_RESOURCES: [&str; 3] = ["image", "video", "raw"];

/// Reduce a CDN URL to its canonical identifier: `host + path`, lowercased,
/// with the first `/<resource>/upload/v<digits>/` segment collapsed to `/`.
///
/// Inputs without a scheme are parsed as `https://`. Query, fragment, port and
/// userinfo are discarded, so two uploads of the same asset under different
/// CDN versions (or schemes, or letter case) map to the same identifier.
pub fn canonicalize(url: &str) -> Result<CanonicalIdentifier> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(IntegrityError::InvalidInput("file reference is empty".into()));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| IntegrityError::InvalidInput(format!("unparsable file reference {trimmed:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IntegrityError::InvalidInput(format!(
            "unsupported scheme {:?}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| IntegrityError::InvalidInput(format!("file reference {trimmed:?} has no host")))?;

    // Lowercased first, so the version segment matches in any letter case.
    let path = strip_version_segment(&parsed.path().to_ascii_lowercase());
    CanonicalIdentifier::new(format!("{}{}", host.to_ascii_lowercase(), path))
}

/// True when the input starts with an RFC 3986 scheme followed by `://`.
fn has_scheme(input: &str) -> bool {
    let Some(idx) = input.find("://") else {
        return false;
    };
    let scheme = &input[..idx];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_version_segment(path: &str) -> String {
    for resource in VERSIONED_RESOURCES {
        let marker = format!("/{resource}/upload/v");
        let mut search_from = 0;
        while let Some(offset) = path[search_from..].find(&marker) {
            let start = search_from + offset;
            let digits_start = start + marker.len();
            let digits = path[digits_start..]
                .bytes()
                .take_while(|b| b.is_ascii_digit())
                .count();
            let end = digits_start + digits;
            if digits > 0 && path[end..].starts_with('/') {
                return format!("{}/{}", &path[..start], &path[end + 1..]);
            }
            search_from = start + 1;
        }
    }
    path.to_string()
}
