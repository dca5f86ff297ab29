//! Utility functions for naming local files

use crate::error::{Error, Result};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use std::path::PathBuf;

/// Check that a remote-supplied name can be used as a single path component
///
/// Rejects empty names, `.` and `..`, and anything containing a path separator or NUL,
/// so a hostile release record cannot write outside its release directory.
///
/// # Examples
///
/// ```
/// use release_mirror::utils::safe_component;
///
/// assert!(safe_component("asset", "widget.bin").is_ok());
/// assert!(safe_component("asset", "../widget.bin").is_err());
/// ```
pub fn safe_component<'a>(kind: &'static str, name: &'a str) -> Result<&'a str> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(Error::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(name)
}

/// Turn a `/`-separated remote name into a relative path
///
/// Release tags such as `release/1.0` or `@acme/widgets@1.0.0` become nested
/// directories. Every piece must pass [`safe_component`].
///
/// # Examples
///
/// ```
/// use release_mirror::utils::safe_relative_path;
/// use std::path::Path;
///
/// assert_eq!(
///     safe_relative_path("tag", "release/1.0").unwrap(),
///     Path::new("release").join("1.0")
/// );
/// assert!(safe_relative_path("tag", "release/../..").is_err());
/// ```
pub fn safe_relative_path(kind: &'static str, name: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for piece in name.split('/') {
        safe_component(kind, piece).map_err(|_| Error::InvalidName {
            kind,
            name: name.to_string(),
        })?;
        path.push(piece);
    }
    Ok(path)
}

/// Extract the filename from a `Content-Disposition` header
///
/// Understands `filename="x"`, `filename=x` and the RFC 5987 form
/// `filename*=UTF-8''x`, preferring the encoded form when both are present.
/// The extension is kept.
///
/// # Examples
///
/// ```
/// use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderValue};
/// use release_mirror::utils::filename_from_headers;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(
///     CONTENT_DISPOSITION,
///     HeaderValue::from_static("attachment; filename=acme-widgets-v1.0.0-0-gf63690a.tar.gz"),
/// );
/// assert_eq!(
///     filename_from_headers(&headers).as_deref(),
///     Some("acme-widgets-v1.0.0-0-gf63690a.tar.gz")
/// );
/// ```
pub fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    filename_from_content_disposition(value)
}

/// Parse the filename out of a raw `Content-Disposition` value
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut encoded = None;

    for part in value.split(';') {
        let part = part.trim();
        if let Some(rest) = strip_prefix_ignore_case(part, "filename*=") {
            // Format is: charset'lang'encoded-filename
            if let Some(idx) = rest.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&rest[idx + 1..])
            {
                encoded = Some(decoded.into_owned());
            }
        } else if let Some(rest) = strip_prefix_ignore_case(part, "filename=") {
            plain = Some(rest.trim_matches('"').to_string());
        }
    }

    encoded.or(plain).filter(|name| !name.is_empty())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}
