//! Digest → storage path mapping.
//!
//! Only the shape needed to lay payloads out safely is checked
//! (`algorithm:encoded`); content verification happens elsewhere.

use std::path::PathBuf;

use crate::error::{CacheError, Result};

fn valid_algorithm(algorithm: &str) -> bool {
    let mut chars = algorithm.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
}

fn valid_encoded(encoded: &str) -> bool {
    !encoded.is_empty()
        && encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '=' || c == '_' || c == '-')
}

/// Splits and checks an `algorithm:encoded` digest.
pub fn validate_digest(digest: &str) -> Result<(&str, &str)> {
    match digest.split_once(':') {
        Some((algorithm, encoded)) if valid_algorithm(algorithm) && valid_encoded(encoded) => {
            Ok((algorithm, encoded))
        }
        _ => Err(CacheError::InvalidDigest(digest.to_string())),
    }
}

/// Root-relative payload path: `<dir>/<algorithm>/<encoded>`.
pub fn digest_path(dir: &str, digest: &str) -> Result<PathBuf> {
    let (algorithm, encoded) = validate_digest(digest)?;
    Ok(PathBuf::from(dir).join(algorithm).join(encoded))
}
