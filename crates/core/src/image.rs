//! Stored image naming: scopes, sanitized file names and public URLs.

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::fmt;

/// Characters escaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Scope used when the caller does not supply one.
pub const DEFAULT_SCOPE: &str = "anon";

/// Maximum scope length in bytes.
pub const MAX_SCOPE_LEN: usize = 64;

/// Maximum base name length in bytes, leaving room for a full-fingerprint suffix
/// and extension inside the common 255-byte file name limit.
pub const MAX_BASE_NAME_LEN: usize = 160;

/// Maximum extension length in bytes.
pub const MAX_EXTENSION_LEN: usize = 16;

/// A storage namespace. Always a single, safe path segment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Scope(String);

impl Scope {
    /// Parse and validate a scope segment.
    ///
    /// Allowed characters are ASCII alphanumerics, `-`, `_` and `.`;
    /// `.` and `..` are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidScope("scope cannot be empty".to_string()));
        }
        if s.len() > MAX_SCOPE_LEN {
            return Err(Error::InvalidScope(format!(
                "scope exceeds {MAX_SCOPE_LEN} bytes"
            )));
        }
        if s == "." || s == ".." {
            return Err(Error::InvalidScope(format!("reserved scope: {s}")));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(Error::InvalidScope(format!(
                "invalid character {c:?} in scope {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Resolve an optional caller-supplied scope, falling back to `default`
    /// when absent or empty.
    pub fn resolve(raw: Option<&str>, default: &Scope) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(default.clone()),
            Some(s) => Self::parse(s),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self(DEFAULT_SCOPE.to_string())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.0)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sanitized file name, split into base and extension.
///
/// Derived from the client-supplied name by dropping any directory
/// components, splitting on the last `.`, and replacing whitespace and
/// control characters in the base with `_`. Case is preserved.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StoredName {
    base: String,
    extension: String,
}

impl StoredName {
    /// Derive a stored name from the client-supplied original name.
    pub fn from_original(original: &str) -> Result<Self> {
        let file_name = original
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(original)
            .trim();

        let (base, extension) = file_name.rsplit_once('.').ok_or_else(|| {
            Error::InvalidFileName(format!("{original:?} has no extension"))
        })?;

        if base.trim().is_empty() {
            return Err(Error::InvalidFileName(format!(
                "{original:?} has an empty base name"
            )));
        }
        if extension.is_empty() {
            return Err(Error::InvalidFileName(format!(
                "{original:?} has an empty extension"
            )));
        }
        if extension.len() > MAX_EXTENSION_LEN
            || !extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::InvalidFileName(format!(
                "unsupported extension {extension:?}"
            )));
        }

        let base: String = base
            .chars()
            .map(|c| {
                if c.is_whitespace() || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        if base.len() > MAX_BASE_NAME_LEN {
            return Err(Error::InvalidFileName(format!(
                "base name exceeds {MAX_BASE_NAME_LEN} bytes"
            )));
        }

        Ok(Self {
            base,
            extension: extension.to_string(),
        })
    }

    /// The sanitized base name (without extension).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The original extension, case preserved.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Same name with `-{suffix}` appended to the base.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            base: format!("{}-{}", self.base, suffix),
            extension: self.extension.clone(),
        }
    }

    /// Deterministic names tried in order when storing `fingerprint`'s content.
    pub fn candidates(&self, fingerprint: &ContentHash) -> [StoredName; 3] {
        [
            self.clone(),
            self.with_suffix(&fingerprint.short_hex(12)),
            self.with_suffix(&fingerprint.to_hex()),
        ]
    }

    /// Fallback name once every deterministic candidate is taken.
    ///
    /// `token` must be unique per call (a random UUID in practice).
    pub fn unique_candidate(&self, fingerprint: &ContentHash, token: &str) -> StoredName {
        self.with_suffix(&format!("{}-{token}", fingerprint.short_hex(12)))
    }
}

impl fmt::Debug for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoredName({self})")
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.extension)
    }
}

/// A persisted image as seen by callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
    pub fingerprint: ContentHash,
    pub scope: Scope,
    pub stored_name: String,
}

/// Object store key for a stored file.
pub fn object_key(scope: &Scope, stored_name: &str) -> String {
    format!("{}/{}", scope.as_str(), stored_name)
}

/// Public URL of a stored file: `{base_url}/images/{scope}/{stored_name}`.
///
/// The stored name is percent-encoded as a path segment.
pub fn public_url(base_url: &str, scope: &Scope, stored_name: &str) -> String {
    format!(
        "{}/images/{}/{}",
        base_url.trim_end_matches('/'),
        scope.as_str(),
        utf8_percent_encode(stored_name, PATH_SEGMENT)
    )
}
