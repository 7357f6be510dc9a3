//! Opaque page tokens.
//!
//! A token carries `{resume key, total estimate, page size}` for one resource kind. Current
//! tokens are URL-safe base64 over a small versioned JSON record. Older clients still hold
//! delimiter-joined tokens, so [`PageToken::decode`] falls back to the delimited form.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Upper bound on the token text accepted from callers.
pub const MAX_TOKEN_LEN: usize = 8 * 1024;

const TOKEN_VERSION: u32 = 1;

/// Delimiter of legacy reading tokens.
pub const VALUES_DELIMITER: &str = "|";
/// Delimiter of legacy catalog tokens.
pub const CATALOG_DELIMITER: &str = "|||";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is empty")]
    Empty,

    #[error("cursor exceeds max length: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("cursor is not valid base64")]
    InvalidEncoding,

    #[error("cursor is not valid UTF-8")]
    InvalidText,

    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u32),

    #[error("cursor belongs to {found} pages, not {expected} pages")]
    WrongKind { expected: PageKind, found: PageKind },

    #[error("cursor field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("cursor resume key '{0}' is malformed")]
    InvalidResumeKey(String),
}

/// Resource family a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Values,
    Catalog,
}

impl PageKind {
    pub fn delimiter(&self) -> &'static str {
        match self {
            PageKind::Values => VALUES_DELIMITER,
            PageKind::Catalog => CATALOG_DELIMITER,
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Values => f.write_str("values"),
            PageKind::Catalog => f.write_str("catalog"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub kind: PageKind,
    pub resume_key: String,
    pub total: Option<u64>,
    pub page_size: i32,
}

#[derive(Serialize, Deserialize)]
struct WireToken {
    v: u32,
    kind: PageKind,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    size: i32,
}

impl PageToken {
    pub fn new(
        kind: PageKind,
        resume_key: impl Into<String>,
        page_size: i32,
        total: Option<u64>,
    ) -> Self {
        Self {
            kind,
            resume_key: resume_key.into(),
            total,
            page_size,
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let wire = WireToken {
            v: TOKEN_VERSION,
            kind: self.kind,
            key: self.resume_key.clone(),
            total: self.total,
            size: self.page_size,
        };
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token issued for `kind`, accepting both the structured and the legacy form.
    pub fn decode(token: &str, kind: PageKind) -> Result<Self, CursorError> {
        let token = checked_token(token)?;

        if let Ok(bytes) = URL_SAFE_NO_PAD.decode(token) {
            if let Ok(wire) = serde_json::from_slice::<WireToken>(&bytes) {
                if wire.v != TOKEN_VERSION {
                    return Err(CursorError::UnsupportedVersion(wire.v));
                }
                if wire.kind != kind {
                    return Err(CursorError::WrongKind {
                        expected: kind,
                        found: wire.kind,
                    });
                }
                return Ok(Self {
                    kind,
                    resume_key: wire.key,
                    total: wire.total,
                    page_size: wire.size,
                });
            }
        }

        let parts = decode_parts(token, kind.delimiter())?;
        Self::from_parts(kind, parts)
    }

    /// Interpret the parts of a legacy delimited token.
    ///
    /// Catalog tokens are `key`, `key|||total` or `key|||total|||size`. Reading tokens use
    /// the last part as the page size whenever there is more than one part.
    fn from_parts(kind: PageKind, mut parts: Vec<String>) -> Result<Self, CursorError> {
        let resume_key = if parts.is_empty() {
            String::new()
        } else {
            parts.remove(0)
        };

        let (total, page_size) = match kind {
            PageKind::Catalog => {
                let total = parts.first().map(|p| parse_total(p)).transpose()?;
                let size = parts.get(1).map(|p| parse_size(p)).transpose()?;
                (total.flatten(), size)
            }
            PageKind::Values => match parts.len() {
                0 => (None, None),
                1 => (None, Some(parse_size(&parts[0])?)),
                n => (parse_total(&parts[0])?, Some(parse_size(&parts[n - 1])?)),
            },
        };

        Ok(Self {
            kind,
            resume_key,
            total,
            page_size: page_size.unwrap_or(0),
        })
    }

    /// Legacy catalog tokens may omit the page size.
    pub fn has_page_size(&self) -> bool {
        self.page_size > 0
    }
}

/// Join parts with `delimiter` and base64-wrap them.
pub fn encode_parts<S: AsRef<str>>(parts: &[S], delimiter: &str) -> String {
    let joined = parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(delimiter);
    STANDARD.encode(joined)
}

/// Undo [`encode_parts`].
pub fn decode_parts(token: &str, delimiter: &str) -> Result<Vec<String>, CursorError> {
    let token = checked_token(token)?;
    let bytes = STANDARD
        .decode(token)
        .or_else(|_| URL_SAFE_NO_PAD.decode(token))
        .map_err(|_| CursorError::InvalidEncoding)?;
    let text = String::from_utf8(bytes).map_err(|_| CursorError::InvalidText)?;

    Ok(text.split(delimiter).map(str::to_string).collect())
}

fn checked_token(token: &str) -> Result<&str, CursorError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CursorError::Empty);
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(CursorError::TooLong {
            len: token.len(),
            max: MAX_TOKEN_LEN,
        });
    }
    Ok(token)
}

fn parse_total(part: &str) -> Result<Option<u64>, CursorError> {
    let part = part.trim();
    if part.is_empty() || part.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    part.parse::<u64>()
        .map(Some)
        .map_err(|_| CursorError::InvalidNumber {
            field: "total",
            value: part.to_string(),
        })
}

fn parse_size(part: &str) -> Result<i32, CursorError> {
    let part = part.trim();
    part.parse::<i32>().map_err(|_| CursorError::InvalidNumber {
        field: "page size",
        value: part.to_string(),
    })
}
