//! Stored document model and the validated form handed to storage engines.

use crate::canonical;
use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Open-ended key/value attachment on a document.
pub type Metadata = serde_json::Map<String, Value>;

/// A persisted, deduplicated JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Hex fingerprint of the canonical form.
    pub content_hash: String,
    /// Raw bytes exactly as first submitted.
    pub content: Vec<u8>,
    pub size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Result of a single store: the three outcomes are new, existing, or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// No document shared the fingerprint; this one was inserted.
    Created(Document),
    /// A document with the same fingerprint already existed and is returned unchanged.
    Existing(Document),
}

impl StoreOutcome {
    pub fn document(&self) -> &Document {
        match self {
            Self::Created(doc) | Self::Existing(doc) => doc,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            Self::Created(doc) | Self::Existing(doc) => doc,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// A validated document ready for insertion.
///
/// Holds the raw bytes together with the canonical encoding and fingerprint
/// derived from them, so engines never re-parse input.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub raw: Vec<u8>,
    pub canonical: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub metadata: Option<Metadata>,
}

impl PreparedDocument {
    /// Validate raw bytes and derive the canonical form and fingerprint.
    ///
    /// Empty input, a top-level `null`, input larger than `max_bytes`,
    /// malformed JSON and `\u0000` anywhere in the document or its metadata
    /// are all rejected as invalid documents.
    pub fn prepare(raw: &[u8], metadata: Option<Metadata>, max_bytes: usize) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidDocument("document is empty".to_string()));
        }
        if raw.len() > max_bytes {
            return Err(Error::InvalidDocument(format!(
                "document is {} bytes, limit is {max_bytes}",
                raw.len()
            )));
        }

        let value = canonical::parse(raw)?;
        if value.is_null() {
            return Err(Error::InvalidDocument(
                "top-level null is not a document".to_string(),
            ));
        }
        // PostgreSQL JSONB cannot hold U+0000; both backends refuse it.
        if contains_nul(&value) || metadata.as_ref().is_some_and(map_contains_nul) {
            return Err(Error::InvalidDocument(
                "strings containing \\u0000 are not supported".to_string(),
            ));
        }

        let canonical = canonical::canonical_bytes(&value);
        let fingerprint = Fingerprint::compute(&canonical);
        Ok(Self {
            raw: raw.to_vec(),
            canonical,
            fingerprint,
            metadata,
        })
    }

    pub fn size(&self) -> i64 {
        self.raw.len() as i64
    }

    pub fn content_hash(&self) -> String {
        self.fingerprint.to_hex()
    }

    /// Canonical form as text, for JSON-typed columns.
    pub fn canonical_str(&self) -> &str {
        // Canonical bytes are produced by the JSON encoder and are always UTF-8.
        std::str::from_utf8(&self.canonical).unwrap_or_default()
    }
}

fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map_contains_nul(map),
        _ => false,
    }
}

fn map_contains_nul(map: &Metadata) -> bool {
    map.iter()
        .any(|(key, item)| key.contains('\0') || contains_nul(item))
}

/// Current UTC time truncated to microseconds.
///
/// Both backends keep microsecond precision at most, so values written and
/// read back compare equal.
pub fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    let micros = now.microsecond();
    now.replace_microsecond(micros).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn test_prepare_equivalent_inputs_share_fingerprint() {
        let a = PreparedDocument::prepare(br#"{"a":1,"b":2}"#, None, MAX).unwrap();
        let b = PreparedDocument::prepare(br#"{ "b": 2, "a": 1 }"#, None, MAX).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.raw, b.raw);
        assert_eq!(a.size(), 13);
        assert_eq!(b.size(), 18);
    }

    #[test]
    fn test_prepare_rejects_empty_null_and_malformed() {
        for raw in [&b""[..], b"null", b" null ", b"{not json"] {
            assert!(matches!(
                PreparedDocument::prepare(raw, None, MAX),
                Err(Error::InvalidDocument(_))
            ));
        }
    }

    #[test]
    fn test_prepare_rejects_nul_in_strings_and_keys() {
        for raw in [
            &br#"{"a":"\u0000"}"#[..],
            br#"["x\u0000y"]"#,
            br#"{"outer":{"k\u0000":1}}"#,
        ] {
            assert!(matches!(
                PreparedDocument::prepare(raw, None, MAX),
                Err(Error::InvalidDocument(_))
            ));
        }
        assert!(PreparedDocument::prepare(br#"{"a":"\\u0000"}"#, None, MAX).is_ok());

        let metadata: Metadata = serde_json::from_str(r#"{"src":"\u0000"}"#).unwrap();
        assert!(matches!(
            PreparedDocument::prepare(b"{}", Some(metadata), MAX),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_prepare_accepts_scalars_and_arrays() {
        for raw in [&b"1"[..], b"\"text\"", b"[]", b"{}", b"false"] {
            assert!(PreparedDocument::prepare(raw, None, MAX).is_ok());
        }
    }

    #[test]
    fn test_prepare_enforces_size_limit() {
        let raw = format!("[{}]", "1,".repeat(20) + "1");
        assert!(PreparedDocument::prepare(raw.as_bytes(), None, raw.len()).is_ok());
        assert!(matches!(
            PreparedDocument::prepare(raw.as_bytes(), None, raw.len() - 1),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_now_micros_has_no_sub_microsecond_part() {
        let now = now_micros();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }

    #[test]
    fn test_store_outcome_accessors() {
        let now = now_micros();
        let doc = Document {
            id: Uuid::new_v4(),
            content_hash: Fingerprint::compute(b"1").to_hex(),
            content: b"1".to_vec(),
            size: 1,
            created_at: now,
            updated_at: now,
            metadata: None,
        };
        let created = StoreOutcome::Created(doc.clone());
        let existing = StoreOutcome::Existing(doc.clone());
        assert!(created.is_new());
        assert!(!existing.is_new());
        assert_eq!(existing.into_document(), doc);
    }
}
