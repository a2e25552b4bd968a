//! Content canonicalization applied before hashing
//!
//! Every transform here is pure and idempotent: normalizing already
//! normalized content returns it unchanged.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static VOLATILE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\s(?:nonce|integrity|data-(?:timestamp|time|generated|build|nonce|request-id|csrf))\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .expect("valid attribute regex")
});

static VOLATILE_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta\s[^>]*(?:name|property)\s*=\s*["']?(?:csrf-token|csrf-param|generated|build-time|date|request-id)["']?[^>]*>"#,
    )
    .expect("valid meta regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s<").expect("valid tag gap regex"));

/// True when the content type denotes HTML or XML markup
pub fn is_markup(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        })
        .unwrap_or(false)
}

/// Canonicalize markup: drop comments and volatile attributes/meta tags,
/// collapse insignificant whitespace.
pub fn normalize_markup(markup: &str) -> String {
    let without_comments = COMMENT.replace_all(markup, "");
    let without_meta = VOLATILE_META.replace_all(&without_comments, "");
    let without_attributes = VOLATILE_ATTRIBUTE.replace_all(&without_meta, "");
    let collapsed = WHITESPACE.replace_all(&without_attributes, " ");
    BETWEEN_TAGS
        .replace_all(&collapsed, "><")
        .trim()
        .to_string()
}

/// Collapse every run of whitespace into a single space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize raw fetched content according to its content type
pub fn normalize_content(content_type: Option<&str>, body: &str) -> String {
    if is_markup(content_type) {
        normalize_markup(body)
    } else {
        collapse_whitespace(body)
    }
}

/// Hex-encoded SHA-256 digest of the given text
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>()
}

/// Normalize then hash, the fingerprint of raw page content
pub fn fingerprint(content_type: Option<&str>, body: &str) -> String {
    hash_content(&normalize_content(content_type, body))
}

/// Serialize JSON with object keys sorted at every level
pub fn canonical_json(value: &serde_json::Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, serde_json::Value> =
                map.iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}
