//! Core types shared by the cache, the manager and transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Server-correlation identifier for a subscription.
///
/// Assigned by the transport when a request is first sent and reused for
/// every replay of the same subscription.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        SubscriptionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        SubscriptionId(s.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        SubscriptionId(s)
    }
}

// Type tags for the canonical encoding fed to the hasher.
const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_OBJECT: u8 = 6;

/// Identity key of a subscription (SHA-256 over name and parameters).
///
/// Two requests with the same name and equal parameters in the same order
/// share a fingerprint. Object keys are hashed in sorted order, so
/// `{"a":1,"b":2}` and `{"b":2,"a":1}` are the same parameter. Numbers are
/// compared by value: `1` and `1.0` are the same parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a subscription request.
    pub fn compute(name: &str, params: &[Value]) -> Self {
        let mut hasher = Sha256::new();
        feed_str(&mut hasher, name);
        hasher.update((params.len() as u64).to_be_bytes());
        for param in params {
            feed_value(&mut hasher, param);
        }
        Fingerprint(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Fingerprint(arr))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Length-prefixed so that adjacent strings cannot run together.
fn feed_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}

// 2^63 and 2^64: integral floats below these convert losslessly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// JSON has a single number type: `1`, `1.0` and `1e0` are the same value.
fn canonical_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) => {
            (f as i64).to_string()
        }
        Some(f) if f.fract() == 0.0 && (0.0..U64_BOUND).contains(&f) => (f as u64).to_string(),
        _ => n.to_string(),
    }
}

fn feed_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([TAG_NULL]),
        Value::Bool(false) => hasher.update([TAG_FALSE]),
        Value::Bool(true) => hasher.update([TAG_TRUE]),
        Value::Number(n) => {
            hasher.update([TAG_NUMBER]);
            feed_str(hasher, &canonical_number(n));
        }
        Value::String(s) => {
            hasher.update([TAG_STRING]);
            feed_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update([TAG_ARRAY]);
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                feed_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([TAG_OBJECT]);
            hasher.update((map.len() as u64).to_be_bytes());
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                feed_str(hasher, key);
                feed_value(hasher, item);
            }
        }
    }
}

/// Error payload carried by a server `nosub` acknowledgment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable error code. Numeric codes are kept as their decimal
    /// text; a missing code decodes as an empty string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number error code, got {}",
            other
        ))),
    }
}

impl ServerError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
            message: None,
            details: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.message {
            return write!(f, "{}", message);
        }
        match self.reason {
            Some(ref reason) => write!(f, "{} [{}]", reason, self.error),
            None => write!(f, "[{}]", self.error),
        }
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::compute("feed", &[json!(1), json!("x")]);
        let b = Fingerprint::compute("feed", &[json!(1), json!("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_param_order_matters() {
        let a = Fingerprint::compute("feed", &[json!(1), json!(2)]);
        let b = Fingerprint::compute("feed", &[json!(2), json!(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_name_matters() {
        let a = Fingerprint::compute("feed", &[json!(1)]);
        let b = Fingerprint::compute("posts", &[json!(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_no_boundary_ambiguity() {
        // Without length prefixes these would hash the same bytes.
        let a = Fingerprint::compute("ab", &[json!("c")]);
        let b = Fingerprint::compute("a", &[json!("bc")]);
        assert_ne!(a, b);

        let nested = Fingerprint::compute("feed", &[json!([1, 2])]);
        let flat = Fingerprint::compute("feed", &[json!(1), json!(2)]);
        assert_ne!(nested, flat);
    }

    #[test]
    fn test_fingerprint_object_key_order_ignored() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            Fingerprint::compute("feed", &[a]),
            Fingerprint::compute("feed", &[b])
        );
    }

    #[test]
    fn test_fingerprint_types_distinct() {
        let number = Fingerprint::compute("feed", &[json!(1)]);
        let string = Fingerprint::compute("feed", &[json!("1")]);
        let empty = Fingerprint::compute("feed", &[]);
        let null = Fingerprint::compute("feed", &[Value::Null]);
        assert_ne!(number, string);
        assert_ne!(empty, null);
    }

    #[test]
    fn test_fingerprint_integral_floats_match_integers() {
        assert_eq!(
            Fingerprint::compute("feed", &[json!(1)]),
            Fingerprint::compute("feed", &[json!(1.0)])
        );
        assert_eq!(
            Fingerprint::compute("feed", &[json!(-42)]),
            Fingerprint::compute("feed", &[json!(-42.0)])
        );
        assert_eq!(
            Fingerprint::compute("feed", &[json!(0)]),
            Fingerprint::compute("feed", &[json!(-0.0)])
        );
        let parsed: Value = serde_json::from_str("1e3").unwrap();
        assert_eq!(
            Fingerprint::compute("feed", &[json!(1000)]),
            Fingerprint::compute("feed", &[parsed])
        );
        assert_ne!(
            Fingerprint::compute("feed", &[json!(1)]),
            Fingerprint::compute("feed", &[json!(1.5)])
        );
    }

    #[test]
    fn test_fingerprint_hex() {
        let fp = Fingerprint::compute("feed", &[json!(1)]);
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex).unwrap(), fp);
        assert!(Fingerprint::from_hex("abcd").is_err());
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::new("404").with_reason("Subscription not found");
        assert_eq!(err.to_string(), "Subscription not found [404]");

        let parsed: ServerError =
            serde_json::from_str(r#"{"error":"403","message":"Access denied [403]"}"#).unwrap();
        assert_eq!(parsed.to_string(), "Access denied [403]");
        assert!(parsed.reason.is_none());

        let numeric: ServerError =
            serde_json::from_str(r#"{"error":404,"reason":"Not found"}"#).unwrap();
        assert_eq!(numeric.error, "404");

        let uncoded: ServerError =
            serde_json::from_str(r#"{"reason":"Subscription stopped by server"}"#).unwrap();
        assert_eq!(uncoded.error, "");
        assert_eq!(uncoded.reason.as_deref(), Some("Subscription stopped by server"));
    }
}
