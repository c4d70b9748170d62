//! Tenant-isolation scan over response bodies.
//!
//! A successful JSON response is scanned when its top-level object, or any
//! element of a top-level array, carries a `tenant_id` field. The scan then
//! visits every nested object and array and stops at the first `tenant_id`
//! that differs from the session's tenant. Bodies that are not JSON are exempt.
//!
//! # Depth guard
//!
//! The walk refuses to descend past `max_depth` levels and reports
//! [`SecurityError::ScanDepthExceeded`] instead of risking stack exhaustion.

use crate::error::SecurityError;
use crate::protocol::constants::TENANT_FIELD;
use serde_json::{Map, Value};

/// Shape of a JSON value as seen by the scan.
#[derive(Debug, Clone, Copy)]
pub enum JsonNode<'a> {
    /// An object with named members.
    Object(&'a Map<String, Value>),
    /// An array of values.
    Array(&'a [Value]),
    /// A string, number, boolean or null.
    Scalar(&'a Value),
}

impl<'a> From<&'a Value> for JsonNode<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => JsonNode::Object(map),
            Value::Array(items) => JsonNode::Array(items),
            scalar => JsonNode::Scalar(scalar),
        }
    }
}

/// Scanner bound to one expected tenant.
///
/// # Examples
///
/// ```
/// use resilient_client::client::TenantScan;
/// use serde_json::json;
///
/// let scan = TenantScan::new("A", 64);
/// assert!(scan.verify(&json!([{"tenant_id": "A"}, {"tenant_id": "A"}])).is_ok());
/// assert!(scan.verify(&json!([{"tenant_id": "A"}, {"tenant_id": "B"}])).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TenantScan<'a> {
    expected: &'a str,
    max_depth: usize,
}

impl<'a> TenantScan<'a> {
    /// Create a scanner expecting `tenant`.
    pub fn new(expected: &'a str, max_depth: usize) -> Self {
        TenantScan { expected, max_depth }
    }

    /// Scan a raw body. Non-JSON bodies pass.
    pub fn verify_body(&self, body: &[u8]) -> Result<(), SecurityError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.verify(&value),
            Err(_) => Ok(()),
        }
    }

    /// Scan a parsed value.
    pub fn verify(&self, value: &Value) -> Result<(), SecurityError> {
        if !carries_tenant(value) {
            return Ok(());
        }
        let mut path = String::new();
        self.visit(value.into(), 0, &mut path)
    }

    fn visit(&self, node: JsonNode<'_>, depth: usize, path: &mut String) -> Result<(), SecurityError> {
        if depth > self.max_depth {
            return Err(SecurityError::ScanDepthExceeded {
                limit: self.max_depth,
            });
        }

        match node {
            JsonNode::Object(map) => {
                for (key, child) in map {
                    let mark = path.len();
                    path.push('/');
                    push_pointer_token(path, key);

                    if key == TENANT_FIELD {
                        self.check(child, path)?;
                    }
                    self.visit(child.into(), depth + 1, path)?;
                    path.truncate(mark);
                }
                Ok(())
            }
            JsonNode::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    let mark = path.len();
                    path.push('/');
                    path.push_str(&index.to_string());
                    self.visit(child.into(), depth + 1, path)?;
                    path.truncate(mark);
                }
                Ok(())
            }
            JsonNode::Scalar(_) => Ok(()),
        }
    }

    fn check(&self, tenant: &Value, path: &str) -> Result<(), SecurityError> {
        let found = match tenant {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if found == self.expected {
            return Ok(());
        }
        Err(SecurityError::TenantMismatch {
            expected: self.expected.to_string(),
            found,
            path: path.to_string(),
        })
    }
}

fn carries_tenant(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key(TENANT_FIELD),
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_object().map_or(false, |map| map.contains_key(TENANT_FIELD))),
        _ => false,
    }
}

// RFC 6901 escaping.
fn push_pointer_token(path: &mut String, key: &str) {
    for ch in key.chars() {
        match ch {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            other => path.push(other),
        }
    }
}
