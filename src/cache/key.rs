// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deterministic cache keys.
//!
//! Parameters are serialized to JSON, object keys are sorted recursively,
//! and the canonical text is hashed with SHA-256. The first 16 hex chars of
//! the digest are appended to the prefix: `report:sales:9f2c4e1a0b7d3e55`.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Hex chars of the digest kept in the key
pub const DIGEST_LEN: usize = 16;

/// Derive `"{prefix}:{digest}"` from any serializable parameter set.
///
/// Identical parameters always produce the same key, whatever order their
/// attributes were inserted in.
pub fn derive_key<P: Serialize + ?Sized>(prefix: &str, params: &P) -> String {
    let value = serde_json::to_value(params).unwrap_or_else(|e| {
        warn!(prefix, error = %e, "Cache key parameters not serializable, hashing null");
        Value::Null
    });

    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);

    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{}:{}", prefix, &digest[..DIGEST_LEN])
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_shape() {
        let key = derive_key("report:sales", &json!({"period": "week"}));
        let (prefix, digest) = key.rsplit_once(':').unwrap();
        assert_eq!(prefix, "report:sales");
        assert_eq!(digest.len(), DIGEST_LEN);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_order_independent() {
        let mut a = serde_json::Map::new();
        a.insert("period".into(), json!("week"));
        a.insert("filters".into(), json!({"status": "COMPLETED", "customer_id": 4}));

        let mut b = serde_json::Map::new();
        b.insert("filters".into(), json!({"customer_id": 4, "status": "COMPLETED"}));
        b.insert("period".into(), json!("week"));

        assert_eq!(derive_key("report:sales", &a), derive_key("report:sales", &b));
    }

    #[test]
    fn test_distinct_params_distinct_keys() {
        let week = derive_key("report:sales", &json!({"period": "week"}));
        let month = derive_key("report:sales", &json!({"period": "month"}));
        let other_prefix = derive_key("report:products", &json!({"period": "week"}));
        assert_ne!(week, month);
        assert_ne!(week, other_prefix);
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(derive_key("k", &json!([1, 2])), derive_key("k", &json!([2, 1])));
    }
}
