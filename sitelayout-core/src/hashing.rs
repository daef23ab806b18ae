//! Hashing System - SHA-256 for Layout Fingerprints
//!
//! Component UUIDs are fresh on every run, so the fingerprint hashes only the
//! structure: layouts, settings, regions, plugins and pinned revisions.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

use crate::model::Section;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(sort_value).collect())
        }
        _ => v.clone()
    }
}

/// Structural fingerprint of a section list, independent of component UUIDs.
pub fn layout_fingerprint(sections: &[Section]) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(sections)?;
    if let Value::Array(sections) = &mut value {
        for section in sections {
            let components = section
                .get_mut("components")
                .and_then(Value::as_array_mut);
            for component in components.into_iter().flatten() {
                if let Value::Object(component) = component {
                    component.remove("uuid");
                }
            }
        }
    }
    let canonical = canonical_json(&value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}
