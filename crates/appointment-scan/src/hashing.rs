//! Canonical hashing of check outcomes for change detection.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::watch_types::{CheckStatus, Evidence, Slot};

/// The part of a check result that participates in change detection.
///
/// `checked_at` and `error` are deliberately absent: the same page seen at two
/// different instants must hash identically.
#[derive(Debug, Serialize)]
pub struct HashPayload<'a> {
    /// Classification of the page
    pub status: CheckStatus,
    /// Normalized slots
    pub slots: &'a [Slot],
    /// Evidence bag
    pub evidence: &'a Evidence,
}

/// Compact JSON with every object's keys sorted.
///
/// Going through `serde_json::Value` sorts keys at every depth, since its map
/// type is ordered.
pub fn stable_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

/// SHA-256 hex digest of the stable JSON encoding of `value`.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let content = stable_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of `{status, slots, evidence}`. Callers pass normalized slots.
pub fn hash_result(
    status: CheckStatus,
    slots: &[Slot],
    evidence: &Evidence,
) -> Result<String, serde_json::Error> {
    hash_json(&HashPayload {
        status,
        slots,
        evidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch_types::normalize_slots;

    #[test]
    fn test_hash_normalization_order_independent() {
        let slots_a = vec![
            Slot::new("2024-10-01", "09:30"),
            Slot::new("2024-10-01", "10:15"),
            Slot::new("2024-10-02", "08:00"),
        ];
        let mut slots_b = slots_a.clone();
        slots_b.reverse();
        let slots_c = vec![slots_a[1].clone(), slots_a[2].clone(), slots_a[0].clone()];

        let evidence = Evidence::new();
        let hash_a = hash_result(CheckStatus::Available, &normalize_slots(slots_a), &evidence).unwrap();
        let hash_b = hash_result(CheckStatus::Available, &normalize_slots(slots_b), &evidence).unwrap();
        let hash_c = hash_result(CheckStatus::Available, &normalize_slots(slots_c), &evidence).unwrap();

        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a, hash_c);
    }

    #[test]
    fn test_hash_ignores_key_insertion_order() {
        let first = serde_json::json!({"b": 1, "a": {"y": true, "x": "v"}});
        let second = serde_json::json!({"a": {"x": "v", "y": true}, "b": 1});

        assert_eq!(hash_json(&first).unwrap(), hash_json(&second).unwrap());
        assert_eq!(stable_json(&first).unwrap(), r#"{"a":{"x":"v","y":true},"b":1}"#);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let slots = vec![Slot::new("2024-10-01", "09:30")];
        let mut evidence = Evidence::new();
        evidence.insert("url".to_string(), "http://example.com".into());

        let available = hash_result(CheckStatus::Available, &slots, &evidence).unwrap();
        let unavailable = hash_result(CheckStatus::Unavailable, &slots, &evidence).unwrap();
        let no_slots = hash_result(CheckStatus::Available, &[], &evidence).unwrap();

        assert_ne!(available, unavailable);
        assert_ne!(available, no_slots);
        assert_eq!(available.len(), 64);
    }

    #[test]
    fn test_payload_layout() {
        let slots = vec![Slot::new("2024-10-01", "09:30")];
        let evidence = Evidence::new();
        let payload = HashPayload {
            status: CheckStatus::Available,
            slots: &slots,
            evidence: &evidence,
        };

        assert_eq!(
            stable_json(&payload).unwrap(),
            r#"{"evidence":{},"slots":[{"date":"2024-10-01","time":"09:30"}],"status":"available"}"#
        );
    }
}
