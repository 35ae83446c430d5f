//! Identity record — the persisted player identity.
//!
//! Stored as one JSON object:
//! ```json
//! {"player_id":"1-2-3-4","name":"Guest 3F2","age":"29","gender":"F","country":"NZ"}
//! ```
//! `age`, `gender` and `country` are omitted until the first-run form has
//! been submitted. Fields this crate does not know about are carried in
//! [`IdentityRecord::extra`] so records written by the application survive a
//! load/save cycle untouched.
//!
//! Only `player_id` and `name` decide validity. An optional field holding a
//! non-string value is kept verbatim in `extra` and reads as unset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;

/// Optional string fields, read leniently.
const OPTIONAL_FIELDS: [&str; 3] = ["age", "gender", "country"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl IdentityRecord {
    pub fn new(player_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            age: None,
            gender: None,
            country: None,
            extra: BTreeMap::new(),
        }
    }

    /// Parse a stored value. Returns `None` for malformed JSON, a
    /// non-string `player_id` or `name`, or a record missing either.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = match serde_json::from_str::<serde_json::Map<String, Value>>(raw) {
            Ok(fields) => fields,
            Err(e) => {
                debug!("stored identity is malformed: {e}");
                return None;
            }
        };

        let mut stashed = BTreeMap::new();
        for key in OPTIONAL_FIELDS {
            let odd = fields.get(key).is_some_and(|v| !v.is_string() && !v.is_null());
            if odd {
                if let Some(value) = fields.remove(key) {
                    debug!(field = key, "non-string optional field kept as extra");
                    stashed.insert(key.to_string(), value);
                }
            }
        }

        match serde_json::from_value::<Self>(Value::Object(fields)) {
            Ok(mut record) if record.is_valid() => {
                record.extra.extend(stashed);
                Some(record)
            }
            Ok(_) => {
                debug!("stored identity lacks player_id or name");
                None
            }
            Err(e) => {
                debug!("stored identity is malformed: {e}");
                None
            }
        }
    }

    /// Both required fields are present and non-empty.
    pub fn is_valid(&self) -> bool {
        !self.player_id.is_empty() && !self.name.is_empty()
    }

    /// Serialise for storage. A set optional field replaces any raw value
    /// of the same name held in `extra`.
    pub fn to_json(&self) -> Result<String, AppError> {
        let set = [
            ("age", self.age.is_some()),
            ("gender", self.gender.is_some()),
            ("country", self.country.is_some()),
        ];
        let result = if set.iter().any(|(key, is_set)| *is_set && self.extra.contains_key(*key)) {
            let mut out = self.clone();
            for (key, is_set) in set {
                if is_set {
                    out.extra.remove(key);
                }
            }
            serde_json::to_string(&out)
        } else {
            serde_json::to_string(self)
        };
        result.map_err(|e| AppError::Identity(format!("cannot serialise identity: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_record() {
        let r = IdentityRecord::parse(r#"{"player_id":"a-b-c-d","name":"Guest 3F2"}"#).unwrap();
        assert_eq!(r, IdentityRecord::new("a-b-c-d", "Guest 3F2"));
    }

    #[test]
    fn rejects_missing_or_empty_required_fields() {
        assert!(IdentityRecord::parse(r#"{"name":"Guest 1"}"#).is_none());
        assert!(IdentityRecord::parse(r#"{"player_id":"x"}"#).is_none());
        assert!(IdentityRecord::parse(r#"{"player_id":"","name":"Guest 1"}"#).is_none());
        assert!(IdentityRecord::parse(r#"{"player_id":"x","name":""}"#).is_none());
    }

    #[test]
    fn rejects_malformed_values() {
        for raw in ["", "null", "42", "\"user\"", "[]", "{", "{\"player_id\":"] {
            assert!(IdentityRecord::parse(raw).is_none(), "accepted {raw:?}");
        }
    }

    #[test]
    fn rejects_non_string_required_fields() {
        assert!(IdentityRecord::parse(r#"{"player_id":123,"name":"Guest 1"}"#).is_none());
        assert!(IdentityRecord::parse(r#"{"player_id":"x","name":false}"#).is_none());
    }

    #[test]
    fn non_string_optional_field_keeps_identity() {
        let raw = r#"{"player_id":"a-b-c-d","name":"Guest 3F2","age":29,"country":["NZ"]}"#;
        let r = IdentityRecord::parse(raw).unwrap();
        assert_eq!(r.player_id, "a-b-c-d");
        assert_eq!(r.age, None);
        assert_eq!(r.country, None);
        assert_eq!(r.extra.get("age"), Some(&serde_json::json!(29)));

        let again: Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(again, serde_json::from_str::<Value>(raw).unwrap());
    }

    #[test]
    fn setting_optional_field_replaces_raw_value() {
        let mut r = IdentityRecord::parse(r#"{"player_id":"p","name":"n","age":29}"#).unwrap();
        r.age = Some("30".into());
        assert_eq!(r.to_json().unwrap(), r#"{"player_id":"p","name":"n","age":"30"}"#);
    }

    #[test]
    fn null_optional_fields_read_as_absent() {
        let r = IdentityRecord::parse(r#"{"player_id":"p","name":"n","age":null}"#).unwrap();
        assert_eq!(r.age, None);
    }

    #[test]
    fn absent_optional_fields_are_not_serialised() {
        let json = IdentityRecord::new("p", "n").to_json().unwrap();
        assert_eq!(json, r#"{"player_id":"p","name":"n"}"#);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{"player_id":"p","name":"n","country":"NZ","theme":"dark","wins":3}"#;
        let r = IdentityRecord::parse(raw).unwrap();
        assert_eq!(r.extra.get("theme"), Some(&serde_json::json!("dark")));
        let again = IdentityRecord::parse(&r.to_json().unwrap()).unwrap();
        assert_eq!(r, again);
    }
}
