// File: pecosa-sync/src/record.rs
// Purpose: Record trait for rows mirrored from backend tables

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Primary key of a mirrored row: numeric ids or UUID/text ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Read a key out of a JSON value. Numeric strings stay text so that
    /// `"42"` and `42` are different keys, as they are in the database.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordKey::Int),
            Value::String(s) if !s.is_empty() => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Parse the string form used in the change log (`record_id` column)
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(RecordKey::Int)
            .unwrap_or_else(|_| RecordKey::Text(raw.to_string()))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(id) => write!(f, "{}", id),
            RecordKey::Text(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Int(id)
    }
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Text(id.to_string())
    }
}

/// A row that can be held in a mirror list.
///
/// Implementors only need to expose their primary key; column lookup for
/// sorting and filtering goes through the serde representation.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Primary key, or `None` for rows that cannot be identified
    fn key(&self) -> Option<RecordKey>;

    /// Value of a column, used for `order_by` and equality filters
    fn column(&self, name: &str) -> Option<Value> {
        serde_json::to_value(self).ok()?.get(name).cloned()
    }
}

impl Record for Value {
    fn key(&self) -> Option<RecordKey> {
        self.get("id").and_then(RecordKey::from_value)
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Product {
        id: i64,
        name: String,
        price: f64,
    }

    impl Record for Product {
        fn key(&self) -> Option<RecordKey> {
            Some(RecordKey::Int(self.id))
        }
    }

    #[test]
    fn test_value_key() {
        assert_eq!(json!({"id": 7}).key(), Some(RecordKey::Int(7)));
        assert_eq!(
            json!({"id": "3f2a"}).key(),
            Some(RecordKey::Text("3f2a".to_string()))
        );
        assert_eq!(json!({"name": "x"}).key(), None);
        assert_eq!(json!({"id": ""}).key(), None);
    }

    #[test]
    fn test_typed_record_column() {
        let product = Product {
            id: 1,
            name: "Taco".to_string(),
            price: 25.5,
        };
        assert_eq!(product.column("name"), Some(json!("Taco")));
        assert_eq!(product.column("missing"), None);
    }

    #[test]
    fn test_parse_record_id() {
        assert_eq!(RecordKey::parse("12"), RecordKey::Int(12));
        assert_eq!(RecordKey::parse("a-b"), RecordKey::Text("a-b".to_string()));
        assert_eq!(RecordKey::Int(12).to_string(), "12");
    }
}
