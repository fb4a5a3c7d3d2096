// File: pecosa-sync/src/filter.rs
// Purpose: Single-column equality filter for change feed subscriptions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change_tracker::{ChangeAction, ChangeEvent};

/// `column == value` filter, the only filter shape a subscription supports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqFilter {
    pub column: String,
    pub value: Value,
}

impl EqFilter {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Parse the `column=value` form used on the command line and in query strings.
    /// Values that parse as JSON (numbers, booleans) keep their type.
    pub fn parse(raw: &str) -> Option<Self> {
        let (column, value) = raw.split_once('=')?;
        if column.is_empty() {
            return None;
        }
        let value = serde_json::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(value.to_string()));
        Some(Self::new(column, value))
    }

    /// Whether a row passes the filter
    pub fn matches_row(&self, row: &Value) -> bool {
        row.get(&self.column).map_or(false, |v| loosely_equal(v, &self.value))
    }

    /// Whether a change event passes the filter.
    ///
    /// Deletes often carry only the primary key in `old_record`; when the
    /// filter column is absent the event passes, and removing a key the
    /// mirror never held is a no-op.
    pub fn matches_event(&self, event: &ChangeEvent) -> bool {
        match event.action {
            ChangeAction::Insert | ChangeAction::Update => event
                .record
                .as_ref()
                .map_or(false, |row| self.matches_row(row)),
            ChangeAction::Delete => match &event.old_record {
                Some(row) if row.get(&self.column).is_some() => self.matches_row(row),
                _ => true,
            },
        }
    }
}

// Query-string filters arrive as text, so "3" must match the number 3
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), other) | (other, Value::String(s)) if !other.is_string() => {
            s == &other.to_string()
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn event(action: ChangeAction, record: Option<Value>, old: Option<Value>) -> ChangeEvent {
        ChangeEvent {
            id: 1,
            table: "orders".to_string(),
            record_id: "1".to_string(),
            action,
            record,
            old_record: old,
            version: 1,
            client_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(EqFilter::parse("status=listo"), Some(EqFilter::new("status", "listo")));
        assert_eq!(EqFilter::parse("category_id=3"), Some(EqFilter::new("category_id", 3)));
        assert_eq!(EqFilter::parse("=3"), None);
        assert_eq!(EqFilter::parse("status"), None);
    }

    #[test]
    fn test_matches_insert_and_update() {
        let filter = EqFilter::new("status", "pendiente");
        assert!(filter.matches_event(&event(
            ChangeAction::Insert,
            Some(json!({"id": 1, "status": "pendiente"})),
            None
        )));
        assert!(!filter.matches_event(&event(
            ChangeAction::Update,
            Some(json!({"id": 1, "status": "listo"})),
            None
        )));
    }

    #[test]
    fn test_delete_without_column_passes() {
        let filter = EqFilter::new("status", "pendiente");
        assert!(filter.matches_event(&event(ChangeAction::Delete, None, Some(json!({"id": 1})))));
        assert!(!filter.matches_event(&event(
            ChangeAction::Delete,
            None,
            Some(json!({"id": 1, "status": "listo"}))
        )));
    }

    #[test]
    fn test_text_filter_matches_number_column() {
        let filter = EqFilter::new("category_id", "3");
        assert!(filter.matches_row(&json!({"category_id": 3})));
        assert!(!filter.matches_row(&json!({"category_id": 4})));
    }
}
