// File: pecosa-sync/src/mirror.rs
// Purpose: Client-held copy of a backend table, mutated through explicit operations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::change_tracker::{ChangeAction, ChangeEvent};
use crate::record::{Record, RecordKey};

/// Sort direction for `order_by`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Sort key applied after every insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// A reducer transition on the mirror list
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOp<R> {
    Insert(R),
    Update(R),
    Delete(RecordKey),
}

impl<R: Record> MirrorOp<R> {
    /// Translate a feed event into an operation.
    ///
    /// Returns `None` when the payload cannot be decoded into `R` or the
    /// delete does not identify a row.
    pub fn from_event(event: &ChangeEvent) -> Option<Self> {
        match event.action {
            ChangeAction::Insert => decode::<R>(event.record.as_ref()?).map(MirrorOp::Insert),
            ChangeAction::Update => decode::<R>(event.record.as_ref()?).map(MirrorOp::Update),
            ChangeAction::Delete => {
                let key = event
                    .old_record
                    .as_ref()
                    .and_then(|old| old.get("id"))
                    .and_then(RecordKey::from_value)
                    .unwrap_or_else(|| RecordKey::parse(&event.record_id));
                Some(MirrorOp::Delete(key))
            }
        }
    }
}

fn decode<R: Record>(row: &Value) -> Option<R> {
    match serde_json::from_value(row.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Dropping change event with undecodable row: {}", e);
            None
        }
    }
}

/// Ordered list of mirrored rows with unique primary keys
#[derive(Debug, Clone)]
pub struct MirrorList<R> {
    items: Vec<R>,
    sort: Option<SortSpec>,
}

impl<R: Record> MirrorList<R> {
    /// Build a mirror from an initial list. Duplicate keys keep their first occurrence.
    pub fn new(initial: Vec<R>, sort: Option<SortSpec>) -> Self {
        let mut list = Self {
            items: Vec::with_capacity(initial.len()),
            sort,
        };
        list.replace(initial);
        list
    }

    /// Replace the whole content, as the owner's direct setter does
    pub fn replace(&mut self, rows: Vec<R>) {
        self.items.clear();
        for row in rows {
            let duplicate = match row.key() {
                Some(key) => self.position(&key).is_some(),
                None => false,
            };
            if !duplicate {
                self.items.push(row);
            }
        }
    }

    /// Apply one transition. Returns whether the list changed.
    pub fn apply(&mut self, op: MirrorOp<R>) -> bool {
        match op {
            MirrorOp::Insert(row) => {
                if let Some(key) = row.key() {
                    if let Some(index) = self.position(&key) {
                        self.items.remove(index);
                    }
                }
                self.items.insert(0, row);
                self.resort();
                true
            }
            MirrorOp::Update(row) => {
                let Some(key) = row.key() else {
                    return false;
                };
                match self.position(&key) {
                    Some(index) => {
                        self.items[index] = row;
                        true
                    }
                    None => false,
                }
            }
            MirrorOp::Delete(key) => match self.position(&key) {
                Some(index) => {
                    self.items.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    fn position(&self, key: &RecordKey) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.key().as_ref() == Some(key))
    }

    fn resort(&mut self) {
        let Some(spec) = &self.sort else {
            return;
        };
        let column = spec.column.as_str();
        let direction = spec.direction;
        self.items.sort_by(|a, b| {
            let ordering = compare_columns(a.column(column).as_ref(), b.column(column).as_ref());
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// The first `limit` rows, without touching the mirror
    pub fn view(&self, limit: Option<usize>) -> Vec<R> {
        match limit {
            Some(limit) => self.items.iter().take(limit).cloned().collect(),
            None => self.items.clone(),
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&R> {
        self.position(key).map(|index| &self.items[index])
    }
}

/// Total order over JSON column values: missing < null < bool < number < string < other.
/// Timestamps are ISO-8601 strings, so they sort chronologically as text.
pub fn compare_columns(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 5 && rank(b) == 5 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ids(list: &MirrorList<Value>) -> Vec<i64> {
        list.items()
            .iter()
            .map(|row| row["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_insert_prepends_without_sort() {
        let mut list = MirrorList::new(vec![json!({"id": 1})], None);
        list.apply(MirrorOp::Insert(json!({"id": 2})));
        assert_eq!(ids(&list), vec![2, 1]);
    }

    #[test]
    fn test_insert_existing_key_replaces() {
        let mut list = MirrorList::new(vec![json!({"id": 1, "v": "a"}), json!({"id": 2})], None);
        list.apply(MirrorOp::Insert(json!({"id": 1, "v": "b"})));
        assert_eq!(ids(&list), vec![1, 2]);
        assert_eq!(list.get(&RecordKey::Int(1)).unwrap()["v"], json!("b"));
    }

    #[test]
    fn test_insert_resorts() {
        let sort = SortSpec::new("price", SortDirection::Asc);
        let mut list = MirrorList::new(vec![json!({"id": 1, "price": 10}), json!({"id": 2, "price": 30})], Some(sort));
        list.apply(MirrorOp::Insert(json!({"id": 3, "price": 20})));
        assert_eq!(ids(&list), vec![1, 3, 2]);
    }

    #[test]
    fn test_update_in_place_and_unknown_key_ignored() {
        let mut list = MirrorList::new(vec![json!({"id": 1, "status": "pendiente"}), json!({"id": 2})], None);
        assert!(list.apply(MirrorOp::Update(json!({"id": 1, "status": "listo"}))));
        assert_eq!(ids(&list), vec![1, 2]);
        assert_eq!(list.items()[0]["status"], json!("listo"));

        assert!(!list.apply(MirrorOp::Update(json!({"id": 9}))));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_delete() {
        let mut list = MirrorList::new(vec![json!({"id": 1}), json!({"id": 2})], None);
        assert!(list.apply(MirrorOp::Delete(RecordKey::Int(1))));
        assert!(!list.apply(MirrorOp::Delete(RecordKey::Int(1))));
        assert_eq!(ids(&list), vec![2]);
    }

    #[test]
    fn test_view_caps_without_mutating() {
        let list = MirrorList::new((1..=5).map(|id| json!({"id": id})).collect(), None);
        assert_eq!(list.view(Some(2)).len(), 2);
        assert_eq!(list.view(Some(10)).len(), 5);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_initial_duplicates_dropped() {
        let list = MirrorList::new(vec![json!({"id": 1, "v": 1}), json!({"id": 1, "v": 2})], None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0]["v"], json!(1));
    }

    #[test]
    fn test_compare_columns_mixed_types() {
        assert_eq!(compare_columns(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_columns(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(
            compare_columns(Some(&json!("2024-01-02T00:00:00Z")), Some(&json!("2024-01-01T00:00:00Z"))),
            Ordering::Greater
        );
        assert_eq!(compare_columns(Some(&json!(null)), Some(&json!(false))), Ordering::Less);
    }

    #[test]
    fn test_delete_event_key_from_record_id() {
        let event = ChangeEvent {
            id: 1,
            table: "products".to_string(),
            record_id: "5".to_string(),
            action: ChangeAction::Delete,
            record: None,
            old_record: None,
            version: 3,
            client_id: None,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            MirrorOp::<Value>::from_event(&event),
            Some(MirrorOp::Delete(RecordKey::Int(5)))
        );
    }
}
