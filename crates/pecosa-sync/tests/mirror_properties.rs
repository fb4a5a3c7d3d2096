use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use futures::stream;
use pecosa_sync::feed::from_changes;
use pecosa_sync::mirror::compare_columns;
use pecosa_sync::{
    ChangeAction, ChangeEvent, MirrorList, MirrorOp, Record, RecordKey, SortDirection, SortSpec,
    Subscription, SubscriptionOptions,
};
use serde_json::{json, Value};

/// Small deterministic generator so every run replays the same sequences
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_ops(seed: u64, len: usize) -> Vec<MirrorOp<Value>> {
    let mut rng = Lcg(seed);
    (0..len)
        .map(|step| {
            let id = rng.below(8) as i64 + 1;
            let row = json!({"id": id, "price": rng.below(50), "step": step});
            match rng.below(3) {
                0 => MirrorOp::Insert(row),
                1 => MirrorOp::Update(row),
                _ => MirrorOp::Delete(RecordKey::Int(id)),
            }
        })
        .collect()
}

/// Reference semantics: a map from key to the latest row
fn model(ops: &[MirrorOp<Value>]) -> BTreeMap<i64, Value> {
    let mut rows = BTreeMap::new();
    for op in ops {
        match op {
            MirrorOp::Insert(row) => {
                rows.insert(row["id"].as_i64().unwrap(), row.clone());
            }
            MirrorOp::Update(row) => {
                let id = row["id"].as_i64().unwrap();
                if rows.contains_key(&id) {
                    rows.insert(id, row.clone());
                }
            }
            MirrorOp::Delete(RecordKey::Int(id)) => {
                rows.remove(id);
            }
            MirrorOp::Delete(_) => {}
        }
    }
    rows
}

fn as_map(rows: &[Value]) -> BTreeMap<i64, Value> {
    rows.iter()
        .map(|row| (row["id"].as_i64().unwrap(), row.clone()))
        .collect()
}

#[test]
fn mirror_holds_latest_row_per_key() {
    for seed in 0..50 {
        let ops = random_ops(seed, 60);
        let mut list = MirrorList::new(Vec::new(), None);
        for op in ops.clone() {
            list.apply(op);
        }

        let keys: Vec<i64> = list.items().iter().map(|r| r["id"].as_i64().unwrap()).collect();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(keys.len(), unique.len(), "duplicate keys for seed {}", seed);

        assert_eq!(as_map(list.items()), model(&ops), "seed {}", seed);
    }
}

#[test]
fn mirror_sorted_after_every_insert() {
    for seed in 0..50 {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let mut list = MirrorList::new(Vec::new(), Some(SortSpec::new("price", direction)));
            for op in random_ops(seed, 40) {
                let is_insert = matches!(op, MirrorOp::Insert(_));
                list.apply(op);
                if !is_insert {
                    continue;
                }
                let sorted = list.items().windows(2).all(|pair| {
                    let ordering = compare_columns(pair[0].get("price"), pair[1].get("price"));
                    match direction {
                        SortDirection::Asc => ordering.is_le(),
                        SortDirection::Desc => ordering.is_ge(),
                    }
                });
                assert!(sorted, "unsorted after insert, seed {}", seed);
            }
        }
    }
}

#[test]
fn limit_never_exceeds_cap() {
    let list = MirrorList::new((1..=20).map(|id| json!({"id": id})).collect(), None);
    for cap in [0usize, 1, 5, 20, 50] {
        assert!(list.view(Some(cap)).len() <= cap);
    }
    assert_eq!(list.len(), 20);
}

fn event(version: i64, op: &MirrorOp<Value>) -> ChangeEvent {
    let (action, record, old_record, record_id) = match op {
        MirrorOp::Insert(row) => (ChangeAction::Insert, Some(row.clone()), None, row["id"].to_string()),
        MirrorOp::Update(row) => (ChangeAction::Update, Some(row.clone()), None, row["id"].to_string()),
        MirrorOp::Delete(key) => (ChangeAction::Delete, None, Some(json!({"id": key})), key.to_string()),
    };
    ChangeEvent {
        id: version,
        table: "products".to_string(),
        record_id,
        action,
        record,
        old_record,
        version,
        client_id: None,
        created_at: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn subscription_converges_to_model() {
    let ops = random_ops(7, 80);
    let events: Vec<ChangeEvent> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| event(i as i64 + 1, op))
        .collect();

    let mut sub = Subscription::<Value>::open(
        "products",
        Vec::new(),
        from_changes(stream::iter(events)),
        SubscriptionOptions::new()
            .order_by("price", SortDirection::Asc)
            .limit(3)
            .debounce(Duration::from_millis(100)),
    );

    let expected = model(&ops);
    // The feed ends after the last event, which forces a final publish
    loop {
        let state = sub.snapshot();
        if !state.is_loading && state.last_updated.is_some() && state.data.len() == expected.len().min(3) {
            break;
        }
        assert!(sub.changed().await, "subscription task ended early");
    }

    let state = sub.snapshot();
    assert!(state.data.len() <= 3);
    for row in &state.data {
        let key = row.key().unwrap();
        let RecordKey::Int(id) = key else {
            panic!("unexpected key {:?}", key)
        };
        assert_eq!(Some(row), expected.get(&id));
    }
}
