// File: src/commands/queue.rs
// Purpose: Inspect and feed the offline change queue

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use pecosa_sync::{ChangeAction, PendingChange, SyncQueue};
use serde_json::Value;

use crate::context::Context;
use crate::GlobalArgs;

pub async fn add(
    args: &GlobalArgs,
    table: &str,
    action: &str,
    id: Option<String>,
    data: Option<&str>,
    base_version: Option<i64>,
) -> Result<()> {
    let change = build_change(table, action, id, data, base_version)?;
    let ctx = Context::open(args).await?;
    ctx.queue.enqueue(change.clone()).await;

    println!(
        "{} {} en {} encolado ({} pendientes)",
        "✓".green(),
        change.action,
        change.table.cyan(),
        ctx.queue.len().await
    );
    Ok(())
}

pub async fn list(args: &GlobalArgs) -> Result<()> {
    let ctx = Context::open(args).await?;
    for line in describe_queue(&ctx.queue).await {
        println!("{}", line);
    }
    Ok(())
}

pub async fn clear(args: &GlobalArgs) -> Result<()> {
    let ctx = Context::open(args).await?;
    let dropped = ctx.queue.len().await;
    ctx.queue.clear().await;
    println!("{} {} cambios descartados", "✓".green(), dropped);
    Ok(())
}

fn build_change(
    table: &str,
    action: &str,
    id: Option<String>,
    data: Option<&str>,
    base_version: Option<i64>,
) -> Result<PendingChange> {
    let action: ChangeAction = action.parse()?;
    let data = data
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--data debe ser JSON válido")?;

    match action {
        ChangeAction::Insert if data.is_none() => bail!("insert requiere --data"),
        ChangeAction::Update if id.is_none() || data.is_none() => bail!("update requiere --id y --data"),
        ChangeAction::Delete if id.is_none() => bail!("delete requiere --id"),
        _ => {}
    }

    let change = PendingChange::new(table, id, action, data);
    Ok(match base_version {
        Some(version) => change.with_base_version(version),
        None => change,
    })
}

async fn describe_queue(queue: &SyncQueue) -> Vec<String> {
    let pending = queue.pending().await;
    if pending.is_empty() {
        return vec!["No hay cambios pendientes".to_string()];
    }
    pending
        .iter()
        .map(|change| {
            format!(
                "{} {} {} {} {}",
                change.queued_at.format("%Y-%m-%d %H:%M:%S"),
                change.table,
                change.action,
                change.record_id.as_deref().unwrap_or("-"),
                change.data.as_ref().map(Value::to_string).unwrap_or_default()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pecosa_sync::{LocalStorage, StorageBackend};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_build_change() {
        let change = build_change("orders", "update", Some("4".into()), Some(r#"{"status":"listo"}"#), Some(7)).unwrap();
        assert_eq!(change.action, ChangeAction::Update);
        assert_eq!(change.record_id.as_deref(), Some("4"));
        assert_eq!(change.data, Some(json!({ "status": "listo" })));
        assert_eq!(change.base_version, Some(7));
    }

    #[test]
    fn test_build_change_rejects_incomplete_input() {
        assert!(build_change("orders", "upsert", None, None, None).is_err());
        assert!(build_change("orders", "insert", None, Some("{oops"), None).is_err());
        assert!(build_change("orders", "insert", None, None, None).is_err());
        assert!(build_change("orders", "delete", None, None, None).is_err());
        assert!(build_change("orders", "delete", Some("4".into()), None, None).is_ok());
    }

    #[tokio::test]
    async fn test_describe_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = StorageBackend::Filesystem {
            path: dir.path().to_path_buf(),
        }
        .build()
        .await
        .unwrap();
        let queue = SyncQueue::new(LocalStorage::new(store));
        assert_eq!(describe_queue(&queue).await, vec!["No hay cambios pendientes"]);

        queue
            .enqueue(build_change("customers", "insert", None, Some(r#"{"name":"Lupita"}"#), None).unwrap())
            .await;
        let lines = describe_queue(&queue).await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(r#"customers insert - {"name":"Lupita"}"#), "{}", lines[0]);
    }
}
