// File: src/commands/sync.rs
// Purpose: Manual sync and the connectivity monitor

use anyhow::{bail, Result};
use colored::Colorize;
use pecosa_sync::{spawn_auto_sync, spawn_probe, ConnectionMonitor, QueueSyncService, SyncService};
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::GlobalArgs;

pub async fn run(args: &GlobalArgs) -> Result<()> {
    let ctx = Context::open(args).await?;
    let service = QueueSyncService::new(ctx.queue.clone(), ctx.client.clone());
    let outcome = service.sync_all().await;

    if !outcome.success {
        bail!(outcome.message);
    }
    println!("{} {}", "✓".green(), outcome.message);
    Ok(())
}

pub async fn monitor(args: &GlobalArgs, interval: u64) -> Result<()> {
    let ctx = Context::open(args).await?;
    let monitor = ConnectionMonitor::new(None);
    let mut status = monitor.subscribe();

    let service: Arc<dyn SyncService> = Arc::new(QueueSyncService::new(ctx.queue.clone(), ctx.client.clone()));
    let probe = spawn_probe(
        monitor.clone(),
        Arc::new(ctx.client.clone()),
        Duration::from_secs(interval.max(1)),
    );
    let auto_sync = spawn_auto_sync(monitor.clone(), service);

    println!("{} {} (Ctrl+C para salir)", "Vigilando".bold(), ctx.client.base_url());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.is_online {
                    println!("{} En línea ({} pendientes)", "●".green(), ctx.queue.len().await);
                } else {
                    println!("{} Sin conexión, los cambios se guardan localmente", "●".red());
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    probe.abort();
    auto_sync.abort();
    Ok(())
}
