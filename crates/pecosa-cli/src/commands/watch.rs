// File: src/commands/watch.rs
// Purpose: Follow a table live through a mirror subscription

use anyhow::{anyhow, Result};
use colored::Colorize;
use pecosa_sync::{EqFilter, Record, SortDirection, Subscription, SubscriptionOptions, SubscriptionState};
use serde_json::Value;
use std::time::Duration;

use crate::context::Context;
use crate::GlobalArgs;

pub struct WatchOptions {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub desc: bool,
    pub limit: Option<usize>,
    pub interval: u64,
}

impl WatchOptions {
    fn parsed_filter(&self) -> Result<Option<EqFilter>> {
        match &self.filter {
            Some(raw) => EqFilter::parse(raw)
                .map(Some)
                .ok_or_else(|| anyhow!("Filtro inválido '{}', usa columna=valor", raw)),
            None => Ok(None),
        }
    }

    fn subscription_options(&self, filter: Option<&EqFilter>) -> SubscriptionOptions<Value> {
        let mut options = SubscriptionOptions::new()
            .on_insert(|row: &Value| println!("{} {}", "+".green(), describe(row)))
            .on_update(|row: &Value| println!("{} {}", "~".yellow(), describe(row)))
            .on_delete(|key| println!("{} {}", "-".red(), key));

        if let Some(filter) = filter {
            options = options.filter(filter.column.clone(), filter.value.clone());
        }
        if let Some(column) = &self.order_by {
            let direction = if self.desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            options = options.order_by(column.clone(), direction);
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        options
    }
}

pub async fn run(args: &GlobalArgs, table: &str, options: WatchOptions) -> Result<()> {
    let filter = options.parsed_filter()?;
    let ctx = Context::open(args).await?;

    // Latest version first, so nothing committed during the initial fetch is missed
    let version = ctx.client.fetch_changes(table, i64::MAX).await?.version;
    let mut rows = ctx.client.fetch_rows(table, &[]).await?;
    if let Some(filter) = &filter {
        rows.retain(|row| filter.matches_row(row));
    }

    let feed = ctx
        .client
        .poll_feed(table, version, Duration::from_secs(options.interval.max(1)));
    let mut subscription = Subscription::open(table, rows, feed, options.subscription_options(filter.as_ref()));

    println!("{} {} (Ctrl+C para salir)", "Siguiendo".bold(), table.cyan());
    print_state(table, &subscription.snapshot());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            alive = subscription.changed() => {
                if !alive {
                    break;
                }
                print_state(table, &subscription.snapshot());
            }
            _ = &mut ctrl_c => break,
        }
    }
    Ok(())
}

fn print_state(table: &str, state: &SubscriptionState<Value>) {
    for line in render(table, state) {
        println!("{}", line);
    }
}

fn render(table: &str, state: &SubscriptionState<Value>) -> Vec<String> {
    let mut lines = vec![format!("── {} ({} filas)", table, state.data.len())];
    if state.is_loading {
        lines.push("   cargando…".dimmed().to_string());
    }
    if let Some(error) = &state.error {
        lines.push(format!("   {}", error.red()));
    }
    lines.extend(state.data.iter().map(|row| format!("   {}", describe(row))));
    lines
}

/// `#id` followed by the remaining columns as compact JSON
fn describe(row: &Value) -> String {
    let key = row.key().map(|k| format!("#{}", k)).unwrap_or_else(|| "#?".to_string());
    match row {
        Value::Object(map) => {
            let rest: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(column, _)| column.as_str() != "id")
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect();
            format!("{} {}", key.bold(), Value::Object(rest))
        }
        other => format!("{} {}", key.bold(), other),
    }
}
