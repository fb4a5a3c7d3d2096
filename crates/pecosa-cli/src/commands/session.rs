// File: src/commands/session.rs
// Purpose: login, logout and status commands

use anyhow::Result;
use colored::Colorize;

use crate::context::Context;
use crate::GlobalArgs;

pub async fn login(args: &GlobalArgs, username: &str, password: &str) -> Result<()> {
    let ctx = Context::open(args).await?;
    let user = ctx.client.login(username, password).await?;
    ctx.save_session().await;

    println!(
        "{} Sesión iniciada como {} ({})",
        "✓".green(),
        user.name.bold(),
        user.role
    );
    Ok(())
}

pub async fn logout(args: &GlobalArgs) -> Result<()> {
    let ctx = Context::open(args).await?;
    if let Err(e) = ctx.client.logout().await {
        // The local session goes away even when the backend is unreachable
        tracing::warn!("Backend logout failed: {}", e);
        ctx.client.set_session_cookie(None).await;
    }
    ctx.save_session().await;
    println!("{} Sesión cerrada", "✓".green());
    Ok(())
}

pub async fn status(args: &GlobalArgs) -> Result<()> {
    let ctx = Context::open(args).await?;
    let online = ctx.client.health().await.unwrap_or(false);

    println!("{} {}", "Backend:".bold(), ctx.client.base_url());
    if online {
        println!("  {} En línea", "●".green());
        match ctx.client.check_session().await? {
            Some(user) => println!("  {} {} ({})", "Sesión:".bold(), user.username, user.role),
            None => println!("  {} {}", "Sesión:".bold(), "ninguna".yellow()),
        }
    } else {
        println!("  {} Sin conexión", "●".red());
    }

    let pending = ctx.queue.len().await;
    let label = if pending == 0 {
        "0".green()
    } else {
        pending.to_string().yellow()
    };
    println!("{} {}", "Cambios pendientes:".bold(), label);
    println!("{} {}", "Cliente:".bold(), ctx.client.client_id());
    Ok(())
}
