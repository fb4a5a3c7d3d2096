// File: src/app.rs
// Purpose: Shared application state and the HTTP router

use anyhow::{Context, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use axum::{middleware, routing::get, Router};
use pecosa_sync::{ChangeTracker, SyncConfig, SyncEngine};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{guard, rate_limit::LoginRateLimiter, routes as auth_routes, session::SessionCodec, AuthService};
use crate::catalog::{Catalog, SYNCED_TABLES};
use crate::config::Config;
use crate::{api, db, offline, pages};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub auth: Arc<AuthService>,
    pub catalog: Arc<Catalog>,
    pub sync: Arc<SyncEngine>,
}

impl AppState {
    /// Open the database and wire every service from `config`
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database.url).await?;
        if config.database.seed {
            db::seed(&pool).await.context("Failed to seed database")?;
        }
        Self::with_pool(config, pool).await
    }

    /// Wire services over an existing pool (schema already created)
    pub async fn with_pool(config: Config, pool: SqlitePool) -> Result<Self> {
        let tracker = Arc::new(
            ChangeTracker::new(pool.clone(), config.sync.channel_capacity)
                .await
                .context("Failed to initialize change log")?,
        );
        let catalog = Arc::new(Catalog::new(pool.clone(), tracker.clone()));

        let sync_config = SyncConfig {
            tables: SYNCED_TABLES.iter().map(|t| t.to_string()).collect(),
            strategy: config.sync.strategy,
            channel_capacity: config.sync.channel_capacity,
            retention_days: config.sync.retention_days,
        };
        let sync = Arc::new(SyncEngine::new(tracker, catalog.clone(), sync_config));

        let codec = SessionCodec::new(
            session_secret(&config.auth.session_secret),
            config.auth.session_days,
            config.auth.secure_cookies,
        )?;
        let limiter = LoginRateLimiter::new(
            pool.clone(),
            config.auth.max_failed_attempts,
            config.auth.lockout_minutes,
        );
        let auth = Arc::new(AuthService::new(
            pool.clone(),
            codec,
            limiter,
            config.auth.legacy_password.clone(),
            config.auth.backend_cookie_marker.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            auth,
            catalog,
            sync,
        })
    }
}

fn session_secret(configured: &str) -> Vec<u8> {
    if !configured.is_empty() {
        return configured.as_bytes().to_vec();
    }
    tracing::warn!("No session secret configured; sessions will not survive a restart");
    let mut secret = vec![0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    let dashboards = Router::new()
        .route(
            "/admin",
            get(pages::admin_dashboard).post(auth_routes::admin_form_login),
        )
        .route(
            "/cocina",
            get(pages::kitchen_dashboard).post(auth_routes::kitchen_form_login),
        )
        .route("/employee", get(pages::employee_dashboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard::page_guard));

    let api = api::routes()
        .merge(state.sync.routes::<AppState>())
        .route_layer(middleware::from_fn_with_state(state.clone(), guard::api_guard));

    Router::new()
        .route("/", get(pages::home_page))
        .route("/sw.js", get(offline::service_worker))
        .route("/manifest.json", get(offline::manifest))
        .route("/favicon.ico", get(offline::favicon))
        .route("/offline.html", get(offline::offline_page))
        .merge(auth_routes::routes())
        .merge(dashboards)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
