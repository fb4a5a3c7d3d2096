// File: src/lib.rs
// Purpose: Library entry for the La Pecosa backend

//! # pecosa-server
//!
//! Axum backend for the La Pecosa point of sale: signed session cookies,
//! role-guarded dashboards and API, catalog and orders, the realtime/sync
//! routes from `pecosa-sync`, and the service worker that keeps the front
//! end usable offline.
//!
//! ```rust,ignore
//! let config = pecosa_server::Config::load_default()?;
//! let state = pecosa_server::AppState::new(config).await?;
//! axum::serve(listener, pecosa_server::router(state)).await?;
//! ```

pub mod api;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod offline;
pub mod pages;

pub use app::{router, AppState};
pub use auth::{AuthService, Role};
pub use config::Config;
pub use error::{AppError, AppResult};
