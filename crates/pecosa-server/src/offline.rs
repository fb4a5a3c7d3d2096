// File: src/offline.rs
// Purpose: Service worker rendering, its cache rules, and the offline assets it precaches

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::AppState;

/// Service worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Bump to drop every cache written by an older worker
    pub cache_name: String,
    pub precache: Vec<String>,
    pub offline_page: String,
    /// Path prefixes that always go to the network
    pub bypass_prefixes: Vec<String>,
    /// URL fragments that always go to the network (auth, hosted backends)
    pub bypass_substrings: Vec<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_name: "lapecosa-cache-v1".to_string(),
            precache: vec![
                "/".to_string(),
                "/favicon.ico".to_string(),
                "/manifest.json".to_string(),
                "/offline.html".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
            bypass_prefixes: vec![
                "/api/".to_string(),
                "/admin".to_string(),
                "/cocina".to_string(),
                "/employee".to_string(),
            ],
            bypass_substrings: vec!["supabase".to_string(), "auth".to_string()],
        }
    }
}

/// How the worker answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Not intercepted; the browser goes to the network
    Bypass,
    /// Network, falling back to the offline page
    NetworkFirst,
    /// Cache, filling it from the network on a miss
    CacheFirst,
}

fn path_of(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => url,
    }
}

impl OfflineConfig {
    /// Decision the rendered worker makes for a request. Mirrors the `fetch` handler in `sw.js`.
    pub fn cache_strategy(&self, method: &str, url: &str, is_navigation: bool) -> CacheStrategy {
        if !method.eq_ignore_ascii_case("GET") {
            return CacheStrategy::Bypass;
        }

        let path = path_of(url);
        let bypassed = self.bypass_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
            || self.bypass_substrings.iter().any(|needle| url.contains(needle.as_str()));
        if bypassed {
            CacheStrategy::Bypass
        } else if is_navigation {
            CacheStrategy::NetworkFirst
        } else {
            CacheStrategy::CacheFirst
        }
    }

    /// JavaScript source of the service worker
    pub fn render_service_worker(&self) -> String {
        SERVICE_WORKER_TEMPLATE
            .replace("__CACHE_NAME__", &js_literal(&self.cache_name))
            .replace("__PRECACHE__", &js_literal(&self.precache))
            .replace("__OFFLINE_URL__", &js_literal(&self.offline_page))
            .replace("__BYPASS_PREFIXES__", &js_literal(&self.bypass_prefixes))
            .replace("__BYPASS_SUBSTRINGS__", &js_literal(&self.bypass_substrings))
    }
}

// JSON is valid JavaScript for strings and string arrays
fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

const SERVICE_WORKER_TEMPLATE: &str = r#"const CACHE_NAME = __CACHE_NAME__;
const PRECACHE = __PRECACHE__;
const OFFLINE_URL = __OFFLINE_URL__;
const BYPASS_PREFIXES = __BYPASS_PREFIXES__;
const BYPASS_SUBSTRINGS = __BYPASS_SUBSTRINGS__;

function bypass(request, url) {
  if (request.method !== 'GET') return true;
  if (BYPASS_PREFIXES.some((prefix) => url.pathname.startsWith(prefix))) return true;
  return BYPASS_SUBSTRINGS.some((needle) => request.url.includes(needle));
}

self.addEventListener('install', (event) => {
  event.waitUntil(caches.open(CACHE_NAME).then((cache) => cache.addAll(PRECACHE)));
  self.skipWaiting();
});

self.addEventListener('activate', (event) => {
  event.waitUntil(
    caches.keys().then((keys) =>
      Promise.all(keys.filter((key) => key !== CACHE_NAME).map((key) => caches.delete(key)))
    )
  );
  self.clients.claim();
});

self.addEventListener('fetch', (event) => {
  const request = event.request;
  const url = new URL(request.url);
  if (bypass(request, url)) return;

  if (request.mode === 'navigate') {
    event.respondWith(
      fetch(request).catch(() =>
        caches.match(request).then((cached) => cached || caches.match(OFFLINE_URL))
      )
    );
    return;
  }

  event.respondWith(
    caches.match(request).then((cached) => {
      if (cached) return cached;
      return fetch(request).then((response) => {
        if (response.ok) {
          const copy = response.clone();
          caches.open(CACHE_NAME).then((cache) => cache.put(request, copy));
        }
        return response;
      });
    })
  );
});
"#;

const FAVICON_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"><circle cx="16" cy="16" r="15" fill="#c0392b"/><text x="16" y="22" font-size="16" text-anchor="middle" fill="#fff">P</text></svg>"##;

/// GET /sw.js
pub async fn service_worker(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            // The browser must see a new cache name as soon as it ships
            (header::CACHE_CONTROL, "no-cache"),
        ],
        state.config.offline.render_service_worker(),
    )
        .into_response()
}

/// GET /manifest.json
pub async fn manifest() -> Response {
    Json(json!({
        "name": "La Pecosa",
        "short_name": "Pecosa",
        "start_url": "/",
        "display": "standalone",
        "background_color": "#ffffff",
        "theme_color": "#c0392b",
        "icons": [{ "src": "/favicon.ico", "sizes": "any", "type": "image/svg+xml" }],
    }))
    .into_response()
}

/// GET /favicon.ico
pub async fn favicon() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        FAVICON_SVG,
    )
        .into_response()
}

/// GET /offline.html
pub async fn offline_page() -> maud::Markup {
    crate::pages::offline()
}
