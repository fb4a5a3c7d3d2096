// File: pecosa-sync/src/client.rs
// Purpose: HTTP client for the La Pecosa backend API

use async_stream::stream;
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::connection::ConnectivityProbe;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeed, FeedEvent};
use crate::queue::PendingChange;
use crate::sync_api::{SyncPushRequest, SyncPushResponse, SyncResponse};

/// Name of the session cookie issued by the server
pub const SESSION_COOKIE: &str = "user_session";

/// The signed-in user as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub name: String,
    #[serde(rename = "employeeId", default)]
    pub employee_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one backend instance.
///
/// Clones share the session, so a login on one handle authenticates all of them.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    client_id: String,
    session: Arc<RwLock<Option<String>>>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, anon_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
            client_id: uuid::Uuid::new_v4().to_string(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Identify this client in pushed changes (defaults to a random id)
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Raw `user_session` cookie value, for persisting between runs
    pub async fn session_cookie(&self) -> Option<String> {
        self.session.read().await.clone()
    }

    pub async fn set_session_cookie(&self, value: Option<String>) {
        *self.session.write().await = value;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.anon_key {
            request = request.header("apikey", key);
        }
        if let Some(session) = self.session.read().await.as_ref() {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, session));
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).await.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(SyncError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Sign in and keep the session cookie for later calls
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthUser> {
        let response = self
            .send(
                self.http
                    .post(self.url("/api/auth/login"))
                    .json(&json!({ "username": username, "password": password })),
            )
            .await?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_from_set_cookie);
        let body: LoginResponse = response.json().await?;

        match cookie {
            Some(cookie) => {
                self.set_session_cookie(Some(cookie)).await;
                tracing::info!("Signed in as {} ({})", body.user.username, body.user.role);
                Ok(body.user)
            }
            None => Err(SyncError::Rejected {
                status: 200,
                message: "login response carried no session cookie".to_string(),
            }),
        }
    }

    /// The user behind the current session, if it is still valid
    pub async fn check_session(&self) -> Result<Option<AuthUser>> {
        let response = self
            .authorize(self.http.get(self.url("/api/auth/check-session")))
            .await
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(response.json::<SessionResponse>().await?.user)
    }

    pub async fn logout(&self) -> Result<()> {
        self.send(self.http.post(self.url("/api/auth/logout"))).await?;
        self.set_session_cookie(None).await;
        Ok(())
    }

    /// Whether the backend answers its health endpoint
    pub async fn health(&self) -> Result<bool> {
        let response = self.http.get(self.url("/api/health")).send().await?;
        Ok(response.status().is_success())
    }

    /// Current rows of a table through its REST endpoint
    pub async fn fetch_rows(&self, table: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let response = self
            .send(self.http.get(self.url(&format!("/api/{}", table))).query(query))
            .await?;
        Ok(response.json().await?)
    }

    /// Changes of a table after `since`
    pub async fn fetch_changes(&self, table: &str, since: i64) -> Result<SyncResponse> {
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("/api/sync/{}", table)))
                    .query(&[("since", since)]),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Push queued changes for one table
    pub async fn push(&self, table: &str, changes: Vec<PendingChange>) -> Result<SyncPushResponse> {
        let request = SyncPushRequest {
            client_id: Some(self.client_id.clone()),
            changes,
        };
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("/api/sync/{}", table)))
                    .json(&request),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Change feed built by polling the pull endpoint.
    ///
    /// Reports `Subscribed` after the first successful poll. Failed polls are
    /// reported as feed errors and polling continues at the same interval.
    pub fn poll_feed(&self, table: impl Into<String>, since: i64, interval: Duration) -> ChangeFeed {
        let client = self.clone();
        let table = table.into();

        Box::pin(stream! {
            let mut since = since;
            let mut subscribed = false;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match client.fetch_changes(&table, since).await {
                    Ok(batch) => {
                        if !subscribed {
                            subscribed = true;
                            yield FeedEvent::Subscribed;
                        }
                        for change in batch.changes {
                            since = since.max(change.version);
                            yield FeedEvent::Change(change);
                        }
                        since = since.max(batch.version);
                    }
                    Err(e) => {
                        tracing::warn!("Polling {} failed: {}", table, e);
                        yield FeedEvent::Error(e.to_string());
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ConnectivityProbe for BackendClient {
    async fn is_reachable(&self) -> bool {
        self.health().await.unwrap_or(false)
    }
}

/// Extract the session value from one `Set-Cookie` header
fn session_from_set_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_set_cookie() {
        assert_eq!(
            session_from_set_cookie("user_session=abc.def; HttpOnly; Path=/; Max-Age=604800"),
            Some("abc.def".to_string())
        );
        assert_eq!(session_from_set_cookie("user_role=admin; HttpOnly"), None);
        // Logout clears the cookie with an empty value
        assert_eq!(session_from_set_cookie("user_session=; Max-Age=0"), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("http://localhost:3000/", None);
        assert_eq!(client.url("/api/health"), "http://localhost:3000/api/health");
    }

    #[test]
    fn test_auth_user_wire_names() {
        let user: AuthUser = serde_json::from_value(json!({
            "id": 3,
            "username": "empleado",
            "role": "employee",
            "name": "Empleado",
            "employeeId": 1
        }))
        .unwrap();
        assert_eq!(user.employee_id, Some(1));
    }
}
