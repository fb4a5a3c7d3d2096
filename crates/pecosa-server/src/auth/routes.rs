// File: src/auth/routes.rs
// Purpose: Login, session check and logout endpoints, JSON and form flavours

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::session::{removal_cookie, SessionUser, ROLE_COOKIE, SESSION_COOKIE};
use crate::auth::Role;
use crate::error::{AppError, AppResult};
use crate::pages;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/custom-login", post(custom_login))
        .route("/api/auth/check", get(check))
        .route("/api/auth/check-session", get(check_session))
        .route("/api/auth/logout", post(logout))
        .route("/login/:role", get(login_page).post(role_form_login))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Option<SessionUser>,
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let user = state.auth.authenticate(&request.username, &request.password).await?;
    tracing::info!(username = %user.username, role = %user.role, "signed in");

    let jar = jar.add(state.auth.codec().session_cookie(&user));
    Ok((jar, Json(LoginResponse { success: true, user })))
}

/// POST /api/auth/custom-login: like login, but the account must be allowed into `role`'s area
async fn custom_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<CustomLoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let user = state.auth.authenticate(&request.username, &request.password).await?;
    if !user.role.can_access(request.role.dashboard()) {
        tracing::info!(username = %user.username, requested = %request.role, "role mismatch on login");
        return Err(AppError::forbidden(format!(
            "No tienes permisos para acceder como {}",
            request.role.label()
        )));
    }

    let jar = jar.add(state.auth.codec().session_cookie(&user));
    Ok((jar, Json(LoginResponse { success: true, user })))
}

/// GET /api/auth/check: always 200, tells whether a session is active
async fn check(State(state): State<AppState>, jar: CookieJar) -> AppResult<Json<SessionResponse>> {
    let user = state.auth.current_user(&jar).await?;
    Ok(Json(SessionResponse {
        authenticated: user.is_some(),
        user,
    }))
}

/// GET /api/auth/check-session: 401 without a valid session
async fn check_session(State(state): State<AppState>, jar: CookieJar) -> AppResult<Json<SessionResponse>> {
    match state.auth.current_user(&jar).await? {
        Some(user) => Ok(Json(SessionResponse {
            authenticated: true,
            user: Some(user),
        })),
        None => Err(AppError::unauthorized("No hay sesión activa")),
    }
}

/// POST /api/auth/logout.
///
/// Clears the session, the legacy role cookie and any cookie left by the
/// hosted auth backend. Browsers submitting the logout form are sent home.
async fn logout(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap) -> Response {
    let marker = state.auth.cookie_marker();
    let backend_cookies: Vec<String> = jar
        .iter()
        .map(|cookie| cookie.name().to_string())
        .filter(|name| !marker.is_empty() && name.contains(marker))
        .collect();

    let mut jar = jar
        .add(removal_cookie(SESSION_COOKIE))
        .add(removal_cookie(ROLE_COOKIE));
    for name in backend_cookies {
        jar = jar.add(removal_cookie(name));
    }
    tracing::debug!("session cleared");

    if wants_html(&headers) {
        (jar, Redirect::to("/")).into_response()
    } else {
        (jar, Json(serde_json::json!({ "success": true }))).into_response()
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// GET /login/:role
async fn login_page(Path(role): Path<String>) -> AppResult<maud::Markup> {
    let role: Role = role.parse().map_err(|_| AppError::not_found("Página no encontrada"))?;
    Ok(pages::login(role, None, None))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /login/:role
async fn role_form_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(role): Path<String>,
    Form(form): Form<LoginForm>,
) -> Response {
    match role.parse::<Role>() {
        Ok(role) => form_login(&state, jar, role, form).await,
        Err(_) => AppError::not_found("Página no encontrada").into_response(),
    }
}

/// POST /admin
pub async fn admin_form_login(State(state): State<AppState>, jar: CookieJar, Form(form): Form<LoginForm>) -> Response {
    form_login(&state, jar, Role::Admin, form).await
}

/// POST /cocina
pub async fn kitchen_form_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    form_login(&state, jar, Role::Cocina, form).await
}

/// Form login for a role area: sets the session and the legacy role cookie,
/// then redirects (303) to the dashboard. Failures re-render the form with
/// the matching status.
async fn form_login(state: &AppState, jar: CookieJar, role: Role, form: LoginForm) -> Response {
    let result = state.auth.authenticate(&form.username, &form.password).await.and_then(|user| {
        if user.role.can_access(role.dashboard()) {
            Ok(user)
        } else {
            Err(AppError::forbidden(format!(
                "No tienes permisos para acceder como {}",
                role.label()
            )))
        }
    });

    match result {
        Ok(user) => {
            tracing::info!(username = %user.username, area = %role, "signed in through form");
            let codec = state.auth.codec();
            let jar = jar
                .add(codec.session_cookie(&user))
                .add(codec.legacy_role_cookie(user.role));
            (jar, Redirect::to(role.dashboard())).into_response()
        }
        Err(e) => {
            let status = e.status();
            let message = if status.is_server_error() {
                tracing::error!("Form login failed: {}", e);
                "Error interno del servidor".to_string()
            } else {
                e.to_string()
            };
            let username = Some(form.username.as_str()).filter(|u| !u.is_empty());
            (status, pages::login(role, Some(&message), username)).into_response()
        }
    }
}
