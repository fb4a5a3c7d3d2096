// File: src/auth/mod.rs
// Purpose: Roles, credential checks and session resolution

pub mod guard;
pub mod password;
pub mod rate_limit;
pub mod routes;
pub mod session;

use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use password::{hash_password, verify_password, PasswordCheck};
use rate_limit::LoginRateLimiter;
use session::{SessionCodec, SessionUser, SESSION_COOKIE};

/// Staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(alias = "kitchen")]
    Cocina,
    #[serde(alias = "empleado")]
    Employee,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Cocina, Role::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cocina => "cocina",
            Role::Employee => "employee",
        }
    }

    /// Landing page for the role
    pub fn dashboard(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Cocina => "/cocina",
            Role::Employee => "/employee",
        }
    }

    /// Page prefixes the role may open
    pub fn allowed_prefixes(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &["/admin", "/cocina", "/employee"],
            Role::Cocina => &["/cocina"],
            Role::Employee => &["/employee"],
        }
    }

    pub fn can_access(&self, path: &str) -> bool {
        self.allowed_prefixes().iter().any(|prefix| {
            path == *prefix || path.strip_prefix(prefix).map_or(false, |rest| rest.starts_with('/'))
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::Cocina => "Cocina",
            Role::Employee => "Empleado",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "cocina" | "kitchen" => Ok(Role::Cocina),
            "employee" | "empleado" => Ok(Role::Employee),
            other => Err(AppError::bad_request(format!("Rol desconocido: {}", other))),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    name: String,
    employee_id: Option<i64>,
}

impl UserRow {
    fn into_session_user(self) -> AppResult<SessionUser> {
        Ok(SessionUser {
            id: self.id,
            username: self.username,
            role: self.role.parse()?,
            name: self.name,
            employee_id: self.employee_id,
        })
    }
}

/// Credential checks and session lookups
#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    codec: SessionCodec,
    limiter: LoginRateLimiter,
    legacy_password: Option<String>,
    cookie_marker: String,
}

impl AuthService {
    pub fn new(
        pool: SqlitePool,
        codec: SessionCodec,
        limiter: LoginRateLimiter,
        legacy_password: Option<String>,
        cookie_marker: String,
    ) -> Self {
        Self {
            pool,
            codec,
            limiter,
            legacy_password,
            cookie_marker,
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    pub fn limiter(&self) -> &LoginRateLimiter {
        &self.limiter
    }

    /// Substring identifying cookies left by the hosted auth backend
    pub fn cookie_marker(&self) -> &str {
        &self.cookie_marker
    }

    /// Verify credentials and return the user.
    ///
    /// Missing fields are 400, a lockout is 429, anything else wrong is 401
    /// without telling whether the user exists.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<SessionUser> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::bad_request("Usuario y contraseña son requeridos"));
        }

        if self.limiter.is_locked(username).await? {
            tracing::warn!(username, "login refused, too many failed attempts");
            return Err(AppError::TooManyRequests(
                "Demasiados intentos fallidos. Intenta de nuevo más tarde".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, role, name, employee_id FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            self.limiter.record(username, false).await?;
            return Err(AppError::unauthorized("Credenciales inválidas"));
        };

        let check = verify_password(password, &row.password_hash, self.legacy_password.as_deref());
        self.limiter.record(username, check.is_valid()).await?;

        match check {
            PasswordCheck::Invalid => Err(AppError::unauthorized("Credenciales inválidas")),
            PasswordCheck::Valid => row.into_session_user(),
            PasswordCheck::ValidLegacy => {
                self.upgrade_hash(row.id, password).await;
                row.into_session_user()
            }
        }
    }

    // A failed upgrade keeps the legacy hash, which still works next time
    async fn upgrade_hash(&self, user_id: i64, password: &str) {
        let hash = match hash_password(password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!("Could not re-hash legacy password: {}", e);
                return;
            }
        };
        match sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => tracing::info!(user_id, "upgraded legacy password hash"),
            Err(e) => tracing::error!("Could not store upgraded password hash: {}", e),
        }
    }

    /// Resolve the session cookie to a user that still exists with the same role
    pub async fn current_user(&self, jar: &CookieJar) -> AppResult<Option<SessionUser>> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        let Some(claimed) = self.codec.decode(cookie.value()) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, role, name, employee_id FROM users WHERE id = ?",
        )
        .bind(claimed.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if row.role == claimed.role.as_str() => Ok(Some(row.into_session_user()?)),
            _ => {
                tracing::debug!(user_id = claimed.id, "session no longer matches a user");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Role::Admin, "/admin", true)]
    #[case(Role::Admin, "/cocina/orders", true)]
    #[case(Role::Admin, "/employee", true)]
    #[case(Role::Cocina, "/cocina", true)]
    #[case(Role::Cocina, "/admin", false)]
    #[case(Role::Cocina, "/employee", false)]
    #[case(Role::Employee, "/employee/caja", true)]
    #[case(Role::Employee, "/cocina", false)]
    #[case(Role::Employee, "/employeex", false)]
    fn test_role_allow_list(#[case] role: Role, #[case] path: &str, #[case] allowed: bool) {
        assert_eq!(role.can_access(path), allowed);
    }

    #[test]
    fn test_role_names() {
        assert_eq!("kitchen".parse::<Role>().unwrap(), Role::Cocina);
        assert_eq!(serde_json::to_value(Role::Employee).unwrap(), "employee");
        assert!("chef".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_json_accepts_spanish_and_english_names() {
        for (name, role) in [("empleado", Role::Employee), ("employee", Role::Employee), ("kitchen", Role::Cocina)] {
            assert_eq!(serde_json::from_value::<Role>(serde_json::json!(name)).unwrap(), role);
            assert_eq!(name.parse::<Role>().unwrap(), role);
        }
    }
}
