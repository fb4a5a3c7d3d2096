// File: src/auth/session.rs
// Purpose: Signed session cookie encoding and cookie builders

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::auth::Role;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "user_session";
pub const ROLE_COOKIE: &str = "user_role";

/// The user a session belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub name: String,
    #[serde(rename = "employeeId")]
    pub employee_id: Option<i64>,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    user: SessionUser,
    /// Expiry, unix seconds
    exp: i64,
}

/// Encodes sessions as `base64(json).base64(hmac)`, both URL-safe and unpadded,
/// so the value needs no cookie escaping
#[derive(Clone)]
pub struct SessionCodec {
    keyed: HmacSha256,
    ttl_days: i64,
    secure: bool,
}

impl SessionCodec {
    pub fn new(secret: impl AsRef<[u8]>, ttl_days: i64, secure: bool) -> anyhow::Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|_| anyhow::anyhow!("invalid session secret"))?;
        Ok(Self {
            keyed,
            ttl_days,
            secure,
        })
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(payload.as_bytes());
        mac
    }

    pub fn encode(&self, user: &SessionUser) -> String {
        self.encode_with_expiry(user, Utc::now().timestamp() + self.ttl_days * 86_400)
    }

    fn encode_with_expiry(&self, user: &SessionUser, exp: i64) -> String {
        let claims = Claims {
            user: user.clone(),
            exp,
        };
        // Serializing plain structs with string keys cannot fail
        let json = serde_json::to_string(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Verify and decode a cookie value. Tampered, malformed or expired values yield `None`.
    pub fn decode(&self, value: &str) -> Option<SessionUser> {
        let (payload, signature) = value.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.mac(payload).verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: Claims = serde_json::from_slice(&json).ok()?;
        if claims.exp <= Utc::now().timestamp() {
            tracing::debug!("Rejecting expired session for {}", claims.user.username);
            return None;
        }
        Some(claims.user)
    }

    pub fn session_cookie(&self, user: &SessionUser) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, self.encode(user)))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(self.ttl_days))
            .build()
    }

    /// Cookie kept for clients that still read the role directly
    pub fn legacy_role_cookie(&self, role: Role) -> Cookie<'static> {
        Cookie::build((ROLE_COOKIE, role.as_str()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::days(self.ttl_days))
            .build()
    }
}

/// An expired, empty cookie that makes the browser drop `name`
pub fn removal_cookie(name: impl Into<String>) -> Cookie<'static> {
    Cookie::build((name.into(), ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}
