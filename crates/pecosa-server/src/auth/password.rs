// File: src/auth/password.rs
// Purpose: Password hashing and verification, including inherited legacy hashes

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash stored for the seed accounts, in the legacy bcrypt format
pub const LEGACY_SEED_HASH: &str = "$2b$10$LaPecosaSeedAccountLegacyHashImportedFromPreviousBackend";

/// Outcome of checking a password against a stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Valid,
    /// Accepted through the legacy fallback; the caller should re-hash
    ValidLegacy,
    Invalid,
}

impl PasswordCheck {
    pub fn is_valid(self) -> bool {
        !matches!(self, PasswordCheck::Invalid)
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Hashes inherited from the previous backend (bcrypt `$2a$`, `$2b$`, `$2y$`)
pub fn is_legacy_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|prefix| hash.starts_with(prefix))
}

/// Check `password` against `stored`.
///
/// Legacy hashes are never verified cryptographically: they only accept the
/// configured legacy password, and none at all when it is unset.
pub fn verify_password(password: &str, stored: &str, legacy_password: Option<&str>) -> PasswordCheck {
    if is_legacy_hash(stored) {
        return match legacy_password {
            Some(legacy) if !legacy.is_empty() && password == legacy => PasswordCheck::ValidLegacy,
            _ => PasswordCheck::Invalid,
        };
    }

    let Ok(parsed) = PasswordHash::new(stored) else {
        tracing::warn!("Stored password hash is not in PHC format");
        return PasswordCheck::Invalid;
    };
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => PasswordCheck::Valid,
        Err(_) => PasswordCheck::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_argon2_round_trip() {
        let hash = hash_password("tortilla").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert_eq!(verify_password("tortilla", &hash, None), PasswordCheck::Valid);
        assert_eq!(verify_password("tostada", &hash, None), PasswordCheck::Invalid);
    }

    #[rstest]
    #[case("pecosa123", Some("pecosa123"), PasswordCheck::ValidLegacy)]
    #[case("wrong", Some("pecosa123"), PasswordCheck::Invalid)]
    #[case("pecosa123", None, PasswordCheck::Invalid)]
    #[case("", Some(""), PasswordCheck::Invalid)]
    fn test_legacy_hash(#[case] password: &str, #[case] legacy: Option<&str>, #[case] expected: PasswordCheck) {
        assert_eq!(verify_password(password, LEGACY_SEED_HASH, legacy), expected);
    }

    #[test]
    fn test_garbage_hash_is_invalid() {
        assert_eq!(verify_password("x", "not-a-hash", Some("x")), PasswordCheck::Invalid);
    }
}
