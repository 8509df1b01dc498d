//! Account passwords: the rules a new password must meet, argon2 hashing,
//! and the login check.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    /// Verified against when the username does not exist, so an unknown
    /// account costs the same argon2 work as a wrong password.
    static ref UNKNOWN_USER_HASH: Option<String> = hash_password("classos-unknown-account").ok();
}

/// Password and confirmation from the register and admin-create forms.
pub fn check_new_password(password1: &str, password2: &str) -> AppResult<()> {
    if password1 != password2 {
        return Err(AppError::validation("passwords do not match"));
    }
    if password1.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("hash password: {}", e)
        })
}

fn matches(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is unreadable");
        anyhow::anyhow!("parse password hash: {}", e)
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Login check against the stored hash of the named account, or `None` when
/// no such account exists. The unknown case always fails.
pub fn verify_login(plain: &str, stored: Option<&str>) -> anyhow::Result<bool> {
    match stored {
        Some(hash) => matches(plain, hash),
        None => {
            if let Some(dummy) = UNKNOWN_USER_HASH.as_deref() {
                let _ = matches(plain, dummy);
            }
            Ok(false)
        }
    }
}
