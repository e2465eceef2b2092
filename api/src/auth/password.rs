use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AppResult, FieldErrors};

const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

#[cfg(not(test))]
fn hasher() -> Argon2<'static> {
    Argon2::default()
}

// Minimum cost keeps the test suite fast; verification reads the cost back
// out of the stored hash either way.
#[cfg(test)]
fn hasher() -> Argon2<'static> {
    use argon2::{Algorithm, Params, Version};

    let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Passwords need an uppercase letter, a lowercase letter and a digit.
pub fn validate_password(field: &'static str, password: &str, errors: &mut FieldErrors) {
    let length = password.chars().count();
    if length < PASSWORD_MIN {
        errors.add(field, format!("Password must be at least {PASSWORD_MIN} characters"));
    } else if length > PASSWORD_MAX {
        errors.add(field, format!("Password must be at most {PASSWORD_MAX} characters"));
    }
    if !password.chars().any(char::is_uppercase) {
        errors.add(field, "Password must contain an uppercase character");
    }
    if !password.chars().any(char::is_lowercase) {
        errors.add(field, "Password must contain a lowercase character");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.add(field, "Password must contain a number");
    }
}

/// Argon2id PHC string for `password`, computed off the async runtime.
pub async fn hash_password(password: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    })
    .await
    .context("password hashing task failed")??;

    Ok(hash)
}

/// Whether `password` matches the stored `hash`. A malformed hash never matches.
pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let matches = tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => hasher()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!("Stored password hash is malformed: {err}");
            false
        }
    })
    .await
    .context("password verification task failed")?;

    Ok(matches)
}
