use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{error::AppResult, users::User};

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub ttl_hours: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

/// Splits a `p1_p2` token into its lookup half and its secret half.
fn split_token(token: &str) -> Option<(&str, &str)> {
    let (p1, p2) = token.split_once('_')?;
    if p1.is_empty() || p2.is_empty() {
        return None;
    }
    Some((p1, p2))
}

/// Issues a new session for `user_id` and returns the bearer token.
pub async fn create_session(
    user_id: i64,
    settings: &SessionSettings,
    db: &mut SqliteConnection,
) -> AppResult<String> {
    let session_token_p1 = Uuid::new_v4().to_string();
    let session_token_p2 = Uuid::new_v4().to_string();
    let session_token = [session_token_p1.as_str(), "_", session_token_p2.as_str()].concat();

    let created_at = Utc::now().timestamp();
    let expires_at = created_at + 60 * 60 * settings.ttl_hours;

    sqlx::query(
        "INSERT INTO user_sessions
        (session_token_p1, session_token_p2, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?);",
    )
    .bind(session_token_p1)
    .bind(session_token_p2)
    .bind(user_id)
    .bind(created_at)
    .bind(expires_at)
    .execute(db)
    .await?;

    Ok(session_token)
}

/// The user owning `token`, if the session exists and has not expired.
pub async fn resolve_session(token: &str, db: &SqlitePool) -> AppResult<Option<User>> {
    let Some((p1, p2)) = split_token(token) else {
        return Ok(None);
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT users.*
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_token_p1 = ?
          AND user_sessions.session_token_p2 = ?
          AND user_sessions.expires_at > ?
        "#,
    )
    .bind(p1)
    .bind(p2)
    .bind(Utc::now().timestamp())
    .fetch_optional(db)
    .await?;

    Ok(user)
}

/// Deletes the session behind `token`. Returns whether a session was removed.
pub async fn revoke_session(token: &str, db: &SqlitePool) -> AppResult<bool> {
    let Some((p1, p2)) = split_token(token) else {
        return Ok(false);
    };

    let result = sqlx::query(
        "DELETE FROM user_sessions WHERE session_token_p1 = ? AND session_token_p2 = ?",
    )
    .bind(p1)
    .bind(p2)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}
