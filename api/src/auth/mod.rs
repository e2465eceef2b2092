mod password;
mod session;

pub use password::*;
pub use session::*;

use axum::{
    debug_handler,
    extract::{FromRef, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use axum_auth::AuthBearer;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult, FieldErrors},
    sqlite::Database,
    users::User,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/session", post(login).delete(logout))
        .route("/password", put(change_password))
}

/// The authenticated caller, resolved from an `Authorization: Bearer` session token.
#[derive(Debug)]
pub struct CurrentUser(pub User);

/// The raw bearer token of an authenticated request.
#[derive(Debug)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthBearer(token) = AuthBearer::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthenticated)?;

        Ok(SessionToken(token))
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Database: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SessionToken(token) = SessionToken::from_request_parts(parts, state).await?;
        let db = Database::from_ref(state);

        match resolve_session(&token, db.as_ref()).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                tracing::debug!("Rejected unknown or expired session token");
                Err(AppError::Unauthenticated)
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginParams {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub session_token: String,
}

/// Exchanges an email and password for a fresh session token. Unknown emails
/// and wrong passwords are indistinguishable to the caller.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all, fields(email = %params.email))]
pub async fn login(
    State(db): State<Database>,
    State(sessions): State<SessionSettings>,
    Json(params): Json<LoginParams>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = db.acquire().await?;

    let credentials: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(&params.email)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((user_id, password_hash)) = credentials else {
        tracing::debug!("Login for unknown email");
        return Err(AppError::Unauthenticated);
    };
    if !verify_password(params.password, password_hash).await? {
        tracing::debug!(user_id, "Login with wrong password");
        return Err(AppError::Unauthenticated);
    }

    let user = User::from_id(user_id, &mut conn)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let session_token = create_session(user.id, &sessions, &mut conn).await?;

    tracing::info!(user_id, "User logged in");
    Ok(Json(LoginResponse {
        user,
        session_token,
    }))
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all, fields(user_id = user.id))]
pub async fn logout(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    SessionToken(token): SessionToken,
) -> AppResult<impl IntoResponse> {
    revoke_session(&token, db.as_ref()).await?;
    tracing::info!("Session revoked");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChangePasswordParams {
    pub password: String,
    pub new_password: String,
}

/// Replaces the caller's password after checking the current one. Existing
/// sessions stay valid.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all, fields(user_id = user.id))]
pub async fn change_password(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Json(params): Json<ChangePasswordParams>,
) -> AppResult<impl IntoResponse> {
    let mut errors = FieldErrors::new();
    validate_password("new_password", &params.new_password, &mut errors);

    let current_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(user.id)
        .fetch_one(db.as_ref())
        .await?;
    if !verify_password(params.password, current_hash).await? {
        errors.add("password", "Password is incorrect");
    }
    errors.into_result()?;

    let new_hash = hash_password(params.new_password).await?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(new_hash)
        .bind(Utc::now().naive_utc())
        .bind(user.id)
        .execute(db.as_ref())
        .await?;

    tracing::info!("Password changed");
    Ok(StatusCode::NO_CONTENT)
}
