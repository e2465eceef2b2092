mod user;

use serde::{Deserialize, Serialize};
pub use user::*;

use crate::{
    auth::{create_session, hash_password, validate_password, CurrentUser, SessionSettings},
    clubs::Club,
    error::{is_unique_violation, AppError, AppResult, FieldErrors},
    sqlite::Database,
    AppState,
};
use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use sqlx::Connection;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/", post(sign_up))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignUpParams {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    pub statement: String,
    #[serde(default)]
    pub chess_xp: i64,
}

const EMAIL_TAKEN: &str = "A user with this email already exists";

/// Maps a write that lost a race on the unique email index to the same field
/// error the up-front check reports.
fn email_conflict(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        let mut errors = FieldErrors::new();
        errors.add("email", EMAIL_TAKEN);
        AppError::Validation(errors)
    } else {
        AppError::Database(err)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignUpResponse {
    pub user: User,
    pub session_token: String,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all, fields(email = %params.email))]
pub async fn sign_up(
    State(db): State<Database>,
    State(sessions): State<SessionSettings>,
    Json(params): Json<SignUpParams>,
) -> AppResult<impl IntoResponse> {
    let mut conn = db.acquire().await?;

    let mut errors = FieldErrors::new();
    validate_email(&params.email, &mut errors);
    validate_password("password", &params.password, &mut errors);
    validate_name("first_name", &params.first_name, &mut errors);
    validate_name("last_name", &params.last_name, &mut errors);
    validate_bio(&params.bio, &mut errors);
    validate_statement(&params.statement, &mut errors);
    validate_chess_xp(params.chess_xp, &mut errors);
    if !errors.contains("email") && User::email_taken(&params.email, None, &mut conn).await? {
        errors.add("email", EMAIL_TAKEN);
    }
    errors.into_result()?;

    let password_hash = hash_password(params.password).await?;
    let now = Utc::now().naive_utc();
    let mut tx = conn.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, bio, statement,
                           chess_xp, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, email, first_name, last_name, bio, statement, chess_xp,
                  created_at, updated_at
        "#,
    )
    .bind(&params.email)
    .bind(password_hash)
    .bind(&params.first_name)
    .bind(&params.last_name)
    .bind(&params.bio)
    .bind(&params.statement)
    .bind(params.chess_xp)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(email_conflict)?;

    let session_token = create_session(user.id, &sessions, &mut tx).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            user,
            session_token,
        }),
    ))
}

/// Profiles are private: only the owner of the account may read or change it.
fn require_self(current: &User, id: i64) -> AppResult<()> {
    if current.id == id {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MemberProfile {
    pub user: User,
    pub clubs: Vec<Club>,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, current))]
pub async fn get_user(
    State(db): State<Database>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    require_self(&current, id)?;

    let mut conn = db.acquire().await?;
    let user = User::from_id(id, &mut conn)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let clubs = Club::joined_by(user.id, &mut conn).await?;

    Ok(Json(MemberProfile { user, clubs }))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateUserParams {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub statement: Option<String>,
    pub chess_xp: Option<i64>,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, current))]
pub async fn update_user(
    State(db): State<Database>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<i64>,
    Json(params): Json<UpdateUserParams>,
) -> AppResult<impl IntoResponse> {
    require_self(&current, id)?;

    let mut conn = db.acquire().await?;

    let mut errors = FieldErrors::new();
    if let Some(email) = &params.email {
        validate_email(email, &mut errors);
        if !errors.contains("email") && User::email_taken(email, Some(id), &mut conn).await? {
            errors.add("email", EMAIL_TAKEN);
        }
    }
    if let Some(first_name) = &params.first_name {
        validate_name("first_name", first_name, &mut errors);
    }
    if let Some(last_name) = &params.last_name {
        validate_name("last_name", last_name, &mut errors);
    }
    if let Some(bio) = &params.bio {
        validate_bio(bio, &mut errors);
    }
    if let Some(statement) = &params.statement {
        validate_statement(statement, &mut errors);
    }
    if let Some(chess_xp) = params.chess_xp {
        validate_chess_xp(chess_xp, &mut errors);
    }
    errors.into_result()?;

    let now = Utc::now().naive_utc();
    let mut query = sqlx::QueryBuilder::new(
        r#"
        UPDATE users SET 
        "#,
    );
    let mut separated = query.separated(", ");
    if let Some(email) = params.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }
    if let Some(first_name) = params.first_name {
        separated.push("first_name = ");
        separated.push_bind_unseparated(first_name);
    }
    if let Some(last_name) = params.last_name {
        separated.push("last_name = ");
        separated.push_bind_unseparated(last_name);
    }
    if let Some(bio) = params.bio {
        separated.push("bio = ");
        separated.push_bind_unseparated(bio);
    }
    if let Some(statement) = params.statement {
        separated.push("statement = ");
        separated.push_bind_unseparated(statement);
    }
    if let Some(chess_xp) = params.chess_xp {
        separated.push("chess_xp = ");
        separated.push_bind_unseparated(chess_xp);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(now);
    query.push(" WHERE id = ");
    query.push_bind(id);
    tracing::debug!("Query: {}", query.sql());
    query
        .build()
        .execute(&mut *conn)
        .await
        .map_err(email_conflict)?;

    let user = User::from_id(id, &mut conn)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(user))
}

/// Deletes the account. Memberships and sessions go with it through the
/// foreign-key cascade.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, current))]
pub async fn delete_user(
    State(db): State<Database>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    require_self(&current, id)?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(db.as_ref())
        .await?;

    match result.rows_affected() {
        0 => Err(AppError::NotFound("User")),
        _ => {
            tracing::info!("User deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}
