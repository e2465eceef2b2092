mod authorization;
mod membership;

pub use authorization::*;
pub use membership::*;

use crate::{
    auth::CurrentUser,
    clubs::Club,
    error::{AppError, AppResult},
    sqlite::Database,
    users::UserSummary,
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
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/{name}/membership", get(get_own_membership))
        .route(
            "/{name}/applications",
            post(apply).get(get_applications),
        )
        .route(
            "/{name}/applications/{membership_id}/approve",
            post(approve_application),
        )
        .route(
            "/{name}/applications/{membership_id}/reject",
            post(reject_application),
        )
        .route("/{name}/members", get(get_members))
        .route(
            "/{name}/members/{membership_id}/promote",
            post(promote_member),
        )
        .route(
            "/{name}/members/{membership_id}/demote",
            post(demote_officer),
        )
        .route(
            "/{name}/members/{membership_id}/transfer-ownership",
            post(transfer_ownership),
        )
}

/// The club named `club_name` and the caller's membership in it, if any.
pub async fn load_club_access(
    club_name: &str,
    user_id: i64,
    db: &mut SqliteConnection,
) -> AppResult<(Club, Option<Membership>)> {
    let club = Club::from_name(club_name, &mut *db)
        .await?
        .ok_or(AppError::NotFound("Club"))?;
    let membership = Membership::for_user_in_club(user_id, club.id, db).await?;

    Ok((club, membership))
}

async fn load_target(membership_id: i64, db: &mut SqliteConnection) -> AppResult<Membership> {
    Membership::from_id(membership_id, db)
        .await?
        .ok_or(AppError::NotFound("Membership"))
}

/// A membership together with the user holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberListing {
    #[serde(flatten)]
    pub membership: Membership,
    pub role: Option<Role>,
    pub user: UserSummary,
}

impl MemberListing {
    fn from_row(row: &SqliteRow) -> Self {
        let membership = Membership {
            id: row.get("id"),
            user_id: row.get("user_id"),
            club_id: row.get("club_id"),
            is_applicant: row.get("is_applicant"),
            is_member: row.get("is_member"),
            is_officer: row.get("is_officer"),
            is_owner: row.get("is_owner"),
            created_at: row.get("created_at"),
        };

        Self {
            role: membership.highest_role(),
            membership,
            user: UserSummary {
                id: row.get("user_id"),
                email: row.get("email"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                chess_xp: row.get("chess_xp"),
            },
        }
    }

    async fn list(
        club_id: i64,
        is_member: bool,
        excluding_user: Option<i64>,
        db: &mut SqliteConnection,
    ) -> AppResult<Vec<Self>> {
        let listings = sqlx::query(
            r#"
            SELECT m.id, m.user_id, m.club_id, m.is_applicant, m.is_member,
                   m.is_officer, m.is_owner, m.created_at,
                   u.email, u.first_name, u.last_name, u.chess_xp
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.club_id = ? AND m.is_member = ? AND m.user_id IS NOT ?
            ORDER BY m.id
            "#,
        )
        .bind(club_id)
        .bind(is_member)
        .bind(excluding_user)
        .fetch_all(db)
        .await?
        .iter()
        .map(Self::from_row)
        .collect::<Vec<_>>();

        Ok(listings)
    }
}

/// The caller's own membership ("club home").
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn get_own_membership(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<Json<Membership>> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;

    Ok(Json(member_required(membership)?))
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn apply(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let mut conn = db.acquire().await?;
    let (club, _) = load_club_access(&name, user.id, &mut conn).await?;

    match Membership::apply(user.id, club.id, &mut conn).await? {
        Application::Created(membership) => Ok((StatusCode::CREATED, Json(membership))),
        Application::Existing(membership) => Ok((StatusCode::OK, Json(membership))),
    }
}

/// Pending applications: every membership in the club that is not yet a member.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn get_applications(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<Json<Vec<MemberListing>>> {
    let mut conn = db.acquire().await?;
    let (club, membership) = load_club_access(&name, user.id, &mut conn).await?;
    officer_required(membership)?;

    let applications = MemberListing::list(club.id, false, None, &mut conn).await?;
    Ok(Json(applications))
}

/// Members of the club other than the caller.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn get_members(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<Json<Vec<MemberListing>>> {
    let mut conn = db.acquire().await?;
    let (club, membership) = load_club_access(&name, user.id, &mut conn).await?;
    member_required(membership)?;

    let members = MemberListing::list(club.id, true, Some(user.id), &mut conn).await?;
    Ok(Json(members))
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn approve_application(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path((name, membership_id)): Path<(String, i64)>,
) -> AppResult<Json<Membership>> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;
    let actor = officer_required(membership)?;
    let mut target = load_target(membership_id, &mut conn).await?;

    actor.approve_application(&mut target, &mut conn).await?;
    Ok(Json(target))
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn reject_application(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path((name, membership_id)): Path<(String, i64)>,
) -> AppResult<impl IntoResponse> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;
    let actor = officer_required(membership)?;
    let target = load_target(membership_id, &mut conn).await?;

    match actor.reject_application(target, &mut conn).await? {
        Rejection::Removed => Ok(StatusCode::NO_CONTENT.into_response()),
        Rejection::Unchanged(target) => Ok((StatusCode::OK, Json(target)).into_response()),
    }
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn promote_member(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path((name, membership_id)): Path<(String, i64)>,
) -> AppResult<Json<Membership>> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;
    let actor = owner_required(membership)?;
    let mut target = load_target(membership_id, &mut conn).await?;

    actor.promote_member(&mut target, &mut conn).await?;
    Ok(Json(target))
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn demote_officer(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path((name, membership_id)): Path<(String, i64)>,
) -> AppResult<Json<Membership>> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;
    let actor = owner_required(membership)?;
    let mut target = load_target(membership_id, &mut conn).await?;

    actor.demote_officer(&mut target, &mut conn).await?;
    Ok(Json(target))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    pub previous_owner: Membership,
    pub new_owner: Membership,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn transfer_ownership(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path((name, membership_id)): Path<(String, i64)>,
) -> AppResult<Json<OwnershipTransfer>> {
    let mut conn = db.acquire().await?;
    let (_, membership) = load_club_access(&name, user.id, &mut conn).await?;
    let mut actor = owner_required(membership)?;
    let mut target = load_target(membership_id, &mut conn).await?;

    actor.transfer_ownership(&mut target, &mut conn).await?;
    Ok(Json(OwnershipTransfer {
        previous_owner: actor,
        new_owner: target,
    }))
}
