mod club;
pub mod memberships;

pub use club::*;
use memberships::{load_club_access, owner_required, Membership};
use sqlx::{sqlite::SqliteRow, Connection, Row, SqliteConnection};

use crate::{
    auth::CurrentUser,
    error::{is_unique_violation, AppError, AppResult, FieldErrors},
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
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::sqlite::Database;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/", post(create_club))
        .route("/list", get(get_clubs))
        .route("/mine", get(get_my_clubs))
        .route(
            "/{name}",
            get(get_club).put(update_club).delete(delete_club),
        )
        .merge(memberships::router())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateClubParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedClub {
    pub club: Club,
    pub membership: Membership,
}

/// Creates the club and makes the caller its owner in one transaction.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn create_club(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Json(params): Json<CreateClubParams>,
) -> AppResult<impl IntoResponse> {
    let mut errors = FieldErrors::new();
    validate_name(&params.name, &mut errors);
    validate_description(&params.description, &mut errors);
    validate_location(&params.location, &mut errors);
    errors.into_result()?;

    let mut conn = db.acquire().await?;
    let now = Utc::now().naive_utc();
    let mut tx = conn.begin().await?;

    let inserted = sqlx::query_as::<_, Club>(
        r#"
        INSERT INTO clubs (name, description, location, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, name, description, location, created_at, updated_at
        "#,
    )
    .bind(&params.name)
    .bind(&params.description)
    .bind(&params.location)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await;

    let club = match inserted {
        Ok(club) => club,
        Err(err) if is_unique_violation(&err) => {
            let mut errors = FieldErrors::new();
            errors.add("name", "A club with this name already exists");
            return Err(AppError::Validation(errors));
        }
        Err(err) => return Err(err.into()),
    };

    let membership = Membership::create_owner(user.id, club.id, &mut tx).await?;
    tx.commit().await?;

    tracing::info!(club_id = club.id, "Club created");

    Ok((StatusCode::CREATED, Json(CreatedClub { club, membership })))
}

/// A club and the user currently owning it.
#[derive(Debug, Deserialize, Serialize)]
pub struct ClubListing {
    #[serde(flatten)]
    pub club: Club,
    pub owner: Option<UserSummary>,
}

const LISTING_QUERY: &str = r#"
    SELECT c.id, c.name, c.description, c.location, c.created_at, c.updated_at,
           u.id AS owner_id, u.email AS owner_email, u.first_name AS owner_first_name,
           u.last_name AS owner_last_name, u.chess_xp AS owner_chess_xp
    FROM clubs c
    LEFT JOIN memberships m ON m.club_id = c.id AND m.is_owner = 1
    LEFT JOIN users u ON u.id = m.user_id
"#;

impl ClubListing {
    fn from_row(row: &SqliteRow) -> Self {
        let owner = row
            .get::<Option<i64>, _>("owner_id")
            .map(|id| UserSummary {
                id,
                email: row.get("owner_email"),
                first_name: row.get("owner_first_name"),
                last_name: row.get("owner_last_name"),
                chess_xp: row.get("owner_chess_xp"),
            });

        Self {
            club: Club {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                location: row.get("location"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            },
            owner,
        }
    }

    async fn find(name: &str, db: &mut SqliteConnection) -> AppResult<Option<Self>> {
        let listing = sqlx::query(&format!("{LISTING_QUERY} WHERE c.name = ?"))
            .bind(name)
            .fetch_optional(db)
            .await?;

        Ok(listing.as_ref().map(Self::from_row))
    }
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all)]
pub async fn get_clubs(
    State(db): State<Database>,
    CurrentUser(_): CurrentUser,
) -> AppResult<Json<Vec<ClubListing>>> {
    let clubs = sqlx::query(&format!("{LISTING_QUERY} ORDER BY c.name"))
        .fetch_all(db.as_ref())
        .await?
        .iter()
        .map(ClubListing::from_row)
        .collect::<Vec<_>>();

    Ok(Json(clubs))
}

/// Clubs in which the caller is an accepted member, with their owners.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip_all, fields(user_id = user.id))]
pub async fn get_my_clubs(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ClubListing>>> {
    let clubs = sqlx::query(&format!(
        "{LISTING_QUERY} WHERE c.id IN \
         (SELECT club_id FROM memberships WHERE user_id = ? AND is_member = 1) \
         ORDER BY c.name"
    ))
    .bind(user.id)
    .fetch_all(db.as_ref())
    .await?
    .iter()
    .map(ClubListing::from_row)
    .collect::<Vec<_>>();

    Ok(Json(clubs))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClubProfile {
    #[serde(flatten)]
    pub listing: ClubListing,
    pub member_count: i64,
    pub have_applied: bool,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn get_club(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<Json<ClubProfile>> {
    let mut conn = db.acquire().await?;
    let listing = ClubListing::find(&name, &mut conn)
        .await?
        .ok_or(AppError::NotFound("Club"))?;

    let member_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE club_id = ? AND is_member = 1")
            .bind(listing.club.id)
            .fetch_one(&mut *conn)
            .await?;
    let have_applied = Membership::for_user_in_club(user.id, listing.club.id, &mut conn)
        .await?
        .is_some();

    Ok(Json(ClubProfile {
        listing,
        member_count,
        have_applied,
    }))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateClubParams {
    pub description: Option<String>,
    pub location: Option<String>,
}

#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn update_club(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
    Json(params): Json<UpdateClubParams>,
) -> AppResult<Json<Club>> {
    let mut conn = db.acquire().await?;
    let (club, membership) = load_club_access(&name, user.id, &mut conn).await?;
    owner_required(membership)?;

    let mut errors = FieldErrors::new();
    if let Some(description) = &params.description {
        validate_description(description, &mut errors);
    }
    if let Some(location) = &params.location {
        validate_location(location, &mut errors);
    }
    errors.into_result()?;

    let now = Utc::now().naive_utc();

    let mut query = sqlx::QueryBuilder::new(
        r#"
        UPDATE clubs SET
        "#,
    );
    let mut separated = query.separated(", ");
    if let Some(description) = params.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }
    if let Some(location) = params.location {
        separated.push("location = ");
        separated.push_bind_unseparated(location);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(now);
    query.push(" WHERE id = ");
    query.push_bind(club.id);
    tracing::debug!("Query: {}", query.sql());
    query.build().execute(&mut *conn).await?;

    let club = Club::from_name(&club.name, &mut conn)
        .await?
        .ok_or(AppError::NotFound("Club"))?;

    Ok(Json(club))
}

/// Deletes the club. Its memberships go with it through the foreign-key cascade.
#[debug_handler(state = AppState)]
#[tracing::instrument(skip(db, user), fields(user_id = user.id))]
pub async fn delete_club(
    State(db): State<Database>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let mut conn = db.acquire().await?;
    let (club, membership) = load_club_access(&name, user.id, &mut conn).await?;
    owner_required(membership)?;

    sqlx::query("DELETE FROM clubs WHERE id = ?")
        .bind(club.id)
        .execute(&mut *conn)
        .await?;

    tracing::info!(club_id = club.id, "Club deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::tests::{create_test_app, membership_count};
    use crate::users::test::{auth_header, sign_up_params, sign_up_test_user, sign_up_user};
    use axum_test::TestServer;
    use serde_json::Value;
    use tracing_test::traced_test;

    pub async fn create_club(
        server: &TestServer,
        token: &str,
        club: &CreateClubParams,
    ) -> CreatedClub {
        let (name, value) = auth_header(token);
        let response = server.post("/clubs").add_header(name, value).json(club).await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    pub async fn create_test_club(server: &TestServer, token: &str, name: &str) -> Club {
        create_club(
            server,
            token,
            &CreateClubParams {
                name: name.to_string(),
                description: "Test Description".to_string(),
                location: "London".to_string(),
            },
        )
        .await
        .club
    }

    #[tokio::test]
    #[traced_test]
    async fn test_create_club_makes_creator_owner() {
        let (server, _) = create_test_app().await;
        let (user, token) = sign_up_test_user(&server).await;

        let CreatedClub { club, membership } = create_club(
            &server,
            &token,
            &CreateClubParams {
                name: "TheGrand".to_string(),
                description: "Test Description".to_string(),
                location: "London".to_string(),
            },
        )
        .await;

        assert_eq!(club.name, "TheGrand");
        assert_eq!(club.location, "London");
        assert_eq!(membership.user_id, user.id);
        assert_eq!(membership.club_id, club.id);
        assert!(membership.is_applicant);
        assert!(membership.is_member);
        assert!(membership.is_officer);
        assert!(membership.is_owner);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_create_club_requires_authentication() {
        let (server, _) = create_test_app().await;

        let response = server
            .post("/clubs")
            .json(&CreateClubParams {
                name: "TheGrand".to_string(),
                description: String::new(),
                location: "London".to_string(),
            })
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_create_club_rejects_duplicate_name() {
        let (server, db) = create_test_app().await;
        let (_, token) = sign_up_test_user(&server).await;
        create_test_club(&server, &token, "TheGrand").await;
        let before = membership_count(&db).await;

        let (name, value) = auth_header(&token);
        let response = server
            .post("/clubs")
            .add_header(name, value)
            .json(&CreateClubParams {
                name: "TheGrand".to_string(),
                description: String::new(),
                location: "Paris".to_string(),
            })
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert!(body["errors"]["name"].is_array());
        assert_eq!(membership_count(&db).await, before);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_create_club_rejects_invalid_fields() {
        let (server, _) = create_test_app().await;
        let (_, token) = sign_up_test_user(&server).await;

        let (name, value) = auth_header(&token);
        let response = server
            .post("/clubs")
            .add_header(name, value)
            .json(&CreateClubParams {
                name: "x".repeat(21),
                description: String::new(),
                location: String::new(),
            })
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert!(body["errors"]["name"].is_array());
        assert!(body["errors"]["location"].is_array());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_get_clubs_lists_owner() {
        let (server, _) = create_test_app().await;
        let (user, token) = sign_up_test_user(&server).await;
        create_test_club(&server, &token, "TheGrand").await;

        let (name, value) = auth_header(&token);
        let response = server.get("/clubs/list").add_header(name, value).await;
        response.assert_status(StatusCode::OK);
        let clubs: Vec<ClubListing> = response.json();
        assert_eq!(clubs.len(), 1);
        assert_eq!(clubs[0].club.name, "TheGrand");
        assert_eq!(clubs[0].owner.as_ref().map(|owner| owner.id), Some(user.id));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_my_clubs_only_lists_joined_clubs() {
        let (server, _) = create_test_app().await;
        let (_, owner_token) = sign_up_test_user(&server).await;
        let (_, other_token) =
            sign_up_user(&server, sign_up_params("janedoe1@example.org")).await;
        create_test_club(&server, &owner_token, "TheGrand").await;
        create_test_club(&server, &other_token, "ClubB").await;

        let (name, value) = auth_header(&other_token);
        server
            .post("/clubs/TheGrand/applications")
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::CREATED);

        // A pending application does not count as joining.
        let response = server.get("/clubs/mine").add_header(name, value).await;
        response.assert_status(StatusCode::OK);
        let clubs: Vec<ClubListing> = response.json();
        assert_eq!(clubs.len(), 1);
        assert_eq!(clubs[0].club.name, "ClubB");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_club_profile() {
        let (server, _) = create_test_app().await;
        let (_, owner_token) = sign_up_test_user(&server).await;
        let (_, other_token) =
            sign_up_user(&server, sign_up_params("janedoe1@example.org")).await;
        create_test_club(&server, &owner_token, "TheGrand").await;

        let (name, value) = auth_header(&other_token);
        let response = server
            .get("/clubs/TheGrand")
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status(StatusCode::OK);
        let profile: ClubProfile = response.json();
        assert_eq!(profile.member_count, 1);
        assert!(!profile.have_applied);
        assert!(profile.listing.owner.is_some());

        server
            .post("/clubs/TheGrand/applications")
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.get("/clubs/TheGrand").add_header(name, value).await;
        let profile: ClubProfile = response.json();
        assert_eq!(profile.member_count, 1);
        assert!(profile.have_applied);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_club_is_not_found() {
        let (server, _) = create_test_app().await;
        let (_, token) = sign_up_test_user(&server).await;

        let (name, value) = auth_header(&token);
        let response = server.get("/clubs/Nowhere").add_header(name, value).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_update_club_as_owner() {
        let (server, _) = create_test_app().await;
        let (_, token) = sign_up_test_user(&server).await;
        create_test_club(&server, &token, "TheGrand").await;

        let (name, value) = auth_header(&token);
        let response = server
            .put("/clubs/TheGrand")
            .add_header(name, value)
            .json(&UpdateClubParams {
                description: Some("Updated Description".to_string()),
                ..Default::default()
            })
            .await;

        response.assert_status(StatusCode::OK);
        let club: Club = response.json();
        assert_eq!(club.description, "Updated Description");
        assert_eq!(club.location, "London");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_delete_club_requires_owner() {
        let (server, _) = create_test_app().await;
        let (_, owner_token) = sign_up_test_user(&server).await;
        let (_, other_token) =
            sign_up_user(&server, sign_up_params("janedoe1@example.org")).await;
        create_test_club(&server, &owner_token, "TheGrand").await;

        let (name, value) = auth_header(&other_token);
        let response = server.delete("/clubs/TheGrand").add_header(name, value).await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_delete_club_cascades_to_memberships() {
        let (server, db) = create_test_app().await;
        let (_, owner_token) = sign_up_test_user(&server).await;
        let (_, other_token) =
            sign_up_user(&server, sign_up_params("janedoe1@example.org")).await;
        create_test_club(&server, &owner_token, "TheGrand").await;
        create_test_club(&server, &other_token, "ClubB").await;

        let (other_name, other_value) = auth_header(&other_token);
        server
            .post("/clubs/TheGrand/applications")
            .add_header(other_name, other_value)
            .await
            .assert_status(StatusCode::CREATED);
        let before = membership_count(&db).await;

        let (name, value) = auth_header(&owner_token);
        let response = server
            .delete("/clubs/TheGrand")
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        // The owner's membership and the pending application.
        assert_eq!(membership_count(&db).await, before - 2);

        let response = server.get("/clubs/TheGrand").add_header(name, value).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
