use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::error::{AppResult, FieldErrors};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Club {
    pub async fn from_name(name: &str, db: &mut SqliteConnection) -> AppResult<Option<Self>> {
        let club = sqlx::query_as::<_, Club>(
            r#"
            SELECT id, name, description, location, created_at, updated_at
            FROM clubs
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(db)
        .await?;

        Ok(club)
    }

    /// Clubs in which `user_id` is an accepted member.
    pub async fn joined_by(user_id: i64, db: &mut SqliteConnection) -> AppResult<Vec<Self>> {
        let clubs = sqlx::query_as::<_, Club>(
            r#"
            SELECT c.id, c.name, c.description, c.location, c.created_at, c.updated_at
            FROM clubs c
            JOIN memberships m ON m.club_id = c.id
            WHERE m.user_id = ? AND m.is_member = 1
            ORDER BY c.name
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(clubs)
    }
}

const NAME_MAX: usize = 20;
const DESCRIPTION_MAX: usize = 520;
const LOCATION_MAX: usize = 20;
// Collide with the `/clubs/list` and `/clubs/mine` routes.
const RESERVED_NAMES: [&str; 2] = ["list", "mine"];

pub fn validate_name(name: &str, errors: &mut FieldErrors) {
    if name.trim().is_empty() {
        errors.add("name", "Club name is required");
    } else if name.chars().count() > NAME_MAX {
        errors.add("name", format!("Club name must be at most {NAME_MAX} characters"));
    } else if name.contains('/') {
        errors.add("name", "Club name cannot contain '/'");
    } else if RESERVED_NAMES.contains(&name) {
        errors.add("name", "This club name is reserved");
    }
}

pub fn validate_description(description: &str, errors: &mut FieldErrors) {
    if description.chars().count() > DESCRIPTION_MAX {
        errors.add(
            "description",
            format!("Description must be at most {DESCRIPTION_MAX} characters"),
        );
    }
}

pub fn validate_location(location: &str, errors: &mut FieldErrors) {
    if location.trim().is_empty() {
        errors.add("location", "Location is required");
    } else if location.chars().count() > LOCATION_MAX {
        errors.add(
            "location",
            format!("Location must be at most {LOCATION_MAX} characters"),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_club_field_limits() {
        let mut errors = FieldErrors::new();
        validate_name("TheGrand", &mut errors);
        validate_description("", &mut errors);
        validate_location("London", &mut errors);
        assert!(errors.is_empty());

        validate_name(&"x".repeat(21), &mut errors);
        validate_description(&"x".repeat(521), &mut errors);
        validate_location("", &mut errors);
        assert!(errors.contains("name"));
        assert!(errors.contains("description"));
        assert!(errors.contains("location"));
    }

    #[test]
    fn test_club_name_cannot_break_routes() {
        let mut errors = FieldErrors::new();
        validate_name("a/b", &mut errors);
        assert!(errors.contains("name"));

        let mut errors = FieldErrors::new();
        validate_name("mine", &mut errors);
        assert!(errors.contains("name"));
    }
}
