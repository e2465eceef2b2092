use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::error::{AppResult, FieldErrors};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub statement: String,
    pub chess_xp: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The public face of a user shown in club listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub chess_xp: i64,
}

impl User {
    pub async fn from_id(id: i64, db: &mut SqliteConnection) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, bio, statement, chess_xp,
                   created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(user)
    }

    pub async fn email_taken(
        email: &str,
        except_id: Option<i64>,
        db: &mut SqliteConnection,
    ) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE email = ? COLLATE NOCASE AND id IS NOT ?",
        )
        .bind(email)
        .bind(except_id)
        .fetch_one(db)
        .await?;

        Ok(count > 0)
    }
}

const NAME_MAX: usize = 50;
const BIO_MAX: usize = 520;
const STATEMENT_MAX: usize = 1000;
const EMAIL_MAX: usize = 254;

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

pub fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.trim().is_empty() {
        errors.add("email", "Email is required");
    } else if email.chars().count() > EMAIL_MAX {
        errors.add("email", format!("Email must be at most {EMAIL_MAX} characters"));
    } else if !looks_like_email(email) {
        errors.add("email", "Enter a valid email address");
    }
}

pub fn validate_name(field: &'static str, value: &str, errors: &mut FieldErrors) {
    if value.trim().is_empty() {
        errors.add(field, "This field is required");
    } else if value.chars().count() > NAME_MAX {
        errors.add(field, format!("Must be at most {NAME_MAX} characters"));
    }
}

pub fn validate_bio(bio: &str, errors: &mut FieldErrors) {
    if bio.chars().count() > BIO_MAX {
        errors.add("bio", format!("Bio must be at most {BIO_MAX} characters"));
    }
}

pub fn validate_statement(statement: &str, errors: &mut FieldErrors) {
    if statement.trim().is_empty() {
        errors.add("statement", "Statement is required");
    } else if statement.chars().count() > STATEMENT_MAX {
        errors.add(
            "statement",
            format!("Statement must be at most {STATEMENT_MAX} characters"),
        );
    }
}

pub fn validate_chess_xp(chess_xp: i64, errors: &mut FieldErrors) {
    if chess_xp < 0 {
        errors.add("chess_xp", "Chess experience cannot be negative");
    }
}
