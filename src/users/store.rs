use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult, db};

pub const PLACEHOLDER_AVATAR: &str =
    "https://encrypted-tbn0.gstatic.com/images?q=tbn:ANd9GcTwTjn7ADTGtefL4Im3WluJ6ersByvJf8k7-Q&s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Student,
    Mentor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Mentor => "Mentor",
        }
    }

    fn from_db(value: &str) -> AppResult<Self> {
        match value {
            "Student" => Ok(Self::Student),
            "Mentor" => Ok(Self::Mentor),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "unexpected role value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub description: String,
    pub social_url: String,
    pub profile_picture: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub my_chats: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub social_url: String,
    pub profile_picture: Option<String>,
}

/// Display data attached to messages and conversation listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub name: String,
    pub profile_picture: String,
    pub role: Option<Role>,
}

pub async fn create(db_pool: &SqlitePool, new_user: NewUser) -> AppResult<User> {
    let name = new_user.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidMessage("name must not be empty".to_owned()));
    }

    let created_at = db::now_millis();
    let user = User {
        id: Uuid::now_v7(),
        name: name.to_owned(),
        role: new_user.role,
        description: new_user.description,
        social_url: new_user.social_url,
        profile_picture: new_user
            .profile_picture
            .unwrap_or_else(|| PLACEHOLDER_AVATAR.to_owned()),
        created_at: db::millis_to_datetime(created_at)?,
        my_chats: Vec::new(),
    };

    sqlx::query(
        "INSERT INTO users (id, name, role, description, social_url, profile_picture, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(user.role.as_str())
    .bind(&user.description)
    .bind(&user.social_url)
    .bind(&user.profile_picture)
    .bind(created_at)
    .execute(db_pool)
    .await?;

    Ok(user)
}

pub async fn get(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<User>> {
    let Some((name, role, description, social_url, profile_picture, created_at)) =
        sqlx::query_as::<_, (String, String, String, String, String, i64)>(
            "SELECT name, role, description, social_url, profile_picture, created_at
             FROM users WHERE id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(db_pool)
        .await?
    else {
        return Ok(None);
    };

    Ok(Some(User {
        id: user_id,
        name,
        role: Role::from_db(&role)?,
        description,
        social_url,
        profile_picture,
        created_at: db::millis_to_datetime(created_at)?,
        my_chats: chats_of(db_pool, user_id).await?,
    }))
}

pub async fn list_mentors(db_pool: &SqlitePool) -> AppResult<Vec<User>> {
    let rows: Vec<(String, String, String, String, String, String, i64)> = sqlx::query_as(
        "SELECT id, name, role, description, social_url, profile_picture, created_at
         FROM users WHERE role = 'Mentor' ORDER BY created_at, id",
    )
    .fetch_all(db_pool)
    .await?;

    let mut mentors = Vec::with_capacity(rows.len());
    for (id, name, role, description, social_url, profile_picture, created_at) in rows {
        let id = db::parse_uuid(&id)?;
        mentors.push(User {
            id,
            name,
            role: Role::from_db(&role)?,
            description,
            social_url,
            profile_picture,
            created_at: db::millis_to_datetime(created_at)?,
            my_chats: chats_of(db_pool, id).await?,
        });
    }
    Ok(mentors)
}

/// `None` when the user is gone; callers decide whether that is an error.
pub async fn summary(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<UserSummary>> {
    let Some((name, profile_picture, role)) = sqlx::query_as::<_, (String, String, String)>(
        "SELECT name, profile_picture, role FROM users WHERE id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(db_pool)
    .await?
    else {
        return Ok(None);
    };

    Ok(Some(UserSummary {
        name,
        profile_picture,
        role: Some(Role::from_db(&role)?),
    }))
}

pub fn fallback_summary() -> UserSummary {
    UserSummary {
        name: "Unknown".to_owned(),
        profile_picture: PLACEHOLDER_AVATAR.to_owned(),
        role: None,
    }
}

async fn chats_of(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT conversation_id FROM user_chats WHERE user_id = ? ORDER BY rowid")
            .bind(user_id.to_string())
            .fetch_all(db_pool)
            .await?;

    rows.iter().map(|(id,)| db::parse_uuid(id)).collect()
}
