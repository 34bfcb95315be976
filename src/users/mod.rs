pub mod store;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState};
use store::{NewUser, Role, User};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{user_id}", get(user))
        .route("/api/mentors", get(mentors))
        .route("/api/mentors/{user_id}", get(mentor))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_user(
    State(db_pool): State<SqlitePool>,
    Json(new_user): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = store::create(&db_pool, new_user).await?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn user(
    State(db_pool): State<SqlitePool>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let Some(user) = store::get(&db_pool, user_id).await? else {
        return Err(AppError::NotFound("user"));
    };
    Ok(Json(user))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mentors(State(db_pool): State<SqlitePool>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(store::list_mentors(&db_pool).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mentor(
    State(db_pool): State<SqlitePool>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    match store::get(&db_pool, user_id).await? {
        Some(user) if user.role == Role::Mentor => Ok(Json(user)),
        _ => Err(AppError::NotFound("mentor")),
    }
}
