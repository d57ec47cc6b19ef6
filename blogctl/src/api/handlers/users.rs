use crate::api::models::users::{CurrentUser, UserResponse, UserUpdate};
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::UserUpdateDBRequest;
use crate::errors::{Error, Result};
use crate::AppState;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/users/current",
    tag = "users",
    summary = "Get current user",
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "The account no longer exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(state.registry.mapper(&mut conn)?);

    let user = repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: current_user.id.to_string(),
    })?;
    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    patch,
    path = "/users/current",
    tag = "users",
    summary = "Update current user",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "The account no longer exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_current_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(state.registry.mapper(&mut conn)?);

    let user = repo
        .update(current_user.id, &UserUpdateDBRequest::new(update, current_user.id))
        .await?;
    Ok(Json(UserResponse::from(user)))
}
