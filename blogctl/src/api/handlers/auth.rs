use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{
        auth::{AuthSuccessResponse, ChangePasswordRequest, LoginRequest, LoginResponse},
        users::CurrentUser,
    },
    auth::{password, session},
    db::{
        handlers::{Repository, Users},
        models::users::UserUpdateDBRequest,
    },
    errors::Error,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
    }
}

/// Exchange a username and password for a session token
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "authentication"
)]
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<LoginResponse>, Error> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(state.registry.mapper(&mut pool_conn)?);

    let user = user_repo
        .get_by_username(&request.username)
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    // Verify password on a blocking thread to avoid blocking async runtime
    let password = request.password;
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(invalid_credentials());
    }

    let (token, expires_at) = session::create_session_token(&CurrentUser::from(&user), &state.config)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse { token, expires_at }))
}

/// Change password for the authenticated user
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "New password is out of bounds, or the account has no password"),
        (status = 401, description = "Not logged in, or current password is incorrect"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    let password_config = &state.config.auth.password;
    let length = request.new_password.chars().count();
    if length < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if length > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(state.registry.mapper(&mut pool_conn)?);

    let user = user_repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::Unauthenticated {
        message: Some("User not found".to_string()),
    })?;

    let hash = user.password_hash.ok_or_else(|| Error::BadRequest {
        message: "This account has no password to change".to_string(),
    })?;

    let current_password = request.current_password;
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&current_password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let params = password_config.argon2_params();
    let new_password = request.new_password;
    let new_password_hash = tokio::task::spawn_blocking(move || password::hash_string_with_params(&new_password, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })??;

    let update_request = UserUpdateDBRequest {
        email: None,
        avatar_url: None,
        motto: None,
        password_hash: Some(new_password_hash),
        updated_by: current_user.id,
    };
    user_repo.update(current_user.id, &update_request).await?;
    tracing::info!(user_id = current_user.id, "Password changed");

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}
