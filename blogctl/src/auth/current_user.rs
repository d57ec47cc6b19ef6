use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

/// Extract the session token from an `Authorization: Bearer` header
/// Returns:
/// - None: No Authorization header, or not a Bearer token
/// - Some(Ok(token)): A Bearer token is present
/// - Some(Err(error)): The header is present but unreadable
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let value = match header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    value.strip_prefix("Bearer ").map(|token| Ok(token.trim()))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = bearer_token(parts) else {
            trace!("No bearer token in request");
            return Err(Error::Unauthenticated { message: None });
        };

        let user = session::verify_session_token(token?, &state.config)?;
        trace!("Authenticated user {}", user.id);
        Ok(user)
    }
}
