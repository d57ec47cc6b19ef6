//! Database models for users.

use crate::api::models::users::UserUpdate;
use crate::db::{
    models::{Audit, with_audit},
    schema::{Entity, EntitySchema},
};
use crate::types::UserId;

/// A user row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub motto: Option<String>,
    pub audit: Audit,
}

impl Entity for User {
    type Key = UserId;

    fn schema() -> EntitySchema<Self> {
        with_audit(
            EntitySchema::<Self>::new()
                .table("users")
                .key("id", |u| &u.id, |u| &mut u.id)
                .field("username", |u| &u.username, |u| &mut u.username)
                .field("password_hash", |u| &u.password_hash, |u| &mut u.password_hash)
                .field("email", |u| &u.email, |u| &mut u.email)
                .field("avatar_url", |u| &u.avatar_url, |u| &mut u.avatar_url)
                .field("motto", |u| &u.motto, |u| &mut u.motto),
        )
    }
}

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub motto: Option<String>,
    pub created_by: UserId,
}

/// Database request for updating a user
#[derive(Debug, Clone)]
pub struct UserUpdateDBRequest {
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub motto: Option<String>,
    pub password_hash: Option<String>,
    pub updated_by: UserId,
}

impl UserUpdateDBRequest {
    pub fn new(update: UserUpdate, updated_by: UserId) -> Self {
        Self {
            email: update.email,
            avatar_url: update.avatar_url,
            motto: update.motto,
            password_hash: None, // Regular updates don't include password changes
            updated_by,
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, PartialEq)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub motto: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: Option<chrono::NaiveDateTime>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar_url: user.avatar_url,
            motto: user.motto,
            password_hash: user.password_hash,
            created_at: user.audit.created_at,
            updated_at: user.audit.updated_at,
        }
    }
}
