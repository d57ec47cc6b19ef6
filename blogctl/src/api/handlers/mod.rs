//! HTTP request handlers for all API endpoints.
//!
//! Handlers are organized by resource type. Each one deserializes the request, borrows a pooled
//! connection, builds the repositories it needs from the shared
//! [`SchemaRegistry`](crate::db::registry::SchemaRegistry) and serializes the response.
//!
//! # Handler Modules
//!
//! - [`auth`]: Login and password change
//! - [`posts`]: Post CRUD, lookup by slug, and resolution of tags and category
//! - [`tags`]: Tag CRUD
//! - [`categories`]: Category CRUD
//! - [`users`]: The authenticated user's own profile
//! - [`images`]: Image upload and presigned URLs
//!
//! # Authentication
//!
//! Reads are public. Handlers that write take a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! argument, which rejects the request with 401 unless it carries a valid bearer token.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP status code.

pub mod auth;
pub mod categories;
pub mod images;
pub mod posts;
pub mod tags;
pub mod users;
