//! API request and response data models.
//!
//! These structures define the public JSON contract and are kept apart from the database
//! records in [`crate::db::models`], so storage and API can evolve independently. All of them
//! derive `utoipa::ToSchema` for the OpenAPI document.
//!
//! - [`posts`]: Post creation, partial updates, listing summaries and resolved details
//! - [`tags`] and [`categories`]: Taxonomy payloads
//! - [`users`]: Profiles and the authenticated [`users::CurrentUser`]
//! - [`auth`]: Login and password change payloads
//! - [`images`]: Image upload results and presigned URLs
//! - [`pagination`]: Page-based query parameters and the paginated envelope

pub mod auth;
pub mod categories;
pub mod images;
pub mod pagination;
pub mod posts;
pub mod tags;
pub mod users;
