//! Authentication.
//!
//! Users log in with a username and password at `/api/v1/authentication/login` and receive a
//! signed JWT. Every write endpoint expects it back in an `Authorization: Bearer <token>` header.
//! Reads are public.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor that turns the bearer token into a [`CurrentUser`]
//! - [`password`]: Password hashing and verification using Argon2
//! - [`session`]: Session token creation and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use blogctl::api::models::users::CurrentUser;
//!
//! async fn protected_handler(current_user: CurrentUser) -> Result<String> {
//!     Ok(format!("Hello, {}!", current_user.username))
//! }
//! ```
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser

pub mod current_user;
pub mod password;
pub mod session;
