//! Repository implementations for database access.
//!
//! This module provides repository structs for each entity in the blog.
//! Repositories follow a consistent pattern and implement the [`Repository`] trait.
//!
//! # Design Pattern
//!
//! Each repository:
//! - Wraps a [`Mapper`](crate::db::mapper::Mapper) over a borrowed connection
//! - Provides strongly-typed CRUD operations
//! - Stamps the audit columns on create and update
//! - Returns domain models from [`crate::db::models`]
//!
//! # Available Repositories
//!
//! - [`Users`]: User accounts and credentials
//! - [`Posts`]: Blog posts
//! - [`Tags`]: Post tags
//! - [`Categories`]: Post categories
//!
//! # Common Pattern
//!
//! ```ignore
//! use blogctl::db::handlers::{Repository, Tags};
//!
//! async fn example(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = state.db.acquire().await?;
//!     let mut tags = Tags::new(state.registry.mapper(&mut conn)?);
//!
//!     let page = tags.list(&PageFilter::new(1, 20)).await?;
//!     Ok(())
//! }
//! ```

pub mod categories;
pub mod posts;
pub mod repository;
pub mod tags;
pub mod users;

pub use categories::Categories;
pub use posts::Posts;
pub use repository::{PageFilter, Repository};
pub use tags::Tags;
pub use users::Users;
