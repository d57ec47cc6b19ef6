//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL. Instead of
//! hand-written queries and migrations, each table is described once by an [`Entity`]
//! declaration and everything else is derived from it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - per-table logic)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐     ┌──────────────┐
//! │   Mapper    │ ←── │   Registry   │  (descriptors built once at startup)
//! └──────┬──────┘     └──────────────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`schema`]: Entity declarations, SQL type derivation and schema descriptors
//! - [`value`]: Runtime column values and their conversion to and from sqlx
//! - [`predicate`]: Filter predicates and their translation into `WHERE` clauses
//! - [`registry`]: The startup-built set of entity descriptors
//! - [`mapper`]: Generic CRUD and pagination for any entity
//! - [`initializer`]: Creates missing tables and validates existing ones
//! - [`handlers`]: Repository implementations for each table
//! - [`models`]: Database record structures
//! - [`errors`]: Database-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use blogctl::db::handlers::{Repository, Users};
//!
//! async fn example(pool: &sqlx::PgPool, registry: &SchemaRegistry) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut users = Users::new(registry.mapper(&mut conn)?);
//!
//!     if let Some(user) = users.get_by_username("admin").await? {
//!         println!("Found user: {}", user.username);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Schema Management
//!
//! There are no migrations. On startup [`initializer::SchemaInitializer`] creates every
//! registered table that does not exist yet and checks that existing tables still have every
//! declared column with a compatible type. Existing tables are never altered.

pub mod errors;
pub mod handlers;
pub mod initializer;
pub mod mapper;
pub mod models;
pub mod predicate;
pub mod registry;
pub mod schema;
pub mod value;

pub use schema::Entity;
