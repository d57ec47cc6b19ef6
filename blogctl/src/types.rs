//! Common type definitions.
//!
//! All entity IDs are database-generated `BIGINT` keys wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`PostId`]: Blog post identifier
//! - [`TagId`]: Tag identifier
//! - [`CategoryId`]: Category identifier

// Type aliases for IDs
pub type UserId = i64;
pub type PostId = i64;
pub type TagId = i64;
pub type CategoryId = i64;

/// Id recorded as author of rows written by the system itself (initial admin, seeding)
pub const SYSTEM_USER_ID: UserId = 0;
