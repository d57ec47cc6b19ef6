//! Database record models matching table schemas.
//!
//! Each model is an [`Entity`]: it declares its table once through
//! [`Entity::schema`] and the [`Mapper`](crate::db::mapper::Mapper) derives every statement from
//! that declaration. Tables are created (or validated) at startup by the
//! [`SchemaInitializer`](crate::db::initializer::SchemaInitializer).
//!
//! # Design Principles
//!
//! - **Schema Mapping**: Each model struct matches a database table schema
//! - **Separation**: Database models are distinct from API models to allow
//!   independent evolution of storage and API representations
//! - **Audit Columns**: Every table carries the same [`Audit`] columns
//!
//! # Models
//!
//! - [`users`]: User accounts and credentials
//! - [`posts`]: Blog posts
//! - [`tags`]: Post tags
//! - [`categories`]: Post categories

use chrono::{NaiveDateTime, SubsecRound, Utc};

use crate::{
    db::schema::{Entity, EntitySchema},
    types::UserId,
};

pub mod categories;
pub mod posts;
pub mod tags;
pub mod users;

/// Current time at the microsecond precision PostgreSQL stores
fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

/// Bookkeeping columns shared by every table
#[derive(Debug, Clone, PartialEq)]
pub struct Audit {
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub created_by: UserId,
    pub updated_by: Option<UserId>,
    pub is_deleted: bool,
}

impl Audit {
    /// Audit columns of a row created now by `user`
    pub fn created_by(user: UserId) -> Self {
        Self {
            created_by: user,
            ..Self::default()
        }
    }

    /// Stamp a modification by `user`
    pub fn touch(&mut self, user: UserId) {
        self.updated_at = Some(now());
        self.updated_by = Some(user);
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self {
            created_at: now(),
            updated_at: None,
            created_by: 0,
            updated_by: None,
            is_deleted: false,
        }
    }
}

/// Entities carrying [`Audit`] columns
pub trait Audited {
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;
}

/// Append the audit columns to an entity schema
pub(crate) fn with_audit<T: Entity + Audited>(schema: EntitySchema<T>) -> EntitySchema<T> {
    schema
        .field(
            "created_at",
            |e: &T| &e.audit().created_at,
            |e: &mut T| &mut e.audit_mut().created_at,
        )
        .field(
            "updated_at",
            |e: &T| &e.audit().updated_at,
            |e: &mut T| &mut e.audit_mut().updated_at,
        )
        .field(
            "created_by",
            |e: &T| &e.audit().created_by,
            |e: &mut T| &mut e.audit_mut().created_by,
        )
        .field(
            "updated_by",
            |e: &T| &e.audit().updated_by,
            |e: &mut T| &mut e.audit_mut().updated_by,
        )
        .field(
            "is_deleted",
            |e: &T| &e.audit().is_deleted,
            |e: &mut T| &mut e.audit_mut().is_deleted,
        )
}

macro_rules! audited {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::db::models::Audited for $ty {
                fn audit(&self) -> &$crate::db::models::Audit {
                    &self.audit
                }

                fn audit_mut(&mut self) -> &mut $crate::db::models::Audit {
                    &mut self.audit
                }
            }
        )*
    };
}

audited!(tags::Tag, categories::Category, posts::Post, users::User);
