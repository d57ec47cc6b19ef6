//! Database models for tags.

use crate::api::models::tags::{TagCreate, TagUpdate};
use crate::db::{
    models::{Audit, with_audit},
    schema::{Entity, EntitySchema},
};
use crate::types::{TagId, UserId};

/// A tag row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: TagId,
    pub name: Option<String>,
    pub audit: Audit,
}

impl Entity for Tag {
    type Key = TagId;

    fn schema() -> EntitySchema<Self> {
        with_audit(
            EntitySchema::<Self>::new()
                .table("tags")
                .key("id", |t| &t.id, |t| &mut t.id)
                .field("name", |t| &t.name, |t| &mut t.name),
        )
    }
}

/// Database request for creating a new tag
#[derive(Debug, Clone)]
pub struct TagCreateDBRequest {
    pub name: String,
    pub created_by: UserId,
}

impl TagCreateDBRequest {
    pub fn new(api: TagCreate, created_by: UserId) -> Self {
        Self {
            name: api.name,
            created_by,
        }
    }
}

/// Database request for updating a tag
#[derive(Debug, Clone)]
pub struct TagUpdateDBRequest {
    pub name: Option<String>,
    pub updated_by: UserId,
}

impl TagUpdateDBRequest {
    pub fn new(api: TagUpdate, updated_by: UserId) -> Self {
        Self {
            name: api.name,
            updated_by,
        }
    }
}
