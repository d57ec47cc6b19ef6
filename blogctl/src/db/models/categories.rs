//! Database models for categories.

use crate::api::models::categories::{CategoryCreate, CategoryUpdate};
use crate::db::{
    models::{Audit, with_audit},
    schema::{Entity, EntitySchema},
};
use crate::types::{CategoryId, UserId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub audit: Audit,
}

impl Entity for Category {
    type Key = CategoryId;

    fn schema() -> EntitySchema<Self> {
        with_audit(
            EntitySchema::<Self>::new()
                .table("categories")
                .key("id", |c| &c.id, |c| &mut c.id)
                .field("name", |c| &c.name, |c| &mut c.name)
                .field("description", |c| &c.description, |c| &mut c.description),
        )
    }
}

/// Database request for creating a new category
#[derive(Debug, Clone)]
pub struct CategoryCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub created_by: UserId,
}

impl CategoryCreateDBRequest {
    pub fn new(api: CategoryCreate, created_by: UserId) -> Self {
        Self {
            name: api.name,
            description: api.description,
            created_by,
        }
    }
}

/// Database request for updating a category
#[derive(Debug, Clone)]
pub struct CategoryUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub updated_by: UserId,
}

impl CategoryUpdateDBRequest {
    pub fn new(api: CategoryUpdate, updated_by: UserId) -> Self {
        Self {
            name: api.name,
            description: api.description,
            updated_by,
        }
    }
}
