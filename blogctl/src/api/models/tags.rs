//! API request/response models for tags.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::tags::Tag;
use crate::types::TagId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagCreate {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagUpdate {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TagResponse {
    pub id: TagId,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            created_at: tag.audit.created_at,
            updated_at: tag.audit.updated_at,
        }
    }
}
