//! Database models for posts.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::api::models::posts::{PostCreate, PostUpdate};
use crate::db::{
    models::{Audit, with_audit},
    schema::{Entity, EntitySchema, FieldKind, ScalarType},
    value::{SqlField, SqlValue, coerce},
};
use crate::types::{CategoryId, PostId, TagId, UserId};

/// Publication state of a post, stored by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

impl SqlField for PostStatus {
    fn kind() -> FieldKind {
        FieldKind::Enum
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.as_str().to_string())
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match coerce(value, ScalarType::Text)? {
            SqlValue::Text(name) => name.parse().map_err(|_| SqlValue::Text(name)),
            other => Err(other),
        }
    }
}

impl From<PostStatus> for SqlValue {
    fn from(status: PostStatus) -> Self {
        status.to_sql()
    }
}

/// A post row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub slug: Option<String>,
    pub status: Option<PostStatus>,
    pub is_published: Option<bool>,
    pub tag_ids: Option<Vec<TagId>>,
    pub summary: Option<String>,
    /// Rendered body, stored as a JSON document
    pub content: Option<String>,
    /// Source path of the post on disk
    pub path: Option<String>,
    pub category_id: Option<CategoryId>,
    pub audit: Audit,
}

impl Entity for Post {
    type Key = PostId;

    fn schema() -> EntitySchema<Self> {
        with_audit(
            EntitySchema::<Self>::new()
                .table("posts")
                .key("id", |p| &p.id, |p| &mut p.id)
                .field("title", |p| &p.title, |p| &mut p.title)
                .field("author", |p| &p.author, |p| &mut p.author)
                .field("slug", |p| &p.slug, |p| &mut p.slug)
                .field("status", |p| &p.status, |p| &mut p.status)
                .field("is_published", |p| &p.is_published, |p| &mut p.is_published)
                .field("tag_ids", |p| &p.tag_ids, |p| &mut p.tag_ids)
                .field("summary", |p| &p.summary, |p| &mut p.summary)
                .json("content", |p| &p.content, |p| &mut p.content)
                .field("path", |p| &p.path, |p| &mut p.path)
                .field("category_id", |p| &p.category_id, |p| &mut p.category_id),
        )
    }
}

/// Fields selected for post listings; the content is left out
pub const SUMMARY_FIELDS: &[&str] = &[
    "id",
    "title",
    "author",
    "slug",
    "status",
    "is_published",
    "tag_ids",
    "summary",
    "category_id",
    "created_at",
    "updated_at",
];

/// Database request for creating a new post
#[derive(Debug, Clone)]
pub struct PostCreateDBRequest {
    pub title: String,
    pub author: Option<String>,
    pub slug: String,
    pub status: PostStatus,
    pub tag_ids: Vec<TagId>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub path: Option<String>,
    pub category_id: Option<CategoryId>,
    pub created_by: UserId,
}

/// Database request for updating a post; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct PostUpdateDBRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub slug: Option<String>,
    pub status: Option<PostStatus>,
    pub tag_ids: Option<Vec<TagId>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub path: Option<String>,
    pub category_id: Option<CategoryId>,
    pub updated_by: UserId,
}

impl PostCreateDBRequest {
    /// `author` is used when the request names no author of its own
    pub fn new(api: PostCreate, author: &str, created_by: UserId) -> Self {
        Self {
            title: api.title,
            author: Some(api.author.unwrap_or_else(|| author.to_string())),
            slug: api.slug,
            status: api.status,
            tag_ids: api.tag_ids,
            summary: api.summary,
            content: api.content,
            path: api.path,
            category_id: api.category_id,
            created_by,
        }
    }
}

impl PostUpdateDBRequest {
    pub fn new(api: PostUpdate, updated_by: UserId) -> Self {
        Self {
            title: api.title,
            author: api.author,
            slug: api.slug,
            status: api.status,
            tag_ids: api.tag_ids,
            summary: api.summary,
            content: api.content,
            path: api.path,
            category_id: api.category_id,
            updated_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{SqlType, describe};

    #[test]
    fn test_post_schema() {
        let descriptor = describe::<Post>().unwrap();
        let table = descriptor.table();
        let type_of = |field: &str| table.by_field(field).unwrap().1.sql_type;

        assert_eq!(table.table, "posts");
        assert_eq!(type_of("status"), SqlType::Scalar(ScalarType::Text));
        assert_eq!(type_of("tag_ids"), SqlType::Array(ScalarType::BigInt));
        assert_eq!(type_of("content"), SqlType::Json);
        assert_eq!(type_of("category_id"), SqlType::Scalar(ScalarType::BigInt));
        for field in SUMMARY_FIELDS {
            assert!(table.by_field(field).is_some(), "{field}");
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!(PostStatus::Published.to_sql(), SqlValue::Text("published".to_string()));
        assert_eq!(
            PostStatus::from_sql(SqlValue::Text("Archived".to_string())),
            Ok(PostStatus::Archived)
        );
        assert!(PostStatus::from_sql(SqlValue::Text("pending".to_string())).is_err());
        assert!(PostStatus::from_sql(SqlValue::Integer(1)).is_err());
    }
}
