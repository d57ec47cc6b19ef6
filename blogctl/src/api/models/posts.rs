//! API request/response models for posts.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{categories::CategoryResponse, tags::TagResponse};
use crate::db::models::posts::{Post, PostStatus};
use crate::types::{CategoryId, PostId, TagId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCreate {
    pub title: String,
    /// Defaults to the caller's username
    pub author: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub path: Option<String>,
    pub category_id: Option<CategoryId>,
}

/// Partial update; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub slug: Option<String>,
    pub status: Option<PostStatus>,
    pub tag_ids: Option<Vec<TagId>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub path: Option<String>,
    pub category_id: Option<CategoryId>,
}

/// A post as it appears in listings, without its content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PostSummary {
    pub id: PostId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub slug: Option<String>,
    pub status: Option<PostStatus>,
    pub is_published: bool,
    pub tag_ids: Vec<TagId>,
    pub summary: Option<String>,
    pub category_id: Option<CategoryId>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<Post> for PostSummary {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            author: post.author,
            slug: post.slug,
            status: post.status,
            is_published: post.is_published.unwrap_or(false),
            tag_ids: post.tag_ids.unwrap_or_default(),
            summary: post.summary,
            category_id: post.category_id,
            created_at: post.audit.created_at,
            updated_at: post.audit.updated_at,
        }
    }
}

/// A full post with its tags and category resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostSummary,
    pub content: Option<String>,
    pub path: Option<String>,
    /// Tags that still exist, in the order the post lists them
    pub tags: Vec<TagResponse>,
    pub category: Option<CategoryResponse>,
}

impl PostDetail {
    pub fn new(post: Post, tags: Vec<TagResponse>, category: Option<CategoryResponse>) -> Self {
        let content = post.content.clone();
        let path = post.path.clone();
        Self {
            post: PostSummary::from(post),
            content,
            path,
            tags,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Audit;

    #[test]
    fn test_create_defaults() {
        let create: PostCreate = serde_json::from_value(serde_json::json!({
            "title": "Hello",
            "slug": "hello"
        }))
        .unwrap();
        assert_eq!(create.status, PostStatus::Draft);
        assert!(create.tag_ids.is_empty());
        assert!(create.author.is_none());
    }

    #[test]
    fn test_detail_flattens_summary() {
        let post = Post {
            id: 7,
            title: Some("Hello".into()),
            slug: Some("hello".into()),
            status: Some(PostStatus::Published),
            is_published: Some(true),
            tag_ids: Some(vec![1]),
            content: Some("body".into()),
            audit: Audit::created_by(1),
            ..Default::default()
        };
        let detail = PostDetail::new(post, vec![], None);
        let json = serde_json::to_value(&detail).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "published");
        assert_eq!(json["is_published"], true);
        assert_eq!(json["content"], "body");
        assert_eq!(json["tag_ids"], serde_json::json!([1]));
        assert!(json["category"].is_null());
    }

    #[test]
    fn test_summary_fills_missing_flags() {
        let summary = PostSummary::from(Post::default());
        assert!(!summary.is_published);
        assert!(summary.tag_ids.is_empty());
    }
}
