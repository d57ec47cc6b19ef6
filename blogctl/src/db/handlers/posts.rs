//! Database repository for posts.

use std::collections::HashMap;

use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{PageFilter, Repository, any_id},
    mapper::{Mapper, OrderBy},
    models::{
        Audit,
        posts::{Post, PostCreateDBRequest, PostStatus, PostUpdateDBRequest, SUMMARY_FIELDS},
    },
    predicate::Predicate,
};
use crate::types::{CategoryId, PostId};

pub struct Posts<'c> {
    mapper: Mapper<'c, Post>,
}

impl<'c> Posts<'c> {
    pub fn new(mapper: Mapper<'c, Post>) -> Self {
        Self { mapper }
    }

    #[instrument(skip(self), err)]
    pub async fn find_by_slug(&mut self, slug: &str) -> Result<Option<Post>> {
        let posts = self.mapper.get_by_predicate(&Predicate::eq("slug", slug), None).await?;
        Ok(posts.into_iter().next())
    }

    #[instrument(skip(self), err)]
    pub async fn slug_exists(&mut self, slug: &str) -> Result<bool> {
        Ok(self.mapper.count_by_predicate(&Predicate::eq("slug", slug)).await? > 0)
    }

    /// Posts filed under a category, without their content
    #[instrument(skip(self), err)]
    pub async fn list_by_category(&mut self, category_id: CategoryId) -> Result<Vec<Post>> {
        self.mapper
            .get_by_predicate(&Predicate::eq("category_id", category_id), Some(SUMMARY_FIELDS))
            .await
    }

    pub async fn count(&mut self) -> Result<i64> {
        self.mapper.count().await
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Posts<'c> {
    type CreateRequest = PostCreateDBRequest;
    type UpdateRequest = PostUpdateDBRequest;
    type Response = Post;
    type Id = PostId;
    type Filter = PageFilter;

    #[instrument(skip(self, request), fields(slug = %request.slug), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut post = Post {
            id: 0,
            title: Some(request.title.clone()),
            author: request.author.clone(),
            slug: Some(request.slug.clone()),
            status: Some(request.status),
            is_published: Some(request.status == PostStatus::Published),
            tag_ids: Some(request.tag_ids.clone()),
            summary: request.summary.clone(),
            content: request.content.clone(),
            path: request.path.clone(),
            category_id: request.category_id,
            audit: Audit::created_by(request.created_by),
        };
        post.id = self.mapper.insert(&post).await?;
        Ok(post)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        self.mapper.get_by_id(id).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let Some(predicate) = any_id(&ids) else {
            return Ok(HashMap::new());
        };
        let posts = self.mapper.get_by_predicate(&predicate, None).await?;
        Ok(posts.into_iter().map(|post| (post.id, post)).collect())
    }

    /// Newest posts first, without their content
    #[instrument(skip(self), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        self.mapper
            .get_page(filter.page, filter.page_size, Some(SUMMARY_FIELDS), Some(OrderBy::desc("id")))
            .await
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        Ok(self.mapper.delete(id).await? > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut post = self.mapper.get_by_id(id).await?.ok_or(DbError::NotFound)?;

        if let Some(title) = &request.title {
            post.title = Some(title.clone());
        }
        if let Some(author) = &request.author {
            post.author = Some(author.clone());
        }
        if let Some(slug) = &request.slug {
            post.slug = Some(slug.clone());
        }
        if let Some(status) = request.status {
            post.status = Some(status);
            post.is_published = Some(status == PostStatus::Published);
        }
        if let Some(tag_ids) = &request.tag_ids {
            post.tag_ids = Some(tag_ids.clone());
        }
        if let Some(summary) = &request.summary {
            post.summary = Some(summary.clone());
        }
        if let Some(content) = &request.content {
            post.content = Some(content.clone());
        }
        if let Some(path) = &request.path {
            post.path = Some(path.clone());
        }
        if let Some(category_id) = request.category_id {
            post.category_id = Some(category_id);
        }
        post.audit.touch(request.updated_by);

        self.mapper.update(&post).await?;
        Ok(post)
    }
}
