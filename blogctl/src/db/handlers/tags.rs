//! Database repository for tags.

use std::collections::HashMap;

use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{PageFilter, Repository, any_id},
    mapper::Mapper,
    models::{
        Audit,
        tags::{Tag, TagCreateDBRequest, TagUpdateDBRequest},
    },
    predicate::Predicate,
};
use crate::types::TagId;

pub struct Tags<'c> {
    mapper: Mapper<'c, Tag>,
}

impl<'c> Tags<'c> {
    pub fn new(mapper: Mapper<'c, Tag>) -> Self {
        Self { mapper }
    }

    /// First tag with exactly this name
    #[instrument(skip(self), err)]
    pub async fn find_by_name(&mut self, name: &str) -> Result<Option<Tag>> {
        let tags = self.mapper.get_by_predicate(&Predicate::eq("name", name), None).await?;
        Ok(tags.into_iter().next())
    }

    #[instrument(skip(self), err)]
    pub async fn exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.mapper.count_by_predicate(&Predicate::eq("name", name)).await? > 0)
    }

    pub async fn count(&mut self) -> Result<i64> {
        self.mapper.count().await
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Tags<'c> {
    type CreateRequest = TagCreateDBRequest;
    type UpdateRequest = TagUpdateDBRequest;
    type Response = Tag;
    type Id = TagId;
    type Filter = PageFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tag = Tag {
            id: 0,
            name: Some(request.name.clone()),
            audit: Audit::created_by(request.created_by),
        };
        tag.id = self.mapper.insert(&tag).await?;
        Ok(tag)
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
        let tags = self.mapper.get_by_predicate(&predicate, None).await?;
        Ok(tags.into_iter().map(|tag| (tag.id, tag)).collect())
    }

    #[instrument(skip(self), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        self.mapper.get_page(filter.page, filter.page_size, None, None).await
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        Ok(self.mapper.delete(id).await? > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tag = self.mapper.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if let Some(name) = &request.name {
            tag.name = Some(name.clone());
        }
        tag.audit.touch(request.updated_by);
        self.mapper.update(&tag).await?;
        Ok(tag)
    }
}
