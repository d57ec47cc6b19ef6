//! Database repository for categories.

use std::collections::HashMap;

use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{PageFilter, Repository, any_id},
    mapper::Mapper,
    models::{
        Audit,
        categories::{Category, CategoryCreateDBRequest, CategoryUpdateDBRequest},
    },
    predicate::Predicate,
};
use crate::types::CategoryId;

pub struct Categories<'c> {
    mapper: Mapper<'c, Category>,
}

impl<'c> Categories<'c> {
    pub fn new(mapper: Mapper<'c, Category>) -> Self {
        Self { mapper }
    }

    #[instrument(skip(self), err)]
    pub async fn find_by_name(&mut self, name: &str) -> Result<Option<Category>> {
        let categories = self.mapper.get_by_predicate(&Predicate::eq("name", name), None).await?;
        Ok(categories.into_iter().next())
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
impl<'c> Repository for Categories<'c> {
    type CreateRequest = CategoryCreateDBRequest;
    type UpdateRequest = CategoryUpdateDBRequest;
    type Response = Category;
    type Id = CategoryId;
    type Filter = PageFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut category = Category {
            id: 0,
            name: Some(request.name.clone()),
            description: request.description.clone(),
            audit: Audit::created_by(request.created_by),
        };
        category.id = self.mapper.insert(&category).await?;
        Ok(category)
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
        let categories = self.mapper.get_by_predicate(&predicate, None).await?;
        Ok(categories.into_iter().map(|category| (category.id, category)).collect())
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
        let mut category = self.mapper.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if let Some(name) = &request.name {
            category.name = Some(name.clone());
        }
        if let Some(description) = &request.description {
            category.description = Some(description.clone());
        }
        category.audit.touch(request.updated_by);
        self.mapper.update(&category).await?;
        Ok(category)
    }
}
