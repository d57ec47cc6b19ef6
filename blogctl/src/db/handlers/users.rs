//! Database repository for users.

use std::collections::HashMap;

use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{PageFilter, Repository, any_id},
    mapper::Mapper,
    models::{
        Audit,
        users::{User, UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    predicate::Predicate,
};
use crate::types::UserId;

pub struct Users<'c> {
    mapper: Mapper<'c, User>,
}

impl<'c> Users<'c> {
    pub fn new(mapper: Mapper<'c, User>) -> Self {
        Self { mapper }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_username(&mut self, username: &str) -> Result<Option<UserDBResponse>> {
        let users = self
            .mapper
            .get_by_predicate(&Predicate::eq("username", username), None)
            .await?;
        Ok(users.into_iter().next().map(UserDBResponse::from))
    }

    /// Number of user accounts; zero means the initial admin has not been seeded yet
    pub async fn count(&mut self) -> Result<i64> {
        self.mapper.count().await
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = PageFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let taken = self
            .mapper
            .count_by_predicate(&Predicate::eq("username", request.username.as_str()))
            .await?;
        if taken > 0 {
            return Err(DbError::UniqueViolation {
                constraint: None,
                table: Some("users".to_string()),
                message: format!("username {} is already taken", request.username),
            });
        }

        let mut user = User {
            id: 0,
            username: request.username.clone(),
            password_hash: request.password_hash.clone(),
            email: request.email.clone(),
            avatar_url: request.avatar_url.clone(),
            motto: request.motto.clone(),
            audit: Audit::created_by(request.created_by),
        };
        user.id = self.mapper.insert(&user).await?;
        Ok(UserDBResponse::from(user))
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        Ok(self.mapper.get_by_id(id).await?.map(UserDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let Some(predicate) = any_id(&ids) else {
            return Ok(HashMap::new());
        };
        let users = self.mapper.get_by_predicate(&predicate, None).await?;
        Ok(users.into_iter().map(|user| (user.id, UserDBResponse::from(user))).collect())
    }

    #[instrument(skip(self), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = self.mapper.get_page(filter.page, filter.page_size, None, None).await?;
        Ok(users.into_iter().map(UserDBResponse::from).collect())
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        Ok(self.mapper.delete(id).await? > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut user = self.mapper.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if let Some(email) = &request.email {
            user.email = Some(email.clone());
        }
        if let Some(avatar_url) = &request.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
        if let Some(motto) = &request.motto {
            user.motto = Some(motto.clone());
        }
        if let Some(password_hash) = &request.password_hash {
            user.password_hash = Some(password_hash.clone());
        }
        user.audit.touch(request.updated_by);

        self.mapper.update(&user).await?;
        Ok(UserDBResponse::from(user))
    }
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use super::*;
    use crate::test_utils::init_schema;
    use sqlx::PgPool;

    fn create(username: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            password_hash: Some("hash".to_string()),
            email: Some(format!("{username}@example.com")),
            avatar_url: None,
            motto: None,
            created_by: 0,
        }
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_usernames_are_unique(pool: PgPool) {
        let registry = init_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(registry.mapper(&mut conn).unwrap());

        users.create(&create("madoka")).await.unwrap();
        let err = users.create(&create("madoka")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_lookup_and_update(pool: PgPool) {
        let registry = init_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(registry.mapper(&mut conn).unwrap());

        let created = users.create(&create("homura")).await.unwrap();
        let found = users.get_by_username("homura").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(users.get_by_username("kyoko").await.unwrap().is_none());

        let updated = users
            .update(
                created.id,
                &UserUpdateDBRequest {
                    email: None,
                    avatar_url: None,
                    motto: Some("again".to_string()),
                    password_hash: None,
                    updated_by: created.id,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.motto.as_deref(), Some("again"));
        assert_eq!(updated.email.as_deref(), Some("homura@example.com"));
        assert_eq!(updated.password_hash.as_deref(), Some("hash"));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_list_bulk_and_delete(pool: PgPool) {
        let registry = init_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(registry.mapper(&mut conn).unwrap());

        let sayaka = users.create(&create("sayaka")).await.unwrap();
        let mami = users.create(&create("mami")).await.unwrap();
        let kyoko = users.create(&create("kyoko")).await.unwrap();

        let first_page = users.list(&PageFilter::new(1, 2)).await.unwrap();
        assert_eq!(first_page.iter().map(|u| u.id).collect::<Vec<_>>(), vec![sayaka.id, mami.id]);
        let second_page = users.list(&PageFilter::new(2, 2)).await.unwrap();
        assert_eq!(second_page.iter().map(|u| u.id).collect::<Vec<_>>(), vec![kyoko.id]);

        let bulk = users.get_bulk(vec![sayaka.id, kyoko.id, kyoko.id + 100]).await.unwrap();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[&kyoko.id].username, "kyoko");
        assert!(users.get_bulk(vec![]).await.unwrap().is_empty());

        assert!(users.delete(mami.id).await.unwrap());
        assert!(!users.delete(mami.id).await.unwrap());
        assert!(users.get_by_username("mami").await.unwrap().is_none());
        assert_eq!(users.count().await.unwrap(), 2);
    }
}
