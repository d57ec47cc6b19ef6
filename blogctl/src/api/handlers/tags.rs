use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::tags::{TagCreate, TagResponse, TagUpdate};
use crate::api::models::users::CurrentUser;
use crate::db::handlers::{Repository, Tags};
use crate::db::models::tags::{TagCreateDBRequest, TagUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::TagId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Tag name cannot be empty".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/tags",
    tag = "tags",
    summary = "List tags",
    params(Pagination),
    responses(
        (status = 200, description = "A page of tags", body = PaginatedResponse<TagResponse>),
        (status = 400, description = "Invalid page or page_size"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_tags(State(state): State<AppState>, Query(query): Query<Pagination>) -> Result<Json<PaginatedResponse<TagResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tags::new(state.registry.mapper(&mut conn)?);

    let filter = query.filter(&state.config.pagination);
    let tags = repo.list(&filter).await?;
    let total_count = repo.count().await?;

    let data = tags.into_iter().map(TagResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, &filter)))
}

#[utoipa::path(
    get,
    path = "/tags/{id}",
    tag = "tags",
    summary = "Get tag",
    params(("id" = i64, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "The tag", body = TagResponse),
        (status = 404, description = "Tag not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_tag(State(state): State<AppState>, Path(id): Path<TagId>) -> Result<Json<TagResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tags::new(state.registry.mapper(&mut conn)?);

    match repo.get_by_id(id).await? {
        Some(tag) => Ok(Json(TagResponse::from(tag))),
        None => Err(Error::NotFound {
            resource: "Tag".to_string(),
            id: id.to_string(),
        }),
    }
}

#[utoipa::path(
    post,
    path = "/tags",
    tag = "tags",
    summary = "Create tag",
    request_body = TagCreate,
    responses(
        (status = 201, description = "Tag created", body = TagResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A tag with this name already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_tag(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<TagCreate>,
) -> Result<(StatusCode, Json<TagResponse>)> {
    require_name(&create.name)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tags::new(state.registry.mapper(&mut conn)?);

    if repo.exists(&create.name).await? {
        return Err(Error::Conflict {
            message: format!("Tag '{}' already exists", create.name),
        });
    }

    let tag = repo.create(&TagCreateDBRequest::new(create, current_user.id)).await?;
    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

#[utoipa::path(
    patch,
    path = "/tags/{id}",
    tag = "tags",
    summary = "Update tag",
    request_body = TagUpdate,
    params(("id" = i64, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Tag updated", body = TagResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Tag not found"),
        (status = 409, description = "A tag with this name already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<TagId>,
    current_user: CurrentUser,
    Json(update): Json<TagUpdate>,
) -> Result<Json<TagResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tags::new(state.registry.mapper(&mut conn)?);

    if let Some(name) = &update.name {
        require_name(name)?;
        if repo.find_by_name(name).await?.is_some_and(|existing| existing.id != id) {
            return Err(Error::Conflict {
                message: format!("Tag '{name}' already exists"),
            });
        }
    }

    let tag = repo.update(id, &TagUpdateDBRequest::new(update, current_user.id)).await?;
    Ok(Json(TagResponse::from(tag)))
}

#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tag = "tags",
    summary = "Delete tag",
    params(("id" = i64, Path, description = "Tag ID")),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Tag not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_tag(State(state): State<AppState>, Path(id): Path<TagId>, _: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tags::new(state.registry.mapper(&mut conn)?);

    if repo.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Tag".to_string(),
            id: id.to_string(),
        })
    }
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::tags::TagResponse;
    use crate::test_utils::{create_test_app, login_as_admin};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_tag_lifecycle(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let created = server
            .post("/api/v1/tags")
            .authorization_bearer(&token)
            .json(&json!({"name": "rust"}))
            .await;
        created.assert_status(StatusCode::CREATED);
        let tag: TagResponse = created.json();
        assert_eq!(tag.name.as_deref(), Some("rust"));

        let fetched: TagResponse = server.get(&format!("/api/v1/tags/{}", tag.id)).await.json();
        assert_eq!(fetched, tag);

        let renamed: TagResponse = server
            .patch(&format!("/api/v1/tags/{}", tag.id))
            .authorization_bearer(&token)
            .json(&json!({"name": "rustlang"}))
            .await
            .json();
        assert_eq!(renamed.name.as_deref(), Some("rustlang"));
        assert!(renamed.updated_at.is_some());

        server
            .delete(&format!("/api/v1/tags/{}", tag.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/tags/{}", tag.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_writes_need_a_token(pool: PgPool) {
        let server = create_test_app(pool).await;

        server
            .post("/api/v1/tags")
            .json(&json!({"name": "rust"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/v1/tags")
            .authorization_bearer("forged")
            .json(&json!({"name": "rust"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_duplicate_and_blank_names(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        for (name, status) in [("go", StatusCode::CREATED), ("go", StatusCode::CONFLICT), ("  ", StatusCode::BAD_REQUEST)] {
            server
                .post("/api/v1/tags")
                .authorization_bearer(&token)
                .json(&json!({"name": name}))
                .await
                .assert_status(status);
        }
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_list_pages(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        for name in ["a", "b", "c"] {
            server
                .post("/api/v1/tags")
                .authorization_bearer(&token)
                .json(&json!({"name": name}))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let page: PaginatedResponse<TagResponse> = server
            .get("/api/v1/tags")
            .add_query_param("page", 2)
            .add_query_param("page_size", 2)
            .await
            .json();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name.as_deref(), Some("c"));

        let beyond: PaginatedResponse<TagResponse> = server.get("/api/v1/tags?page=9&page_size=2").await.json();
        assert!(beyond.data.is_empty());

        server.get("/api/v1/tags?page=0").await.assert_status(StatusCode::BAD_REQUEST);
    }
}
