use crate::api::models::categories::{CategoryCreate, CategoryResponse, CategoryUpdate};
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::users::CurrentUser;
use crate::db::handlers::{Categories, Repository};
use crate::db::models::categories::{CategoryCreateDBRequest, CategoryUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::CategoryId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn not_found(id: CategoryId) -> Error {
    Error::NotFound {
        resource: "Category".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/categories",
    tag = "categories",
    summary = "List categories",
    params(Pagination),
    responses(
        (status = 200, description = "A page of categories", body = PaginatedResponse<CategoryResponse>),
        (status = 400, description = "Invalid page or page_size"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<Pagination>,
) -> Result<Json<PaginatedResponse<CategoryResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(state.registry.mapper(&mut conn)?);

    let filter = query.filter(&state.config.pagination);
    let categories = repo.list(&filter).await?;
    let total_count = repo.count().await?;

    let data = categories.into_iter().map(CategoryResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, &filter)))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Get category",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "The category", body = CategoryResponse),
        (status = 404, description = "Category not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_category(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<Json<CategoryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(state.registry.mapper(&mut conn)?);

    let category = repo.get_by_id(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(CategoryResponse::from(category)))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "categories",
    summary = "Create category",
    request_body = CategoryCreate,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A category with this name already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<CategoryCreate>,
) -> Result<(StatusCode, Json<CategoryResponse>)> {
    if create.name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Category name cannot be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(state.registry.mapper(&mut conn)?);

    if repo.exists(&create.name).await? {
        return Err(Error::Conflict {
            message: format!("Category '{}' already exists", create.name),
        });
    }

    let category = repo.create(&CategoryCreateDBRequest::new(create, current_user.id)).await?;
    Ok((StatusCode::CREATED, Json(CategoryResponse::from(category))))
}

#[utoipa::path(
    patch,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Update category",
    request_body = CategoryUpdate,
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "A category with this name already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    current_user: CurrentUser,
    Json(update): Json<CategoryUpdate>,
) -> Result<Json<CategoryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(state.registry.mapper(&mut conn)?);

    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "Category name cannot be empty".to_string(),
            });
        }
        if repo.find_by_name(name).await?.is_some_and(|existing| existing.id != id) {
            return Err(Error::Conflict {
                message: format!("Category '{name}' already exists"),
            });
        }
    }

    let category = repo.update(id, &CategoryUpdateDBRequest::new(update, current_user.id)).await?;
    Ok(Json(CategoryResponse::from(category)))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "categories",
    summary = "Delete category",
    description = "Posts filed under the category keep its ID and resolve it to nothing.",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Category not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_category(State(state): State<AppState>, Path(id): Path<CategoryId>, _: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Categories::new(state.registry.mapper(&mut conn)?);

    if !repo.delete(id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use crate::api::models::categories::CategoryResponse;
    use crate::api::models::pagination::PaginatedResponse;
    use crate::test_utils::{create_test_app, login_as_admin};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_category_lifecycle(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        let created = server
            .post("/api/v1/categories")
            .authorization_bearer(&token)
            .json(&json!({"name": "notes", "description": "Short notes"}))
            .await;
        created.assert_status(StatusCode::CREATED);
        let category: CategoryResponse = created.json();
        assert_eq!(category.description.as_deref(), Some("Short notes"));

        // Only the given field changes
        let updated: CategoryResponse = server
            .patch(&format!("/api/v1/categories/{}", category.id))
            .authorization_bearer(&token)
            .json(&json!({"description": "Longer notes"}))
            .await
            .json();
        assert_eq!(updated.name.as_deref(), Some("notes"));
        assert_eq!(updated.description.as_deref(), Some("Longer notes"));

        let page: PaginatedResponse<CategoryResponse> = server.get("/api/v1/categories").await.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].description.as_deref(), Some("Longer notes"));

        server
            .delete(&format!("/api/v1/categories/{}", category.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&format!("/api/v1/categories/{}", category.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_update_missing_category(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        server
            .patch("/api/v1/categories/999")
            .authorization_bearer(&token)
            .json(&json!({"name": "ghost"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
