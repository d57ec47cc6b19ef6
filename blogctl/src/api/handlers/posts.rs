use crate::api::models::categories::CategoryResponse;
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::posts::{PostCreate, PostDetail, PostSummary, PostUpdate};
use crate::api::models::tags::TagResponse;
use crate::api::models::users::CurrentUser;
use crate::db::handlers::{Categories, Posts, Repository, Tags};
use crate::db::models::posts::{Post, PostCreateDBRequest, PostUpdateDBRequest};
use crate::db::registry::SchemaRegistry;
use crate::errors::{Error, Result};
use crate::{AppState, types::PostId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

fn not_found(id: impl ToString) -> Error {
    Error::NotFound {
        resource: "Post".to_string(),
        id: id.to_string(),
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::BadRequest {
            message: format!("Post {field} cannot be empty"),
        });
    }
    Ok(())
}

/// Look up the tags and category a post refers to. Dangling references are dropped.
async fn resolve(registry: &SchemaRegistry, conn: &mut PgConnection, post: Post) -> Result<PostDetail> {
    let tag_ids = post.tag_ids.clone().unwrap_or_default();
    let tags_by_id = Tags::new(registry.mapper(conn)?).get_bulk(tag_ids.clone()).await?;
    let tags = tag_ids
        .iter()
        .filter_map(|id| tags_by_id.get(id))
        .map(|tag| TagResponse::from(tag.clone()))
        .collect();

    let category = match post.category_id {
        Some(category_id) => Categories::new(registry.mapper(conn)?)
            .get_by_id(category_id)
            .await?
            .map(CategoryResponse::from),
        None => None,
    };

    Ok(PostDetail::new(post, tags, category))
}

/// Swap image markers in the content for presigned URLs when image hosting is on.
async fn render_images(state: &AppState, mut detail: PostDetail) -> Result<PostDetail> {
    if let (Some(images), Some(content)) = (state.images.as_deref(), detail.content.as_deref()) {
        detail.content = Some(images.render(content).await?);
    }
    Ok(detail)
}

#[utoipa::path(
    get,
    path = "/posts",
    tag = "posts",
    summary = "List posts",
    description = "Newest first. Listings leave the post content out.",
    params(Pagination),
    responses(
        (status = 200, description = "A page of post summaries", body = PaginatedResponse<PostSummary>),
        (status = 400, description = "Invalid page or page_size"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_posts(State(state): State<AppState>, Query(query): Query<Pagination>) -> Result<Json<PaginatedResponse<PostSummary>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(state.registry.mapper(&mut conn)?);

    let filter = query.filter(&state.config.pagination);
    let posts = repo.list(&filter).await?;
    let total_count = repo.count().await?;

    let data = posts.into_iter().map(PostSummary::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, &filter)))
}

#[utoipa::path(
    get,
    path = "/posts/{id}",
    tag = "posts",
    summary = "Get post",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "The post with its tags and category; image markers become temporary URLs", body = PostDetail),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<Json<PostDetail>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let post = Posts::new(state.registry.mapper(&mut conn)?)
        .get_by_id(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    let detail = resolve(&state.registry, &mut conn, post).await?;
    Ok(Json(render_images(&state, detail).await?))
}

#[utoipa::path(
    get,
    path = "/posts/slug/{slug}",
    tag = "posts",
    summary = "Get post by slug",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "The post with its tags and category; image markers become temporary URLs", body = PostDetail),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_post_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<PostDetail>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let post = Posts::new(state.registry.mapper(&mut conn)?)
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| not_found(&slug))?;

    let detail = resolve(&state.registry, &mut conn, post).await?;
    Ok(Json(render_images(&state, detail).await?))
}

#[utoipa::path(
    post,
    path = "/posts",
    tag = "posts",
    summary = "Create post",
    request_body = PostCreate,
    responses(
        (status = 201, description = "Post created", body = PostDetail),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A post with this slug already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_post(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<PostCreate>,
) -> Result<(StatusCode, Json<PostDetail>)> {
    require_non_empty("title", &create.title)?;
    require_non_empty("slug", &create.slug)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let post = {
        let mut repo = Posts::new(state.registry.mapper(&mut conn)?);
        if repo.slug_exists(&create.slug).await? {
            return Err(Error::Conflict {
                message: format!("Slug '{}' is already used by another post", create.slug),
            });
        }
        let request = PostCreateDBRequest::new(create, &current_user.username, current_user.id);
        repo.create(&request).await?
    };

    let detail = resolve(&state.registry, &mut conn, post).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    patch,
    path = "/posts/{id}",
    tag = "posts",
    summary = "Update post",
    description = "Fields left out of the body keep their current value.",
    request_body = PostUpdate,
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post updated", body = PostDetail),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "A post with this slug already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    current_user: CurrentUser,
    Json(update): Json<PostUpdate>,
) -> Result<Json<PostDetail>> {
    if let Some(title) = &update.title {
        require_non_empty("title", title)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let post = {
        let mut repo = Posts::new(state.registry.mapper(&mut conn)?);
        if let Some(slug) = &update.slug {
            require_non_empty("slug", slug)?;
            if repo.find_by_slug(slug).await?.is_some_and(|existing| existing.id != id) {
                return Err(Error::Conflict {
                    message: format!("Slug '{slug}' is already used by another post"),
                });
            }
        }
        repo.update(id, &PostUpdateDBRequest::new(update, current_user.id)).await?
    };

    Ok(Json(resolve(&state.registry, &mut conn, post).await?))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    tag = "posts",
    summary = "Delete post",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_post(State(state): State<AppState>, Path(id): Path<PostId>, _: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(state.registry.mapper(&mut conn)?);

    if !repo.delete(id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}
