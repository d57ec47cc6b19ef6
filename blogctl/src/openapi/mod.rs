//! OpenAPI documentation for the blog API at `/api/v1/*`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
use crate::db::models::posts::PostStatus;

/// Security scheme for the write endpoints (Bearer session token).
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token from `POST /authentication/login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Blog API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::login,
        api::handlers::auth::change_password,
        api::handlers::posts::list_posts,
        api::handlers::posts::get_post,
        api::handlers::posts::get_post_by_slug,
        api::handlers::posts::create_post,
        api::handlers::posts::update_post,
        api::handlers::posts::delete_post,
        api::handlers::tags::list_tags,
        api::handlers::tags::get_tag,
        api::handlers::tags::create_tag,
        api::handlers::tags::update_tag,
        api::handlers::tags::delete_tag,
        api::handlers::categories::list_categories,
        api::handlers::categories::get_category,
        api::handlers::categories::create_category,
        api::handlers::categories::update_category,
        api::handlers::categories::delete_category,
        api::handlers::users::get_current_user,
        api::handlers::users::update_current_user,
        api::handlers::images::upload_image,
        api::handlers::images::get_image_url,
    ),
    components(
        schemas(
            api::models::auth::LoginRequest,
            api::models::auth::LoginResponse,
            api::models::auth::ChangePasswordRequest,
            api::models::auth::AuthSuccessResponse,
            api::models::posts::PostCreate,
            api::models::posts::PostUpdate,
            api::models::posts::PostSummary,
            api::models::posts::PostDetail,
            PostStatus,
            api::models::tags::TagCreate,
            api::models::tags::TagUpdate,
            api::models::tags::TagResponse,
            api::models::categories::CategoryCreate,
            api::models::categories::CategoryUpdate,
            api::models::categories::CategoryResponse,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::images::ImageUploadResponse,
            api::models::images::ImageUrlResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Log in to obtain a session token, and change your password."),
        (name = "posts", description = "Blog posts. Listings are newest first and omit the content."),
        (name = "tags", description = "Tags attached to posts by ID."),
        (name = "categories", description = "Categories posts are filed under."),
        (name = "users", description = "The authenticated user's profile."),
        (name = "images", description = "Image hosting. Post content refers to uploads with `[s3://<id>]` markers."),
    ),
    info(
        title = "Blog API",
        version = "1.0.0",
        description = "Posts, tags, categories and users for a personal blog.

## Authentication

Reads are public. Writes require a session token from `POST /authentication/login` in the
`Authorization` header:

```
Authorization: Bearer YOUR_TOKEN
```

## Pagination

List endpoints take `page` (from 1) and `page_size`, and return
`{ data, total_count, page, page_size }`.",
    ),
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/authentication/login",
            "/authentication/password-change",
            "/posts",
            "/posts/{id}",
            "/posts/slug/{slug}",
            "/tags",
            "/tags/{id}",
            "/categories",
            "/categories/{id}",
            "/users/current",
            "/images",
            "/images/url",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("BearerAuth"));
    }
}
