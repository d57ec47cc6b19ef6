//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything is mounted under `/api/v1`:
//!
//! - **Authentication** (`/authentication/login`, `/authentication/password-change`)
//! - **Posts** (`/posts`, `/posts/{id}`, `/posts/slug/{slug}`)
//! - **Tags** (`/tags`, `/tags/{id}`)
//! - **Categories** (`/categories`, `/categories/{id}`)
//! - **Users** (`/users/current`)
//! - **Images** (`/images`, `/images/url`)
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa` annotations. The document is served at
//! `/api-docs/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
