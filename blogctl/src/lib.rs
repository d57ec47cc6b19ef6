//! # blogctl: Blog Backend over a Schema-Driven PostgreSQL Mapper
//!
//! `blogctl` serves the posts, tags, categories and user profile of a personal blog over a JSON
//! REST API. Persistence goes through a small object-relational mapper in [`db`]: every table is
//! declared once as an [`Entity`](db::Entity), and its DDL, row decoding, CRUD statements and
//! `WHERE` clauses are all derived from that declaration.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for all persistence. There are no migrations: on startup the
//! [`SchemaInitializer`](db::initializer::SchemaInitializer) creates every registered table that
//! is missing and validates the ones that exist, then the first administrator is seeded if the
//! user table is empty.
//!
//! ### Request Flow
//!
//! Requests to `/api/v1/*` reach a handler in [`api::handlers`]. Reads are public; handlers that
//! write take a [`CurrentUser`](api::models::users::CurrentUser), which is extracted from a
//! `Authorization: Bearer` session token issued by `POST /api/v1/authentication/login`. Handlers
//! borrow one pooled connection, build the repositories they need from the shared
//! [`SchemaRegistry`], and map database errors onto HTTP status codes through [`errors::Error`].
//!
//! ## Modules
//!
//! - [`api`]: HTTP handlers and request/response models
//! - [`auth`]: Password hashing, session tokens and the current-user extractor
//! - [`config`]: Configuration loading from YAML and environment variables
//! - [`db`]: Entity schemas, predicates, the mapper and the per-table repositories
//! - [`errors`]: API error type and its HTTP mapping
//! - [`images`]: Optional image hosting on an S3-compatible bucket
//! - [`telemetry`]: Tracing and optional OpenTelemetry export
//!
//! ## Getting Started
//!
//! ```no_run
//! use blogctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     blogctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod images;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderName, HeaderValue, Method},
    routing::{delete, get, patch, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    auth::password,
    config::CorsOrigin,
    images::ImageStore,
    db::{
        handlers::{Repository, Users},
        initializer::SchemaInitializer,
        models::{categories::Category, posts::Post, tags::Tag, users::User, users::UserCreateDBRequest, users::UserUpdateDBRequest},
        registry::SchemaRegistry,
    },
    openapi::ApiDoc,
    types::{SYSTEM_USER_ID, UserId},
};

/// Application state shared across all request handlers.
///
/// - `db`: Main PostgreSQL connection pool
/// - `config`: Application configuration
/// - `registry`: Entity descriptors, built once at startup
/// - `images`: Image bucket client, present when `image_storage` is configured
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .registry(Arc::new(build_registry()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub registry: Arc<SchemaRegistry>,
    pub images: Option<Arc<ImageStore>>,
}

/// Register every entity the blog stores, in table creation order.
pub fn build_registry() -> db::errors::Result<SchemaRegistry> {
    Ok(SchemaRegistry::builder()
        .register::<User>()?
        .register::<Tag>()?
        .register::<Category>()?
        .register::<Post>()?
        .build())
}

/// Create or validate every registered table.
#[instrument(skip_all)]
pub async fn initialize_schema(pool: &PgPool, registry: &SchemaRegistry) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    let reports = SchemaInitializer::new(&mut conn).run(registry).await?;
    for report in reports {
        info!(table = %report.table, outcome = ?report.outcome, "Schema ready");
    }
    Ok(())
}

/// Create the initial admin user if the user table is empty.
///
/// Returns the new user's ID, or `None` when users already exist. In that case the only change
/// made is giving an admin without a password the configured `admin_password`; a password that
/// is already set is never replaced.
#[instrument(skip_all, fields(username = %config.admin_username))]
pub async fn create_initial_admin_user(config: &Config, pool: &PgPool, registry: &SchemaRegistry) -> anyhow::Result<Option<UserId>> {
    let mut conn = pool.acquire().await?;
    let mut users = Users::new(registry.mapper(&mut conn)?);

    if users.count().await? > 0 {
        debug!("Users already exist, skipping admin seeding");
        backfill_admin_password(config, &mut users).await?;
        return Ok(None);
    }

    let password_hash = match config.admin_password.as_deref() {
        Some(pwd) => Some(hash_admin_password(config, pwd).await?),
        None => {
            warn!("No admin_password configured; the admin account cannot log in until one is set");
            None
        }
    };

    let created = users
        .create(&UserCreateDBRequest {
            username: config.admin_username.clone(),
            password_hash,
            email: None,
            avatar_url: None,
            motto: None,
            created_by: SYSTEM_USER_ID,
        })
        .await?;

    info!(user_id = created.id, "Created initial admin user");
    Ok(Some(created.id))
}

async fn hash_admin_password(config: &Config, pwd: &str) -> anyhow::Result<String> {
    let params = config.auth.password.argon2_params();
    let pwd = pwd.to_string();
    Ok(tokio::task::spawn_blocking(move || password::hash_string_with_params(&pwd, Some(params))).await??)
}

async fn backfill_admin_password(config: &Config, users: &mut Users<'_>) -> anyhow::Result<()> {
    let Some(pwd) = config.admin_password.as_deref() else {
        return Ok(());
    };
    let Some(admin) = users.get_by_username(&config.admin_username).await? else {
        return Ok(());
    };
    if admin.password_hash.is_some() {
        return Ok(());
    }

    let update = UserUpdateDBRequest {
        email: None,
        avatar_url: None,
        motto: None,
        password_hash: Some(hash_admin_password(config, pwd).await?),
        updated_by: SYSTEM_USER_ID,
    };
    users.update(admin.id, &update).await?;
    info!(user_id = admin.id, "Set admin_password on admin account that had none");
    Ok(())
}

/// Build the image bucket client if image hosting is configured.
pub async fn build_image_store(config: &Config) -> Option<Arc<ImageStore>> {
    let storage = config.image_storage.as_ref()?;
    info!(bucket = %storage.bucket, "Image hosting enabled");
    Some(Arc::new(ImageStore::from_config(storage).await))
}

/// Connect to the database, reconcile the schema and seed the admin user.
async fn setup_database(config: &Config) -> anyhow::Result<(PgPool, Arc<SchemaRegistry>)> {
    let settings = &config.database.pool;
    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await?;

    let registry = Arc::new(build_registry()?);
    initialize_schema(&pool, &registry).await?;

    create_initial_admin_user(config, &pool, &registry).await?;

    Ok((pool, registry))
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let exposed = cors_config
        .exposed_headers
        .iter()
        .map(|h| h.parse::<HeaderName>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(exposed);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

const DEFAULT_UPLOAD_LIMIT: usize = 2 * 1024 * 1024;
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the main application router with all endpoints and middleware.
///
/// - Health check at `/healthz`
/// - The blog API under `/api/v1`
/// - The OpenAPI document at `/api-docs/openapi.json`, rendered by Scalar at `/docs`
/// - CORS and request tracing on everything
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    // Room for the multipart framing around the largest accepted image
    let image_upload_limit = state
        .config
        .image_storage
        .as_ref()
        .map_or(DEFAULT_UPLOAD_LIMIT, |images| images.max_file_size as usize + MULTIPART_OVERHEAD);

    let api_routes = Router::new()
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/password-change", post(api::handlers::auth::change_password))
        .route(
            "/posts",
            get(api::handlers::posts::list_posts).post(api::handlers::posts::create_post),
        )
        .route(
            "/posts/{id}",
            get(api::handlers::posts::get_post)
                .patch(api::handlers::posts::update_post)
                .delete(api::handlers::posts::delete_post),
        )
        .route("/posts/slug/{slug}", get(api::handlers::posts::get_post_by_slug))
        .route("/tags", get(api::handlers::tags::list_tags))
        .route("/tags", post(api::handlers::tags::create_tag))
        .route("/tags/{id}", get(api::handlers::tags::get_tag))
        .route("/tags/{id}", patch(api::handlers::tags::update_tag))
        .route("/tags/{id}", delete(api::handlers::tags::delete_tag))
        .route("/categories", get(api::handlers::categories::list_categories))
        .route("/categories", post(api::handlers::categories::create_category))
        .route("/categories/{id}", get(api::handlers::categories::get_category))
        .route("/categories/{id}", patch(api::handlers::categories::update_category))
        .route("/categories/{id}", delete(api::handlers::categories::delete_category))
        .route(
            "/images",
            post(api::handlers::images::upload_image).layer(DefaultBodyLimit::max(image_upload_limit)),
        )
        .route("/images/url", get(api::handlers::images::get_image_url))
        .route(
            "/users/current",
            get(api::handlers::users::get_current_user).patch(api::handlers::users::update_current_user),
        )
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(create_cors_layer(&state.config)?);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and the database pool.
///
/// # Lifecycle
///
/// 1. **Initialization**: [`Application::new`] connects to the database, reconciles the schema,
///    seeds the admin user and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal resolves, in-flight requests drain, the pool closes
///    and pending spans are flushed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting blog backend with configuration: {:#?}", config);

        let (pool, registry) = setup_database(&config).await?;
        let images = build_image_store(&config).await;

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .registry(registry)
            .maybe_images(images)
            .build();

        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Blog backend listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::test_utils::{ADMIN_PASSWORD, create_test_config, init_schema};
    use axum::http::StatusCode;
    use sqlx::ConnectOptions;

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_create_initial_admin_user_seeds_once(pool: PgPool) {
        let registry = init_schema(&pool).await;
        let config = create_test_config();

        let first = create_initial_admin_user(&config, &pool, &registry).await.unwrap();
        assert!(first.is_some());

        let second = create_initial_admin_user(&config, &pool, &registry).await.unwrap();
        assert_eq!(second, None);

        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(registry.mapper(&mut conn).unwrap());
        assert_eq!(users.count().await.unwrap(), 1);

        let admin = users.get_by_username("admin").await.unwrap().expect("admin exists");
        assert_eq!(Some(admin.id), first);
        let hash = admin.password_hash.expect("password hash set");
        assert!(password::verify_string(ADMIN_PASSWORD, &hash).unwrap());
    }

    async fn stored_hash(pool: &PgPool, registry: &SchemaRegistry, id: UserId) -> Option<String> {
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(registry.mapper(&mut conn).unwrap());
        users.get_by_id(id).await.unwrap().expect("admin exists").password_hash
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_admin_password_is_backfilled_only_when_missing(pool: PgPool) {
        let registry = init_schema(&pool).await;
        let mut config = create_test_config();
        config.admin_password = None;

        let admin_id = create_initial_admin_user(&config, &pool, &registry).await.unwrap().unwrap();
        assert!(stored_hash(&pool, &registry, admin_id).await.is_none());

        config.admin_password = Some(ADMIN_PASSWORD.to_string());
        assert_eq!(create_initial_admin_user(&config, &pool, &registry).await.unwrap(), None);
        let hash = stored_hash(&pool, &registry, admin_id).await.expect("hash backfilled");
        assert!(password::verify_string(ADMIN_PASSWORD, &hash).unwrap());

        // A set password is never replaced
        config.admin_password = Some("a-different-password".to_string());
        create_initial_admin_user(&config, &pool, &registry).await.unwrap();
        assert_eq!(stored_hash(&pool, &registry, admin_id).await, Some(hash));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_schema_initialization_is_idempotent(pool: PgPool) {
        let registry = build_registry().unwrap();
        initialize_schema(&pool, &registry).await.unwrap();
        initialize_schema(&pool, &registry).await.unwrap();
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_application_integration(pool: PgPool) {
        let mut config = create_test_config();
        config.database.url = pool.connect_options().to_url_lossy().to_string();

        let app = Application::new(config).await;
        assert!(app.is_ok(), "Application::new should succeed");
        let server = app.unwrap().into_test_server();

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        assert_eq!(health.text(), "OK");

        let doc = server.get("/api-docs/openapi.json").await;
        doc.assert_status_ok();
        let doc: serde_json::Value = doc.json();
        assert!(doc["paths"]["/posts"].is_object());

        server.get("/api/v1/posts").await.assert_status_ok();
        server
            .post("/api/v1/tags")
            .json(&serde_json::json!({ "name": "rust" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
