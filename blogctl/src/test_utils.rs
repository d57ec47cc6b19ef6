//! Test utilities for integration testing (available with `test-utils` feature).

use std::sync::Arc;

use axum_test::TestServer;
use sqlx::PgPool;

use crate::{
    AppState,
    api::models::auth::LoginResponse,
    config::{Config, DatabaseConfig, PasswordConfig, PoolSettings},
    db::registry::SchemaRegistry,
};

/// Password of the admin seeded by [`create_test_app`]
pub const ADMIN_PASSWORD: &str = "test-admin-password";

/// Build the registry and create every table in the test database.
pub async fn init_schema(pool: &PgPool) -> SchemaRegistry {
    let registry = crate::build_registry().expect("Failed to build schema registry");
    crate::initialize_schema(pool, &registry)
        .await
        .expect("Failed to initialize schema");
    registry
}

pub fn create_test_config() -> Config {
    Config {
        database: DatabaseConfig {
            // Tests receive their pool from sqlx::test, so this is never dialled
            url: "postgres://unused".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_username: "admin".to_string(),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: crate::config::AuthConfig {
            // Cheap hashing keeps the suite fast
            password: PasswordConfig {
                argon2_memory_kib: 1024,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Router over `pool` with the schema created and the admin seeded.
pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

/// Same as [`create_test_app`], with image hosting and other settings taken from `config`.
pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let registry = Arc::new(init_schema(&pool).await);

    crate::create_initial_admin_user(&config, &pool, &registry)
        .await
        .expect("Failed to seed admin user");

    let images = crate::build_image_store(&config).await;
    let state = AppState::builder()
        .db(pool)
        .config(config)
        .registry(registry)
        .maybe_images(images)
        .build();
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Log in as the seeded admin and return the session token.
pub async fn login_as_admin(server: &TestServer) -> String {
    let response = server
        .post("/api/v1/authentication/login")
        .json(&serde_json::json!({ "username": "admin", "password": ADMIN_PASSWORD }))
        .await;
    response.assert_status_ok();
    response.json::<LoginResponse>().token
}
