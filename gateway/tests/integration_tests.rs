//! HTTP-level integration tests (spec §8 seed scenarios), following the
//! teacher's `auth-service::tests::integration_tests` pattern of building a
//! real router and driving it with plain HTTP calls, and its "skip if the
//! database isn't available" convention for anything that needs Postgres.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bff_shared::config::Config;
use bff_shared::db::SCHEMA_SQL;
use tower::ServiceExt;

async fn test_config() -> Option<Config> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let mut config = Config::from_env().ok()?;
    config.database_url = database_url;
    config.broker_url = "memory://gateway-tests".to_string();
    config.registration_secret = "test-secret".to_string();
    config.test_assets_mode = true;
    Some(config)
}

async fn router() -> Option<axum::Router> {
    let config = test_config().await?;
    let pool = sqlx::PgPool::connect(&config.database_url).await.ok()?;
    sqlx::query(SCHEMA_SQL).execute(&pool).await.ok()?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY, tenant_type TEXT NOT NULL, identifier TEXT NOT NULL UNIQUE,
            display_name TEXT, active BOOLEAN NOT NULL, metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .ok()?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS api_keys (
            key_hash TEXT PRIMARY KEY, key_prefix TEXT NOT NULL, tenant_id UUID NOT NULL,
            active BOOLEAN NOT NULL, created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .ok()?;

    let broker = bff_shared::queue::broker_from_url(&config.broker_url).await.ok()?;
    let state = bff_gateway::state::AppStateInner::new(config, broker).await.ok()?;
    Some(bff_gateway::server::build_router(std::sync::Arc::new(state)))
}

#[tokio::test]
async fn health_check_reports_ok_with_a_live_database() {
    let Some(app) = router().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn generate_endpoint_rejects_requests_without_an_api_key() {
    let Some(app) = router().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generate/text-to-image")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"client_task_id":"t1","provider":"openai-like","prompt":"a cat"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rejects_the_wrong_verification_secret() {
    let Some(app) = router().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"verification_secret":"wrong","tenant_type":"dev","tenant_identifier":"acme-dev"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_then_generate_reaches_validation_with_a_valid_key() {
    let Some(app) = router().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };

    let register = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"verification_secret":"test-secret","tenant_type":"dev","tenant_identifier":"acme-dev-2"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(register.status(), StatusCode::OK);

    let body = axum::body::to_bytes(register.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let api_key = parsed["api_key"].as_str().unwrap().to_string();

    // Missing select_prompt on search-and-recolor (spec §4.5) should surface
    // as a 400 once auth passes, proving the middleware and validation
    // layers are wired in the right order.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generate/search-and-recolor")
                .header("content-type", "application/json")
                .header("x-api-key", api_key)
                .body(Body::from(
                    r#"{"client_task_id":"t2","provider":"recraft-like","input_urls":["https://example.com/a.png"]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
