//! Logging init, following the teacher's `ai-service::main` convention:
//! `tracing_subscriber::fmt()` with an env-filter defaulted per binary.

pub fn init(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
        )
        .init();
}
