//! tablegate HTTP 网关
//!
//! 把单表的查询 / 插入 / 更新 / 删除暴露为 JSON 端点。

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::get,
    Router,
};
use tablegate::{ConnectionConfig, DbPool};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod state;

use config::{Config, ErrorMode};
use error::ApiFailure;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablegate=debug,tablegate_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_config = ConnectionConfig::from_env()?;
    tracing::info!("Starting gateway with config: {:?}", config);

    let pool = DbPool::connect(&db_config)
        .await
        .context("failed to connect to database")?;
    match pool.ping().await {
        Ok(now) => tracing::info!("database reachable, server time {}", now),
        Err(e) => tracing::warn!("database ping failed: {}", e),
    }

    let state = Arc::new(AppState::load(pool.clone(), &config).await?);
    let app = create_router(state, &config);

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}

/// 路由
fn create_router(state: Arc<AppState>, config: &Config) -> Router {
    let api = Router::new()
        .merge(handlers::records::record_routes())
        .nest("/tables/:table", handlers::records::record_routes());

    let router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api)
        .layer(from_fn_with_state(state.clone(), apply_error_mode))
        .with_state(state);

    let router = match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 信封模式下错误响应一律返回 200，只有 `error` 字段表示失败
async fn apply_error_mode(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if state.error_mode == ErrorMode::Envelope && response.extensions().get::<ApiFailure>().is_some()
    {
        *response.status_mut() = StatusCode::OK;
    }
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request as HttpRequest};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app(error_mode: ErrorMode) -> Router {
        let db = ConnectionConfig::from_url("sqlite::memory:")
            .unwrap()
            .with_max_connections(1);
        let pool = DbPool::connect(&db).await.unwrap();
        pool.execute(
            "CREATE TABLE hospital_records (id INTEGER PRIMARY KEY AUTOINCREMENT, patient_name TEXT, age INTEGER)",
        )
        .await
        .unwrap();
        pool.execute("CREATE TABLE wards (code TEXT PRIMARY KEY, beds INTEGER)")
            .await
            .unwrap();

        let config = Config {
            error_mode,
            extra_tables: vec!["wards".to_string()],
            column_aliases: vec![("name".to_string(), "patient_name".to_string())],
            ..Config::default()
        };
        let state = AppState::load(pool, &config).await.unwrap();
        create_router(Arc::new(state), &config)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = HttpRequest::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(ErrorMode::Envelope).await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let app = test_app(ErrorMode::Envelope).await;

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/records",
            Some(json!({"name": "John", "age": "42"})),
        )
        .await;
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["data"]["patient_name"], json!("John"));
        assert_eq!(body["data"]["age"], json!(42));

        let (_, body) = send(&app, Method::GET, "/api/records", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::GET, "/api/records/filter?age=42&name=John", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(
            &app,
            Method::PUT,
            "/api/records",
            Some(json!({"data": {"age": 43}, "filters": {"id": 1}})),
        )
        .await;
        assert_eq!(body["rowsAffected"], json!(1));
        assert_eq!(body["data"][0]["age"], json!(43));

        let (_, body) = send(
            &app,
            Method::DELETE,
            "/api/records",
            Some(json!({"filters": {"name": "John"}})),
        )
        .await;
        assert_eq!(body["rowsAffected"], json!(1));

        let (_, body) = send(&app, Method::GET, "/api/records", None).await;
        assert_eq!(body, json!({"data": [], "error": null}));
    }

    #[tokio::test]
    async fn test_envelope_mode_errors_are_200() {
        let app = test_app(ErrorMode::Envelope).await;

        let (status, body) = send(&app, Method::GET, "/api/records/filter", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"data": null, "error": "At least one filter required"})
        );

        let (status, body) = send(
            &app,
            Method::DELETE,
            "/api/records",
            Some(json!({"filters": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], json!("Filters required for DELETE (safety check)"));
        assert!(body.get("rowsAffected").is_none());

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/records",
            Some(json!({"data": {"age": 1}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], json!("Filters required for UPDATE (safety check)"));
    }

    #[tokio::test]
    async fn test_status_mode_maps_errors() {
        let app = test_app(ErrorMode::Status).await;

        let (status, body) = send(&app, Method::POST, "/api/records", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Data cannot be empty"));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/records",
            Some(json!({"colour": "red"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Unknown column 'colour'"));

        let (status, body) = send(&app, Method::GET, "/api/tables/staff/records", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("Unknown table 'staff'"));

        send(
            &app,
            Method::POST,
            "/api/tables/wards/records",
            Some(json!({"code": "A1", "beds": 4})),
        )
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/tables/wards/records",
            Some(json!({"code": "A1", "beds": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("UNIQUE"));
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = test_app(ErrorMode::Envelope).await;
        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/api/records")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"], Value::Null);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_table_scoped_routes() {
        let app = test_app(ErrorMode::Envelope).await;
        let (_, body) = send(
            &app,
            Method::POST,
            "/api/tables/wards/records",
            Some(json!({"code": "B2", "beds": "8"})),
        )
        .await;
        assert_eq!(body["data"], json!({"code": "B2", "beds": 8}));

        let (_, body) = send(&app, Method::GET, "/api/tables/wards/records/filter?code=B2", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::GET, "/api/tables/hospital_records/records", None).await;
        assert_eq!(body["data"], json!([]));
    }
}
