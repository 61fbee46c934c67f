use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use biome_ai::{BiomePipeline, CodeModel, PipelineConfig, PipelineError};
use biome_core::ChunkSet;
use biome_script::ExecLimits;

pub fn app<C: CodeModel + 'static>(pipeline: BiomePipeline<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate::<C>))
        .layer(cors_layer())
        .with_state(Arc::new(pipeline))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Server configuration resolved from the environment with fixed defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let exec_defaults = ExecLimits::default();
        Self {
            port: env_u64("BIOMEGEN_PORT", 8080) as u16,
            pipeline: PipelineConfig {
                max_attempts: env_usize("BIOMEGEN_MAX_ATTEMPTS", 3),
                retry_delay: Duration::from_millis(env_u64("BIOMEGEN_RETRY_DELAY_MS", 1000)),
                max_tokens: env_u64("BIOMEGEN_MAX_TOKENS", 4000) as u32,
                chunk_chars: env_usize("BIOMEGEN_CHUNK_CHARS", 10_000),
                exec_limits: ExecLimits {
                    max_operations: env_u64(
                        "BIOMEGEN_SCRIPT_MAX_OPS",
                        exec_defaults.max_operations,
                    ),
                    wall_clock: Duration::from_millis(env_u64(
                        "BIOMEGEN_SCRIPT_BUDGET_MS",
                        exec_defaults.wall_clock.as_millis() as u64,
                    )),
                    ..exec_defaults
                },
            },
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput => ApiError::bad_request("Missing 'search' value"),
            other => ApiError::bad_gateway(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn generate<C: CodeModel + 'static>(
    State(pipeline): State<Arc<BiomePipeline<C>>>,
    body: Bytes,
) -> Result<Json<ChunkSet>, ApiError> {
    let request: GenerateRequest = parse_json(&body)?;
    let theme = request.search.unwrap_or_default();

    info!(theme = %theme.trim(), "generation requested");
    let chunks = pipeline.run(&theme).await?;
    Ok(Json(chunks))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::response::Response;
    use http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use biome_ai::{BiomePipeline, CodeModel, PipelineConfig};

    use super::app;

    struct FixedModel {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl CodeModel for FixedModel {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, String> {
            self.reply.clone()
        }
    }

    fn test_app(reply: Result<&str, &str>) -> Router {
        let pipeline = BiomePipeline::new(
            FixedModel {
                reply: reply.map(str::to_string).map_err(str::to_string),
            },
            PipelineConfig {
                retry_delay: Duration::ZERO,
                ..PipelineConfig::default()
            },
        );
        app(pipeline)
    }

    async fn send_json(router: Router, method: Method, uri: &str, payload: Value) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request should build");

        router.oneshot(request).await.expect("request should complete")
    }

    async fn parse_json_response<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body should be valid JSON")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_app(Ok("emit(\"[]\");"))
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: Value = parse_json_response(response).await;
        assert_eq!(payload, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn generate_returns_numbered_chunks() {
        let script = r#"
            let records = [];
            records.push(block_record(0, 65, 0, "blackstone"));
            records.push(block_record(1, 65, 0, "basalt"));
            emit_blocks(records);
        "#;
        let response = test_app(Ok(script))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"search": "volcanic"}).to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: BTreeMap<String, String> = parse_json_response(response).await;
        assert_eq!(
            payload.get("1").map(String::as_str),
            Some("0,65,0;blackstone|1,65,0;basalt")
        );
    }

    #[tokio::test]
    async fn missing_search_is_rejected() {
        let response = send_json(
            test_app(Ok("emit(\"[]\");")),
            Method::POST,
            "/generate",
            json!({}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload: Value = parse_json_response(response).await;
        assert_eq!(payload["error"], "Missing 'search' value");
    }

    #[tokio::test]
    async fn whitespace_search_is_rejected() {
        let response = send_json(
            test_app(Ok("emit(\"[]\");")),
            Method::POST,
            "/generate",
            json!({"search": "   "}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let response = test_app(Ok("emit(\"[]\");"))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/generate")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_bad_gateway() {
        let response = send_json(
            test_app(Err("model unavailable")),
            Method::POST,
            "/generate",
            json!({"search": "volcanic"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let payload: Value = parse_json_response(response).await;
        let message = payload["error"].as_str().expect("error should be a string");
        assert!(message.contains("model unavailable"));
    }

    #[tokio::test]
    async fn undecodable_script_output_maps_to_bad_gateway() {
        let response = send_json(
            test_app(Ok(r#"emit("not json");"#)),
            Method::POST,
            "/generate",
            json!({"search": "volcanic"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
