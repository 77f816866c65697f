#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client behaviour against a mock HTTP server

use clinical_scribe::config::Config;
use clinical_scribe::embeddings::Embedder;
use clinical_scribe::embeddings::ollama::OllamaClient;
use clinical_scribe::generation::{CompletionProvider, GenerationError};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn create_client(server: &MockServer, temp_dir: &TempDir) -> OllamaClient {
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.host = server.address().ip().to_string();
    config.ollama.port = server.address().port();
    config.ollama.embedding_model = "nomic-embed-text:latest".to_string();
    config.ollama.generation_model = "llama3.1:8b".to_string();
    config.ollama.embedding_dimension = 3;
    config.ollama.batch_size = 2;

    OllamaClient::new(&config)
        .expect("should create client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(3)
        .with_backoff_unit(Duration::from_millis(1))
}

/// Run a blocking client call off the async runtime
async fn blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task should not panic")
}

#[tokio::test]
async fn generate_returns_completion_text() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "prompt": "Summarize the visit",
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "response": "Physical Exam: Lungs clear.",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.complete("Summarize the visit")).await;

    assert_eq!(result.as_deref(), Ok("Physical Exam: Lungs clear."));
}

#[tokio::test]
async fn server_errors_are_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.generate("prompt")).await;

    assert_eq!(result.as_deref(), Ok("ok"));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "model not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.generate("prompt")).await;

    assert!(matches!(result, Err(GenerationError::Provider(_))));
}

#[tokio::test]
async fn persistent_rate_limiting_surfaces() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.generate("prompt")).await;

    let error = result.expect_err("should fail");
    assert!(matches!(error, GenerationError::RateLimited(_)));
}

#[tokio::test]
async fn malformed_completion_is_reported() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.generate("prompt")).await;

    assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
}

#[tokio::test]
async fn slow_server_times_out() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "late" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir)
        .with_timeout(Duration::from_millis(200))
        .with_retry_attempts(1);
    let result = blocking(move || client.generate("prompt")).await;

    assert!(matches!(result, Err(GenerationError::Timeout(_))));
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "authorized" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.host = server.address().ip().to_string();
    config.ollama.port = server.address().port();
    config.apply_api_key(Some("secret-token".to_string()));
    let client = OllamaClient::new(&config).expect("should create client");

    let result = blocking(move || client.generate("prompt")).await;
    assert_eq!(result.as_deref(), Ok("authorized"));
}

#[tokio::test]
async fn embeddings_are_batched_in_order() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["first", "second"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["third"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 0.0, 1.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let texts = vec![
        "first".to_string(),
        "second".to_string(),
        "third".to_string(),
    ];
    let vectors = blocking(move || client.embed_batch(&texts))
        .await
        .expect("should embed");

    assert_eq!(
        vectors,
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0]
        ]
    );
}

#[tokio::test]
async fn embedding_dimension_mismatch_is_rejected() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let result = blocking(move || client.embed("short vector")).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn health_check_requires_both_models() {
    init_test_tracing();
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "nomic-embed-text:latest" },
                { "name": "llama3.1:8b" }
            ]
        })))
        .mount(&server)
        .await;

    let client = create_client(&server, &temp_dir);
    let healthy = client.clone();
    assert!(blocking(move || healthy.health_check()).await.is_ok());

    let models = blocking(move || client.list_models())
        .await
        .expect("should list models");
    assert_eq!(models.len(), 2);

    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.host = server.address().ip().to_string();
    config.ollama.port = server.address().port();
    config.ollama.generation_model = "missing:latest".to_string();
    let unhealthy = OllamaClient::new(&config).expect("should create client");
    assert!(blocking(move || unhealthy.health_check()).await.is_err());
}
