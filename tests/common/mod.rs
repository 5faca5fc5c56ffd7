#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use material_ai::answer::{AnswerProvider, ProviderFailure};
use material_ai::config::GitHubConfig;
use material_ai::documents::FileTextExtractor;
use material_ai::github::{GitHubClient, MetadataError, RepositoryMetadata, RepositoryMetadataProvider};
use material_ai::{create_app, AnswerService, AppState, Config, Question};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub mod test_helpers {
    use super::*;

    /// Provider that returns a canned outcome and counts calls
    pub struct ScriptedProvider {
        pub name: &'static str,
        pub outcome: Result<&'static str, ProviderFailure>,
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AnswerProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn ask(&self, _question: &Question) -> Result<String, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(String::from)
        }
    }

    pub fn scripted(
        name: &'static str,
        outcome: Result<&'static str, ProviderFailure>,
    ) -> (Box<dyn AnswerProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider {
            name,
            outcome,
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }

    pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Repository provider whose lookups always panic
    pub struct PanickingRepositories;

    #[async_trait]
    impl RepositoryMetadataProvider for PanickingRepositories {
        async fn repository(&self, identifier: &str) -> Result<RepositoryMetadata, MetadataError> {
            panic!("metadata lookup exploded for {}", identifier);
        }

        fn is_authenticated(&self) -> bool {
            false
        }
    }

    /// Default config pointed at the given GitHub API base
    pub fn test_config(github_api_base: &str) -> Config {
        let mut config = Config::default();
        config.github = GitHubConfig {
            api_base: github_api_base.to_string(),
            timeout_secs: 5,
        };
        config.documents.excerpt_chars = 40;
        config
    }

    /// Router over the given providers and a GitHub API base
    pub fn test_app(providers: Vec<Box<dyn AnswerProvider>>, github_api_base: &str) -> Router {
        let config = test_config(github_api_base);
        let github = GitHubClient::new(&config.github, None).expect("github client");
        app_with(config, providers, Arc::new(github))
    }

    /// Router over explicit collaborators
    pub fn app_with(
        config: Config,
        providers: Vec<Box<dyn AnswerProvider>>,
        repositories: Arc<dyn RepositoryMetadataProvider>,
    ) -> Router {
        let state = AppState::new(
            config,
            AnswerService::new(providers),
            repositories,
            Arc::new(FileTextExtractor::new()),
        );
        create_app(state)
    }

    pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    pub fn multipart_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let boundary = "material-ai-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/documents/process")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("request")
    }

    /// Sends one request through the router and decodes the JSON body
    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).expect("JSON body");
        (status, json)
    }

    pub fn setup_test_logger() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}
