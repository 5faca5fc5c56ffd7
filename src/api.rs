use crate::answer::{AnswerService, Question};
use crate::config::Config;
use crate::documents::{DocumentAnalysis, DocumentTextExtractor, ExtractionError, FileTextExtractor};
use crate::error::{Result, ServiceError};
use crate::github::{GitHubClient, MetadataError, RepositoryMetadata, RepositoryMetadataProvider};
use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "Material AI";
const INTERNAL_ERROR_MESSAGE: &str = "服务器内部错误，请稍后重试";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Question answering chain
    pub answers: Arc<AnswerService>,
    /// Repository metadata lookup
    pub repositories: Arc<dyn RepositoryMetadataProvider>,
    /// Document text extraction
    pub documents: Arc<dyn DocumentTextExtractor>,
    /// Process start time for uptime reporting
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the production collaborators from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let answers = AnswerService::from_configs(config.provider_configs())?;
        let repositories = GitHubClient::new(&config.github, config.api_keys.github_token.clone())?;
        let documents = FileTextExtractor::with_max_text_bytes(config.documents.max_text_bytes);
        Ok(Self::new(
            config,
            answers,
            Arc::new(repositories),
            Arc::new(documents),
        ))
    }

    /// Assembles state from explicit collaborators
    pub fn new(
        config: Config,
        answers: AnswerService,
        repositories: Arc<dyn RepositoryMetadataProvider>,
        documents: Arc<dyn DocumentTextExtractor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            answers: Arc::new(answers),
            repositories,
            documents,
            started_at: Utc::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Current status
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
    /// Whether at least one answer provider is configured
    pub ai_service_available: bool,
    /// Configured answer providers in priority order
    pub providers: Vec<String>,
    /// Whether GitHub requests are authenticated
    pub github_token_configured: bool,
    /// Whether the external database URL and key are both set
    pub database_configured: bool,
}

/// Request payload for the chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Question text
    pub question: Option<String>,
}

/// Response for the chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Always true; failures use the error envelope
    pub success: bool,
    /// Trimmed question
    pub question: String,
    /// Provider or fallback answer
    pub answer: String,
    /// Name of the provider, or `fallback`
    pub provider: String,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

/// Request payload for repository analysis
#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryRequest {
    /// `owner/repo` or a GitHub URL
    pub repo_url: Option<String>,
}

/// Response for repository analysis
#[derive(Debug, Serialize)]
pub struct RepositoryResponse {
    /// Always true; failures use the error envelope
    pub success: bool,
    /// Repository metadata
    pub repository: RepositoryMetadata,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

/// Response for document processing
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    /// Always true; failures use the error envelope
    pub success: bool,
    /// Extraction and categorization summary
    pub analysis: DocumentAnalysis,
}

/// Error returned by handlers, rendered as `{success: false, error}`
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid caller input
    Validation(String),
    /// Upload format not supported
    UnsupportedMedia(String),
    /// Upload could not be parsed
    Unprocessable(String),
    /// Body over the configured limit
    PayloadTooLarge(String),
    /// Requested resource does not exist
    NotFound(String),
    /// Upstream rejected our credentials
    Unauthorized(String),
    /// Upstream rate limit exhausted
    RateLimited(String),
    /// Upstream failed
    BadGateway(String),
    /// Anything unexpected; details are logged, not returned
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMedia(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        let message = err.to_string();
        match err {
            MetadataError::InvalidIdentifier(_) => ApiError::Validation(message),
            MetadataError::NotFound(_) => ApiError::NotFound(message),
            MetadataError::Unauthorized => ApiError::Unauthorized(message),
            MetadataError::RateLimited { .. } => ApiError::RateLimited(message),
            MetadataError::Upstream(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        let message = err.to_string();
        match err {
            ExtractionError::UnsupportedFormat(_) => ApiError::UnsupportedMedia(message),
            ExtractionError::Unreadable { .. } | ExtractionError::Empty(_) => {
                ApiError::Unprocessable(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("请求体不是有效的 JSON: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(format!("无效的文件上传请求: {}", rejection.body_text()))
    }
}

/// Create the main application with all routes
pub fn create_app(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/test", get(smoke_test))
        .route("/api/chat", post(chat))
        .route("/api/github/analyze", post(analyze_repository))
        .route(
            "/api/documents/process",
            post(process_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Root endpoint - returns basic service information
async fn index() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "材料科学智能问答服务",
        "endpoints": {
            "health": "/api/health",
            "test": "/api/test",
            "chat": "/api/chat",
            "github": "/api/github/analyze",
            "documents": "/api/documents/process"
        }
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime_seconds: (now - state.started_at).num_seconds().max(0) as u64,
        ai_service_available: state.answers.is_available(),
        providers: state.answers.provider_names(),
        github_token_configured: state.repositories.is_authenticated(),
        database_configured: state.config.api_keys.database_configured(),
    })
}

async fn smoke_test() -> Json<Value> {
    Json(json!({
        "message": "API 测试成功",
        "timestamp": Utc::now()
    }))
}

/// Answer a question through the provider chain
async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let question = Question::new(request.question.unwrap_or_default())?;
    info!(chars = question.as_str().chars().count(), "Answering question");

    let result = state.answers.answer(&question).await;

    Ok(Json(ChatResponse {
        success: true,
        question: question.as_str().to_string(),
        provider: result.source.label().to_string(),
        answer: result.answer,
        timestamp: Utc::now(),
    }))
}

/// Look up repository metadata
async fn analyze_repository(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RepositoryRequest>, JsonRejection>,
) -> std::result::Result<Json<RepositoryResponse>, ApiError> {
    let Json(request) = payload?;
    let identifier = request
        .repo_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("repo_url 不能为空".to_string()))?;

    info!(repository = %identifier, "Analyzing repository");
    let repository = state.repositories.repository(&identifier).await?;

    Ok(Json(RepositoryResponse {
        success: true,
        repository,
        timestamp: Utc::now(),
    }))
}

/// Extract and categorize an uploaded document
async fn process_document(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<DocumentResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().trim().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::Validation("未上传文件".to_string()))?;
    if file_name.is_empty() {
        return Err(ApiError::Validation("未选择文件".to_string()));
    }
    info!(file = %file_name, bytes = bytes.len(), "Processing document");

    let extractor = Arc::clone(&state.documents);
    let name = file_name.clone();
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&name, &bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("extraction task failed: {}", e)))?
        .map_err(|e| {
            warn!(file = %file_name, error = %e, "Document extraction failed");
            ApiError::from(e)
        })?;

    let analysis = DocumentAnalysis::new(&file_name, &extracted, state.config.documents.excerpt_chars);
    Ok(Json(DocumentResponse {
        success: true,
        analysis,
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("上传文件过大".to_string())
    } else {
        ApiError::Validation(format!("无效的文件上传请求: {}", err.body_text()))
    }
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(format!("handler panicked: {}", detail)).into_response()
}
