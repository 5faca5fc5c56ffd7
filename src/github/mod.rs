use crate::config::GitHubConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const GITHUB_HOST: &str = "github.com";

/// Why repository metadata could not be returned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The identifier is not `owner/repo` or a GitHub repository URL
    #[error("无效的仓库地址: {0}")]
    InvalidIdentifier(String),
    /// The repository does not exist or is private
    #[error("仓库不存在: {0}")]
    NotFound(String),
    /// The token was missing, wrong or lacks access
    #[error("GitHub 认证失败")]
    Unauthorized,
    /// The API rate limit is exhausted
    #[error("GitHub API 请求次数已达上限")]
    RateLimited {
        /// Epoch seconds at which the limit resets, when reported
        reset: Option<i64>,
    },
    /// Transport failure or unexpected response
    #[error("GitHub API 错误: {0}")]
    Upstream(String),
}

/// Owner and name of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentifier {
    /// Account or organization
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl RepoIdentifier {
    /// Accepts `owner/repo`, `github.com/owner/repo` and full GitHub URLs
    pub fn parse(input: &str) -> std::result::Result<Self, MetadataError> {
        let invalid = || MetadataError::InvalidIdentifier(input.to_string());
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let path = if trimmed.contains("://") {
            let url = Url::parse(trimmed).map_err(|_| invalid())?;
            match url.host_str() {
                Some(host) if host == GITHUB_HOST || host == "www.github.com" => {}
                _ => return Err(invalid()),
            }
            url.path().to_string()
        } else if let Some(rest) = trimmed
            .strip_prefix("www.github.com/")
            .or_else(|| trimmed.strip_prefix("github.com/"))
        {
            rest.to_string()
        } else {
            trimmed.to_string()
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        let valid = |s: &str| {
            !s.is_empty()
                && !s.chars().all(|c| c == '.')
                && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(repo) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Repository metadata returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryMetadata {
    /// `owner/repo`
    pub full_name: String,
    /// Repository name
    pub name: String,
    /// Owning account
    pub owner: String,
    /// Free-form description
    pub description: Option<String>,
    /// Web URL
    pub url: String,
    /// Primary language
    pub language: Option<String>,
    /// Stargazer count
    pub stars: u64,
    /// Fork count
    pub forks: u64,
    /// Watcher count
    pub watchers: u64,
    /// Open issue count
    pub open_issues: u64,
    /// Default branch name
    pub default_branch: Option<String>,
    /// Repository topics
    pub topics: Vec<String>,
    /// SPDX license identifier
    pub license: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last metadata update
    pub updated_at: Option<DateTime<Utc>>,
    /// Last push
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    full_name: String,
    owner: Owner,
    description: Option<String>,
    html_url: String,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    watchers_count: u64,
    #[serde(default)]
    open_issues_count: u64,
    default_branch: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    license: Option<License>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct License {
    spdx_id: Option<String>,
}

impl From<Repository> for RepositoryMetadata {
    fn from(repo: Repository) -> Self {
        Self {
            full_name: repo.full_name,
            name: repo.name,
            owner: repo.owner.login,
            description: repo.description,
            url: repo.html_url,
            language: repo.language,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            watchers: repo.watchers_count,
            open_issues: repo.open_issues_count,
            default_branch: repo.default_branch,
            topics: repo.topics,
            license: repo.license.and_then(|l| l.spdx_id),
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            pushed_at: repo.pushed_at,
        }
    }
}

/// Looks up repository metadata by identifier
#[async_trait]
pub trait RepositoryMetadataProvider: Send + Sync {
    /// Fetches metadata for `owner/repo` or a repository URL
    async fn repository(&self, identifier: &str) -> std::result::Result<RepositoryMetadata, MetadataError>;

    /// Whether requests are authenticated
    fn is_authenticated(&self) -> bool;
}

/// GitHub REST API client
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a client against the configured API base
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("material-ai/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl RepositoryMetadataProvider for GitHubClient {
    async fn repository(&self, identifier: &str) -> std::result::Result<RepositoryMetadata, MetadataError> {
        let id = RepoIdentifier::parse(identifier)?;
        let url = format!("{}/repos/{}/{}", self.api_base, id.owner, id.repo);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetadataError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error = classify_status(status, response.headers(), &id);
            warn!(repository = %id.full_name(), status = status.as_u16(), error = %error, "GitHub lookup failed");
            return Err(error);
        }

        let repository = response
            .json::<Repository>()
            .await
            .map_err(|e| MetadataError::Upstream(e.to_string()))?;

        info!(repository = %id.full_name(), "Fetched GitHub repository metadata");
        Ok(repository.into())
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

fn classify_status(status: StatusCode, headers: &HeaderMap, id: &RepoIdentifier) -> MetadataError {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let reset = header_value("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok());
    let exhausted = header_value("x-ratelimit-remaining").as_deref() == Some("0");

    match status {
        StatusCode::NOT_FOUND => MetadataError::NotFound(id.full_name()),
        StatusCode::UNAUTHORIZED => MetadataError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => MetadataError::RateLimited { reset },
        StatusCode::FORBIDDEN if exhausted => MetadataError::RateLimited { reset },
        StatusCode::FORBIDDEN => MetadataError::Unauthorized,
        other => MetadataError::Upstream(format!("unexpected status {}", other)),
    }
}
