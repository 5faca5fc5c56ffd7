#![warn(missing_docs)]
#![warn(clippy::all)]

//! Material AI - a material science question-answering service
//!
//! This library provides the pieces behind the `server` binary: an answer
//! service that routes questions through an ordered chain of LLM providers
//! with a static fallback, document text extraction with keyword
//! categorization, and GitHub repository metadata lookup.
//!
//! ## Features
//! - Primary/secondary provider fallback with one bounded attempt each
//! - PDF, DOCX and plain-text extraction
//! - GitHub repository metadata
//! - Configuration from TOML plus environment credentials
//!
//! ## Usage
//! ```rust,ignore
//! use material_ai::{AnswerService, Config, Question};
//!
//! async fn example() -> material_ai::Result<()> {
//!     let config = Config::load(None)?;
//!     let service = AnswerService::from_configs(config.provider_configs())?;
//!     let result = service.answer(&Question::new("什么是304不锈钢？")?).await;
//!     println!("{} ({})", result.answer, result.source.label());
//!     Ok(())
//! }
//! ```

/// Question answering with provider fallback
pub mod answer;
/// REST API routes and handlers
pub mod api;
/// Configuration module for the application
pub mod config;
/// Document text extraction and categorization
pub mod documents;
/// Error handling types and utilities
pub mod error;
/// GitHub repository metadata
pub mod github;
/// Logging configuration and utilities
pub mod logging;

// Re-export common types
pub use answer::{AnswerResult, AnswerService, AnswerSource, Question};
pub use api::{create_app, AppState};
pub use config::Config;
pub use error::{Result, ServiceError};
