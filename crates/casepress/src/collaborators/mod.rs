//! Contracts for the external systems the pipeline depends on.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::ContentDraft;

pub use http::HttpGenerationClient;

/// Source document formats the extraction collaborator may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = filename.rsplit_once('.')?.1.to_lowercase();
        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" | "doc" => Some(DocumentKind::Docx),
            "txt" | "text" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported document kind: {0:?}")]
    Unsupported(DocumentKind),

    #[error("Text extraction failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generation call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation transport error: {0}")]
    Transport(String),

    #[error("Generation quota exceeded: {0}")]
    Quota(String),

    #[error("Generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generation service returned no text")]
    EmptyResponse,

    #[error("Missing API key: environment variable {0} is not set")]
    MissingCredentials(String),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publishing rejected: {0}")]
    Rejected(String),

    #[error("Publishing transport error: {0}")]
    Transport(String),
}

/// What a generation call is for; lets fakes and logs tell calls apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    Deidentify,
    Analyze,
    Draft,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    /// System-level instruction.
    pub instruction: String,
    /// User payload: source text plus any retry hints.
    pub payload: String,
}

/// Binary content of a known kind to plain text.
#[async_trait]
pub trait TextExtraction: Send + Sync {
    async fn extract(&self, content: &[u8], kind: DocumentKind) -> Result<String, ExtractionError>;
}

/// Structured instruction plus payload to free text that should encode one
/// structured object. The text may be malformed or truncated.
#[async_trait]
pub trait Generation: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// A finished draft to a durable external reference.
#[async_trait]
pub trait Publishing: Send + Sync {
    async fn publish(&self, item_id: &str, draft: &ContentDraft) -> Result<String, PublishError>;
}

/// Decodes UTF-8 plain text; every other kind is unsupported.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtraction for PlainTextExtractor {
    async fn extract(&self, content: &[u8], kind: DocumentKind) -> Result<String, ExtractionError> {
        match kind {
            DocumentKind::PlainText => String::from_utf8(content.to_vec())
                .map_err(|e| ExtractionError::Failed(e.to_string())),
            other => Err(ExtractionError::Unsupported(other)),
        }
    }
}
