use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by the ingestion pipeline and the query surface.
pub mod codes {
    pub const MALFORMED_DOCUMENT: &str = "RAG_MALFORMED_DOCUMENT";
    pub const EMPTY_CORPUS: &str = "RAG_EMPTY_CORPUS";
    pub const CORRUPT_INDEX: &str = "RAG_CORRUPT_INDEX";
    pub const EMBEDDING_UNAVAILABLE: &str = "RAG_EMBEDDING_UNAVAILABLE";
    pub const UPSTREAM_UNAVAILABLE: &str = "RAG_UPSTREAM_UNAVAILABLE";
    pub const MODEL_MISMATCH: &str = "RAG_MODEL_MISMATCH";
    pub const INDEX_NOT_READY: &str = "RAG_INDEX_NOT_READY";
    pub const INVALID_QUERY: &str = "RAG_INVALID_QUERY";

    pub const CONFIG_INVALID: &str = "RAG_CONFIG_INVALID";
    pub const INDEX_IO_FAILED: &str = "RAG_INDEX_IO_FAILED";
    pub const VALIDATION_FAILED: &str = "RAG_VALIDATION_FAILED";
    pub const REMOTE_NOT_ALLOWED: &str = "RAG_REMOTE_NOT_ALLOWED";
}

/// Single structured error shape used across the pipeline, the index and the query surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::new(codes::MALFORMED_DOCUMENT, message)
    }

    pub fn corrupt_index(message: impl Into<String>) -> Self {
        Self::new(codes::CORRUPT_INDEX, message)
    }

    pub fn index_io(message: impl Into<String>) -> Self {
        Self::new(codes::INDEX_IO_FAILED, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIG_INVALID, message)
    }

    /// Transient, request-scoped upstream failure. The caller owns the retry policy.
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::UPSTREAM_UNAVAILABLE, message).with_retryable(true)
    }

    pub fn index_not_ready(message: impl Into<String>) -> Self {
        Self::new(codes::INDEX_NOT_READY, message).with_retryable(true)
    }

    pub fn embedding_unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::EMBEDDING_UNAVAILABLE, message).with_retryable(true)
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_QUERY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "[{}] {} ({})", self.code, self.message, details),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
