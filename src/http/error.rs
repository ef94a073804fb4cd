//! HTTP adapter error taxonomy.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use super::retry_after::parse_retry_after;
use crate::classify::{
    classify_capabilities, classify_error_chain, Classification, RetryCapabilities,
};
use crate::ContextError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Network-level failure before a response was obtained.
#[derive(Debug)]
pub struct TransportError {
    source: BoxError,
}

impl TransportError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self { source: err.into() }
    }

    /// Classify by walking the source chain for known transport conditions.
    pub fn classify(&self) -> Classification {
        let root: &(dyn StdError + 'static) = &*self.source;
        let mut current = Some(root);
        while let Some(err) = current {
            if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
                if req_err.is_timeout() {
                    return Classification::retryable("timeout");
                }
                if req_err.is_connect() {
                    return Classification::retryable("connect failed");
                }
            }
            if let Some(ctx_err) = err.downcast_ref::<ContextError>() {
                if let Some(c) = classify_capabilities(ctx_err) {
                    return c;
                }
            }
            current = err.source();
        }
        classify_error_chain(root).unwrap_or_else(|| Classification::permanent("transport error"))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.source)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

/// A response whose status was not in the accepted set.
#[derive(Debug, Clone)]
pub struct StatusCodeError {
    pub status: StatusCode,
    /// Whether the status was judged retryable when the error was created.
    pub retryable: bool,
    pub headers: HeaderMap,
    /// Body drained from the response, truncated at the byte ceiling.
    pub body: Bytes,
}

impl fmt::Display for StatusCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected status code {}", self.status)
    }
}

impl StdError for StatusCodeError {}

/// The response was accepted but its body could not be turned into the target type.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid xml body: {0}")]
    Xml(#[from] quick_xml::de::DeError),
    #[error("unsupported content encoding {0:?}")]
    UnsupportedContentEncoding(String),
    #[error("failed to decompress body: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("{0}")]
    Custom(BoxError),
}

impl DecodeError {
    pub fn custom(err: impl Into<BoxError>) -> Self {
        DecodeError::Custom(err.into())
    }
}

/// Error produced by [`HttpRetrier`](super::HttpRetrier).
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Status(#[from] StatusCodeError),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status(e) => Some(e.status),
            _ => None,
        }
    }

    /// Server-requested delay from a `Retry-After` header on a status error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HttpError::Status(e) => parse_retry_after(&e.headers),
            _ => None,
        }
    }

    /// Default classification used by the HTTP adapter.
    pub fn classification(&self) -> Classification {
        match self {
            HttpError::Transport(e) => e.classify(),
            HttpError::Status(e) if e.retryable => {
                Classification::retryable(format!("status {}", e.status.as_u16()))
            }
            HttpError::Status(e) => {
                Classification::permanent(format!("status {}", e.status.as_u16()))
            }
            HttpError::Decode(_) => Classification::permanent("decode failed"),
            HttpError::Request(_) => Classification::permanent("invalid request"),
            HttpError::Context(e) => classify_capabilities(e)
                .unwrap_or_else(|| Classification::permanent("context done")),
        }
    }
}

impl RetryCapabilities for HttpError {
    fn is_retryable(&self) -> Option<bool> {
        Some(self.classification().is_retryable())
    }

    fn is_timeout(&self) -> Option<bool> {
        match self {
            HttpError::Context(e) => e.is_timeout(),
            _ => None,
        }
    }
}
