//! External intent service: an optional richer classifier consulted ahead
//! of the local patterns.
//!
//! The service sits outside the deterministic core. Every failure mode
//! (transport, status, schema, timeout) is caught by
//! [`classify_with_fallback`] and turned into a labelled fallback so the
//! pipeline keeps its local result instead of surfacing an error.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::Message;

pub mod http;

pub use http::HttpIntentService;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Intent returned by an external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceIntent {
    /// Intent id.
    pub intent: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Result of consulting the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    /// The service answered.
    Remote(ServiceIntent),
    /// The service failed; the caller keeps its local result.
    Fallback {
        /// Human-readable reason, surfaced as the run's warning.
        warning: String,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by intent services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// HTTP transport failure.
    #[error("intent service request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream responded with an error status.
    #[error("intent service returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match the expected schema.
    #[error("intent service response parse error: {0}")]
    Parse(String),
    /// No answer within the deadline.
    #[error("intent service timed out after {0} ms")]
    Timeout(u64),
    /// Service endpoint is not a usable URL.
    #[error("invalid intent service url: {0}")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ServiceError::Request` on transport failure, `ServiceError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ServiceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ServiceError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Error bodies may echo the message back; email addresses are redacted
/// and long bodies truncated before they reach logs.
fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    if let Ok(regex) = Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}") {
        sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// External intent classifier.
///
/// Implementations must be `Send + Sync` so one instance can serve
/// concurrent classification runs.
#[async_trait]
pub trait IntentService: Send + Sync {
    /// Classify one message.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] on transport, status or parse failure.
    async fn classify(&self, message: &Message) -> Result<ServiceIntent, ServiceError>;

    /// Service name for logs and warnings.
    fn name(&self) -> &str;
}

/// Consult `service`, converting any failure or timeout into
/// [`ServiceOutcome::Fallback`].
pub async fn classify_with_fallback(
    service: &dyn IntentService,
    message: &Message,
    timeout: Duration,
) -> ServiceOutcome {
    let result = match tokio::time::timeout(timeout, service.classify(message)).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    };
    match result {
        Ok(intent) => {
            debug!(
                service = service.name(),
                message_id = %message.id,
                intent = %intent.intent,
                "intent service answered"
            );
            ServiceOutcome::Remote(intent)
        }
        Err(e) => {
            warn!(
                service = service.name(),
                message_id = %message.id,
                error = %e,
                "intent service failed; using local classification"
            );
            ServiceOutcome::Fallback {
                warning: format!(
                    "intent service {} unavailable ({e}); intent comes from local patterns",
                    service.name()
                ),
            }
        }
    }
}
