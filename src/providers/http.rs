//! JSON-over-HTTP intent service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{check_http_response, IntentService, ServiceError, ServiceIntent};
use crate::types::Message;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Request body sent to the service.
#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest<'a> {
    /// Message id.
    pub id: &'a str,
    /// Raw sender.
    pub from: &'a str,
    /// Subject line.
    pub subject: &'a str,
    /// Body text.
    pub body: &'a str,
}

impl<'a> From<&'a Message> for ServiceRequest<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            id: &message.id,
            from: &message.from,
            subject: message.subject_text(),
            body: &message.body,
        }
    }
}

/// Parse and check a service response body.
///
/// # Errors
///
/// Returns [`ServiceError::Parse`] for malformed JSON or a confidence
/// outside `[0, 1]`.
#[doc(hidden)]
pub fn parse_service_response(body: &str) -> Result<ServiceIntent, ServiceError> {
    let intent: ServiceIntent =
        serde_json::from_str(body).map_err(|e| ServiceError::Parse(e.to_string()))?;
    if intent.intent.trim().is_empty() {
        return Err(ServiceError::Parse("empty intent".to_owned()));
    }
    if !(0.0..=1.0).contains(&intent.confidence) {
        return Err(ServiceError::Parse(format!(
            "confidence {} outside [0, 1]",
            intent.confidence
        )));
    }
    Ok(intent)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Intent service reached by `POST <endpoint>` with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpIntentService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpIntentService {
    /// Client for `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidUrl`] for a malformed or non-HTTP
    /// endpoint and [`ServiceError::Request`] if the client cannot be
    /// built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| ServiceError::InvalidUrl(format!("{endpoint}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ServiceError::InvalidUrl(format!(
                "{endpoint}: scheme must be http or https"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl IntentService for HttpIntentService {
    async fn classify(&self, message: &Message) -> Result<ServiceIntent, ServiceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ServiceRequest::from(message))
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_service_response(&body)
    }

    fn name(&self) -> &str {
        self.endpoint.host_str().unwrap_or("http")
    }
}
