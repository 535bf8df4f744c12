//! HTTP client for the inference server, reached through the tunnel

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation can take a while on a cold model
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors talking to the inference server
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Could not reach the server (tunnel down, server not started)
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with an error status
    #[error("Server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not what we expected
    #[error("Invalid response from server: {0}")]
    Decode(String),
}

/// `/health` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub context_length: u64,
}

/// `/query` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReply {
    pub response: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the inference server's JSON API
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
}

impl InferenceClient {
    /// Client for a server at `base_url`, e.g. `http://127.0.0.1:5000`
    pub fn new(base_url: impl Into<String>) -> Result<Self, InferenceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::Request {
                url: base_url.clone(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Server and model status
    pub async fn health(&self) -> Result<HealthStatus, InferenceError> {
        let url = self.url("/health");
        let response = self.client.get(&url).send().await;
        decode(&url, response).await
    }

    /// Ask the model a question
    pub async fn query(&self, message: &str) -> Result<QueryReply, InferenceError> {
        let url = self.url("/query");
        tracing::debug!("Sending query ({} chars) to {}", message.len(), url);
        let response = self
            .client
            .post(&url)
            .json(&QueryRequest { query: message })
            .send()
            .await;
        decode(&url, response).await
    }

    /// Drop any uploaded document context
    pub async fn reset(&self) -> Result<(), InferenceError> {
        let url = self.url("/reset");
        let response = self.client.post(&url).send().await;
        let _: serde_json::Value = decode(&url, response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Result<Response>,
) -> Result<T, InferenceError> {
    let response = response.map_err(|e| InferenceError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| InferenceError::Decode(format!("Failed to read response body: {}", e)))?;
    tracing::debug!("{} -> HTTP {}", url, status);

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
        return Err(InferenceError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| InferenceError::Decode(e.to_string()))
}
