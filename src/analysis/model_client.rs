use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;

use crate::analysis::{
    credentials::{CredentialProvider, CredentialRef, ResolvedCredential},
    error::{AnalysisFailure, FailureKind, timeout, upstream_unavailable},
    prompt::PromptPayload,
};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No response generated";
const PROVIDER_BODY_LOG_CHARS: usize = 240;

/// One bounded attempt against the model provider.
///
/// Implementations classify every failure into [`FailureKind`]; raw transport
/// errors never escape.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn call(&self, prompt: &PromptPayload) -> Result<String, AnalysisFailure>;
}

#[derive(Clone)]
pub struct HttpModelClient {
    client: Client,
    endpoint: String,
    credential: CredentialRef,
    credential_provider: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl HttpModelClient {
    pub fn new(
        endpoint: impl Into<String>,
        credential: CredentialRef,
        credential_provider: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credential,
            credential_provider,
            timeout,
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    async fn exchange(
        &self,
        prompt: &PromptPayload,
        credential: ResolvedCredential,
    ) -> Result<String, AnalysisFailure> {
        let mut request = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .json(prompt);
        if let Some(auth_header) = credential.auth_header {
            request = request.header(header::AUTHORIZATION, auth_header);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status.as_u16(), &body));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(classify_transport_error)?;
        extract_content(&payload)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn call(&self, prompt: &PromptPayload) -> Result<String, AnalysisFailure> {
        let credential = self
            .credential_provider
            .resolve(&self.credential)
            .await?;

        tracing::debug!(
            target: "model_client",
            model = %prompt.model,
            timeout_ms = self.timeout.as_millis() as u64,
            "provider_call_start"
        );
        let result = bounded(self.timeout, self.exchange(prompt, credential)).await;
        if let Err(failure) = &result {
            tracing::debug!(
                target: "model_client",
                kind = ?failure.kind,
                provider_http_status = ?failure.provider_http_status,
                detail = failure.detail.as_deref().unwrap_or("-"),
                "provider_call_failed"
            );
        }
        result
    }
}

/// Runs `exchange` under a hard deadline. Elapsing is a `Timeout` failure.
pub async fn bounded<F>(limit: Duration, exchange: F) -> Result<String, AnalysisFailure>
where
    F: Future<Output = Result<String, AnalysisFailure>>,
{
    match tokio::time::timeout(limit, exchange).await {
        Ok(result) => result,
        Err(_) => Err(timeout(format!(
            "provider did not respond within {} ms",
            limit.as_millis()
        ))),
    }
}

pub fn map_http_error(status: u16, body: &str) -> AnalysisFailure {
    let kind = match status {
        401 | 403 => FailureKind::UpstreamAuth,
        429 => FailureKind::RateLimited,
        400..=499 => FailureKind::BadUpstreamRequest,
        _ => FailureKind::UpstreamUnavailable,
    };

    let normalized_body = body.chars().take(PROVIDER_BODY_LOG_CHARS).collect::<String>();
    let mut failure = AnalysisFailure::new(kind).with_provider_http_status(status);
    if !normalized_body.is_empty() {
        failure = failure.with_detail(normalized_body);
    }
    failure
}

fn classify_transport_error(err: reqwest::Error) -> AnalysisFailure {
    if err.is_timeout() {
        timeout(format!("provider transport timed out: {}", err))
    } else if err.is_decode() {
        upstream_unavailable(format!("provider body decode failed: {}", err))
    } else {
        upstream_unavailable(format!("provider request failed: {}", err))
    }
}

/// Pulls the first choice's message content out of a chat-completions body.
pub fn extract_content(payload: &Value) -> Result<String, AnalysisFailure> {
    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| upstream_unavailable("provider response missing choices"))?;

    let content = choices
        .first()
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty());

    Ok(content
        .map(str::to_string)
        .unwrap_or_else(|| EMPTY_RESPONSE_PLACEHOLDER.to_string()))
}
