// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use bday_config::model::SenderConfig;
use bday_core::{
    AdapterType, BdayError, HealthStatus, NotificationSender, PluginAdapter, SendError,
    SendRequest,
};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, warn};

/// Header carrying [`SendRequest::idempotency_key`] so the remote can drop replays.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest response body kept in a [`SendError::RemoteError`].
const MAX_ERROR_BODY: usize = 512;

/// Posts send requests to a remote HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSender {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BdayError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BdayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Build from `[sender]`. Fails when no endpoint is configured.
    pub fn from_config(config: &SenderConfig) -> Result<Self, BdayError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| BdayError::Config("sender.endpoint is not set".into()))?;
        Self::new(endpoint, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PluginAdapter for HttpSender {
    fn name(&self) -> &str {
        "http-sender"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for HttpSender {
    async fn send(&self, request: &SendRequest) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout(self.timeout)
                } else {
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        debug!(message_id = %request.message_id, status = %status, "send response received");
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            warn!(message_id = %request.message_id, ?retry_after, "remote is rate limiting");
            return Err(SendError::RateLimited { retry_after });
        }

        let mut body = response.text().await.unwrap_or_default();
        truncate(&mut body, MAX_ERROR_BODY);
        Err(SendError::RemoteError {
            code: status.as_u16(),
            body,
        })
    }
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(body: &mut String, max: usize) {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> SendRequest {
        SendRequest {
            message_id: "m-1".into(),
            user_id: "u-1".into(),
            message_type: "birthday".into(),
            idempotency_key: "abc123".into(),
            content: "Hey, Ada it's your birthday".into(),
        }
    }

    async fn sender_for(server: &MockServer) -> HttpSender {
        HttpSender::new(format!("{}/send", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_json_with_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header(IDEMPOTENCY_HEADER, "abc123"))
            .and(body_partial_json(serde_json::json!({
                "message_id": "m-1",
                "message_type": "birthday",
                "content": "Hey, Ada it's your birthday"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        sender_for(&server).await.send(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .mount(&server)
            .await;

        let err = sender_for(&server).await.send(&request()).await.unwrap_err();
        assert_eq!(
            err,
            SendError::RateLimited {
                retry_after: Some(Duration::from_secs(120))
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rate_limit_without_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = sender_for(&server).await.send(&request()).await.unwrap_err();
        assert_eq!(err, SendError::RateLimited { retry_after: None });
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown recipient"))
            .mount(&server)
            .await;

        let err = sender_for(&server).await.send(&request()).await.unwrap_err();
        assert_eq!(
            err,
            SendError::RemoteError {
                code: 400,
                body: "unknown recipient".into()
            }
        );
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;

        let err = sender_for(&server).await.send(&request()).await.unwrap_err();
        match &err {
            SendError::RemoteError { code, body } => {
                assert_eq!(*code, 503);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn slow_remote_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let sender =
            HttpSender::new(format!("{}/send", server.uri()), Duration::from_millis(200)).unwrap();
        let err = sender.send(&request()).await.unwrap_err();
        assert_eq!(err, SendError::Timeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Nothing listens on port 9 locally.
        let sender = HttpSender::new("http://127.0.0.1:9/send", Duration::from_secs(2)).unwrap();
        let err = sender.send(&request()).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)), "got: {err:?}");
    }

    #[test]
    fn from_config_requires_an_endpoint() {
        let mut config = SenderConfig::default();
        assert!(matches!(
            HttpSender::from_config(&config),
            Err(BdayError::Config(_))
        ));
        config.endpoint = Some("http://localhost:8080/notify".into());
        let sender = HttpSender::from_config(&config).unwrap();
        assert_eq!(sender.endpoint(), "http://localhost:8080/notify");
    }
}
