//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. The per-API modules
//! never interpret status codes.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::{codes, ApiError, ApiResult};

/// Error envelope returned by the workspace APIs.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP backend for making requests (holds reqwest client, auth, retry budget).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) token_provider: TokenProvider,
    pub(crate) max_retries: u32,
}

impl HttpBackend {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON response body.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let response = self.request(method, path, body, query).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                message: format!("failed to decode {} response: {}", path, e),
            })
    }

    /// Send a request whose response body is irrelevant.
    pub(crate) async fn ack(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<()> {
        self.request(method, path, body, &[]).await.map(|_| ())
    }

    /// Make a request, retrying transient failures with jittered backoff.
    ///
    /// Only idempotent methods are repeated after a failure the server may
    /// already have acted on. A POST is repeated only when it was rate
    /// limited or never left this process.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        query: &[(&str, String)],
    ) -> ApiResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.max_retries;

        loop {
            let result = self
                .request_once(method.clone(), path, body.as_ref(), query)
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if may_resend(&method, &e) && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        ApiError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(Duration::from_secs(30));
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff = Duration::from_secs(1 << retries);
                            let base_backoff = base_backoff.min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        error = %e,
                        path = path,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
        query: &[(&str, String)],
    ) -> ApiResult<reqwest::Response> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "sending request");

        let mut request = self.client.request(method, &url);
        if let Some(auth) = self.token_provider.bearer() {
            request = request.header(AUTHORIZATION, auth);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = read_error_body(response).await;
                Err(ApiError::Unauthorized {
                    message: body
                        .message
                        .unwrap_or_else(|| "invalid or expired token".to_string()),
                })
            }

            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(ApiError::RateLimited { retry_after })
            }

            s if s.is_server_error() => {
                let body = read_error_body(response).await;
                Err(ApiError::Server {
                    status: s.as_u16(),
                    message: body.message.unwrap_or_else(|| s.to_string()),
                })
            }

            s => {
                let body = read_error_body(response).await;
                Err(classify_client_error(s, body))
            }
        }
    }
}

fn is_idempotent(method: &reqwest::Method) -> bool {
    use reqwest::Method;
    [Method::GET, Method::HEAD, Method::PUT, Method::DELETE, Method::OPTIONS].contains(method)
}

fn may_resend(method: &reqwest::Method, error: &ApiError) -> bool {
    if is_idempotent(method) {
        error.is_retryable()
    } else {
        error.is_unprocessed()
    }
}

async fn read_error_body(response: reqwest::Response) -> ErrorBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
        error_code: None,
        message: (!text.trim().is_empty()).then_some(text),
    })
}

/// Map a 4xx response onto the typed taxonomy, keyed on `error_code`.
fn classify_client_error(status: StatusCode, body: ErrorBody) -> ApiError {
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
    match body.error_code.as_deref() {
        Some(codes::RESOURCE_ALREADY_EXISTS) => ApiError::AlreadyExists { message },
        Some(codes::RESOURCE_DOES_NOT_EXIST) => ApiError::NotFound { message },
        _ if status == StatusCode::NOT_FOUND => ApiError::NotFound { message },
        code => ApiError::Rejected {
            status: status.as_u16(),
            error_code: code.unwrap_or("UNKNOWN").to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: Option<&str>, message: &str) -> ErrorBody {
        ErrorBody {
            error_code: code.map(String::from),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn already_exists_is_keyed_on_error_code_not_text() {
        let err = classify_client_error(
            StatusCode::BAD_REQUEST,
            body(Some("RESOURCE_ALREADY_EXISTS"), "reworded by a newer API version"),
        );
        assert!(err.is_already_exists());

        let err = classify_client_error(
            StatusCode::BAD_REQUEST,
            body(
                Some("INVALID_PARAMETER_VALUE"),
                "SQL warehouse with name `x` already exists",
            ),
        );
        assert!(!err.is_already_exists());
    }

    #[test]
    fn post_is_resent_only_when_unprocessed() {
        use reqwest::Method;

        let timeout = ApiError::Network {
            message: "operation timed out".into(),
        };
        let server = ApiError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        let limited = ApiError::RateLimited { retry_after: None };

        assert!(may_resend(&Method::GET, &timeout));
        assert!(may_resend(&Method::DELETE, &server));
        assert!(!may_resend(&Method::POST, &timeout));
        assert!(!may_resend(&Method::POST, &server));
        assert!(may_resend(&Method::POST, &limited));
    }

    #[test]
    fn not_found_from_status_or_code() {
        assert!(
            classify_client_error(StatusCode::NOT_FOUND, ErrorBody::default()).is_not_found()
        );
        assert!(classify_client_error(
            StatusCode::BAD_REQUEST,
            body(Some("RESOURCE_DOES_NOT_EXIST"), "no such warehouse")
        )
        .is_not_found());
    }
}
