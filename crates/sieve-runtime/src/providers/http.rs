//! HTTP plumbing shared by the remote backends.

use std::time::Duration;

use super::ProviderError;

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) fn map_send_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(error.to_string())
    }
}

/// Turn a non-success response into a classified error.
pub(crate) async fn check_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        tracing::warn!(backend, retry_after = ?retry_after, "Rate limited by backend");
        return Err(ProviderError::RateLimited { retry_after });
    }

    if matches!(status.as_u16(), 401 | 403) {
        return Err(ProviderError::AuthError);
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(ProviderError::ApiError {
        status: status.as_u16(),
        message,
    })
}
