//! HTTP utilities for ARM REST API calls

use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A decoded ARM response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// JSON body, or `Value::Null` when the body was empty
    pub body: Value,
}

impl ApiResponse {
    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode the body into a typed structure
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("azrm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transient(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Send a request and decode the response
    ///
    /// Non-success statuses are classified: 404 becomes [`Error::NotFound`],
    /// 408/429/5xx become [`Error::Transient`], everything else [`Error::Api`].
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        token: &str,
        body: Option<&Value>,
        if_match: Option<&str>,
    ) -> Result<ApiResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("{} {} (request id {})", method, url, request_id);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(token)
            .header("x-ms-client-request-id", &request_id);

        if let Some(etag) = if_match {
            request = request.header("If-Match", etag);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} {} - {} - {}", method, url.path(), status, sanitize_for_log(&text));
            return Err(error_from_response(status, &text, url));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Turn a non-success response into an [`Error`]
pub fn error_from_response(status: StatusCode, body: &str, url: &Url) -> Error {
    let (code, message) = parse_error_body(body).unwrap_or_else(|| {
        (
            status.canonical_reason().unwrap_or("Unknown").to_string(),
            String::new(),
        )
    });

    if status == StatusCode::NOT_FOUND {
        return Error::NotFound {
            resource: url.path().to_string(),
        };
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return Error::transient(format!("{} {}: {}", status.as_u16(), code, message));
    }

    Error::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Extract `code` and `message` from an ARM error body
///
/// ARM wraps them as `{"error": {"code", "message"}}`; some older services
/// return them at the top level.
pub fn parse_error_body(body: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    error_detail(&value)
}

/// `code` and `message` from an error object embedded in a JSON value
pub fn error_detail(value: &Value) -> Option<(String, String)> {
    let error = value.get("error").unwrap_or(value);
    let code = error.get("code").and_then(|v| v.as_str())?;
    let message = error
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Some((code.to_string(), message.to_string()))
}
