use std::time::Duration;

use async_trait::async_trait;
use estimator_core::config::ServiceConfig;
use estimator_core::RemoteServiceError;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Decoded 2xx response. `request_id` is the header the service echoed, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceResponse {
    pub body: Value,
    pub request_id: Option<String>,
}

/// A plan file sent as multipart form data.
#[derive(Clone, Debug, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub fields: Vec<(String, String)>,
}

/// Transport to the estimation service. Paths are relative to the service
/// root; every call carries the caller's request id.
#[async_trait]
pub trait EstimationService: Send + Sync {
    async fn get_json(&self, path: &str, request_id: &str)
        -> Result<ServiceResponse, RemoteServiceError>;

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError>;

    async fn post_file(
        &self,
        path: &str,
        upload: FileUpload,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError>;

    async fn delete_json(
        &self,
        path: &str,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError>;
}

pub struct HttpEstimationService {
    base_url: String,
    timeout: Duration,
    api_key: Option<SecretString>,
    http_client: reqwest::Client,
}

impl HttpEstimationService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteServiceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            RemoteServiceError::Connection {
                endpoint: base_url.clone(),
                message: error.to_string(),
            }
        })?;

        Ok(Self { base_url, timeout, api_key: None, http_client })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, RemoteServiceError> {
        let mut service =
            Self::new(config.base_url.clone(), Duration::from_secs(config.timeout_secs))?;
        service.api_key = config.api_key.clone();
        Ok(service)
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, request_id: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder =
            self.http_client.request(method, url).header(REQUEST_ID_HEADER, request_id);
        if let Some(api_key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()));
        }
        builder
    }

    async fn dispatch(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<ServiceResponse, RemoteServiceError> {
        debug!(event_name = "client.http.request", endpoint = %path, "sending request");
        let response = builder.send().await.map_err(|error| self.transport_error(path, &error))?;
        decode_response(path, response).await
    }

    fn transport_error(&self, path: &str, error: &reqwest::Error) -> RemoteServiceError {
        if error.is_timeout() {
            return RemoteServiceError::Timeout {
                endpoint: path.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }
        RemoteServiceError::Connection { endpoint: path.to_string(), message: error.to_string() }
    }
}

#[async_trait]
impl EstimationService for HttpEstimationService {
    async fn get_json(
        &self,
        path: &str,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError> {
        self.dispatch(path, self.request(Method::GET, path, request_id)).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError> {
        self.dispatch(path, self.request(Method::POST, path, request_id).json(body)).await
    }

    async fn post_file(
        &self,
        path: &str,
        upload: FileUpload,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str("application/pdf")
            .map_err(|error| self.transport_error(path, &error))?;
        let mut form = Form::new().part("file", part);
        for (name, value) in upload.fields {
            form = form.text(name, value);
        }

        self.dispatch(path, self.request(Method::POST, path, request_id).multipart(form)).await
    }

    async fn delete_json(
        &self,
        path: &str,
        request_id: &str,
    ) -> Result<ServiceResponse, RemoteServiceError> {
        self.dispatch(path, self.request(Method::DELETE, path, request_id)).await
    }
}

fn header_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

async fn decode_response(
    path: &str,
    response: Response,
) -> Result<ServiceResponse, RemoteServiceError> {
    let status = response.status();
    let request_id = header_request_id(response.headers());
    let text = response.text().await.map_err(|error| RemoteServiceError::Connection {
        endpoint: path.to_string(),
        message: error.to_string(),
    })?;

    if !status.is_success() {
        let body = serde_json::from_str::<Value>(&text).ok();
        let body_request_id = body
            .as_ref()
            .and_then(|body| body.get("request_id"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        return Err(RemoteServiceError::Status {
            endpoint: path.to_string(),
            status: status.as_u16(),
            detail: error_detail(body.as_ref(), &text),
            request_id: body_request_id.or(request_id),
        });
    }

    let body = serde_json::from_str::<Value>(&text).map_err(|error| {
        RemoteServiceError::Contract {
            endpoint: path.to_string(),
            message: format!("response body is not JSON: {error}"),
        }
    })?;
    Ok(ServiceResponse { body, request_id })
}

/// Error text from a failed response: `detail` when the body has one (string
/// or structured), otherwise the raw text.
fn error_detail(body: Option<&Value>, text: &str) -> String {
    match body.and_then(|body| body.get("detail")) {
        Some(Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None if text.trim().is_empty() => "no response body".to_string(),
        None => text.trim().chars().take(512).collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::error_detail;

    #[test]
    fn detail_prefers_string_then_structured_then_text() {
        assert_eq!(error_detail(Some(&json!({"detail": "bad plan"})), ""), "bad plan");
        assert_eq!(
            error_detail(Some(&json!({"detail": [{"loc": ["body"]}]})), ""),
            r#"[{"loc":["body"]}]"#
        );
        assert_eq!(error_detail(None, "  gateway down "), "gateway down");
        assert_eq!(error_detail(None, ""), "no response body");
    }
}
