use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{Result, SyncError};

/// Endpoint classes with distinct timeout expectations. Media transfers and
/// variation generation are far slower than metadata lookups, and creating a
/// product (images attach server-side) is slower than updating one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Metadata,
    MediaSearch,
    MediaUpload,
    ProductCreate,
    ProductUpdate,
    StockUpdate,
    Variations,
}

impl EndpointClass {
    pub fn timeout(&self) -> Duration {
        match self {
            EndpointClass::Metadata => Duration::from_secs(30),
            EndpointClass::MediaSearch => Duration::from_secs(30),
            EndpointClass::MediaUpload => Duration::from_secs(120),
            EndpointClass::ProductCreate => Duration::from_secs(600),
            EndpointClass::ProductUpdate => Duration::from_secs(300),
            EndpointClass::StockUpdate => Duration::from_secs(60),
            EndpointClass::Variations => Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    None,
    Json(Value),
    /// Raw upload body with its content type and the filename carried in the
    /// content-disposition header.
    Raw {
        bytes: Vec<u8>,
        content_type: String,
        filename: String,
    },
}

#[derive(Debug, Clone)]
pub struct TargetRequest {
    pub method: Method,
    pub url: Url,
    pub class: EndpointClass,
    pub body: RequestBody,
    pub basic_auth: Option<(String, String)>,
}

impl TargetRequest {
    pub fn new(method: Method, url: Url, class: EndpointClass) -> Self {
        Self {
            method,
            url,
            class,
            body: RequestBody::None,
            basic_auth: None,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn raw(mut self, bytes: Vec<u8>, content_type: String, filename: String) -> Self {
        self.body = RequestBody::Raw {
            bytes,
            content_type,
            filename,
        };
        self
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some((username.to_string(), password.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Machine message from an error body, when the target provides one.
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .or_else(|| self.body.get("error"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SNIPPET_LEN: usize = 200;

/// Retrying HTTP client for the target store. Bounded attempts with
/// exponential backoff, a separate fixed cooldown for 429/503, and
/// endpoint-class-sensitive timeouts. The last error is always surfaced as a
/// typed value; nothing is swallowed.
#[derive(Clone)]
pub struct RetryClient {
    client: Client,
    logger: Arc<SyncLogger>,
    max_retries: u32,
    base_backoff: Duration,
    rate_limit_cooldown: Duration,
}

impl RetryClient {
    pub fn new(cfg: &Config, logger: Arc<SyncLogger>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&cfg.http_user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            logger,
            max_retries: cfg.http_max_retries.max(1),
            base_backoff: Duration::from_millis(cfg.http_retry_backoff_ms),
            rate_limit_cooldown: Duration::from_millis(cfg.rate_limit_cooldown_ms),
        })
    }

    /// Single-attempt GET used by resolution/search paths where a miss is a
    /// normal outcome and retrying would only slow the strategy chain down.
    pub async fn get_once(&self, url: Url, class: EndpointClass) -> Result<ApiResponse> {
        let req = TargetRequest::new(Method::GET, url, class);
        self.send_attempt(&req).await
    }

    pub async fn get_once_with_auth(
        &self,
        url: Url,
        class: EndpointClass,
        username: &str,
        password: &str,
    ) -> Result<ApiResponse> {
        let req = TargetRequest::new(Method::GET, url, class).with_basic_auth(username, password);
        self.send_attempt(&req).await
    }

    /// Single attempt of an arbitrary request. Callers that own their own
    /// retry policy (the image upload loop) use this instead of `execute`.
    pub async fn execute_once(&self, req: TargetRequest) -> Result<ApiResponse> {
        self.send_attempt(&req).await
    }

    /// Full retry loop: up to `max_retries` attempts, exponential backoff
    /// `base * 2^(attempt-1)` capped at 30s, fixed cooldown on 429/503.
    pub async fn execute(&self, req: TargetRequest) -> Result<ApiResponse> {
        let mut last_error = SyncError::Sync("No attempts made".to_string());

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let exp = self
                    .base_backoff
                    .saturating_mul(1u32 << (attempt - 2).min(16));
                let delay = match last_error {
                    SyncError::RateLimited => self.rate_limit_cooldown,
                    _ => exp.min(MAX_BACKOFF),
                };
                tokio::time::sleep(delay).await;
            }

            match self.send_attempt(&req).await {
                Ok(resp) if resp.is_success() => {
                    if attempt > 1 {
                        self.logger.info(
                            "Request succeeded after retry",
                            json!({
                                "endpoint": req.url.path(),
                                "method": req.method.as_str(),
                                "attempt": attempt,
                            }),
                        );
                    }
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status;
                    let snippet: String = resp
                        .error_message()
                        .chars()
                        .take(SNIPPET_LEN)
                        .collect();
                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                        || status == StatusCode::SERVICE_UNAVAILABLE.as_u16();
                    self.logger.warning(
                        if rate_limited {
                            "Target rate limited the request"
                        } else {
                            "Request attempt failed"
                        },
                        json!({
                            "endpoint": req.url.path(),
                            "method": req.method.as_str(),
                            "attempt": attempt,
                            "status": status,
                            "response": snippet,
                        }),
                    );
                    last_error = if rate_limited {
                        SyncError::RateLimited
                    } else {
                        SyncError::Http {
                            status,
                            message: snippet,
                        }
                    };
                }
                Err(e) => {
                    self.logger.warning(
                        "Request attempt errored",
                        json!({
                            "endpoint": req.url.path(),
                            "method": req.method.as_str(),
                            "attempt": attempt,
                            "error": e.to_string(),
                        }),
                    );
                    last_error = e;
                }
            }
        }

        self.logger.error(
            "Request failed after all retries",
            json!({
                "endpoint": req.url.path(),
                "method": req.method.as_str(),
                "attempts": self.max_retries,
                "error": last_error.to_string(),
            }),
        );
        Err(last_error)
    }

    /// Fetch a URL as raw bytes, returning the payload and its content type.
    /// Single attempt; a failed download fails the caller's unit of work.
    pub async fn download(&self, url: Url, class: EndpointClass) -> Result<(Vec<u8>, String)> {
        let response = self
            .client
            .get(url)
            .timeout(class.timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::Network(format!("Download timed out: {}", e))
                } else if e.is_connect() {
                    SyncError::Network(format!("Connection failed: {}", e))
                } else {
                    SyncError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                message: "Download failed".to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(SyncError::Request)?.to_vec();
        Ok((bytes, content_type))
    }

    async fn send_attempt(&self, req: &TargetRequest) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(req.method.clone(), req.url.clone())
            .timeout(req.class.timeout())
            .header("Accept", "application/json");

        if let Some((user, pass)) = &req.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        builder = match &req.body {
            RequestBody::None => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Raw {
                bytes,
                content_type,
                filename,
            } => builder
                .header("Content-Type", content_type.as_str())
                .header(
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", filename),
                )
                .body(bytes.clone()),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Network(format!("Request timed out: {}", e))
            } else if e.is_connect() {
                SyncError::Network(format!("Connection failed: {}", e))
            } else {
                SyncError::Request(e)
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(ApiResponse { status, body })
    }
}
