//! HTTP access for network capabilities, configuration documents and module
//! sources.

use async_trait::async_trait;
use reqwest::Url;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{url} ({status})")]
    Status { url: String, status: u16 },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported method: {0}")]
    Method(String),

    #[error("cannot read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection refused: {0}")]
    Unreachable(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// A completed response. Any status counts as completed, including 4xx/5xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> String {
        self.headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Headers as a JSON object string.
    pub fn headers_json(&self) -> String {
        serde_json::to_string(&self.headers).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Performs HTTP requests on behalf of the bridge.
#[async_trait(?Send)]
pub trait HttpClient {
    async fn execute(&self, request: HttpRequest) -> FetchResult<HttpResponse>;

    /// GETs `url` and returns the body, treating non-2xx statuses as errors.
    async fn fetch_text(&self, url: &str) -> FetchResult<String> {
        let response = self.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.text())
    }
}

/// Resolves `reference` against `base` the way a browser resolves links.
pub fn resolve_url(base: &str, reference: &str) -> FetchResult<String> {
    if let Ok(absolute) = Url::parse(reference) {
        return Ok(absolute.to_string());
    }
    let base_url = Url::parse(base).map_err(|e| FetchError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    base_url
        .join(reference)
        .map(|u| u.to_string())
        .map_err(|e| FetchError::InvalidUrl {
            url: reference.to_string(),
            reason: e.to_string(),
        })
}

/// `file://` URL of a directory, usable as a page URL for local scripts.
pub fn directory_url(path: &Path) -> Option<String> {
    Url::from_directory_path(path).ok().map(String::from)
}

// ============================================================
// reqwest
// ============================================================

/// Network client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait(?Send)]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> FetchResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| FetchError::Method(request.method.clone()))?;
        debug!(method = %method, url = %request.url, "sending request");

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ============================================================
// file:// URLs
// ============================================================

/// Serves `file://` URLs from disk and forwards everything else to an inner
/// client (if any).
pub struct LocalFileClient {
    inner: Option<Rc<dyn HttpClient>>,
}

impl LocalFileClient {
    pub fn new(inner: Rc<dyn HttpClient>) -> Self {
        Self { inner: Some(inner) }
    }

    /// Only `file://` URLs; anything else fails.
    pub fn standalone() -> Self {
        Self { inner: None }
    }

    async fn read_file(url: &Url) -> FetchResult<HttpResponse> {
        let path = url.to_file_path().map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local path".to_string(),
        })?;
        let body = tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::File {
                path: path.display().to_string(),
                source,
            })?;
        Ok(HttpResponse::ok(body).with_header("content-type", guess_content_type(&path)))
    }
}

#[async_trait(?Send)]
impl HttpClient for LocalFileClient {
    async fn execute(&self, request: HttpRequest) -> FetchResult<HttpResponse> {
        match Url::parse(&request.url) {
            Ok(url) if url.scheme() == "file" => Self::read_file(&url).await,
            _ => match &self.inner {
                Some(inner) => inner.execute(request).await,
                None => Err(FetchError::Unreachable(request.url)),
            },
        }
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "lua" => "text/x-lua",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

// ============================================================
// In-memory routes
// ============================================================

/// Serves canned responses by exact URL and records every request.
/// Unrouted URLs fail like an unreachable host.
#[derive(Default)]
pub struct MemoryHttpClient {
    routes: RefCell<HashMap<String, HttpResponse>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MemoryHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, response: HttpResponse) {
        self.routes.borrow_mut().insert(url.to_string(), response);
    }

    pub fn route_text(&self, url: &str, body: &str) {
        self.route(url, HttpResponse::ok(body.as_bytes().to_vec()));
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// How many requests were made to `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait(?Send)]
impl HttpClient for MemoryHttpClient {
    async fn execute(&self, request: HttpRequest) -> FetchResult<HttpResponse> {
        let response = self.routes.borrow().get(&request.url).cloned();
        let url = request.url.clone();
        self.requests.borrow_mut().push(request);
        response.ok_or(FetchError::Unreachable(url))
    }
}
