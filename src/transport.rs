//! HTTP transport for the Koji API

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{Endpoint, ProjectConfig};
use crate::error::{Error, Result};
use crate::multipart::MultipartForm;

pub const PROJECT_ID_HEADER: &str = "x-koji-project-id";
pub const PROJECT_TOKEN_HEADER: &str = "x-koji-project-token";

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Decode the body; a malformed body is a service failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::transport(format!("Malformed response body: {}", e)))
    }

    /// Turn a non-2xx response into `Error::Service`.
    pub fn into_service_error(self) -> Error {
        Error::Service {
            status: Some(self.status),
            message: String::from_utf8_lossy(&self.body).trim().to_string(),
        }
    }
}

/// Sends requests to the remote service.
///
/// Implementations report transport-level failures as `Error::Service` with no
/// status and return every HTTP response, 2xx or not, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse>;

    async fn post_multipart(&self, path: &str, form: MultipartForm) -> Result<ApiResponse>;
}

/// Build a rustls ClientConfig verifying against the webpki roots.
fn build_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// hyper + rustls transport carrying the project headers.
///
/// `https://` endpoints negotiate HTTP/2 or HTTP/1.1 over TLS; `http://`
/// endpoints (the local test service) use plain HTTP/1.1.
#[derive(Clone)]
pub struct HttpTransport {
    config: Arc<ProjectConfig>,
    endpoint: Endpoint,
    timeout_ms: u64,
    http_client: HttpClient<HttpsConnector, Full<Bytes>>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("project_id", &self.config.project_id)
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: Arc<ProjectConfig>, endpoint: Endpoint, timeout_ms: u64) -> Result<Self> {
        let tls_config = build_tls_config()?;

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let http_client = HttpClient::builder(TokioExecutor::new()).build(https_connector);

        Ok(Self {
            config,
            endpoint,
            timeout_ms,
            http_client,
        })
    }

    async fn send(&self, path: &str, content_type: &str, body: Bytes) -> Result<ApiResponse> {
        let url = self.endpoint.url_for(path);
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .header(PROJECT_ID_HEADER, self.config.project_id.as_str())
            .header(PROJECT_TOKEN_HEADER, self.config.project_token.as_str())
            .body(Full::new(body))
            .map_err(|e| Error::transport(format!("Failed to build request: {}", e)))?;

        debug!("Sending request: POST {}", path);

        let timeout = Duration::from_millis(self.timeout_ms);
        let response = tokio::time::timeout(timeout, self.http_client.request(req))
            .await
            .map_err(|_| Error::transport(format!("Request timeout after {}ms", self.timeout_ms)))?
            .map_err(|e| Error::transport(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = Self::read_body_to_bytes(response.into_body()).await?;

        debug!("POST {} -> {}", path, status);
        Ok(ApiResponse { status, body })
    }

    /// Read response body to bytes
    async fn read_body_to_bytes(body: Incoming) -> Result<Bytes> {
        let collected = body
            .collect()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response body: {}", e)))?;
        Ok(collected.to_bytes())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let json = serde_json::to_vec(body)
            .map_err(|e| Error::transport(format!("Failed to encode request body: {}", e)))?;
        self.send(path, "application/json", Bytes::from(json)).await
    }

    async fn post_multipart(&self, path: &str, form: MultipartForm) -> Result<ApiResponse> {
        let content_type = form.content_type_header();
        self.send(path, &content_type, form.into_body()).await
    }
}
