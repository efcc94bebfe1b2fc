//! Outgoing request model and the HTTP transport collaborators

use crate::body::Body;
use crate::config::TransportConfig;
use crate::error::{HttpError, HttpResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Version};
use std::convert::Infallible;
use std::fmt;
use url::Url;

/// Raw response as produced by a transport or a WebSocket handshake
pub type RawResponse = http::Response<Bytes>;

/// Fully assembled request as handed to printers and transports
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// `None` until a base URL is configured or the path is an absolute URL
    pub url: Option<Url>,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Body,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: Option<Url>) -> Self {
        Self {
            method,
            url,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// URL as string, empty when unset
    pub fn url_str(&self) -> &str {
        self.url.as_ref().map(Url::as_str).unwrap_or("")
    }

    /// Content length that will be announced, `None` for chunked bodies
    pub fn content_length(&self) -> Option<u64> {
        self.body.content_length()
    }
}

/// Creates the empty request every builder starts from.
pub trait RequestFactory: Send + Sync {
    fn new_request(&self, method: &str, base_url: &str) -> HttpResult<OutgoingRequest>;
}

/// Parses the method and the base URL; an empty base URL is allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRequestFactory;

impl RequestFactory for DefaultRequestFactory {
    fn new_request(&self, method: &str, base_url: &str) -> HttpResult<OutgoingRequest> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| HttpError::InvalidRequest(format!("invalid method {:?}: {}", method, e)))?;
        let url = if base_url.is_empty() {
            None
        } else {
            Some(Url::parse(base_url)?)
        };
        Ok(OutgoingRequest::new(method, url))
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Client: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> HttpResult<RawResponse>;
}

/// reqwest-backed client with connection pooling
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new client with the given configuration
    pub fn new(config: TransportConfig) -> HttpResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(&config.user_agent)
            .cookie_store(config.cookie_store);

        // Configure redirects
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        // Configure compression
        builder = builder.gzip(config.gzip).brotli(config.brotli);

        // Danger: Accept invalid certificates (testing only)
        if config.danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wraps an already configured reqwest client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl Client for ReqwestClient {
    async fn send(&self, request: OutgoingRequest) -> HttpResult<RawResponse> {
        let url = request
            .url
            .ok_or_else(|| HttpError::InvalidUrl("request has no URL".to_string()))?;

        let mut builder = self
            .client
            .request(request.method, url)
            .version(request.version)
            .headers(request.headers);

        builder = match request.body {
            Body::Empty => builder,
            Body::Full(bytes) => builder.body(bytes),
            Body::Chunked(bytes) => {
                let stream = futures::stream::iter(vec![Ok::<_, Infallible>(bytes)]);
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let response = builder.send().await.map_err(classify)?;
        from_reqwest(response).await
    }
}

/// Lift timeouts and connect failures out of the opaque reqwest error
fn classify(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout(err.to_string())
    } else if err.is_connect() {
        HttpError::Connection(err.to_string())
    } else {
        HttpError::Reqwest(err)
    }
}

/// Convert reqwest Response to the raw response model
pub async fn from_reqwest(response: reqwest::Response) -> HttpResult<RawResponse> {
    let mut builder = http::Response::builder()
        .status(response.status())
        .version(response.version());
    if let Some(headers) = builder.headers_mut() {
        *headers = response.headers().clone();
    }

    // Read body
    let body = response.bytes().await?;

    builder
        .body(body)
        .map_err(|e| HttpError::ResponseError(e.to_string()))
}

/// Routes requests to an axum `Router` in-process, without any network I/O.
#[derive(Clone)]
pub struct HandlerClient {
    router: axum::Router,
}

impl HandlerClient {
    pub fn new(router: axum::Router) -> Self {
        Self { router }
    }
}

impl fmt::Debug for HandlerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl Client for HandlerClient {
    async fn send(&self, request: OutgoingRequest) -> HttpResult<RawResponse> {
        use tower::ServiceExt;

        let uri = match &request.url {
            Some(url) => url.as_str().to_string(),
            None => return Err(HttpError::InvalidUrl("request has no URL".to_string())),
        };
        let body = match request.body {
            Body::Empty => axum::body::Body::empty(),
            Body::Full(bytes) | Body::Chunked(bytes) => axum::body::Body::from(bytes),
        };

        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(uri)
            .version(request.version);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let http_request = builder
            .body(body)
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;

        let response = match self.router.clone().oneshot(http_request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| HttpError::ResponseError(e.to_string()))?;
        Ok(http::Response::from_parts(parts, bytes))
    }
}
