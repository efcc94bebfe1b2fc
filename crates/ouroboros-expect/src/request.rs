//! Fluent request builder and round trip
//!
//! Every builder call checks the sticky chain first and does nothing once it
//! failed, so a test can chain calls freely and inspect a single failure at
//! the end.
//!
//! # Example
//!
//! ```ignore
//! use ouroboros_expect::{Config, Request};
//!
//! let config = Config::with_defaults("https://api.example.com")?;
//! let response = Request::new_with_args(&config, "PUT", "/repos/{user}/{repo}", ["gavv", "httpexpect"])?
//!     .with_query("draft", true)
//!     .with_json(&serde_json::json!({"description": "test client"}))
//!     .expect()
//!     .await;
//! assert_eq!(response.status_code(), 200);
//! ```

use crate::body::{
    Body, BodySlots, Claim, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART,
    CONTENT_TYPE_TEXT,
};
use crate::chain::Chain;
use crate::config::Config;
use crate::error::{HttpError, HttpResult, RequestError};
use crate::multipart::Multipart;
use crate::path::{concat_paths, PathTemplate};
use crate::query::Values;
use crate::response::Response;
use crate::transport::{Client, HandlerClient, OutgoingRequest, RawResponse};
use crate::values::to_text_lossy;
use crate::websocket::{DialError, Websocket, WebsocketDialer};
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, HOST};
use http::{Method, Version};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Callback run against the response after the round trip
pub type Matcher = Box<dyn FnOnce(&Response) + Send>;

/// Incrementally built HTTP or WebSocket request
pub struct Request {
    config: Config,
    chain: Chain,
    http: OutgoingRequest,
    path: PathTemplate,
    query: Values,
    form: Option<Values>,
    multipart: Multipart,
    slots: BodySlots,
    ws_upgrade: bool,
    matchers: Vec<Matcher>,
}

impl Request {
    /// Create a request for `path` without positional arguments.
    ///
    /// Fails immediately when the config lacks a request factory or a client.
    pub fn new(config: &Config, method: &str, path: &str) -> HttpResult<Self> {
        Self::new_with_args(config, method, path, std::iter::empty::<Value>())
    }

    /// Create a request, substituting the first placeholders of `path` with `args`.
    ///
    /// ```ignore
    /// let req = Request::new_with_args(&config, "POST", "/repos/{user}/{repo}", ["gavv", "httpexpect"])?;
    /// assert_eq!(req.path(), "/repos/gavv/httpexpect");
    /// ```
    pub fn new_with_args<I, V>(config: &Config, method: &str, path: &str, args: I) -> HttpResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let factory = config
            .request_factory
            .as_ref()
            .ok_or_else(|| HttpError::Setup("config.request_factory is missing".to_string()))?;
        if config.client.is_none() {
            return Err(HttpError::Setup("config.client is missing".to_string()));
        }

        let mut chain = Chain::new(config.reporter.clone());

        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        let path = match PathTemplate::with_args(method, path, &args) {
            Ok(path) => path,
            Err(err) => {
                chain.fail(err);
                PathTemplate::verbatim(path)
            }
        };

        let http = match factory.new_request(method, &config.base_url) {
            Ok(http) => http,
            Err(err) => {
                chain.fail(err.into());
                OutgoingRequest::new(Method::GET, None)
            }
        };

        Ok(Self {
            config: config.clone(),
            chain,
            http,
            path,
            query: Values::new(),
            form: None,
            multipart: Multipart::Absent,
            slots: BodySlots::new(),
            ws_upgrade: false,
            matchers: Vec::new(),
        })
    }

    fn fail(mut self, err: RequestError) -> Self {
        self.chain.fail(err);
        self
    }

    /// Attach a callback invoked with the response produced by [`Request::expect`]
    pub fn with_matcher(mut self, matcher: impl FnOnce(&Response) + Send + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Use `client` instead of the configured one for this request
    pub fn with_client(mut self, client: impl Client + 'static) -> Self {
        if self.chain.failed() {
            return self;
        }
        self.config.client = Some(Arc::new(client));
        self
    }

    /// Dispatch this request to `router` in-process
    pub fn with_handler(self, router: axum::Router) -> Self {
        self.with_client(HandlerClient::new(router))
    }

    /// Send the request as a WebSocket upgrade handshake
    pub fn with_websocket_upgrade(mut self) -> Self {
        if self.chain.failed() {
            return self;
        }
        self.ws_upgrade = true;
        self
    }

    /// Use `dialer` instead of the configured one for this request
    pub fn with_websocket_dialer(mut self, dialer: impl WebsocketDialer + 'static) -> Self {
        if self.chain.failed() {
            return self;
        }
        self.config.websocket_dialer = Some(Arc::new(dialer));
        self
    }

    /// Substitute the placeholder `{key}` (case-insensitive) in the path
    pub fn with_path(mut self, key: &str, value: impl Into<Value>) -> Self {
        if self.chain.failed() {
            return self;
        }
        match self.path.substitute(key, &value.into()) {
            Ok(()) => self,
            Err(err) => self.fail(err),
        }
    }

    /// Substitute every field of `object` as a named path parameter.
    ///
    /// Field names follow serde renames.
    pub fn with_path_object<T: Serialize + ?Sized>(self, object: &T) -> Self {
        if self.chain.failed() {
            return self;
        }
        match crate::values::flatten(object) {
            Ok(None) => self,
            Ok(Some(pairs)) => pairs
                .into_iter()
                .fold(self, |req, (key, value)| req.with_path(&key, value)),
            Err(reason) => self.fail(RequestError::Encoding {
                call: "with_path_object",
                reason,
            }),
        }
    }

    /// Append a query parameter
    pub fn with_query(mut self, key: &str, value: impl Into<Value>) -> Self {
        if self.chain.failed() {
            return self;
        }
        self.query.add(key, to_text_lossy(&value.into()));
        self
    }

    /// Append every field of `object` as query parameters
    pub fn with_query_object<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        if self.chain.failed() {
            return self;
        }
        match Values::from_object(object) {
            Ok(values) => {
                self.query.extend(values);
                self
            }
            Err(reason) => self.fail(RequestError::Encoding {
                call: "with_query_object",
                reason,
            }),
        }
    }

    /// Parse `query` and append its parameters
    pub fn with_query_string(mut self, query: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        match Values::parse(query) {
            Ok(values) => {
                self.query.extend(values);
                self
            }
            Err(reason) => self.fail(RequestError::Encoding {
                call: "with_query_string",
                reason,
            }),
        }
    }

    /// Replace the base URL; the path is still appended to it
    pub fn with_url(mut self, url: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        match Url::parse(url) {
            Ok(parsed) => {
                self.http.url = Some(parsed);
                self
            }
            Err(e) => self.fail(RequestError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Add several headers
    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.chain.failed() {
            return self;
        }
        headers
            .into_iter()
            .fold(self, |req, (k, v)| req.with_header(k.as_ref(), v.as_ref()))
    }

    /// Add a header.
    ///
    /// `Host` replaces the request host. `Content-Type` overrides any
    /// automatic content type, now and for every later body call.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        let header_name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                return self.fail(RequestError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let header_value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                return self.fail(RequestError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if header_name == CONTENT_TYPE {
            self.slots.force_type(value);
        } else if header_name == HOST {
            self.http.headers.insert(HOST, header_value);
        } else {
            self.http.headers.append(header_name, header_value);
        }
        self
    }

    /// Add several cookies
    pub fn with_cookies<I, K, V>(self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.chain.failed() {
            return self;
        }
        cookies
            .into_iter()
            .fold(self, |req, (k, v)| req.with_cookie(k.as_ref(), v.as_ref()))
    }

    /// Add a cookie to the `Cookie` header
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        let pair = format!("{}={}", name, value);
        let cookie = match self.http.headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{}; {}", existing, pair),
            _ => pair,
        };
        match HeaderValue::from_str(&cookie) {
            Ok(v) => {
                self.http.headers.insert(COOKIE, v);
                self
            }
            Err(e) => self.fail(RequestError::InvalidHeader {
                name: "Cookie".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Set `Authorization: Basic ...`
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        match HeaderValue::from_str(&format!("Basic {}", credentials)) {
            Ok(mut v) => {
                v.set_sensitive(true);
                self.http.headers.insert(AUTHORIZATION, v);
                self
            }
            Err(e) => self.fail(RequestError::InvalidHeader {
                name: "Authorization".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Set the protocol version, e.g. `"HTTP/1.0"` or `"HTTP/2.0"`
    pub fn with_proto(mut self, proto: &str) -> Self {
        if self.chain.failed() {
            return self;
        }
        match parse_version(proto) {
            Some(version) => {
                self.http.version = version;
                self
            }
            None => self.fail(RequestError::InvalidProtocol(proto.to_string())),
        }
    }

    /// Send everything `reader` yields with chunked Transfer-Encoding.
    ///
    /// Requires at least HTTP/1.1.
    pub fn with_chunked(mut self, mut reader: impl Read) -> Self {
        if self.chain.failed() {
            return self;
        }
        if self.http.version < Version::HTTP_11 {
            let version = format!("{:?}", self.http.version);
            return self.fail(RequestError::ChunkedRequiresHttp11(version));
        }
        let mut data = Vec::new();
        if let Err(e) = reader.read_to_end(&mut data) {
            return self.fail(RequestError::Encoding {
                call: "with_chunked",
                reason: e.to_string(),
            });
        }
        let result = self
            .slots
            .set_body("with_chunked", Body::Chunked(Bytes::from(data)), Claim::Exclusive);
        self.apply(result)
    }

    /// Raw body; content type is left alone
    pub fn with_bytes(mut self, data: impl Into<Bytes>) -> Self {
        if self.chain.failed() {
            return self;
        }
        let result = self
            .slots
            .set_body("with_bytes", Body::Full(data.into()), Claim::Exclusive);
        self.apply(result)
    }

    /// Text body with `text/plain; charset=utf-8`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        if self.chain.failed() {
            return self;
        }
        let body = Body::Full(Bytes::from(text.into()));
        let result = self.slots.set_typed_body("with_text", CONTENT_TYPE_TEXT, body);
        self.apply(result)
    }

    /// JSON body with `application/json; charset=utf-8`
    pub fn with_json<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        if self.chain.failed() {
            return self;
        }
        let data = match serde_json::to_vec(object) {
            Ok(data) => data,
            Err(e) => {
                return self.fail(RequestError::Encoding {
                    call: "with_json",
                    reason: e.to_string(),
                })
            }
        };
        let result = self
            .slots
            .set_typed_body("with_json", CONTENT_TYPE_JSON, Body::Full(Bytes::from(data)));
        self.apply(result)
    }

    /// Same as [`Request::with_json`] with four-space indentation
    pub fn with_json_pretty<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        if self.chain.failed() {
            return self;
        }
        let mut data = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut data, formatter);
        if let Err(e) = object.serialize(&mut serializer) {
            return self.fail(RequestError::Encoding {
                call: "with_json_pretty",
                reason: e.to_string(),
            });
        }
        let result = self.slots.set_typed_body(
            "with_json_pretty",
            CONTENT_TYPE_JSON,
            Body::Full(Bytes::from(data)),
        );
        self.apply(result)
    }

    /// Add every field of `object` to the form.
    ///
    /// Goes to the multipart body (fields in key order) when
    /// [`Request::with_multipart`] was called, to the URL-encoded form otherwise.
    pub fn with_form<T: Serialize + ?Sized>(mut self, object: &T) -> Self {
        if self.chain.failed() {
            return self;
        }
        let values = match Values::from_object(object) {
            Ok(values) => values,
            Err(reason) => {
                return self.fail(RequestError::Encoding {
                    call: "with_form",
                    reason,
                })
            }
        };

        if self.multipart.is_open() {
            if let Err(err) = self
                .slots
                .set_type("with_form", CONTENT_TYPE_MULTIPART, Claim::Exclusive)
            {
                return self.fail(err);
            }
            if let Some(writer) = self.multipart.writer_mut() {
                for (key, value) in values.pairs() {
                    writer.write_field(key, value);
                }
            }
        } else {
            if let Err(err) = self
                .slots
                .set_type("with_form", CONTENT_TYPE_FORM, Claim::Exclusive)
            {
                return self.fail(err);
            }
            self.form.get_or_insert_with(Values::new).extend(values);
        }
        self
    }

    /// Add one form field; see [`Request::with_form`]
    pub fn with_form_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if self.chain.failed() {
            return self;
        }
        let text = to_text_lossy(&value.into());

        if self.multipart.is_open() {
            if let Err(err) =
                self.slots
                    .set_type("with_form_field", CONTENT_TYPE_MULTIPART, Claim::Exclusive)
            {
                return self.fail(err);
            }
            if let Some(writer) = self.multipart.writer_mut() {
                writer.write_field(key, &text);
            }
        } else {
            if let Err(err) = self
                .slots
                .set_type("with_form_field", CONTENT_TYPE_FORM, Claim::Exclusive)
            {
                return self.fail(err);
            }
            self.form.get_or_insert_with(Values::new).add(key, text);
        }
        self
    }

    /// Read the file at `path` into a multipart file part named `key`.
    ///
    /// Requires [`Request::with_multipart`] first. The part's filename is the
    /// last component of `path`.
    pub fn with_file(self, key: &str, path: impl AsRef<std::path::Path>) -> Self {
        if self.chain.failed() {
            return self;
        }
        if !self.multipart.is_open() {
            return self.fail(RequestError::MultipartRequired { call: "with_file" });
        }
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(data) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.write_file("with_file", key, &file_name, &data)
            }
            Err(e) => self.fail(RequestError::Encoding {
                call: "with_file",
                reason: format!("{}: {}", path.display(), e),
            }),
        }
    }

    /// Like [`Request::with_file`] with in-memory contents
    pub fn with_file_bytes(self, key: &str, file_name: &str, data: impl AsRef<[u8]>) -> Self {
        if self.chain.failed() {
            return self;
        }
        if !self.multipart.is_open() {
            return self.fail(RequestError::MultipartRequired {
                call: "with_file_bytes",
            });
        }
        self.write_file("with_file_bytes", key, file_name, data.as_ref())
    }

    fn write_file(mut self, setter: &'static str, key: &str, file_name: &str, data: &[u8]) -> Self {
        if let Err(err) = self
            .slots
            .set_type(setter, CONTENT_TYPE_MULTIPART, Claim::Exclusive)
        {
            return self.fail(err);
        }
        if let Some(writer) = self.multipart.writer_mut() {
            writer.write_file(key, file_name, data);
        }
        self
    }

    /// Switch form calls to a `multipart/form-data` body
    pub fn with_multipart(mut self) -> Self {
        if self.chain.failed() {
            return self;
        }
        if let Err(err) = self
            .slots
            .set_type("with_multipart", CONTENT_TYPE_MULTIPART, Claim::Exclusive)
        {
            return self.fail(err);
        }
        if !self.multipart.is_open() {
            // Placeholder until encoding swaps in the finished buffer
            if let Err(err) = self
                .slots
                .set_body("with_multipart", Body::Empty, Claim::Exclusive)
            {
                return self.fail(err);
            }
            self.multipart.open();
        }
        self
    }

    fn apply(self, result: Result<(), RequestError>) -> Self {
        match result {
            Ok(()) => self,
            Err(err) => self.fail(err),
        }
    }

    /// Path with the placeholders resolved so far
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn failure(&self) -> Option<&RequestError> {
        self.chain.failure()
    }

    /// Outgoing request as assembled so far (body not yet moved in)
    pub fn outgoing(&self) -> &OutgoingRequest {
        &self.http
    }

    /// Pending body
    pub fn body(&self) -> &Body {
        self.slots.body()
    }

    /// Label of the call that owns the body
    pub fn body_setter(&self) -> Option<&'static str> {
        self.slots.body_setter()
    }

    /// Pending content type
    pub fn content_type(&self) -> Option<&str> {
        self.slots.content_type()
    }

    /// Build the final request, send it and return the response.
    ///
    /// Attached matchers run against the response when one was produced.
    /// A failed chain yields an empty placeholder response instead.
    pub async fn expect(mut self) -> Response {
        let matchers = std::mem::take(&mut self.matchers);
        match self.round_trip().await {
            Some(response) => {
                for matcher in matchers {
                    matcher(&response);
                }
                response
            }
            None => Response::placeholder(self.chain.clone()),
        }
    }

    async fn round_trip(&mut self) -> Option<Response> {
        if !self.encode() {
            return None;
        }
        if self.ws_upgrade && !self.encode_websocket() {
            return None;
        }

        for printer in &self.config.printers {
            printer.request(&self.http);
        }

        let start = Instant::now();
        let outcome = if self.ws_upgrade {
            self.send_websocket().await
        } else {
            self.send().await
        };
        let elapsed = start.elapsed();

        let (raw, websocket) = outcome?;
        tracing::debug!(
            method = %self.http.method,
            url = self.http.url_str(),
            status = raw.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "round trip complete"
        );

        for printer in &self.config.printers {
            printer.response(&raw, elapsed);
        }

        Some(Response::from_raw(
            raw,
            self.http.url_str().to_string(),
            elapsed,
            websocket,
            self.chain.clone(),
        ))
    }

    /// Finalizes URL, query and body. Returns false once the chain failed.
    fn encode(&mut self) -> bool {
        if self.chain.failed() {
            return false;
        }

        if let Some(url) = self.http.url.as_mut() {
            let path = concat_paths(url.path(), self.path.as_str());
            url.set_path(&path);
        } else {
            match Url::parse(self.path.as_str()) {
                Ok(url) => self.http.url = Some(url),
                Err(e) => {
                    self.chain.fail(RequestError::InvalidUrl {
                        url: self.path.as_str().to_string(),
                        reason: format!("{} (no base URL configured)", e),
                    });
                    return false;
                }
            }
        }

        if !self.query.is_empty() {
            let encoded = self.query.encode();
            if let Some(url) = self.http.url.as_mut() {
                url.set_query(Some(&encoded));
            }
        }

        let finalized = if let Some((content_type, body)) = self.multipart.close() {
            self.slots
                .set_type("with_multipart", &content_type, Claim::Finalize)
                .and_then(|_| {
                    self.slots
                        .set_body("with_multipart", Body::Full(body), Claim::Finalize)
                })
        } else if let Some(form) = self.form.take() {
            let encoded = form.encode();
            self.slots.set_body(
                "with_form or with_form_field",
                Body::Full(Bytes::from(encoded)),
                Claim::Exclusive,
            )
        } else {
            Ok(())
        };
        if let Err(err) = finalized {
            self.chain.fail(err);
            return false;
        }

        if let Some(content_type) = self.slots.content_type() {
            match HeaderValue::from_str(content_type) {
                Ok(v) => {
                    self.http.headers.insert(CONTENT_TYPE, v);
                }
                Err(e) => {
                    self.chain.fail(RequestError::InvalidHeader {
                        name: "Content-Type".to_string(),
                        reason: e.to_string(),
                    });
                    return false;
                }
            }
        }
        self.http.body = self.slots.take_body();

        true
    }

    fn encode_websocket(&mut self) -> bool {
        if self.chain.failed() {
            return false;
        }
        if let Some(setter) = self.slots.body_setter() {
            self.chain.fail(RequestError::WebsocketWithBody { setter });
            return false;
        }
        if let Some(url) = self.http.url.as_mut() {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            if url.set_scheme(scheme).is_err() {
                let err = RequestError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("can not switch scheme to {}", scheme),
                };
                self.chain.fail(err);
                return false;
            }
        }
        true
    }

    async fn send(&mut self) -> Option<(RawResponse, Option<Websocket>)> {
        if self.chain.failed() {
            return None;
        }
        let Some(client) = self.config.client.clone() else {
            self.chain
                .fail(HttpError::Setup("config.client is missing".to_string()).into());
            return None;
        };

        tracing::debug!(method = %self.http.method, url = self.http.url_str(), "sending request");
        match client.send(self.http.clone()).await {
            Ok(raw) => Some((raw, None)),
            Err(err) => {
                self.chain.fail(err.into());
                None
            }
        }
    }

    async fn send_websocket(&mut self) -> Option<(RawResponse, Option<Websocket>)> {
        if self.chain.failed() {
            return None;
        }
        let Some(dialer) = self.config.websocket_dialer.clone() else {
            self.chain
                .fail(HttpError::Setup("config.websocket_dialer is missing".to_string()).into());
            return None;
        };
        let Some(url) = self.http.url.clone() else {
            self.chain.fail(RequestError::InvalidUrl {
                url: String::new(),
                reason: "websocket upgrade needs an absolute url".to_string(),
            });
            return None;
        };

        tracing::debug!(url = %url, "dialing websocket");
        match dialer.dial(&url, &self.http.headers).await {
            Ok((websocket, raw)) => Some((raw, Some(websocket))),
            Err(DialError::HandshakeRejected(raw)) => {
                tracing::debug!(status = raw.status().as_u16(), "websocket handshake rejected");
                Some((raw, None))
            }
            Err(DialError::Transport(err)) => {
                self.chain.fail(err.into());
                None
            }
        }
    }
}

fn parse_version(proto: &str) -> Option<Version> {
    match proto {
        "HTTP/0.9" => Some(Version::HTTP_09),
        "HTTP/1.0" => Some(Version::HTTP_10),
        "HTTP/1.1" => Some(Version::HTTP_11),
        "HTTP/2" | "HTTP/2.0" => Some(Version::HTTP_2),
        "HTTP/3" | "HTTP/3.0" => Some(Version::HTTP_3),
        _ => None,
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.http.method)
            .field("path", &self.path.as_str())
            .field("query", &self.query)
            .field("body_setter", &self.slots.body_setter())
            .field("content_type", &self.slots.content_type())
            .field("ws_upgrade", &self.ws_upgrade)
            .field("chain", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::RecordingReporter;
    use crate::transport::DefaultRequestFactory;
    use async_trait::async_trait;
    use http::HeaderMap;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every request it sees and answers 200 with an empty body.
    #[derive(Default, Clone)]
    struct RecordingClient {
        seen: Arc<Mutex<Vec<OutgoingRequest>>>,
    }

    impl RecordingClient {
        fn last(&self) -> OutgoingRequest {
            self.seen.lock().unwrap().last().cloned().expect("no request sent")
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Client for RecordingClient {
        async fn send(&self, request: OutgoingRequest) -> HttpResult<RawResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(http::Response::builder().status(200).body(Bytes::new()).unwrap())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl Client for FailingClient {
        async fn send(&self, _request: OutgoingRequest) -> HttpResult<RawResponse> {
            Err(HttpError::Connection("connection refused".to_string()))
        }
    }

    struct RejectingDialer {
        calls: Arc<AtomicUsize>,
        seen_url: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl WebsocketDialer for RejectingDialer {
        async fn dial(&self, url: &Url, _headers: &HeaderMap) -> Result<(Websocket, RawResponse), DialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_url.lock().unwrap() = Some(url.to_string());
            let raw = http::Response::builder()
                .status(403)
                .body(Bytes::from_static(b"forbidden"))
                .unwrap();
            Err(DialError::HandshakeRejected(raw))
        }
    }

    struct BrokenDialer;

    #[async_trait]
    impl WebsocketDialer for BrokenDialer {
        async fn dial(&self, _url: &Url, _headers: &HeaderMap) -> Result<(Websocket, RawResponse), DialError> {
            Err(DialError::Transport(HttpError::Connection("reset".to_string())))
        }
    }

    fn setup(base_url: &str) -> (Config, RecordingClient, RecordingReporter) {
        let client = RecordingClient::default();
        let reporter = RecordingReporter::default();
        let config = Config::new()
            .base_url(base_url)
            .request_factory(DefaultRequestFactory)
            .client(client.clone())
            .reporter(reporter.clone());
        (config, client, reporter)
    }

    fn body_text(body: &Body) -> String {
        body.bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn test_missing_collaborators_is_setup_error() {
        let err = Request::new(&Config::new(), "GET", "/").unwrap_err();
        assert!(matches!(err, HttpError::Setup(_)));

        let config = Config::new().request_factory(DefaultRequestFactory);
        let err = Request::new(&config, "GET", "/").unwrap_err();
        assert!(err.to_string().contains("config.client"));
    }

    #[test]
    fn test_positional_path_args() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new_with_args(&config, "GET", "/users/{id}", [42]).unwrap();
        assert_eq!(req.path(), "/users/42");
        assert!(req.failure().is_none());
    }

    #[test]
    fn test_nil_positional_arg_fails_chain() {
        let (config, _, reporter) = setup("http://example.com");
        let req = Request::new_with_args(&config, "GET", "/users/{id}", [Value::Null]).unwrap();
        assert!(matches!(req.failure(), Some(RequestError::NilPathArgument { .. })));
        assert_eq!(reporter.messages().len(), 1);
    }

    #[test]
    fn test_with_path_unknown_key() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "GET", "/users/{id}")
            .unwrap()
            .with_path("name", "bob");
        assert!(matches!(req.failure(), Some(RequestError::UnknownPathKey { .. })));
        assert_eq!(req.path(), "/users/{id}");
    }

    #[test]
    fn test_with_path_object() {
        #[derive(Serialize)]
        struct RepoPath {
            #[serde(rename = "user")]
            login: String,
            repo: String,
        }

        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "GET", "/repos/{user}/{repo}")
            .unwrap()
            .with_path_object(&RepoPath {
                login: "gavv".to_string(),
                repo: "httpexpect".to_string(),
            });
        assert_eq!(req.path(), "/repos/gavv/httpexpect");

        let mut map = BTreeMap::new();
        map.insert("USER", "alice");
        map.insert("repo", "notes");
        let req = Request::new(&config, "GET", "/repos/{user}/{repo}")
            .unwrap()
            .with_path_object(&map);
        assert_eq!(req.path(), "/repos/alice/notes");

        let nothing: Option<RepoPath> = None;
        let req = Request::new(&config, "GET", "/repos/{user}")
            .unwrap()
            .with_path_object(&nothing);
        assert!(req.failure().is_none());
        assert_eq!(req.path(), "/repos/{user}");
    }

    #[test]
    fn test_json_then_text_conflict_keeps_json() {
        let (config, _, reporter) = setup("http://example.com");
        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_json(&json!({"a": 1}))
            .with_text("x");

        let message = req.chain().message().unwrap();
        assert!(message.contains("with_json"));
        assert!(message.contains("with_text"));
        assert_eq!(body_text(req.body()), r#"{"a":1}"#);
        assert_eq!(req.content_type(), Some(CONTENT_TYPE_JSON));
        assert_eq!(reporter.messages().len(), 1);
    }

    #[test]
    fn test_calls_after_failure_are_noops() {
        let (config, _, reporter) = setup("http://example.com");
        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_file_bytes("f", "a.txt", b"data")
            .with_query("a", 1)
            .with_header("X-Test", "1")
            .with_bytes("late");

        assert!(matches!(
            req.failure(),
            Some(RequestError::MultipartRequired { call: "with_file_bytes" })
        ));
        assert!(req.outgoing().headers.get("X-Test").is_none());
        assert_eq!(req.body_setter(), None);
        assert_eq!(reporter.messages().len(), 1);
    }

    #[test]
    fn test_forced_content_type_survives_body_calls() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_header("Content-Type", "application/vnd.custom+json")
            .with_json(&json!({"a": 1}));
        assert!(req.failure().is_none());
        assert_eq!(req.content_type(), Some("application/vnd.custom+json"));

        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_text("hi")
            .with_header("content-type", "text/csv");
        assert!(req.failure().is_none());
        assert_eq!(req.content_type(), Some("text/csv"));
    }

    #[test]
    fn test_chunked_requires_http11() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "PUT", "/upload")
            .unwrap()
            .with_proto("HTTP/1.0")
            .with_chunked(&b"abc"[..]);
        assert_eq!(
            req.failure(),
            Some(&RequestError::ChunkedRequiresHttp11("HTTP/1.0".to_string()))
        );

        let req = Request::new(&config, "PUT", "/upload")
            .unwrap()
            .with_chunked(&b"abc"[..]);
        assert_eq!(req.body(), &Body::Chunked(Bytes::from_static(b"abc")));
    }

    #[test]
    fn test_invalid_proto() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "GET", "/").unwrap().with_proto("HTTP/x");
        assert_eq!(
            req.failure(),
            Some(&RequestError::InvalidProtocol("HTTP/x".to_string()))
        );
    }

    #[test]
    fn test_multipart_type_conflicts_with_urlencoded_form() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_form_field("a", 1)
            .with_multipart();
        assert!(matches!(
            req.failure(),
            Some(RequestError::ContentTypeConflict { .. })
        ));
    }

    #[test]
    fn test_multipart_twice_is_harmless() {
        let (config, _, _) = setup("http://example.com");
        let req = Request::new(&config, "POST", "/")
            .unwrap()
            .with_multipart()
            .with_form_field("a", 1)
            .with_multipart();
        assert!(req.failure().is_none());
        assert_eq!(req.body_setter(), Some("with_multipart"));
    }

    #[tokio::test]
    async fn test_url_path_and_query_encoding() {
        let (config, client, _) = setup("http://example.com/api/");
        let response = Request::new_with_args(&config, "GET", "/users/{id}", [7])
            .unwrap()
            .with_query("b", "x y")
            .with_query("a", 1)
            .with_query_string("b=2")
            .expect()
            .await;

        assert_eq!(response.status_code(), 200);
        let sent = client.last();
        assert_eq!(
            sent.url_str(),
            "http://example.com/api/users/7?a=1&b=x+y&b=2"
        );
        assert_eq!(response.url(), sent.url_str());
        assert!(response.latency().is_some());
    }

    #[tokio::test]
    async fn test_no_base_url_needs_absolute_path() {
        let (config, client, _) = setup("");
        let response = Request::new(&config, "GET", "http://example.com/path")
            .unwrap()
            .expect()
            .await;
        assert!(!response.is_failed());
        assert_eq!(client.last().url_str(), "http://example.com/path");

        let response = Request::new(&config, "GET", "/relative").unwrap().expect().await;
        assert!(matches!(response.failure(), Some(RequestError::InvalidUrl { .. })));
        assert_eq!(client.count(), 1);
    }

    #[tokio::test]
    async fn test_with_url_overrides_base() {
        let (config, client, _) = setup("http://example.com");
        Request::new(&config, "GET", "/path")
            .unwrap()
            .with_url("http://other.example.com/v2")
            .expect()
            .await;
        assert_eq!(client.last().url_str(), "http://other.example.com/v2/path");
    }

    #[tokio::test]
    async fn test_urlencoded_form_body() {
        let (config, client, _) = setup("http://example.com");
        Request::new(&config, "POST", "/form")
            .unwrap()
            .with_form(&json!({"b": "2", "a": "x y"}))
            .with_form_field("a", 3)
            .expect()
            .await;

        let sent = client.last();
        assert_eq!(body_text(&sent.body), "a=x+y&a=3&b=2");
        assert_eq!(
            sent.headers.get(CONTENT_TYPE).unwrap(),
            CONTENT_TYPE_FORM
        );
    }

    #[tokio::test]
    async fn test_form_with_unrelated_body_fails_at_encode() {
        let (config, client, _) = setup("http://example.com");
        let response = Request::new(&config, "POST", "/form")
            .unwrap()
            .with_bytes("raw")
            .with_form_field("a", 1)
            .expect()
            .await;

        assert!(matches!(
            response.failure(),
            Some(RequestError::BodyConflict {
                previous: "with_bytes",
                next: "with_form or with_form_field"
            })
        ));
        assert_eq!(client.count(), 0);
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let (config, client, _) = setup("http://example.com");
        Request::new(&config, "POST", "/upload")
            .unwrap()
            .with_multipart()
            .with_form_field("a", "1")
            .with_form_field("b", "2")
            .with_form(&json!({"z": 26, "c": 3}))
            .with_file_bytes("avatar", "john.png", b"PNG")
            .expect()
            .await;

        let sent = client.last();
        let content_type = sent.headers.get(CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let boundary = content_type.trim_start_matches("multipart/form-data; boundary=");

        let body = body_text(&sent.body);
        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
        let a = body.find("name=\"a\"").unwrap();
        let b = body.find("name=\"b\"").unwrap();
        let c = body.find("name=\"c\"").unwrap();
        let z = body.find("name=\"z\"").unwrap();
        let file = body.find("filename=\"john.png\"").unwrap();
        assert!(a < b && b < c && c < z && z < file);
        assert_eq!(sent.content_length(), Some(body.len() as u64));
    }

    #[tokio::test]
    async fn test_multipart_respects_forced_type() {
        let (config, client, _) = setup("http://example.com");
        Request::new(&config, "POST", "/upload")
            .unwrap()
            .with_header("Content-Type", "multipart/mixed")
            .with_multipart()
            .with_form_field("a", "1")
            .expect()
            .await;

        let sent = client.last();
        assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), "multipart/mixed");
        assert!(body_text(&sent.body).contains("name=\"a\""));
    }

    #[tokio::test]
    async fn test_headers_cookies_auth() {
        let (config, client, _) = setup("http://example.com");
        Request::new(&config, "GET", "/")
            .unwrap()
            .with_headers([("X-One", "1"), ("X-One", "2")])
            .with_header("Host", "api.internal")
            .with_cookies([("a", "1")])
            .with_cookie("b", "2")
            .with_basic_auth("john", "secret")
            .expect()
            .await;

        let sent = client.last();
        let values: Vec<_> = sent.headers.get_all("x-one").iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(sent.headers.get(HOST).unwrap(), "api.internal");
        assert_eq!(sent.headers.get(COOKIE).unwrap(), "a=1; b=2");
        assert_eq!(
            sent.headers.get(AUTHORIZATION).unwrap(),
            "Basic am9objpzZWNyZXQ="
        );
    }

    #[tokio::test]
    async fn test_invalid_header_fails_chain() {
        let (config, client, _) = setup("http://example.com");
        let response = Request::new(&config, "GET", "/")
            .unwrap()
            .with_header("Bad Header", "1")
            .expect()
            .await;
        assert!(matches!(response.failure(), Some(RequestError::InvalidHeader { .. })));
        assert_eq!(client.count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_yields_placeholder() {
        let (config, _, reporter) = setup("http://example.com");
        let response = Request::new(&config, "GET", "/")
            .unwrap()
            .with_client(FailingClient)
            .with_matcher(|_| panic!("matchers must not run without a response"))
            .expect()
            .await;

        assert_eq!(response.status_code(), 0);
        assert!(response.latency().is_none());
        assert!(response
            .failure_message()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(reporter.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_matchers_run_in_order() {
        let (config, _, _) = setup("http://example.com");
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());

        Request::new(&config, "GET", "/")
            .unwrap()
            .with_matcher(move |resp| first.lock().unwrap().push(("first", resp.status_code())))
            .with_matcher(move |resp| second.lock().unwrap().push(("second", resp.status_code())))
            .expect()
            .await;

        assert_eq!(*order.lock().unwrap(), vec![("first", 200), ("second", 200)]);
    }

    #[tokio::test]
    async fn test_websocket_with_body_fails_before_dialing() {
        let (config, _, _) = setup("http://example.com");
        let calls = Arc::new(AtomicUsize::new(0));
        let dialer = RejectingDialer {
            calls: calls.clone(),
            seen_url: Arc::new(Mutex::new(None)),
        };

        let response = Request::new(&config, "GET", "/ws")
            .unwrap()
            .with_websocket_dialer(dialer)
            .with_websocket_upgrade()
            .with_json(&json!({"a": 1}))
            .expect()
            .await;

        assert_eq!(
            response.failure(),
            Some(&RequestError::WebsocketWithBody { setter: "with_json" })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_websocket_handshake_rejection_is_inspectable() {
        let (config, client, _) = setup("https://example.com");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_url = Arc::new(Mutex::new(None));
        let dialer = RejectingDialer {
            calls: calls.clone(),
            seen_url: seen_url.clone(),
        };

        let mut response = Request::new(&config, "GET", "/ws")
            .unwrap()
            .with_websocket_dialer(dialer)
            .with_websocket_upgrade()
            .expect()
            .await;

        assert!(!response.is_failed());
        assert_eq!(response.status_code(), 403);
        assert_eq!(response.bytes(), b"forbidden");
        assert!(response.websocket().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen_url.lock().unwrap().as_deref(), Some("wss://example.com/ws"));
        assert_eq!(client.count(), 0);
    }

    #[tokio::test]
    async fn test_websocket_transport_error_is_fatal() {
        let (config, _, _) = setup("http://example.com");
        let response = Request::new(&config, "GET", "/ws")
            .unwrap()
            .with_websocket_dialer(BrokenDialer)
            .with_websocket_upgrade()
            .expect()
            .await;

        assert!(response.is_failed());
        assert!(response.failure_message().unwrap().contains("reset"));
        assert_eq!(response.status_code(), 0);
    }

    #[tokio::test]
    async fn test_websocket_without_url_fails_chain() {
        let (config, _, reporter) = setup("http://example.com");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut request = Request::new(&config, "GET", "/ws")
            .unwrap()
            .with_websocket_dialer(RejectingDialer {
                calls: calls.clone(),
                seen_url: Arc::new(Mutex::new(None)),
            })
            .with_websocket_upgrade();
        request.http.url = None;

        assert!(request.send_websocket().await.is_none());
        assert!(matches!(
            request.chain.failure(),
            Some(RequestError::InvalidUrl { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reporter.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_websocket_without_dialer_fails() {
        let (config, _, _) = setup("http://example.com");
        let response = Request::new(&config, "GET", "/ws")
            .unwrap()
            .with_websocket_upgrade()
            .expect()
            .await;
        assert!(response
            .failure_message()
            .unwrap()
            .contains("websocket_dialer"));
    }
}
