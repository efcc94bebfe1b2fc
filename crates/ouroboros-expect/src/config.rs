//! Request and transport configuration

use crate::chain::{PanicReporter, Reporter};
use crate::printer::Printer;
use crate::transport::{Client, DefaultRequestFactory, ReqwestClient, RequestFactory};
use crate::error::HttpResult;
use crate::websocket::{TungsteniteDialer, WebsocketDialer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators and defaults shared by every request built from it.
///
/// `request_factory` and `client` are required; [`Request::new`](crate::Request::new)
/// refuses to build a request without them.
#[derive(Clone)]
pub struct Config {
    /// Base URL prepended to request paths (e.g., "https://api.example.com")
    pub base_url: String,

    /// Builds the empty outgoing request
    pub request_factory: Option<Arc<dyn RequestFactory>>,

    /// Performs plain HTTP exchanges
    pub client: Option<Arc<dyn Client>>,

    /// Performs WebSocket handshakes
    pub websocket_dialer: Option<Arc<dyn WebsocketDialer>>,

    /// Receives the first failure of each request
    pub reporter: Arc<dyn Reporter>,

    /// Observe requests and responses for diagnostics
    pub printers: Vec<Arc<dyn Printer>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_factory: None,
            client: None,
            websocket_dialer: None,
            reporter: Arc::new(PanicReporter),
            printers: Vec::new(),
        }
    }
}

impl Config {
    /// Empty config without collaborators
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with the default factory, a reqwest client and a tungstenite dialer
    pub fn with_defaults(base_url: impl Into<String>) -> HttpResult<Self> {
        Ok(Self::new()
            .base_url(base_url)
            .request_factory(DefaultRequestFactory)
            .client(ReqwestClient::new(TransportConfig::default())?)
            .websocket_dialer(TungsteniteDialer::new()))
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn request_factory(mut self, factory: impl RequestFactory + 'static) -> Self {
        self.request_factory = Some(Arc::new(factory));
        self
    }

    pub fn client(mut self, client: impl Client + 'static) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    pub fn websocket_dialer(mut self, dialer: impl WebsocketDialer + 'static) -> Self {
        self.websocket_dialer = Some(Arc::new(dialer));
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Add a printer
    pub fn printer(mut self, printer: impl Printer + 'static) -> Self {
        self.printers.push(Arc::new(printer));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("request_factory", &self.request_factory.is_some())
            .field("client", &self.client.is_some())
            .field("websocket_dialer", &self.websocket_dialer.is_some())
            .field("printers", &self.printers.len())
            .finish()
    }
}

/// Policies of the bundled reqwest client.
///
/// The request core never retries or times out on its own; these settings
/// are handed to reqwest as-is.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout
    pub pool_idle_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow
    pub max_redirects: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Whether to accept invalid certificates (for testing only)
    pub danger_accept_invalid_certs: bool,

    /// Keep cookies between requests made with the same client
    pub cookie_store: bool,

    /// Enable gzip compression
    pub gzip: bool,

    /// Enable brotli compression
    pub brotli: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            // Tests usually assert on the redirect itself
            follow_redirects: false,
            max_redirects: 10,
            user_agent: format!("ouroboros-expect/{}", env!("CARGO_PKG_VERSION")),
            danger_accept_invalid_certs: false,
            cookie_store: true,
            gzip: false,
            brotli: false,
        }
    }
}

impl TransportConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set timeout from seconds
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Duration::from_secs_f64(secs);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set max idle connections per host
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Set idle connection timeout
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Set maximum redirects
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Accept invalid certificates (DANGER - testing only)
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    /// Enable/disable gzip compression
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self
    }

    /// Enable/disable brotli compression
    pub fn brotli(mut self, enabled: bool) -> Self {
        self.brotli = enabled;
        self
    }
}
