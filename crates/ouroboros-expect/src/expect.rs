//! Entry point that stamps out requests from a shared config

use crate::config::Config;
use crate::error::HttpResult;
use crate::request::Request;
use crate::response::Response;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Builder = Arc<dyn Fn(Request) -> Request + Send + Sync>;
type SharedMatcher = Arc<dyn Fn(&Response) + Send + Sync>;

/// Creates requests sharing one [`Config`], plus builders and matchers
/// applied to every request.
///
/// ```ignore
/// let e = Expect::new(Config::with_defaults("http://localhost:8080")?)
///     .builder(|req| req.with_header("Authorization", "Bearer test"));
///
/// let response = e.get("/users/{id}")?.with_path("id", 42).expect().await;
/// ```
#[derive(Clone)]
pub struct Expect {
    config: Config,
    builders: Vec<Builder>,
    matchers: Vec<SharedMatcher>,
}

impl Expect {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            builders: Vec::new(),
            matchers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Copy of this instance that runs `builder` on every new request
    pub fn builder(&self, builder: impl Fn(Request) -> Request + Send + Sync + 'static) -> Self {
        let mut copy = self.clone();
        copy.builders.push(Arc::new(builder));
        copy
    }

    /// Copy of this instance that attaches `matcher` to every new request
    pub fn matcher(&self, matcher: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        let mut copy = self.clone();
        copy.matchers.push(Arc::new(matcher));
        copy
    }

    pub fn request(&self, method: &str, path: &str) -> HttpResult<Request> {
        self.request_with_args(method, path, std::iter::empty::<Value>())
    }

    /// Request with positional path arguments
    pub fn request_with_args<I, V>(&self, method: &str, path: &str, args: I) -> HttpResult<Request>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut request = Request::new_with_args(&self.config, method, path, args)?;
        for builder in &self.builders {
            request = builder(request);
        }
        for matcher in &self.matchers {
            let matcher = Arc::clone(matcher);
            request = request.with_matcher(move |response| matcher(response));
        }
        Ok(request)
    }

    pub fn get(&self, path: &str) -> HttpResult<Request> {
        self.request("GET", path)
    }

    pub fn head(&self, path: &str) -> HttpResult<Request> {
        self.request("HEAD", path)
    }

    pub fn options(&self, path: &str) -> HttpResult<Request> {
        self.request("OPTIONS", path)
    }

    pub fn post(&self, path: &str) -> HttpResult<Request> {
        self.request("POST", path)
    }

    pub fn put(&self, path: &str) -> HttpResult<Request> {
        self.request("PUT", path)
    }

    pub fn patch(&self, path: &str) -> HttpResult<Request> {
        self.request("PATCH", path)
    }

    pub fn delete(&self, path: &str) -> HttpResult<Request> {
        self.request("DELETE", path)
    }
}

impl fmt::Debug for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expect")
            .field("config", &self.config)
            .field("builders", &self.builders.len())
            .field("matchers", &self.matchers.len())
            .finish()
    }
}
