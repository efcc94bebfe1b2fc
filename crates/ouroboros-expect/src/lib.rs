//! ouroboros-expect: Fluent HTTP and WebSocket request builder for API tests
//!
//! Builds one request step by step, sends it through a pluggable transport and
//! hands back a [`Response`] for assertions.
//!
//! # Architecture
//!
//! - `Request`: fluent builder; path templates, query, headers, cookies and
//!   typed bodies (text, JSON, URL-encoded or multipart forms, chunked)
//! - `Chain`: sticky failure state; the first misuse is reported once and
//!   every later builder call becomes a no-op
//! - `Client` / `WebsocketDialer`: transports (reqwest, in-process axum
//!   router, tokio-tungstenite)
//! - `Printer`: diagnostic observers of each round trip
//! - `Expect`: creates requests sharing one `Config`

pub mod body;
pub mod chain;
pub mod config;
pub mod error;
pub mod expect;
pub mod multipart;
pub mod path;
pub mod printer;
pub mod query;
pub mod request;
pub mod response;
pub mod transport;
pub mod values;
pub mod websocket;

pub use body::Body;
pub use chain::{Chain, PanicReporter, Reporter, TracingReporter};
pub use config::{Config, TransportConfig};
pub use error::{HttpError, HttpErrorCategory, HttpResult, RequestError};
pub use expect::Expect;
pub use path::PathTemplate;
pub use printer::{Printer, TracingPrinter};
pub use query::Values;
pub use request::{Matcher, Request};
pub use response::Response;
pub use transport::{
    Client, DefaultRequestFactory, HandlerClient, OutgoingRequest, RawResponse, ReqwestClient,
    RequestFactory,
};
pub use websocket::{DialError, TungsteniteDialer, Websocket, WebsocketDialer};

// Message type read from a `Websocket`
pub use tokio_tungstenite::tungstenite::Message;
