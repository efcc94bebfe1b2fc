//! WebSocket handshake dialing and the connection handle

use crate::error::HttpError;
use crate::transport::RawResponse;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::HOST;
use http::HeaderMap;
use std::fmt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as ClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of a failed dial
#[derive(Debug)]
pub enum DialError {
    /// The server answered the upgrade with something other than 101.
    ///
    /// Not a transport failure: the response is handed out for inspection.
    HandshakeRejected(RawResponse),
    /// Network or protocol failure; no response exists
    Transport(HttpError),
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialError::HandshakeRejected(response) => {
                write!(f, "websocket handshake rejected with status {}", response.status())
            }
            DialError::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DialError {}

impl From<HttpError> for DialError {
    fn from(err: HttpError) -> Self {
        DialError::Transport(err)
    }
}

/// Performs the WebSocket upgrade handshake.
#[async_trait]
pub trait WebsocketDialer: Send + Sync {
    async fn dial(&self, url: &Url, headers: &HeaderMap) -> Result<(Websocket, RawResponse), DialError>;
}

/// Dialer built on tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteDialer;

impl TungsteniteDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WebsocketDialer for TungsteniteDialer {
    async fn dial(&self, url: &Url, headers: &HeaderMap) -> Result<(Websocket, RawResponse), DialError> {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let request = handshake_request(url, headers)
            .map_err(|e| DialError::Transport(HttpError::WebSocket(e)))?;

        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, response)) => {
                let (parts, body) = response.into_parts();
                let body = body.map(Bytes::from).unwrap_or_default();
                Ok((Websocket::new(stream), http::Response::from_parts(parts, body)))
            }
            Err(WsError::Http(response)) => {
                let mut rejected = http::Response::builder()
                    .status(response.status())
                    .version(response.version());
                if let Some(headers) = rejected.headers_mut() {
                    *headers = response.headers().clone();
                }
                let body = response
                    .body()
                    .as_ref()
                    .map(|b| Bytes::copy_from_slice(b))
                    .unwrap_or_default();
                let rejected = rejected
                    .body(body)
                    .map_err(|e| DialError::Transport(HttpError::ResponseError(e.to_string())))?;
                Err(DialError::HandshakeRejected(rejected))
            }
            Err(e) => Err(DialError::Transport(HttpError::WebSocket(e))),
        }
    }
}

/// Upgrade request for `url` carrying the caller's headers.
///
/// `Host` replaces the generated one; everything else is appended.
fn handshake_request(
    url: &Url,
    headers: &HeaderMap,
) -> Result<ClientRequest, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.as_str().into_client_request()?;
    for (name, value) in headers {
        if *name == HOST {
            request.headers_mut().insert(HOST, value.clone());
        } else {
            request.headers_mut().append(name.clone(), value.clone());
        }
    }
    Ok(request)
}

/// An established WebSocket connection
pub struct Websocket {
    stream: Stream,
}

impl Websocket {
    pub fn new(stream: Stream) -> Self {
        Self { stream }
    }

    /// Send a text message
    pub async fn write_text(&mut self, text: impl Into<String>) -> Result<(), HttpError> {
        self.stream.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Send a binary message
    pub async fn write_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<(), HttpError> {
        self.stream.send(Message::binary(data.into())).await?;
        Ok(())
    }

    /// Next message from the peer, `None` once the stream ended
    pub async fn read_message(&mut self) -> Result<Option<Message>, HttpError> {
        match self.stream.next().await {
            Some(message) => Ok(Some(message?)),
            None => Ok(None),
        }
    }

    /// Send a close frame and wait for the closing handshake
    pub async fn close(&mut self) -> Result<(), HttpError> {
        self.stream.close(None).await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &Stream {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }
}

impl fmt::Debug for Websocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Websocket").finish_non_exhaustive()
    }
}
