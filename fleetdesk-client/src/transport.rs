//! Text-frame transport underneath the STOMP channel.
//!
//! [`Connector`] is the seam between the connection manager and the socket:
//! production code uses [`WsConnector`], tests script an in-memory broker.

use std::{fmt::Debug, pin::Pin};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use thiserror::Error;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::debug;
use url::Url;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake rejected with HTTP status {0}")]
    Rejected(u16),
    #[error("invalid handshake request: {0}")]
    Request(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// True when the server refused the credential at upgrade time.
    #[must_use]
    pub const fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Rejected(401 | 403))
    }

    fn from_handshake(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => Self::Rejected(response.status().as_u16()),
            other => Self::WebSocket(other),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Opens a bidirectional text channel authenticated with `bearer`.
    async fn connect(&self, url: &Url, bearer: &str)
    -> Result<(FrameSink, FrameStream), TransportError>;
}

/// WebSocket connector; the bearer token rides on the upgrade request.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &Url,
        bearer: &str,
    ) -> Result<(FrameSink, FrameStream), TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let value = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|err| TransportError::Request(err.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        let (socket, response) = connect_async(request)
            .await
            .map_err(TransportError::from_handshake)?;
        debug!(status = %response.status(), "websocket upgraded");

        let (write, read) = socket.split();
        let sink = write
            .with(|text: String| future::ready(Ok::<_, tungstenite::Error>(Message::text(text))))
            .sink_map_err(TransportError::from);
        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
