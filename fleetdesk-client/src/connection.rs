//! # Connection manager
//!
//! Owns the single STOMP link of a session. The link is driven by two tasks:
//! a writer that drains an unbounded queue into the transport sink, and a
//! reader that forwards raw text into the manager's inbound queue. Everything
//! that interprets frames runs on the owner through [`ConnectionManager::accept`],
//! so subscription bookkeeping never needs a lock.
//!
//! Every link is stamped with an epoch. Events still in flight from a link that
//! has since been torn down carry an old epoch and are ignored.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use shared::models::ChatMessage;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    reconnect::ReconnectPolicy,
    session::BearerToken,
    stomp::{self, Command, Frame, FrameError},
    transport::{Connector, FrameSink, FrameStream, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Retrying { attempt: u32, delay: Duration },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Retrying { attempt, delay } => {
                write!(f, "retrying (attempt {attempt}, in {}ms)", delay.as_millis())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
    #[error("server rejected the session: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed handshake frame: {0}")]
    Frame(#[from] FrameError),
    #[error("channel closed before the handshake completed")]
    HandshakeClosed,
    #[error("unexpected {0} frame during handshake")]
    UnexpectedFrame(Command),
    #[error("reconnect is disabled")]
    ReconnectDisabled,
    #[error("gave up after {attempts} reconnect attempts: {last}")]
    ReconnectExhausted {
        attempts: u32,
        last: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// True when the credential itself was refused; retrying cannot help.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Self::Rejected(_) => true,
            Self::Transport(err) => err.is_auth_rejection(),
            Self::ReconnectExhausted { last, .. } => last.is_auth_rejection(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw event produced by a link's reader task.
#[derive(Debug)]
pub enum Inbound {
    Frames { epoch: u64, text: String },
    Closed { epoch: u64, reason: String },
}

impl Inbound {
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        match self {
            Self::Frames { epoch, .. } | Self::Closed { epoch, .. } => *epoch,
        }
    }
}

pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Interpreted inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message {
        destination: String,
        message: ChatMessage,
    },
    Disconnected {
        reason: String,
    },
}

/// Publish/subscribe surface used by the router and the publisher.
pub trait Channel {
    fn is_connected(&self) -> bool;

    /// # Errors
    /// Fails with [`ConnectionError::NotConnected`] without a live link.
    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, ConnectionError>;

    /// # Errors
    /// Fails with [`ConnectionError::NotConnected`] without a live link.
    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), ConnectionError>;

    /// # Errors
    /// Fails when there is no live link or the writer has stopped.
    fn publish(&mut self, destination: &str, body: String) -> Result<(), ConnectionError>;
}

#[derive(Debug)]
struct Link {
    epoch: u64,
    outbound: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
    reader: CancellationToken,
}

impl Link {
    fn spawn(
        epoch: u64,
        mut sink: FrameSink,
        mut stream: FrameStream,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(text) = queue.recv().await {
                if let Err(err) = sink.send(text).await {
                    warn!(epoch, %err, "outbound frame not written");
                    break;
                }
            }
            if let Err(err) = sink.close().await {
                debug!(epoch, %err, "transport close");
            }
        });

        let reader = CancellationToken::new();
        let cancelled = reader.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    () = cancelled.cancelled() => break None,
                    item = stream.next() => match item {
                        Some(Ok(text)) => {
                            if inbound.send(Inbound::Frames { epoch, text }).is_err() {
                                break None;
                            }
                        }
                        Some(Err(err)) => break Some(err.to_string()),
                        None => break Some(TransportError::Closed.to_string()),
                    },
                }
            };
            if let Some(reason) = reason {
                let _ = inbound.send(Inbound::Closed { epoch, reason });
            }
        });

        Self {
            epoch,
            outbound,
            writer,
            reader,
        }
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    url: Url,
    token: BearerToken,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    epoch: u64,
    link: Option<Link>,
    subscriptions: HashMap<SubscriptionId, String>,
    next_subscription: u64,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl ConnectionManager {
    /// Creates a disconnected manager and the queue its links report into.
    ///
    /// The receiver lives as long as the manager and spans reconnects.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        url: Url,
        token: BearerToken,
        policy: ReconnectPolicy,
    ) -> (Self, InboundReceiver) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            connector,
            url,
            token,
            policy,
            state,
            epoch: 0,
            link: None,
            subscriptions: HashMap::new(),
            next_subscription: 0,
            inbound,
        };
        (manager, receiver)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes state transitions, including the intermediate retry states.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Opens the channel and completes the STOMP handshake. Never retries.
    ///
    /// # Errors
    /// Returns the handshake failure; the state is `Disconnected` afterwards.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);
        match self.open().await {
            Ok(link) => {
                info!(url = %self.url, epoch = link.epoch, "channel connected");
                self.link = Some(link);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                error!(url = %self.url, %err, "channel handshake failed");
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn open(&mut self) -> Result<Link, ConnectionError> {
        let connector = Arc::clone(&self.connector);
        let (mut sink, mut stream) = connector.connect(&self.url, self.token.expose()).await?;

        let host = self.url.host_str().unwrap_or("localhost");
        let authorization = format!("Bearer {}", self.token.expose());
        sink.send(Frame::connect(host, &authorization).encode()).await?;
        await_connected(&mut stream).await?;

        self.epoch += 1;
        Ok(Link::spawn(self.epoch, sink, stream, self.inbound.clone()))
    }

    /// Sends `DISCONNECT`, closes the transport and releases every
    /// subscription. A no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            self.subscriptions.clear();
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let Link {
            epoch,
            outbound,
            writer,
            reader,
        } = link;
        let receipt = format!("disconnect-{epoch}");
        if outbound.send(Frame::disconnect(&receipt).encode()).is_err() {
            debug!(epoch, "writer already stopped");
        }
        drop(outbound);
        reader.cancel();
        if let Err(err) = writer.await {
            warn!(epoch, %err, "writer task ended abnormally");
        }

        self.subscriptions.clear();
        self.set_state(ConnectionState::Disconnected);
        info!(epoch, "channel disconnected");
    }

    /// Drives `Disconnected -> Retrying -> Connected` with exponential backoff.
    ///
    /// Any live link is closed first. An authentication rejection ends the
    /// loop at once.
    ///
    /// # Errors
    /// [`ConnectionError::ReconnectDisabled`] when the policy is off, the
    /// rejection itself, or [`ConnectionError::ReconnectExhausted`].
    pub async fn reconnect(&mut self) -> Result<(), ConnectionError> {
        if !self.policy.enabled {
            return Err(ConnectionError::ReconnectDisabled);
        }
        self.disconnect().await;

        let mut last = ConnectionError::NotConnected;
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            self.set_state(ConnectionState::Retrying { attempt, delay });
            counter!("fleetdesk_reconnect_attempts_total").increment(1);
            info!(attempt, delay_ms = delay.as_millis(), "reconnecting");
            tokio::time::sleep(delay).await;

            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_auth_rejection() => return Err(err),
                Err(err) => {
                    warn!(attempt, %err, "reconnect attempt failed");
                    last = err;
                }
            }
        }

        Err(ConnectionError::ReconnectExhausted {
            attempts: self.policy.max_attempts,
            last: Box::new(last),
        })
    }

    /// Interprets one reader event. Events from retired links yield nothing.
    pub fn accept(&mut self, inbound: Inbound) -> Vec<ChannelEvent> {
        if !self.is_current(inbound.epoch()) {
            debug!(epoch = inbound.epoch(), "ignoring event from a retired link");
            return Vec::new();
        }
        match inbound {
            Inbound::Frames { text, .. } => self.accept_frames(&text),
            Inbound::Closed { reason, .. } => {
                warn!(%reason, "channel lost");
                self.drop_link();
                vec![ChannelEvent::Disconnected { reason }]
            }
        }
    }

    fn accept_frames(&mut self, text: &str) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        for decoded in stomp::decode_batch(text) {
            counter!("fleetdesk_frames_received_total").increment(1);
            let frame = match decoded {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "dropping malformed frame");
                    counter!("fleetdesk_frames_dropped_total").increment(1);
                    continue;
                }
            };
            match frame.command {
                Command::Message => events.extend(self.decode_message(&frame)),
                Command::Error => {
                    let reason = error_reason(&frame);
                    error!(%reason, "server ended the session");
                    self.drop_link();
                    events.push(ChannelEvent::Disconnected { reason });
                    break;
                }
                Command::Receipt => debug!(receipt = frame.get("receipt-id"), "receipt"),
                other => debug!(command = %other, "ignoring frame"),
            }
        }
        events
    }

    fn decode_message(&self, frame: &Frame) -> Option<ChannelEvent> {
        let subscription = frame.get("subscription").unwrap_or_default();
        if !self.subscriptions.keys().any(|id| id.as_str() == subscription) {
            debug!(subscription, "message without an active subscription");
            return None;
        }
        let destination = frame.get("destination").unwrap_or_default().to_owned();
        match serde_json::from_str::<ChatMessage>(&frame.body) {
            Ok(message) => {
                debug!(%destination, id = %message.id, "message received");
                Some(ChannelEvent::Message {
                    destination,
                    message,
                })
            }
            Err(err) => {
                warn!(%destination, %err, "dropping undecodable message body");
                counter!("fleetdesk_frames_dropped_total").increment(1);
                None
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.epoch == epoch)
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            // Dropping the queue lets the writer close the sink on its own.
            link.reader.cancel();
        }
        self.subscriptions.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
        }
    }

    fn enqueue(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let link = self
            .link
            .as_ref()
            .filter(|_| self.is_connected())
            .ok_or(ConnectionError::NotConnected)?;
        link.outbound
            .send(frame.encode())
            .map_err(|_| ConnectionError::Transport(TransportError::Closed))
    }
}

impl Channel for ConnectionManager {
    fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected) && self.link.is_some()
    }

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, ConnectionError> {
        self.next_subscription += 1;
        let id = SubscriptionId::new(format!("sub-{}", self.next_subscription));
        self.enqueue(&Frame::subscribe(id.as_str(), destination))?;
        debug!(%id, destination, "subscribed");
        self.subscriptions.insert(id.clone(), destination.to_owned());
        Ok(id)
    }

    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), ConnectionError> {
        self.enqueue(&Frame::unsubscribe(id.as_str()))?;
        if let Some(destination) = self.subscriptions.remove(id) {
            debug!(%id, destination, "unsubscribed");
        }
        Ok(())
    }

    fn publish(&mut self, destination: &str, body: String) -> Result<(), ConnectionError> {
        self.enqueue(&Frame::send(destination, body))
    }
}

async fn await_connected(stream: &mut FrameStream) -> Result<(), ConnectionError> {
    while let Some(text) = stream.next().await {
        for decoded in stomp::decode_batch(&text?) {
            let frame = decoded?;
            return match frame.command {
                Command::Connected => {
                    debug!(version = frame.get("version"), "STOMP session open");
                    Ok(())
                }
                Command::Error => Err(ConnectionError::Rejected(error_reason(&frame))),
                other => Err(ConnectionError::UnexpectedFrame(other)),
            };
        }
    }
    Err(ConnectionError::HandshakeClosed)
}

fn error_reason(frame: &Frame) -> String {
    frame
        .get("message")
        .map(str::to_owned)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| frame.body.trim().to_owned())
}
