//! Fixtures shared by unit tests: model builders, a recording channel, a
//! scripted in-memory broker and a canned REST backend.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{sink, stream};
use shared::{
    config::Config,
    models::{
        ChatMessage, ConversationId, ConversationSummary, MessageId, ParticipantId, Profile, Role,
        Timestamp,
    },
};
use tokio::sync::mpsc;
use url::Url;

use crate::{
    api::{BackendError, MessagingBackend},
    connection::{Channel, ConnectionError, ConnectionManager, InboundReceiver, SubscriptionId},
    messenger::Messenger,
    reconnect::ReconnectPolicy,
    session::{BearerToken, Session},
    stomp::{self, Command, Frame},
    transport::{Connector, FrameSink, FrameStream, TransportError},
};

pub const BROKER_URL: &str = "ws://broker.test/ws";

pub fn base_time() -> Timestamp {
    Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap())
}

pub fn message(id: &str, conversation: &str, sender: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation),
        sender_name: sender.to_owned(),
        sender_id: None,
        content: content.to_owned(),
        sent_at: base_time(),
    }
}

pub fn message_at(id: &str, conversation: &str, sender: &str, offset_secs: i64) -> ChatMessage {
    ChatMessage {
        sent_at: Timestamp(base_time().0 + chrono::Duration::seconds(offset_secs)),
        ..message(id, conversation, sender, &format!("message {id}"))
    }
}

pub fn message_json(message: &ChatMessage) -> String {
    serde_json::to_string(message).unwrap()
}

pub fn profile(name: &str, id: Option<&str>) -> Profile {
    Profile {
        id: id.map(ParticipantId::new),
        display_name: name.to_owned(),
        email: format!("{}@fleetdesk.test", name.to_lowercase()),
        role: Role::Employee,
    }
}

pub fn session(name: &str) -> Session {
    Session::new(BearerToken::new("token-1"), profile(name, None))
}

pub fn summary(id: &str, title: &str, unread: u64) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::new(id),
        title: title.to_owned(),
        last_message: String::new(),
        last_activity_at: Some(base_time()),
        unread_count: unread,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Subscribe(String),
    Unsubscribe(String),
    Publish(String, String),
}

/// In-process [`Channel`] that records every operation.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub ops: Vec<ChannelOp>,
    pub refuse_publish: bool,
    connected: bool,
    next: u64,
    live: BTreeMap<String, String>,
}

impl RecordingChannel {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Currently subscribed destinations, sorted.
    pub fn live_destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self.live.values().cloned().collect();
        destinations.sort();
        destinations
    }
}

impl Channel for RecordingChannel {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        self.next += 1;
        let id = format!("sub-{}", self.next);
        self.live.insert(id.clone(), destination.to_owned());
        self.ops.push(ChannelOp::Subscribe(destination.to_owned()));
        Ok(SubscriptionId::new(id))
    }

    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        self.live.remove(id.as_str());
        self.ops.push(ChannelOp::Unsubscribe(id.to_string()));
        Ok(())
    }

    fn publish(&mut self, destination: &str, body: String) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        if self.refuse_publish {
            return Err(ConnectionError::Transport(TransportError::Closed));
        }
        self.ops.push(ChannelOp::Publish(destination.to_owned(), body));
        Ok(())
    }
}

/// How the in-memory broker answers the next connection attempt.
#[derive(Debug, Clone)]
pub enum Script {
    Accept,
    ErrorFrame(&'static str),
    Fail(u16),
}

/// Server side of one in-memory link.
#[derive(Debug)]
pub struct BrokerLink {
    written: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<Result<String, TransportError>>,
    message_ids: u64,
}

impl BrokerLink {
    /// Next frame the client wrote, failing the test after two seconds.
    pub async fn next_frame(&mut self) -> Frame {
        let text = tokio::time::timeout(Duration::from_secs(2), self.written.recv())
            .await
            .expect("client wrote nothing")
            .expect("client link closed");
        stomp::decode_batch(&text)
            .into_iter()
            .next()
            .expect("empty write")
            .expect("client wrote a malformed frame")
    }

    /// Skips frames until a `SUBSCRIBE` for `destination`; returns its id.
    pub async fn expect_subscribe(&mut self, destination: &str) -> String {
        loop {
            let frame = self.next_frame().await;
            if frame.command == Command::Subscribe && frame.get("destination") == Some(destination)
            {
                return frame.get("id").unwrap().to_owned();
            }
        }
    }

    pub fn is_drained(&mut self) -> bool {
        self.written.try_recv().is_err()
    }

    pub fn push_raw(&self, text: &str) {
        self.push.send(Ok(text.to_owned())).unwrap();
    }

    pub fn push_message(&mut self, subscription: &str, destination: &str, body: &str) {
        self.message_ids += 1;
        let frame = Frame::new(Command::Message)
            .header("subscription", subscription)
            .header("message-id", self.message_ids.to_string())
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body);
        self.push_raw(&frame.encode());
    }
}

/// Scripted [`Connector`] handing out in-memory links.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    scripts: Mutex<VecDeque<Script>>,
    links: Mutex<VecDeque<BrokerLink>>,
    bearers: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answers attempts from `scripts` in order, then accepts.
    pub fn scripted(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        let connector = Self::default();
        connector.scripts.lock().unwrap().extend(scripts);
        Arc::new(connector)
    }

    pub fn attempts(&self) -> usize {
        self.bearers.lock().unwrap().len()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }

    /// Oldest link not yet taken by the test.
    pub fn take_link(&self) -> BrokerLink {
        self.links
            .lock()
            .unwrap()
            .pop_front()
            .expect("no link was opened")
    }

    /// Most recently opened link, discarding older ones.
    pub fn take_latest_link(&self) -> BrokerLink {
        let mut links = self.links.lock().unwrap();
        let latest = links.pop_back().expect("no link was opened");
        links.clear();
        latest
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        _url: &Url,
        bearer: &str,
    ) -> Result<(FrameSink, FrameStream), TransportError> {
        self.bearers.lock().unwrap().push(bearer.to_owned());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Accept);

        let reply = match script {
            Script::Accept => "CONNECTED\nversion:1.2\n\n\0".to_owned(),
            Script::ErrorFrame(message) => format!("ERROR\nmessage:{message}\n\n\0"),
            Script::Fail(status) => return Err(TransportError::Rejected(status)),
        };

        let (client_tx, written) = mpsc::unbounded_channel::<String>();
        let (push, server_rx) = mpsc::unbounded_channel::<Result<String, TransportError>>();
        push.send(Ok(reply)).unwrap();

        let frame_sink = sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let frame_stream = stream::unfold(server_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        self.links.lock().unwrap().push_back(BrokerLink {
            written,
            push,
            message_ids: 0,
        });
        Ok((Box::pin(frame_sink), Box::pin(frame_stream)))
    }
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        max_attempts: 5,
    }
}

pub fn connection(
    connector: &Arc<MemoryConnector>,
    policy: ReconnectPolicy,
) -> (ConnectionManager, InboundReceiver) {
    ConnectionManager::new(
        Arc::clone(connector) as Arc<dyn Connector>,
        Url::parse(BROKER_URL).unwrap(),
        BearerToken::new("token-1"),
        policy,
    )
}

/// Canned [`MessagingBackend`] that records history requests.
#[derive(Debug)]
pub struct FakeBackend {
    profile: Profile,
    conversations: Mutex<Vec<ConversationSummary>>,
    histories: Mutex<HashMap<ConversationId, Vec<ChatMessage>>>,
    pub history_calls: Mutex<Vec<(ConversationId, u32, u32)>>,
    pub fail_history: Mutex<bool>,
}

impl FakeBackend {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            conversations: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            history_calls: Mutex::new(Vec::new()),
            fail_history: Mutex::new(false),
        }
    }

    pub fn with_conversations(self, conversations: Vec<ConversationSummary>) -> Self {
        *self.conversations.lock().unwrap() = conversations;
        self
    }

    pub fn with_history(self, conversation: &str, messages: Vec<ChatMessage>) -> Self {
        self.histories
            .lock()
            .unwrap()
            .insert(ConversationId::new(conversation), messages);
        self
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingBackend for FakeBackend {
    async fn fetch_profile(&self) -> Result<Profile, BackendError> {
        Ok(self.profile.clone())
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        page: u32,
        size: u32,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        self.history_calls
            .lock()
            .unwrap()
            .push((conversation.clone(), page, size));
        if *self.fail_history.lock().unwrap() {
            return Err(BackendError::Unauthorized);
        }
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_defaults();
    config.channel.url = Url::parse(BROKER_URL).unwrap();
    config.reconnect.initial_delay_ms = 1;
    config.reconnect.max_delay_ms = 5;
    config.history.page_size = 20;
    config
}

/// Messenger for user "Ana" (id 10) over an in-memory broker.
pub fn messenger(
    connector: &Arc<MemoryConnector>,
    backend: FakeBackend,
) -> (Messenger, InboundReceiver, Arc<FakeBackend>) {
    messenger_with_config(connector, backend, &test_config())
}

pub fn messenger_with_config(
    connector: &Arc<MemoryConnector>,
    backend: FakeBackend,
    config: &Config,
) -> (Messenger, InboundReceiver, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let session = Session::new(BearerToken::new("token-1"), profile("Ana", Some("10")));
    let (messenger, inbound) = Messenger::new(
        config,
        session,
        Arc::clone(&backend) as Arc<dyn MessagingBackend>,
        Arc::clone(connector) as Arc<dyn Connector>,
    );
    (messenger, inbound, backend)
}
