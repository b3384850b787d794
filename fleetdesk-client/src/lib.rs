#![cfg_attr(not(test), forbid(unsafe_code))]

//! FleetDesk messaging core: a STOMP channel over WebSocket, subscription
//! routing, the active conversation's message list, the conversation index
//! and the REST backend client.

pub mod api;
pub mod connection;
pub mod index;
pub mod messenger;
pub mod publisher;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod stomp;
pub mod store;
pub mod transport;

pub use api::{BackendError, MessagingBackend, RestBackend};
pub use connection::{ChannelEvent, ConnectionError, ConnectionManager, ConnectionState, Inbound};
pub use messenger::{HistoryOutcome, HistoryTicket, Messenger, MessengerError, MessengerUpdate};
pub use publisher::{PublishResult, SendError};
pub use session::{BearerToken, Session};
pub use transport::{Connector, WsConnector};

#[cfg(test)]
mod test_support;
