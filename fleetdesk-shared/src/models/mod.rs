pub mod conversation;
pub mod errors;
pub mod ids;
pub mod message;
pub mod timestamp;
pub mod user;

pub use conversation::ConversationSummary;
pub use errors::ErrorResponse;
pub use ids::{ConversationId, MessageId, ParticipantId};
pub use message::{ChatMessage, Direction, OutboundMessage};
pub use timestamp::Timestamp;
pub use user::{LoginRequest, LoginResponse, Profile, Role};
