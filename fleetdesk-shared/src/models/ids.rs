//! String-backed identifiers.
//!
//! Backends disagree on whether ids are JSON numbers or strings, so every id
//! accepts both on the way in and always serializes as a string.

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Text(text) if text.trim().is_empty() => {
            Err(de::Error::custom("identifier must not be empty"))
        }
        RawId::Text(text) => Ok(text),
        RawId::Signed(value) => Ok(value.to_string()),
        RawId::Unsigned(value) => Ok(value.to_string()),
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserialize_id(deserializer).map(Self)
            }
        }
    };
}

string_id!(
    /// Identifier of a server-side conversation.
    ConversationId
);
string_id!(
    /// Identifier of a single message.
    MessageId
);
string_id!(
    /// Stable identifier of a participant, when the backend exposes one.
    ParticipantId
);
