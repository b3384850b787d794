use std::fmt;

use shared::models::{ChatMessage, Direction, Profile, Role};
use tracing::info;

use crate::api::{BackendError, MessagingBackend};

/// Bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// An authenticated session: credential plus the caller's own profile.
///
/// Built once after login and handed to every component that needs identity;
/// dropping it is the logout.
#[derive(Debug, Clone)]
pub struct Session {
    token: BearerToken,
    profile: Profile,
}

impl Session {
    #[must_use]
    pub fn new(token: BearerToken, profile: Profile) -> Self {
        Self { token, profile }
    }

    /// Resolves the caller's profile for `token` via the session bootstrap endpoint.
    ///
    /// # Errors
    /// Propagates the backend failure, including an expired credential.
    pub async fn bootstrap(
        backend: &dyn MessagingBackend,
        token: BearerToken,
    ) -> Result<Self, BackendError> {
        let profile = backend.fetch_profile().await?;
        info!(user = %profile.display_name, role = %profile.role, "session established");
        Ok(Self::new(token, profile))
    }

    #[must_use]
    pub fn token(&self) -> &BearerToken {
        &self.token
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.profile.role
    }

    /// Stable ids are compared when both sides have one; otherwise the display
    /// names are, which misfires for users sharing a name.
    #[must_use]
    pub fn classify(&self, message: &ChatMessage) -> Direction {
        let mine = match (&self.profile.id, &message.sender_id) {
            (Some(own), Some(sender)) => own == sender,
            _ => message.sender_name == self.profile.display_name,
        };
        if mine {
            Direction::Sent
        } else {
            Direction::Received
        }
    }
}
