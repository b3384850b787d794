//! REST side of the backend: login, profile bootstrap, conversation list and
//! paginated history.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::models::{
    ChatMessage, ConversationId, ConversationSummary, ErrorResponse, LoginRequest, LoginResponse,
    Profile,
};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::session::BearerToken;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("session expired or credentials rejected")]
    Unauthorized,
    #[error("server responded with {status}: {body}")]
    Status {
        status: StatusCode,
        body: ErrorResponse,
    },
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Backend operations the messenger depends on.
#[async_trait]
pub trait MessagingBackend: Send + Sync + std::fmt::Debug {
    async fn fetch_profile(&self) -> Result<Profile, BackendError>;

    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError>;

    /// One page of history, oldest first. Pages are zero-based.
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        page: u32,
        size: u32,
    ) -> Result<Vec<ChatMessage>, BackendError>;
}

/// `reqwest` implementation of [`MessagingBackend`].
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
    token: Option<BearerToken>,
}

impl RestBackend {
    /// `base` should end in `/` so relative endpoints join beneath it.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Exchanges credentials for a bearer token.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] for bad credentials, otherwise the
    /// transport or status failure.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<BearerToken, BackendError> {
        let request = self.client.post(self.endpoint("auth/login")?).json(&LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        });
        let login: LoginResponse = decode(self.execute(request).await?).await?;
        Ok(BearerToken::new(login.token))
    }

    /// Invalidates the token server-side. The response body is ignored.
    ///
    /// # Errors
    /// Transport or status failure.
    pub async fn logout(&self) -> Result<(), BackendError> {
        let request = self.client.post(self.endpoint("auth/logout")?);
        self.execute(request).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), %status, "backend response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ErrorResponse>(&text).unwrap_or_else(|_| {
                let message = status.canonical_reason().unwrap_or("request failed");
                if text.trim().is_empty() {
                    ErrorResponse::new(message)
                } else {
                    ErrorResponse::with_details(message, text.trim())
                }
            });
            return Err(BackendError::Status { status, body });
        }
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    Ok(response.json().await?)
}

#[async_trait]
impl MessagingBackend for RestBackend {
    async fn fetch_profile(&self) -> Result<Profile, BackendError> {
        let request = self.client.get(self.endpoint("users/me")?);
        decode(self.execute(request).await?).await
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        let request = self.client.get(self.endpoint("conversations")?);
        decode(self.execute(request).await?).await
    }

    #[instrument(skip(self, conversation), fields(conversation = %conversation))]
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        page: u32,
        size: u32,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        let mut url = self.endpoint(&format!("conversations/{conversation}/messages"))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());
        let request = self.client.get(url);
        decode(self.execute(request).await?).await
    }
}
