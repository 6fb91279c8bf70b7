use crate::error::{Error, Result};
use crate::http::{REQUEST_TIMEOUT, USER_AGENT};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Produces the header that proves identity on outbound requests.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Returns `(header name, header value)`.
    async fn auth_header(&self) -> Result<(String, String)>;
}

/// Static bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenAuthenticator {
    token: String,
}

impl TokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("token", &"****")
            .finish()
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn auth_header(&self) -> Result<(String, String)> {
        Ok(("Authorization".into(), format!("Bearer {}", self.token)))
    }
}

// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct TokenState {
    refresh_token: String,
    access_token: Option<String>,
    expires_at: Option<Instant>,
}

/// OAuth 2.0 refresh-token grant. The access token is cached until it is
/// about to expire; a rotated refresh token replaces the old one in memory.
pub struct Oauth2Authenticator {
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
    timeout: Duration,
    state: Mutex<TokenState>,
}

impl Oauth2Authenticator {
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
            timeout: REQUEST_TIMEOUT,
            state: Mutex::new(TokenState {
                refresh_token: refresh_token.into(),
                access_token: None,
                expires_at: None,
            }),
        })
    }

    /// Bounds each token request; the state lock is held while it runs.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if let (Some(token), Some(expires_at)) = (&state.access_token, state.expires_at) {
            if Instant::now() + EXPIRY_MARGIN < expires_at {
                return Ok(token.clone());
            }
        }

        debug!(endpoint = %self.token_endpoint, "Refreshing OAuth access token");
        let response = self
            .http_client
            .post(&self.token_endpoint)
            .timeout(self.timeout)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", state.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status,
                url: self.token_endpoint.clone(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        // Without an expiry the token is used until the server rejects it.
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        if let Some(rotated) = token.refresh_token {
            info!("OAuth refresh token rotated");
            state.refresh_token = rotated;
        }
        state.access_token = Some(token.access_token.clone());
        state.expires_at = Some(Instant::now() + lifetime);

        Ok(token.access_token)
    }
}

impl fmt::Debug for Oauth2Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oauth2Authenticator")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for Oauth2Authenticator {
    async fn auth_header(&self) -> Result<(String, String)> {
        let token = self.access_token().await?;
        Ok(("Authorization".into(), format!("Bearer {}", token)))
    }
}
