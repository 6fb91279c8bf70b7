use airsync_core::config::{optional_str, require_str};
use airsync_core::protocol::ConnectorSpecification;
use airsync_core::{Authenticator, Error, Oauth2Authenticator, Result, TokenAuthenticator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const API_BASE_URL: &str = "https://api.salesloft.com/v2/";
pub const TOKEN_ENDPOINT: &str = "https://accounts.salesloft.com/oauth/token";

lazy_static::lazy_static! {
    static ref SPEC: Value = {
        let spec = include_str!("../schema/spec.json");
        serde_json::from_str(spec).unwrap()
    };
}

pub fn spec() -> Result<ConnectorSpecification> {
    serde_json::from_value(SPEC.clone())
        .map_err(|e| Error::Protocol(format!("Invalid Salesloft spec: {}", e)))
}

#[derive(Clone, PartialEq, Eq)]
pub enum SalesloftCredentials {
    Oauth2 {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ApiKey { api_key: String },
}

impl fmt::Debug for SalesloftCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SalesloftCredentials::Oauth2 { client_id, .. } => f
                .debug_struct("Oauth2")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            SalesloftCredentials::ApiKey { .. } => f.debug_struct("ApiKey").finish_non_exhaustive(),
        }
    }
}

impl SalesloftCredentials {
    pub fn authenticator(&self, token_endpoint: &str) -> Result<Arc<dyn Authenticator>> {
        Ok(match self {
            SalesloftCredentials::Oauth2 {
                client_id,
                client_secret,
                refresh_token,
            } => Arc::new(Oauth2Authenticator::new(
                token_endpoint,
                client_id.as_str(),
                client_secret.as_str(),
                refresh_token.as_str(),
            )?),
            SalesloftCredentials::ApiKey { api_key } => {
                Arc::new(TokenAuthenticator::new(api_key.as_str()))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesloftConfig {
    pub start_date: String,
    pub credentials: SalesloftCredentials,
}

impl SalesloftConfig {
    pub fn from_json(value: &Value) -> Result<Self> {
        let start_date = require_str(value, "start_date")?;
        let credentials = match value.get("credentials") {
            None | Some(Value::Null) => {
                return Err(Error::MissingConfiguration("credentials".to_string()))
            }
            Some(credentials) => credentials,
        };

        let credentials = match optional_str(credentials, "auth_type") {
            Some("api_key") => SalesloftCredentials::ApiKey {
                api_key: credential(credentials, "api_key")?,
            },
            Some("oauth2.0") | None => SalesloftCredentials::Oauth2 {
                client_id: credential(credentials, "client_id")?,
                client_secret: credential(credentials, "client_secret")?,
                refresh_token: credential(credentials, "refresh_token")?,
            },
            Some(other) => {
                return Err(Error::InvalidConfiguration(format!(
                    "unsupported auth_type '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            start_date: start_date.to_string(),
            credentials,
        })
    }
}

fn credential(credentials: &Value, key: &str) -> Result<String> {
    require_str(credentials, key)
        .map(str::to_string)
        .map_err(|e| match e {
            Error::MissingConfiguration(key) => {
                Error::MissingConfiguration(format!("credentials.{}", key))
            }
            other => other,
        })
}
