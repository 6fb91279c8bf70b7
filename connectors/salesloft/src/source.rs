use crate::config::{self, SalesloftConfig, API_BASE_URL, TOKEN_ENDPOINT};
use crate::streams::{SalesloftEntity, SalesloftStream};
use airsync_core::config::{parse_datetime, require_str};
use airsync_core::protocol::ConnectorSpecification;
use airsync_core::{ConnectionCheck, HttpClient, Result, RetryPolicy, Source, Stream};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

/// Salesloft sales engagement source.
#[derive(Debug, Clone)]
pub struct SourceSalesloft {
    api_base: String,
    token_endpoint: String,
    retry: RetryPolicy,
}

impl Default for SourceSalesloft {
    fn default() -> Self {
        Self::with_base_url(API_BASE_URL, TOKEN_ENDPOINT)
    }
}

impl SourceSalesloft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the source at another API root and OAuth token endpoint.
    pub fn with_base_url(api_base: &str, token_endpoint: &str) -> Self {
        let api_base = if api_base.ends_with('/') {
            api_base.to_string()
        } else {
            format!("{}/", api_base)
        };
        Self {
            api_base,
            token_endpoint: token_endpoint.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn http_client(&self) -> Result<HttpClient> {
        Ok(HttpClient::new()?.with_retry_policy(self.retry.clone()))
    }

    /// The streams this source exposes for `config`, in catalog order.
    pub fn declarations(&self, config: &Value) -> Result<Vec<SalesloftStream>> {
        let config = SalesloftConfig::from_json(config)?;
        let authenticator = config.credentials.authenticator(&self.token_endpoint)?;
        let client = self.http_client()?;

        Ok([
            SalesloftEntity::Accounts,
            SalesloftEntity::Cadences,
            SalesloftEntity::CadenceMemberships,
            SalesloftEntity::Calls,
            SalesloftEntity::Emails,
            SalesloftEntity::People,
            SalesloftEntity::Users,
        ]
        .into_iter()
        .map(|entity| {
            SalesloftStream::new(
                entity,
                authenticator.clone(),
                &self.api_base,
                &config.start_date,
                client.clone(),
            )
        })
        .collect())
    }

    async fn try_connect(&self, config: &Value) -> Result<()> {
        parse_datetime(require_str(config, "start_date")?)?;
        let config = SalesloftConfig::from_json(config)?;
        let authenticator = config.credentials.authenticator(&self.token_endpoint)?;

        let url = format!("{}me.json", self.api_base);
        self.http_client()?
            .get_json(&url, &[], &[], authenticator.as_ref())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Source for SourceSalesloft {
    fn name(&self) -> &str {
        "salesloft"
    }

    fn spec(&self) -> Result<ConnectorSpecification> {
        config::spec()
    }

    async fn check_connection(&self, config: &Value) -> ConnectionCheck {
        match self.try_connect(config).await {
            Ok(()) => {
                info!("Salesloft connection succeeded");
                ConnectionCheck::Succeeded
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "Salesloft rejected the credentials");
                ConnectionCheck::failed(format!(
                    "Unable to connect to Salesloft API with the provided credentials. Please check your credentials. Error: {}",
                    e
                ))
            }
            Err(e) => {
                warn!(error = %e, "Salesloft connection failed");
                ConnectionCheck::failed(e.to_string())
            }
        }
    }

    fn streams(&self, config: &Value) -> Result<Vec<Box<dyn Stream>>> {
        Ok(self
            .declarations(config)?
            .into_iter()
            .map(|stream| Box::new(stream) as Box<dyn Stream>)
            .collect())
    }
}
