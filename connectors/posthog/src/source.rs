use crate::config::{self, PosthogConfig};
use crate::streams::{PosthogEntity, PosthogStream};
use airsync_core::config::{parse_datetime, require_str};
use airsync_core::protocol::ConnectorSpecification;
use airsync_core::{
    ConnectionCheck, Error, HttpClient, Result, RetryPolicy, Source, Stream, SyncMode,
    TokenAuthenticator,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// PostHog product analytics source.
#[derive(Debug, Clone, Default)]
pub struct SourcePosthog {
    retry: RetryPolicy,
}

impl SourcePosthog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn http_client(&self) -> Result<HttpClient> {
        Ok(HttpClient::new()?.with_retry_policy(self.retry.clone()))
    }

    /// The streams this source exposes for `config`, in catalog order.
    ///
    /// `events_sessions` is deliberately absent: it reports sessions live at
    /// request time and cannot be replayed or synced incrementally.
    pub fn declarations(&self, config: &Value) -> Result<Vec<PosthogStream>> {
        let config = PosthogConfig::from_json(config)?;
        let authenticator = Arc::new(TokenAuthenticator::new(&config.api_key));
        let client = self.http_client()?;

        let declare = |entity| {
            PosthogStream::new(
                entity,
                Arc::clone(&authenticator),
                &config.base_url,
                client.clone(),
            )
        };

        Ok(vec![
            declare(PosthogEntity::Annotations).with_start_date(&config.start_date),
            declare(PosthogEntity::Cohorts),
            declare(PosthogEntity::Events).with_start_date(&config.start_date),
            declare(PosthogEntity::FeatureFlags),
            declare(PosthogEntity::Insights),
            declare(PosthogEntity::InsightsPath),
            declare(PosthogEntity::InsightsSessions),
            declare(PosthogEntity::Persons),
            declare(PosthogEntity::Trends),
        ])
    }

    /// Reads the first record of `users/@me`.
    async fn try_connect(&self, config: &Value) -> Result<()> {
        parse_datetime(require_str(config, "start_date")?)?;
        let config = PosthogConfig::from_json(config)?;

        let ping = PosthogStream::new(
            PosthogEntity::PingMe,
            Arc::new(TokenAuthenticator::new(&config.api_key)),
            &config.base_url,
            self.http_client()?,
        );
        let mut records = ping.read_records(SyncMode::FullRefresh, None);
        match records.next().await {
            Some(record) => record.map(|_| ()),
            None => Err(Error::Protocol("users/@me returned no record".to_string())),
        }
    }
}

#[async_trait]
impl Source for SourcePosthog {
    fn name(&self) -> &str {
        "posthog"
    }

    fn spec(&self) -> Result<ConnectorSpecification> {
        config::spec()
    }

    async fn check_connection(&self, config: &Value) -> ConnectionCheck {
        match self.try_connect(config).await {
            Ok(()) => {
                info!("PostHog connection succeeded");
                ConnectionCheck::Succeeded
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "PostHog rejected the api_key");
                ConnectionCheck::failed(format!("Please check your api_key. Error: {}", e))
            }
            Err(e) => {
                warn!(error = %e, "PostHog connection failed");
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
