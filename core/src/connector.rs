use crate::error::Result;
use crate::job::ReadJob;
use crate::protocol::{
    AirbyteCatalog, AirbyteConnectionStatus, ConfiguredAirbyteCatalog, ConnectorSpecification,
    Status,
};
use crate::stream::Stream;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;

/// Outcome of a pre-flight connection check. A failure always carries a
/// message for the operator; a success never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    Succeeded,
    Failed { message: String },
}

impl ConnectionCheck {
    pub fn failed(message: impl Into<String>) -> Self {
        ConnectionCheck::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConnectionCheck::Succeeded)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ConnectionCheck::Succeeded => None,
            ConnectionCheck::Failed { message } => Some(message),
        }
    }
}

impl From<ConnectionCheck> for AirbyteConnectionStatus {
    fn from(check: ConnectionCheck) -> Self {
        match check {
            ConnectionCheck::Succeeded => AirbyteConnectionStatus {
                status: Status::Succeeded,
                message: None,
            },
            ConnectionCheck::Failed { message } => AirbyteConnectionStatus {
                status: Status::Failed,
                message: Some(message),
            },
        }
    }
}

/// A connector that extracts records from a remote service.
///
/// Implementors provide the connection check and the stream list; discovery
/// and reading are derived from those.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> Result<ConnectorSpecification>;

    /// Never fails: every error is reported through `ConnectionCheck::Failed`.
    async fn check_connection(&self, config: &Value) -> ConnectionCheck;

    /// Builds the ordered stream list for `config`. Performs no I/O.
    fn streams(&self, config: &Value) -> Result<Vec<Box<dyn Stream>>>;

    fn discover(&self, config: &Value) -> Result<AirbyteCatalog> {
        let streams = self
            .streams(config)?
            .iter()
            .map(|stream| stream.as_airbyte_stream())
            .collect::<Result<Vec<_>>>()?;
        Ok(AirbyteCatalog { streams })
    }

    async fn read(
        &self,
        config: &Value,
        catalog: &ConfiguredAirbyteCatalog,
        state: Option<Value>,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        let streams = self.streams(config)?;
        let mut job = ReadJob::new(catalog.clone(), state);
        job.run(&streams, out).await
    }
}
