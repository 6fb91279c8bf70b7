pub mod auth;
pub mod config;
pub mod connector;
pub mod entrypoint;
pub mod error;
pub mod http;
pub mod job;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod stream;

pub use auth::{Authenticator, Oauth2Authenticator, TokenAuthenticator};
pub use connector::{ConnectionCheck, Source};
pub use error::{Error, Result};
pub use http::{HttpClient, HttpStream, RetryPolicy};
pub use job::ReadJob;
pub use protocol::SyncMode;
pub use registry::SourceRegistry;
pub use stream::{RecordStream, Stream};
