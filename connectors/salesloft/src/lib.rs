//! Salesloft source: sales engagement entities from the Salesloft v2 REST API.

mod config;
mod source;
mod streams;

pub use config::{spec, SalesloftConfig, SalesloftCredentials, API_BASE_URL, TOKEN_ENDPOINT};
pub use source::SourceSalesloft;
pub use streams::{SalesloftEntity, SalesloftStream};
