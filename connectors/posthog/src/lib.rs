//! PostHog source: product analytics entities read over the PostHog REST API.

mod config;
mod source;
mod streams;

pub use config::{spec, PosthogConfig, DEFAULT_BASE_URL};
pub use source::SourcePosthog;
pub use streams::{PosthogEntity, PosthogStream};
