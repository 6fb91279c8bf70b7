//! Multi-source launcher: `airsync <source> <command> ...`.

pub mod cli;

use airsync_core::SourceRegistry;

/// Every source compiled into this build, keyed by name.
#[allow(unused_mut)]
pub fn registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    #[cfg(feature = "posthog")]
    registry.register("posthog", || {
        Box::new(airsync_posthog::SourcePosthog::new())
    });
    #[cfg(feature = "salesloft")]
    registry.register("salesloft", || {
        Box::new(airsync_salesloft::SourceSalesloft::new())
    });
    registry
}
