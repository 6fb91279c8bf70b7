use crate::{
    connector::Source,
    error::{Error, Result},
};
use std::collections::BTreeMap;

type SourceFactory = Box<dyn Fn() -> Box<dyn Source> + Send + Sync>;

/// Named source constructors, so one binary can host several connectors.
pub struct SourceRegistry {
    sources: BTreeMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        self.sources.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Source>> {
        let factory = self.sources.get(name).ok_or_else(|| {
            Error::Other(format!(
                "Unknown source: {} (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        Ok(factory())
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
