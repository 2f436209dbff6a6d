use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use todo_store::{CreateTodo, MemoryStore, Priority, StoreError};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:4280";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_seed")]
    pub seed: Vec<SeedTodo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedTodo {
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_event_capacity() -> usize {
    MemoryStore::DEFAULT_EVENT_CAPACITY
}

fn default_seed() -> Vec<SeedTodo> {
    vec![SeedTodo {
        title: "Learn Rust".into(),
        priority: Priority::High,
    }]
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            event_capacity: default_event_capacity(),
            seed: default_seed(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        for (index, seed) in self.seed.iter().enumerate() {
            if seed.title.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("seed[{index}]: title is required")));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("listen {:?}: {err}", self.listen)))
    }

    /// Build the authoritative table, optionally pre-populated with `seed`.
    pub fn build_store(&self, seeded: bool) -> Result<MemoryStore, StoreError> {
        let store = MemoryStore::with_event_capacity(self.event_capacity);
        if seeded {
            let rows = self
                .seed
                .iter()
                .map(|seed| CreateTodo::new(seed.title.clone(), seed.priority));
            let inserted = store.seed(rows)?;
            log::debug!("seeded {inserted} todo(s)");
        }
        Ok(store)
    }
}
