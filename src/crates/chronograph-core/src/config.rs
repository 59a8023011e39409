//! Engine configuration
//!
//! [`EngineConfig`] carries the execution knobs of a compiled graph. It can be
//! built in code, deserialized from YAML, or read from environment variables:
//!
//! | Variable (default prefix `CHRONOGRAPH_`) | Field |
//! |---|---|
//! | `RECURSION_LIMIT` | `recursion_limit` |
//! | `MAX_CONCURRENCY` | `max_concurrency` |
//! | `STREAM_BUFFER` | `stream_buffer` |
//! | `INTERRUPT_BEFORE` | `interrupt.interrupt_before` (comma separated, `*` for all) |
//! | `INTERRUPT_AFTER` | `interrupt.interrupt_after` (comma separated, `*` for all) |
//!
//! ```rust
//! use chronograph_core::EngineConfig;
//!
//! let config = EngineConfig::from_yaml_str(
//!     "recursion_limit: 10\ninterrupt:\n  interrupt_before: [action]\n",
//! ).unwrap();
//! assert_eq!(config.recursion_limit, 10);
//! assert!(config.interrupt.should_interrupt_before("action"));
//! ```

use crate::error::{GraphError, Result};
use crate::interrupt::InterruptConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

pub const DEFAULT_ENV_PREFIX: &str = "CHRONOGRAPH_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum supersteps per invocation
    pub recursion_limit: usize,

    /// Maximum nodes running at once within a superstep
    pub max_concurrency: usize,

    /// Capacity of the bounded channel behind `stream`
    pub stream_buffer: usize,

    pub interrupt: InterruptConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 25,
            max_concurrency: 16,
            stream_buffer: 100,
            interrupt: InterruptConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    pub fn with_interrupts(mut self, interrupt: InterruptConfig) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            return Err(GraphError::Configuration(
                "recursion_limit must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(GraphError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(GraphError::Configuration(
                "stream_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `{prefix}*` variables that are set
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Some(limit) = get_env_parse(&build_env_key(prefix, "recursion_limit"))? {
            config.recursion_limit = limit;
        }
        if let Some(max) = get_env_parse(&build_env_key(prefix, "max_concurrency"))? {
            config.max_concurrency = max;
        }
        if let Some(capacity) = get_env_parse(&build_env_key(prefix, "stream_buffer"))? {
            config.stream_buffer = capacity;
        }
        if let Some(list) = get_env(&build_env_key(prefix, "interrupt_before"))? {
            let (all, nodes) = parse_node_list(&list);
            config.interrupt.interrupt_before_all = all;
            config.interrupt.interrupt_before = nodes;
        }
        if let Some(list) = get_env(&build_env_key(prefix, "interrupt_after"))? {
            let (all, nodes) = parse_node_list(&list);
            config.interrupt.interrupt_after_all = all;
            config.interrupt.interrupt_after = nodes;
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(GraphError::Configuration(format!(
            "Environment variable {key} contains invalid UTF-8"
        ))),
    }
}

fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| {
            GraphError::Configuration(format!("Failed to parse environment variable {key}: {e}"))
        }),
        None => Ok(None),
    }
}

fn parse_node_list(list: &str) -> (bool, Vec<String>) {
    let nodes: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let all = nodes.iter().any(|n| n == "*");
    (all, nodes.into_iter().filter(|n| n != "*").collect())
}
