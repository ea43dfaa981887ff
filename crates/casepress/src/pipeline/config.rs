use std::time::Duration;

use crate::config::{Config, LeakPolicy};

/// Settings the item pipeline needs outside of draft generation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_chunk_size: usize,
    /// Attempt bound for de-identify and analyze calls.
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub leak_policy: LeakPolicy,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chunk_size: config.chunking.max_chunk_size,
            max_attempts: config.generation.max_attempts.max(1),
            call_timeout: config.generation.call_timeout(),
            leak_policy: config.privacy.leak_policy,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
