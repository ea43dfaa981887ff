use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.scheduler.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "scheduler.poll_interval_secs must be greater than zero".to_string(),
        });
    }
    if config.scheduler.max_concurrent == 0 {
        return Err(ConfigError::Validation {
            message: "scheduler.max_concurrent must be greater than zero".to_string(),
        });
    }
    if config.chunking.max_chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "chunking.max_chunk_size must be greater than zero".to_string(),
        });
    }
    if config.generation.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "generation.max_attempts must be at least 1".to_string(),
        });
    }

    let quality = &config.quality;
    for (category, threshold) in quality.thresholds.iter() {
        if threshold > 100 {
            return Err(ConfigError::Validation {
                message: format!("Threshold for '{}' exceeds 100: {}", category, threshold),
            });
        }
    }
    for (category, weight) in quality.weights.iter() {
        if !(0.0..=1.0).contains(&weight) {
            return Err(ConfigError::Validation {
                message: format!("Weight for '{}' must be within 0..=1: {}", category, weight),
            });
        }
    }
    let weight_sum = quality.weights.sum();
    if (weight_sum - 1.0).abs() > 0.001 {
        return Err(ConfigError::Validation {
            message: format!("Category weights must sum to 1.0, got {:.3}", weight_sum),
        });
    }

    let lexicon = &quality.lexicon;
    let pattern_lists = [
        ("law_citation_patterns", &lexicon.law_citation_patterns),
        ("precedent_patterns", &lexicon.precedent_patterns),
        ("placeholder_patterns", &lexicon.placeholder_patterns),
    ];
    for (name, patterns) in pattern_lists {
        for pattern in patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidPattern {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if config.postprocess.title_max_length == 0 {
        return Err(ConfigError::Validation {
            message: "postprocess.title_max_length must be greater than zero".to_string(),
        });
    }

    let links = &config.postprocess.links;
    if let Some(link) = links.internal.iter().find(|l| l.term.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: format!("postprocess.links.internal has an empty term for '{}'", link.path),
        });
    }
    for link in &links.external {
        if let Err(e) = regex::Regex::new(&link.pattern) {
            return Err(ConfigError::InvalidPattern {
                name: "postprocess.links.external".to_string(),
                reason: e.to_string(),
            });
        }
    }

    Ok(())
}
