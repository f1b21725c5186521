use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
            message: format!("Failed to compile JSON schema: {}", e),
        })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    check_unit_interval("scoring.floor", config.scoring.floor)?;
    check_unit_interval("review.review_threshold", config.review.review_threshold)?;
    check_unit_interval(
        "review.auto_accept_threshold",
        config.review.auto_accept_threshold,
    )?;
    check_unit_interval(
        "scoring.cross_field_penalty",
        config.scoring.cross_field_penalty,
    )?;
    check_unit_interval("scoring.cross_field_bonus", config.scoring.cross_field_bonus)?;

    for (field, weight) in [
        ("scoring.region_weight", config.scoring.region_weight),
        ("scoring.recognizer_weight", config.scoring.recognizer_weight),
    ] {
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
    }

    if config.worker_count == 0 {
        return Err(ConfigError::InvalidValue {
            field: "worker_count".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.queue.max_retries == 0 {
        return Err(ConfigError::InvalidValue {
            field: "queue.max_retries".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn check_unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must lie in [0, 1], got {}", value),
        });
    }
    Ok(())
}
