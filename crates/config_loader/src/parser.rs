//! Config parsing
//!
//! JSON (primary) and TOML.

use contracts::{AppConfig, ContractError};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON (reference format)
    Json,
    /// TOML
    Toml,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Parse JSON config
pub fn parse_json(content: &str) -> Result<AppConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse TOML config
pub fn parse_toml(content: &str) -> Result<AppConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse by format
pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
    match format {
        ConfigFormat::Json => parse_json(content),
        ConfigFormat::Toml => parse_toml(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_reference_shape() {
        let content = r#"{
            "source": { "addr": "127.0.0.1:6379", "password": "", "key": "q" },
            "sinks": [
                { "addr": "127.0.0.1:6379", "password": "", "key": "a" },
                { "addr": "127.0.0.1:6379", "password": "", "key": "b" }
            ]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.source.key, "q");
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[1].endpoint.key, "b");
    }

    #[test]
    fn test_parse_toml_with_tuning() {
        let content = r#"
[source]
addr = "127.0.0.1:6379"
key = "q"

[[sinks]]
addr = "127.0.0.1:6379"
key = "a"
name = "archive"
kind = "redis"

[sinks.delivery]
mode = "buffered"
capacity = 16

[dispatch]
dequeue_timeout_ms = 250

[retry]
max_retries = 3
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.dispatch.dequeue_timeout_ms, 250);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.sinks[0].display_name(0), "archive");
        assert_eq!(config.sinks[0].delivery.capacity, 16);
    }

    #[test]
    fn test_parse_json_syntax_error() {
        let result = parse_json("{ not json");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_missing_source_is_parse_error() {
        let result = parse_json(r#"{ "sinks": [] }"#);
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("JSON"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
