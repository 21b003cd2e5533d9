//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, DeliveryMode, OverflowPolicy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    source_addr: String,
    source_key: String,
    dequeue_timeout_ms: u64,
    sink_count: usize,
    sinks: Vec<SinkSummary>,
}

#[derive(Serialize)]
struct SinkSummary {
    name: String,
    addr: String,
    key: String,
    kind: String,
    mode: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(summarize(&config)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(config: &AppConfig) -> ConfigSummary {
    let sinks = config
        .sinks
        .iter()
        .enumerate()
        .map(|(idx, sink)| SinkSummary {
            name: sink.display_name(idx),
            addr: sink.endpoint.addr.clone(),
            key: sink.endpoint.key.clone(),
            kind: format!("{:?}", sink.kind).to_lowercase(),
            mode: format!("{:?}", sink.delivery.mode).to_lowercase(),
        })
        .collect::<Vec<_>>();

    ConfigSummary {
        source_addr: config.source.addr.clone(),
        source_key: config.source.key.clone(),
        dequeue_timeout_ms: config.dispatch.dequeue_timeout_ms,
        sink_count: sinks.len(),
        sinks,
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - dequeued items will be discarded".to_string());
    }

    for (idx, sink) in config.sinks.iter().enumerate() {
        let name = sink.display_name(idx);

        if sink.endpoint.addr == config.source.addr && sink.endpoint.key == config.source.key {
            warnings.push(format!(
                "Sink '{name}' writes to the source list - items will loop"
            ));
        }

        if sink.delivery.mode == DeliveryMode::Buffered
            && sink.delivery.overflow == OverflowPolicy::DropNewest
        {
            warnings.push(format!(
                "Sink '{name}' drops items when its buffer of {} is full",
                sink.delivery.capacity
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!(
                "\n  Source: {} (key '{}')",
                summary.source_addr, summary.source_key
            );
            println!("  Dequeue timeout: {}ms", summary.dequeue_timeout_ms);
            println!("  Sinks: {}", summary.sink_count);
            for sink in &summary.sinks {
                println!(
                    "    - {} -> {} (key '{}', {}, {})",
                    sink.name, sink.addr, sink.key, sink.kind, sink.mode
                );
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn args(path: PathBuf) -> ValidateArgs {
        ValidateArgs {
            config: path,
            json: true,
        }
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config(
            r#"{
                "source": { "addr": "127.0.0.1:6379", "password": "", "key": "q" },
                "sinks": [
                    { "addr": "127.0.0.1:6379", "password": "", "key": "q", "name": "loop" },
                    { "addr": "10.0.0.2:6379", "key": "out",
                      "delivery": { "mode": "buffered", "capacity": 16, "overflow": "drop_newest" } }
                ]
            }"#,
        );

        let result = validate_config(&args(file.path().to_path_buf()));
        assert!(result.valid, "error: {:?}", result.error);

        let summary = result.summary.unwrap();
        assert_eq!(summary.sink_count, 2);
        assert_eq!(summary.sinks[1].name, "sink-1");
        assert_eq!(summary.sinks[1].mode, "buffered");
        assert_eq!(result.warnings.map(|w| w.len()), Some(2));
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let file = write_config(r#"{ "source": { "addr": "", "key": "q" } }"#);

        let result = validate_config(&args(file.path().to_path_buf()));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("source.addr"));
        assert!(run_validate(&args(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&args(PathBuf::from("/nonexistent/config.json")));
        assert!(!result.valid);
        assert!(result.error.unwrap().starts_with("File not found"));
    }
}
