//! Config validation
//!
//! Rules:
//! - source addr and key are set
//! - every sink has an addr, and a key when it pushes to redis
//! - sink names are unique
//! - buffered sinks have a non-zero capacity
//! - dequeue timeout > 0
//! - backoff range is sane

use std::collections::HashSet;

use contracts::{AppConfig, ContractError, DeliveryMode, SinkKind};

/// Validate an `AppConfig`
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_source(config)?;
    validate_sinks(config)?;
    validate_sink_names(config)?;
    validate_dispatch(config)?;
    validate_retry(config)?;
    Ok(())
}

fn validate_source(config: &AppConfig) -> Result<(), ContractError> {
    if config.source.addr.trim().is_empty() {
        return Err(ContractError::config_validation(
            "source.addr",
            "source addr cannot be empty",
        ));
    }
    if config.source.key.trim().is_empty() {
        return Err(ContractError::config_validation(
            "source.key",
            "source key cannot be empty",
        ));
    }
    Ok(())
}

fn validate_sinks(config: &AppConfig) -> Result<(), ContractError> {
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.endpoint.addr.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].addr"),
                "sink addr cannot be empty",
            ));
        }
        if sink.kind == SinkKind::Redis && sink.endpoint.key.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].key"),
                "redis sink key cannot be empty",
            ));
        }
        if sink.delivery.mode == DeliveryMode::Buffered && sink.delivery.capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].delivery.capacity"),
                "buffered delivery needs capacity > 0",
            ));
        }
        if sink.delivery.timeout_ms == Some(0) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].delivery.timeout_ms"),
                "timeout_ms must be > 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_sink_names(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, name) in config.sink_names().into_iter().enumerate() {
        if !seen.insert(name.clone()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{name}'"),
            ));
        }
    }
    Ok(())
}

fn validate_dispatch(config: &AppConfig) -> Result<(), ContractError> {
    if config.dispatch.dequeue_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "dispatch.dequeue_timeout_ms",
            "dequeue_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_retry(config: &AppConfig) -> Result<(), ContractError> {
    let retry = &config.retry;
    if retry.multiplier < 1.0 || !retry.multiplier.is_finite() {
        return Err(ContractError::config_validation(
            "retry.multiplier",
            format!("multiplier must be >= 1.0, got {}", retry.multiplier),
        ));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(ContractError::config_validation(
            "retry.initial_delay_ms / retry.max_delay_ms",
            format!(
                "initial_delay_ms ({}) must be <= max_delay_ms ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            ),
        ));
    }
    Ok(())
}
