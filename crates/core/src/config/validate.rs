use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Lock TTL and sweep interval are not 0
/// - Ingestion queue size, batch size and interval are not 0
/// - Size limits form a non-empty range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Lock validation
    if config.lock.default_ttl_secs == 0 {
        return Err(invalid("lock.default_ttl_secs cannot be 0"));
    }
    if config.lock.sweep_interval_secs == 0 {
        return Err(invalid("lock.sweep_interval_secs cannot be 0"));
    }

    if config.orchestrator.agent_id.trim().is_empty() {
        return Err(invalid("orchestrator.agent_id cannot be empty"));
    }

    // Ingestion validation
    let ingestion = &config.ingestion;
    if ingestion.max_queue_size == 0 {
        return Err(invalid("ingestion.max_queue_size cannot be 0"));
    }
    if ingestion.batch_size == 0 {
        return Err(invalid("ingestion.batch_size cannot be 0"));
    }
    if ingestion.interval_seconds == 0 {
        return Err(invalid("ingestion.interval_seconds cannot be 0"));
    }
    if ingestion.min_file_size_bytes > ingestion.max_file_size_bytes() {
        return Err(ConfigError::ValidationError(format!(
            "ingestion.min_file_size_bytes ({}) exceeds max_file_size_mb ({} MB)",
            ingestion.min_file_size_bytes, ingestion.max_file_size_mb
        )));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_values_fail() {
        let cases: Vec<fn(&mut Config)> = vec![
            |c| c.lock.default_ttl_secs = 0,
            |c| c.lock.sweep_interval_secs = 0,
            |c| c.orchestrator.agent_id = " ".to_string(),
            |c| c.ingestion.max_queue_size = 0,
            |c| c.ingestion.batch_size = 0,
            |c| c.ingestion.interval_seconds = 0,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(validate_config(&config).is_err());
        }
    }

    #[test]
    fn test_validate_size_range() {
        let mut config = Config::default();
        config.ingestion.max_file_size_mb = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("min_file_size_bytes"));
    }
}
