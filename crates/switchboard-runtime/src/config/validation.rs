//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DispatchConfig, LogOutput, LoggingConfig, ServerConfig, SwitchboardConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_server_config(&config.server)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates server settings.
fn validate_server_config(config: &ServerConfig) -> ConfigResult<()> {
    if config.host.is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }

    if config.port == 0 {
        return Err(ConfigError::InvalidPort(config.port));
    }

    if !config.path.starts_with('/') {
        return Err(ConfigError::validation("Path must start with '/'"));
    }

    if config.outbound_buffer == 0 {
        return Err(ConfigError::validation(
            "Outbound buffer must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates dispatch settings.
fn validate_dispatch_config(config: &DispatchConfig) -> ConfigResult<()> {
    if config.route_field.trim().is_empty() {
        return Err(ConfigError::missing_field("dispatch.route_field"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = SwitchboardConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = SwitchboardConfig::default();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_validate_relative_path() {
        let mut config = SwitchboardConfig::default();
        config.server.path = "ws".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_route_field() {
        let mut config = SwitchboardConfig::default();
        config.dispatch.route_field = " ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_zero_buffer() {
        let mut config = SwitchboardConfig::default();
        config.server.outbound_buffer = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = SwitchboardConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("switchboard.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
