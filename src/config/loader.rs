//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment override {name}: {reason}")]
    Env { name: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, applying environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides.
pub fn config_from_env() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `PORT` and `<SERVICE>_SERVICE_URL` from the process environment.
pub fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            name: "PORT".to_string(),
            reason: format!("'{}' is not a port number", port),
        })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    for service in &mut config.services {
        let name = service_url_var(&service.name);
        if let Some(url) = lookup(&name) {
            tracing::debug!(service = %service.name, variable = %name, "Service URL overridden from environment");
            service.url = url;
        }
    }

    Ok(())
}

/// `user` → `USER_SERVICE_URL`, `score-board` → `SCORE_BOARD_SERVICE_URL`.
fn service_url_var(service: &str) -> String {
    let upper: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_SERVICE_URL", upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_service_url_var() {
        assert_eq!(service_url_var("user"), "USER_SERVICE_URL");
        assert_eq!(service_url_var("score-board"), "SCORE_BOARD_SERVICE_URL");
    }

    #[test]
    fn test_overrides_port_and_urls() {
        let mut config = GatewayConfig::default();
        apply_overrides(
            &mut config,
            lookup(&[
                ("PORT", "9999"),
                ("COMPETITION_SERVICE_URL", "http://127.0.0.1:7001"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:9999");
        assert_eq!(config.services[1].url, "http://127.0.0.1:7001");
        assert_eq!(config.services[0].url, "http://user_management_service:5000");
    }

    #[test]
    fn test_rejects_bad_port() {
        let mut config = GatewayConfig::default();
        let err = apply_overrides(&mut config, lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref name, .. } if name == "PORT"));
    }

    #[test]
    fn test_load_config_reports_validation_errors() {
        let path = std::env::temp_dir().join(format!("gateway-config-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[breaker]\nerror_threshold_percentage = 150\n").unwrap();

        let err = load_config(&path).unwrap_err();
        let _ = fs::remove_file(&path);

        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.contains(&ValidationError::ThresholdPercentage(150)));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }
}
