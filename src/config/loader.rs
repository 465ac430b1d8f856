//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{ElectionConfig, LoadBalancerConfig};
use crate::config::validation::{Validate, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Parse error: {0}")]
    Parse(toml::de::Error),

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

/// Load and validate configuration from a TOML file.
pub fn load_config<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config<T>(content: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let config: T = toml::from_str(content).map_err(ConfigError::Parse)?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load from `path` when given, otherwise validate the defaults.
pub fn load_or_default<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate + Default,
{
    load_with_overrides(path, |_| {})
}

/// Like `load_or_default`, with `overrides` applied before validation.
pub fn load_with_overrides<T, F>(path: Option<&Path>, overrides: F) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate + Default,
    F: FnOnce(&mut T),
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => T::default(),
    };
    overrides(&mut config);
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Override node identity from `RUNNER_PORT`, `NEIGHBOUR_PORT`, `MAX_NODES`
/// and `IS_LEADER`.
///
/// A variable that is present but unparsable clears the field, which puts
/// the node in degraded leader mode rather than failing startup.
pub fn apply_election_env<F>(config: &mut ElectionConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    override_from(&lookup, "RUNNER_PORT", &mut config.runner_port);
    override_from(&lookup, "NEIGHBOUR_PORT", &mut config.neighbour_port);
    override_from(&lookup, "MAX_NODES", &mut config.max_nodes);
    override_from(&lookup, "IS_LEADER", &mut config.is_leader);
}

/// Override the balanced service and container name from `SERVICE_NAME` and
/// `CONTAINER_NAME`.
pub fn apply_load_balancer_env<F>(config: &mut LoadBalancerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = lookup("SERVICE_NAME").filter(|v| !v.is_empty()) {
        config.service_name = name;
    }
    if let Some(name) = lookup("CONTAINER_NAME").filter(|v| !v.is_empty()) {
        config.container_name = name;
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut Option<T>)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = Some(value),
            Err(_) => {
                tracing::warn!(variable = key, value = %raw, "Ignoring unparsable environment override");
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OrchestratorConfig;
    use std::collections::HashMap;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: OrchestratorConfig = parse_config(
            r#"
            [election]
            runner_port = 3010
            neighbour_port = 3020
            max_nodes = 3
            is_leader = false

            [autoscale]
            lb_tick_secs = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.election.runner_port, Some(3010));
        assert_eq!(config.autoscale.lb_tick_secs, 1);
        assert_eq!(config.autoscale.evaluation_ticks, 5);
        assert_eq!(config.reconciler.min_lb_count, 2);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let result: Result<OrchestratorConfig, _> = parse_config(
            r#"
            [autoscale]
            lb_rate_lower = 90.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("RUNNER_PORT", "3020"),
            ("NEIGHBOUR_PORT", "not-a-port"),
            ("IS_LEADER", "true"),
        ]
        .into_iter()
        .collect();

        let mut election = ElectionConfig {
            neighbour_port: Some(3030),
            max_nodes: Some(3),
            ..ElectionConfig::default()
        };
        apply_election_env(&mut election, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(election.runner_port, Some(3020));
        assert_eq!(election.neighbour_port, None);
        assert_eq!(election.max_nodes, Some(3));
        assert_eq!(election.is_leader, Some(true));
    }

    #[test]
    fn test_overrides_apply_before_validation() {
        // the default load-balancer config has no service name
        assert!(load_or_default::<LoadBalancerConfig>(None).is_err());

        let config: LoadBalancerConfig = load_with_overrides(None, |config| {
            apply_load_balancer_env(config, |k| match k {
                "SERVICE_NAME" => Some("web".to_string()),
                "CONTAINER_NAME" => Some("lb-web-load-balancer-5001".to_string()),
                _ => None,
            })
        })
        .unwrap();
        assert_eq!(config.service_name, "web");
        assert_eq!(config.container_name, "lb-web-load-balancer-5001");
    }

    fn load_node(runner_port: &str) -> Result<OrchestratorConfig, ConfigError> {
        let config: OrchestratorConfig = load_with_overrides(None, |config: &mut OrchestratorConfig| {
            apply_election_env(&mut config.election, |k| {
                (k == "RUNNER_PORT").then(|| runner_port.to_string())
            })
        })?;
        Ok(config)
    }

    #[test]
    fn test_node_overrides_through_question_mark() {
        let config = load_node("3030").unwrap();
        assert_eq!(config.election.runner_port, Some(3030));
    }

    #[test]
    fn test_validation_error_lists_every_field() {
        let result: Result<OrchestratorConfig, _> = parse_config(
            r#"
            [reconciler]
            min_lb_count = 0

            [autoscale]
            lb_tick_secs = 0
            "#,
        );
        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("reconciler.min_lb_count"));
        assert!(message.contains("autoscale.lb_tick_secs"));
        assert!(message.contains(", "));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("fleet-config-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[reconciler]\nmin_lb_count = 3\n").unwrap();
        let config: OrchestratorConfig = load_config(&path).unwrap();
        assert_eq!(config.reconciler.min_lb_count, 3);
        fs::remove_file(&path).unwrap();

        let missing: Result<OrchestratorConfig, _> = load_config(&path);
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
