//! Error types for policy loading and request evaluation

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A route declares a policy that the current table does not contain
    #[error("Could not find IP filter policy with name {policy}. Route: {route}")]
    PolicyNotFound { policy: String, route: String },
}

impl FilterError {
    /// HTTP status the host should answer with when this error ends a request
    pub fn status_code(&self) -> u16 {
        500
    }

    /// Whether this error came from (re)loading configuration
    pub fn is_config_error(&self) -> bool {
        matches!(self, FilterError::Config(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid IP address {value:?} in policy {policy}")]
    InvalidAddress { policy: String, value: String },

    #[error("Invalid IP network {value:?} in policy {policy} (expected addr/prefix)")]
    InvalidNetwork { policy: String, value: String },

    #[error(
        "Could not find global policy {name}. Double check configuration or disable the global policy feature"
    )]
    GlobalPolicyNotFound { name: String },

    #[error("Route {route} references unknown policy {policy}")]
    UnknownRoutePolicy { route: String, policy: String },

    #[error("Failed to load config from {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_not_found_message() {
        let err = FilterError::PolicyNotFound {
            policy: "Ghost".to_string(),
            route: "api".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not find IP filter policy with name Ghost. Route: api"
        );
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_config_error_wraps() {
        let err: FilterError = ConfigError::GlobalPolicyNotFound {
            name: "Global".to_string(),
        }
        .into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("Could not find global policy Global"));
    }
}
