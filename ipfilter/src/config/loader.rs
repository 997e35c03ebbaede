//! Configuration file loading

use super::schema::Config;
use crate::error::{ConfigError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        // Priority order:
        // 1. $IPFILTER_CONFIG
        // 2. $XDG_CONFIG_HOME/ipfilter/config.toml
        // 3. ~/.config/ipfilter/config.toml

        if let Ok(path) = env::var("IPFILTER_CONFIG") {
            return PathBuf::from(path);
        }

        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("ipfilter/config.toml");
        }

        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(".config/ipfilter/config.toml");
        }

        PathBuf::from("config.toml")
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load config from an explicit path, else the default path, else defaults
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Config> {
        if let Some(p) = path {
            return Self::load_from_file(p);
        }

        let path = Self::default_config_path();
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PolicyMode;
    use crate::error::FilterError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[common]
verbose = true

[filter]
enable_global_policy = true
global_policy_name = "Edge"

[[filter.policies]]
name = "Edge"
mode = "block_list"
networks = ["192.0.2.0/24"]

[[filter.policies]]
policy_name = "Office"
addresses = ["10.0.0.1", "::1"]
networks = ["10.1.0.0/16"]
block_unknown_source = true

[routes.api.metadata]
IPFilterPolicy = "Office"

[routes.public]
"#;

    #[test]
    fn test_parse_toml() {
        let config = ConfigLoader::load_from_str(SAMPLE).unwrap();

        assert!(config.common.verbose);
        assert!(config.filter.enable_global_policy);
        assert_eq!(config.filter.global_policy_name, "Edge");
        assert_eq!(config.filter.policies.len(), 2);

        let office = &config.filter.policies[1];
        assert_eq!(office.name, "Office");
        assert_eq!(office.mode, PolicyMode::AllowList);
        assert!(office.block_unknown_source);

        assert_eq!(config.routes["api"].policy_name(), Some("Office"));
        assert_eq!(config.routes["public"].policy_name(), None);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = ConfigLoader::load_from_str("").unwrap();
        assert!(config.filter.policies.is_empty());
        assert!(!config.filter.enable_global_policy);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = ConfigLoader::load_from_str(
            r#"
[[filter.policies]]
name = "Bad"
mode = "sometimes"
"#,
        );
        assert!(matches!(
            result,
            Err(FilterError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.filter.policies[0].name, "Edge");

        let config = ConfigLoader::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.routes.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_from_file("/nonexistent/ipfilter.toml");
        assert!(matches!(
            result,
            Err(FilterError::Config(ConfigError::Load { .. }))
        ));
    }
}
