//! Configuration schema types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::level_filters::LevelFilter;

/// Route metadata key naming the route's IP filter policy
pub const POLICY_METADATA_KEY: &str = "IPFilterPolicy";

/// Complete configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    /// Routes by id; only their metadata is of interest here
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommonConfig {
    /// Debug logging, same as `--verbose` on the command line
    #[serde(default)]
    pub verbose: bool,
}

impl CommonConfig {
    /// Log level when either the file or the command line asks for verbosity
    pub fn log_level(&self, verbose_flag: bool) -> LevelFilter {
        if verbose_flag || self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Policy definitions plus the global policy switch
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Ordered; a later definition with a duplicate name replaces an earlier one
    #[serde(default)]
    pub policies: Vec<PolicyDefinition>,
    #[serde(default = "default_global_policy_name")]
    pub global_policy_name: String,
    /// Evaluate the global policy before any route policy
    #[serde(default)]
    pub enable_global_policy: bool,
}

fn default_global_policy_name() -> String {
    "Global".to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            global_policy_name: default_global_policy_name(),
            enable_global_policy: false,
        }
    }
}

/// Filtering mode of a policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// No filtering, every request is allowed
    Disabled,
    /// Only listed addresses and networks are allowed
    #[default]
    AllowList,
    /// Listed addresses and networks are blocked, everything else is allowed
    BlockList,
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyMode::Disabled => write!(f, "disabled"),
            PolicyMode::AllowList => write!(f, "allow_list"),
            PolicyMode::BlockList => write!(f, "block_list"),
        }
    }
}

/// A named policy as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyDefinition {
    #[serde(default = "default_policy_name", alias = "policy_name")]
    pub name: String,
    #[serde(default)]
    pub mode: PolicyMode,
    /// Exact addresses, e.g. "10.0.0.1" or "::1"
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Networks in "addr/prefix" form
    #[serde(default)]
    pub networks: Vec<String>,
    /// Reject requests whose source address could not be determined
    #[serde(default)]
    pub block_unknown_source: bool,
}

fn default_policy_name() -> String {
    "DefaultPolicy".to_string()
}

impl Default for PolicyDefinition {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            mode: PolicyMode::default(),
            addresses: Vec::new(),
            networks: Vec::new(),
            block_unknown_source: false,
        }
    }
}

impl PolicyDefinition {
    pub fn new(name: impl Into<String>, mode: PolicyMode) -> Self {
        Self {
            name: name.into(),
            mode,
            ..Default::default()
        }
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_networks<I, S>(mut self, networks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.networks = networks.into_iter().map(Into::into).collect();
        self
    }

    pub fn block_unknown_source(mut self, block: bool) -> Self {
        self.block_unknown_source = block;
        self
    }
}

/// Per-route settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RouteConfig {
    /// Policy declared on this route; an empty value counts as none
    pub fn policy_name(&self) -> Option<&str> {
        policy_name_from_metadata(&self.metadata)
    }
}

/// Look up the route policy name under [`POLICY_METADATA_KEY`]
pub fn policy_name_from_metadata(metadata: &HashMap<String, String>) -> Option<&str> {
    metadata
        .get(POLICY_METADATA_KEY)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}
