//! IP-based access control for reverse proxy routes
//!
//! Each request is checked against an optional global policy and then the
//! policy its route declares. Policies are allow lists, block lists or
//! disabled, built from exact addresses and CIDR networks, and can be
//! replaced at runtime without disturbing evaluations in flight.

pub mod config;
pub mod error;
pub mod filter;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ConfigValidator, FilterConfig, PolicyDefinition, PolicyMode};
pub use error::{ConfigError, FilterError, Result};
pub use filter::{DecisionEngine, NetworkTrie, Policy, PolicyProvider, PolicyStore, Request, Verdict};
