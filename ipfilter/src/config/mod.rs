//! Configuration loading, validation and change notification

pub mod loader;
pub mod schema;
pub mod validator;
pub mod watcher;

pub use loader::ConfigLoader;
pub use schema::{
    Config, FilterConfig, PolicyDefinition, PolicyMode, RouteConfig, POLICY_METADATA_KEY,
};
pub use validator::ConfigValidator;
pub use watcher::{ConfigWatcher, WatcherConfig};
