//! Named policy table with atomic replacement on configuration change

use super::policy::Policy;
use crate::config::schema::FilterConfig;
use crate::error::{ConfigError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lookup seam between the decision engine and whatever holds the policies
pub trait PolicyProvider {
    /// Policy with the given name, if configured
    fn policy(&self, name: &str) -> Option<Arc<Policy>>;

    /// The global policy, or `None` when the global policy feature is off
    fn global_policy(&self) -> Option<Arc<Policy>>;
}

/// One consistent set of policies
#[derive(Debug, Default)]
pub struct PolicyTable {
    policies: HashMap<String, Arc<Policy>>,
    global: Option<Arc<Policy>>,
}

impl PolicyTable {
    /// Build a complete table from configuration
    ///
    /// Fails on the first malformed entry, or when the global policy is
    /// enabled but its name does not resolve.
    pub fn build(config: &FilterConfig) -> Result<Self> {
        let mut policies = HashMap::with_capacity(config.policies.len());
        for definition in &config.policies {
            let policy = Arc::new(Policy::new(definition)?);
            if policies
                .insert(definition.name.clone(), policy)
                .is_some()
            {
                warn!(
                    policy = %definition.name,
                    "Duplicate policy name, later definition replaces the earlier one"
                );
            }
        }

        let global = if config.enable_global_policy {
            let policy = policies.get(&config.global_policy_name).cloned().ok_or_else(|| {
                ConfigError::GlobalPolicyNotFound {
                    name: config.global_policy_name.clone(),
                }
            })?;
            Some(policy)
        } else {
            None
        };

        Ok(Self { policies, global })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}

impl PolicyProvider for PolicyTable {
    fn policy(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    fn global_policy(&self) -> Option<Arc<Policy>> {
        self.global.clone()
    }
}

/// Holds the current [`PolicyTable`] and swaps it wholesale on reload
///
/// Readers take a snapshot (`Arc` clone under a briefly held read lock) and
/// keep using it for as long as they like; a reload never mutates a table
/// that has been published. Lookups go through the snapshot, never the store,
/// so one evaluation cannot see two different tables.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicyTable>>,
    generation: AtomicU64,
}

impl PolicyStore {
    /// Create a store from the initial configuration
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let table = PolicyTable::build(config)?;
        info!(
            policies = table.len(),
            global = config.enable_global_policy,
            "Loaded IP filter policies"
        );
        Ok(Self {
            current: RwLock::new(Arc::new(table)),
            generation: AtomicU64::new(1),
        })
    }

    /// The table in force right now
    pub fn snapshot(&self) -> Arc<PolicyTable> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Rebuild from new configuration and publish it
    ///
    /// On error nothing is published and the previous table stays in force.
    pub fn reload(&self, config: &FilterConfig) -> Result<()> {
        let table = Arc::new(PolicyTable::build(config)?);
        let policies = table.len();

        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *guard = table;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        info!(policies, generation, "Reloaded IP filter policies");
        Ok(())
    }

    /// Number of tables published so far, the initial one included
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Apply every configuration published on `changes` until its sender is dropped
    ///
    /// A configuration that fails to build is logged and skipped.
    pub fn watch(self: Arc<Self>, mut changes: watch::Receiver<FilterConfig>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let config = changes.borrow_and_update().clone();
                if let Err(e) = self.reload(&config) {
                    error!(error = %e, "Rejected IP filter policy reload, keeping previous policies");
                }
            }
            debug!("Policy change channel closed");
        })
    }
}
