//! Configuration validation ahead of deployment

use super::schema::Config;
use crate::error::{ConfigError, Result};
use crate::filter::store::{PolicyProvider, PolicyTable};

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate entire configuration
    ///
    /// Builds the policy table as a dry run, then checks that every policy a
    /// route declares exists. At request time a dangling route policy is a
    /// server error; here it is caught before it ships.
    pub fn validate(config: &Config) -> Result<PolicyTable> {
        let table = PolicyTable::build(&config.filter)?;
        Self::validate_route_references(config, &table)?;
        Ok(table)
    }

    fn validate_route_references(config: &Config, table: &PolicyTable) -> Result<()> {
        let mut routes: Vec<_> = config.routes.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));

        for (route, route_config) in routes {
            if let Some(policy) = route_config.policy_name() {
                if table.policy(policy).is_none() {
                    return Err(ConfigError::UnknownRoutePolicy {
                        route: route.clone(),
                        policy: policy.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}
