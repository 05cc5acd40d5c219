//! Store configuration validation
//!
//! Runs once, before any pool is built. Normalizes the configurations in
//! place (generated names, forced default on a single entry) and returns the
//! name of the default configuration.

use std::collections::HashSet;

use crate::config::StoreConfiguration;
use crate::error::ConfigurationError;

/// Validate and normalize a set of store configurations.
///
/// - an empty set is rejected
/// - a single configuration always becomes the default
/// - otherwise names must be unique and exactly one entry must be the default
///
/// Empty names are replaced by a random UUID in every case.
pub fn validate_configurations(
    configurations: &mut [StoreConfiguration],
) -> Result<String, ConfigurationError> {
    match configurations {
        [] => Err(ConfigurationError::Empty),

        [single] => {
            single.is_default = true;
            Ok(ensure_name(single).to_string())
        }

        many => {
            let mut names = HashSet::with_capacity(many.len());
            let mut default_name: Option<String> = None;

            for configuration in many.iter_mut() {
                let name = ensure_name(configuration).to_string();

                if !names.insert(name.clone()) {
                    return Err(ConfigurationError::DuplicateName(name));
                }

                if configuration.is_default {
                    if let Some(first) = &default_name {
                        return Err(ConfigurationError::MultipleDefaults {
                            first: first.clone(),
                            second: name,
                        });
                    }
                    default_name = Some(name);
                }
            }

            default_name.ok_or(ConfigurationError::NoDefault)
        }
    }
}

fn ensure_name(configuration: &mut StoreConfiguration) -> &str {
    if configuration.name.is_empty() {
        configuration.name = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            name = %configuration.name,
            endpoint = %configuration.endpoint.address(),
            "Assigned generated name to unnamed store configuration"
        );
    }
    &configuration.name
}
