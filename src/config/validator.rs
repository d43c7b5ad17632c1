//! Config validation: entity and collection names must be safe path segments and table names.

use crate::error::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

static ENTITY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,62}$").expect("entity name regex compiles")
});

/// Path segments the HTTP surface already uses under the API prefix.
const RESERVED_NAMES: &[&str] = &["models"];

pub fn validate_entity_name(name: &str) -> Result<(), ConfigError> {
    if !ENTITY_NAME.is_match(name) || RESERVED_NAMES.contains(&name) {
        return Err(ConfigError::InvalidEntityName(name.to_string()));
    }
    Ok(())
}

/// Storage collection for an entity: the override when given, else the entity name.
/// Lower-cased, `-` folded to `_`.
pub fn collection_name(entity: &str, override_name: Option<&str>) -> Result<String, ConfigError> {
    let raw = override_name.unwrap_or(entity);
    if !ENTITY_NAME.is_match(raw) {
        return Err(ConfigError::Invalid(format!("invalid collection name '{}'", raw)));
    }
    Ok(raw.to_lowercase().replace('-', "_"))
}
