//! Process settings read from the environment (after `.env`, if present).

use std::time::Duration;

pub const DEFAULT_REMOTE_CONFIG_URL: &str = "https://api.jsonbin.io/v3/b/693a9bbad0ea881f4021b07d";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_STORE_SCHEMA: &str = "dynacrud";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// `postgres://...` or `memory://`. Unset means the store must be connected by the caller.
    pub database_url: Option<String>,
    pub remote_config_url: String,
    /// Connect the store on first load when it is not connected yet.
    pub auto_connect: bool,
    pub bind_addr: String,
    pub api_prefix: String,
    /// PostgreSQL schema holding the collection tables.
    pub store_schema: String,
    pub config_fetch_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            remote_config_url: DEFAULT_REMOTE_CONFIG_URL.into(),
            auto_connect: true,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            api_prefix: DEFAULT_API_PREFIX.into(),
            store_schema: DEFAULT_STORE_SCHEMA.into(),
            config_fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl Settings {
    /// Read `.env` then the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset; unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();
        Settings {
            database_url: get("DATABASE_URL"),
            remote_config_url: get("REMOTE_CONFIG_URL").unwrap_or(defaults.remote_config_url),
            auto_connect: get("AUTO_CONNECT")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(defaults.auto_connect),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            api_prefix: get("API_PREFIX")
                .map(|p| normalize_prefix(&p))
                .unwrap_or(defaults.api_prefix),
            store_schema: get("DYNACRUD_SCHEMA").unwrap_or(defaults.store_schema),
            config_fetch_timeout: get("CONFIG_FETCH_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.config_fetch_timeout),
            body_limit_bytes: get("BODY_LIMIT_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.body_limit_bytes),
        }
    }
}

/// Leading slash, no trailing slash. `/` and empty mean "no prefix" and become `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(settings(&[]), Settings::default());
        assert_eq!(settings(&[("DATABASE_URL", "  ")]).database_url, None);
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            ("DATABASE_URL", "memory://"),
            ("AUTO_CONNECT", "false"),
            ("API_PREFIX", "v1/"),
            ("CONFIG_FETCH_TIMEOUT_SECS", "5"),
            ("BODY_LIMIT_BYTES", "nope"),
        ]);
        assert_eq!(s.database_url.as_deref(), Some("memory://"));
        assert!(!s.auto_connect);
        assert_eq!(s.api_prefix, "/v1");
        assert_eq!(s.config_fetch_timeout, Duration::from_secs(5));
        assert_eq!(s.body_limit_bytes, DEFAULT_BODY_LIMIT_BYTES);
    }

    #[test]
    fn root_prefix_means_no_prefix() {
        assert_eq!(settings(&[("API_PREFIX", "/")]).api_prefix, "");
    }
}
