use std::fmt;

use serde::{Deserialize, Serialize};

pub const ENV_URI: &str = "NEO4J_URI";
pub const ENV_USER: &str = "NEO4J_USER";
pub const ENV_PASS: &str = "NEO4J_PASS";

/// Connection settings for the graph store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database; the server default when unset.
    pub database: Option<String>,
    /// Upper bound on concurrent sessions (and driver connections).
    pub max_sessions: usize,
    /// Rows pulled per round trip.
    pub fetch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: None,
            max_sessions: 16,
            fetch_size: 200,
        }
    }
}

impl StoreConfig {
    /// Apply `NEO4J_URI`, `NEO4J_USER` and `NEO4J_PASS` from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup(ENV_URI) {
            self.uri = uri;
        }
        if let Some(user) = lookup(ENV_USER) {
            self.user = user;
        }
        if let Some(password) = lookup(ENV_PASS) {
            self.password = password;
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_sessions", &self.max_sessions)
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides_file_values() {
        let mut config: StoreConfig =
            serde_json::from_str(r#"{"uri": "bolt://db:7687", "user": "reader"}"#).unwrap();
        let env = HashMap::from([(ENV_USER, "admin"), (ENV_PASS, "s3cret")]);
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.uri, "bolt://db:7687");
        assert_eq!(config.user, "admin");
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.max_sessions, 16);
    }

    #[test]
    fn debug_hides_the_password() {
        let config = StoreConfig {
            password: "s3cret".into(),
            ..StoreConfig::default()
        };
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
