//! Application configuration.
//!
//! Loaded from an optional JSON file; every field has a default. Store
//! credentials from the environment (`NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASS`,
//! also read from `.env`) take precedence over the file.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use phenograph_core::{CohortPermissions, ServiceOptions, DEFAULT_MAX_HOPS};
use phenograph_store::StoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub permissions: CohortPermissions,
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Header carrying the caller's verified permission claims.
    pub claims_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            claims_header: "x-permissions".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub max_concurrent_cohorts: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cohorts: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Requests with a larger `fuzz` are rejected.
    pub max_hops: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.store.apply_env();
        Ok(config)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            max_concurrent_cohorts: self.aggregation.max_concurrent_cohorts.max(1),
            max_hops: self.query.max_hops,
        }
    }
}
