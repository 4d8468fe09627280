//! Neo4j client over Bolt.
//!
//! Parameters are converted from [`StoreValue`] to Bolt values once, here;
//! result columns come back through serde as JSON values, so driver wrapper
//! types never leave this module.

use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph,
};
use phenograph_core::{CypherQuery, GraphStoreClient, StoreError, StoreRecord, StoreValue};

use crate::config::StoreConfig;
use crate::session::SessionPool;

pub struct Neo4jStore {
    graph: Graph,
    sessions: SessionPool,
}

impl Neo4jStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .fetch_size(config.fetch_size)
            .max_connections(config.max_sessions);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let driver_config = builder
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, max_sessions = config.max_sessions, "connected to graph store");
        Ok(Self {
            graph,
            sessions: SessionPool::new(config.max_sessions),
        })
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }
}

#[async_trait]
impl GraphStoreClient for Neo4jStore {
    async fn execute(&self, cypher: &CypherQuery) -> Result<Vec<StoreRecord>, StoreError> {
        let _session = self.sessions.acquire().await?;

        let mut q = query(&cypher.text);
        for (key, value) in &cypher.params {
            q = q.param(key, to_bolt(value));
        }

        let mut rows = self
            .graph
            .execute(q)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            let mut fields = Vec::with_capacity(cypher.columns.len());
            for column in &cypher.columns {
                let value: serde_json::Value = row
                    .get(column)
                    .map_err(|e| StoreError::decode(format!("column `{column}`: {e}")))?;
                fields.push(StoreValue::from(value));
            }
            records.push(StoreRecord::new(fields));
        }
        Ok(records)
    }
}

/// Bolt parameter for a store value.
pub fn to_bolt(value: &StoreValue) -> BoltType {
    match value {
        StoreValue::Null => BoltType::Null(BoltNull),
        StoreValue::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        StoreValue::Int(i) => BoltType::Integer(BoltInteger::new(*i)),
        StoreValue::Float(f) => BoltType::Float(BoltFloat::new(*f)),
        StoreValue::String(s) => BoltType::String(BoltString::new(s)),
        StoreValue::List(items) => {
            let mut list = BoltList::with_capacity(items.len());
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        StoreValue::Map(entries) => {
            let mut map = BoltMap::with_capacity(entries.len());
            for (k, v) in entries {
                map.put(BoltString::new(k), to_bolt(v));
            }
            BoltType::Map(map)
        }
    }
}
