//! Scripted in-memory store.
//!
//! Responses are registered against a [`QueryPattern`]; the first registered
//! pattern that matches a query answers it. Unmatched queries return no rows.
//! Every executed query is logged, so callers can assert what reached the
//! store (and what did not).

use async_trait::async_trait;
use parking_lot::Mutex;
use phenograph_core::{CypherQuery, GraphStoreClient, StoreError, StoreRecord, StoreValue};
use serde_json::Value;

use crate::session::SessionPool;

/// Matches on query text fragments and bound parameter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPattern {
    fragments: Vec<String>,
    params: Vec<(String, StoreValue)>,
}

impl QueryPattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn contains(fragment: impl Into<String>) -> Self {
        Self::any().and_contains(fragment)
    }

    pub fn and_contains(mut self, fragment: impl Into<String>) -> Self {
        self.fragments.push(fragment.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, query: &CypherQuery) -> bool {
        self.fragments.iter().all(|f| query.text.contains(f.as_str()))
            && self
                .params
                .iter()
                .all(|(k, v)| query.params.get(k) == Some(v))
    }
}

struct Rule {
    pattern: QueryPattern,
    response: Result<Vec<StoreRecord>, StoreError>,
}

pub struct MemoryStore {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<CypherQuery>>,
    sessions: SessionPool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_sessions(SessionPool::new(8))
    }

    pub fn with_sessions(sessions: SessionPool) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            sessions,
        }
    }

    /// Answer cohort enumeration with `cohorts`, in order.
    pub fn with_cohorts(self, cohorts: &[&str]) -> Self {
        let rows = cohorts
            .iter()
            .map(|c| StoreRecord::single(StoreValue::from(*c)))
            .collect();
        self.respond(QueryPattern::contains("MATCH (c:Cohort)"), rows)
    }

    pub fn respond(self, pattern: QueryPattern, rows: Vec<StoreRecord>) -> Self {
        self.rules.lock().push(Rule {
            pattern,
            response: Ok(rows),
        });
        self
    }

    /// Single-column rows from JSON values.
    pub fn respond_json(self, pattern: QueryPattern, values: Vec<Value>) -> Self {
        let rows = values
            .into_iter()
            .map(|v| StoreRecord::single(StoreValue::from(v)))
            .collect();
        self.respond(pattern, rows)
    }

    /// A single `count(...)` row.
    pub fn respond_count(self, pattern: QueryPattern, count: i64) -> Self {
        self.respond(pattern, vec![StoreRecord::single(StoreValue::Int(count))])
    }

    pub fn fail(self, pattern: QueryPattern, error: StoreError) -> Self {
        self.rules.lock().push(Rule {
            pattern,
            response: Err(error),
        });
        self
    }

    /// Queries executed so far, in order.
    pub fn executed(&self) -> Vec<CypherQuery> {
        self.log.lock().clone()
    }

    pub fn executed_matching(&self, pattern: &QueryPattern) -> usize {
        self.log.lock().iter().filter(|q| pattern.matches(q)).count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }
}

#[async_trait]
impl GraphStoreClient for MemoryStore {
    async fn execute(&self, query: &CypherQuery) -> Result<Vec<StoreRecord>, StoreError> {
        let _session = self.sessions.acquire().await?;
        self.log.lock().push(query.clone());

        let response = self
            .rules
            .lock()
            .iter()
            .find(|rule| rule.pattern.matches(query))
            .map(|rule| rule.response.clone());
        // Yield so concurrent callers interleave like real I/O.
        tokio::task::yield_now().await;
        response.unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_matching_rule_answers() {
        let store = MemoryStore::new()
            .respond_count(QueryPattern::contains("count").with_param("cohort", "Demo"), 2)
            .respond_count(QueryPattern::contains("count"), 9);

        let demo = CypherQuery::new("RETURN count(*) AS matches").param("cohort", "Demo");
        let other = CypherQuery::new("RETURN count(*) AS matches").param("cohort", "Mito");

        let rows = store.execute(&demo).await.unwrap();
        assert_eq!(rows[0].get(0).unwrap(), &StoreValue::Int(2));
        let rows = store.execute(&other).await.unwrap();
        assert_eq!(rows[0].get(0).unwrap(), &StoreValue::Int(9));
        assert_eq!(store.executed().len(), 2);
    }

    #[tokio::test]
    async fn unmatched_query_has_no_rows() {
        let store = MemoryStore::new().respond_json(QueryPattern::contains("Patient"), vec![json!({})]);
        assert!(store.execute(&CypherQuery::new("RETURN 1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_release_the_session() {
        let store = MemoryStore::with_sessions(SessionPool::new(1))
            .fail(QueryPattern::any(), StoreError::Query("boom".into()));
        for _ in 0..3 {
            assert!(store.execute(&CypherQuery::new("RETURN 1")).await.is_err());
        }
        assert_eq!(store.sessions().in_use(), 0);
        assert_eq!(store.sessions().opened(), 3);
    }
}
