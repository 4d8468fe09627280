//! The graph store collaborator boundary.
//!
//! The core never talks to a driver directly. It hands a [`CypherQuery`]
//! (text + bound parameters + the column aliases it returns) to a
//! [`GraphStoreClient`] and gets back positional [`StoreRecord`]s holding
//! driver-neutral [`StoreValue`]s. Driver-specific shapes (integer wrappers,
//! node/relationship structs) are converted by the implementation before they
//! reach this module.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

// ============================================================================
// Values and records
// ============================================================================

/// A driver-neutral value as returned by (or bound into) the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<StoreValue>),
    Map(BTreeMap<String, StoreValue>),
}

impl StoreValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StoreValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StoreValue]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Non-negative integer, e.g. the result of `count(...)`.
    pub fn as_count(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Deserialize this value into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.to_json()).map_err(|e| StoreError::decode(e.to_string()))
    }
}

impl From<Value> for StoreValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(m) => Self::Map(m.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<String>> for StoreValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value.into_iter().map(Self::String).collect())
    }
}

/// One row of a result set, addressed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRecord {
    fields: Vec<StoreValue>,
}

impl StoreRecord {
    pub fn new(fields: Vec<StoreValue>) -> Self {
        Self { fields }
    }

    pub fn single(value: StoreValue) -> Self {
        Self {
            fields: vec![value],
        }
    }

    pub fn get(&self, index: usize) -> Result<&StoreValue, StoreError> {
        self.fields
            .get(index)
            .ok_or_else(|| StoreError::decode(format!("record has no field {index}")))
    }
}

/// Store-assigned relationship identity. Opaque; only compared and printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(pub i64);

impl RelationshipId {
    pub fn from_value(value: &StoreValue) -> Result<Self, StoreError> {
        value
            .as_i64()
            .map(Self)
            .ok_or_else(|| StoreError::decode("relationship identity is not an integer"))
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Query text with its bound parameters.
///
/// `columns` lists the `RETURN ... AS <alias>` names in positional order.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub text: String,
    pub params: BTreeMap<String, StoreValue>,
    pub columns: Vec<&'static str>,
}

impl CypherQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<StoreValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn returns(mut self, column: &'static str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(StoreValue::as_str)
    }
}

// ============================================================================
// Collaborator trait
// ============================================================================

/// Executes a query against the graph store.
///
/// `Ok(vec![])` means "no matches"; `Err` means the call failed. Implementations
/// acquire whatever session/connection resource they need per call and must
/// release it on every exit path.
#[async_trait]
pub trait GraphStoreClient: Send + Sync {
    async fn execute(&self, query: &CypherQuery) -> Result<Vec<StoreRecord>, StoreError>;
}

#[async_trait]
impl<T: GraphStoreClient + ?Sized> GraphStoreClient for Arc<T> {
    async fn execute(&self, query: &CypherQuery) -> Result<Vec<StoreRecord>, StoreError> {
        (**self).execute(query).await
    }
}
