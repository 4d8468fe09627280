//! Collapse traversal paths into a renderable node/edge graph.
//!
//! Each path is a list of segments `{id, start, end}` where `start`/`end` are
//! property maps in traversal order. Overlapping paths share nodes and
//! relationships, so nodes are de-duplicated by entity id and edges by
//! relationship identity, keeping the first occurrence.

use std::collections::{BTreeMap, HashSet};

use crate::error::StoreError;
use crate::model::{Graph, GraphEdge, GraphNode};
use crate::store::{RelationshipId, StoreValue};

pub const START_COLOR: &str = "rgb(80, 175, 99)";
pub const PATIENT_COLOR: &str = "rgb(97, 205, 187)";
pub const PHENOTYPE_COLOR: &str = "rgb(244, 117, 96)";
pub const PATIENT_RADIUS: u32 = 10;
pub const PHENOTYPE_RADIUS: u32 = 15;

/// A path endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Patient { patient_id: String },
    Phenotype { name: String, label: String },
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Self::Patient { patient_id } => patient_id,
            Self::Phenotype { name, .. } => name,
        }
    }

    fn from_properties(props: &BTreeMap<String, StoreValue>) -> Result<Self, StoreError> {
        if let Some(id) = props.get("patientId") {
            return Ok(Self::Patient {
                patient_id: scalar_text(id)?,
            });
        }
        if let Some(name) = props.get("name") {
            let name = scalar_text(name)?;
            let label = props
                .get("label")
                .and_then(StoreValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| name.clone());
            return Ok(Self::Phenotype { name, label });
        }
        Err(StoreError::decode(
            "path node is neither a patient nor a phenotype class",
        ))
    }

    fn to_node(&self, start_id: &str) -> GraphNode {
        match self {
            Self::Patient { patient_id } => GraphNode {
                id: patient_id.clone(),
                label: patient_id.clone(),
                radius: PATIENT_RADIUS,
                color: if patient_id == start_id {
                    START_COLOR
                } else {
                    PATIENT_COLOR
                }
                .to_string(),
            },
            // A phenotype search starts from a label, so the origin may be
            // named either way.
            Self::Phenotype { name, label } => GraphNode {
                id: name.clone(),
                label: label.clone(),
                radius: PHENOTYPE_RADIUS,
                color: if name == start_id || label == start_id {
                    START_COLOR
                } else {
                    PHENOTYPE_COLOR
                }
                .to_string(),
            },
        }
    }
}

fn scalar_text(value: &StoreValue) -> Result<String, StoreError> {
    match value {
        StoreValue::String(s) => Ok(s.clone()),
        StoreValue::Int(i) => Ok(i.to_string()),
        _ => Err(StoreError::decode("entity identifier is not a scalar")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub relationship: RelationshipId,
    pub start: Entity,
    pub end: Entity,
}

impl Segment {
    fn from_value(value: &StoreValue) -> Result<Self, StoreError> {
        let map = value
            .as_map()
            .ok_or_else(|| StoreError::decode("segment is not a map"))?;
        let field = |key: &str| {
            map.get(key)
                .ok_or_else(|| StoreError::decode(format!("segment has no `{key}`")))
        };
        let endpoint = |key: &str| -> Result<Entity, StoreError> {
            let props = field(key)?
                .as_map()
                .ok_or_else(|| StoreError::decode(format!("segment `{key}` is not a map")))?;
            Entity::from_properties(props)
        };
        Ok(Self {
            relationship: RelationshipId::from_value(field("id")?)?,
            start: endpoint("start")?,
            end: endpoint("end")?,
        })
    }
}

/// One matched route, decoded. Undecodable segments are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalPath {
    pub segments: Vec<Segment>,
}

impl TraversalPath {
    pub fn from_value(value: &StoreValue) -> Result<Self, StoreError> {
        if matches!(value, StoreValue::Null) {
            return Ok(Self::default());
        }
        let items = value
            .as_list()
            .ok_or_else(|| StoreError::decode("path segments are not a list"))?;

        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            match Segment::from_value(item) {
                Ok(segment) => segments.push(segment),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable path segment"),
            }
        }
        Ok(Self { segments })
    }
}

/// Pure transform from paths to a de-duplicated graph.
#[derive(Debug, Default)]
pub struct GraphProjector {
    graph: Graph,
    node_ids: HashSet<String>,
    edge_ids: HashSet<RelationshipId>,
}

impl GraphProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(&mut self, path: &TraversalPath, start_id: &str) {
        for segment in &path.segments {
            for entity in [&segment.start, &segment.end] {
                if self.node_ids.insert(entity.id().to_string()) {
                    self.graph.nodes.push(entity.to_node(start_id));
                }
            }
            if self.edge_ids.insert(segment.relationship) {
                self.graph.edges.push(GraphEdge {
                    id: segment.relationship.to_string(),
                    from: segment.start.id().to_string(),
                    to: segment.end.id().to_string(),
                });
            }
        }
    }

    pub fn finish(self) -> Graph {
        self.graph
    }
}

/// Project `paths` into a graph, colouring the entity identified by
/// `start_id` as the traversal origin.
pub fn project<'a>(paths: impl IntoIterator<Item = &'a TraversalPath>, start_id: &str) -> Graph {
    let mut projector = GraphProjector::new();
    for path in paths {
        projector.add_path(path, start_id);
    }
    projector.finish()
}
