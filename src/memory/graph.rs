use crate::domain::RelationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::store::{EdgeMerge, GraphCounts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: Uuid,
    pub kind: String,
    pub target: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct GraphData {
    nodes: HashMap<Uuid, EntityNode>,
    edges: Vec<RelationEdge>,
}

/// In-process property graph with the same merge-by-key rules as the
/// database backends.
pub struct KnowledgeGraph {
    data: GraphData,
    name_index: HashMap<String, Uuid>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            data: GraphData::default(),
            name_index: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(data: GraphData) -> Self {
        let name_index = data
            .nodes
            .values()
            .map(|node| (node.name.clone(), node.id))
            .collect();
        Self { data, name_index }
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<&EntityNode> {
        self.name_index
            .get(name)
            .and_then(|id| self.data.nodes.get(id))
    }

    /// Returns the node id and whether it was created by this call.
    pub fn merge_entity(&mut self, name: &str) -> (Uuid, bool) {
        if let Some(id) = self.name_index.get(name) {
            return (*id, false);
        }

        let node = EntityNode {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let id = node.id;
        self.name_index.insert(node.name.clone(), id);
        self.data.nodes.insert(id, node);
        (id, true)
    }

    pub fn merge_relation(&mut self, source: &str, kind: &RelationType, target: &str) -> EdgeMerge {
        let (Some(&source), Some(&target)) = (self.name_index.get(source), self.name_index.get(target))
        else {
            return EdgeMerge::EndpointMissing;
        };

        if self.has_relation(&source, kind, &target) {
            return EdgeMerge::Merged;
        }

        self.data.edges.push(RelationEdge {
            source,
            kind: kind.as_str().to_string(),
            target,
            created_at: Utc::now(),
        });
        EdgeMerge::Merged
    }

    pub fn has_relation(&self, source: &Uuid, kind: &RelationType, target: &Uuid) -> bool {
        self.data
            .edges
            .iter()
            .any(|edge| edge.source == *source && edge.target == *target && edge.kind == kind.as_str())
    }

    pub fn counts(&self) -> GraphCounts {
        GraphCounts {
            nodes: self.data.nodes.len() as u64,
            edges: self.data.edges.len() as u64,
        }
    }

    pub fn clear(&mut self) -> GraphCounts {
        let removed = self.counts();
        self.data = GraphData::default();
        self.name_index.clear();
        removed
    }

    pub(crate) fn snapshot(&self) -> &GraphData {
        &self.data
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}
