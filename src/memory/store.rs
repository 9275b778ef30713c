use serde::Serialize;

use crate::domain::{Entity, RelationType};
use crate::error::GraphError;

/// Outcome of a match-only edge merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMerge {
    /// The edge exists now, whether it was created or already there.
    Merged,
    /// One endpoint has no node; nothing was written.
    EndpointMissing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    pub nodes: u64,
    pub edges: u64,
}

/// Connection to a graph database. Opened once, shared across runs.
pub trait GraphStore: Send + Sync {
    /// Acquires a session scoped to one writer call. Dropping the session
    /// releases it.
    fn session(&self) -> Result<Box<dyn GraphSession + '_>, GraphError>;

    fn verify_connectivity(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

pub trait GraphSession {
    /// Creates the node if no node with this name exists.
    fn merge_entity(&mut self, entity: &Entity) -> Result<(), GraphError>;

    /// Creates the edge if absent. Never creates endpoint nodes.
    fn merge_relation(
        &mut self,
        source: &str,
        kind: &RelationType,
        target: &str,
    ) -> Result<EdgeMerge, GraphError>;

    /// Removes every node and edge, returning what was removed.
    fn delete_all(&mut self) -> Result<GraphCounts, GraphError>;

    fn counts(&mut self) -> Result<GraphCounts, GraphError>;

    /// Ends the session, surfacing errors that a plain drop would only log.
    fn close(self: Box<Self>) -> Result<(), GraphError>;
}
