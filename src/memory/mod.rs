mod graph;
mod neo4j;
mod persistence;
mod store;
mod writer;

use std::sync::Arc;

pub use graph::{EntityNode, KnowledgeGraph, RelationEdge};
pub use neo4j::{Neo4jStore, Neo4jStoreConfig};
pub use persistence::{KnowledgeGraphLoader, KnowledgeGraphWriter, LocalGraphStore};
pub use store::{EdgeMerge, GraphCounts, GraphSession, GraphStore};
pub use writer::{GraphWriter, ResetSummary, WriteSummary};

use crate::config::StoreConfig;
use crate::error::GraphError;

/// Opens the store described by `config`. No request is sent yet.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn GraphStore>, GraphError> {
    match config {
        StoreConfig::Neo4j(neo4j) => Ok(Arc::new(Neo4jStore::connect(&neo4j.to_store_config())?)),
        StoreConfig::File { path } => Ok(Arc::new(LocalGraphStore::open(path.clone())?)),
    }
}
