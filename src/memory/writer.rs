use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::{EdgeMerge, GraphCounts, GraphStore};
use crate::domain::{Entity, Relation};
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub entities_written: usize,
    pub relations_written: usize,
    /// Relation types that sanitized to nothing.
    pub relations_skipped: usize,
    /// Relations whose source or target node does not exist.
    pub relations_unmatched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub nodes_deleted: u64,
    pub edges_deleted: u64,
}

/// Applies extraction output to a [`GraphStore`].
///
/// Writes may run concurrently with each other; `reset` waits for them and
/// excludes everything else while it runs.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    gate: RwLock<()>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            gate: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Merges every entity, then every relation. Completed merges are kept
    /// if a later one fails; calling again is safe.
    pub fn write(
        &self,
        entities: &[Entity],
        relations: &[Relation],
    ) -> Result<WriteSummary, GraphError> {
        let _shared = self.gate.read();
        let mut session = self.store.session()?;
        let mut summary = WriteSummary::default();

        info!(entities = entities.len(), relations = relations.len(), "écriture dans le graphe");
        for entity in entities {
            session.merge_entity(entity)?;
            summary.entities_written += 1;
        }
        info!(count = summary.entities_written, "nœuds d'entités fusionnés");

        for relation in relations {
            let kind = match relation.relation_type() {
                Ok(kind) => kind,
                Err(rejection) => {
                    warn!(relation = %relation, raison = %rejection, "relation ignorée");
                    summary.relations_skipped += 1;
                    continue;
                }
            };
            match session.merge_relation(&relation.source, &kind, &relation.target)? {
                EdgeMerge::Merged => summary.relations_written += 1,
                EdgeMerge::EndpointMissing => {
                    debug!(relation = %relation, "extrémité absente, aucune arête créée");
                    summary.relations_unmatched += 1;
                }
            }
        }

        session.close()?;
        info!(
            entities = summary.entities_written,
            relations = summary.relations_written,
            skipped = summary.relations_skipped,
            unmatched = summary.relations_unmatched,
            "écriture dans le graphe terminée"
        );
        Ok(summary)
    }

    /// Deletes every node and edge in the store. Irreversible.
    pub fn reset(&self) -> Result<ResetSummary, GraphError> {
        let _exclusive = self.gate.write();
        info!("vidage complet du graphe");
        let mut session = self.store.session()?;
        let removed = session.delete_all()?;
        session.close()?;
        info!(
            nodes = removed.nodes,
            edges = removed.edges,
            "graphe vidé"
        );
        Ok(ResetSummary {
            nodes_deleted: removed.nodes,
            edges_deleted: removed.edges,
        })
    }

    pub fn counts(&self) -> Result<GraphCounts, GraphError> {
        let _shared = self.gate.read();
        let mut session = self.store.session()?;
        let counts = session.counts()?;
        session.close()?;
        Ok(counts)
    }
}
