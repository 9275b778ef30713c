use serde::Serialize;
use std::collections::HashSet;

use super::{Entity, Relation};

/// Output of one extraction call. Empty when the model never produced a
/// usable answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
}

impl ExtractionResult {
    /// Repeated entities keep their first position only.
    pub fn new(
        entities: impl IntoIterator<Item = Entity>,
        relations: impl IntoIterator<Item = Relation>,
    ) -> Self {
        let mut seen = HashSet::new();
        let entities = entities
            .into_iter()
            .filter(|entity| seen.insert(entity.name().to_string()))
            .collect();
        Self {
            entities,
            relations: relations.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}
