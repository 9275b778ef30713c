mod entity;
mod extraction;
mod relation;

pub use entity::{Entity, ENTITY_LABEL};
pub use extraction::ExtractionResult;
pub use relation::{Relation, RelationType, RelationTypeRejection};
