use serde::{Deserialize, Serialize};
use std::fmt;

/// Label carried by every node written by the pipeline.
pub const ENTITY_LABEL: &str = "Entity";

/// A named node. The name is the identity key in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    name: String,
}

impl Entity {
    /// Returns `None` when the name is blank once trimmed.
    pub fn new(name: impl AsRef<str>) -> Option<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            name: trimmed.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(Entity::new("").is_none());
        assert!(Entity::new("   \n").is_none());
    }

    #[test]
    fn names_are_trimmed() {
        let entity = Entity::new("  甲 ").unwrap();
        assert_eq!(entity.name(), "甲");
        assert_eq!(entity.to_string(), "甲");
    }
}
