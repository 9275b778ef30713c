use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Everything outside letters, digits, `_` and `:` (Unicode aware).
static UNSAFE_TYPE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}_:]+").unwrap());

/// Directed, typed link between two entity names, as returned by the model.
///
/// `kind` is kept raw; it only becomes a store identifier through
/// [`Relation::relation_type`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub kind: String,
    pub target: String,
}

impl Relation {
    pub fn new(
        source: impl AsRef<str>,
        kind: impl Into<String>,
        target: impl AsRef<str>,
    ) -> Self {
        Self {
            source: source.as_ref().trim().to_string(),
            kind: kind.into(),
            target: target.as_ref().trim().to_string(),
        }
    }

    pub fn relation_type(&self) -> Result<RelationType, RelationTypeRejection> {
        RelationType::sanitize(&self.kind)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source, self.kind, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationTypeRejection {
    #[error("type de relation vide après nettoyage: {raw:?}")]
    Empty { raw: String },
}

/// Relation type token safe to splice into a query as an identifier.
///
/// Only alphanumeric characters, `_` and `:` survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelationType(String);

impl RelationType {
    pub fn sanitize(raw: &str) -> Result<Self, RelationTypeRejection> {
        let cleaned = UNSAFE_TYPE_CHARS.replace_all(raw, "");
        if cleaned.is_empty() {
            return Err(RelationTypeRejection::Empty {
                raw: raw.to_string(),
            });
        }
        Ok(Self(cleaned.into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RelationType {
    type Err = RelationTypeRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::sanitize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_cjk_letters() {
        let token = RelationType::sanitize("知识-关系!!").unwrap();
        assert_eq!(token.as_str(), "知识关系");
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':'));
    }

    #[test]
    fn sanitize_keeps_underscore_and_colon() {
        let token: RelationType = "HAS:PART_1".parse().unwrap();
        assert_eq!(token.as_str(), "HAS:PART_1");
        assert_eq!(RelationType::sanitize("works at").unwrap().as_str(), "worksat");
    }

    #[test]
    fn sanitize_rejects_punctuation_only() {
        let err = RelationType::sanitize("-> !!").unwrap_err();
        assert_eq!(
            err,
            RelationTypeRejection::Empty {
                raw: "-> !!".to_string()
            }
        );
        assert!(RelationType::sanitize("").is_err());
    }

    #[test]
    fn sanitize_strips_backticks() {
        let token = RelationType::sanitize("a`]->(x) DETACH DELETE x//").unwrap();
        assert!(!token.as_str().contains('`'));
        assert_eq!(token.as_str(), "axDETACHDELETEx");
    }

    #[test]
    fn relation_endpoints_are_trimmed() {
        let relation = Relation::new(" 甲", "认识", "乙 ");
        assert_eq!(relation.source, "甲");
        assert_eq!(relation.target, "乙");
        assert_eq!(relation.relation_type().unwrap().as_str(), "认识");
    }
}
