//! Error types shared across the pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single extraction attempt. Always retried, never surfaced to
/// the pipeline caller.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("échec de transport vers le modèle: {0}")]
    Transport(String),

    #[error("réponse du modèle incomplète: {0}")]
    MalformedResponse(String),

    #[error("contenu du modèle inexploitable: {0}")]
    UnparsableContent(String),
}

impl ExtractionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractionError::Transport(_) => FailureKind::Transport,
            ExtractionError::MalformedResponse(_) => FailureKind::MalformedResponse,
            ExtractionError::UnparsableContent(_) => FailureKind::UnparsableContent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    MalformedResponse,
    UnparsableContent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::UnparsableContent => "unparsable_content",
        };
        f.write_str(name)
    }
}

/// Graph store failures. Fatal to the run; nothing is retried.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("base de graphe injoignable: {0}")]
    Connectivity(String),

    #[error("requête rejetée par la base ({code}): {message}")]
    Query { code: String, message: String },

    #[error("stockage local du graphe: {0}")]
    Storage(String),

    #[error("configuration du graphe invalide: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("impossible de lire la configuration {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("impossible d'écrire la configuration {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON de configuration invalide dans {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("le fichier de configuration {0:?} existe déjà")]
    AlreadyExists(PathBuf),

    #[error("configuration invalide: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_errors_map_to_kinds() {
        assert_eq!(
            ExtractionError::Transport("x".into()).kind(),
            FailureKind::Transport
        );
        assert_eq!(
            ExtractionError::MalformedResponse("x".into()).kind(),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            ExtractionError::UnparsableContent("x".into()).kind(),
            FailureKind::UnparsableContent
        );
        assert_eq!(FailureKind::UnparsableContent.to_string(), "unparsable_content");
    }

    #[test]
    fn graph_query_error_display() {
        let err = GraphError::Query {
            code: "Neo.ClientError.Statement.SyntaxError".into(),
            message: "bad".into(),
        };
        let text = err.to_string();
        assert!(text.contains("SyntaxError"));
        assert!(text.contains("bad"));
    }
}
