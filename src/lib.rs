pub mod config;
pub mod domain;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod memory;

pub use domain::{Entity, ExtractionResult, Relation, RelationType};
pub use error::{ConfigError, ExtractionError, GraphError};
pub use ingestion::{Extractor, IngestionPipeline, LLMClient, ResetPolicy};
pub use memory::{GraphStore, GraphWriter, WriteSummary};
