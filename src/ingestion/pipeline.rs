use super::extractor::Extractor;
use super::llm_client::LLMClient;
use crate::error::GraphError;
use crate::memory::{GraphWriter, ResetSummary, WriteSummary};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Extracting,
    Extracted,
    Resetting,
    Writing,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Extracted => "extracted",
            PipelineStage::Resetting => "resetting",
            PipelineStage::Writing => "writing",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Whether the store is wiped before writing. Wiping is never implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    #[default]
    Keep,
    ResetBeforeWrite,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub entities_extracted: usize,
    pub relations_extracted: usize,
    pub extraction_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetSummary>,
    pub summary: WriteSummary,
}

pub struct IngestionPipeline<C: LLMClient> {
    extractor: Extractor<C>,
    writer: Arc<GraphWriter>,
}

impl<C: LLMClient> IngestionPipeline<C> {
    pub fn new(extractor: Extractor<C>, writer: Arc<GraphWriter>) -> Self {
        Self { extractor, writer }
    }

    /// Extracts from `text` and merges the result into the store.
    ///
    /// Extraction problems never fail the run; only graph errors do.
    pub fn run(&self, text: &str, reset: ResetPolicy) -> Result<IngestionOutcome, GraphError> {
        let mut stage = PipelineStage::Idle;

        advance(&mut stage, PipelineStage::Extracting);
        let report = self.extractor.extract_with_report(text);
        if let Some(kind) = report.exhausted_on {
            warn!(failure = %kind, attempts = report.attempts, "extraction vide après échecs répétés");
        }
        advance(&mut stage, PipelineStage::Extracted);

        let reset_summary = match reset {
            ResetPolicy::ResetBeforeWrite => {
                advance(&mut stage, PipelineStage::Resetting);
                Some(self.writer.reset()?)
            }
            ResetPolicy::Keep => None,
        };

        advance(&mut stage, PipelineStage::Writing);
        let extraction = &report.result;
        let summary = self
            .writer
            .write(extraction.entities(), extraction.relations())?;
        advance(&mut stage, PipelineStage::Done);

        info!(
            entities = summary.entities_written,
            relations = summary.relations_written,
            skipped = summary.relations_skipped,
            unmatched = summary.relations_unmatched,
            "pipeline terminé"
        );
        Ok(IngestionOutcome {
            entities_extracted: extraction.entities().len(),
            relations_extracted: extraction.relations().len(),
            extraction_attempts: report.attempts,
            reset: reset_summary,
            summary,
        })
    }

    /// Reads a UTF-8 text file and runs the pipeline on its content.
    pub fn ingest_file(&self, file: impl AsRef<Path>, reset: ResetPolicy) -> Result<IngestionOutcome> {
        let file_path = file.as_ref();
        info!(fichier = %file_path.display(), "traitement du fichier");
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("impossible de lire le fichier {:?}", file_path))?;
        anyhow::ensure!(
            !content.trim().is_empty(),
            "le fichier {:?} ne contient aucun texte",
            file_path
        );
        let outcome = self
            .run(&content, reset)
            .with_context(|| format!("échec de l'écriture du graphe pour {:?}", file_path))?;
        info!(fichier = %file_path.display(), "fichier traité");
        Ok(outcome)
    }

    pub fn writer(&self) -> &Arc<GraphWriter> {
        &self.writer
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug!(from = %stage, to = %next, "étape du pipeline");
    *stage = next;
}
