mod extractor;
mod llm_client;
mod pipeline;
mod prompt;
mod repair;
mod response;

pub use extractor::{ExtractionReport, Extractor, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use llm_client::{ChatCompletionsClient, LLMClient, MockLLMClient};
pub use pipeline::{IngestionOutcome, IngestionPipeline, PipelineStage, ResetPolicy};
pub use prompt::{PromptBuilder, PromptTemplate};
pub use repair::{extract_json_from_text, parse_content, repair};
pub use response::{completion_content, LLMExtractionRequest, LLMExtractionResponse};
