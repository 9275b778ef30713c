use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Entity, ExtractionResult, Relation};
use crate::error::ExtractionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMExtractionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Answer shape the model is asked for. Missing or null keys read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LLMExtractionResponse {
    #[serde(default)]
    pub entities: Option<Vec<String>>,
    #[serde(default)]
    pub relations: Option<Vec<(String, String, String)>>,
}

impl LLMExtractionResponse {
    pub fn from_value(value: Value) -> Result<Self, ExtractionError> {
        if !value.is_object() {
            return Err(ExtractionError::UnparsableContent(format!(
                "objet JSON attendu, reçu: {}",
                value
            )));
        }
        serde_json::from_value(value).map_err(|err| {
            ExtractionError::UnparsableContent(format!("format des entités/relations inattendu: {err}"))
        })
    }

    pub fn into_result(self) -> ExtractionResult {
        let entities = self
            .entities
            .unwrap_or_default()
            .into_iter()
            .filter_map(Entity::new);
        let relations = self
            .relations
            .unwrap_or_default()
            .into_iter()
            .map(|(source, kind, target)| Relation::new(source, kind, target));
        ExtractionResult::new(entities, relations)
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion payload.
pub fn completion_content(payload: &Value) -> Result<&str, ExtractionError> {
    let first = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| {
            ExtractionError::MalformedResponse(format!(
                "structure 'choices' absente ou vide: {payload}"
            ))
        })?;
    let message = first.get("message").ok_or_else(|| {
        ExtractionError::MalformedResponse("champ 'choices[0].message' absent".to_string())
    })?;
    message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExtractionError::MalformedResponse(
                "champ 'choices[0].message.content' absent ou non textuel".to_string(),
            )
        })
}
