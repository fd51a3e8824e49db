//! Contracts for the generation and analysis collaborators.
//!
//! The engine only ever sees a well-formed [`AnalysisResult`]. Anything a
//! provider hands back is funneled through [`AnalysisResult::from_value`] or
//! [`AnalysisResult::from_text`], which drop what they cannot understand and
//! never fail.

use crate::model::{Character, ChangeEvent, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failures a collaborator may report. The orchestrator treats all of them alike.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("No API key configured for the selected provider")]
    CredentialMissing,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider error (status {status}): {message}")]
    Provider { status: u16, message: String },
}

impl From<claude::Error> for CollaboratorError {
    fn from(err: claude::Error) -> Self {
        match err {
            claude::Error::NoApiKey => CollaboratorError::CredentialMissing,
            claude::Error::Api { status, message } => CollaboratorError::Provider { status, message },
            other => CollaboratorError::Transport(other.to_string()),
        }
    }
}

/// Assistant text produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
}

impl Generation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A character the analysis found active in the latest assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCharacter {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ActiveCharacter {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Structured output of one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub active_characters: Vec<ActiveCharacter>,
    pub changes: Vec<ChangeEvent>,
}

impl AnalysisResult {
    pub fn new(active_characters: Vec<ActiveCharacter>, changes: Vec<ChangeEvent>) -> Self {
        Self {
            active_characters,
            changes,
        }
    }

    /// Validate a loosely-typed payload.
    ///
    /// Accepts `activeCharacters` or the older `characters` key. Entries
    /// without a usable name and change events that are not one of the four
    /// known variants are dropped. A non-object payload yields the empty result.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            tracing::warn!("analysis payload is not an object; treating as empty");
            return Self::default();
        };

        let characters = map
            .remove("activeCharacters")
            .or_else(|| map.remove("characters"))
            .unwrap_or(Value::Null);

        let active_characters = match characters {
            Value::Array(items) => items.into_iter().filter_map(parse_active_character).collect(),
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(payload = %other, "activeCharacters is not a list; ignoring");
                Vec::new()
            }
        };

        let changes = match map.remove("changes") {
            Some(Value::Array(items)) => items.into_iter().filter_map(parse_change).collect(),
            _ => Vec::new(),
        };

        Self {
            active_characters,
            changes,
        }
    }

    /// Validate model output that should contain a JSON object.
    ///
    /// Prose or code fences around the object are tolerated: the outermost
    /// `{ ... }` span is what gets parsed.
    pub fn from_text(text: &str) -> Self {
        let span = match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => &text[start..=end],
            _ => {
                tracing::warn!("analysis text contains no JSON object; treating as empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(span) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                tracing::warn!(error = %e, "analysis JSON did not parse; treating as empty");
                Self::default()
            }
        }
    }
}

fn parse_active_character(item: Value) -> Option<ActiveCharacter> {
    let name = item.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let description = item
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(ActiveCharacter::new(name, description))
}

fn parse_change(item: Value) -> Option<ChangeEvent> {
    let name_list = |key: &str| -> Option<Vec<String>> {
        let names: Vec<String> = item
            .get(key)?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Some(names)
    };
    let name = |key: &str| -> Option<String> {
        let s = item.get(key)?.as_str()?.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    let kind = item.get("type").and_then(Value::as_str).map(str::to_lowercase);
    let event = match kind.as_deref() {
        Some("new") => name("name").map(|name| ChangeEvent::New { name }),
        Some("disappear") => name("name").map(|name| ChangeEvent::Disappear { name }),
        Some("merge") => name("into")
            .zip(name_list("from"))
            .map(|(into, from)| ChangeEvent::Merge { into, from }),
        Some("split") => name("from")
            .zip(name_list("into"))
            .map(|(from, into)| ChangeEvent::Split { from, into }),
        _ => None,
    };

    if event.is_none() {
        tracing::warn!(payload = %item, "dropping unrecognized change event");
    }
    event
}

/// Produces the assistant's next message.
#[async_trait]
pub trait Generator: Send + Sync {
    /// `selected` names the characters the user picked as branching context.
    async fn generate(
        &self,
        messages: &[Message],
        selected: &[String],
    ) -> Result<Generation, CollaboratorError>;
}

/// Decomposes assistant text into characters.
///
/// Implementations must absorb malformed upstream output and degrade to
/// [`AnalysisResult::default`]; only transport-level failures are errors.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        roster: &[Character],
    ) -> Result<AnalysisResult, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_payload() {
        let result = AnalysisResult::from_value(json!({
            "activeCharacters": [{"name": "Unified", "description": "One voice"}],
            "changes": [{"type": "merge", "into": "Unified", "from": ["Reasoner", "Skeptic"]}]
        }));
        assert_eq!(result.active_characters, vec![ActiveCharacter::new("Unified", "One voice")]);
        assert_eq!(
            result.changes,
            vec![ChangeEvent::Merge {
                into: "Unified".into(),
                from: vec!["Reasoner".into(), "Skeptic".into()],
            }]
        );
    }

    #[test]
    fn test_legacy_characters_key() {
        let result = AnalysisResult::from_value(json!({
            "characters": [{"name": "The Analyst", "description": "Data", "perspective": "analytical"}]
        }));
        assert_eq!(result.active_characters.len(), 1);
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_missing_active_list_is_empty() {
        let result = AnalysisResult::from_value(json!({"changes": []}));
        assert_eq!(result, AnalysisResult::default());
    }

    #[test]
    fn test_invalid_entries_dropped() {
        let result = AnalysisResult::from_value(json!({
            "activeCharacters": [{"name": ""}, {"description": "nameless"}, {"name": 7}, {"name": "Ok"}],
            "changes": [
                {"type": "rename", "from": "A", "to": "B"},
                {"type": "split", "from": "Unified"},
                {"type": "NEW", "name": "Ok"},
                "garbage"
            ]
        }));
        assert_eq!(result.active_characters, vec![ActiveCharacter::new("Ok", "")]);
        assert_eq!(result.changes, vec![ChangeEvent::New { name: "Ok".into() }]);
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(AnalysisResult::from_value(json!([1, 2])), AnalysisResult::default());
    }

    #[test]
    fn test_from_text_with_fences() {
        let text = "Here you go:\n```json\n{\"activeCharacters\": [{\"name\": \"Skeptic\"}], \"changes\": []}\n```";
        let result = AnalysisResult::from_text(text);
        assert_eq!(result.active_characters[0].name, "Skeptic");
    }

    #[test]
    fn test_from_text_garbage() {
        assert_eq!(AnalysisResult::from_text("no json here"), AnalysisResult::default());
        assert_eq!(AnalysisResult::from_text("{ broken"), AnalysisResult::default());
        assert_eq!(AnalysisResult::from_text("} {"), AnalysisResult::default());
    }

    #[test]
    fn test_claude_error_mapping() {
        assert!(matches!(
            CollaboratorError::from(claude::Error::NoApiKey),
            CollaboratorError::CredentialMissing
        ));
        assert!(matches!(
            CollaboratorError::from(claude::Error::Network("down".into())),
            CollaboratorError::Transport(_)
        ));
        assert!(matches!(
            CollaboratorError::from(claude::Error::Api { status: 529, message: "busy".into() }),
            CollaboratorError::Provider { status: 529, .. }
        ));
    }
}
