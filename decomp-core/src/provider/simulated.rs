//! Offline provider used when no remote model is configured.

use crate::collab::{ActiveCharacter, AnalysisResult, Analyzer, CollaboratorError, Generation, Generator};
use crate::model::{Character, Message};
use async_trait::async_trait;

/// Echoes the last message back and always reports the same two characters.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider;

impl SimulatedProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for SimulatedProvider {
    async fn generate(
        &self,
        messages: &[Message],
        _selected: &[String],
    ) -> Result<Generation, CollaboratorError> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(Generation::new(format!("[simulated] {last}")))
    }
}

#[async_trait]
impl Analyzer for SimulatedProvider {
    async fn analyze(
        &self,
        _text: &str,
        _roster: &[Character],
    ) -> Result<AnalysisResult, CollaboratorError> {
        Ok(AnalysisResult::new(
            vec![
                ActiveCharacter::new("Reasoner", "Walks through a line of reasoning."),
                ActiveCharacter::new("Skeptic", "Questions assumptions."),
            ],
            Vec::new(),
        ))
    }
}
