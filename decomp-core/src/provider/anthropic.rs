//! Collaborators backed by the Anthropic Messages API.

use crate::collab::{AnalysisResult, Analyzer, CollaboratorError, Generation, Generator};
use crate::config::ProviderConfig;
use crate::model::{Character, Message, Role};
use async_trait::async_trait;
use claude::{Claude, Request};

const GENERATION_PROMPT: &str = "You are a conversational partner whose replies are \
written as a small cast of distinct inner voices, each with its own perspective. \
Let the voices speak in turn within a single reply.";

const ANALYSIS_PROMPT: &str = "You decompose a reply into the distinct voices \
(characters) speaking in it. Respond with JSON only, shaped as \
{\"activeCharacters\": [{\"name\": string, \"description\": string}], \
\"changes\": [...]}. Each change is one of \
{\"type\": \"new\", \"name\"}, {\"type\": \"disappear\", \"name\"}, \
{\"type\": \"merge\", \"into\", \"from\": [names]} or \
{\"type\": \"split\", \"from\", \"into\": [names]}, describing how the cast moved \
relative to the previous characters. Reuse previous names for continuing voices.";

/// Placeholder opening turn when a branch starts with an assistant message.
const OPENING: &str = "(The conversation begins.)";

pub struct AnthropicProvider {
    client: Option<Claude>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = config.api_key.as_deref().and_then(|key| match Claude::new(key) {
            Ok(client) => Some(match &config.model {
                Some(model) => client.with_model(model),
                None => client,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "anthropic client unavailable");
                None
            }
        });

        Self {
            client,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn client(&self) -> Result<&Claude, CollaboratorError> {
        self.client.as_ref().ok_or(CollaboratorError::CredentialMissing)
    }
}

/// Convert a branch transcript into a strictly alternating exchange that
/// opens with a user turn, merging runs of same-role messages.
fn to_exchange(messages: &[Message]) -> Vec<claude::Message> {
    let mut exchange: Vec<claude::Message> = Vec::with_capacity(messages.len() + 1);
    for message in messages {
        let role = match message.role {
            Role::User => claude::Role::User,
            Role::Assistant => claude::Role::Assistant,
        };
        if exchange.is_empty() && role == claude::Role::Assistant {
            exchange.push(claude::Message::user(OPENING));
        }
        if let Some(last) = exchange.last_mut().filter(|last| last.role == role) {
            last.text.push_str("\n\n");
            last.text.push_str(&message.content);
            continue;
        }
        exchange.push(claude::Message {
            role,
            text: message.content.clone(),
        });
    }
    exchange
}

fn describe_roster(roster: &[Character]) -> String {
    if roster.is_empty() {
        return "(none yet)".to_string();
    }
    roster
        .iter()
        .map(|c| {
            let status = if c.active { "active" } else { "inactive" };
            format!("- {} ({status}): {}", c.name, c.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Generator for AnthropicProvider {
    async fn generate(
        &self,
        messages: &[Message],
        selected: &[String],
    ) -> Result<Generation, CollaboratorError> {
        let client = self.client()?;

        let mut system = GENERATION_PROMPT.to_string();
        if !selected.is_empty() {
            system.push_str(&format!(
                "\n\nContinue the conversation through these voices only: {}.",
                selected.join(", ")
            ));
        }

        let mut request = Request::new(to_exchange(messages))
            .with_system(system)
            .with_max_tokens(self.max_tokens);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = client.complete(request).await?;
        Ok(Generation::new(response.text))
    }
}

#[async_trait]
impl Analyzer for AnthropicProvider {
    async fn analyze(
        &self,
        text: &str,
        roster: &[Character],
    ) -> Result<AnalysisResult, CollaboratorError> {
        let client = self.client()?;

        let prompt = format!(
            "Previous characters:\n{}\n\nReply to analyze:\n{text}",
            describe_roster(roster)
        );
        let request = Request::new(vec![claude::Message::user(prompt)])
            .with_system(ANALYSIS_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.0);

        let response = client.complete(request).await?;
        Ok(AnalysisResult::from_text(&response.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[tokio::test]
    async fn test_missing_key_is_credential_error() {
        let provider = AnthropicProvider::new(&ProviderConfig::new(ProviderKind::Anthropic));
        let err = provider.generate(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::CredentialMissing));

        let err = provider.analyze("text", &[]).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::CredentialMissing));
    }

    #[test]
    fn test_exchange_alternates() {
        let exchange = to_exchange(&[
            Message::assistant("opening line"),
            Message::assistant("second voice"),
            Message::user("question"),
            Message::user("follow-up"),
        ]);

        let roles: Vec<_> = exchange.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![claude::Role::User, claude::Role::Assistant, claude::Role::User]
        );
        assert_eq!(exchange[0].text, OPENING);
        assert_eq!(exchange[1].text, "opening line\n\nsecond voice");
        assert_eq!(exchange[2].text, "question\n\nfollow-up");
    }

    #[test]
    fn test_describe_roster() {
        let mut quiet = Character::new("Skeptic", "Doubts");
        quiet.active = false;
        let text = describe_roster(&[Character::new("Reasoner", "Logic"), quiet]);
        assert!(text.contains("- Reasoner (active): Logic"));
        assert!(text.contains("- Skeptic (inactive): Doubts"));
        assert_eq!(describe_roster(&[]), "(none yet)");
    }
}
