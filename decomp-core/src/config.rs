//! Provider configuration.
//!
//! Which provider to use and the credential it needs are held in an explicit
//! value handed to the orchestrator at construction, never in global state.

use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the provider.
pub const PROVIDER_ENV: &str = "DECOMP_PROVIDER";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "DECOMP_MODEL";
/// Environment variable holding the Anthropic API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Which collaborator implementation drives generation and analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Offline echo generator with a fixed two-character analysis.
    #[default]
    Simulated,
    /// Anthropic Messages API.
    Anthropic,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "sim" | "offline" => Ok(ProviderKind::Simulated),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Simulated => write!(f, "simulated"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Configuration for the generation and analysis collaborators.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Credential for remote providers. Checked by the provider when called.
    pub api_key: Option<String>,

    /// Model override; the client default is used when unset.
    pub model: Option<String>,

    /// Maximum tokens for generated replies.
    pub max_tokens: usize,

    /// Temperature for generation. Analysis always runs cold.
    pub temperature: Option<f32>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ProviderKind::Simulated)
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            model: None,
            max_tokens: 1024,
            temperature: Some(0.8),
        }
    }

    /// Read `DECOMP_PROVIDER`, `ANTHROPIC_API_KEY` and `DECOMP_MODEL`.
    ///
    /// An unrecognized provider name falls back to the simulated provider.
    pub fn from_env() -> Self {
        let kind = match std::env::var(PROVIDER_ENV) {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to simulated provider");
                ProviderKind::Simulated
            }),
            Err(_) => ProviderKind::Simulated,
        };

        let mut config = Self::new(kind);
        config.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        config.model = std::env::var(MODEL_ENV).ok().filter(|m| !m.trim().is_empty());
        config
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 1.0));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Claude".parse::<ProviderKind>(), Ok(ProviderKind::Anthropic));
        assert_eq!(" simulated ".parse::<ProviderKind>(), Ok(ProviderKind::Simulated));
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new(ProviderKind::Anthropic)
            .with_api_key("sk-test")
            .with_model("claude-3-haiku")
            .with_max_tokens(256)
            .with_temperature(3.0);

        assert_eq!(config.kind, ProviderKind::Anthropic);
        assert_eq!(config.model.as_deref(), Some("claude-3-haiku"));
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.temperature, Some(1.0));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::default().with_api_key("sk-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("redacted"));
    }
}
