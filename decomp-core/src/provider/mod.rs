//! Concrete generation/analysis collaborators.

mod anthropic;
mod simulated;

pub use anthropic::AnthropicProvider;
pub use simulated::SimulatedProvider;

use crate::collab::{Analyzer, Generator};
use crate::config::{ProviderConfig, ProviderKind};
use std::sync::Arc;

/// Build the generator/analyzer pair for a configuration.
///
/// A missing credential does not fail here: the remote provider reports
/// `CredentialMissing` on first use and the turn aborts then.
pub fn build_providers(config: &ProviderConfig) -> (Arc<dyn Generator>, Arc<dyn Analyzer>) {
    match config.kind {
        ProviderKind::Simulated => {
            let provider = Arc::new(SimulatedProvider::new());
            let generator: Arc<dyn Generator> = provider.clone();
            let analyzer: Arc<dyn Analyzer> = provider;
            (generator, analyzer)
        }
        ProviderKind::Anthropic => {
            let provider = Arc::new(AnthropicProvider::new(config));
            let generator: Arc<dyn Generator> = provider.clone();
            let analyzer: Arc<dyn Analyzer> = provider;
            (generator, analyzer)
        }
    }
}
