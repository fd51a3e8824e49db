//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p decomp-core --test live_anthropic -- --ignored --nocapture`

use decomp_core::testing::assert_unique_active_names;
use decomp_core::{MemoryGateway, Orchestrator, ProviderConfig, ProviderKind, SubmitMode};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

fn live_orchestrator() -> Orchestrator {
    let config = ProviderConfig::from_env()
        .with_kind(ProviderKind::Anthropic)
        .with_max_tokens(512);
    Orchestrator::from_config(&config, Arc::new(MemoryGateway::new()))
}

#[tokio::test]
#[ignore]
async fn test_live_turn_produces_characters() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let orch = live_orchestrator();
    let outcome = orch
        .submit("Should I take the job offer in another city?", SubmitMode::Ai)
        .await
        .expect("turn should complete");

    println!("Reply: {}", outcome.reply.content);
    for character in &outcome.characters {
        println!("  {} - {}", character.name, character.description);
    }

    assert!(!outcome.reply.content.is_empty());
    assert_unique_active_names(&orch.snapshot().await.characters);
}

#[tokio::test]
#[ignore]
async fn test_live_fork_and_continue() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let orch = live_orchestrator();
    let outcome = orch
        .submit("I keep putting off writing my thesis.", SubmitMode::Ai)
        .await
        .expect("first turn");
    let Some(first) = outcome.characters.first() else {
        eprintln!("Analysis returned no characters; nothing to fork");
        return;
    };

    orch.fork(&[first.name.clone()]).await.expect("fork");
    orch.submit("Tell me more.", SubmitMode::Ai)
        .await
        .expect("turn on fork");

    let branch = orch.snapshot().await;
    assert_eq!(branch.messages.len(), 4);
    assert_unique_active_names(&branch.characters);
}
