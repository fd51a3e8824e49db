//! Branching conversations with a reconciled cast of characters.
//!
//! This crate provides:
//! - A forest of conversation branches, each with its own transcript and roster
//! - Reconciliation of analyzed replies into a stable character roster
//! - A turn orchestrator over pluggable generation and analysis collaborators
//! - Forest persistence as a JSON document
//!
//! # Quick Start
//!
//! ```ignore
//! use decomp_core::{JsonFileGateway, Orchestrator, ProviderConfig, SubmitMode};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Arc::new(JsonFileGateway::new("forest.json"));
//!     let orchestrator = Orchestrator::from_config(&ProviderConfig::from_env(), gateway);
//!     orchestrator.restore().await;
//!
//!     let outcome = orchestrator.submit("What should I do next?", SubmitMode::Ai).await?;
//!     println!("{}", outcome.reply.content);
//!     for character in &outcome.characters {
//!         println!("  {}", character.name);
//!     }
//!
//!     orchestrator.fork(&["Skeptic".to_string()]).await?;
//!     Ok(())
//! }
//! ```

pub mod collab;
pub mod config;
pub mod id;
pub mod model;
pub mod orchestrator;
pub mod persist;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod testing;

// Primary public API
pub use collab::{ActiveCharacter, AnalysisResult, Analyzer, CollaboratorError, Generation, Generator};
pub use config::{ProviderConfig, ProviderKind};
pub use id::{BranchId, CharacterId};
pub use model::{Branch, BranchSnapshot, ChangeEvent, Character, Message, Role};
pub use orchestrator::{
    ForkError, Orchestrator, Rejection, SubmitMode, TurnError, TurnOutcome, TurnState,
};
pub use persist::{ForestDocument, JsonFileGateway, MemoryGateway, PersistError, PersistenceGateway};
pub use reconcile::{reconcile, Reconciliation};
pub use store::{BranchStore, StoreError, TreeRow, ROOT_NAME};
pub use testing::{GateGenerator, MockAnalyzer, MockGenerator};
