//! Turn orchestration.
//!
//! A turn appends the submitted message, asks the generator for a reply (AI
//! mode only), asks the analyzer to decompose the reply, and reconciles the
//! branch roster with the result.
//!
//! ```text
//! Idle ─► Submitting ─► Generating ─► Analyzing ─► Idle
//!                 └──── (human mode) ────┘
//! ```
//!
//! All methods take `&self`. The forest lock is never held across a
//! collaborator call, so the user can keep navigating while a turn is in
//! flight; the turn still writes to the branch it started on.

use crate::collab::{Analyzer, CollaboratorError, Generator};
use crate::config::ProviderConfig;
use crate::id::BranchId;
use crate::model::{Branch, BranchSnapshot, ChangeEvent, Character, Message};
use crate::persist::{ForestDocument, PersistError, PersistenceGateway};
use crate::provider::build_providers;
use crate::reconcile::reconcile;
use crate::store::{BranchStore, StoreError, TreeRow};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex;

/// Where the orchestrator is in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Submitting,
    Generating,
    Analyzing,
}

/// Who authored the submitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    /// The text is the user's; the generator writes the reply.
    #[default]
    Ai,
    /// The text is the assistant's reply itself, written by a human.
    Human,
}

/// Why a submit was refused before anything happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Busy,
    EmptyInput,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Busy => write!(f, "a turn is already in progress"),
            Rejection::EmptyInput => write!(f, "input is empty"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    /// Nothing was changed.
    #[error("Turn rejected: {0}")]
    Rejected(Rejection),

    /// The user message stays appended.
    #[error("Generation failed: {0}")]
    Generation(#[source] CollaboratorError),

    /// Messages appended so far stay appended.
    #[error("Analysis failed: {0}")]
    Analysis(#[source] CollaboratorError),

    /// The target branch disappeared mid-turn (reset or import).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TurnError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, TurnError::Rejected(_))
    }
}

#[derive(Debug, Error)]
pub enum ForkError {
    #[error("Select at least one character to fork with")]
    NoCharactersSelected,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The branch the turn wrote to.
    pub branch: BranchId,
    /// The assistant message appended this turn.
    pub reply: Message,
    /// Active characters after reconciliation.
    pub characters: Vec<Character>,
    /// Change events reported by the analysis.
    pub changes: Vec<ChangeEvent>,
}

/// Forest plus the character names picked to seed a fork or steer generation.
struct Session {
    store: BranchStore,
    selection: Vec<String>,
}

/// Marks the orchestrator busy for the lifetime of a turn.
struct TurnGuard<'a> {
    state: &'a StdMutex<TurnState>,
}

impl<'a> TurnGuard<'a> {
    fn begin(state: &'a StdMutex<TurnState>) -> Option<Self> {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != TurnState::Idle {
            return None;
        }
        *current = TurnState::Submitting;
        Some(Self { state })
    }

    fn advance(&self, next: TurnState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.advance(TurnState::Idle);
    }
}

pub struct Orchestrator {
    session: Mutex<Session>,
    state: StdMutex<TurnState>,
    generator: Arc<dyn Generator>,
    analyzer: Arc<dyn Analyzer>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        analyzer: Arc<dyn Analyzer>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            session: Mutex::new(Session {
                store: BranchStore::new(),
                selection: Vec::new(),
            }),
            state: StdMutex::new(TurnState::Idle),
            generator,
            analyzer,
            gateway,
        }
    }

    /// Build collaborators from a provider configuration.
    pub fn from_config(config: &ProviderConfig, gateway: Arc<dyn PersistenceGateway>) -> Self {
        let (generator, analyzer) = build_providers(config);
        Self::new(generator, analyzer, gateway)
    }

    /// Start from an existing forest instead of an empty root.
    pub fn with_store(self, store: BranchStore) -> Self {
        Self {
            session: Mutex::new(Session {
                store,
                selection: Vec::new(),
            }),
            ..self
        }
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.state() != TurnState::Idle
    }

    /// Load the saved forest, if any. Returns whether something was restored.
    ///
    /// A stored document that fails to load or validate is logged and
    /// ignored; the current forest stays in place.
    pub async fn restore(&self) -> bool {
        let document = match self.gateway.load().await {
            Ok(Some(document)) => document,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "could not load saved forest");
                return false;
            }
        };

        let mut session = self.session.lock().await;
        match session.store.import(document) {
            Ok(()) => {
                session.selection.clear();
                tracing::info!(branches = session.store.len(), "restored saved forest");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "saved forest is invalid; starting fresh");
                false
            }
        }
    }

    /// Run one turn against the current branch.
    pub async fn submit(&self, text: &str, mode: SubmitMode) -> Result<TurnOutcome, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::Rejected(Rejection::EmptyInput));
        }
        let guard = TurnGuard::begin(&self.state).ok_or(TurnError::Rejected(Rejection::Busy))?;

        let result = self.run_turn(&guard, text, mode).await;
        // Partial progress is kept, so it is saved either way.
        self.persist().await;
        result
    }

    async fn run_turn(
        &self,
        guard: &TurnGuard<'_>,
        text: &str,
        mode: SubmitMode,
    ) -> Result<TurnOutcome, TurnError> {
        let (target, transcript, selected) = {
            let mut session = self.session.lock().await;
            let target = session.store.current_id().clone();
            let message = match mode {
                SubmitMode::Ai => Message::user(text),
                SubmitMode::Human => Message::assistant(text),
            };
            session.store.append_message(&target, message)?;
            let transcript = session
                .store
                .get(&target)
                .map(|b| b.messages.clone())
                .unwrap_or_default();
            (target, transcript, session.selection.clone())
        };
        tracing::info!(branch = %target, ?mode, "turn started");

        let reply = match mode {
            SubmitMode::Human => Message::assistant(text),
            SubmitMode::Ai => {
                guard.advance(TurnState::Generating);
                let generation = self
                    .generator
                    .generate(&transcript, &selected)
                    .await
                    .map_err(|e| {
                        tracing::warn!(branch = %target, error = %e, "generation failed");
                        TurnError::Generation(e)
                    })?;
                let reply = Message::assistant(generation.content);
                self.session
                    .lock()
                    .await
                    .store
                    .append_message(&target, reply.clone())?;
                reply
            }
        };

        guard.advance(TurnState::Analyzing);
        let roster = self.roster_of(&target).await?;
        let analysis = self
            .analyzer
            .analyze(&reply.content, &roster)
            .await
            .map_err(|e| {
                tracing::warn!(branch = %target, error = %e, "analysis failed");
                TurnError::Analysis(e)
            })?;

        let mut session = self.session.lock().await;
        let existing = session
            .store
            .get(&target)
            .map(|b| b.characters.clone())
            .ok_or_else(|| StoreError::UnknownBranch(target.clone()))?;
        let reconciliation = reconcile(&target, &existing, &analysis);
        let characters: Vec<Character> = reconciliation.active().cloned().collect();
        let changes = reconciliation.changes.clone();
        session.store.apply_reconciliation(&target, reconciliation)?;
        // Picks made since submit belong to the next turn.
        if session.selection == selected {
            session.selection.clear();
        }

        tracing::info!(
            branch = %target,
            active = characters.len(),
            changes = changes.len(),
            "turn finished"
        );
        Ok(TurnOutcome {
            branch: target,
            reply,
            characters,
            changes,
        })
    }

    async fn roster_of(&self, id: &BranchId) -> Result<Vec<Character>, StoreError> {
        self.session
            .lock()
            .await
            .store
            .get(id)
            .map(|b| b.characters.clone())
            .ok_or_else(|| StoreError::UnknownBranch(id.clone()))
    }

    /// Fork the current branch, carrying over the named active characters,
    /// and switch to the new branch.
    pub async fn fork(&self, names: &[String]) -> Result<BranchId, ForkError> {
        if names.iter().all(|n| n.trim().is_empty()) {
            return Err(ForkError::NoCharactersSelected);
        }

        let id = {
            let mut session = self.session.lock().await;
            let current = session.store.current();
            let parent = current.id.clone();
            let snapshot = BranchSnapshot {
                messages: current.messages.clone(),
                characters: current
                    .active_characters()
                    .filter(|c| names.iter().any(|n| c.matches_name(n)))
                    .cloned()
                    .collect(),
            };
            let id = session.store.create(&parent, snapshot)?;
            session.store.select(&id)?;
            session.selection.clear();
            id
        };

        tracing::info!(branch = %id, "forked branch");
        self.persist().await;
        Ok(id)
    }

    /// Fork with the pending character selection.
    pub async fn fork_selected(&self) -> Result<BranchId, ForkError> {
        let names = self.selected_characters().await;
        self.fork(&names).await
    }

    /// Toggle a character in the pending selection.
    ///
    /// Returns the new selection state, or `None` when the current branch
    /// has no active character by that name.
    pub async fn toggle_character(&self, name: &str) -> Option<bool> {
        let mut session = self.session.lock().await;
        let canonical = session
            .store
            .current()
            .active_characters()
            .find(|c| c.matches_name(name))?
            .name
            .clone();

        if let Some(pos) = session.selection.iter().position(|n| *n == canonical) {
            session.selection.remove(pos);
            Some(false)
        } else {
            session.selection.push(canonical);
            Some(true)
        }
    }

    pub async fn selected_characters(&self) -> Vec<String> {
        self.session.lock().await.selection.clone()
    }

    pub async fn clear_selection(&self) {
        self.session.lock().await.selection.clear();
    }

    /// Switch the current branch. Does not affect a turn in flight.
    pub async fn select(&self, id: &BranchId) -> Result<(), StoreError> {
        {
            let mut session = self.session.lock().await;
            session.store.select(id)?;
            session.selection.clear();
        }
        self.persist().await;
        Ok(())
    }

    pub async fn rename(&self, id: &BranchId, name: &str) -> Result<bool, StoreError> {
        let renamed = self.session.lock().await.store.rename(id, name)?;
        if renamed {
            self.persist().await;
        }
        Ok(renamed)
    }

    pub async fn rename_current(&self, name: &str) -> Result<bool, StoreError> {
        let id = self.current_id().await;
        self.rename(&id, name).await
    }

    /// Collapse the forest to a single empty root and clear saved state.
    pub async fn reset(&self) {
        {
            let mut session = self.session.lock().await;
            session.store.reset();
            session.selection.clear();
        }
        if let Err(e) = self.gateway.clear().await {
            tracing::warn!(error = %e, "failed to clear saved forest");
        }
    }

    pub async fn export_document(&self) -> ForestDocument {
        self.session.lock().await.store.export()
    }

    pub async fn export_json(&self) -> Result<String, PersistError> {
        self.export_document().await.to_json_pretty()
    }

    /// Replace the forest with a user-supplied document. All or nothing.
    pub async fn import_json(&self, json: &str) -> Result<(), StoreError> {
        {
            let mut session = self.session.lock().await;
            session.store.import_json(json)?;
            session.selection.clear();
        }
        self.persist().await;
        Ok(())
    }

    pub async fn current_id(&self) -> BranchId {
        self.session.lock().await.store.current_id().clone()
    }

    /// Copy of the current branch.
    pub async fn snapshot(&self) -> Branch {
        self.session.lock().await.store.current().clone()
    }

    pub async fn branch(&self, id: &BranchId) -> Option<Branch> {
        self.session.lock().await.store.get(id).cloned()
    }

    pub async fn tree(&self) -> Vec<TreeRow> {
        self.session.lock().await.store.tree()
    }

    pub async fn find_branch(&self, prefix: &str) -> Option<BranchId> {
        self.session.lock().await.store.find_by_prefix(prefix).cloned()
    }

    /// Save the forest. Failures are logged, never surfaced.
    async fn persist(&self) {
        let document = self.export_document().await;
        if let Err(e) = self.gateway.save(&document).await {
            tracing::warn!(error = %e, "failed to save forest");
        }
    }
}
