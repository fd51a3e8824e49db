//! Forest persistence: the export/import document and the gateways that
//! store it.
//!
//! The same [`ForestDocument`] shape is used for the auto-saved forest and for
//! files the user exports or imports by hand, and both paths go through the
//! same normalization and integrity checks.

use crate::id::{BranchId, CharacterId};
use crate::model::{Branch, ChangeEvent, Character, Message};
use crate::store::ROOT_NAME;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid forest: {0}")]
    Integrity(String),
}

/// Serialized forest, exactly as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestDocument {
    pub branches: Vec<BranchRecord>,
    #[serde(default)]
    pub current_branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    #[serde(default)]
    pub changes: Vec<ChangeEvent>,
}

/// Character as stored. `id` and `active` may be missing in older files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<&Character> for CharacterRecord {
    fn from(c: &Character) -> Self {
        Self {
            id: Some(c.id.to_string()),
            name: c.name.clone(),
            description: c.description.clone(),
            active: Some(c.active),
        }
    }
}

impl From<CharacterRecord> for Character {
    /// Missing id → fresh id; missing `active` → active.
    fn from(record: CharacterRecord) -> Self {
        Self {
            id: record
                .id
                .map(CharacterId::from_string)
                .unwrap_or_default(),
            name: record.name,
            description: record.description,
            active: record.active.unwrap_or(true),
        }
    }
}

impl From<&Branch> for BranchRecord {
    fn from(branch: &Branch) -> Self {
        Self {
            id: branch.id.to_string(),
            name: branch.name.clone(),
            parent_id: branch.parent_id.as_ref().map(ToString::to_string),
            messages: branch.messages.clone(),
            characters: branch.characters.iter().map(CharacterRecord::from).collect(),
            changes: branch.changes.clone(),
        }
    }
}

impl ForestDocument {
    /// Snapshot branches (in creation order) and the current selection.
    pub fn from_forest<'a>(
        branches: impl IntoIterator<Item = &'a Branch>,
        current: &BranchId,
    ) -> Self {
        Self {
            branches: branches.into_iter().map(BranchRecord::from).collect(),
            current_branch_id: Some(current.to_string()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and normalize into branches plus the selected branch id.
    ///
    /// Rules: at least one branch, unique ids, exactly one root, and every
    /// parent appears earlier in the document than its children (which also
    /// rules out cycles). A blank `currentBranchId` selects the root; a
    /// non-blank one must name a branch in the document.
    pub fn into_forest(self) -> Result<(Vec<Branch>, BranchId), PersistError> {
        if self.branches.is_empty() {
            return Err(PersistError::Integrity("document has no branches".into()));
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut root: Option<BranchId> = None;
        let mut branches = Vec::with_capacity(self.branches.len());

        for record in self.branches {
            if record.id.trim().is_empty() {
                return Err(PersistError::Integrity("branch with empty id".into()));
            }
            if seen.contains(&record.id) {
                return Err(PersistError::Integrity(format!(
                    "duplicate branch id {}",
                    record.id
                )));
            }

            let parent_id = record.parent_id.filter(|p| !p.trim().is_empty());
            match &parent_id {
                Some(parent) if !seen.contains(parent) => {
                    return Err(PersistError::Integrity(format!(
                        "branch {} refers to unknown or later parent {parent}",
                        record.id
                    )));
                }
                Some(_) => {}
                None if root.is_some() => {
                    return Err(PersistError::Integrity("more than one root branch".into()));
                }
                None => root = Some(BranchId::from_string(record.id.clone())),
            }

            let name = match record.name.trim() {
                "" if parent_id.is_none() => ROOT_NAME.to_string(),
                "" => format!("Branch {}", branches.len()),
                name => name.to_string(),
            };

            seen.insert(record.id.clone());
            branches.push(Branch {
                id: BranchId::from_string(record.id),
                name,
                parent_id: parent_id.map(BranchId::from_string),
                messages: record.messages,
                characters: normalize_roster(record.characters),
                changes: record.changes,
            });
        }

        let root = root.ok_or_else(|| PersistError::Integrity("no root branch".into()))?;
        let current = match self.current_branch_id.filter(|c| !c.trim().is_empty()) {
            None => root,
            Some(id) if seen.contains(&id) => BranchId::from_string(id),
            Some(id) => {
                return Err(PersistError::Integrity(format!(
                    "current branch {id} is not in the document"
                )));
            }
        };

        Ok((branches, current))
    }
}

/// Normalize character records. A repeated id within one roster is replaced
/// with a fresh one, so every entry stays individually addressable.
fn normalize_roster(records: Vec<CharacterRecord>) -> Vec<Character> {
    let mut ids: HashSet<CharacterId> = HashSet::new();
    records
        .into_iter()
        .map(|record| {
            let mut character = Character::from(record);
            if ids.contains(&character.id) {
                character.id = CharacterId::new();
            }
            ids.insert(character.id.clone());
            character
        })
        .collect()
}

/// Where the forest is kept between runs.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<ForestDocument>, PersistError>;

    async fn save(&self, document: &ForestDocument) -> Result<(), PersistError>;

    async fn clear(&self) -> Result<(), PersistError>;
}

/// Keeps the forest in a single pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    path: PathBuf,
}

impl JsonFileGateway {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileGateway {
    async fn load(&self) -> Result<Option<ForestDocument>, PersistError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(ForestDocument::from_json(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, document: &ForestDocument) -> Result<(), PersistError> {
        let content = document.to_json_pretty()?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process gateway for tests and unsaved sessions.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    document: Mutex<Option<ForestDocument>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a document already stored.
    pub fn with_document(document: ForestDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail, to exercise the logged-not-surfaced path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<ForestDocument> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ForestDocument>> {
        self.document
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load(&self) -> Result<Option<ForestDocument>, PersistError> {
        Ok(self.stored())
    }

    async fn save(&self, document: &ForestDocument) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Io(std::io::Error::other("storage full")));
        }
        *self.slot() = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        *self.slot() = None;
        Ok(())
    }
}
