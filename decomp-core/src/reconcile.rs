//! Character reconciliation.
//!
//! Folds one turn's [`AnalysisResult`] into a branch roster while keeping
//! character identities stable across renames, merges and splits.
//!
//! Order of operations:
//!
//! 1. change events, in the order supplied
//! 2. the analysis' active list, matched by name
//! 3. everything not matched in step 2 is deactivated
//!
//! Applying changes first means a merge or split has already settled which
//! entity owns a name by the time the active list is matched, so the match
//! step reuses that entity instead of minting a duplicate.

use crate::collab::AnalysisResult;
use crate::id::BranchId;
use crate::model::{Character, ChangeEvent};
use std::collections::HashSet;

/// A reconciled roster plus the change events that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Full roster, active and inactive.
    pub roster: Vec<Character>,
    /// Stored verbatim on the branch for display.
    pub changes: Vec<ChangeEvent>,
}

impl Reconciliation {
    pub fn active(&self) -> impl Iterator<Item = &Character> {
        self.roster.iter().filter(|c| c.active)
    }
}

/// Working copy of a roster during reconciliation.
struct Roster {
    characters: Vec<Character>,
}

impl Roster {
    /// Locate the entity currently owning `name`.
    ///
    /// An active holder wins. Otherwise the most recently added inactive
    /// holder is revived, so a returning name keeps its old identity.
    fn find(&self, name: &str) -> Option<usize> {
        self.characters
            .iter()
            .position(|c| c.active && c.matches_name(name))
            .or_else(|| self.characters.iter().rposition(|c| c.matches_name(name)))
    }

    fn find_or_create(&mut self, name: &str) -> usize {
        if let Some(idx) = self.find(name) {
            return idx;
        }
        self.characters.push(Character::new(name.trim(), ""));
        self.characters.len() - 1
    }

    fn activate(&mut self, name: &str) -> usize {
        let idx = self.find_or_create(name);
        self.characters[idx].active = true;
        idx
    }

    fn deactivate(&mut self, name: &str) {
        if let Some(idx) = self.find(name) {
            self.characters[idx].active = false;
        }
    }

    fn apply(&mut self, change: &ChangeEvent) {
        match change {
            ChangeEvent::New { name } => {
                self.activate(name);
            }
            ChangeEvent::Disappear { name } => self.deactivate(name),
            ChangeEvent::Merge { into, from } => {
                let target = self.activate(into);
                for name in from {
                    // A source that shares the target's name is the target itself.
                    if self.find(name) != Some(target) {
                        self.deactivate(name);
                    }
                }
            }
            ChangeEvent::Split { from, into } => {
                self.deactivate(from);
                for name in into {
                    self.activate(name);
                }
            }
        }
    }
}

/// Reconcile `existing` against one analysis result. Never fails.
pub fn reconcile(
    branch: &BranchId,
    existing: &[Character],
    analysis: &AnalysisResult,
) -> Reconciliation {
    let mut roster = Roster {
        characters: existing.to_vec(),
    };

    for change in &analysis.changes {
        roster.apply(change);
    }

    // Tracked by position: imported rosters may repeat an id.
    let mut matched: HashSet<usize> = HashSet::new();
    for entry in &analysis.active_characters {
        let idx = roster.activate(&entry.name);
        roster.characters[idx].description = entry.description.clone();
        matched.insert(idx);
    }

    for (idx, character) in roster.characters.iter_mut().enumerate() {
        if !matched.contains(&idx) {
            character.active = false;
        }
    }

    tracing::debug!(
        branch = %branch,
        roster = roster.characters.len(),
        active = matched.len(),
        changes = analysis.changes.len(),
        "reconciled characters"
    );

    Reconciliation {
        roster: roster.characters,
        changes: analysis.changes.clone(),
    }
}
