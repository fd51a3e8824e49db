//! The branch forest.
//!
//! Branches live in an id-indexed arena with parent pointers. A separate
//! creation-order list drives export and traversal; since a branch can only
//! be created from one that already exists, walking that list always visits
//! parents before children.

use crate::id::BranchId;
use crate::model::{Branch, BranchSnapshot, Message};
use crate::persist::ForestDocument;
use crate::reconcile::Reconciliation;
use std::collections::HashMap;
use thiserror::Error;

/// Name given to the root of a fresh forest.
pub const ROOT_NAME: &str = "Main";

/// Errors from forest operations. None of them leave a partial mutation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parent branch not found: {0}")]
    InvalidParent(BranchId),

    #[error("Branch not found: {0}")]
    UnknownBranch(BranchId),

    #[error("Could not import forest: {0}")]
    ImportParse(String),
}

/// One line of the rendered branch tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: BranchId,
    pub name: String,
    pub depth: usize,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct BranchStore {
    branches: HashMap<BranchId, Branch>,
    order: Vec<BranchId>,
    current: BranchId,
}

impl Default for BranchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchStore {
    /// A forest holding a single empty root, selected.
    pub fn new() -> Self {
        let root = Branch::root(ROOT_NAME);
        let id = root.id.clone();
        Self {
            branches: HashMap::from([(id.clone(), root)]),
            order: vec![id.clone()],
            current: id,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &BranchId) -> Option<&Branch> {
        self.branches.get(id)
    }

    pub fn current_id(&self) -> &BranchId {
        &self.current
    }

    pub fn current(&self) -> &Branch {
        // `current` always names a branch in the arena.
        &self.branches[&self.current]
    }

    pub fn root(&self) -> &Branch {
        &self.branches[&self.order[0]]
    }

    /// Branches in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Branch> {
        self.order.iter().filter_map(|id| self.branches.get(id))
    }

    /// Create a branch under `parent`, seeded from `snapshot`.
    ///
    /// Messages are copied as-is; only active characters carry over.
    pub fn create(
        &mut self,
        parent: &BranchId,
        snapshot: BranchSnapshot,
    ) -> Result<BranchId, StoreError> {
        if !self.branches.contains_key(parent) {
            return Err(StoreError::InvalidParent(parent.clone()));
        }

        let branch = Branch {
            id: BranchId::new(),
            name: format!("Branch {}", self.order.len()),
            parent_id: Some(parent.clone()),
            messages: snapshot.messages,
            characters: snapshot.characters.into_iter().filter(|c| c.active).collect(),
            changes: Vec::new(),
        };
        let id = branch.id.clone();

        tracing::debug!(branch = %id, parent = %parent, "created branch");
        self.order.push(id.clone());
        self.branches.insert(id.clone(), branch);
        Ok(id)
    }

    pub fn select(&mut self, id: &BranchId) -> Result<(), StoreError> {
        if !self.branches.contains_key(id) {
            return Err(StoreError::UnknownBranch(id.clone()));
        }
        self.current = id.clone();
        Ok(())
    }

    /// Rename a branch. Returns `Ok(false)` and keeps the old name when the
    /// new one is blank.
    pub fn rename(&mut self, id: &BranchId, name: &str) -> Result<bool, StoreError> {
        let branch = self.branch_mut(id)?;
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        branch.name = name.to_string();
        Ok(true)
    }

    /// Discard everything and start over with a single empty root.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn export(&self) -> ForestDocument {
        ForestDocument::from_forest(self.iter(), &self.current)
    }

    /// Replace the whole forest. On error the store is left untouched.
    pub fn import(&mut self, document: ForestDocument) -> Result<(), StoreError> {
        let (branches, current) = document
            .into_forest()
            .map_err(|e| StoreError::ImportParse(e.to_string()))?;

        let order: Vec<BranchId> = branches.iter().map(|b| b.id.clone()).collect();
        *self = Self {
            branches: branches.into_iter().map(|b| (b.id.clone(), b)).collect(),
            order,
            current,
        };
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), StoreError> {
        let document =
            ForestDocument::from_json(json).map_err(|e| StoreError::ImportParse(e.to_string()))?;
        self.import(document)
    }

    pub fn append_message(&mut self, id: &BranchId, message: Message) -> Result<(), StoreError> {
        self.branch_mut(id)?.messages.push(message);
        Ok(())
    }

    /// Store a reconciled roster and that turn's change events.
    pub fn apply_reconciliation(
        &mut self,
        id: &BranchId,
        reconciliation: Reconciliation,
    ) -> Result<(), StoreError> {
        let branch = self.branch_mut(id)?;
        branch.characters = reconciliation.roster;
        branch.changes = reconciliation.changes;
        Ok(())
    }

    /// Direct children, in creation order.
    pub fn children(&self, id: &BranchId) -> Vec<&Branch> {
        self.iter()
            .filter(|b| b.parent_id.as_ref() == Some(id))
            .collect()
    }

    /// Parent, grandparent, ... up to the root.
    pub fn ancestors(&self, id: &BranchId) -> Vec<BranchId> {
        let mut chain = Vec::new();
        let mut cursor = self.branches.get(id).and_then(|b| b.parent_id.clone());
        while let Some(parent) = cursor {
            if chain.len() >= self.order.len() {
                break;
            }
            cursor = self.branches.get(&parent).and_then(|b| b.parent_id.clone());
            chain.push(parent);
        }
        chain
    }

    /// Pre-order listing of the forest for display.
    pub fn tree(&self) -> Vec<TreeRow> {
        let mut children: HashMap<&BranchId, Vec<&Branch>> = HashMap::new();
        let mut roots = Vec::new();
        for branch in self.iter() {
            match &branch.parent_id {
                Some(parent) => children.entry(parent).or_default().push(branch),
                None => roots.push(branch),
            }
        }

        let mut rows = Vec::with_capacity(self.order.len());
        let mut stack: Vec<(&Branch, usize)> = roots.into_iter().rev().map(|b| (b, 0)).collect();
        while let Some((branch, depth)) = stack.pop() {
            rows.push(TreeRow {
                id: branch.id.clone(),
                name: branch.name.clone(),
                depth,
                is_current: branch.id == self.current,
            });
            if let Some(kids) = children.get(&branch.id) {
                stack.extend(kids.iter().rev().map(|b| (*b, depth + 1)));
            }
        }
        rows
    }

    /// Resolve a branch from a unique id prefix.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<&BranchId> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self.order.iter().filter(|id| id.as_str().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    fn branch_mut(&mut self, id: &BranchId) -> Result<&mut Branch, StoreError> {
        self.branches
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownBranch(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Character;

    fn snapshot_of(store: &BranchStore, id: &BranchId) -> BranchSnapshot {
        BranchSnapshot::from(store.get(id).unwrap())
    }

    #[test]
    fn test_new_store_has_selected_root() {
        let store = BranchStore::new();
        assert_eq!(store.len(), 1);
        assert!(store.current().is_root());
        assert_eq!(store.current().name, ROOT_NAME);
        assert!(store.current().messages.is_empty());
        assert_eq!(store.root().id, *store.current_id());
    }

    #[test]
    fn test_create_copies_messages_and_active_characters() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        let mut gone = Character::new("Gone", "");
        gone.active = false;

        let snapshot = BranchSnapshot {
            messages: vec![Message::user("m1"), Message::assistant("m2")],
            characters: vec![Character::new("Kept", ""), gone],
        };
        let child = store.create(&root, snapshot).unwrap();

        let branch = store.get(&child).unwrap();
        assert_eq!(branch.parent_id.as_ref(), Some(&root));
        assert_eq!(branch.messages.len(), 2);
        assert_eq!(branch.active_names(), vec!["Kept".to_string()]);
        assert_eq!(branch.characters.len(), 1);
        assert_eq!(branch.name, "Branch 1");
        assert_eq!(store.current_id(), &root, "create does not select");
    }

    #[test]
    fn test_create_rejects_unknown_parent() {
        let mut store = BranchStore::new();
        let err = store
            .create(&BranchId::from("nope"), BranchSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fork_isolation() {
        let mut store = BranchStore::new();
        let b = store.current_id().clone();
        store.append_message(&b, Message::user("m1")).unwrap();
        store.append_message(&b, Message::assistant("m2")).unwrap();

        let c = store.create(&b, snapshot_of(&store, &b)).unwrap();
        store.append_message(&b, Message::user("m3")).unwrap();

        assert_eq!(
            store.get(&c).unwrap().messages,
            vec![Message::user("m1"), Message::assistant("m2")]
        );
        assert_eq!(store.get(&b).unwrap().messages.len(), 3);
    }

    #[test]
    fn test_select() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        let child = store.create(&root, BranchSnapshot::default()).unwrap();

        store.select(&child).unwrap();
        assert_eq!(store.current_id(), &child);

        let err = store.select(&BranchId::from("ghost")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownBranch(_)));
        assert_eq!(store.current_id(), &child);
    }

    #[test]
    fn test_rename_trims_and_rejects_blank() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();

        assert!(store.rename(&root, "  Opening  ").unwrap());
        assert_eq!(store.current().name, "Opening");

        assert!(!store.rename(&root, "   ").unwrap());
        assert_eq!(store.current().name, "Opening");

        assert!(store.rename(&BranchId::from("ghost"), "x").is_err());
    }

    #[test]
    fn test_reset() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        store.append_message(&root, Message::user("hi")).unwrap();
        let child = store.create(&root, BranchSnapshot::default()).unwrap();
        store.select(&child).unwrap();

        store.reset();
        assert_eq!(store.len(), 1);
        assert!(store.current().is_root());
        assert!(store.current().messages.is_empty());
        assert_ne!(store.current_id(), &root);
    }

    #[test]
    fn test_tree_is_preorder_with_depths() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        let a = store.create(&root, BranchSnapshot::default()).unwrap();
        let b = store.create(&root, BranchSnapshot::default()).unwrap();
        let a1 = store.create(&a, BranchSnapshot::default()).unwrap();
        store.select(&a1).unwrap();

        let rows = store.tree();
        let ids: Vec<_> = rows.iter().map(|r| (r.id.clone(), r.depth)).collect();
        assert_eq!(ids, vec![(root, 0), (a, 1), (a1.clone(), 2), (b, 1)]);
        assert!(rows.iter().filter(|r| r.is_current).all(|r| r.id == a1));
    }

    #[test]
    fn test_deep_tree_does_not_recurse() {
        let mut store = BranchStore::new();
        let mut tip = store.current_id().clone();
        for _ in 0..10_000 {
            tip = store.create(&tip, BranchSnapshot::default()).unwrap();
        }

        let rows = store.tree();
        assert_eq!(rows.len(), 10_001);
        assert_eq!(rows.last().unwrap().depth, 10_000);
        assert_eq!(store.ancestors(&tip).len(), 10_000);
    }

    #[test]
    fn test_children_and_ancestors() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        let a = store.create(&root, BranchSnapshot::default()).unwrap();
        let a1 = store.create(&a, BranchSnapshot::default()).unwrap();

        let kids: Vec<_> = store.children(&root).iter().map(|b| b.id.clone()).collect();
        assert_eq!(kids, vec![a.clone()]);
        assert_eq!(store.ancestors(&a1), vec![a, root.clone()]);
        assert!(store.ancestors(&root).is_empty());
    }

    #[test]
    fn test_find_by_prefix() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        assert_eq!(store.find_by_prefix(root.short()), Some(&root));
        assert_eq!(store.find_by_prefix(""), None);
        assert_eq!(store.find_by_prefix("not-a-prefix-of-anything"), None);
        store.reset();
        assert_eq!(store.find_by_prefix(root.short()), None);
    }

    #[test]
    fn test_round_trip() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        store.append_message(&root, Message::user("hi")).unwrap();
        let mut quiet = Character::new("Quiet", "shy");
        quiet.active = false;
        store
            .apply_reconciliation(
                &root,
                Reconciliation {
                    roster: vec![Character::new("Loud", "bold"), quiet],
                    changes: vec![crate::model::ChangeEvent::Disappear { name: "Quiet".into() }],
                },
            )
            .unwrap();
        let child = store.create(&root, snapshot_of(&store, &root)).unwrap();
        store.rename(&child, "Side quest").unwrap();
        store.select(&child).unwrap();

        let json = store.export().to_json_pretty().unwrap();
        let mut restored = BranchStore::new();
        restored.import_json(&json).unwrap();

        assert_eq!(restored.current_id(), store.current_id());
        let original: Vec<_> = store.iter().cloned().collect();
        let copy: Vec<_> = restored.iter().cloned().collect();
        assert_eq!(original, copy);
    }

    #[test]
    fn test_failed_import_leaves_store_untouched() {
        let mut store = BranchStore::new();
        let root = store.current_id().clone();
        store.append_message(&root, Message::user("keep me")).unwrap();

        assert!(matches!(
            store.import_json("{ not json"),
            Err(StoreError::ImportParse(_))
        ));
        let orphan = r#"{"branches":[{"id":"r"},{"id":"x","parentId":"missing"}],"currentBranchId":"r"}"#;
        assert!(store.import_json(orphan).is_err());

        assert_eq!(store.len(), 1);
        assert_eq!(store.current_id(), &root);
        assert_eq!(store.current().messages, vec![Message::user("keep me")]);
    }
}
