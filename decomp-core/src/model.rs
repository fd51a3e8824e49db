//! Shared data model: messages, characters, change events and branches.

use crate::id::{BranchId, CharacterId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation message. Never edited once appended to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A character tracked in a branch roster.
///
/// `id` is the identity anchor. Inactive characters stay in the roster so
/// later forks and the branch history can still refer to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl Character {
    /// Create a new, active character with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            description: description.into(),
            active: true,
        }
    }

    /// Trimmed, case-insensitive name comparison.
    pub fn matches_name(&self, query: &str) -> bool {
        names_match(&self.name, query)
    }
}

pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// How the set of characters changed during one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    /// A character appeared for the first time (or came back).
    New { name: String },
    /// A character stopped taking part.
    Disappear { name: String },
    /// Several characters folded into one.
    Merge { into: String, from: Vec<String> },
    /// One character broke apart into several.
    Split { from: String, into: Vec<String> },
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::New { name } => write!(f, "+ {name}"),
            ChangeEvent::Disappear { name } => write!(f, "- {name}"),
            ChangeEvent::Merge { into, from } => write!(f, "{} => {into}", from.join(" + ")),
            ChangeEvent::Split { from, into } => write!(f, "{from} => {}", into.join(" + ")),
        }
    }
}

/// One node of the branch forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub parent_id: Option<BranchId>,
    pub messages: Vec<Message>,
    pub characters: Vec<Character>,
    /// Change events from the most recent turn only.
    pub changes: Vec<ChangeEvent>,
}

impl Branch {
    /// An empty root branch.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            id: BranchId::new(),
            name: name.into(),
            parent_id: None,
            messages: Vec::new(),
            characters: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn active_characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter().filter(|c| c.active)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.active_characters().map(|c| c.name.clone()).collect()
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

/// The state a new branch is seeded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSnapshot {
    pub messages: Vec<Message>,
    pub characters: Vec<Character>,
}

impl From<&Branch> for BranchSnapshot {
    fn from(branch: &Branch) -> Self {
        Self {
            messages: branch.messages.clone(),
            characters: branch.characters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serde_shape() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_change_event_tags() {
        let merge = ChangeEvent::Merge {
            into: "Unified".into(),
            from: vec!["Reasoner".into(), "Skeptic".into()],
        };
        let json = serde_json::to_value(&merge).unwrap();
        assert_eq!(json["type"], "merge");
        assert_eq!(json["into"], "Unified");

        let parsed: ChangeEvent =
            serde_json::from_value(serde_json::json!({"type": "disappear", "name": "Skeptic"}))
                .unwrap();
        assert_eq!(parsed, ChangeEvent::Disappear { name: "Skeptic".into() });
    }

    #[test]
    fn test_change_event_display() {
        let split = ChangeEvent::Split {
            from: "Unified".into(),
            into: vec!["Reasoner".into(), "Skeptic".into()],
        };
        assert_eq!(split.to_string(), "Unified => Reasoner + Skeptic");
    }

    #[test]
    fn test_name_matching() {
        let c = Character::new("The Skeptic", "");
        assert!(c.matches_name("the skeptic "));
        assert!(!c.matches_name("Skeptic"));
    }

    #[test]
    fn test_branch_helpers() {
        let mut branch = Branch::root("Main");
        branch.messages.push(Message::assistant("a"));
        branch.messages.push(Message::user("b"));
        let mut quiet = Character::new("Quiet", "");
        quiet.active = false;
        branch.characters = vec![Character::new("Loud", ""), quiet];

        assert!(branch.is_root());
        assert_eq!(branch.last_assistant_message().unwrap().content, "a");
        assert_eq!(branch.active_names(), vec!["Loud".to_string()]);
    }
}
