//! Testing utilities.
//!
//! This module provides tools for deterministic tests without API calls:
//! - `MockGenerator` and `MockAnalyzer` return scripted results and record
//!   what they were asked
//! - `GateGenerator` parks a turn mid-generation until released
//! - Assertion helpers for verifying character rosters

use crate::collab::{AnalysisResult, Analyzer, CollaboratorError, Generation, Generator};
use crate::model::{Character, Message};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A generator that returns scripted replies in order.
#[derive(Debug, Default)]
pub struct MockGenerator {
    replies: Mutex<Vec<String>>,
    fail: bool,
    calls: Mutex<Vec<(Vec<Message>, Vec<String>)>>,
}

impl MockGenerator {
    /// Create a mock generator with scripted replies.
    pub fn new(replies: Vec<String>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            ..Self::default()
        }
    }

    /// A generator whose every call fails with a transport error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Transcript and selected names of every call so far.
    pub fn calls(&self) -> Vec<(Vec<Message>, Vec<String>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        messages: &[Message],
        selected: &[String],
    ) -> Result<Generation, CollaboratorError> {
        lock(&self.calls).push((messages.to_vec(), selected.to_vec()));
        if self.fail {
            return Err(CollaboratorError::Transport("scripted failure".into()));
        }
        let reply = lock(&self.replies)
            .pop()
            .unwrap_or_else(|| "No more scripted replies.".to_string());
        Ok(Generation::new(reply))
    }
}

/// An analyzer that returns scripted results in order.
///
/// Once the script runs out it reports an empty analysis.
#[derive(Debug, Default)]
pub struct MockAnalyzer {
    results: Mutex<Vec<AnalysisResult>>,
    fail: bool,
    calls: Mutex<Vec<(String, Vec<Character>)>>,
}

impl MockAnalyzer {
    pub fn new(results: Vec<AnalysisResult>) -> Self {
        let mut results = results;
        results.reverse();
        Self {
            results: Mutex::new(results),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Texts analyzed so far.
    pub fn texts(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(text, _)| text.clone()).collect()
    }

    /// Rosters passed alongside each text.
    pub fn rosters(&self) -> Vec<Vec<Character>> {
        lock(&self.calls).iter().map(|(_, roster)| roster.clone()).collect()
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(
        &self,
        text: &str,
        roster: &[Character],
    ) -> Result<AnalysisResult, CollaboratorError> {
        lock(&self.calls).push((text.to_string(), roster.to_vec()));
        if self.fail {
            return Err(CollaboratorError::Provider {
                status: 500,
                message: "scripted failure".into(),
            });
        }
        Ok(lock(&self.results).pop().unwrap_or_default())
    }
}

/// A generator that waits for `release` before replying.
///
/// Lets a test observe the orchestrator while a turn is parked in
/// generation.
#[derive(Debug)]
pub struct GateGenerator {
    reply: String,
    entered: Notify,
    release: Notify,
}

impl GateGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked call return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Generator for GateGenerator {
    async fn generate(
        &self,
        _messages: &[Message],
        _selected: &[String],
    ) -> Result<Generation, CollaboratorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Generation::new(self.reply.clone()))
    }
}

// Assertion helpers

/// Assert no two active characters share a name (case-insensitive).
pub fn assert_unique_active_names(roster: &[Character]) {
    let mut seen = HashSet::new();
    for character in roster.iter().filter(|c| c.active) {
        let key = character.name.trim().to_lowercase();
        assert!(
            seen.insert(key),
            "duplicate active character '{}' in roster",
            character.name
        );
    }
}

/// Assert a character with this name is present and active.
pub fn assert_active(roster: &[Character], name: &str) {
    assert!(
        roster.iter().any(|c| c.active && c.matches_name(name)),
        "expected '{name}' to be active"
    );
}

/// Assert a character with this name is present and none by that name is active.
pub fn assert_inactive(roster: &[Character], name: &str) {
    assert!(
        roster.iter().any(|c| c.matches_name(name)),
        "expected '{name}' in roster"
    );
    assert!(
        !roster.iter().any(|c| c.active && c.matches_name(name)),
        "expected '{name}' to be inactive"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_scripted() {
        let generator = MockGenerator::new(vec!["one".into(), "two".into()]);
        let first = generator.generate(&[], &[]).await.unwrap();
        let second = generator.generate(&[Message::user("x")], &["A".into()]).await.unwrap();
        let third = generator.generate(&[], &[]).await.unwrap();

        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
        assert_eq!(third.content, "No more scripted replies.");
        assert_eq!(generator.calls()[1].1, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_analyzer_exhausted_is_empty() {
        let analyzer = MockAnalyzer::new(vec![]);
        let result = analyzer.analyze("text", &[Character::new("A", "")]).await.unwrap();
        assert_eq!(result, AnalysisResult::default());
        assert_eq!(analyzer.rosters()[0].len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate active character")]
    fn test_unique_names_catches_duplicates() {
        assert_unique_active_names(&[Character::new("Skeptic", ""), Character::new("skeptic ", "")]);
    }

    #[test]
    fn test_active_helpers() {
        let mut quiet = Character::new("Skeptic", "");
        quiet.active = false;
        let roster = vec![Character::new("Reasoner", ""), quiet];
        assert_active(&roster, "reasoner");
        assert_inactive(&roster, "Skeptic");
        assert_unique_active_names(&roster);
    }
}
