//! Opaque identifier types for branches and characters.
//!
//! Freshly minted ids are UUID v4 strings, but any non-empty token is accepted
//! so that documents written by other tools (e.g. `id-k3x9...`) import cleanly.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to define a newtype ID wrapper around an opaque string token
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new random ID
            #[inline]
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing token, minting a fresh one if it is blank
            pub fn from_string(s: impl Into<String>) -> Self {
                let s = s.into();
                if s.trim().is_empty() {
                    Self::new()
                } else {
                    Self(s)
                }
            }

            /// The raw token
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for compact listings
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a branch in the forest
    BranchId
);

define_id!(
    /// Identity anchor for a character across renames, merges and splits
    CharacterId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id1 = BranchId::new();
        let id2 = BranchId::new();
        assert_ne!(id1, id2);
        assert!(Uuid::parse_str(id1.as_str()).is_ok());
    }

    #[test]
    fn test_foreign_tokens_kept() {
        let id = CharacterId::from_string("id-abc123");
        assert_eq!(id.as_str(), "id-abc123");
    }

    #[test]
    fn test_blank_token_replaced() {
        let id = CharacterId::from_string("  ");
        assert!(!id.as_str().trim().is_empty());
    }

    #[test]
    fn test_short_and_debug() {
        let id = BranchId::from("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(format!("{id:?}"), "BranchId(01234567)");
        assert_eq!(BranchId::from("root").short(), "root");
    }

    #[test]
    fn test_id_serde() {
        let id = BranchId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: BranchId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
