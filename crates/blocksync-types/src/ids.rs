//! Typed identifiers for blocks and synchronization scopes.
//!
//! Both wrap a plain string. Fresh ids are UUIDv7 text (time-ordered and
//! minted on the client, so blocks can be created offline before storage has
//! seen them). Ids read back from storage or fixtures are accepted verbatim.
//! The `short()` form is for logs only, never used as a lookup key.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable block identifier. Assigned once, never reused.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

/// Identifier of one synchronization scope (a document).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a new time-ordered ID (UUIDv7 text).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// The id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, for human display only.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((end, _)) => &self.0[..end],
                    None => &self.0,
                }
            }

            /// Whether the id is the empty string (treated as "no id").
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $T {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_string_id!(BlockId, "BlockId");
impl_string_id!(DocumentId, "DocumentId");

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_new_ids_are_unique_and_time_ordered() {
        let a = BlockId::new();
        let b = BlockId::new();
        assert_ne!(a, b);
        // UUIDv7 text sorts by creation time (same millisecond may tie on prefix).
        assert!(a.as_str()[..8] <= b.as_str()[..8]);
    }

    #[test]
    fn test_short_handles_short_and_multibyte_ids() {
        assert_eq!(BlockId::from("a").short(), "a");
        assert_eq!(BlockId::from("ééééééééé").short(), "éééééééé");
    }

    #[test]
    fn test_borrow_allows_str_lookup() {
        let mut map = HashMap::new();
        map.insert(BlockId::from("abc"), 1);
        assert_eq!(map.get("abc"), Some(&1));
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = BlockId::from("block-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"block-1\"");
        let back: BlockId = serde_json::from_str("\"block-1\"").unwrap();
        assert_eq!(back, id);
    }
}
