//! Typed identifiers for folders and items.
//!
//! Both ID types wrap a UUIDv7 minted by [`IdentityGenerator`]. The layout is:
//!
//! ```text
//! | 48-bit unix millis | ver | random (rand_a, variant, rand_b) | 32-bit sequence |
//! ```
//!
//! The trailing four bytes hold a per-process sequence number, so two
//! identities minted by the same process never collide, even when thousands
//! are produced inside one millisecond. The random bits keep identities from
//! different processes apart. `short()` is the sequence rendered as 8 hex
//! characters, for human-facing names only and never a lookup key.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Mints unique identities.
///
/// A timestamp alone is not enough: bulk creation produces thousands of
/// entities per millisecond. Each call takes the next value of an atomic
/// sequence, which makes identities from one generator pairwise distinct for
/// 2^32 calls.
#[derive(Debug)]
pub struct IdentityGenerator {
    sequence: AtomicU32,
}

/// Process-wide generator backing `FolderKey::new()` and `ItemId::new()`.
static PROCESS_IDENTITIES: IdentityGenerator = IdentityGenerator::new();

impl IdentityGenerator {
    /// Create a generator whose sequence starts at zero.
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU32::new(0),
        }
    }

    /// The generator shared by every typed ID in this process.
    pub fn process() -> &'static IdentityGenerator {
        &PROCESS_IDENTITIES
    }

    /// Mint the next identity.
    pub fn next(&self) -> uuid::Uuid {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut tail = [0u8; 10];
        rand::thread_rng().fill_bytes(&mut tail[..6]);
        tail[6..].copy_from_slice(&seq.to_be_bytes());

        uuid::Builder::from_unix_timestamp_millis(crate::now_millis(), &tail).into_uuid()
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A folder key (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderKey(uuid::Uuid);

/// An item identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a fresh identity from the process generator.
            pub fn new() -> Self {
                Self(IdentityGenerator::process().next())
            }

            /// Trailing 8 hex characters (the sequence part).
            pub fn short(&self) -> String {
                let hex = self.to_hex();
                hex[hex.len() - 8..].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// The wrapped UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(FolderKey, "FolderKey");
impl_typed_id!(ItemId, "ItemId");

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tight_loop_identities_are_distinct() {
        let generator = IdentityGenerator::new();
        let ids: HashSet<uuid::Uuid> = (0..100_000).map(|_| generator.next()).collect();
        assert_eq!(ids.len(), 100_000);
    }

    #[test]
    fn test_identity_is_v7() {
        let id = IdentityGenerator::new().next();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_sequence_lives_in_short_form() {
        let generator = IdentityGenerator::new();
        let first = FolderKey::from(generator.next());
        let second = FolderKey::from(generator.next());
        assert_eq!(first.short(), "00000000");
        assert_eq!(second.short(), "00000001");
    }

    #[test]
    fn test_typed_ids_parse_round_trip() {
        let key = FolderKey::new();
        assert_eq!(FolderKey::parse(&key.to_hex()).unwrap(), key);
        assert_eq!(FolderKey::parse(&key.to_string()).unwrap(), key);
        assert!(ItemId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_debug_is_compact() {
        let id = ItemId::new();
        assert_eq!(format!("{id:?}"), format!("ItemId({})", id.short()));
    }
}
