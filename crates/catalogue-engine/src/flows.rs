//! Change events and the FlowBus they travel on.
//!
//! Every committed store mutation yields exactly one [`CatalogueFlow`]. The
//! store attaches it to the snapshot it publishes and also broadcasts it on a
//! [`FlowBus`], so async consumers can follow the incremental diff instead of
//! diffing snapshots themselves.
//!
//! # Pattern Matching
//!
//! Subjects are dot-separated tokens (`folder.deleted`, `item.moved`).
//! Subscription patterns support NATS-style wildcards:
//! - `*` matches exactly one token: `item.*` matches `item.copied`
//! - `>` matches one or more trailing tokens: `>` matches everything
//! - anything else must match exactly

use std::time::Instant;

use catalogue_types::{EntityRef, FolderKey, ItemId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Check if a subject matches a pattern.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.').peekable();
    let mut subject_tokens = subject.split('.');

    while let Some(p) = pattern_tokens.next() {
        let Some(s) = subject_tokens.next() else {
            return false;
        };
        match p {
            // `>` swallows this token and everything after it, but only as the last pattern token.
            ">" => return pattern_tokens.peek().is_none(),
            "*" => {}
            literal if literal != s => return false,
            _ => {}
        }
    }

    subject_tokens.next().is_none()
}

/// Trait for payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A message published to the flow bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    pub subject: String,
    pub payload: T,
    /// When this message was created.
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    /// Wrap a payload, stamping its subject and the current time.
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().to_string(),
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Catalogue Flow Events
// ============================================================================

/// One committed change to the collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CatalogueFlow {
    /// A chunk of new folders landed at the end of the collection.
    FoldersAppended {
        count: usize,
        /// Folder count after the append.
        len: usize,
    },

    /// A chunk of new items landed at the end of a folder.
    ItemsAppended {
        folder: FolderKey,
        count: usize,
        /// Item count of the folder after the append.
        len: usize,
    },

    /// A folder and everything in it was removed.
    FolderDeleted {
        key: FolderKey,
        items: Vec<ItemId>,
    },

    ItemDeleted {
        folder: FolderKey,
        id: ItemId,
    },

    /// Display fields of an entity changed in place.
    EntityUpdated {
        target: EntityRef,
    },

    FolderMoved {
        key: FolderKey,
        from: usize,
        to: usize,
    },

    /// A deep copy of `source` was inserted at `index`.
    FolderCopied {
        source: FolderKey,
        copy: FolderKey,
        index: usize,
    },

    ItemMoved {
        id: ItemId,
        from_folder: FolderKey,
        from: usize,
        to_folder: FolderKey,
        to: usize,
    },

    ItemCopied {
        source: ItemId,
        copy: ItemId,
        folder: FolderKey,
        index: usize,
    },
}

impl CatalogueFlow {
    /// Dot-separated subject, `<entity>.<verb>`, used for bus routing.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::FoldersAppended { .. } => "folder.appended",
            Self::ItemsAppended { .. } => "item.appended",
            Self::FolderDeleted { .. } => "folder.deleted",
            Self::ItemDeleted { .. } => "item.deleted",
            Self::EntityUpdated { .. } => "entity.updated",
            Self::FolderMoved { .. } => "folder.moved",
            Self::FolderCopied { .. } => "folder.copied",
            Self::ItemMoved { .. } => "item.moved",
            Self::ItemCopied { .. } => "item.copied",
        }
    }

    /// Whether this change took `target` out of the collection.
    pub fn removes(&self, target: &EntityRef) -> bool {
        match (self, target) {
            (Self::FolderDeleted { key, .. }, EntityRef::Folder(k)) => key == k,
            (Self::FolderDeleted { items, .. }, EntityRef::Item(id)) => items.contains(id),
            (Self::ItemDeleted { id, .. }, EntityRef::Item(i)) => id == i,
            _ => false,
        }
    }
}

impl HasSubject for CatalogueFlow {
    fn subject(&self) -> &str {
        CatalogueFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Type-parameterized pub/sub bus backed by a broadcast channel.
///
/// Every subscriber gets its own receiver on the channel and filters by
/// subject pattern, so a slow subscriber lags on its own without holding up
/// the publisher. Clones publish into the same channel.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// A bus buffering up to `capacity` messages per subscriber (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Requested buffer size, as passed to [`FlowBus::new`].
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live [`FlowSubscription`]s, whatever their pattern.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish a payload under the subject it reports via [`HasSubject`].
    ///
    /// Returns how many receivers the message was queued for, before pattern
    /// filtering. Publishing with no subscribers is not an error.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    /// Receive every later message whose subject matches `pattern`.
    ///
    /// Patterns are dot-separated tokens with NATS wildcards: `*` stands for
    /// one token, a trailing `>` for the rest of the subject.
    pub fn subscribe(&self, pattern: &str) -> FlowSubscription<T> {
        FlowSubscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

/// A pattern-filtered view of a [`FlowBus`].
///
/// Non-matching messages are skipped silently. Dropping the subscription
/// releases its receiver.
pub struct FlowSubscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> FlowSubscription<T> {
    /// The pattern this subscription was created with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the next matching message.
    ///
    /// Lagging behind the channel logs a warning and keeps going with the
    /// oldest message still buffered. `None` once every bus clone is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "flow subscription lagged behind");
                }
            }
        }
    }

    /// The next matching message if one is already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "flow subscription lagged behind");
                }
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for FlowSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSubscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("folder.deleted", "folder.deleted"));
        assert!(!matches_pattern("folder.deleted", "folder.moved"));

        assert!(matches_pattern("item.*", "item.copied"));
        assert!(!matches_pattern("item.*", "folder.copied"));
        assert!(!matches_pattern("item.*", "item"));
        assert!(matches_pattern("*.deleted", "item.deleted"));

        assert!(matches_pattern(">", "entity.updated"));
        assert!(matches_pattern("folder.>", "folder.moved"));
        assert!(!matches_pattern("folder.>", "folder"));
        assert!(!matches_pattern("folder.>.x", "folder.moved.x"));

        assert!(!matches_pattern("folder", "folder.moved"));
    }

    #[test]
    fn test_removes() {
        let key = FolderKey::new();
        let inside = ItemId::new();
        let flow = CatalogueFlow::FolderDeleted { key, items: vec![inside] };

        assert!(flow.removes(&EntityRef::Folder(key)));
        assert!(flow.removes(&EntityRef::Item(inside)));
        assert!(!flow.removes(&EntityRef::Item(ItemId::new())));

        let moved = CatalogueFlow::FolderMoved { key, from: 0, to: 1 };
        assert!(!moved.removes(&EntityRef::Folder(key)));
    }

    #[test]
    fn test_bus_filters_by_pattern() {
        let bus = FlowBus::<CatalogueFlow>::new(16);
        let mut items = bus.subscribe("item.*");
        let mut everything = bus.subscribe(">");

        let key = FolderKey::new();
        assert_eq!(bus.publish(CatalogueFlow::FoldersAppended { count: 1, len: 1 }), 2);
        bus.publish(CatalogueFlow::ItemsAppended { folder: key, count: 3, len: 3 });

        let msg = items.try_recv().unwrap();
        assert_eq!(msg.subject, "item.appended");
        assert!(items.try_recv().is_none());

        assert_eq!(everything.try_recv().unwrap().subject, "folder.appended");
        assert_eq!(everything.try_recv().unwrap().subject, "item.appended");
    }

    #[tokio::test]
    async fn test_async_recv_skips_non_matching() {
        let bus = FlowBus::<CatalogueFlow>::new(16);
        let mut deletions = bus.subscribe("*.deleted");

        let key = FolderKey::new();
        bus.publish(CatalogueFlow::FolderMoved { key, from: 1, to: 0 });
        bus.publish(CatalogueFlow::FolderDeleted { key, items: vec![] });

        let msg = deletions.recv().await.unwrap();
        assert_eq!(msg.payload, CatalogueFlow::FolderDeleted { key, items: vec![] });
    }
}
