//! The collection store: single writer for the folder hierarchy.
//!
//! Every mutation goes through a [`CollectionStore`] method, commits one
//! [`CatalogueFlow`], bumps the version and publishes a fresh
//! [`CollectionSnapshot`]. Bulk creation hands its entities to the
//! [`BatchInsertionScheduler`], so a large request shows up as a series of
//! `*Appended` commits rather than one.
//!
//! # Concurrency Model
//!
//! - The collection lives behind a parking_lot `RwLock`; readers take a read
//!   lock, commits a short write lock.
//! - Snapshots share structure through `Arc`: the outer vector and each folder
//!   are copied on write, so a published snapshot never changes.
//! - Subscribers are called after the lock is released. They may read the
//!   store or mutate it again; nested commits are delivered in commit order.
//!
//! # Stale references
//!
//! Deleting, editing or dragging something that is no longer there is not an
//! error. Those calls return `false`/`None`, log at `debug` and publish nothing.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use catalogue_types::{
    Editable, EditableFields, EntityPatch, EntityRef, Folder, FolderKey, Item, ItemId,
};

use crate::batch::{BatchHandle, BatchInsertionScheduler, BatchTarget};
use crate::config::CatalogueConfig;
use crate::flows::{CatalogueFlow, FlowBus, FlowSubscription};
use crate::pubsub::{Publisher, Subscription};
use crate::reorder::{self, Containers, DragGesture, DropMode, DropOutcome};

/// Shared, immutable view of the folder list.
pub type FolderList = Arc<Vec<Arc<Folder>>>;

/// The collection as of one commit.
#[derive(Clone, Debug)]
pub struct CollectionSnapshot {
    /// Incremented on every commit; 0 is the empty initial collection.
    pub version: u64,
    pub folders: FolderList,
    /// The change that produced this snapshot.
    pub change: Option<CatalogueFlow>,
}

impl CollectionSnapshot {
    fn initial() -> Self {
        Self {
            version: 0,
            folders: Arc::new(Vec::new()),
            change: None,
        }
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn folder(&self, key: &FolderKey) -> Option<&Folder> {
        folder_index(&self.folders, key).map(|i| &*self.folders[i])
    }

    /// The item and the key of the folder holding it.
    pub fn item(&self, id: &ItemId) -> Option<(FolderKey, &Item)> {
        locate_item(&self.folders, id).map(|(f, i)| {
            let folder = &self.folders[f];
            (folder.key, &folder.items[i])
        })
    }

    pub fn contains(&self, target: &EntityRef) -> bool {
        contains(&self.folders, target)
    }

    pub fn fields_of(&self, target: &EntityRef) -> Option<EditableFields> {
        fields_of(&self.folders, target)
    }

    /// Total number of items across all folders.
    pub fn total_items(&self) -> usize {
        self.folders.iter().map(|f| f.items.len()).sum()
    }
}

// ============================================================================
// Lookup helpers
// ============================================================================

fn folder_index(folders: &[Arc<Folder>], key: &FolderKey) -> Option<usize> {
    folders.iter().position(|f| f.key == *key)
}

/// (folder index, item index) of an item, searching every folder.
fn locate_item(folders: &[Arc<Folder>], id: &ItemId) -> Option<(usize, usize)> {
    folders
        .iter()
        .enumerate()
        .find_map(|(f, folder)| folder.position_of(id).map(|i| (f, i)))
}

fn contains(folders: &[Arc<Folder>], target: &EntityRef) -> bool {
    match target {
        EntityRef::Folder(key) => folder_index(folders, key).is_some(),
        EntityRef::Item(id) => locate_item(folders, id).is_some(),
    }
}

fn fields_of(folders: &[Arc<Folder>], target: &EntityRef) -> Option<EditableFields> {
    match target {
        EntityRef::Folder(key) => folder_index(folders, key).map(|i| folders[i].fields()),
        EntityRef::Item(id) => locate_item(folders, id).map(|(f, i)| folders[f].items[i].fields()),
    }
}

/// Writable folder at `index`, cloning whatever is still shared with snapshots.
fn folder_mut(folders: &mut FolderList, index: usize) -> &mut Folder {
    Arc::make_mut(&mut Arc::make_mut(folders)[index])
}

/// Two distinct elements of one slice, mutably.
fn two_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (head, tail) = slice.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = slice.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

// ============================================================================
// Store
// ============================================================================

struct StoreState {
    folders: FolderList,
    version: u64,
}

struct StoreShared {
    state: RwLock<StoreState>,
    snapshots: Publisher<CollectionSnapshot>,
    flows: FlowBus<CatalogueFlow>,
    scheduler: BatchInsertionScheduler,
    config: CatalogueConfig,
}

impl StoreShared {
    /// Run `change` against the folder list. If it reports a flow, bump the
    /// version and notify; otherwise nothing is published.
    fn commit<R>(&self, change: impl FnOnce(&mut FolderList) -> Option<(CatalogueFlow, R)>) -> Option<R> {
        let (snapshot, result) = {
            let mut state = self.state.write();
            let (flow, result) = change(&mut state.folders)?;
            state.version += 1;
            let snapshot = CollectionSnapshot {
                version: state.version,
                folders: state.folders.clone(),
                change: Some(flow),
            };
            (snapshot, result)
        };

        if let Some(flow) = &snapshot.change {
            tracing::trace!(version = snapshot.version, subject = flow.subject(), "commit");
            self.flows.publish(flow.clone());
        }
        self.snapshots.publish(snapshot);
        Some(result)
    }

    fn append_folders(&self, chunk: Vec<Folder>) -> bool {
        let count = chunk.len();
        self.commit(|folders| {
            let list = Arc::make_mut(folders);
            list.extend(chunk.into_iter().map(Arc::new));
            Some((CatalogueFlow::FoldersAppended { count, len: list.len() }, ()))
        })
        .is_some()
    }

    fn append_items(&self, key: FolderKey, chunk: Vec<Item>) -> bool {
        let count = chunk.len();
        self.commit(|folders| {
            let index = folder_index(folders, &key)?;
            let folder = folder_mut(folders, index);
            folder.items.extend(chunk);
            let len = folder.items.len();
            Some((CatalogueFlow::ItemsAppended { folder: key, count, len }, ()))
        })
        .is_some()
    }
}

/// Batch target appending to the end of the folder list.
struct FolderListTarget {
    store: Weak<StoreShared>,
}

impl BatchTarget<Folder> for FolderListTarget {
    fn append_chunk(&mut self, chunk: Vec<Folder>) -> bool {
        match self.store.upgrade() {
            Some(store) => store.append_folders(chunk),
            None => false,
        }
    }
}

/// Batch target appending to one folder's items. Gone once the folder is.
struct ItemListTarget {
    store: Weak<StoreShared>,
    folder: FolderKey,
}

impl BatchTarget<Item> for ItemListTarget {
    fn append_chunk(&mut self, chunk: Vec<Item>) -> bool {
        match self.store.upgrade() {
            Some(store) => store.append_items(self.folder, chunk),
            None => false,
        }
    }
}

/// Owner of the ordered folder hierarchy.
///
/// Cheap to clone; clones share the same collection.
#[derive(Clone)]
pub struct CollectionStore {
    shared: Arc<StoreShared>,
}

impl CollectionStore {
    /// An empty collection.
    pub fn new(config: CatalogueConfig) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                state: RwLock::new(StoreState {
                    folders: Arc::new(Vec::new()),
                    version: 0,
                }),
                snapshots: Publisher::new(CollectionSnapshot::initial()),
                flows: FlowBus::new(config.flow_capacity),
                scheduler: BatchInsertionScheduler::new(),
                config,
            }),
        }
    }

    /// Settings this store was created with.
    pub fn config(&self) -> &CatalogueConfig {
        &self.shared.config
    }

    /// The scheduler pacing this store's bulk insertions.
    pub fn scheduler(&self) -> &BatchInsertionScheduler {
        &self.shared.scheduler
    }

    /// Advance pending bulk insertions by one chunk each.
    pub fn tick(&self) -> usize {
        self.shared.scheduler.tick()
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Append `count` new folders (clamped to the configured cap).
    ///
    /// The first chunk is committed before this returns; the rest follow one
    /// chunk per tick. Returns `None` for a count of zero.
    pub fn create_folders(&self, count: i64) -> Option<BatchHandle> {
        let Some(count) = self.config().clamp_folder_count(count) else {
            tracing::debug!("create_folders with zero count ignored");
            return None;
        };
        let style = &self.config().folder_style;
        let folders: Vec<Folder> = (0..count).map(|_| Folder::blank(style)).collect();
        let target = FolderListTarget {
            store: Arc::downgrade(&self.shared),
        };
        tracing::debug!(count, "creating folders");
        Some(self.shared.scheduler.schedule(folders, target, self.config().folder_chunk()))
    }

    /// Append `count` new items to `folder` (clamped to the configured cap).
    ///
    /// Returns `None` for a count of zero or a folder that no longer exists.
    /// If the folder is deleted before every chunk lands, the rest are dropped.
    pub fn create_items(&self, folder: FolderKey, count: i64) -> Option<BatchHandle> {
        let Some(count) = self.config().clamp_item_count(count) else {
            tracing::debug!(folder = %folder, "create_items with zero count ignored");
            return None;
        };
        if !self.contains(&EntityRef::Folder(folder)) {
            tracing::debug!(folder = %folder, "create_items on missing folder ignored");
            return None;
        }
        let style = &self.config().item_style;
        let items: Vec<Item> = (0..count).map(|_| Item::blank(style)).collect();
        let target = ItemListTarget {
            store: Arc::downgrade(&self.shared),
            folder,
        };
        tracing::debug!(folder = %folder, count, "creating items");
        Some(self.shared.scheduler.schedule(items, target, self.config().item_chunk()))
    }

    // ------------------------------------------------------------------------
    // Deletion and edits
    // ------------------------------------------------------------------------

    /// Remove a folder and all of its items. Survivors keep their order.
    pub fn delete_folder(&self, key: FolderKey) -> bool {
        let removed = self.shared.commit(|folders| {
            let index = folder_index(folders, &key)?;
            let folder = Arc::make_mut(folders).remove(index);
            let items = folder.items.iter().map(|item| item.id).collect();
            Some((CatalogueFlow::FolderDeleted { key, items }, ()))
        });
        if removed.is_none() {
            tracing::debug!(key = %key, "delete_folder on missing folder ignored");
        }
        removed.is_some()
    }

    /// Remove one item from `folder`. An item that has since moved to another
    /// folder is not found here.
    pub fn delete_item(&self, folder: FolderKey, id: ItemId) -> bool {
        let removed = self.shared.commit(|folders| {
            let f = folder_index(folders, &folder)?;
            let i = folders[f].position_of(&id)?;
            folder_mut(folders, f).items.remove(i);
            Some((CatalogueFlow::ItemDeleted { folder, id }, ()))
        });
        if removed.is_none() {
            tracing::debug!(folder = %folder, id = %id, "delete_item on missing item ignored");
        }
        removed.is_some()
    }

    /// Merge the set fields of `patch` into the live entity, in place.
    ///
    /// Position and identity are untouched. An empty patch commits nothing.
    pub fn update_entity(&self, target: &EntityRef, patch: &EntityPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let updated = self.shared.commit(|folders| {
            match target {
                EntityRef::Folder(key) => {
                    let index = folder_index(folders, key)?;
                    folder_mut(folders, index).apply_patch(patch);
                }
                EntityRef::Item(id) => {
                    let (f, i) = locate_item(folders, id)?;
                    folder_mut(folders, f).items[i].apply_patch(patch);
                }
            }
            Some((CatalogueFlow::EntityUpdated { target: *target }, ()))
        });
        if updated.is_none() {
            tracing::debug!(?target, "update on missing entity ignored");
        }
        updated.is_some()
    }

    // ------------------------------------------------------------------------
    // Drag and drop
    // ------------------------------------------------------------------------

    /// Apply a folder-list drag: move, or insert a deep copy.
    pub fn drop_folder(&self, gesture: DragGesture, mode: DropMode) -> Option<DropOutcome> {
        let outcome = self.shared.commit(|folders| {
            let from = gesture.previous_index;
            let source = folders.get(from)?.key;

            let list = Arc::make_mut(folders);
            let outcome = reorder::apply_drop(Containers::Same(&mut *list), from, gesture.current_index, mode).ok()?;
            let flow = match outcome {
                DropOutcome::Duplicated { to, .. } => CatalogueFlow::FolderCopied {
                    source,
                    copy: list[to].key,
                    index: to,
                },
                DropOutcome::Moved { from, to } | DropOutcome::Transferred { from, to } => {
                    CatalogueFlow::FolderMoved { key: source, from, to }
                }
            };
            Some((flow, outcome))
        });
        if outcome.is_none() {
            tracing::debug!(?gesture, ?mode, "folder drop out of range ignored");
        }
        outcome
    }

    /// Apply an item drag from `gesture.previous_container` into `folder`.
    ///
    /// `gesture.container` is informational; `folder` is authoritative for the
    /// destination.
    pub fn drop_item(
        &self,
        gesture: DragGesture<FolderKey>,
        folder: FolderKey,
        mode: DropMode,
    ) -> Option<DropOutcome> {
        let source_key = gesture.previous_container;
        let outcome = self.shared.commit(|folders| {
            let s = folder_index(folders, &source_key)?;
            let d = folder_index(folders, &folder)?;
            let from = gesture.previous_index;
            let to = gesture.current_index;
            let dragged = folders[s].items.get(from)?.id;

            let outcome = if s == d {
                reorder::apply_drop(Containers::Same(&mut folder_mut(folders, s).items), from, to, mode)
            } else {
                let list = Arc::make_mut(folders);
                let (source, destination) = two_mut(list, s, d);
                reorder::apply_drop(
                    Containers::Split {
                        source: &mut Arc::make_mut(source).items,
                        destination: &mut Arc::make_mut(destination).items,
                    },
                    from,
                    to,
                    mode,
                )
            }
            .ok()?;

            let flow = match outcome {
                DropOutcome::Duplicated { to, .. } => CatalogueFlow::ItemCopied {
                    source: dragged,
                    copy: folders[d].items[to].id,
                    folder,
                    index: to,
                },
                DropOutcome::Moved { from, to } | DropOutcome::Transferred { from, to } => {
                    CatalogueFlow::ItemMoved {
                        id: dragged,
                        from_folder: source_key,
                        from,
                        to_folder: folder,
                        to,
                    }
                }
            };
            Some((flow, outcome))
        });
        if outcome.is_none() {
            tracing::debug!(?gesture, folder = %folder, ?mode, "item drop on stale reference ignored");
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// The live folder, shared with the current snapshot.
    pub fn folder(&self, key: &FolderKey) -> Option<Arc<Folder>> {
        let state = self.shared.state.read();
        folder_index(&state.folders, key).map(|i| state.folders[i].clone())
    }

    /// The item and the key of the folder currently holding it.
    pub fn item(&self, id: &ItemId) -> Option<(FolderKey, Item)> {
        let state = self.shared.state.read();
        locate_item(&state.folders, id).map(|(f, i)| {
            let folder = &state.folders[f];
            (folder.key, folder.items[i].clone())
        })
    }

    /// Whether `target` is currently in the collection, at any depth.
    pub fn contains(&self, target: &EntityRef) -> bool {
        contains(&self.shared.state.read().folders, target)
    }

    /// Editor-facing fields of a live entity.
    pub fn fields_of(&self, target: &EntityRef) -> Option<EditableFields> {
        fields_of(&self.shared.state.read().folders, target)
    }

    /// Number of folders in the collection.
    pub fn folder_count(&self) -> usize {
        self.shared.state.read().folders.len()
    }

    /// Number of items in one folder, or `None` if the folder is gone.
    pub fn item_count(&self, key: &FolderKey) -> Option<usize> {
        let state = self.shared.state.read();
        folder_index(&state.folders, key).map(|i| state.folders[i].items.len())
    }

    /// Commits so far. Unchanged by requests that were ignored.
    pub fn version(&self) -> u64 {
        self.shared.state.read().version
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.shared.snapshots.current()
    }

    /// Observe every commit. `f` is called right away with the current snapshot.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&CollectionSnapshot) + Send + Sync + 'static,
    {
        self.shared.snapshots.subscribe(f)
    }

    /// Async stream of changes whose subject matches `pattern`.
    pub fn subscribe_flows(&self, pattern: &str) -> FlowSubscription<CatalogueFlow> {
        self.shared.flows.subscribe(pattern)
    }
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new(CatalogueConfig::default())
    }
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("CollectionStore")
            .field("version", &state.version)
            .field("folders", &state.folders.len())
            .field("pending_batches", &self.shared.scheduler.pending())
            .finish()
    }
}
