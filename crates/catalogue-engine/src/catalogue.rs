//! The catalogue: store, selection and modifier wired together.
//!
//! Hosts construct one [`Catalogue`] at startup and route every user request
//! through it. Keyboard events feed the duplicate modifier; drop handlers ask
//! [`Catalogue::duplicate_mode`] for the mode to pass along.

use std::time::Instant;

use parking_lot::Mutex;

use catalogue_types::{EntityPatch, EntityRef, FolderKey, ItemId};

use crate::batch::{BatchHandle, Ticker};
use crate::config::CatalogueConfig;
use crate::modifier::DuplicateModifier;
use crate::reorder::{DragGesture, DropMode, DropOutcome};
use crate::selection::SelectionEditBridge;
use crate::store::CollectionStore;

pub struct Catalogue {
    store: CollectionStore,
    selection: SelectionEditBridge,
    modifier: Mutex<DuplicateModifier>,
}

impl Catalogue {
    /// Empty collection, empty selection, modifier released.
    pub fn new(config: CatalogueConfig) -> Self {
        let modifier = DuplicateModifier::new(config.duplicate_modifier.clone());
        let store = CollectionStore::new(config);
        let selection = SelectionEditBridge::new(store.clone());
        Self {
            store,
            selection,
            modifier: Mutex::new(modifier),
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionEditBridge {
        &self.selection
    }

    pub fn config(&self) -> &CatalogueConfig {
        self.store.config()
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Bulk-create folders; see [`CollectionStore::create_folders`].
    pub fn create_folders(&self, count: i64) -> Option<BatchHandle> {
        self.store.create_folders(count)
    }

    pub fn create_items(&self, folder: FolderKey, count: i64) -> Option<BatchHandle> {
        self.store.create_items(folder, count)
    }

    /// Delete a folder and its items. Clears the selection if it pointed
    /// at either.
    pub fn delete_folder(&self, key: FolderKey) -> bool {
        self.store.delete_folder(key)
    }

    pub fn delete_item(&self, folder: FolderKey, id: ItemId) -> bool {
        self.store.delete_item(folder, id)
    }

    /// Select an entity by reference, or clear the selection with `None`.
    pub fn select(&self, target: Option<EntityRef>) -> bool {
        self.selection.select(target)
    }

    /// Write editor changes into the selected entity.
    pub fn apply_edit(&self, patch: &EntityPatch) -> bool {
        self.selection.apply_edit(patch)
    }

    /// Finish a folder drag. Pass [`Catalogue::duplicate_mode`] as `mode`.
    pub fn drop_folder(&self, gesture: DragGesture, mode: DropMode) -> Option<DropOutcome> {
        self.store.drop_folder(gesture, mode)
    }

    pub fn drop_item(
        &self,
        gesture: DragGesture<FolderKey>,
        folder: FolderKey,
        mode: DropMode,
    ) -> Option<DropOutcome> {
        self.store.drop_item(gesture, folder, mode)
    }

    // ========================================================================
    // Keyboard
    // ========================================================================

    /// Keyboard press, by key name. Only the configured modifier matters.
    pub fn key_down(&self, key: &str) {
        self.key_down_at(key, Instant::now());
    }

    /// Keyboard release. The modifier resets 500 ms later whatever happens
    /// in between.
    pub fn key_up(&self, key: &str) {
        self.key_up_at(key, Instant::now());
    }

    pub fn key_down_at(&self, key: &str, now: Instant) {
        self.modifier.lock().key_down(key, now);
    }

    pub fn key_up_at(&self, key: &str, now: Instant) {
        self.modifier.lock().key_up(key, now);
    }

    /// Mode a drop landing now should use.
    pub fn duplicate_mode(&self) -> DropMode {
        self.duplicate_mode_at(Instant::now())
    }

    pub fn duplicate_mode_at(&self, now: Instant) -> DropMode {
        self.modifier.lock().mode(now)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Advance pending bulk insertions by one chunk. Returns how many remain.
    pub fn tick(&self) -> usize {
        self.store.tick()
    }

    /// Tick on every `ticker` beat until no insertion is pending.
    pub async fn drive<K: Ticker + ?Sized>(&self, ticker: &mut K) {
        self.store.scheduler().drive(ticker).await;
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::new(CatalogueConfig::default())
    }
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogue")
            .field("store", &self.store)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_modifier_drives_drop_mode() {
        let catalogue = Catalogue::default();
        catalogue.create_folders(2);
        let t0 = Instant::now();

        catalogue.key_down_at("Shift", t0);
        let mode = catalogue.duplicate_mode_at(t0 + Duration::from_millis(50));
        catalogue.drop_folder(DragGesture::reorder(0, 2), mode);
        assert_eq!(catalogue.store().folder_count(), 3);

        catalogue.key_up_at("Shift", t0 + Duration::from_millis(60));
        let mode = catalogue.duplicate_mode_at(t0 + Duration::from_millis(560));
        assert_eq!(mode, DropMode::Move);
        catalogue.drop_folder(DragGesture::reorder(0, 2), mode);
        assert_eq!(catalogue.store().folder_count(), 3);
    }

    #[test]
    fn test_configured_modifier_key() {
        let config = CatalogueConfig {
            duplicate_modifier: "Alt".into(),
            ..Default::default()
        };
        let catalogue = Catalogue::new(config);
        catalogue.key_down("Shift");
        assert_eq!(catalogue.duplicate_mode(), DropMode::Move);
        catalogue.key_down("Alt");
        assert_eq!(catalogue.duplicate_mode(), DropMode::Duplicate);
    }

    #[test]
    fn test_request_surface_round_trip() {
        let catalogue = Catalogue::default();
        catalogue.create_folders(1);
        let key = catalogue.store().snapshot().folders[0].key;
        catalogue.create_items(key, 2);

        assert!(catalogue.select(Some(EntityRef::Folder(key))));
        assert!(catalogue.apply_edit(&EntityPatch::new().with_icon("star")));
        assert_eq!(catalogue.store().folder(&key).unwrap().icon.as_str(), "star");

        assert!(catalogue.delete_folder(key));
        assert_eq!(catalogue.selection().current_selection(), None);
    }
}
