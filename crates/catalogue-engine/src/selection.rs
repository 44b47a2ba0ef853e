//! Single selection and the edit path back into the store.
//!
//! The selection is a reference by identity ([`EntityRef`]), never a copy of
//! the entity: edits go through [`CollectionStore::update_entity`] on the live
//! entity, and the fields published to subscribers are re-read from the store
//! every time. Since item ids are unique across folders, a selected item stays
//! selected when it is dragged into another folder.
//!
//! The bridge watches the store. A commit that removes the selected entity
//! (directly, or as part of a deleted folder) clears the selection; a commit
//! that updates it republishes the refreshed fields.

use catalogue_types::{EditableFields, EntityPatch, EntityRef};

use crate::flows::CatalogueFlow;
use crate::pubsub::{Publisher, Subscription};
use crate::store::{CollectionSnapshot, CollectionStore};

/// The current selection as the editor sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct Selected {
    pub target: EntityRef,
    /// Fields of the live entity at the time this value was published.
    pub fields: EditableFields,
}

pub struct SelectionEditBridge {
    store: CollectionStore,
    selection: Publisher<Option<Selected>>,
    _store_watch: Subscription,
}

impl SelectionEditBridge {
    /// Empty selection, watching `store`.
    pub fn new(store: CollectionStore) -> Self {
        let selection: Publisher<Option<Selected>> = Publisher::new(None);
        let watch = {
            let selection = selection.clone();
            store.subscribe(move |snapshot| follow_store(&selection, snapshot))
        };
        Self {
            store,
            selection,
            _store_watch: watch,
        }
    }

    /// Replace the selection. Returns whether something is now selected.
    ///
    /// Selecting an entity that is not in the store clears the selection.
    pub fn select(&self, target: Option<EntityRef>) -> bool {
        let selected = target.and_then(|target| match self.store.fields_of(&target) {
            Some(fields) => Some(Selected { target, fields }),
            None => {
                tracing::debug!(?target, "selected entity is gone, clearing selection");
                None
            }
        });
        let is_selected = selected.is_some();
        self.selection.publish(selected);
        is_selected
    }

    /// Synchronous read of the selected reference.
    pub fn current_selection(&self) -> Option<EntityRef> {
        self.selection.current().map(|selected| selected.target)
    }

    pub fn current(&self) -> Option<Selected> {
        self.selection.current()
    }

    /// Fields for the editor: the selected entity's, or the cleared defaults.
    pub fn selected_fields(&self) -> EditableFields {
        self.selection
            .current()
            .map(|selected| selected.fields)
            .unwrap_or_default()
    }

    /// Merge `patch` into the selected entity, then republish the selection.
    ///
    /// With nothing selected this does nothing. A committed edit reaches
    /// subscribers through the store watch; a patch that commits nothing
    /// (an empty one) still republishes the live fields. Returns whether the
    /// store changed.
    pub fn apply_edit(&self, patch: &EntityPatch) -> bool {
        let Some(selected) = self.selection.current() else {
            tracing::debug!("edit with empty selection ignored");
            return false;
        };
        if self.store.update_entity(&selected.target, patch) {
            return true;
        }
        match self.store.fields_of(&selected.target) {
            Some(fields) => self.selection.publish(Some(Selected {
                target: selected.target,
                fields,
            })),
            None => {
                tracing::debug!(target = ?selected.target, "edited entity is gone, clearing selection");
                self.selection.publish(None);
            }
        }
        false
    }

    /// Observe the selection. `f` is called right away with the current value.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Option<Selected>) + Send + Sync + 'static,
    {
        self.selection.subscribe(f)
    }
}

impl std::fmt::Debug for SelectionEditBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionEditBridge")
            .field("selection", &self.current_selection())
            .finish_non_exhaustive()
    }
}

fn follow_store(selection: &Publisher<Option<Selected>>, snapshot: &CollectionSnapshot) {
    let (Some(change), Some(selected)) = (&snapshot.change, selection.current()) else {
        return;
    };
    if change.removes(&selected.target) {
        tracing::debug!(target = ?selected.target, subject = change.subject(), "selection removed");
        selection.publish(None);
        return;
    }
    if let CatalogueFlow::EntityUpdated { target } = change {
        if *target == selected.target {
            let fields = snapshot.fields_of(target).unwrap_or_default();
            selection.publish(Some(Selected { target: *target, fields }));
        }
    }
}
