//! Identity and entity types for the catalogue collection engine.
//!
//! This is the leaf crate: typed identities, the folder/item entities, and the
//! small traits the engine uses to edit and duplicate them. It has **no
//! internal dependencies**.
//!
//! ```text
//! Collection (ordered)
//!     └── Folder (FolderKey)
//!         └── Item (ItemId), ordered within its folder
//! ```
//!
//! |-------------------|------------------------------------------------|
//! | Type              | Purpose                                        |
//! |-------------------|------------------------------------------------|
//! | [`FolderKey`]     | Which folder                                   |
//! | [`ItemId`]        | Which item (unique across all folders)         |
//! | [`EntityRef`]     | Tagged reference to either                     |
//! | [`EntityPatch`]   | Partial field update from an editor            |
//! | [`EditableFields`]| Editor-facing view of an entity                |
//! |-------------------|------------------------------------------------|

pub mod entity;
pub mod ids;

pub use entity::{
    ColorSelector, Duplicate, Editable, EditableFields, EntityKind, EntityPatch, EntityRef,
    EntityStyle, Folder, Icon, Item,
};
pub use ids::{FolderKey, IdentityGenerator, ItemId};

/// Current time as Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
