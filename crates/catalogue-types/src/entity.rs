//! Folder and item entities.
//!
//! A catalogue is an ordered list of [`Folder`]s, each owning an ordered list
//! of [`Item`]s. Order is display order. Icons and colors are opaque names
//! handed through to whatever renders them.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{FolderKey, ItemId};

/// Icon name from the host's icon set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Icon(String);

impl Icon {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Icon {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Color selector: a palette name or any CSS-like color string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorSelector(String);

impl ColorSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ColorSelector {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Icon + color pair applied to newly created entities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStyle {
    pub icon: Icon,
    pub color: ColorSelector,
}

impl EntityStyle {
    pub fn new(icon: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            icon: Icon::new(icon),
            color: ColorSelector::new(color),
        }
    }
}

/// Which kind of entity a reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EntityKind {
    Folder,
    Item,
}

impl EntityKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Folder => "folder",
            EntityKind::Item => "item",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity-based reference to a live entity.
///
/// Items are addressed by id alone; ids are unique across all folders, so a
/// reference keeps pointing at an item after it is dragged to another folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityRef {
    Folder(FolderKey),
    Item(ItemId),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Folder(_) => EntityKind::Folder,
            EntityRef::Item(_) => EntityKind::Item,
        }
    }
}

impl From<FolderKey> for EntityRef {
    fn from(key: FolderKey) -> Self {
        EntityRef::Folder(key)
    }
}

impl From<ItemId> for EntityRef {
    fn from(id: ItemId) -> Self {
        EntityRef::Item(id)
    }
}

/// The fields an external editor shows and changes.
///
/// `Default` is the editor's cleared state (nothing selected).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableFields {
    pub name: String,
    pub description: String,
    pub icon: Option<Icon>,
    pub color: Option<ColorSelector>,
}

/// Partial update: `None` fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorSelector>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(Icon::new(icon));
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(ColorSelector::new(color));
        self
    }

    /// True when applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.icon.is_none()
            && self.color.is_none()
    }
}

/// Entities whose display metadata can be edited in place.
pub trait Editable {
    fn fields(&self) -> EditableFields;

    /// Merge the set fields of `patch`, leaving everything else untouched.
    fn apply_patch(&mut self, patch: &EntityPatch);
}

/// Deep copy with fresh identities for the whole subtree.
pub trait Duplicate {
    fn duplicate(&self) -> Self;
}

/// Shared entities duplicate into a fresh allocation.
impl<T: Duplicate> Duplicate for Arc<T> {
    fn duplicate(&self) -> Self {
        Arc::new(T::duplicate(self))
    }
}

/// Leaf entity, owned by exactly one folder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub icon: Icon,
    pub color: ColorSelector,
}

impl Item {
    /// A new item with a fresh id and a default name built from it.
    pub fn blank(style: &EntityStyle) -> Self {
        let id = ItemId::new();
        Self {
            name: format!("Item {}", id.short()),
            id,
            description: String::new(),
            icon: style.icon.clone(),
            color: style.color.clone(),
        }
    }
}

impl Editable for Item {
    fn fields(&self) -> EditableFields {
        EditableFields {
            name: self.name.clone(),
            description: self.description.clone(),
            icon: Some(self.icon.clone()),
            color: Some(self.color.clone()),
        }
    }

    fn apply_patch(&mut self, patch: &EntityPatch) {
        merge(&mut self.name, &mut self.description, &mut self.icon, &mut self.color, patch);
    }
}

impl Duplicate for Item {
    fn duplicate(&self) -> Self {
        Self {
            id: ItemId::new(),
            ..self.clone()
        }
    }
}

/// Container entity holding an ordered item list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub key: FolderKey,
    pub name: String,
    pub description: String,
    pub icon: Icon,
    pub color: ColorSelector,
    pub cost: f64,
    pub items: Vec<Item>,
}

impl Folder {
    /// A new empty folder with a fresh key and a default name built from it.
    pub fn blank(style: &EntityStyle) -> Self {
        let key = FolderKey::new();
        Self {
            name: format!("Folder {}", key.short()),
            key,
            description: String::new(),
            icon: style.icon.clone(),
            color: style.color.clone(),
            cost: 0.0,
            items: Vec::new(),
        }
    }

    /// Position of an item in this folder.
    pub fn position_of(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == *id)
    }
}

impl Editable for Folder {
    fn fields(&self) -> EditableFields {
        EditableFields {
            name: self.name.clone(),
            description: self.description.clone(),
            icon: Some(self.icon.clone()),
            color: Some(self.color.clone()),
        }
    }

    fn apply_patch(&mut self, patch: &EntityPatch) {
        merge(&mut self.name, &mut self.description, &mut self.icon, &mut self.color, patch);
    }
}

impl Duplicate for Folder {
    fn duplicate(&self) -> Self {
        Self {
            key: FolderKey::new(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            color: self.color.clone(),
            cost: self.cost,
            items: self.items.iter().map(Duplicate::duplicate).collect(),
        }
    }
}

fn merge(
    name: &mut String,
    description: &mut String,
    icon: &mut Icon,
    color: &mut ColorSelector,
    patch: &EntityPatch,
) {
    if let Some(v) = &patch.name {
        *name = v.clone();
    }
    if let Some(v) = &patch.description {
        *description = v.clone();
    }
    if let Some(v) = &patch.icon {
        *icon = v.clone();
    }
    if let Some(v) = &patch.color {
        *color = v.clone();
    }
}
