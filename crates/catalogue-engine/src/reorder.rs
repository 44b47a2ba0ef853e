//! Drag-and-drop outcome computation.
//!
//! A drop either moves the dragged entity (default) or inserts a deep copy of
//! it with fresh identities (duplicate mode). The functions here operate on
//! plain vectors and know nothing about folders or items beyond [`Duplicate`];
//! the store decides which vectors a gesture refers to.
//!
//! Every gesture is validated before anything is touched, so a drop applies
//! exactly one structural change or none at all.

use catalogue_types::{Duplicate, FolderKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A completed drag: where the entity came from and where it was dropped.
///
/// Folder drags use `C = ()` (there is a single folder list); item drags use
/// the owning folder's key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragGesture<C = ()> {
    pub previous_container: C,
    pub previous_index: usize,
    pub container: C,
    pub current_index: usize,
}

impl DragGesture<()> {
    /// A drag within the folder list.
    pub fn reorder(previous_index: usize, current_index: usize) -> Self {
        Self {
            previous_container: (),
            previous_index,
            container: (),
            current_index,
        }
    }
}

impl DragGesture<FolderKey> {
    /// A drag of an item from one folder's list into another's (or the same).
    pub fn between(from: FolderKey, previous_index: usize, to: FolderKey, current_index: usize) -> Self {
        Self {
            previous_container: from,
            previous_index,
            container: to,
            current_index,
        }
    }

    pub fn within(folder: FolderKey, previous_index: usize, current_index: usize) -> Self {
        Self::between(folder, previous_index, folder, current_index)
    }
}

/// Move or copy, chosen by the duplicate modifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropMode {
    #[default]
    Move,
    Duplicate,
}

impl From<bool> for DropMode {
    fn from(duplicate: bool) -> Self {
        if duplicate { DropMode::Duplicate } else { DropMode::Move }
    }
}

/// The vectors a drop operates on.
pub enum Containers<'a, T> {
    /// Source and destination are the same list.
    Same(&'a mut Vec<T>),
    Split {
        source: &'a mut Vec<T>,
        destination: &'a mut Vec<T>,
    },
}

/// What a drop did. Indices are the effective (clamped) positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    /// Reordered within one list.
    Moved { from: usize, to: usize },
    /// Removed from the source list and inserted into the destination.
    Transferred { from: usize, to: usize },
    /// A copy of `source[from]` was inserted at `destination[to]`.
    Duplicated { from: usize, to: usize },
}

impl DropOutcome {
    /// Final position of the dropped (or copied) entity in the destination.
    pub fn destination_index(&self) -> usize {
        match self {
            DropOutcome::Moved { to, .. }
            | DropOutcome::Transferred { to, .. }
            | DropOutcome::Duplicated { to, .. } => *to,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderError {
    /// The dragged index no longer exists in the source list.
    #[error("source index {index} out of range for list of length {len}")]
    SourceOutOfRange { index: usize, len: usize },
}

/// Apply one drop to `containers`.
pub fn apply_drop<T: Duplicate>(
    containers: Containers<'_, T>,
    from: usize,
    to: usize,
    mode: DropMode,
) -> Result<DropOutcome, ReorderError> {
    match (containers, mode) {
        (Containers::Same(list), DropMode::Move) => move_within(list, from, to),
        (Containers::Split { source, destination }, DropMode::Move) => {
            transfer(source, destination, from, to)
        }
        (Containers::Same(list), DropMode::Duplicate) => {
            let copy = source_at(list, from)?.duplicate();
            Ok(insert_copy(list, from, to, copy))
        }
        (Containers::Split { source, destination }, DropMode::Duplicate) => {
            let copy = source_at(source, from)?.duplicate();
            Ok(insert_copy(destination, from, to, copy))
        }
    }
}

fn source_at<T>(list: &[T], index: usize) -> Result<&T, ReorderError> {
    list.get(index).ok_or(ReorderError::SourceOutOfRange {
        index,
        len: list.len(),
    })
}

/// Move `list[from]` to position `to`; everything in between shifts by one.
pub fn move_within<T>(list: &mut Vec<T>, from: usize, to: usize) -> Result<DropOutcome, ReorderError> {
    source_at(list, from)?;
    let to = to.min(list.len() - 1);
    if from != to {
        let entity = list.remove(from);
        list.insert(to, entity);
    }
    Ok(DropOutcome::Moved { from, to })
}

/// Move `source[from]` into `destination` at `to`.
pub fn transfer<T>(
    source: &mut Vec<T>,
    destination: &mut Vec<T>,
    from: usize,
    to: usize,
) -> Result<DropOutcome, ReorderError> {
    source_at(source, from)?;
    let to = to.min(destination.len());
    let entity = source.remove(from);
    destination.insert(to, entity);
    Ok(DropOutcome::Transferred { from, to })
}

fn insert_copy<T>(destination: &mut Vec<T>, from: usize, to: usize, copy: T) -> DropOutcome {
    let to = to.min(destination.len());
    destination.insert(to, copy);
    DropOutcome::Duplicated { from, to }
}
