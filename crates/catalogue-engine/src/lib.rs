//! # catalogue-engine
//!
//! Collection engine for an ordered two-level catalogue of folders and items.
//!
//! The engine keeps a large, mutable, ordered hierarchy responsive and
//! consistent:
//! - Bulk creation is paced by the [`BatchInsertionScheduler`], one chunk per
//!   host tick, with progress published after every chunk.
//! - Drag gestures move or deep-copy entities ([`apply_drop`]), the copy mode
//!   chosen by a held modifier key ([`DuplicateModifier`]).
//! - The [`SelectionEditBridge`] holds at most one selected entity by identity
//!   and writes editor changes back into the [`CollectionStore`].
//!
//! [`Catalogue`] wires these together for a host.

pub mod batch;
pub mod catalogue;
pub mod config;
pub mod flows;
pub mod modifier;
pub mod pubsub;
pub mod reorder;
pub mod selection;
pub mod store;

pub use batch::{
    BatchHandle, BatchId, BatchInsertion, BatchInsertionScheduler, BatchState, BatchStep,
    BatchTarget, FrameTicker, Ticker, YieldTicker,
};
pub use catalogue::Catalogue;
pub use config::{CatalogueConfig, ConfigError, clamp_count};
pub use flows::{CatalogueFlow, FlowBus, FlowMessage, FlowSubscription, HasSubject, matches_pattern};
pub use modifier::{DuplicateModifier, MODIFIER_RELEASE_TIMEOUT};
pub use pubsub::{Publisher, Subscription};
pub use reorder::{Containers, DragGesture, DropMode, DropOutcome, ReorderError, apply_drop};
pub use selection::{Selected, SelectionEditBridge};
pub use store::{CollectionSnapshot, CollectionStore, FolderList};

pub use catalogue_types as types;
