//! Catalogue configuration.
//!
//! Policy knobs for bulk creation (count caps, chunk sizes), the styles given
//! to new entities, and the key that switches drags into duplicate mode.
//! Loaded from RON; every field has a default, so a partial file is fine:
//!
//! ```ron
//! (
//!     max_folder_count: 1000,
//!     folder_chunk_size: 100,
//!     item_style: (icon: "star", color: "gold"),
//! )
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use catalogue_types::EntityStyle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueConfig {
    /// Upper clamp for a single folder creation request.
    pub max_folder_count: u32,
    /// Upper clamp for a single item creation request.
    pub max_item_count: u32,
    /// Folders appended per scheduler tick.
    pub folder_chunk_size: usize,
    /// Items appended per scheduler tick.
    pub item_chunk_size: usize,
    pub folder_style: EntityStyle,
    pub item_style: EntityStyle,
    /// Key identifier (as reported by the host keyboard stream) that turns a
    /// drag into a copy.
    pub duplicate_modifier: String,
    /// Broadcast capacity of the change flow bus.
    pub flow_capacity: usize,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            max_folder_count: 5000,
            max_item_count: 5000,
            folder_chunk_size: 250,
            item_chunk_size: 250,
            folder_style: EntityStyle::new("home", "#f1f2f7"),
            item_style: EntityStyle::new("circle", "white"),
            duplicate_modifier: "Shift".to_string(),
            flow_capacity: 1024,
        }
    }
}

impl CatalogueConfig {
    /// Parse and validate a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }

    /// Reject settings the engine cannot run with: zero caps, zero chunk
    /// sizes, a zero-capacity flow bus or an unnamed modifier key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_folder_count == 0 || self.max_item_count == 0 {
            return Err(ConfigError::Invalid("count caps must be at least 1".into()));
        }
        if self.folder_chunk_size == 0 || self.item_chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk sizes must be at least 1".into()));
        }
        if self.flow_capacity == 0 {
            return Err(ConfigError::Invalid("flow_capacity must be at least 1".into()));
        }
        if self.duplicate_modifier.is_empty() {
            return Err(ConfigError::Invalid("duplicate_modifier must name a key".into()));
        }
        Ok(())
    }

    /// Clamp a folder creation request to `[1, max_folder_count]`.
    pub fn clamp_folder_count(&self, requested: i64) -> Option<usize> {
        clamp_count(requested, self.max_folder_count)
    }

    /// Clamp an item creation request to `[1, max_item_count]`.
    pub fn clamp_item_count(&self, requested: i64) -> Option<usize> {
        clamp_count(requested, self.max_item_count)
    }

    /// Folders appended per tick. A zero that slipped past validation reads as 1.
    pub fn folder_chunk(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.folder_chunk_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Items appended per tick.
    pub fn item_chunk(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.item_chunk_size).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Clamp a requested count to `[1, max]`.
///
/// Exactly zero is a deliberate "do nothing" and yields `None`; negative
/// requests clamp up to 1.
pub fn clamp_count(requested: i64, max: u32) -> Option<usize> {
    if requested == 0 {
        return None;
    }
    let max = i64::from(max.max(1));
    Some(requested.clamp(1, max) as usize)
}
