//! Persistence: save and load engine-owned state to a JSON file.
//! Enables recovery after restart: resting books, wallets, positions, trade
//! records, and the order-id high-water mark are restored.

use crate::engine::VenueSnapshot;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("snapshot io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// File-based persistence: one JSON file. Save on shutdown; load on startup.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: std::path::PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Saves the snapshot, overwriting any existing file.
    pub fn save(&self, snapshot: &VenueSnapshot) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Loads a snapshot. `None` if no file exists yet.
    pub fn load(&self) -> Result<Option<VenueSnapshot>, PersistError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}
