//! Settings error types.

use std::path::{Path, PathBuf};

/// Errors from loading or persisting the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A filesystem operation on the settings path failed, read or write.
    #[error("settings io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid RON for the settings schema.
    #[error("failed to parse settings: {0}")]
    Parse(#[source] ron::error::SpannedError),

    /// Settings could not be serialized back to RON.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] ron::Error),
}

impl SettingsError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
