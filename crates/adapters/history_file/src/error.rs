//! Errors of the history file store.

use std::path::PathBuf;

use autostart_domain::error::AutoStartError;

/// Errors originating from the history file.
#[derive(Debug, thiserror::Error)]
pub enum HistoryFileError {
    /// Reading, writing or renaming the file failed.
    #[error("history file io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not text.
    #[error("history file is not valid UTF-8")]
    Parse(#[from] std::string::FromUtf8Error),
}

impl From<HistoryFileError> for AutoStartError {
    fn from(err: HistoryFileError) -> Self {
        Self::Storage(Box::new(err))
    }
}
