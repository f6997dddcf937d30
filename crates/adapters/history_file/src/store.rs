//! [`StartupHistoryStore`] over one text file.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use autostart_app::ports::StartupHistoryStore;
use autostart_app::ports::history::HistorySnapshot;
use autostart_domain::error::AutoStartError;

use crate::error::HistoryFileError;
use crate::format::{parse, render};

/// Startup history kept in a text file.
///
/// Saves are serialised and written to a sibling temporary file that is
/// then renamed over the target, so readers never see a partial file.
pub struct FileHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryFileError {
        HistoryFileError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read(&self) -> Result<HistorySnapshot, HistoryFileError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no startup history file yet");
                return Ok(HistorySnapshot::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        let snapshot = parse(&String::from_utf8(bytes)?);
        tracing::debug!(path = %self.path.display(), servers = snapshot.len(), "read startup history");
        Ok(snapshot)
    }

    async fn write(&self, snapshot: &HistorySnapshot) -> Result<(), HistoryFileError> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, render(snapshot))
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        tracing::debug!(path = %self.path.display(), servers = snapshot.len(), "saved startup history");
        Ok(())
    }
}

impl StartupHistoryStore for FileHistoryStore {
    fn load(&self) -> impl Future<Output = Result<HistorySnapshot, AutoStartError>> + Send {
        async move { Ok(self.read().await?) }
    }

    fn save(
        &self,
        snapshot: HistorySnapshot,
    ) -> impl Future<Output = Result<(), AutoStartError>> + Send {
        async move { Ok(self.write(&snapshot).await?) }
    }
}
