//! Per-request staging directories
//!
//! Each execution gets its own uniquely named directory holding exactly one
//! entry file. The directory is bind-mounted into the sandbox and removed
//! when the request finishes, however it finishes.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "codecell-";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid entry file name: {0}")]
    InvalidPath(String),

    #[error("failed to stage workspace under {root}: {source}")]
    Stage {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An exclusively owned staging directory with one entry file
///
/// Call [`unstage()`](Self::unstage) when done. Dropping the workspace also
/// removes the directory, so every exit path (including panics and
/// cancelled futures) releases it.
#[derive(Debug)]
pub struct Workspace {
    /// Owned directory; `None` once unstaged
    dir: Option<TempDir>,

    /// Absolute path of the directory
    path: PathBuf,

    /// Name of the entry file inside the directory
    entry: String,
}

impl Workspace {
    /// Create a fresh directory under `root` and write `source` verbatim
    ///
    /// `root` is created if missing. The returned path is absolute so it can
    /// be used as a bind mount source.
    #[instrument(skip(source), fields(len = source.len()))]
    pub async fn stage(
        root: &Path,
        entry_filename: &str,
        source: &str,
    ) -> Result<Self, WorkspaceError> {
        if entry_filename.is_empty()
            || entry_filename.contains('/')
            || entry_filename.contains('\\')
            || entry_filename.contains("..")
        {
            return Err(WorkspaceError::InvalidPath(entry_filename.to_owned()));
        }

        let stage_err = |source| WorkspaceError::Stage {
            root: root.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(root).await.map_err(stage_err)?;
        let root = tokio::fs::canonicalize(root).await.map_err(stage_err)?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&root)
            .map_err(stage_err)?;
        let path = dir.path().to_path_buf();

        tokio::fs::write(path.join(entry_filename), source)
            .await
            .map_err(stage_err)?;

        debug!(?path, entry_filename, "workspace staged");

        Ok(Self {
            dir: Some(dir),
            path,
            entry: entry_filename.to_owned(),
        })
    }

    /// Absolute path of the staging directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Host path of the entry file
    pub fn entry_path(&self) -> PathBuf {
        self.path.join(&self.entry)
    }

    /// Name of the entry file
    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    /// Check if the workspace still owns its directory
    pub fn is_staged(&self) -> bool {
        self.dir.is_some()
    }

    /// Remove the staging directory
    ///
    /// Idempotent. Failures, including the directory already being gone, are
    /// logged and never returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn unstage(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!("workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("workspace already removed")
            }
            Err(e) => warn!(error = %e, "failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            debug!(path = %self.path.display(), "workspace dropped while staged, removing");
            self.unstage();
        }
    }
}
