//! Upload staging: résumés are written to the upload directory for the lifetime
//! of one request and always removed afterwards.
//!
//! Staged names are `<unix-millis>-<8 hex>-<original name>`. The random part keeps
//! concurrent uploads of the same file in the same millisecond apart, and files are
//! opened create-new so a collision fails instead of overwriting.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use uuid::Uuid;

const FALLBACK_FILE_NAME: &str = "upload";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to prepare upload directory {path}: {source}")]
    Dir { path: PathBuf, source: io::Error },

    #[error("failed to stage upload {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Handle on the upload directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the upload directory (and parents) if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| UploadError::Dir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Writes `bytes` to a fresh file in the upload directory.
    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<StagedUpload, UploadError> {
        let original_name = sanitize_file_name(original_name);
        let path = self.dir.join(staged_file_name(&original_name));

        let write_err = |source| UploadError::Write {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;

        // From here on the guard owns the file, so a failed write still cleans up.
        let staged = StagedUpload {
            path: path.clone(),
            original_name,
            removed: false,
        };

        file.write_all(bytes).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!("Staged upload {} ({} bytes)", path.display(), bytes.len());
        Ok(staged)
    }
}

/// A résumé written to the upload directory. The file is deleted by `remove`, or
/// by `Drop` if the owning request is abandoned before it gets that far.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    original_name: String,
    removed: bool,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The client-supplied file name after sanitizing.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Deletes the staged file. Failures are logged, never returned.
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!("Removed staged upload {}", self.path.display()),
            Err(e) => log_remove_failure(&self.path, &e),
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Removed abandoned upload {}", self.path.display()),
            Err(e) => log_remove_failure(&self.path, &e),
        }
    }
}

fn log_remove_failure(path: &Path, e: &io::Error) {
    if e.kind() == io::ErrorKind::NotFound {
        debug!("Staged upload {} already gone", path.display());
    } else {
        error!("Failed to remove staged upload {}: {e}", path.display());
    }
}

fn staged_file_name(original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}-{original_name}", &suffix[..8])
}

/// Keeps only the base name of a client-supplied file name.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}
