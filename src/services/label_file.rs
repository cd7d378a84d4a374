use std::path::{Path, PathBuf};

use tracing::debug;

/// Label file path for an image: same directory and stem, `.txt` extension.
pub fn label_path_for(image_path: &Path) -> PathBuf {
    image_path.with_extension("txt")
}

/// Backup path for a label file: `<label>.bak`.
pub fn backup_path_for(label_path: &Path) -> PathBuf {
    let mut name = label_path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Writes validated detection text next to its image, keeping one backup
/// of the previous label file. Writing is split into [`backup`] and
/// [`commit`] so callers can re-check their state in between.
///
/// [`backup`]: LabelFileWriter::backup
/// [`commit`]: LabelFileWriter::commit
#[derive(Debug, Clone, Default)]
pub struct LabelFileWriter;

impl LabelFileWriter {
    pub fn new() -> Self {
        Self
    }

    /// Copy the image's current label file, if any, to its `.bak`. Returns
    /// the label path. The label itself is left as it was.
    pub async fn backup(&self, image_path: &Path) -> Result<PathBuf, LabelWriteError> {
        let label_path = label_path_for(image_path);
        if !tokio::fs::try_exists(&label_path).await.unwrap_or(false) {
            return Ok(label_path);
        }

        let backup_path = backup_path_for(&label_path);
        tokio::fs::copy(&label_path, &backup_path)
            .await
            .map_err(|source| LabelWriteError::Backup {
                path: backup_path.clone(),
                source,
            })?;
        Ok(label_path)
    }

    /// Replace the label file at `label_path` with `text`.
    pub async fn commit(&self, label_path: &Path, text: &str) -> Result<(), LabelWriteError> {
        tokio::fs::write(label_path, text.as_bytes())
            .await
            .map_err(|source| LabelWriteError::Write {
                path: label_path.to_path_buf(),
                source,
            })?;

        debug!(label = %label_path.display(), bytes = text.len(), "Label file written");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LabelWriteError {
    #[error("No class list loaded, {} left unchanged", path.display())]
    NoClasses { path: PathBuf },

    #[error("Cannot back up label file {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write label file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
