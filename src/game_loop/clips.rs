use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREFIX: &str = "iter_";
const EXTENSION: &str = ".mp4";

/// Directory of per-iteration clips kept for inspection.
#[derive(Debug, Clone)]
pub struct ClipStore {
    dir: Arc<PathBuf>,
}

impl ClipStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, iteration: u64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{iteration:04}{EXTENSION}"))
    }

    pub fn url_for(iteration: u64) -> String {
        format!("/api/clips/{iteration}")
    }

    /// Write the clip analysed by `iteration` and return its URL.
    pub async fn save(&self, iteration: u64, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(self.dir.as_path())
            .await
            .with_context(|| format!("Failed to create clip dir {}", self.dir.display()))?;
        let path = self.path_for(iteration);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!(
            "Saved debug clip {} ({}KB)",
            path.display(),
            bytes.len() / 1024
        );
        Ok(Self::url_for(iteration))
    }

    /// Existing clip for `iteration`, if any.
    pub async fn find(&self, iteration: u64) -> Option<PathBuf> {
        let path = self.path_for(iteration);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Delete clips left over from an earlier run. Returns how many went.
    pub async fn purge(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(self.dir.as_path()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to list {}", self.dir.display()))
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(PREFIX) && name.ends_with(EXTENSION)) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("Could not remove stale clip {name}: {err}"),
            }
        }
        Ok(removed)
    }
}
