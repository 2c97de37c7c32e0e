use std::io;
use std::path::{Path, PathBuf};

use duster_core::{FetchError, ResourceFetcher};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::history::{HistoryRecord, HistoryStore};
use super::outcome::Outcome;
use super::paths::{file_name_from_url, local_dir_for, partial_path, sanitize_segment};
use super::walker::Resource;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metadata request for {locator} failed: {source}")]
    Metadata {
        locator: String,
        #[source]
        source: FetchError,
    },
    #[error("download of {locator} failed: {source}")]
    Download {
        locator: String,
        #[source]
        source: FetchError,
    },
    #[error("no file name could be derived for {0}")]
    NoFileName(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn is_metadata(&self) -> bool {
        matches!(self, EngineError::Metadata { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub outcome: Outcome,
    /// Where the body went, or for a collision, the file that was in the way.
    pub target: Option<PathBuf>,
    /// For a collision: the file in the way already has the fetched bytes.
    pub identical: bool,
}

impl SyncResult {
    fn duplicate() -> Self {
        Self {
            outcome: Outcome::Duplicate,
            target: None,
            identical: false,
        }
    }
}

pub struct SyncEngine<F> {
    fetcher: F,
    save_root: PathBuf,
}

impl<F: ResourceFetcher> SyncEngine<F> {
    pub fn new(fetcher: F, save_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            save_root: save_root.into(),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Brings one resource up to date with the remote copy.
    ///
    /// Duplicates and collisions are ordinary results. Only a failed
    /// metadata request, a failed download or a local I/O failure is an
    /// error, and none of those touch the history.
    pub async fn synchronize(
        &self,
        resource: &Resource,
        history: &mut HistoryStore,
    ) -> Result<SyncResult, EngineError> {
        let locator = resource.source_locator.as_str();
        let meta = self
            .fetcher
            .head(locator)
            .await
            .map_err(|source| EngineError::Metadata {
                locator: locator.to_string(),
                source,
            })?;

        let (outcome, known_md5) = match history.get(locator) {
            None => (Outcome::Downloaded, None),
            Some(record) if meta.last_modified <= record.last_modified => {
                debug!(locator, "unchanged since last download");
                return Ok(SyncResult::duplicate());
            }
            Some(record) => (Outcome::Updated, record.content_md5.clone()),
        };

        let fetched = self
            .fetcher
            .get(locator)
            .await
            .map_err(|source| EngineError::Download {
                locator: locator.to_string(),
                source,
            })?;
        let file_name = file_name_from_url(&fetched.resolved)
            .or_else(|| {
                let name = resource.display_name.trim();
                (!name.is_empty()).then(|| sanitize_segment(name))
            })
            .ok_or_else(|| EngineError::NoFileName(locator.to_string()))?;

        let dir = local_dir_for(&self.save_root, &resource.save_path);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| EngineError::Io {
                path: dir.clone(),
                source,
            })?;
        let target = dir.join(&file_name);
        let digest = md5_hex(&fetched.bytes);

        match write_new(&target, &fetched.bytes).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let existing = tokio::fs::read(&target)
                    .await
                    .ok()
                    .map(|bytes| md5_hex(&bytes));
                let own_copy = outcome == Outcome::Updated
                    && known_md5.is_some()
                    && existing == known_md5;
                if !own_copy {
                    debug!(locator, path = %target.display(), "file in the way, not overwriting");
                    return Ok(SyncResult {
                        outcome: Outcome::Collision,
                        identical: existing.as_deref() == Some(digest.as_str()),
                        target: Some(target),
                    });
                }
                replace(&target, &fetched.bytes)
                    .await
                    .map_err(|source| EngineError::Io {
                        path: target.clone(),
                        source,
                    })?;
            }
            Err(source) => {
                return Err(EngineError::Io {
                    path: target,
                    source,
                });
            }
        }

        match outcome {
            Outcome::Updated => {
                history.update_in_place(locator, |record| {
                    record.display_name = resource.display_name.clone();
                    record.save_path = resource.save_path.clone();
                    record.last_modified = meta.last_modified;
                    record.file_name = Some(file_name);
                    record.content_md5 = Some(digest);
                });
            }
            _ => {
                history.insert(HistoryRecord {
                    source_locator: locator.to_string(),
                    display_name: resource.display_name.clone(),
                    save_path: resource.save_path.clone(),
                    last_modified: meta.last_modified,
                    file_name: Some(file_name),
                    content_md5: Some(digest),
                });
            }
        }

        debug!(locator, %outcome, path = %target.display(), "saved");
        Ok(SyncResult {
            outcome,
            target: Some(target),
            identical: false,
        })
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Stages the body next to `target` and links it into place only if nothing
/// exists there yet. An interrupted write leaves at most a stale partial,
/// never a truncated file under the real name.
async fn write_new(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = write_partial(target, bytes).await?;
    let linked = tokio::fs::hard_link(&partial, target).await;
    let _ = tokio::fs::remove_file(&partial).await;
    linked
}

async fn replace(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = write_partial(target, bytes).await?;
    if let Err(err) = tokio::fs::rename(&partial, target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    Ok(())
}

async fn write_partial(target: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let partial = partial_path(target);
    // A fresh inode, so a write still in flight from a dropped run cannot
    // land in this copy.
    let _ = tokio::fs::remove_file(&partial).await;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&partial)
        .await?;
    if let Err(err) = write_synced(&mut file, bytes).await {
        drop(file);
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    Ok(partial)
}

async fn write_synced(file: &mut tokio::fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
