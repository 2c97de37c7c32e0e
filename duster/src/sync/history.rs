use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::paths::{SavePath, partial_path};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error on history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history file {path} will not parse: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("history file {path} lists {locator} more than once")]
    DuplicateRecord { path: PathBuf, locator: String },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub source_locator: String,
    pub display_name: String,
    pub save_path: SavePath,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// Name the body was saved under; absent in histories from older runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
}

#[derive(Deserialize)]
struct HistoryFile {
    #[serde(default)]
    records: Vec<HistoryRecord>,
}

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    records: Vec<&'a HistoryRecord>,
}

/// Download history keyed by source locator, persisted as one JSON document.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    records: BTreeMap<String, HistoryRecord>,
    dirty: bool,
}

impl HistoryStore {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "history file not found, starting a new one");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(HistoryError::Io { path, source }),
        };
        let file: HistoryFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(source) => return Err(HistoryError::Parse { path, source }),
        };

        let mut records = BTreeMap::new();
        for record in file.records {
            let locator = record.source_locator.clone();
            if records.insert(locator.clone(), record).is_some() {
                return Err(HistoryError::DuplicateRecord { path, locator });
            }
        }
        debug!(path = %path.display(), records = records.len(), "history loaded");
        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, locator: &str) -> Option<&HistoryRecord> {
        self.records.get(locator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values()
    }

    /// Adds a record for a locator seen for the first time. An existing
    /// record for the same locator is replaced and returned.
    pub fn insert(&mut self, record: HistoryRecord) -> Option<HistoryRecord> {
        self.dirty = true;
        self.records.insert(record.source_locator.clone(), record)
    }

    /// Mutates the record for `locator` in place; returns false if there is none.
    pub fn update_in_place(
        &mut self,
        locator: &str,
        update: impl FnOnce(&mut HistoryRecord),
    ) -> bool {
        match self.records.get_mut(locator) {
            Some(record) => {
                update(record);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Overwrites the history file with the full in-memory state.
    pub async fn save(&mut self) -> Result<(), HistoryError> {
        let document = HistoryFileRef {
            records: self.records.values().collect(),
        };
        let mut body = serde_json::to_vec_pretty(&document)?;
        body.push(b'\n');

        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let partial = partial_path(&self.path);
        let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
        file.write_all(&body).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(io_err)?;

        self.dirty = false;
        debug!(path = %self.path.display(), records = self.records.len(), "history saved");
        Ok(())
    }
}
