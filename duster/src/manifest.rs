//! Content tree read from a JSON manifest.
//!
//! The manifest is what a site scraper leaves behind: the course list, each
//! course's menu pages, and the content list of every page or folder it
//! visited, keyed by that node's locator. A node missing from `nodes` had no
//! content list.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use duster_core::{ContentNode, ContentTreeProvider, NavEntry, ProviderError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {path} will not parse: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestCourse {
    pub locator: String,
    pub name: String,
    #[serde(default)]
    pub pages: Vec<NavEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub courses: Vec<ManifestCourse>,
    #[serde(default)]
    pub nodes: HashMap<String, Vec<ContentNode>>,
}

pub struct ManifestProvider {
    manifest: Manifest,
}

impl ManifestProvider {
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest }
    }

    pub async fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let manifest = serde_json::from_slice(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(manifest))
    }
}

impl ContentTreeProvider for ManifestProvider {
    async fn list_courses(&self) -> Result<Vec<NavEntry>, ProviderError> {
        Ok(self
            .manifest
            .courses
            .iter()
            .map(|course| NavEntry {
                locator: course.locator.clone(),
                name: course.name.clone(),
            })
            .collect())
    }

    async fn list_pages(&self, course: &NavEntry) -> Result<Vec<NavEntry>, ProviderError> {
        self.manifest
            .courses
            .iter()
            .find(|candidate| candidate.locator == course.locator)
            .map(|found| found.pages.clone())
            .ok_or_else(|| ProviderError::UnknownCourse(course.name.clone()))
    }

    async fn list_children(
        &self,
        node_locator: &str,
    ) -> Result<Option<Vec<ContentNode>>, ProviderError> {
        Ok(self.manifest.nodes.get(node_locator).cloned())
    }
}
