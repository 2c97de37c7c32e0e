use std::collections::BTreeSet;

use anyhow::Context;
use duster_core::{ContentTreeProvider, HttpFetcher, NavEntry, ProviderError, ResourceFetcher};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::manifest::ManifestProvider;
use crate::sync::engine::SyncEngine;
use crate::sync::history::{HistoryError, HistoryStore};
use crate::sync::outcome::{CollisionReport, FailureReport, Outcome, RunSummary};
use crate::sync::paths::SavePath;
use crate::sync::retry::Retrying;
use crate::sync::walker::TreeWalker;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("course list could not be loaded: {0}")]
    Courses(#[source] ProviderError),
    #[error("download history could not be saved: {0}")]
    History(#[from] HistoryError),
}

/// Drives one mirroring pass: every course, every menu page not ignored,
/// every resource below it.
pub struct Runner<P, F> {
    provider: P,
    engine: SyncEngine<F>,
    history: HistoryStore,
    ignore: BTreeSet<String>,
}

impl<P: ContentTreeProvider, F: ResourceFetcher> Runner<P, F> {
    pub fn new(provider: P, engine: SyncEngine<F>, history: HistoryStore) -> Self {
        Self {
            provider,
            engine,
            history,
            ignore: BTreeSet::new(),
        }
    }

    pub fn with_ignored(mut self, pages: impl IntoIterator<Item = String>) -> Self {
        self.ignore.extend(pages);
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let courses = self
            .provider
            .list_courses()
            .await
            .map_err(RunError::Courses)?;
        info!(courses = courses.len(), "starting sync");

        let mut summary = RunSummary::default();
        for course in &courses {
            let pages = match self.provider.list_pages(course).await {
                Ok(pages) => pages,
                Err(err) => {
                    warn!(course = %course.name, "skipping course: {err}");
                    continue;
                }
            };
            info!(course = %course.name, pages = pages.len(), "syncing course");

            for page in &pages {
                if self.ignore.contains(page.name.trim()) {
                    debug!(course = %course.name, page = %page.name, "page ignored");
                    summary
                        .skipped_pages
                        .push(format!("{} / {}", course.name, page.name));
                    continue;
                }
                let page_summary = self.sync_page(course, page).await;
                summary.merge(page_summary);
                self.checkpoint().await;
            }
        }

        self.history.save().await?;
        info!(
            downloaded = summary.tally.downloaded,
            updated = summary.tally.updated,
            collisions = summary.tally.collision,
            failed = summary.tally.failed,
            "sync finished"
        );
        Ok(summary)
    }

    async fn sync_page(&mut self, course: &NavEntry, page: &NavEntry) -> RunSummary {
        info!(course = %course.name, page = %page.name, "walking page");
        let save_path = SavePath::root()
            .child(course.name.trim())
            .child(page.name.trim());
        let walk = TreeWalker::new(&self.provider)
            .walk(&page.locator, save_path)
            .await;

        let mut summary = RunSummary {
            walk_issues: walk.issues,
            ..RunSummary::default()
        };
        for resource in &walk.resources {
            match self.engine.synchronize(resource, &mut self.history).await {
                Ok(result) => {
                    summary.tally.record(result.outcome);
                    match (result.outcome, result.target) {
                        (Outcome::Collision, Some(path)) => {
                            warn!(
                                locator = %resource.source_locator,
                                path = %path.display(),
                                "another file is in the way"
                            );
                            summary.collisions.push(CollisionReport {
                                locator: resource.source_locator.clone(),
                                path,
                                identical: result.identical,
                            });
                        }
                        (outcome, Some(path)) => {
                            info!(%outcome, path = %path.display(), "{}", resource.display_name);
                        }
                        (outcome, None) => {
                            debug!(%outcome, "{}", resource.display_name);
                        }
                    }
                }
                Err(err) => {
                    warn!(locator = %resource.source_locator, "{err}");
                    summary.tally.record_failure();
                    summary.failures.push(FailureReport {
                        locator: resource.source_locator.clone(),
                        display_name: resource.display_name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        summary
    }

    async fn checkpoint(&mut self) {
        if !self.history.is_dirty() {
            return;
        }
        if let Err(err) = self.history.save().await {
            warn!("checkpoint failed, continuing: {err}");
        }
    }
}

/// Wires a runner from configuration: history, manifest-backed content tree
/// and an HTTP fetcher that retries transient failures.
pub async fn bootstrap(
    config: &RunConfig,
) -> anyhow::Result<Runner<ManifestProvider, Retrying<HttpFetcher>>> {
    let history = HistoryStore::load(config.history_path.clone())
        .await
        .context("could not load download history")?;
    let provider = ManifestProvider::load(&config.manifest_path)
        .await
        .context("could not load the content tree")?;

    let mut fetcher = HttpFetcher::new(&config.base_url)
        .with_context(|| format!("invalid base url {}", config.base_url))?;
    if let Some(cookie) = &config.cookie {
        fetcher = fetcher.with_cookie(cookie.clone());
    }
    let engine = SyncEngine::new(
        Retrying::new(fetcher, config.retries),
        config.save_root.clone(),
    );

    Ok(Runner::new(provider, engine, history).with_ignored(config.ignore.iter().cloned()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use duster_core::{FetchError, Fetched, RemoteMeta};
    use reqwest::StatusCode;
    use tempfile::tempdir;
    use time::OffsetDateTime;
    use time::macros::datetime;
    use url::Url;

    use super::*;
    use crate::manifest::Manifest;

    const MODIFIED: OffsetDateTime = datetime!(2024-03-01 12:00:00 UTC);

    #[derive(Default)]
    struct StaticFetcher {
        files: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        fn with(mut self, locator: &str, bytes: &[u8]) -> Self {
            self.files.insert(locator.to_string(), bytes.to_vec());
            self
        }
    }

    impl ResourceFetcher for StaticFetcher {
        async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError> {
            if self.files.contains_key(locator) {
                Ok(RemoteMeta {
                    last_modified: MODIFIED,
                })
            } else {
                Err(FetchError::Status {
                    status: StatusCode::NOT_FOUND,
                    locator: locator.to_string(),
                })
            }
        }

        async fn get(&self, locator: &str) -> Result<Fetched, FetchError> {
            let bytes = self.files.get(locator).cloned().ok_or_else(|| {
                FetchError::Status {
                    status: StatusCode::NOT_FOUND,
                    locator: locator.to_string(),
                }
            })?;
            Ok(Fetched {
                resolved: Url::parse(&format!("https://lms.example{locator}"))?,
                bytes,
            })
        }
    }

    fn manifest() -> Manifest {
        serde_json::from_value(serde_json::json!({
            "courses": [{
                "locator": "/course/bio101",
                "name": "Bio101",
                "pages": [
                    { "locator": "/page/announcements", "name": "Announcements" },
                    { "locator": "/page/notes", "name": "Lecture Notes" }
                ]
            }],
            "nodes": {
                "/page/announcements": [
                    { "identifier": "/files/news.pdf", "display_name": "news.pdf", "kind": "File" }
                ],
                "/page/notes": [
                    { "identifier": "/files/week1.pdf", "display_name": "Week 1", "kind": "File" },
                    { "identifier": "/files/missing.pdf", "display_name": "Missing", "kind": "File" },
                    { "identifier": "/folder/labs", "display_name": "Labs", "kind": "Content Folder" }
                ],
                "/folder/labs": [
                    { "identifier": "/files/lab1.pdf", "display_name": "Lab 1", "kind": "File" }
                ]
            }
        }))
        .unwrap()
    }

    fn fetcher() -> StaticFetcher {
        StaticFetcher::default()
            .with("/files/news.pdf", b"news")
            .with("/files/week1.pdf", b"week one")
            .with("/files/lab1.pdf", b"lab one")
    }

    #[tokio::test]
    async fn mirrors_pages_and_skips_ignored_ones() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let mut runner = Runner::new(
            ManifestProvider::new(manifest()),
            SyncEngine::new(fetcher(), dir.path()),
            HistoryStore::empty(&history_path),
        )
        .with_ignored(["Announcements".to_string()]);

        let summary = runner.run().await.unwrap();

        assert_eq!(summary.tally.downloaded, 2);
        assert_eq!(summary.tally.failed, 1);
        assert_eq!(summary.failures[0].locator, "/files/missing.pdf");
        assert_eq!(summary.skipped_pages, vec!["Bio101 / Announcements"]);
        assert!(dir.path().join("Bio101/Lecture Notes/week1.pdf").exists());
        assert!(dir.path().join("Bio101/Lecture Notes/Labs/lab1.pdf").exists());
        assert!(!dir.path().join("Bio101/Announcements").exists());

        let reloaded = HistoryStore::load(&history_path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.get("/files/missing.pdf").is_none());
    }

    #[tokio::test]
    async fn second_run_finds_only_duplicates() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let mut first = Runner::new(
            ManifestProvider::new(manifest()),
            SyncEngine::new(fetcher(), dir.path()),
            HistoryStore::empty(&history_path),
        );
        first.run().await.unwrap();

        let mut second = Runner::new(
            ManifestProvider::new(manifest()),
            SyncEngine::new(fetcher(), dir.path()),
            HistoryStore::load(&history_path).await.unwrap(),
        );
        let summary = second.run().await.unwrap();

        assert_eq!(summary.tally.downloaded, 0);
        assert_eq!(summary.tally.duplicate, 3);
        assert_eq!(summary.tally.failed, 1);
        assert_eq!(second.history().len(), 3);
    }

    /// Calls `hook` before each metadata request, so a test can look at the
    /// disk while the run is still going.
    struct Hooked<H> {
        inner: StaticFetcher,
        hook: H,
    }

    impl<H: Fn(&str)> ResourceFetcher for Hooked<H> {
        async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError> {
            (self.hook)(locator);
            self.inner.head(locator).await
        }

        async fn get(&self, locator: &str) -> Result<Fetched, FetchError> {
            self.inner.get(locator).await
        }
    }

    fn recorded_locators(history_path: &std::path::Path) -> Vec<String> {
        let raw = std::fs::read(history_path).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        doc["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["source_locator"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn history_is_flushed_after_each_page() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let seen_mid_run = Arc::new(Mutex::new(None));
        let hook = {
            let path = history_path.clone();
            let seen = Arc::clone(&seen_mid_run);
            move |locator: &str| {
                if locator == "/files/week1.pdf" {
                    *seen.lock().unwrap() = Some(recorded_locators(&path));
                }
            }
        };
        let mut runner = Runner::new(
            ManifestProvider::new(manifest()),
            SyncEngine::new(
                Hooked {
                    inner: fetcher(),
                    hook,
                },
                dir.path(),
            ),
            HistoryStore::empty(&history_path),
        );

        runner.run().await.unwrap();

        // While the second page was running, the first page's download was
        // already on disk.
        assert_eq!(
            seen_mid_run.lock().unwrap().clone(),
            Some(vec!["/files/news.pdf".to_string()])
        );
        assert_eq!(recorded_locators(&history_path).len(), 3);
    }

    #[tokio::test]
    async fn failed_checkpoint_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let history_path = blocker.join("history.json");
        let hook = {
            let blocker = blocker.clone();
            let path = history_path.clone();
            move |locator: &str| {
                if locator == "/files/week1.pdf" {
                    assert!(!path.exists());
                    std::fs::remove_file(&blocker).unwrap();
                }
            }
        };
        let mut runner = Runner::new(
            ManifestProvider::new(manifest()),
            SyncEngine::new(
                Hooked {
                    inner: fetcher(),
                    hook,
                },
                dir.path(),
            ),
            HistoryStore::empty(&history_path),
        );

        let summary = runner.run().await.unwrap();

        assert_eq!(summary.tally.downloaded, 3);
        assert!(dir.path().join("Bio101/Lecture Notes/Labs/lab1.pdf").exists());
        assert_eq!(recorded_locators(&history_path).len(), 3);
    }

    struct Unreachable;

    impl ContentTreeProvider for Unreachable {
        async fn list_courses(&self) -> Result<Vec<NavEntry>, ProviderError> {
            Err(ProviderError::CoursesUnavailable("session expired".into()))
        }

        async fn list_pages(&self, course: &NavEntry) -> Result<Vec<NavEntry>, ProviderError> {
            Err(ProviderError::UnknownCourse(course.name.clone()))
        }

        async fn list_children(
            &self,
            _node_locator: &str,
        ) -> Result<Option<Vec<duster_core::ContentNode>>, ProviderError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn unreachable_course_list_is_fatal() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let mut runner = Runner::new(
            Unreachable,
            SyncEngine::new(fetcher(), dir.path()),
            HistoryStore::empty(&history_path),
        );

        assert!(matches!(runner.run().await, Err(RunError::Courses(_))));
        assert!(!history_path.exists());
    }
}
