use std::future::Future;

use duster_core::{FetchError, Fetched, RemoteMeta, ResourceFetcher};
use tracing::warn;

use super::backoff::Backoff;

/// Retries transient fetch failures (timeouts, 429, 5xx) a bounded number of
/// times before handing the error back.
pub struct Retrying<F> {
    inner: F,
    backoff: Backoff,
    retries: u32,
}

impl<F> Retrying<F> {
    pub fn new(inner: F, retries: u32) -> Self {
        Self {
            inner,
            backoff: Backoff::default(),
            retries,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    async fn run<T, Fut>(
        &self,
        what: &str,
        locator: &str,
        op: impl Fn() -> Fut,
    ) -> Result<T, FetchError>
    where
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    warn!(
                        locator,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{what} failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<F: ResourceFetcher> ResourceFetcher for Retrying<F> {
    async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError> {
        self.run("metadata request", locator, || self.inner.head(locator))
            .await
    }

    async fn get(&self, locator: &str) -> Result<Fetched, FetchError> {
        self.run("download", locator, || self.inner.get(locator))
            .await
    }
}
