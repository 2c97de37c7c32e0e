use time::OffsetDateTime;
use url::Url;

use crate::client::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMeta {
    pub last_modified: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    /// Address the body was finally served from, after redirects.
    pub resolved: Url,
    pub bytes: Vec<u8>,
}

#[allow(async_fn_in_trait)]
pub trait ResourceFetcher {
    async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError>;

    async fn get(&self, locator: &str) -> Result<Fetched, FetchError>;
}

impl<F: ResourceFetcher> ResourceFetcher for &F {
    async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError> {
        (**self).head(locator).await
    }

    async fn get(&self, locator: &str) -> Result<Fetched, FetchError> {
        (**self).get(locator).await
    }
}
