mod client;
mod fetch;
mod tree;

pub use client::{ErrorClass, FetchError, HttpFetcher};
pub use fetch::{Fetched, RemoteMeta, ResourceFetcher};
pub use tree::{Attachment, ContentNode, ContentTreeProvider, NavEntry, NodeKind, ProviderError};
