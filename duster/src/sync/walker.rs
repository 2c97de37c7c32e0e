use std::fmt;
use std::hash::{Hash, Hasher};

use duster_core::{ContentNode, ContentTreeProvider, NodeKind};
use tracing::{debug, warn};

use super::paths::{SavePath, attachment_dir, resolve};

/// One fetchable file and where it belongs locally. Two resources are the
/// same resource when their source locators match.
#[derive(Debug, Clone)]
pub struct Resource {
    pub source_locator: String,
    pub display_name: String,
    pub save_path: SavePath,
}

impl Resource {
    pub fn new(
        source_locator: impl Into<String>,
        display_name: impl Into<String>,
        save_path: SavePath,
    ) -> Self {
        Self {
            source_locator: source_locator.into(),
            display_name: display_name.into(),
            save_path,
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.source_locator == other.source_locator
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_locator.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkIssue {
    LoadFailed { locator: String, reason: String },
    Unsupported { name: String, kind: String },
    Cycle { locator: String, name: String },
}

impl fmt::Display for WalkIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkIssue::LoadFailed { locator, reason } => {
                write!(f, "{locator} could not be loaded: {reason}")
            }
            WalkIssue::Unsupported { name, kind } => write!(
                f,
                "\"{name}\" is a {kind}, which is not supported; attachments were still collected"
            ),
            WalkIssue::Cycle { locator, name } => {
                write!(f, "folder \"{name}\" ({locator}) leads back to one of its parents")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Walk {
    pub resources: Vec<Resource>,
    pub issues: Vec<WalkIssue>,
}

struct PendingFolder {
    locator: String,
    save_path: SavePath,
    ancestors: Vec<String>,
}

pub struct TreeWalker<'a, P> {
    provider: &'a P,
}

impl<'a, P: ContentTreeProvider> TreeWalker<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Flattens the tree below `node_locator` into resources. A node's own
    /// files and attachments come first in document order, followed by each
    /// sub-folder's resources as one contiguous run.
    pub async fn walk(&self, node_locator: &str, save_path: SavePath) -> Walk {
        let mut walk = Walk::default();
        let mut stack = vec![PendingFolder {
            locator: node_locator.to_string(),
            save_path,
            ancestors: Vec::new(),
        }];

        while let Some(folder) = stack.pop() {
            let children = match self.provider.list_children(&folder.locator).await {
                Ok(Some(children)) => children,
                Ok(None) => {
                    debug!(locator = %folder.locator, "page has no content list");
                    continue;
                }
                Err(err) => {
                    warn!(locator = %folder.locator, "skipping node: {err}");
                    walk.issues.push(WalkIssue::LoadFailed {
                        locator: folder.locator,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let mut ancestors = folder.ancestors;
            ancestors.push(folder.locator);
            let mut subfolders = Vec::new();

            for child in &children {
                match &child.kind {
                    NodeKind::File => walk.resources.push(Resource::new(
                        child.identifier.as_str(),
                        child.display_name.as_str(),
                        folder.save_path.clone(),
                    )),
                    NodeKind::Folder if ancestors.contains(&child.identifier) => {
                        warn!(
                            locator = %child.identifier,
                            name = %child.display_name,
                            "folder points back at a parent, not descending"
                        );
                        walk.issues.push(WalkIssue::Cycle {
                            locator: child.identifier.clone(),
                            name: child.display_name.clone(),
                        });
                    }
                    NodeKind::Folder => subfolders.push(PendingFolder {
                        locator: child.identifier.clone(),
                        save_path: resolve(&folder.save_path, &child.display_name),
                        ancestors: ancestors.clone(),
                    }),
                    NodeKind::Item | NodeKind::Assignment | NodeKind::WebLink => {}
                    NodeKind::Unsupported(label) => {
                        warn!(name = %child.display_name, kind = %label, "unsupported item type");
                        walk.issues.push(WalkIssue::Unsupported {
                            name: child.display_name.clone(),
                            kind: label.clone(),
                        });
                    }
                }
                self.collect_attachments(child, &folder.save_path, &mut walk)
                    .await;
            }

            stack.extend(subfolders.into_iter().rev());
        }

        walk
    }

    async fn collect_attachments(&self, node: &ContentNode, parent: &SavePath, walk: &mut Walk) {
        let attachments = match self.provider.list_attachments(node).await {
            Ok(attachments) => attachments,
            Err(err) => {
                warn!(name = %node.display_name, "attachments could not be listed: {err}");
                walk.issues.push(WalkIssue::LoadFailed {
                    locator: node.identifier.clone(),
                    reason: err.to_string(),
                });
                return;
            }
        };
        let dir = attachment_dir(parent, &node.display_name, attachments.len());
        for attachment in attachments {
            walk.resources.push(Resource::new(
                attachment.locator,
                attachment.name.trim(),
                dir.clone(),
            ));
        }
    }
}

#[cfg(test)]
#[path = "walker_tests.rs"]
mod tests;
