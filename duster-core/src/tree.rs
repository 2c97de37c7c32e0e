use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("content list for {locator} could not be loaded: {reason}")]
    Load { locator: String, reason: String },
    #[error("course {0} is not available")]
    UnknownCourse(String),
    #[error("course list is not available: {0}")]
    CoursesUnavailable(String),
}

/// Kind of an entry in a page's content list, as labelled by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    File,
    Folder,
    Item,
    Assignment,
    WebLink,
    Unsupported(String),
}

impl NodeKind {
    pub fn label(&self) -> &str {
        match self {
            NodeKind::File => "File",
            NodeKind::Folder => "Content Folder",
            NodeKind::Item => "Item",
            NodeKind::Assignment => "Assignment",
            NodeKind::WebLink => "Web Link",
            NodeKind::Unsupported(label) => label,
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.trim() {
            "File" => NodeKind::File,
            "Content Folder" | "Folder" => NodeKind::Folder,
            "Item" => NodeKind::Item,
            "Assignment" => NodeKind::Assignment,
            "Web Link" => NodeKind::WebLink,
            _ => NodeKind::Unsupported(value),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Unsupported(label) => label,
            other => other.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    /// Fetch address for files, page address for folders.
    pub identifier: String,
    pub display_name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A course, or one page of a course's navigation menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavEntry {
    pub locator: String,
    pub name: String,
}

#[allow(async_fn_in_trait)]
pub trait ContentTreeProvider {
    async fn list_courses(&self) -> Result<Vec<NavEntry>, ProviderError>;

    async fn list_pages(&self, course: &NavEntry) -> Result<Vec<NavEntry>, ProviderError>;

    /// `Ok(None)` means the page has no content list at all, which is
    /// common and not an error.
    async fn list_children(
        &self,
        node_locator: &str,
    ) -> Result<Option<Vec<ContentNode>>, ProviderError>;

    async fn list_attachments(&self, node: &ContentNode) -> Result<Vec<Attachment>, ProviderError> {
        Ok(node.attachments.clone())
    }
}
