use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub item_type: String,
    pub state: String,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
    pub linked_code_paths: Vec<String>,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
}

impl WorkItem {
    /// Concatenation of the fields worth hashing for change detection and
    /// worth embedding as a Markdown document.
    pub fn as_markdown(&self) -> String {
        let mut doc = format!("# {}\n\n{}\n", self.title, self.description);
        if !self.tags.is_empty() {
            doc.push_str(&format!("\nTags: {}\n", self.tags.join(", ")));
        }
        doc.push_str(&format!("\nState: {}\n", self.state));
        doc
    }
}

/// Backlog/ticket source for the optional work-item indexing extension.
/// Implementations own their own authentication/config.
#[async_trait]
pub trait WorkItemProvider: Send + Sync {
    async fn initialize(&self, config: &serde_json::Value) -> Result<(), DomainError>;

    async fn get_items(&self, query: &str) -> Result<Vec<WorkItem>, DomainError>;
}
