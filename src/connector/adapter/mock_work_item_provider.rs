use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::{WorkItem, WorkItemProvider};
use crate::domain::DomainError;

/// In-memory `WorkItemProvider` backed by a fixed fixture list, used for
/// tests and offline demos of the work-item indexing extension without a
/// real tracker connection.
pub struct MockWorkItemProvider {
    items: Mutex<Vec<WorkItem>>,
}

impl MockWorkItemProvider {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

impl Default for MockWorkItemProvider {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl WorkItemProvider for MockWorkItemProvider {
    async fn initialize(&self, _config: &serde_json::Value) -> Result<(), DomainError> {
        Ok(())
    }

    async fn get_items(&self, query: &str) -> Result<Vec<WorkItem>, DomainError> {
        let items = self.items.lock().await;
        if query.is_empty() {
            return Ok(items.clone());
        }
        let query = query.to_lowercase();
        Ok(items
            .iter()
            .filter(|item| {
                item.title.to_lowercase().contains(&query)
                    || item.description.to_lowercase().contains(&query)
                    || item.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .cloned()
            .collect())
    }
}
