//! Read-through Redis cache in front of another [`TaskStore`]

use agent_hub_common::{
    AuditLogEntry, ConversationMessage, NewMessage, Result, Task, TaskId, TaskStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::redis::RedisCache;
use crate::store::TaskStore;

/// Caches task snapshots; the inner store stays authoritative.
/// Cache failures degrade to direct reads.
///
/// Only terminal tasks are cached. A terminal task never changes again, so a
/// read that races a status update can never leave an outdated snapshot
/// behind.
pub struct CachedTaskStore {
    inner: Arc<dyn TaskStore>,
    cache: RedisCache,
    ttl_secs: u64,
}

impl CachedTaskStore {
    pub fn new(inner: Arc<dyn TaskStore>, cache: RedisCache, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }

    fn task_key(&self, id: &TaskId) -> String {
        self.cache.key(&format!("task:{}", id))
    }

    async fn store_snapshot(&self, key: &str, task: &Task) {
        if let Err(e) = self.cache.set_json_ex(key, task, self.ttl_secs).await {
            warn!(error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, id: &TaskId) {
        if let Err(e) = self.cache.delete(&self.task_key(id)).await {
            warn!(task_id = %id, error = %e, "Failed to invalidate cached task");
        }
    }
}

#[async_trait]
impl TaskStore for CachedTaskStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        self.inner.create_task(task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let key = self.task_key(id);
        match self.cache.get_json::<Task>(&key).await {
            Ok(Some(task)) => {
                debug!("Cache hit for key: {}", key);
                return Ok(Some(task));
            }
            Ok(None) => debug!("Cache miss for key: {}", key),
            Err(e) => warn!(error = %e, "Cache read failed, falling back to store"),
        }

        let task = self.inner.get_task(id).await?;
        if let Some(task) = task.as_ref().filter(|task| task.status.is_terminal()) {
            self.store_snapshot(&key, task).await;
        }
        Ok(task)
    }

    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        self.inner.list_tasks(limit).await
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<Task> {
        let result = self.inner.update_status(id, status, error).await;
        match &result {
            Ok(task) if task.status.is_terminal() => {
                self.store_snapshot(&self.task_key(id), task).await
            }
            _ => self.invalidate(id).await,
        }
        result
    }

    async fn append_message(&self, message: NewMessage) -> Result<ConversationMessage> {
        self.inner.append_message(message).await
    }

    async fn list_messages(&self, task_id: &TaskId) -> Result<Vec<ConversationMessage>> {
        self.inner.list_messages(task_id).await
    }

    async fn record_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.inner.record_audit(entry).await
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.inner.list_audit(limit).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await?;
        if let Err(e) = self.cache.ping().await {
            warn!(error = %e, "Redis ping failed");
        }
        Ok(())
    }
}
