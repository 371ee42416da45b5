//! In-process store, used when no database is configured

use agent_hub_common::{
    AuditLogEntry, ConversationMessage, HubError, NewMessage, Result, Task, TaskId, TaskStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::TaskStore;

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    messages: HashMap<TaskId, Vec<ConversationMessage>>,
    audit: Vec<AuditLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(HubError::validation(format!("task {} already exists", task.id)));
        }
        inner.tasks.insert(task.id.clone(), task.clone());
        inner.messages.insert(task.id.clone(), Vec::new());
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit.max(0) as usize);
        Ok(tasks)
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("task", id.as_str()))?;

        if !task.status.can_transition_to(status) {
            return Err(HubError::invalid_transition(task.status, status));
        }

        task.status = status;
        if error.is_some() {
            task.error = error;
        }
        if status.is_terminal() {
            task.completed_at = Some(Utc::now());
        }
        Ok(task.clone())
    }

    async fn append_message(&self, message: NewMessage) -> Result<ConversationMessage> {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&message.task_id) {
            return Err(HubError::not_found("task", message.task_id.as_str()));
        }

        let transcript = inner.messages.entry(message.task_id.clone()).or_default();
        let stored = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            task_id: message.task_id,
            ordinal: transcript.len() as i32,
            sender: message.sender,
            content: message.content,
            prompt: message.prompt,
            is_error: message.is_error,
            created_at: Utc::now(),
        };
        transcript.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, task_id: &TaskId) -> Result<Vec<ConversationMessage>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(task_id).cloned().unwrap_or_default())
    }

    async fn record_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.inner.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
