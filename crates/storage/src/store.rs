//! Persistence contract for tasks, transcripts and the audit log

use agent_hub_common::{
    AuditLogEntry, ConversationMessage, NewMessage, Result, Task, TaskId, TaskStatus,
};
use async_trait::async_trait;

/// Storage backend for the task pipeline.
///
/// Implementations must enforce:
/// - status changes follow [`TaskStatus::can_transition_to`]
/// - messages are only appended to existing tasks, with dense ordinals
/// - audit entries are never modified once written
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> Result<()>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Most recently created tasks first
    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>>;

    /// Move a task to `status`, recording `error` for failures.
    /// Sets `completed_at` when the new status is terminal.
    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<Task>;

    async fn append_message(&self, message: NewMessage) -> Result<ConversationMessage>;

    /// Transcript ordered by ordinal
    async fn list_messages(&self, task_id: &TaskId) -> Result<Vec<ConversationMessage>>;

    async fn record_audit(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Newest entries first
    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>>;

    async fn ping(&self) -> Result<()>;
}
