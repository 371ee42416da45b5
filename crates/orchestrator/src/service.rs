//! Task submission shared by the HTTP API and email intake

use agent_hub_common::{
    AgentId, AuditAction, AuditLogEntry, ExecutionMode, HubError, Result, Task, TaskOrigin,
    TaskStatus,
};
use agent_hub_storage::TaskStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::dispatcher::Dispatcher;
use crate::registry::AgentRegistry;

#[derive(Debug, Clone)]
pub struct SubmitTask {
    pub description: String,
    pub agents: Vec<AgentId>,
    pub mode: ExecutionMode,
    pub origin: TaskOrigin,
}

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    registry: Arc<AgentRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<AgentRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
        }
    }

    /// Validate, persist and enqueue a task.
    ///
    /// Once persisted the task is always returned: if it cannot be queued it
    /// comes back `failed` with the reason.
    #[instrument(skip(self, request), fields(agents = request.agents.len(), mode = request.mode.name()))]
    pub async fn submit(&self, request: SubmitTask) -> Result<Task> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(HubError::validation("description must not be empty"));
        }
        if request.agents.is_empty() {
            return Err(HubError::validation("at least one agent is required"));
        }
        if let ExecutionMode::Parallel {
            max_concurrency: Some(0),
        } = request.mode
        {
            return Err(HubError::validation("max_concurrency must be at least 1"));
        }
        self.registry.resolve(&request.agents)?;

        let actor = match &request.origin {
            TaskOrigin::Api => "api".to_string(),
            TaskOrigin::Email { sender, .. } => sender.clone(),
        };
        let task = Task::new(description, request.agents, request.mode, request.origin);
        self.store.create_task(&task).await?;

        info!(target: "audit", action = "task_created", actor = %actor, task_id = %task.id, "Audit event");
        self.store
            .record_audit(&AuditLogEntry::new(
                AuditAction::TaskCreated,
                actor,
                Some(task.id.clone()),
                format!("{} agents, {} mode", task.agents.len(), task.mode.name()),
            ))
            .await?;

        if let Err(e) = self.dispatcher.enqueue(task.id.clone()).await {
            warn!(task_id = %task.id, error = %e, "Could not queue task");
            let reason = e.to_string();
            let failed = self
                .store
                .update_status(&task.id, TaskStatus::Failed, Some(reason.clone()))
                .await?;
            self.store
                .record_audit(&AuditLogEntry::new(
                    AuditAction::TaskFailed,
                    "dispatcher",
                    Some(task.id.clone()),
                    reason,
                ))
                .await?;
            return Ok(failed);
        }

        info!(task_id = %task.id, "Task submitted");
        Ok(self.store.get_task(&task.id).await?.unwrap_or(task))
    }
}
