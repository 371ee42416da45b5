//! Runs a task's agents and records every outcome

use agent_hub_common::{
    AgentId, AgentProfile, AuditAction, AuditLogEntry, ConversationMessage, ExecutionMode,
    HubError, MessageSender, NewMessage, Result, SequentialFailurePolicy, Task, TaskEvent, TaskId,
    TaskStatus,
};
use agent_hub_storage::TaskStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::events::EventHub;
use crate::llm::{CompletionBackend, CompletionRequest};
use crate::registry::AgentRegistry;

const ACTOR: &str = "orchestrator";
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// What one agent produced
type AgentOutcome = std::result::Result<String, String>;

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    registry: Arc<AgentRegistry>,
    backend: Arc<dyn CompletionBackend>,
    events: Arc<EventHub>,
    max_context_chars: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<AgentRegistry>,
        backend: Arc<dyn CompletionBackend>,
        events: Arc<EventHub>,
    ) -> Self {
        Self {
            store,
            registry,
            backend,
            events,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars.max(1);
        self
    }

    /// Drive a pending task to a terminal state.
    ///
    /// Agent failures never fail the task on their own (except under
    /// [`SequentialFailurePolicy::Abort`]); they become error-marked
    /// messages. A persistence failure marks the task failed on a best-effort
    /// basis and is returned.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn run(&self, task_id: &TaskId) -> Result<Task> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| HubError::not_found("task", task_id.as_str()))?;

        let profiles = match self.registry.resolve(&task.agents) {
            Ok(profiles) => profiles,
            Err(e) => {
                self.fail_best_effort(task_id, e.to_string()).await;
                return Err(e);
            }
        };

        let task = self
            .store
            .update_status(task_id, TaskStatus::Running, None)
            .await?;
        info!(agents = profiles.len(), mode = task.mode.name(), "Task started");

        match self.execute(&task, &profiles).await {
            Ok(None) => self.finish(&task, TaskStatus::Completed, None).await,
            Ok(Some(reason)) => self.finish(&task, TaskStatus::Failed, Some(reason)).await,
            Err(e) => {
                error!(error = %e, "Orchestration aborted by persistence failure");
                self.fail_best_effort(task_id, e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Returns the failure reason when the run was aborted
    async fn execute(&self, task: &Task, profiles: &[AgentProfile]) -> Result<Option<String>> {
        self.audit(
            AuditAction::TaskStarted,
            ACTOR,
            &task.id,
            format!("{} agents, {} mode", profiles.len(), task.mode.name()),
        )
        .await?;
        self.events.publish(TaskEvent::TaskProgress {
            task_id: task.id.clone(),
            status: TaskStatus::Running,
            completed: 0,
            total: profiles.len(),
        });

        match &task.mode {
            ExecutionMode::Sequential { on_failure } => {
                self.run_sequential(task, profiles, *on_failure).await
            }
            ExecutionMode::Parallel { max_concurrency } => {
                self.run_parallel(task, profiles, *max_concurrency).await?;
                Ok(None)
            }
        }
    }

    async fn run_sequential(
        &self,
        task: &Task,
        profiles: &[AgentProfile],
        on_failure: SequentialFailurePolicy,
    ) -> Result<Option<String>> {
        let total = profiles.len();
        let mut transcript: Vec<String> = Vec::with_capacity(total);
        let mut contributors: Vec<AgentId> = Vec::with_capacity(total);

        for (index, profile) in profiles.iter().enumerate() {
            let context = render_transcript(&transcript, self.max_context_chars);
            if !contributors.is_empty() {
                self.events.publish(TaskEvent::AgentCommunication {
                    task_id: task.id.clone(),
                    from: contributors.clone(),
                    to: profile.id.clone(),
                });
            }

            let prompt = build_prompt(&task.description, &context);
            let outcome = invoke(self.backend.as_ref(), profile, &prompt).await;
            self.record(task, profile, Some(prompt), &outcome, index + 1, total)
                .await?;

            match outcome {
                Ok(response) => {
                    transcript.push(format!("[{}]\n{}", profile.id, response));
                    contributors.push(profile.id.clone());
                }
                Err(reason) => match on_failure {
                    SequentialFailurePolicy::EmptyContext => {}
                    SequentialFailurePolicy::ErrorMarker => {
                        transcript.push(format!("[{}]\n[error] {}", profile.id, reason));
                        contributors.push(profile.id.clone());
                    }
                    SequentialFailurePolicy::Abort => {
                        let reason = format!("agent {} failed: {}", profile.id, reason);
                        for (offset, skipped) in profiles[index + 1..].iter().enumerate() {
                            let outcome = Err(format!("skipped after {}", reason));
                            self.record(task, skipped, None, &outcome, index + 2 + offset, total)
                                .await?;
                        }
                        return Ok(Some(reason));
                    }
                },
            }
        }
        Ok(None)
    }

    async fn run_parallel(
        &self,
        task: &Task,
        profiles: &[AgentProfile],
        max_concurrency: Option<usize>,
    ) -> Result<()> {
        let total = profiles.len();
        let limit = max_concurrency.unwrap_or(total).max(1);
        let prompt = task.description.clone();

        let backend = Arc::clone(&self.backend);
        let mut outcomes = stream::iter(profiles.to_vec())
            .map(|profile| {
                let backend = Arc::clone(&backend);
                let prompt = prompt.clone();
                async move {
                    let outcome = invoke(backend.as_ref(), &profile, &prompt).await;
                    (profile, outcome)
                }
            })
            .buffer_unordered(limit);

        let mut completed = 0;
        while let Some((profile, outcome)) = outcomes.next().await {
            completed += 1;
            self.record(task, &profile, Some(prompt.clone()), &outcome, completed, total)
                .await?;
        }
        Ok(())
    }

    /// Persist one agent outcome, then audit and notify
    async fn record(
        &self,
        task: &Task,
        profile: &AgentProfile,
        prompt: Option<String>,
        outcome: &AgentOutcome,
        completed: usize,
        total: usize,
    ) -> Result<ConversationMessage> {
        let (content, is_error) = match outcome {
            Ok(response) => (response.clone(), false),
            Err(reason) => (format!("[error] {}", reason), true),
        };

        let message = self
            .store
            .append_message(NewMessage {
                task_id: task.id.clone(),
                sender: MessageSender::agent(profile.id.clone()),
                content,
                prompt,
                is_error,
            })
            .await?;

        let (action, detail) = match outcome {
            Ok(response) => (
                AuditAction::AgentResponded,
                format!("{} chars", response.chars().count()),
            ),
            Err(reason) => (AuditAction::AgentFailed, reason.clone()),
        };
        self.audit(action, profile.id.as_str(), &task.id, detail).await?;

        self.events.publish(TaskEvent::AgentResponse {
            task_id: task.id.clone(),
            agent_id: profile.id.clone(),
            ordinal: message.ordinal,
            content: message.content.clone(),
            is_error: message.is_error,
        });
        self.events.publish(TaskEvent::TaskProgress {
            task_id: task.id.clone(),
            status: TaskStatus::Running,
            completed,
            total,
        });
        Ok(message)
    }

    async fn finish(&self, task: &Task, status: TaskStatus, error: Option<String>) -> Result<Task> {
        let finished = match self.store.update_status(&task.id, status, error.clone()).await {
            Ok(finished) => finished,
            Err(e) => {
                self.fail_best_effort(&task.id, e.to_string()).await;
                return Err(e);
            }
        };

        let action = if status == TaskStatus::Completed {
            AuditAction::TaskCompleted
        } else {
            AuditAction::TaskFailed
        };
        let detail = error.clone().unwrap_or_default();
        if let Err(e) = self.audit(action, ACTOR, &task.id, detail).await {
            warn!(error = %e, "Failed to record final audit entry");
        }

        self.events.publish(TaskEvent::TaskComplete {
            task_id: task.id.clone(),
            status,
            error,
        });
        info!(status = %status, "Task finished");
        Ok(finished)
    }

    async fn fail_best_effort(&self, task_id: &TaskId, reason: String) {
        if let Err(e) = self
            .store
            .update_status(task_id, TaskStatus::Failed, Some(reason.clone()))
            .await
        {
            error!(task_id = %task_id, error = %e, "Could not mark task failed");
        }
        if let Err(e) = self
            .audit(AuditAction::TaskFailed, ACTOR, task_id, reason.clone())
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to record audit entry");
        }
        self.events.publish(TaskEvent::TaskComplete {
            task_id: task_id.clone(),
            status: TaskStatus::Failed,
            error: Some(reason),
        });
    }

    async fn audit(
        &self,
        action: AuditAction,
        actor: &str,
        task_id: &TaskId,
        detail: String,
    ) -> Result<()> {
        info!(
            target: "audit",
            action = %action,
            actor,
            task_id = %task_id,
            detail = %detail,
            "Audit event"
        );
        let entry = AuditLogEntry::new(action, actor, Some(task_id.clone()), detail);
        self.store.record_audit(&entry).await
    }
}

async fn invoke(
    backend: &dyn CompletionBackend,
    profile: &AgentProfile,
    prompt: &str,
) -> AgentOutcome {
    let request = CompletionRequest {
        model: profile.model.clone(),
        system_prompt: profile.system_prompt.clone(),
        prompt: prompt.to_string(),
        temperature: profile.temperature,
    };
    debug!(agent_id = %profile.id, model = %profile.model, "Invoking agent");
    backend.complete(request).await.map_err(|e| {
        warn!(agent_id = %profile.id, error = %e, "Agent call failed");
        e.to_string()
    })
}

fn build_prompt(description: &str, context: &str) -> String {
    if context.is_empty() {
        description.to_string()
    } else {
        format!(
            "{}\n\nResponses from previous agents:\n\n{}",
            description, context
        )
    }
}

/// Join transcript blocks, keeping at most the last `max_chars` characters
fn render_transcript(blocks: &[String], max_chars: usize) -> String {
    let joined = blocks.join("\n\n");
    tail_chars(&joined, max_chars).to_string()
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}
