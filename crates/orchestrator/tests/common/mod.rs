//! Shared fixtures: a scripted completion backend and an in-memory pipeline

#![allow(dead_code)]

use agent_hub_common::{
    AgentId, AgentProfile, AuditLogEntry, ConversationMessage, HubError, NewMessage, Result, Task,
    TaskId, TaskStatus,
};
use agent_hub_orchestrator::{
    AgentRegistry, CompletionBackend, CompletionRequest, EventHub, LlmError, Orchestrator,
};
use agent_hub_storage::{MemoryStore, TaskStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

/// Answers `"<model> response"`, or fails for models listed in `failing`
#[derive(Default)]
pub struct ScriptedBackend {
    failing: HashSet<String>,
    calls: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Semaphore>>,
    pub started: Arc<Notify>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    /// Calls block until the returned semaphore gets a permit
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompt_for(&self, model: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .find(|call| call.model == model)
            .map(|call| call.prompt)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        if self.failing.contains(&request.model) {
            Err(LlmError::Status {
                status: 503,
                body: "upstream overloaded".to_string(),
            })
        } else {
            Ok(format!("{} response", request.model))
        }
    }
}

/// Profile whose model name equals its id, so scripted replies are traceable
pub fn profile(id: &str) -> AgentProfile {
    AgentProfile {
        id: agent(id),
        display_name: id.to_string(),
        capabilities: vec![],
        model: id.to_string(),
        system_prompt: format!("You are {}", id),
        temperature: 0.2,
    }
}

pub fn agent(id: &str) -> AgentId {
    AgentId::parse(id).unwrap()
}

pub fn registry(ids: &[&str]) -> Arc<AgentRegistry> {
    Arc::new(AgentRegistry::from_profiles(ids.iter().map(|id| profile(id)).collect()).unwrap())
}

pub struct Pipeline {
    pub store: Arc<dyn TaskStore>,
    pub backend: Arc<ScriptedBackend>,
    pub events: Arc<EventHub>,
    pub registry: Arc<AgentRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Pipeline {
    pub fn new(ids: &[&str], backend: ScriptedBackend) -> Self {
        Self::with_store(ids, backend, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(ids: &[&str], backend: ScriptedBackend, store: Arc<dyn TaskStore>) -> Self {
        let backend = Arc::new(backend);
        let events = Arc::new(EventHub::new(64));
        let registry = registry(ids);
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&backend) as Arc<dyn CompletionBackend>,
            Arc::clone(&events),
        ));
        Self {
            store,
            backend,
            events,
            registry,
            orchestrator,
        }
    }
}

/// Store whose message appends fail, for persistence-failure paths
pub struct BrokenAppendStore {
    inner: MemoryStore,
}

impl BrokenAppendStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl TaskStore for BrokenAppendStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        self.inner.create_task(task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.inner.get_task(id).await
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
        self.inner.update_status(id, status, error).await
    }

    async fn append_message(&self, _message: NewMessage) -> Result<ConversationMessage> {
        Err(HubError::database("connection reset by peer"))
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
        Ok(())
    }
}
