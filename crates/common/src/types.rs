use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::error::{HubError, Result};

/// Unique identifier for tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender column value for user-authored messages; never a valid agent id
const USER_SENDER: &str = "user";

/// Stable agent identifier, e.g. `bug_01`.
///
/// Only lowercase ascii letters, digits, `_` and `-` are accepted, so an id
/// can never be confused with a free-text display name. `user` is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(HubError::validation("agent id must not be empty"));
        }
        let valid = raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(HubError::validation(format!(
                "invalid agent id '{}': use lowercase letters, digits, '_' or '-'",
                raw
            )));
        }
        if raw == USER_SENDER {
            return Err(HubError::validation(format!("agent id '{}' is reserved", raw)));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl FromStr for AgentId {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a task. Transitions only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// What a sequential chain does with the transcript when one agent fails
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SequentialFailurePolicy {
    /// The failed agent contributes nothing to the next agent's context
    #[default]
    EmptyContext,
    /// The failed agent contributes an `[error]` line to the next agent's context
    ErrorMarker,
    /// Remaining agents are skipped and the task fails
    Abort,
}

/// How the agents of a task are run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Agents run in list order; each sees the responses of the agents before it
    Sequential {
        #[serde(default)]
        on_failure: SequentialFailurePolicy,
    },
    /// Agents run concurrently and never see each other's responses
    Parallel {
        #[serde(default)]
        max_concurrency: Option<usize>,
    },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential {
            on_failure: SequentialFailurePolicy::default(),
        }
    }
}

impl ExecutionMode {
    pub fn parallel() -> Self {
        Self::Parallel {
            max_concurrency: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequential { .. } => "sequential",
            Self::Parallel { .. } => "parallel",
        }
    }
}

/// Intent classified from an inbound email
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentKind {
    BugReport,
    FeatureRequest,
    Question,
    General,
}

/// Where a task came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOrigin {
    Api,
    Email {
        sender: String,
        subject: String,
        intent: IntentKind,
    },
}

/// One unit of user-submitted work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub agents: Vec<AgentId>,
    pub mode: ExecutionMode,
    pub origin: TaskOrigin,
    /// Reason the task failed, if it did
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        agents: Vec<AgentId>,
        mode: ExecutionMode,
        origin: TaskOrigin,
    ) -> Self {
        Self {
            id: TaskId::new(),
            description: description.into(),
            status: TaskStatus::Pending,
            agents,
            mode,
            origin,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Agent { agent_id: AgentId },
}

impl MessageSender {
    pub fn agent(agent_id: AgentId) -> Self {
        Self::Agent { agent_id }
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::Agent { agent_id } => Some(agent_id),
            Self::User => None,
        }
    }

    /// Column value used by the stores: `user` or the agent id
    pub fn as_column(&self) -> &str {
        match self {
            Self::User => USER_SENDER,
            Self::Agent { agent_id } => agent_id.as_str(),
        }
    }

    pub fn from_column(raw: &str) -> Result<Self> {
        if raw == USER_SENDER {
            Ok(Self::User)
        } else {
            Ok(Self::Agent {
                agent_id: AgentId::parse(raw)?,
            })
        }
    }
}

/// A persisted entry of a task's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub task_id: TaskId,
    pub ordinal: i32,
    pub sender: MessageSender,
    pub content: String,
    /// Full prompt sent to the agent that produced this message
    pub prompt: Option<String>,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

/// Message to append; the store assigns id, ordinal and timestamp
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub task_id: TaskId,
    pub sender: MessageSender,
    pub content: String,
    pub prompt: Option<String>,
    pub is_error: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    TaskCreated,
    TaskStarted,
    AgentResponded,
    AgentFailed,
    TaskCompleted,
    TaskFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub action: AuditAction,
    pub actor: String,
    pub task_id: Option<TaskId>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        task_id: Option<TaskId>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            actor: actor.into(),
            task_id,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

/// Static persona configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub display_name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// Notification pushed to clients that joined a task's room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskProgress {
        task_id: TaskId,
        status: TaskStatus,
        completed: usize,
        total: usize,
    },
    AgentResponse {
        task_id: TaskId,
        agent_id: AgentId,
        ordinal: i32,
        content: String,
        is_error: bool,
    },
    AgentCommunication {
        task_id: TaskId,
        from: Vec<AgentId>,
        to: AgentId,
    },
    TaskComplete {
        task_id: TaskId,
        status: TaskStatus,
        error: Option<String>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::TaskProgress { task_id, .. }
            | Self::AgentResponse { task_id, .. }
            | Self::AgentCommunication { task_id, .. }
            | Self::TaskComplete { task_id, .. } => task_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskProgress { .. } => "task_progress",
            Self::AgentResponse { .. } => "agent_response",
            Self::AgentCommunication { .. } => "agent_communication",
            Self::TaskComplete { .. } => "task_complete",
        }
    }
}
