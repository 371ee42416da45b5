use agent_hub_common::{
    AgentId, AuditAction, AuditLogEntry, ConversationMessage, ExecutionMode, HubError,
    MessageSender, NewMessage, Result, Task, TaskId, TaskOrigin, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::store::TaskStore;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        agents TEXT[] NOT NULL,
        mode JSONB NOT NULL,
        origin JSONB NOT NULL,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks (created_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS conversation_messages (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        ordinal INTEGER NOT NULL,
        sender TEXT NOT NULL,
        content TEXT NOT NULL,
        prompt TEXT,
        is_error BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        UNIQUE (task_id, ordinal)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        action TEXT NOT NULL,
        actor TEXT NOT NULL,
        task_id TEXT,
        detail TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at DESC)",
];

const TASK_COLUMNS: &str =
    "id, description, status, agents, mode, origin, error, created_at, completed_at";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(HubError::database)?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(HubError::database)?;
        }
        tracing::info!(statements = MIGRATIONS.len(), "Database migrations applied");
        Ok(())
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(HubError::database)
}

fn row_to_task(row: &PgRow) -> Result<Task> {
    let status: String = column(row, "status")?;
    let agents: Vec<String> = column(row, "agents")?;
    let mode: Json<ExecutionMode> = column(row, "mode")?;
    let origin: Json<TaskOrigin> = column(row, "origin")?;

    Ok(Task {
        id: TaskId::from_string(column::<String>(row, "id")?),
        description: column(row, "description")?,
        status: TaskStatus::from_str(&status)
            .map_err(|_| HubError::database(format!("unknown task status '{}'", status)))?,
        agents: agents
            .into_iter()
            .map(AgentId::parse)
            .collect::<Result<Vec<_>>>()?,
        mode: mode.0,
        origin: origin.0,
        error: column(row, "error")?,
        created_at: column(row, "created_at")?,
        completed_at: column(row, "completed_at")?,
    })
}

fn row_to_message(row: &PgRow) -> Result<ConversationMessage> {
    let sender: String = column(row, "sender")?;
    Ok(ConversationMessage {
        id: column(row, "id")?,
        task_id: TaskId::from_string(column::<String>(row, "task_id")?),
        ordinal: column(row, "ordinal")?,
        sender: MessageSender::from_column(&sender)?,
        content: column(row, "content")?,
        prompt: column(row, "prompt")?,
        is_error: column(row, "is_error")?,
        created_at: column(row, "created_at")?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditLogEntry> {
    let action: String = column(row, "action")?;
    let task_id: Option<String> = column(row, "task_id")?;
    Ok(AuditLogEntry {
        id: column(row, "id")?,
        action: AuditAction::from_str(&action)
            .map_err(|_| HubError::database(format!("unknown audit action '{}'", action)))?,
        actor: column(row, "actor")?,
        task_id: task_id.map(TaskId::from_string),
        detail: column(row, "detail")?,
        created_at: column(row, "created_at")?,
    })
}

#[async_trait]
impl TaskStore for PostgresStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        let agents: Vec<String> = task.agents.iter().map(|a| a.to_string()).collect();
        sqlx::query(
            "INSERT INTO tasks (id, description, status, agents, mode, origin, error, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(task.id.as_str())
        .bind(&task.description)
        .bind(task.status.as_ref())
        .bind(agents)
        .bind(Json(&task.mode))
        .bind(Json(&task.origin))
        .bind(&task.error)
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(HubError::database)?;
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(HubError::database)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC LIMIT $1",
            TASK_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(HubError::database)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(HubError::database)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM tasks WHERE id = $1 FOR UPDATE")
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(HubError::database)?;
        let current = current.ok_or_else(|| HubError::not_found("task", id.as_str()))?;
        let current = TaskStatus::from_str(&current)
            .map_err(|_| HubError::database(format!("unknown task status '{}'", current)))?;

        if !current.can_transition_to(status) {
            return Err(HubError::invalid_transition(current, status));
        }

        let completed_at: Option<DateTime<Utc>> = status.is_terminal().then(Utc::now);
        let row = sqlx::query(&format!(
            "UPDATE tasks SET status = $2, error = COALESCE($3, error), \
             completed_at = COALESCE($4, completed_at) WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(id.as_str())
        .bind(status.as_ref())
        .bind(error)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(HubError::database)?;

        tx.commit().await.map_err(HubError::database)?;
        row_to_task(&row)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ConversationMessage> {
        let mut tx = self.pool.begin().await.map_err(HubError::database)?;

        // Row lock serializes ordinal assignment per task
        let exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM tasks WHERE id = $1 FOR UPDATE")
                .bind(message.task_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(HubError::database)?;
        if exists.is_none() {
            return Err(HubError::not_found("task", message.task_id.as_str()));
        }

        let ordinal: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM conversation_messages WHERE task_id = $1",
        )
        .bind(message.task_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(HubError::database)?;

        let stored = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            task_id: message.task_id,
            ordinal,
            sender: message.sender,
            content: message.content,
            prompt: message.prompt,
            is_error: message.is_error,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO conversation_messages (id, task_id, ordinal, sender, content, prompt, is_error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&stored.id)
        .bind(stored.task_id.as_str())
        .bind(stored.ordinal)
        .bind(stored.sender.as_column())
        .bind(&stored.content)
        .bind(&stored.prompt)
        .bind(stored.is_error)
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await
        .map_err(HubError::database)?;

        tx.commit().await.map_err(HubError::database)?;
        Ok(stored)
    }

    async fn list_messages(&self, task_id: &TaskId) -> Result<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            "SELECT id, task_id, ordinal, sender, content, prompt, is_error, created_at \
             FROM conversation_messages WHERE task_id = $1 ORDER BY ordinal ASC",
        )
        .bind(task_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(HubError::database)?;
        rows.iter().map(row_to_message).collect()
    }

    async fn record_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, action, actor, task_id, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&entry.id)
        .bind(entry.action.as_ref())
        .bind(&entry.actor)
        .bind(entry.task_id.as_ref().map(|id| id.as_str()))
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(HubError::database)?;
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, action, actor, task_id, detail, created_at \
             FROM audit_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(HubError::database)?;
        rows.iter().map(row_to_audit).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(HubError::database)?;
        Ok(())
    }
}
