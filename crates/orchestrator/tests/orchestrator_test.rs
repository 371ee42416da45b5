//! Integration tests for the orchestrator

mod common;

use agent_hub_common::{
    AuditAction, ExecutionMode, HubError, MessageSender, SequentialFailurePolicy, Task, TaskEvent,
    TaskId, TaskOrigin, TaskStatus,
};
use common::{agent, BrokenAppendStore, Pipeline, ScriptedBackend};
use std::sync::Arc;
use tokio::sync::broadcast;

const DESCRIPTION: &str = "Login page returns 500 after password reset";

async fn create_task(pipeline: &Pipeline, ids: &[&str], mode: ExecutionMode) -> Task {
    let task = Task::new(
        DESCRIPTION,
        ids.iter().map(|id| agent(id)).collect(),
        mode,
        TaskOrigin::Api,
    );
    pipeline.store.create_task(&task).await.unwrap();
    task
}

fn sequential(on_failure: SequentialFailurePolicy) -> ExecutionMode {
    ExecutionMode::Sequential { on_failure }
}

fn drain(rx: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_sequential_records_one_message_per_agent() {
    let ids = ["bug_01", "coding_01", "writing_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;

    let finished = pipeline.orchestrator.run(&task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert!(finished.completed_at.is_some());

    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    for (i, (message, id)) in messages.iter().zip(ids).enumerate() {
        assert_eq!(message.ordinal, i as i32);
        assert_eq!(message.sender, MessageSender::agent(agent(id)));
        assert_eq!(message.content, format!("{} response", id));
        assert!(!message.is_error);
    }

    let actions: Vec<_> = pipeline
        .store
        .list_audit(100)
        .await
        .unwrap()
        .into_iter()
        .rev()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::TaskStarted,
            AuditAction::AgentResponded,
            AuditAction::AgentResponded,
            AuditAction::AgentResponded,
            AuditAction::TaskCompleted,
        ]
    );
}

#[tokio::test]
async fn test_sequential_agents_see_previous_responses() {
    let ids = ["bug_01", "coding_01", "writing_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;

    pipeline.orchestrator.run(&task.id).await.unwrap();

    let first = pipeline.backend.prompt_for("bug_01").unwrap();
    assert_eq!(first, DESCRIPTION);

    let second = pipeline.backend.prompt_for("coding_01").unwrap();
    assert!(second.starts_with(DESCRIPTION));
    assert!(second.ends_with("[bug_01]\nbug_01 response"));

    let third = pipeline.backend.prompt_for("writing_01").unwrap();
    assert!(third.ends_with("[bug_01]\nbug_01 response\n\n[coding_01]\ncoding_01 response"));

    // the persisted prompt is the one that was sent
    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages[2].prompt.as_deref(), Some(third.as_str()));

    let calls = pipeline.backend.calls();
    assert_eq!(calls[0].system_prompt, "You are bug_01");
    assert_eq!(calls[0].temperature, 0.2);
}

#[tokio::test]
async fn test_parallel_agents_only_see_the_description() {
    let ids = ["bug_01", "coding_01", "writing_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    let task = create_task(&pipeline, &ids, ExecutionMode::parallel()).await;

    let finished = pipeline.orchestrator.run(&task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);

    let calls = pipeline.backend.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| call.prompt == DESCRIPTION));

    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    let mut senders: Vec<_> = messages
        .iter()
        .filter_map(|m| m.sender.agent_id().map(|id| id.to_string()))
        .collect();
    senders.sort();
    assert_eq!(senders, vec!["bug_01", "coding_01", "writing_01"]);
}

#[tokio::test]
async fn test_parallel_failure_does_not_fail_task() {
    let ids = ["bug_01", "coding_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new().failing("coding_01"));
    let task = create_task(
        &pipeline,
        &ids,
        ExecutionMode::Parallel {
            max_concurrency: Some(1),
        },
    )
    .await;

    let finished = pipeline.orchestrator.run(&task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);

    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages.iter().filter(|m| m.is_error).count(), 1);
}

#[tokio::test]
async fn test_failed_agent_contributes_nothing_by_default() {
    let ids = ["bug_01", "coding_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new().failing("bug_01"));
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;

    let finished = pipeline.orchestrator.run(&task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);

    assert_eq!(pipeline.backend.prompt_for("coding_01").unwrap(), DESCRIPTION);

    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_error);
    assert!(messages[0].content.starts_with("[error] "));
    assert!(messages[0].content.contains("503"));
    assert!(!messages[1].is_error);

    let audit = pipeline.store.list_audit(100).await.unwrap();
    assert!(audit.iter().any(|e| e.action == AuditAction::AgentFailed && e.actor == "bug_01"));
}

#[tokio::test]
async fn test_error_marker_policy_passes_failure_downstream() {
    let ids = ["bug_01", "coding_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new().failing("bug_01"));
    let task = create_task(&pipeline, &ids, sequential(SequentialFailurePolicy::ErrorMarker)).await;

    pipeline.orchestrator.run(&task.id).await.unwrap();

    let prompt = pipeline.backend.prompt_for("coding_01").unwrap();
    assert!(prompt.contains("[bug_01]\n[error] "));
}

#[tokio::test]
async fn test_abort_policy_skips_remaining_agents() {
    let ids = ["bug_01", "coding_01", "writing_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new().failing("bug_01"));
    let task = create_task(&pipeline, &ids, sequential(SequentialFailurePolicy::Abort)).await;

    let finished = pipeline.orchestrator.run(&task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Failed);
    assert!(finished.error.as_deref().unwrap().contains("bug_01"));

    assert_eq!(pipeline.backend.calls().len(), 1);

    let messages = pipeline.store.list_messages(&task.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.is_error));
    assert!(messages[1].content.contains("skipped"));
    assert!(messages[2].prompt.is_none());
}

#[tokio::test]
async fn test_transcript_is_capped_to_the_tail() {
    let ids = ["bug_01", "coding_01"];
    let mut pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    pipeline.orchestrator = Arc::new(
        agent_hub_orchestrator::Orchestrator::new(
            Arc::clone(&pipeline.store),
            Arc::clone(&pipeline.registry),
            Arc::clone(&pipeline.backend) as Arc<dyn agent_hub_orchestrator::CompletionBackend>,
            Arc::clone(&pipeline.events),
        )
        .with_max_context_chars(10),
    );
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;

    pipeline.orchestrator.run(&task.id).await.unwrap();

    let prompt = pipeline.backend.prompt_for("coding_01").unwrap();
    assert!(prompt.ends_with(":\n\n1 response"));
    assert!(!prompt.contains("[bug_01]"));
}

#[tokio::test]
async fn test_events_reach_subscribers_in_order() {
    let ids = ["bug_01", "coding_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;
    let mut rx = pipeline.events.subscribe(&task.id);

    pipeline.orchestrator.run(&task.id).await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(
        events.first(),
        Some(&TaskEvent::TaskProgress {
            task_id: task.id.clone(),
            status: TaskStatus::Running,
            completed: 0,
            total: 2,
        })
    );
    assert!(events.contains(&TaskEvent::AgentCommunication {
        task_id: task.id.clone(),
        from: vec![agent("bug_01")],
        to: agent("coding_01"),
    }));
    assert_eq!(
        events.iter().filter(|e| e.name() == "agent_response").count(),
        2
    );
    assert_eq!(
        events.last(),
        Some(&TaskEvent::TaskComplete {
            task_id: task.id.clone(),
            status: TaskStatus::Completed,
            error: None,
        })
    );
    assert!(events.iter().all(|e| e.task_id() == &task.id));
}

#[tokio::test]
async fn test_state_is_refetchable_after_resubscribe() {
    let ids = ["bug_01"];
    let pipeline = Pipeline::new(&ids, ScriptedBackend::new());
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;

    let first = pipeline.events.subscribe(&task.id);
    drop(first);
    pipeline.orchestrator.run(&task.id).await.unwrap();

    // events published while nobody listened are gone
    let mut rejoined = pipeline.events.subscribe(&task.id);
    assert!(drain(&mut rejoined).is_empty());

    let stored = pipeline.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(pipeline.store.list_messages(&task.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let pipeline = Pipeline::new(&["bug_01"], ScriptedBackend::new());
    let err = pipeline
        .orchestrator
        .run(&TaskId::from_string("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotFound { .. }));
}

#[tokio::test]
async fn test_task_cannot_run_twice() {
    let pipeline = Pipeline::new(&["bug_01"], ScriptedBackend::new());
    let task = create_task(&pipeline, &["bug_01"], ExecutionMode::default()).await;

    pipeline.orchestrator.run(&task.id).await.unwrap();
    let err = pipeline.orchestrator.run(&task.id).await.unwrap_err();
    assert!(matches!(err, HubError::InvalidStateTransition { .. }));
    assert_eq!(pipeline.backend.calls().len(), 1);
}

#[tokio::test]
async fn test_persistence_failure_marks_task_failed() {
    let ids = ["bug_01", "coding_01"];
    let pipeline = Pipeline::with_store(
        &ids,
        ScriptedBackend::new(),
        Arc::new(BrokenAppendStore::new()),
    );
    let task = create_task(&pipeline, &ids, ExecutionMode::default()).await;
    let mut rx = pipeline.events.subscribe(&task.id);

    let err = pipeline.orchestrator.run(&task.id).await.unwrap_err();
    assert!(matches!(err, HubError::Database(_)));

    let stored = pipeline.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.error.unwrap().contains("connection reset"));

    let last = drain(&mut rx).pop().unwrap();
    assert!(matches!(
        last,
        TaskEvent::TaskComplete {
            status: TaskStatus::Failed,
            ..
        }
    ));
}
