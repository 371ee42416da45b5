use agent_hub_common::{AgentId, ExecutionMode, Task, TaskOrigin, TaskStatus};
use agent_hub_storage::{CachedTaskStore, MemoryStore, RedisCache, TaskStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

fn get_test_redis_url() -> String {
    std::env::var("TEST_REDIS_URL")
        .expect("TEST_REDIS_URL must be set (use docker-compose.test.yml)")
}

// Generate unique key prefix for this test run
fn test_key_prefix() -> String {
    format!("test:{}:", Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn test_redis_connection() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .expect("Failed to connect to test Redis");

    cache.ping().await.expect("Ping failed");
}

#[tokio::test]
#[ignore]
async fn test_redis_expiration() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .unwrap();
    let key = cache.key("expiring_key");

    cache.set_ex(&key, "value", 1).await.unwrap();
    assert!(cache.get(&key).await.unwrap().is_some());

    // Wait for expiration
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    assert!(cache.get(&key).await.unwrap().is_none());
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestStruct {
    name: String,
    count: i32,
}

#[tokio::test]
#[ignore]
async fn test_redis_json() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .unwrap();
    let key = cache.key("json_key");

    let test_data = TestStruct {
        name: "test".to_string(),
        count: 42,
    };

    cache.set_json_ex(&key, &test_data, 60).await.unwrap();

    let retrieved: Option<TestStruct> = cache.get_json(&key).await.unwrap();
    assert_eq!(retrieved, Some(test_data));

    cache.delete(&key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_cached_store_invalidates_on_status_change() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .unwrap();
    let inner: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let store = CachedTaskStore::new(inner, cache, 60);

    let task = Task::new(
        "cache me",
        vec![AgentId::parse("bug_01").unwrap()],
        ExecutionMode::default(),
        TaskOrigin::Api,
    );
    store.create_task(&task).await.unwrap();

    // Populate cache
    let first = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(first.status, TaskStatus::Pending);

    store
        .update_status(&task.id, TaskStatus::Running, None)
        .await
        .unwrap();

    let second = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(second.status, TaskStatus::Running);
}

#[tokio::test]
#[ignore]
async fn test_cached_store_never_holds_running_snapshot() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .unwrap();
    let inspector = cache.clone();
    let inner: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let store = CachedTaskStore::new(Arc::clone(&inner), cache, 60);

    let task = Task::new(
        "poll me",
        vec![AgentId::parse("bug_01").unwrap()],
        ExecutionMode::default(),
        TaskOrigin::Api,
    );
    let key = inspector.key(&format!("task:{}", task.id));
    store.create_task(&task).await.unwrap();
    store
        .update_status(&task.id, TaskStatus::Running, None)
        .await
        .unwrap();

    // A poll while the task runs must not leave a snapshot behind
    let polled = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(polled.status, TaskStatus::Running);
    assert!(inspector.get(&key).await.unwrap().is_none());

    // The run finishes on the authoritative store, bypassing the decorator
    inner
        .update_status(&task.id, TaskStatus::Completed, None)
        .await
        .unwrap();

    let after = store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Completed);
    let cached: Option<Task> = inspector.get_json(&key).await.unwrap();
    assert_eq!(cached.map(|t| t.status), Some(TaskStatus::Completed));

    inspector.delete(&key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_cached_store_writes_terminal_status_through() {
    let cache = RedisCache::new(&get_test_redis_url(), test_key_prefix())
        .await
        .unwrap();
    let inspector = cache.clone();
    let inner: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let store = CachedTaskStore::new(inner, cache, 60);

    let task = Task::new(
        "finish me",
        vec![AgentId::parse("bug_01").unwrap()],
        ExecutionMode::default(),
        TaskOrigin::Api,
    );
    let key = inspector.key(&format!("task:{}", task.id));
    store.create_task(&task).await.unwrap();
    store
        .update_status(&task.id, TaskStatus::Failed, Some("boom".into()))
        .await
        .unwrap();

    let cached: Option<Task> = inspector.get_json(&key).await.unwrap();
    let cached = cached.unwrap();
    assert_eq!(cached.status, TaskStatus::Failed);
    assert_eq!(cached.error.as_deref(), Some("boom"));

    inspector.delete(&key).await.unwrap();
}
