//! Per-task notification rooms
//!
//! Each task id owns a broadcast channel. Clients that join a room receive
//! events published after they joined; there is no replay, late joiners
//! re-fetch task state through the read API.

use agent_hub_common::{TaskEvent, TaskId};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct EventHub {
    rooms: DashMap<String, broadcast::Sender<TaskEvent>>,
    capacity: usize,
}

impl EventHub {
    /// `capacity` bounds the events buffered per room for slow receivers
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join the room for `task_id`, creating it on first use
    pub fn subscribe(&self, task_id: &TaskId) -> broadcast::Receiver<TaskEvent> {
        self.rooms
            .entry(task_id.to_string())
            .or_insert_with(|| {
                debug!(task_id = %task_id, "Creating event room");
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Best-effort delivery; returns the number of receivers reached
    pub fn publish(&self, event: TaskEvent) -> usize {
        let key = event.task_id().to_string();
        let name = event.name();

        let delivered = match self.rooms.get(&key) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            trace!(task_id = %key, event = name, "No subscribers, event dropped");
            self.prune_room(&key);
        }
        delivered
    }

    /// Drop the room if nobody is listening any more
    pub fn prune_room(&self, task_id: &str) -> bool {
        self.rooms
            .remove_if(task_id, |_, sender| sender.receiver_count() == 0)
            .is_some()
    }

    /// Drop every room without receivers; returns how many were removed
    pub fn prune(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
        before - self.rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        self.rooms
            .get(task_id.as_str())
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
