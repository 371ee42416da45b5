//! Task queue that decouples orchestration from request handling

use agent_hub_common::{DispatcherConfig, HubError, Result, TaskId};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::Orchestrator;

enum Mode {
    /// Orchestration runs inside `enqueue`
    Inline,
    Queued {
        sender: RwLock<Option<mpsc::Sender<TaskId>>>,
        workers: Mutex<Vec<JoinHandle<()>>>,
    },
}

pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    mode: Mode,
}

impl Dispatcher {
    /// Spawn the worker pool (or select inline mode when disabled).
    /// Must be called from within a tokio runtime.
    pub fn start(orchestrator: Arc<Orchestrator>, config: &DispatcherConfig) -> Self {
        if !config.enabled {
            info!("Background workers disabled, tasks will run inline");
            return Self {
                orchestrator,
                mode: Mode::Inline,
            };
        }

        let worker_count = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(run_worker(worker_id, receiver, orchestrator))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "Task dispatcher started"
        );

        Self {
            orchestrator,
            mode: Mode::Queued {
                sender: RwLock::new(Some(sender)),
                workers: Mutex::new(workers),
            },
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.mode, Mode::Inline)
    }

    /// Hand a task to the workers without waiting for a free slot.
    ///
    /// Fails with [`HubError::Queue`] when the queue is full or shut down.
    /// In inline mode the task runs to completion before this returns; its
    /// outcome is recorded on the task rather than returned.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn enqueue(&self, task_id: TaskId) -> Result<()> {
        match &self.mode {
            Mode::Inline => {
                if let Err(e) = self.orchestrator.run(&task_id).await {
                    error!(error = %e, "Inline orchestration failed");
                }
                Ok(())
            }
            Mode::Queued { sender, .. } => {
                let guard = sender.read().await;
                let sender = guard
                    .as_ref()
                    .ok_or_else(|| HubError::queue("dispatcher is shut down"))?;
                sender.try_send(task_id).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => HubError::queue("task queue is full"),
                    mpsc::error::TrySendError::Closed(_) => {
                        HubError::queue("task queue is closed")
                    }
                })?;
                debug!("Task queued");
                Ok(())
            }
        }
    }

    /// Close the queue and wait for workers to finish what was already queued
    pub async fn shutdown(&self) {
        let Mode::Queued { sender, workers } = &self.mode else {
            return;
        };

        sender.write().await.take();
        let handles: Vec<_> = workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher worker ended abnormally");
            }
        }
        info!("Task dispatcher drained");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TaskId>>>,
    orchestrator: Arc<Orchestrator>,
) {
    debug!(worker_id, "Dispatcher worker started");
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(task_id) = next else {
            break;
        };

        debug!(worker_id, task_id = %task_id, "Worker picked up task");
        if let Err(e) = orchestrator.run(&task_id).await {
            error!(worker_id, task_id = %task_id, error = %e, "Orchestration failed");
        }
    }
    debug!(worker_id, "Dispatcher worker stopped");
}
