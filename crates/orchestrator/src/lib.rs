//! Agent orchestration for agent-hub
//!
//! - [`llm`]: chat-completions adapter with retry
//! - [`registry`]: configured agent personas
//! - [`engine`]: runs a task's agents sequentially or in parallel
//! - [`dispatcher`]: background worker queue
//! - [`events`]: per-task notification rooms
//! - [`service`]: task submission
//! - [`intake`]: inbound email webhook

pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod intake;
pub mod llm;
pub mod registry;
pub mod service;

pub use dispatcher::Dispatcher;
pub use engine::Orchestrator;
pub use events::EventHub;
pub use intake::{EmailIntake, InboundEmail, IntakeError, IntentClassifier, SignatureVerifier};
pub use llm::{ChatCompletionsClient, CompletionBackend, CompletionRequest, LlmError};
pub use registry::AgentRegistry;
pub use service::{SubmitTask, TaskService};
