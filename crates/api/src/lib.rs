//! # agent-hub API server
//!
//! HTTP and WebSocket front end for the task pipeline.
//!
//! ```text
//! ┌─────────────────────┐
//! │   REST Endpoints    │ <- /api/tasks, /api/agents, /api/audit
//! ├─────────────────────┤
//! │   Email Webhook     │ <- /webhooks/email (HMAC-signed)
//! ├─────────────────────┤
//! │   WebSocket Rooms   │ <- /ws, join/leave per task id
//! ├─────────────────────┤
//! │     Dispatcher      │ <- bounded queue + worker pool
//! ├─────────────────────┤
//! │    Orchestrator     │ <- sequential / parallel agent runs
//! └─────────────────────┘
//! ```
//!
//! `POST /api/tasks` answers `202 Accepted` as soon as the task is queued;
//! clients follow progress by joining the task's room on `/ws` or by polling
//! `GET /api/tasks/:id`.
//!
//! Errors under `/api` are `{"error", "code", "timestamp"}` JSON with a
//! machine-readable code. The webhook answers in the mail provider's
//! `{"status", "message"}` shape instead.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use server::{build_router, serve, AppState};
pub use types::*;
