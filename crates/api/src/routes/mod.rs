pub mod agents;
pub mod audit;
pub mod health;
pub mod tasks;
pub mod webhook;
pub mod ws;
