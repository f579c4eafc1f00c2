//! Workflow-engine integration: the driven client port, its HTTP
//! implementation, and the bridge that turns fired alert rules into
//! durable executions on the engine.

pub mod bridge;
pub mod client;

#[cfg(test)]
mod tests;

pub use bridge::TriggerBridge;
pub use client::{EngineClient, EngineRun, HttpEngineClient};
