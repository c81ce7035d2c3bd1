//! Agent module - Core agent logic and conversation handling
//!
//! This module provides the agent loop, context building and the subagent
//! manager for FemtoClaw. The agent is responsible for:
//!
//! - Processing inbound messages from channels
//! - Building conversation context from layered sources (identity,
//!   bootstrap docs, memory, skills, history)
//! - Calling the LLM provider for responses
//! - Executing tool calls and feeding results back to the LLM
//! - Spawning isolated subagents for background tasks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Subagent   │     │   Session   │     │    Tools    │
//! │  Manager    │     │   Manager   │     │  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! Subagents report back by publishing a synthetic system message onto the
//! same inbound queue the channels use; the loop has a single entry point.

mod context;
mod r#loop;
mod subagent;

pub use context::ContextBuilder;
pub use r#loop::{AgentLoop, HEARTBEAT_OK_TOKEN};
pub use subagent::{SubagentManager, SubagentSettings};
