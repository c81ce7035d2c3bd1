//! FemtoClaw - tiny personal AI assistant runtime.
//!
//! Chat channels publish inbound messages onto a bus; the agent loop drives
//! a bounded tool-calling conversation with an LLM provider and publishes
//! the reply back for delivery. Sessions, long-term memory and skills live
//! on local disk under the workspace.

pub mod agent;
pub mod bus;
pub mod channels;
pub mod config;
pub mod cron;
pub mod error;
pub mod heartbeat;
pub mod memory;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, ContextBuilder, SubagentManager, SubagentSettings};
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{FemtoError, Result};
pub use session::SessionManager;
