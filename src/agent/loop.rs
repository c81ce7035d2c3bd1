//! Agent loop implementation.
//!
//! The state machine at the center of the runtime: take one inbound message,
//! build context, call the LLM, execute any requested tools, feed results
//! back, and repeat until the model answers without tool calls or the
//! iteration budget runs out. One turn in, at most one reply out, plus a
//! durable session append.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{FemtoError, Result};
use crate::memory::MemoryStore;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, SessionManager, ToolCall};
use crate::skills::load_skills;
use crate::tools::{ToolContext, ToolRegistry};
use crate::utils::parse_session_key;

/// Token a heartbeat turn answers with when nothing needs attention; such
/// replies are suppressed instead of delivered.
pub const HEARTBEAT_OK_TOKEN: &str = "HEARTBEAT_OK";

/// The main agent loop.
///
/// Consumes inbound messages from the bus, drives the model/tool
/// conversation to a bounded fixed point, persists the session and publishes
/// the reply. Turns on the same session key are serialized with a per-key
/// lock; distinct sessions proceed concurrently.
pub struct AgentLoop {
    config: Config,
    session_manager: Arc<SessionManager>,
    memory: Arc<MemoryStore>,
    bus: Arc<MessageBus>,
    provider: Arc<dyn LLMProvider>,
    tools: Arc<RwLock<ToolRegistry>>,
    context_builder: super::ContextBuilder,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentLoop {
    pub fn new(
        config: Config,
        session_manager: SessionManager,
        memory: Arc<MemoryStore>,
        bus: Arc<MessageBus>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let context_builder = super::ContextBuilder::new(&config.workspace_path())
            .with_history_window(config.agents.defaults.history_window)
            .with_daily_note_days(config.agents.defaults.daily_note_days);
        Self {
            config,
            session_manager: Arc::new(session_manager),
            memory,
            bus,
            provider,
            tools: Arc::new(RwLock::new(ToolRegistry::new())),
            context_builder,
            running: AtomicBool::new(false),
            shutdown_tx,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn register_tool(&self, tool: Box<dyn crate::tools::Tool>) {
        self.tools.write().await.register(tool);
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.has(name)
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Where the reply for a message goes. System-originated events (cron,
    /// heartbeat, subagent announcements) carry their origin conversation in
    /// the chat id.
    fn reply_target(msg: &InboundMessage) -> (String, String) {
        if msg.channel == "system" {
            parse_session_key(&msg.chat_id)
        } else {
            (msg.channel.clone(), msg.chat_id.clone())
        }
    }

    /// Process a single inbound message to completion.
    ///
    /// Returns the final assistant content. Provider failures abort the turn
    /// with an error; tool failures are fed back into the conversation as
    /// failing tool results and the loop continues.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<String> {
        // Serialize concurrent turns on the same session (main conversation
        // vs. subagent announcements); other sessions stay concurrent.
        let (reply_channel, reply_chat) = Self::reply_target(msg);
        let session_key = format!("{}:{}", reply_channel, reply_chat);

        let session_lock = {
            let mut locks = self.session_locks.lock().await;
            locks
                .entry(session_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = session_lock.lock().await;

        let mut session = self.session_manager.get_or_create(&session_key).await?;

        let workspace = self.config.workspace_path();
        let skills = load_skills(&workspace);
        let (tool_definitions, tool_descriptions) = {
            let tools = self.tools.read().await;
            (tools.get_definitions(), tools.descriptions())
        };

        let mut messages = self
            .context_builder
            .build_messages(
                &self.memory,
                &skills,
                &tool_descriptions,
                &session.messages,
                &msg.content,
                &msg.media,
            )
            .await;

        session.add_message(Message::user(&msg.content));

        let tool_ctx = ToolContext::new()
            .with_channel(&reply_channel, &reply_chat)
            .with_workspace(&workspace)
            .with_restriction(self.config.tools.restrict_to_workspace);

        let defaults = &self.config.agents.defaults;
        let options = ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature);
        let model = Some(defaults.model.as_str());
        let max_iterations = defaults.max_tool_iterations.max(1);

        let mut final_content: Option<String> = None;
        let mut last_content = String::new();

        for iteration in 1..=max_iterations {
            let response = self
                .provider
                .chat(messages.clone(), tool_definitions.clone(), model, options.clone())
                .await?;
            last_content = response.content.clone();

            if !response.has_tool_calls() {
                final_content = Some(response.content);
                break;
            }

            debug!(
                session = %session_key,
                iteration,
                calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            let assistant = Message::assistant_with_tools(
                &response.content,
                response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolCall::new(&tc.id, &tc.name, tc.arguments.clone()))
                    .collect(),
            );
            messages.push(assistant.clone());
            session.add_message(assistant);

            // Sequentially, in emission order: some models assume positional
            // call/result correspondence, and call ids must not collide.
            for call in &response.tool_calls {
                let result = {
                    let tools = self.tools.read().await;
                    tools.execute(&call.name, call.arguments.clone(), &tool_ctx).await
                };
                let text = match result {
                    Ok(text) => {
                        debug!(tool = %call.name, "Tool executed");
                        text
                    }
                    Err(e) => {
                        warn!(
                            tool = %call.name,
                            error = %e,
                            recoverable = e.is_recoverable(),
                            "Tool failed"
                        );
                        format!("Error: {}", e)
                    }
                };
                let tool_msg = Message::tool_result(&call.id, &text);
                messages.push(tool_msg.clone());
                session.add_message(tool_msg);
            }
        }

        // Budget exhaustion is a degraded success, not an error: reply with
        // the best available content and flag the turn for observability.
        let budget_exceeded = final_content.is_none();
        if budget_exceeded {
            warn!(
                session = %session_key,
                iterations = max_iterations,
                "Iteration budget exhausted, finalizing with last content"
            );
            session.metadata.insert("budget_exceeded".into(), json!(true));
        }
        let mut content = final_content.unwrap_or(last_content);
        if content.trim().is_empty() {
            content = if budget_exceeded {
                "I ran out of tool budget before finishing; partial work is saved in the session."
                    .to_string()
            } else {
                String::new()
            };
        }

        if !content.is_empty() {
            session.add_message(Message::assistant(&content));
        }

        // A failed save must not cost the user their reply; it only risks
        // history divergence on the next turn.
        if let Err(e) = self.session_manager.save(&session).await {
            error!(session = %session_key, error = %e, "Failed to persist session");
        }

        Ok(content)
    }

    /// Start consuming from the message bus until `stop()` is called or the
    /// inbound queue closes.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FemtoError::Config("Agent loop already running".into()));
        }
        info!("Agent loop started");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Agent loop received shutdown signal");
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    let Some(msg) = msg else {
                        info!("Inbound queue closed, stopping agent loop");
                        break;
                    };
                    self.handle_message(msg).await;
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    async fn handle_message(&self, msg: InboundMessage) {
        info!(
            channel = %msg.channel,
            sender = %msg.sender_id,
            chat = %msg.chat_id,
            "Processing message"
        );
        let start = std::time::Instant::now();
        let (reply_channel, reply_chat) = Self::reply_target(&msg);

        match self.process_message(&msg).await {
            Ok(content) => {
                info!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    response_len = content.len(),
                    "Turn completed"
                );

                if content.is_empty() {
                    return;
                }
                if msg.metadata.get("suppress_reply").map(String::as_str) == Some("true") {
                    debug!("Reply suppressed by message metadata");
                    return;
                }
                // Idle heartbeat turns answer with the OK token; nothing to
                // deliver.
                if msg.sender_id == "heartbeat" && content.contains(HEARTBEAT_OK_TOKEN) {
                    debug!("Heartbeat OK, suppressing reply");
                    return;
                }

                let outbound = OutboundMessage::new(&reply_channel, &reply_chat, &content);
                if let Err(e) = self.bus.publish_outbound(outbound) {
                    error!(error = %e, "Failed to publish outbound message");
                }
            }
            Err(e) => {
                error!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Turn failed"
                );
                let outbound = OutboundMessage::new(
                    &reply_channel,
                    &reply_chat,
                    &format!("Error: {}", e),
                );
                let _ = self.bus.publish_outbound(outbound);
            }
        }
    }

    /// Signal the loop to stop after any in-flight turn completes.
    pub fn stop(&self) {
        info!("Stopping agent loop");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }
}
