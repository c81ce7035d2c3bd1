//! Subagent manager - isolated background conversations.
//!
//! A subagent is a lightweight agent instance spawned to work on one task in
//! the background. It shares the LLM provider but runs against its own
//! reduced tool registry — never the messaging tool, never the spawn tool —
//! with a focused system prompt and a lower iteration ceiling. On terminal
//! completion it reports back by publishing a synthetic system message onto
//! the same bus the channels use; that inbound event is its only way of
//! reaching the parent conversation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bus::{InboundMessage, MessageBus};
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, ToolCall};
use crate::tools::{
    ExecTool, ListDirTool, MemoryTool, ReadFileTool, ToolContext, ToolRegistry, WebFetchTool,
    WebSearchTool, WriteFileTool,
};
use crate::utils::truncate_chars;

/// Hard iteration ceiling for subagent loops, below the main agent's budget.
const SUBAGENT_MAX_ITERATIONS: usize = 15;

/// Settings a subagent inherits from the main agent.
#[derive(Clone)]
pub struct SubagentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub exec_timeout: u64,
    pub restrict_to_workspace: bool,
    pub brave_api_key: Option<String>,
    pub search_max_results: usize,
}

/// Spawns and tracks background subagent tasks.
pub struct SubagentManager {
    provider: Arc<dyn LLMProvider>,
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    memory: Arc<MemoryStore>,
    settings: SubagentSettings,
    running: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        workspace: PathBuf,
        bus: Arc<MessageBus>,
        memory: Arc<MemoryStore>,
        settings: SubagentSettings,
    ) -> Self {
        Self {
            provider,
            workspace,
            bus,
            memory,
            settings,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// The reduced tool registry every subagent runs against: file, shell,
    /// web and memory access only. No messaging (silent side-channel
    /// replies) and no spawning (unbounded recursion).
    pub fn build_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(ReadFileTool));
        tools.register(Box::new(WriteFileTool));
        tools.register(Box::new(ListDirTool));
        tools.register(Box::new(ExecTool::new(self.settings.exec_timeout)));
        tools.register(Box::new(WebSearchTool::new(
            self.settings.brave_api_key.clone(),
            self.settings.search_max_results,
        )));
        tools.register(Box::new(WebFetchTool::new()));
        tools.register(Box::new(MemoryTool::new(Arc::clone(&self.memory))));
        tools
    }

    /// Spawn a subagent to work on `task` in the background. Returns
    /// immediately with a status line for the model.
    pub async fn spawn(
        self: Arc<Self>,
        task: &str,
        label: Option<&str>,
        origin_channel: &str,
        origin_chat_id: &str,
    ) -> Result<String> {
        let task_id = Uuid::new_v4().to_string()[..8].to_string();
        let display_label = label
            .map(str::to_string)
            .unwrap_or_else(|| truncate_chars(task, 30));

        let manager = Arc::clone(&self);
        let task_owned = task.to_string();
        let label_owned = display_label.clone();
        let origin = format!("{}:{}", origin_channel, origin_chat_id);
        let id = task_id.clone();

        // Hold the map lock across the spawn so the task cannot try to
        // deregister itself before it is registered.
        {
            let mut running = self.running.lock().await;
            let handle = tokio::spawn(async move {
                manager.run_subagent(&id, &task_owned, &label_owned, &origin).await;
                manager.running.lock().await.remove(&id);
            });
            running.insert(task_id.clone(), handle);
        }

        info!(id = %task_id, label = %display_label, "Spawned subagent");
        Ok(format!(
            "Subagent [{}] started (id: {}). I will report back when it finishes.",
            display_label, task_id
        ))
    }

    async fn run_subagent(&self, task_id: &str, task: &str, label: &str, origin: &str) {
        info!(id = %task_id, label = %label, "Subagent starting");

        let tools = self.build_registry();
        let tool_ctx = ToolContext::new()
            .with_workspace(&self.workspace)
            .with_restriction(self.settings.restrict_to_workspace);

        let mut messages = vec![
            Message::system(&self.build_prompt(task)),
            Message::user(task),
        ];
        let options = ChatOptions::new()
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        let mut final_result: Option<String> = None;
        let mut failure: Option<String> = None;

        for iteration in 1..=SUBAGENT_MAX_ITERATIONS {
            let response = match self
                .provider
                .chat(
                    messages.clone(),
                    tools.get_definitions(),
                    Some(&self.settings.model),
                    options.clone(),
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    error!(id = %task_id, error = %e, "Subagent provider call failed");
                    failure = Some(e.to_string());
                    break;
                }
            };

            if !response.has_tool_calls() {
                final_result = Some(response.content);
                break;
            }

            messages.push(Message::assistant_with_tools(
                &response.content,
                response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolCall::new(&tc.id, &tc.name, tc.arguments.clone()))
                    .collect(),
            ));

            // Tools run sequentially, in the order the model emitted them.
            for call in &response.tool_calls {
                debug!(id = %task_id, tool = %call.name, iteration, "Subagent executing tool");
                let result = match tools.execute(&call.name, call.arguments.clone(), &tool_ctx).await
                {
                    Ok(r) => r,
                    Err(e) => format!("Error: {}", e),
                };
                messages.push(Message::tool_result(&call.id, &result));
            }
        }

        let (status, body) = match (failure, final_result) {
            (Some(err), _) => ("failed", format!("Error: {}", err)),
            (None, Some(result)) => ("completed", result),
            (None, None) => (
                "completed",
                "Task finished without producing a final response.".to_string(),
            ),
        };

        info!(id = %task_id, status, "Subagent done");
        self.announce(task_id, label, task, status, &body, origin);
    }

    /// Report the result to the parent conversation via the bus.
    fn announce(
        &self,
        task_id: &str,
        label: &str,
        task: &str,
        status: &str,
        result: &str,
        origin: &str,
    ) {
        let content = format!(
            "[Subagent '{}' {}]\n\nTask: {}\n\nResult:\n{}\n\n\
             Summarize this naturally for the user. Keep it short (1-2 sentences). \
             Do not mention internals like 'subagent' or task ids.",
            label, status, task, result
        );

        let msg = InboundMessage::new("system", "subagent", origin, &content);
        if let Err(e) = self.bus.publish_inbound(msg) {
            error!(id = %task_id, error = %e, "Failed to announce subagent result");
        }
    }

    fn build_prompt(&self, task: &str) -> String {
        format!(
            "# Subagent\n\n\
             You are a subagent spawned by the main agent to complete one task.\n\n\
             ## Your Task\n{}\n\n\
             ## Rules\n\
             1. Stay focused: complete the assigned task and nothing else.\n\
             2. Your final response is reported back to the main agent.\n\
             3. Do not start conversations or take on side quests.\n\
             4. Be concise but informative in your findings.\n\n\
             ## You cannot\n\
             - Message the user directly (no messaging tool is available)\n\
             - Spawn other subagents\n\
             - See the main agent's conversation history\n\n\
             ## Workspace\n{}\n",
            task,
            self.workspace.display()
        )
    }

    /// Number of subagents currently running.
    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }
}
