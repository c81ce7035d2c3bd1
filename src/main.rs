//! FemtoClaw binary: `run` the full assistant, `chat` interactively, or
//! inspect `status`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use femtoclaw::agent::{AgentLoop, SubagentManager, SubagentSettings};
use femtoclaw::bus::{InboundMessage, MessageBus, OutboundMessage};
use femtoclaw::channels::{Channel, ChannelManager};
use femtoclaw::config::Config;
use femtoclaw::cron::CronService;
use femtoclaw::heartbeat::HeartbeatService;
use femtoclaw::providers::{LLMProvider, OpenAiCompatProvider};
use femtoclaw::session::SessionManager;
use femtoclaw::tools::{
    CronTool, ExecTool, ListDirTool, MemoryTool, MessageTool, ReadFileTool, SpawnTool,
    WebFetchTool, WebSearchTool, WriteFileTool,
};
use femtoclaw::utils::data_dir;

#[derive(Parser)]
#[command(name = "femtoclaw", version, about = "Tiny personal AI assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant: agent loop, channels, cron and heartbeat
    Run,
    /// Chat with the assistant in the terminal
    Chat,
    /// Show configuration and session status
    Status,
}

/// Minimal channel that prints outbound messages to the terminal. The real
/// chat channels (Telegram, Discord, ...) plug in through the same trait.
struct CliChannel {
    allow_from: Vec<String>,
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> femtoclaw::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> femtoclaw::Result<()> {
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> femtoclaw::Result<()> {
        println!("\n{}\n", msg.content);
        Ok(())
    }

    fn allow_list(&self) -> &[String] {
        &self.allow_from
    }
}

/// Everything a running assistant needs, wired together.
struct Runtime {
    bus: Arc<MessageBus>,
    agent: Arc<AgentLoop>,
    cron: Arc<CronService>,
    heartbeat: Arc<HeartbeatService>,
}

async fn build_runtime(config: Config) -> Result<Runtime> {
    if config.provider.api_key.is_empty() {
        anyhow::bail!(
            "No API key configured. Set FEMTOCLAW_API_KEY or provider.api_key in {}",
            Config::path().display()
        );
    }

    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;

    let bus = Arc::new(MessageBus::new());
    let provider: Arc<dyn LLMProvider> = Arc::new(OpenAiCompatProvider::new(
        &config.provider.api_key,
        config.provider.api_base.as_deref(),
        &config.agents.defaults.model,
    ));

    let memory = Arc::new(femtoclaw::memory::MemoryStore::new(&workspace));
    let session_manager = SessionManager::new()?;
    let cron = Arc::new(CronService::new(
        data_dir().join("cron").join("jobs.json"),
        Arc::clone(&bus),
    ));
    let subagents = Arc::new(SubagentManager::new(
        Arc::clone(&provider),
        workspace.clone(),
        Arc::clone(&bus),
        Arc::clone(&memory),
        SubagentSettings {
            model: config.agents.defaults.model.clone(),
            max_tokens: config.agents.defaults.max_tokens,
            temperature: config.agents.defaults.temperature,
            exec_timeout: config.tools.exec.timeout,
            restrict_to_workspace: config.tools.restrict_to_workspace,
            brave_api_key: (!config.tools.web_search.api_key.is_empty())
                .then(|| config.tools.web_search.api_key.clone()),
            search_max_results: config.tools.web_search.max_results,
        },
    ));

    let heartbeat = Arc::new(HeartbeatService::new(
        workspace,
        Arc::clone(&bus),
        Duration::from_secs(config.heartbeat.interval_secs),
        &config.heartbeat.channel,
        &config.heartbeat.chat_id,
    ));

    let agent = AgentLoop::new(
        config.clone(),
        session_manager,
        Arc::clone(&memory),
        Arc::clone(&bus),
        provider,
    );

    agent.register_tool(Box::new(ReadFileTool)).await;
    agent.register_tool(Box::new(WriteFileTool)).await;
    agent.register_tool(Box::new(ListDirTool)).await;
    agent
        .register_tool(Box::new(ExecTool::new(config.tools.exec.timeout)))
        .await;
    agent
        .register_tool(Box::new(WebSearchTool::new(
            (!config.tools.web_search.api_key.is_empty())
                .then(|| config.tools.web_search.api_key.clone()),
            config.tools.web_search.max_results,
        )))
        .await;
    agent.register_tool(Box::new(WebFetchTool::new())).await;
    agent
        .register_tool(Box::new(MemoryTool::new(Arc::clone(&memory))))
        .await;
    agent
        .register_tool(Box::new(MessageTool::new(Arc::clone(&bus))))
        .await;
    agent
        .register_tool(Box::new(SpawnTool::new(subagents)))
        .await;
    agent
        .register_tool(Box::new(CronTool::new(Arc::clone(&cron))))
        .await;

    Ok(Runtime {
        bus,
        agent: Arc::new(agent),
        cron,
        heartbeat,
    })
}

async fn cmd_run(config: Config) -> Result<()> {
    let heartbeat_enabled = config.heartbeat.enabled;
    let runtime = build_runtime(config).await?;

    let mut channels = ChannelManager::new(Arc::clone(&runtime.bus));
    channels.register(Arc::new(CliChannel { allow_from: vec![] }));
    let channels = Arc::new(channels);

    let agent = Arc::clone(&runtime.agent);
    let agent_task = tokio::spawn(async move { agent.run().await });

    let cron = Arc::clone(&runtime.cron);
    tokio::spawn(async move { cron.run().await });

    if heartbeat_enabled {
        let heartbeat = Arc::clone(&runtime.heartbeat);
        tokio::spawn(async move { heartbeat.run().await });
    }

    let channels_task = {
        let channels = Arc::clone(&channels);
        tokio::spawn(async move { channels.start_all().await })
    };

    info!("FemtoClaw is up. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    runtime.heartbeat.stop();
    runtime.agent.stop();
    channels.stop_all().await;
    channels_task.abort();
    let _ = agent_task.await;
    Ok(())
}

async fn cmd_chat(config: Config) -> Result<()> {
    let runtime = build_runtime(config).await?;

    let agent = Arc::clone(&runtime.agent);
    tokio::spawn(async move { agent.run().await });
    let cron = Arc::clone(&runtime.cron);
    tokio::spawn(async move { cron.run().await });

    println!("FemtoClaw chat. Type your message, /quit to exit.");

    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        let line = tokio::task::block_in_place(|| editor.readline("you> "));
        let line = match line {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }
        let _ = editor.add_history_entry(input);

        runtime
            .bus
            .publish_inbound(InboundMessage::new("cli", "user", "direct", input))?;

        match runtime.bus.consume_outbound().await {
            Some(reply) => println!("\nfemtoclaw> {}\n", reply.content),
            None => break,
        }
    }

    runtime.agent.stop();
    println!("Bye.");
    Ok(())
}

async fn cmd_status(config: Config) -> Result<()> {
    println!("FemtoClaw status");
    println!("  config:    {}", Config::path().display());
    println!("  workspace: {}", config.workspace_path().display());
    println!("  model:     {}", config.agents.defaults.model);
    println!(
        "  api key:   {}",
        if config.provider.api_key.is_empty() {
            "missing"
        } else {
            "configured"
        }
    );

    let mut enabled = Vec::new();
    if config.channels.telegram.enabled {
        enabled.push("telegram");
    }
    if config.channels.discord.enabled {
        enabled.push("discord");
    }
    if config.channels.whatsapp.enabled {
        enabled.push("whatsapp");
    }
    if config.channels.feishu.enabled {
        enabled.push("feishu");
    }
    println!(
        "  channels:  {}",
        if enabled.is_empty() {
            "cli only".to_string()
        } else {
            enabled.join(", ")
        }
    );

    let sessions = SessionManager::new()?;
    let keys = sessions.list().await?;
    println!("  sessions:  {}", keys.len());
    for key in keys.iter().take(10) {
        println!("    - {}", key);
    }

    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("femtoclaw=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Chat => cmd_chat(config).await,
        Commands::Status => cmd_status(config).await,
    }
}
