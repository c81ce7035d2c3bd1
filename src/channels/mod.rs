//! Channel layer - the contract between chat platforms and the bus.
//!
//! A channel adapter connects one chat platform (Telegram, Discord,
//! WhatsApp, Feishu): it listens for platform messages, checks the sender
//! allow-list and publishes inbound events; the manager's dispatch loop
//! routes outbound replies back to the right adapter's `send`. The
//! wire-level protocol work lives in each adapter; the core only depends on
//! this trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;

/// One chat platform adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel name (`telegram`, `discord`, ...). Doubles as the
    /// routing key for outbound messages.
    fn name(&self) -> &str;

    /// Connect and listen for platform messages, publishing allowed ones to
    /// the bus. Long-running; returns when the channel shuts down.
    async fn start(&self) -> Result<()>;

    /// Stop listening and release resources.
    async fn stop(&self) -> Result<()>;

    /// Deliver one outbound message to the platform.
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;

    /// The configured sender allow-list; empty means allow everyone.
    fn allow_list(&self) -> &[String];

    /// Whether a sender may talk to the bot.
    ///
    /// Compound sender ids (`id|username`) match if any part is listed.
    fn is_allowed(&self, sender_id: &str) -> bool {
        let allow_list = self.allow_list();
        if allow_list.is_empty() {
            return true;
        }
        if allow_list.iter().any(|a| a == sender_id) {
            return true;
        }
        sender_id
            .split('|')
            .any(|part| !part.is_empty() && allow_list.iter().any(|a| a == part))
    }
}

/// Owns the channel adapters and the outbound dispatch loop.
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
    bus: Arc<MessageBus>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: HashMap::new(),
            bus,
        }
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        info!(channel = %channel.name(), "Channel registered");
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every channel plus the outbound dispatcher and wait for them.
    pub async fn start_all(self: Arc<Self>) {
        if self.channels.is_empty() {
            warn!("No channels registered");
        }

        let mut handles = Vec::new();
        for channel in self.channels.values().cloned() {
            handles.push(tokio::spawn(async move {
                let name = channel.name().to_string();
                if let Err(e) = channel.start().await {
                    error!(channel = %name, error = %e, "Channel exited with error");
                }
            }));
        }

        let dispatcher = {
            let manager = Arc::clone(&self);
            tokio::spawn(async move { manager.dispatch_outbound().await })
        };
        handles.push(dispatcher);

        futures::future::join_all(handles).await;
    }

    /// Route outbound messages to their channel until the queue closes.
    pub async fn dispatch_outbound(&self) {
        info!("Outbound dispatcher started");
        while let Some(msg) = self.bus.consume_outbound().await {
            match self.channels.get(&msg.channel) {
                Some(channel) => {
                    if let Err(e) = channel.send(&msg).await {
                        error!(channel = %msg.channel, error = %e, "Failed to send message");
                    }
                }
                None => warn!(channel = %msg.channel, "No channel for outbound message"),
            }
        }
        info!("Outbound dispatcher stopped");
    }

    pub async fn stop_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "Error stopping channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct RecordingChannel {
        name: String,
        allow_from: Vec<String>,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl RecordingChannel {
        fn new(name: &str, allow_from: Vec<String>) -> Self {
            Self {
                name: name.to_string(),
                allow_from,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> Result<()> {
            self.sent.lock().await.push(msg.clone());
            Ok(())
        }

        fn allow_list(&self) -> &[String] {
            &self.allow_from
        }
    }

    #[test]
    fn test_empty_allow_list_allows_everyone() {
        let channel = RecordingChannel::new("test", vec![]);
        assert!(channel.is_allowed("anyone"));
        assert!(channel.is_allowed("12345"));
    }

    #[test]
    fn test_allow_list_restricts_senders() {
        let channel = RecordingChannel::new("test", vec!["alice".into(), "42".into()]);
        assert!(channel.is_allowed("alice"));
        assert!(channel.is_allowed("42"));
        assert!(!channel.is_allowed("mallory"));
    }

    #[test]
    fn test_compound_sender_id_matches_any_part() {
        let channel = RecordingChannel::new("test", vec!["alice".into()]);
        assert!(channel.is_allowed("1234|alice"));
        assert!(channel.is_allowed("alice|extra"));
        assert!(!channel.is_allowed("1234|bob"));
        assert!(!channel.is_allowed("|"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_channel_name() {
        let bus = Arc::new(MessageBus::new());
        let telegram = Arc::new(RecordingChannel::new("telegram", vec![]));
        let discord = Arc::new(RecordingChannel::new("discord", vec![]));

        let mut manager = ChannelManager::new(Arc::clone(&bus));
        manager.register(telegram.clone());
        manager.register(discord.clone());
        let manager = Arc::new(manager);

        let dispatcher = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.dispatch_outbound().await })
        };

        bus.publish_outbound(OutboundMessage::new("telegram", "c1", "to tg")).unwrap();
        bus.publish_outbound(OutboundMessage::new("discord", "c2", "to dc")).unwrap();
        bus.publish_outbound(OutboundMessage::new("nowhere", "c3", "dropped")).unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        dispatcher.abort();

        let tg_sent = telegram.sent.lock().await;
        assert_eq!(tg_sent.len(), 1);
        assert_eq!(tg_sent[0].content, "to tg");

        let dc_sent = discord.sent.lock().await;
        assert_eq!(dc_sent.len(), 1);
        assert_eq!(dc_sent[0].content, "to dc");
    }

    #[test]
    fn test_channel_names_sorted() {
        let bus = Arc::new(MessageBus::new());
        let mut manager = ChannelManager::new(bus);
        manager.register(Arc::new(RecordingChannel::new("zeta", vec![])));
        manager.register(Arc::new(RecordingChannel::new("alpha", vec![])));
        assert_eq!(manager.channel_names(), vec!["alpha", "zeta"]);
    }
}
