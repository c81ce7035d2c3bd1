//! Message bus - decouples chat channels from the agent loop.
//!
//! Two independent unbounded FIFO queues: inbound (channel → agent) and
//! outbound (agent → channel). The bus performs no transformation, filtering
//! or backpressure; channels and the agent loop can fail, restart or block
//! without the other side observing it. `consume_inbound` is the agent
//! loop's sole admission point.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::{FemtoError, Result};

/// A message received from a chat channel (or synthesized by the core:
/// subagent announcements, cron triggers, heartbeats use channel `"system"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Source channel name (telegram, discord, whatsapp, feishu, cli, system).
    pub channel: String,
    /// Sender identifier within the channel.
    pub sender_id: String,
    /// Chat/conversation identifier within the channel.
    pub chat_id: String,
    /// Message text.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Paths or URLs of attached media.
    #[serde(default)]
    pub media: Vec<String>,
    /// Channel-specific extras.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Unique key identifying the conversation this message belongs to.
    /// Channel and chat id jointly identify a session, so cross-channel
    /// identities never collide.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A reply destined for a chat channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    /// Optional message id this is a reply to.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// The message bus connecting channels and the agent loop.
///
/// Internally a pair of unbounded tokio channels. Receivers are `!Sync`, so
/// they live behind async mutexes; the bus itself is cheaply shareable via
/// `Arc`. Order is preserved per producer; there is no global cross-channel
/// ordering guarantee.
pub struct MessageBus {
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Enqueue a message from a channel (or a synthetic system event).
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .map_err(|_| FemtoError::Config("inbound queue closed".into()))
    }

    /// Receive the next inbound message. Returns `None` once the queue is
    /// closed. Suspends while the queue is empty; never busy-waits.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Enqueue a reply for delivery by a channel.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .map_err(|_| FemtoError::Config("outbound queue closed".into()))
    }

    /// Receive the next outbound message. Returns `None` once closed.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key() {
        let msg = InboundMessage::new("telegram", "user1", "chat42", "hi");
        assert_eq!(msg.session_key(), "telegram:chat42");
    }

    #[tokio::test]
    async fn test_inbound_roundtrip() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage::new("cli", "me", "direct", "hello"))
            .unwrap();

        let received = bus.consume_inbound().await.unwrap();
        assert_eq!(received.channel, "cli");
        assert_eq!(received.content, "hello");
    }

    #[tokio::test]
    async fn test_outbound_roundtrip() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("telegram", "chat42", "reply"))
            .unwrap();

        let received = bus.consume_outbound().await.unwrap();
        assert_eq!(received.chat_id, "chat42");
        assert_eq!(received.content, "reply");
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let bus = MessageBus::new();
        for i in 0..10 {
            bus.publish_inbound(InboundMessage::new("cli", "me", "direct", &format!("msg {}", i)))
                .unwrap();
        }
        for i in 0..10 {
            let msg = bus.consume_inbound().await.unwrap();
            assert_eq!(msg.content, format!("msg {}", i));
        }
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("cli", "direct", "out"))
            .unwrap();
        bus.publish_inbound(InboundMessage::new("cli", "me", "direct", "in"))
            .unwrap();

        // Consuming one queue does not disturb the other.
        assert_eq!(bus.consume_inbound().await.unwrap().content, "in");
        assert_eq!(bus.consume_outbound().await.unwrap().content, "out");
    }

    #[tokio::test]
    async fn test_consume_suspends_until_publish() {
        use std::sync::Arc;

        let bus = Arc::new(MessageBus::new());
        let consumer = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.consume_inbound().await })
        };

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        bus.publish_inbound(InboundMessage::new("cli", "me", "direct", "late"))
            .unwrap();

        let msg = consumer.await.unwrap().unwrap();
        assert_eq!(msg.content, "late");
    }
}
