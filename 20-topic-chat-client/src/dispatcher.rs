//! Rendering of messages that arrive on the subscription channel.
//!
//! Deliveries are queued by the transport pump and drained here on a task of
//! their own, so a command waiting on its reply never holds them up.

use std::io;

use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{console::Console, message::Delivery};

/// Work item for the dispatcher task.
#[derive(Debug)]
pub enum DispatchEvent {
    Delivery(Delivery),
    /// Something went wrong on the subscription channel itself.
    Notice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Private message sent to the operator's personal topic.
    Direct,
    Broadcast,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: InboundKind,
    pub topic: String,
    pub sender: Option<String>,
    pub content: String,
}

#[derive(Deserialize)]
struct Payload {
    #[serde(rename = "type")]
    kind: String,
    src: Option<String>,
    user: Option<String>,
    content: String,
}

impl InboundMessage {
    /// Classifies a raw payload. Anything that does not decode is kept as raw text.
    pub fn decode(topic: &str, raw_payload: &str) -> Self {
        let payload = match serde_json::from_str::<Payload>(raw_payload) {
            Ok(payload) => payload,
            Err(_) => return Self::raw(topic, raw_payload),
        };

        let kind = match payload.kind.as_str() {
            "p2p" => InboundKind::Direct,
            "publish" => InboundKind::Broadcast,
            _ => return Self::raw(topic, raw_payload),
        };

        Self {
            kind,
            topic: topic.to_string(),
            sender: payload.src.or(payload.user),
            content: payload.content,
        }
    }

    fn raw(topic: &str, raw_payload: &str) -> Self {
        Self {
            kind: InboundKind::Raw,
            topic: topic.to_string(),
            sender: None,
            content: raw_payload.to_string(),
        }
    }

    pub fn render(&self) -> String {
        let sender = self.sender.as_deref().unwrap_or("unknown");
        match self.kind {
            InboundKind::Direct => format!("[private] {sender}: {}", self.content),
            InboundKind::Broadcast => format!("[{}] {sender}: {}", self.topic, self.content),
            InboundKind::Raw => format!("[{}] {}", self.topic, self.content),
        }
    }
}

pub struct Dispatcher {
    console: Console,
}

impl Dispatcher {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    pub async fn on_message(&self, topic: &str, raw_payload: &str) -> io::Result<()> {
        let message = InboundMessage::decode(topic, raw_payload);
        debug!(topic, kind = ?message.kind, "dispatching inbound message");
        self.console.line(&message.render()).await
    }

    /// Drains `events` until every sender is gone or the terminal stops accepting output.
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<DispatchEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let rendered = match event {
                    DispatchEvent::Delivery(delivery) => {
                        self.on_message(&delivery.topic, &delivery.payload).await
                    }
                    DispatchEvent::Notice(text) => self.console.warn(&text).await,
                };
                if let Err(error) = rendered {
                    warn!(?error, "failed to render inbound message");
                    break;
                }
            }
        })
    }
}
