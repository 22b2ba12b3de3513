// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message bus between the engine and a mounted chat widget.

use nudge_core::{SessionId, TriggerId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Why a message is being handed to the chat widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Show the prompt inside the chat widget.
    Proactive,
    /// The visitor accepted a prompt; open the chat with this message.
    OpenChat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDelivery {
    pub trigger_id: TriggerId,
    pub session_id: SessionId,
    pub message: String,
    pub kind: DeliveryKind,
}

/// Broadcast bus a chat UI subscribes to. The chat surface counts as mounted
/// while at least one receiver is alive.
#[derive(Debug, Clone)]
pub struct ChatHandoff {
    sender: broadcast::Sender<ChatDelivery>,
}

impl ChatHandoff {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatDelivery> {
        self.sender.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Send to every mounted widget. Returns `false` if nobody was listening.
    pub fn deliver(&self, delivery: ChatDelivery) -> bool {
        match self.sender.send(delivery) {
            Ok(receivers) => {
                tracing::trace!(receivers, "chat delivery sent");
                true
            }
            Err(broadcast::error::SendError(delivery)) => {
                tracing::debug!(trigger_id = %delivery.trigger_id, "no chat widget mounted, delivery dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(kind: DeliveryKind) -> ChatDelivery {
        ChatDelivery {
            trigger_id: TriggerId::from("t-1"),
            session_id: SessionId::from("s-1"),
            message: "hi".into(),
            kind,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_and_counts_as_mounted() {
        let bus = ChatHandoff::new(4);
        assert!(!bus.is_mounted());
        let mut rx = bus.subscribe();
        assert!(bus.is_mounted());

        assert!(bus.deliver(delivery(DeliveryKind::Proactive)));
        assert_eq!(rx.recv().await.expect("delivery"), delivery(DeliveryKind::Proactive));

        drop(rx);
        assert!(!bus.is_mounted());
        assert!(!bus.deliver(delivery(DeliveryKind::OpenChat)));
    }

    #[test]
    fn delivery_serializes_camel_case() {
        let json = serde_json::to_value(delivery(DeliveryKind::OpenChat)).expect("serialize");
        assert_eq!(json["triggerId"], "t-1");
        assert_eq!(json["kind"], "open_chat");
    }
}
