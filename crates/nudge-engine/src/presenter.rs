// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt display and lifecycle.
//!
//! One prompt is visible at a time. A strictly higher-priority firing replaces
//! the visible prompt; an equal or lower one is suppressed (still recorded by
//! the caller, never shown).

use std::collections::HashMap;
use std::time::Duration;

use nudge_core::{SessionId, TriggerId};
use tokio::time::Instant;

use crate::evaluator::Firing;
use crate::handoff::{ChatDelivery, ChatHandoff, DeliveryKind};

pub const ACCEPT_LABEL: &str = "Start chat";
pub const DECLINE_LABEL: &str = "Maybe later";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Hidden,
    Visible,
    Dismissed,
    Accepted,
    AutoExpired,
}

/// Where a visible prompt was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPath {
    ChatWidget,
    Card,
}

/// Standalone prompt card for pages without a chat widget.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCard {
    pub trigger_id: TriggerId,
    pub message: String,
    pub accept_label: &'static str,
    pub decline_label: &'static str,
}

/// Renders and removes prompt cards.
pub trait PromptSurface: Send {
    fn show(&mut self, card: &PromptCard);
    fn remove(&mut self, trigger_id: &TriggerId);
}

/// Surface that only logs. Used when the host provides none.
#[derive(Debug, Default)]
pub struct LogSurface;

impl PromptSurface for LogSurface {
    fn show(&mut self, card: &PromptCard) {
        tracing::info!(trigger_id = %card.trigger_id, message = %card.message, "prompt card shown");
    }

    fn remove(&mut self, trigger_id: &TriggerId) {
        tracing::debug!(trigger_id = %trigger_id, "prompt card removed");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresentOutcome {
    Shown(DisplayPath),
    /// A prompt of equal or higher priority is already visible.
    Suppressed { by: TriggerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorAction {
    Accept,
    Decline,
}

#[derive(Debug)]
struct VisiblePrompt {
    trigger_id: TriggerId,
    priority: i32,
    message: String,
    path: DisplayPath,
    expires_at: Instant,
}

pub struct Presenter {
    session_id: SessionId,
    handoff: ChatHandoff,
    surface: Box<dyn PromptSurface>,
    visibility: Duration,
    visible: Option<VisiblePrompt>,
    states: HashMap<TriggerId, PromptState>,
}

impl Presenter {
    pub fn new(
        session_id: SessionId,
        handoff: ChatHandoff,
        surface: Box<dyn PromptSurface>,
        visibility: Duration,
    ) -> Self {
        Self {
            session_id,
            handoff,
            surface,
            visibility,
            visible: None,
            states: HashMap::new(),
        }
    }

    /// Lifecycle state of a trigger's prompt. Unknown ids are `Hidden`.
    pub fn state(&self, id: &TriggerId) -> PromptState {
        self.states.get(id).copied().unwrap_or(PromptState::Hidden)
    }

    pub fn visible(&self) -> Option<&TriggerId> {
        self.visible.as_ref().map(|v| &v.trigger_id)
    }

    pub fn present(&mut self, firing: &Firing, now: Instant) -> PresentOutcome {
        if let Some(current) = &self.visible {
            if current.priority >= firing.priority {
                tracing::debug!(
                    trigger_id = %firing.trigger_id,
                    visible = %current.trigger_id,
                    "prompt suppressed by visible prompt"
                );
                self.states.insert(firing.trigger_id.clone(), PromptState::Hidden);
                return PresentOutcome::Suppressed {
                    by: current.trigger_id.clone(),
                };
            }
            tracing::debug!(
                trigger_id = %firing.trigger_id,
                replaced = %current.trigger_id,
                "higher-priority prompt replaces visible prompt"
            );
            self.close(PromptState::Dismissed);
        }

        let path = if self.handoff.is_mounted() {
            self.handoff.deliver(ChatDelivery {
                trigger_id: firing.trigger_id.clone(),
                session_id: self.session_id.clone(),
                message: firing.message.clone(),
                kind: DeliveryKind::Proactive,
            });
            DisplayPath::ChatWidget
        } else {
            self.surface.show(&PromptCard {
                trigger_id: firing.trigger_id.clone(),
                message: firing.message.clone(),
                accept_label: ACCEPT_LABEL,
                decline_label: DECLINE_LABEL,
            });
            DisplayPath::Card
        };

        self.states.insert(firing.trigger_id.clone(), PromptState::Visible);
        self.visible = Some(VisiblePrompt {
            trigger_id: firing.trigger_id.clone(),
            priority: firing.priority,
            message: firing.message.clone(),
            path,
            expires_at: now + self.visibility,
        });
        PresentOutcome::Shown(path)
    }

    /// Apply a visitor action to the visible prompt. Returns the new state, or
    /// `None` when `id` is not the visible prompt.
    pub fn resolve(&mut self, id: &TriggerId, action: VisitorAction) -> Option<PromptState> {
        if self.visible.as_ref().map(|v| &v.trigger_id) != Some(id) {
            tracing::debug!(trigger_id = %id, ?action, "action for a prompt that is not visible");
            return None;
        }
        let state = match action {
            VisitorAction::Accept => PromptState::Accepted,
            VisitorAction::Decline => PromptState::Dismissed,
        };
        let closed = self.close(state)?;
        if state == PromptState::Accepted {
            self.handoff.deliver(ChatDelivery {
                trigger_id: closed.trigger_id,
                session_id: self.session_id.clone(),
                message: closed.message,
                kind: DeliveryKind::OpenChat,
            });
        }
        Some(state)
    }

    /// When the visible prompt, if any, auto-expires.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.visible.as_ref().map(|v| v.expires_at)
    }

    /// Expire the visible prompt if its time is up.
    pub fn expire(&mut self, now: Instant) -> Option<TriggerId> {
        if self.next_expiry().is_some_and(|at| at <= now) {
            self.close(PromptState::AutoExpired).map(|closed| closed.trigger_id)
        } else {
            None
        }
    }

    fn close(&mut self, state: PromptState) -> Option<VisiblePrompt> {
        let closed = self.visible.take()?;
        if closed.path == DisplayPath::Card {
            self.surface.remove(&closed.trigger_id);
        }
        tracing::debug!(trigger_id = %closed.trigger_id, ?state, "prompt closed");
        self.states.insert(closed.trigger_id.clone(), state);
        Some(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::EventMetadata;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Cards(Arc<Mutex<Vec<String>>>);

    impl PromptSurface for Cards {
        fn show(&mut self, card: &PromptCard) {
            self.0.lock().unwrap().push(format!("show {}", card.trigger_id));
        }
        fn remove(&mut self, trigger_id: &TriggerId) {
            self.0.lock().unwrap().push(format!("remove {trigger_id}"));
        }
    }

    fn firing(id: &str, priority: i32) -> Firing {
        Firing {
            trigger_id: TriggerId::from(id),
            priority,
            message: format!("msg {id}"),
            page_url: "/".into(),
            metadata: EventMetadata::default(),
        }
    }

    fn presenter(cards: &Cards, handoff: ChatHandoff) -> Presenter {
        Presenter::new(
            SessionId::from("s-1"),
            handoff,
            Box::new(cards.clone()),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn equal_or_lower_priority_is_suppressed() {
        let cards = Cards::default();
        let mut p = presenter(&cards, ChatHandoff::new(4));
        let now = Instant::now();

        assert_eq!(p.present(&firing("a", 5), now), PresentOutcome::Shown(DisplayPath::Card));
        assert_eq!(
            p.present(&firing("b", 5), now),
            PresentOutcome::Suppressed { by: TriggerId::from("a") }
        );
        assert!(matches!(p.present(&firing("c", 1), now), PresentOutcome::Suppressed { .. }));
        assert_eq!(p.state(&TriggerId::from("b")), PromptState::Hidden);
        assert_eq!(p.visible(), Some(&TriggerId::from("a")));
    }

    #[test]
    fn higher_priority_replaces_visible_prompt() {
        let cards = Cards::default();
        let mut p = presenter(&cards, ChatHandoff::new(4));
        let now = Instant::now();

        p.present(&firing("low", 1), now);
        p.present(&firing("high", 9), now);
        assert_eq!(p.state(&TriggerId::from("low")), PromptState::Dismissed);
        assert_eq!(p.state(&TriggerId::from("high")), PromptState::Visible);
        assert_eq!(
            *cards.0.lock().unwrap(),
            ["show low", "remove low", "show high"]
        );
    }

    #[test]
    fn auto_expires_after_visibility_window() {
        let cards = Cards::default();
        let mut p = presenter(&cards, ChatHandoff::new(4));
        let now = Instant::now();

        p.present(&firing("a", 1), now);
        assert_eq!(p.expire(now + Duration::from_secs(29)), None);
        assert_eq!(p.expire(now + Duration::from_secs(30)), Some(TriggerId::from("a")));
        assert_eq!(p.state(&TriggerId::from("a")), PromptState::AutoExpired);
        assert_eq!(p.next_expiry(), None);
        assert!(matches!(p.present(&firing("b", 0), now), PresentOutcome::Shown(_)));
    }

    #[test]
    fn decline_dismisses_and_only_visible_prompt_resolves() {
        let cards = Cards::default();
        let mut p = presenter(&cards, ChatHandoff::new(4));
        p.present(&firing("a", 1), Instant::now());

        assert_eq!(p.resolve(&TriggerId::from("zzz"), VisitorAction::Decline), None);
        assert_eq!(p.resolve(&TriggerId::from("a"), VisitorAction::Decline), Some(PromptState::Dismissed));
        assert_eq!(p.resolve(&TriggerId::from("a"), VisitorAction::Accept), None);
    }

    #[tokio::test]
    async fn mounted_widget_receives_prompt_and_open_chat() {
        let cards = Cards::default();
        let handoff = ChatHandoff::new(4);
        let mut rx = handoff.subscribe();
        let mut p = presenter(&cards, handoff);

        assert_eq!(
            p.present(&firing("a", 1), Instant::now()),
            PresentOutcome::Shown(DisplayPath::ChatWidget)
        );
        assert_eq!(p.resolve(&TriggerId::from("a"), VisitorAction::Accept), Some(PromptState::Accepted));

        let first = rx.recv().await.expect("proactive delivery");
        assert_eq!(first.kind, DeliveryKind::Proactive);
        let second = rx.recv().await.expect("open chat delivery");
        assert_eq!(second.kind, DeliveryKind::OpenChat);
        assert_eq!(second.message, "msg a");
        assert!(cards.0.lock().unwrap().is_empty());
    }
}
