// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt surface that records what it was asked to render.

use std::sync::{Arc, Mutex, MutexGuard};

use nudge_core::TriggerId;
use nudge_engine::{PromptCard, PromptSurface};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Shown(PromptCard),
    Removed(TriggerId),
}

/// A [`PromptSurface`] whose clones share one event log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.lock().clone()
    }

    /// Cards shown, in order.
    pub fn shown(&self) -> Vec<PromptCard> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SurfaceEvent::Shown(card) => Some(card.clone()),
                SurfaceEvent::Removed(_) => None,
            })
            .collect()
    }

    /// Ids of cards currently on screen.
    pub fn on_screen(&self) -> Vec<TriggerId> {
        let mut visible = Vec::new();
        for event in self.lock().iter() {
            match event {
                SurfaceEvent::Shown(card) => visible.push(card.trigger_id.clone()),
                SurfaceEvent::Removed(id) => visible.retain(|v| v != id),
            }
        }
        visible
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SurfaceEvent>> {
        // A panicking test thread may poison the lock; the log is still usable.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PromptSurface for RecordingSurface {
    fn show(&mut self, card: &PromptCard) {
        self.lock().push(SurfaceEvent::Shown(card.clone()));
    }

    fn remove(&mut self, trigger_id: &TriggerId) {
        self.lock().push(SurfaceEvent::Removed(trigger_id.clone()));
    }
}
