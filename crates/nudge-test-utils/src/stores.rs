// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory and failing store implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use nudge_core::{
    EventId, EventPatch, EventStore, NewTriggerEvent, NudgeError, OrganizationId, SessionId,
    TriggerDefinition, TriggerEvent, TriggerId, TriggerStore,
};

/// Trigger catalog held in memory, keyed by nothing: every organization sees
/// the same definitions. Returns them in insertion order, disabled ones
/// included, so catalog filtering is exercised.
#[derive(Clone, Default)]
pub struct InMemoryTriggerStore {
    definitions: Arc<Mutex<Vec<TriggerDefinition>>>,
    requests: Arc<Mutex<Vec<OrganizationId>>>,
}

impl InMemoryTriggerStore {
    pub fn new(definitions: Vec<TriggerDefinition>) -> Self {
        Self {
            definitions: Arc::new(Mutex::new(definitions)),
            requests: Arc::default(),
        }
    }

    /// Organizations the catalog was requested for, in order.
    pub async fn requests(&self) -> Vec<OrganizationId> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn list_enabled(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<TriggerDefinition>, NudgeError> {
        self.requests.lock().await.push(organization_id.clone());
        Ok(self.definitions.lock().await.clone())
    }
}

/// Event store held in memory.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<Mutex<Vec<TriggerEvent>>>,
    patches: Arc<Mutex<Vec<(EventId, EventPatch)>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events, in creation order.
    pub async fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().await.clone()
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Every patch applied, in order.
    pub async fn patches(&self) -> Vec<(EventId, EventPatch)> {
        self.patches.lock().await.clone()
    }

    /// Stored events for one trigger.
    pub async fn events_for(&self, trigger_id: &str) -> Vec<TriggerEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.record.trigger_id.as_str() == trigger_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, event: NewTriggerEvent) -> Result<TriggerEvent, NudgeError> {
        let stored = TriggerEvent {
            id: EventId(format!("evt-{}", uuid::Uuid::new_v4())),
            record: event,
        };
        self.events.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn latest(
        &self,
        trigger_id: &TriggerId,
        session_id: &SessionId,
    ) -> Result<Option<TriggerEvent>, NudgeError> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| &e.record.trigger_id == trigger_id && &e.record.session_id == session_id)
            .max_by_key(|e| e.record.triggered_at)
            .cloned())
    }

    async fn patch(&self, id: &EventId, patch: EventPatch) -> Result<(), NudgeError> {
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| NudgeError::Backend {
                status: 404,
                message: format!("event {id} not found"),
            })?;
        patch.apply(&mut event.record);
        self.patches.lock().await.push((id.clone(), patch));
        Ok(())
    }
}

/// Store whose every call fails with a transport error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

fn unreachable_backend() -> NudgeError {
    NudgeError::Transport {
        message: "backend unreachable".into(),
        source: None,
    }
}

#[async_trait]
impl TriggerStore for FailingStore {
    async fn list_enabled(
        &self,
        _organization_id: &OrganizationId,
    ) -> Result<Vec<TriggerDefinition>, NudgeError> {
        Err(unreachable_backend())
    }
}

#[async_trait]
impl EventStore for FailingStore {
    async fn create(&self, _event: NewTriggerEvent) -> Result<TriggerEvent, NudgeError> {
        Err(unreachable_backend())
    }

    async fn latest(
        &self,
        _trigger_id: &TriggerId,
        _session_id: &SessionId,
    ) -> Result<Option<TriggerEvent>, NudgeError> {
        Err(unreachable_backend())
    }

    async fn patch(&self, _id: &EventId, _patch: EventPatch) -> Result<(), NudgeError> {
        Err(unreachable_backend())
    }
}
