// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write side of trigger event storage.

use async_trait::async_trait;

use crate::error::NudgeError;
use crate::types::{EventId, EventPatch, NewTriggerEvent, SessionId, TriggerEvent, TriggerId};

/// Persistence for trigger lifecycle events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Creates an event and returns the stored record with its backend id.
    async fn create(&self, event: NewTriggerEvent) -> Result<TriggerEvent, NudgeError>;

    /// Returns the most recently triggered event for the pair, if any.
    async fn latest(
        &self,
        trigger_id: &TriggerId,
        session_id: &SessionId,
    ) -> Result<Option<TriggerEvent>, NudgeError>;

    /// Applies a partial update to an existing event.
    async fn patch(&self, id: &EventId, patch: EventPatch) -> Result<(), NudgeError>;
}
