// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget persistence of trigger events.
//!
//! Every operation goes through one queue drained by one worker task, so an
//! outcome update is never applied before the create it refers to. Failures
//! are logged and dropped; nothing is retried.

use std::sync::Arc;

use nudge_core::{EventOutcome, EventPatch, EventStore, NewTriggerEvent, SessionId, TriggerId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug)]
enum RecorderOp {
    Record(NewTriggerEvent),
    Update {
        trigger_id: TriggerId,
        session_id: SessionId,
        outcome: EventOutcome,
    },
}

/// Handle to the recorder worker. Dropping every clone stops the worker once
/// the queue is drained.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: mpsc::UnboundedSender<RecorderOp>,
}

impl EventRecorder {
    /// Start the worker on the current runtime.
    pub fn spawn(store: Arc<dyn EventStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(
            run_worker(store, rx).instrument(tracing::debug_span!("event_recorder")),
        );
        (Self { tx }, worker)
    }

    /// Queue creation of a trigger event.
    pub fn record(&self, event: NewTriggerEvent) {
        self.enqueue(RecorderOp::Record(event));
    }

    /// Queue an outcome update for the latest event of `(trigger_id, session_id)`.
    pub fn update(&self, trigger_id: TriggerId, session_id: SessionId, outcome: EventOutcome) {
        self.enqueue(RecorderOp::Update {
            trigger_id,
            session_id,
            outcome,
        });
    }

    fn enqueue(&self, op: RecorderOp) {
        if let Err(err) = self.tx.send(op) {
            tracing::debug!(op = ?err.0, "event recorder stopped, operation dropped");
        }
    }
}

async fn run_worker(store: Arc<dyn EventStore>, mut rx: mpsc::UnboundedReceiver<RecorderOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            RecorderOp::Record(event) => {
                let trigger_id = event.trigger_id.clone();
                match store.create(event).await {
                    Ok(stored) => {
                        tracing::debug!(trigger_id = %trigger_id, event_id = %stored.id, "trigger event recorded");
                    }
                    Err(err) => {
                        tracing::warn!(trigger_id = %trigger_id, error = %err, "failed to record trigger event");
                    }
                }
            }
            RecorderOp::Update {
                trigger_id,
                session_id,
                outcome,
            } => apply_update(store.as_ref(), &trigger_id, &session_id, outcome).await,
        }
    }
    tracing::debug!("event recorder drained");
}

async fn apply_update(
    store: &dyn EventStore,
    trigger_id: &TriggerId,
    session_id: &SessionId,
    outcome: EventOutcome,
) {
    let latest = match store.latest(trigger_id, session_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!(trigger_id = %trigger_id, ?outcome, "no trigger event to update, dropping");
            return;
        }
        Err(err) => {
            tracing::warn!(trigger_id = %trigger_id, error = %err, "trigger event lookup failed");
            return;
        }
    };
    if let Err(err) = store.patch(&latest.id, EventPatch::from(outcome)).await {
        tracing::warn!(trigger_id = %trigger_id, event_id = %latest.id, error = %err, "failed to update trigger event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nudge_core::EventMetadata;
    use nudge_test_utils::{FailingStore, InMemoryEventStore};
    use tracing_test::traced_test;

    fn event(trigger: &str) -> NewTriggerEvent {
        NewTriggerEvent {
            trigger_id: TriggerId::from(trigger),
            organization_id: "org-1".into(),
            customer_id: None,
            session_id: SessionId::from("s-1"),
            page_url: "/".into(),
            triggered_at: Utc::now(),
            engaged: false,
            converted: false,
            metadata: EventMetadata::default(),
        }
    }

    #[tokio::test]
    async fn update_queued_right_after_record_applies_to_it() {
        let store = InMemoryEventStore::new();
        let (recorder, worker) = EventRecorder::spawn(Arc::new(store.clone()));

        recorder.record(event("t-1"));
        recorder.update(TriggerId::from("t-1"), SessionId::from("s-1"), EventOutcome::Engaged);
        recorder.update(TriggerId::from("t-1"), SessionId::from("s-1"), EventOutcome::Converted);
        drop(recorder);
        worker.await.expect("worker");

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].record.engaged);
        assert!(events[0].record.converted);
    }

    #[tokio::test]
    #[traced_test]
    async fn update_without_event_is_dropped() {
        let store = InMemoryEventStore::new();
        let (recorder, worker) = EventRecorder::spawn(Arc::new(store.clone()));

        recorder.update(TriggerId::from("never"), SessionId::from("s-1"), EventOutcome::Converted);
        drop(recorder);
        worker.await.expect("worker");

        assert!(store.patches().await.is_empty());
        assert!(logs_contain("no trigger event to update"));
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failures_are_logged_and_swallowed() {
        let (recorder, worker) = EventRecorder::spawn(Arc::new(FailingStore));

        recorder.record(event("t-1"));
        recorder.update(TriggerId::from("t-1"), SessionId::from("s-1"), EventOutcome::Engaged);
        drop(recorder);
        worker.await.expect("worker");

        assert!(logs_contain("failed to record trigger event"));
        assert!(logs_contain("trigger event lookup failed"));
    }
}
