// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Nudge integration tests.
//!
//! Provides fake stores and an engine harness for fast, deterministic tests
//! without a backend.
//!
//! # Components
//!
//! - [`InMemoryTriggerStore`] / [`InMemoryEventStore`] - inspectable stores
//! - [`FailingStore`] - every call fails with a transport error
//! - [`RecordingSurface`] - captures prompt cards
//! - [`EngineHarness`] - a spawned engine wired to all of the above

pub mod harness;
pub mod stores;
pub mod surface;

pub use harness::{EngineHarness, TEST_ORGANIZATION, TEST_SESSION, trigger};
pub use stores::{FailingStore, InMemoryEventStore, InMemoryTriggerStore};
pub use surface::{RecordingSurface, SurfaceEvent};

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::{EventPatch, EventStore, NewTriggerEvent, SessionId, TriggerId};

    fn event(trigger: &str, seconds: i64) -> NewTriggerEvent {
        NewTriggerEvent {
            trigger_id: TriggerId::from(trigger),
            organization_id: TEST_ORGANIZATION.into(),
            customer_id: None,
            session_id: SessionId::from(TEST_SESSION),
            page_url: "/".into(),
            triggered_at: chrono::DateTime::from_timestamp(1_700_000_000 + seconds, 0)
                .unwrap_or_default(),
            engaged: false,
            converted: false,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn latest_returns_most_recent_and_patch_applies() {
        let store = InMemoryEventStore::new();
        store.create(event("t-1", 0)).await.unwrap();
        let newer = store.create(event("t-1", 10)).await.unwrap();
        store.create(event("t-2", 20)).await.unwrap();

        let latest = store
            .latest(&TriggerId::from("t-1"), &SessionId::from(TEST_SESSION))
            .await
            .unwrap()
            .expect("event exists");
        assert_eq!(latest.id, newer.id);

        store
            .patch(&latest.id, EventPatch { engaged: Some(true), converted: None })
            .await
            .unwrap();
        let events = store.events_for("t-1").await;
        assert!(!events[0].record.engaged);
        assert!(events[1].record.engaged);
    }

    #[tokio::test]
    async fn failing_store_reports_transport_errors() {
        let err = FailingStore.create(event("t-1", 0)).await.unwrap_err();
        assert!(err.is_transport());
    }
}
