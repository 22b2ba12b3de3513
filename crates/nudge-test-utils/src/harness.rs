// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `EngineHarness` spawns a real engine over in-memory stores and a
//! [`RecordingSurface`]. Run it under `#[tokio::test(start_paused = true)]`
//! and drive time with [`EngineHarness::advance`].

use std::sync::Arc;
use std::time::Duration;

use nudge_core::{
    EventStore, NudgeError, TriggerConditions, TriggerDefinition, TriggerId, TriggerStore,
};
use nudge_engine::{CartSource, EngineBuilder, EngineReport, EngineSettings, HostHandle, RunningEngine};

use crate::stores::{FailingStore, InMemoryEventStore, InMemoryTriggerStore};
use crate::surface::RecordingSurface;

pub const TEST_ORGANIZATION: &str = "org-test";
pub const TEST_SESSION: &str = "session_test";

/// Enabled definition with no delay and priority 0.
pub fn trigger(id: &str, conditions: TriggerConditions) -> TriggerDefinition {
    TriggerDefinition {
        id: TriggerId::from(id),
        name: Some(format!("{id} trigger")),
        conditions,
        delay: Duration::ZERO,
        priority: 0,
        message: format!("prompt from {id}"),
        enabled: true,
    }
}

/// Builder for [`EngineHarness`].
pub struct EngineHarnessBuilder {
    triggers: Vec<TriggerDefinition>,
    landing_url: String,
    settings: EngineSettings,
    failing_catalog: bool,
    failing_events: bool,
    cart: Option<Box<dyn CartSource>>,
}

impl EngineHarnessBuilder {
    fn new() -> Self {
        Self {
            triggers: Vec::new(),
            landing_url: "/".to_string(),
            settings: EngineSettings::default(),
            failing_catalog: false,
            failing_events: false,
            cart: None,
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<TriggerDefinition>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_landing_url(mut self, url: &str) -> Self {
        self.landing_url = url.to_string();
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Make the catalog fetch fail.
    pub fn with_failing_catalog(mut self) -> Self {
        self.failing_catalog = true;
        self
    }

    /// Make every event write fail.
    pub fn with_failing_events(mut self) -> Self {
        self.failing_events = true;
        self
    }

    pub fn with_cart_source(mut self, source: Box<dyn CartSource>) -> Self {
        self.cart = Some(source);
        self
    }

    /// Spawn the engine on the current runtime.
    pub fn build(self) -> EngineHarness {
        let trigger_store = InMemoryTriggerStore::new(self.triggers);
        let event_store = InMemoryEventStore::new();
        let surface = RecordingSurface::new();

        let triggers: Arc<dyn TriggerStore> = if self.failing_catalog {
            Arc::new(FailingStore)
        } else {
            Arc::new(trigger_store.clone())
        };
        let events: Arc<dyn EventStore> = if self.failing_events {
            Arc::new(FailingStore)
        } else {
            Arc::new(event_store.clone())
        };

        let mut builder = EngineBuilder::new(TEST_ORGANIZATION, triggers, events)
            .settings(self.settings)
            .landing_url(self.landing_url)
            .session_id(TEST_SESSION)
            .surface(Box::new(surface.clone()));
        if let Some(cart) = self.cart {
            builder = builder.cart_source(cart);
        }

        let engine = builder.spawn();
        EngineHarness {
            handle: engine.handle(),
            engine,
            trigger_store,
            event_store,
            surface,
        }
    }
}

/// A running engine plus the fakes it talks to.
pub struct EngineHarness {
    engine: RunningEngine,
    handle: HostHandle,
    trigger_store: InMemoryTriggerStore,
    event_store: InMemoryEventStore,
    surface: RecordingSurface,
}

impl EngineHarness {
    pub fn builder() -> EngineHarnessBuilder {
        EngineHarnessBuilder::new()
    }

    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    pub fn trigger_store(&self) -> &InMemoryTriggerStore {
        &self.trigger_store
    }

    pub fn event_store(&self) -> &InMemoryEventStore {
        &self.event_store
    }

    pub fn surface(&self) -> &RecordingSurface {
        &self.surface
    }

    /// Let `duration` of (paused) time pass. Every task runs until idle first.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Unload the page: stop the engine and wait for pending event writes.
    pub async fn shutdown(self) -> Result<EngineReport, NudgeError> {
        self.engine.shutdown().await
    }
}
