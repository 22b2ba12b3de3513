// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The organization's enabled trigger definitions for one session.

use nudge_core::{OrganizationId, TriggerDefinition, TriggerId, TriggerStore};

/// Enabled definitions ordered by priority, highest first. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct TriggerCatalog {
    definitions: Vec<TriggerDefinition>,
}

impl TriggerCatalog {
    /// Fetch the catalog. A failed fetch yields an empty catalog and the
    /// engine runs as a no-op; it is not retried.
    pub async fn load(store: &dyn TriggerStore, organization_id: &OrganizationId) -> Self {
        match store.list_enabled(organization_id).await {
            Ok(definitions) => {
                let catalog = Self::from_definitions(definitions);
                tracing::info!(
                    organization_id = %organization_id,
                    count = catalog.len(),
                    "trigger catalog loaded"
                );
                catalog
            }
            Err(err) => {
                tracing::warn!(
                    organization_id = %organization_id,
                    error = %err,
                    "failed to load trigger catalog, running with no triggers"
                );
                Self::default()
            }
        }
    }

    /// Drop disabled entries and order by priority descending. The sort is
    /// stable, so equal priorities keep the order they arrived in.
    pub fn from_definitions(definitions: Vec<TriggerDefinition>) -> Self {
        let mut definitions: Vec<_> = definitions.into_iter().filter(|d| d.enabled).collect();
        definitions.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { definitions }
    }

    pub fn definitions(&self) -> &[TriggerDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &TriggerId) -> Option<&TriggerDefinition> {
        self.definitions.iter().find(|d| &d.id == id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::TriggerConditions;
    use nudge_test_utils::{FailingStore, InMemoryTriggerStore};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn def(id: &str, priority: i32, enabled: bool) -> TriggerDefinition {
        TriggerDefinition {
            id: TriggerId::from(id),
            name: None,
            conditions: TriggerConditions::ExitIntent {
                min_time_on_site: 0.0,
            },
            delay: Duration::ZERO,
            priority,
            message: String::new(),
            enabled,
        }
    }

    #[test]
    fn filters_disabled_and_sorts_stably() {
        let catalog = TriggerCatalog::from_definitions(vec![
            def("a", 1, true),
            def("b", 5, true),
            def("c", 9, false),
            def("d", 5, true),
        ]);
        let ids: Vec<&str> = catalog.definitions().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["b", "d", "a"]);
        assert!(catalog.get(&TriggerId::from("c")).is_none());
        assert_eq!(catalog.len(), 3);
    }

    #[tokio::test]
    async fn load_filters_what_the_store_returns() {
        let store = InMemoryTriggerStore::new(vec![def("a", 1, true), def("b", 3, false)]);
        let catalog = TriggerCatalog::load(&store, &OrganizationId::from("org-1")).await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(store.requests().await, vec![OrganizationId::from("org-1")]);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_load_yields_empty_catalog() {
        let catalog = TriggerCatalog::load(&FailingStore, &OrganizationId::from("org-1")).await;
        assert!(catalog.is_empty());
        assert!(logs_contain("failed to load trigger catalog"));
    }
}
