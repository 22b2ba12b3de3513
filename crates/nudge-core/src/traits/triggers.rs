// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read side of trigger storage.

use async_trait::async_trait;

use crate::error::NudgeError;
use crate::types::{OrganizationId, TriggerDefinition};

/// Source of trigger definitions for an organization.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Returns the enabled definitions of `organization_id`, highest priority first.
    async fn list_enabled(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<TriggerDefinition>, NudgeError>;
}
