// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend store traits.
//!
//! Both traits use `#[async_trait]` so the engine can hold them as
//! `Arc<dyn ...>` and swap the HTTP client for in-memory stores in tests.

pub mod events;
pub mod triggers;

pub use events::EventStore;
pub use triggers::TriggerStore;
