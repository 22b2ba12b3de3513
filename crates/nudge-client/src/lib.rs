// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP backend for the Nudge engine.
//!
//! [`BackendClient`] implements both [`TriggerStore`](nudge_core::TriggerStore)
//! and [`EventStore`](nudge_core::EventStore) against the storage REST API:
//!
//! - `GET  triggers?organizationId=&enabled=true&order=priority.desc`
//! - `POST events`
//! - `GET  events?triggerId=&sessionId=&order=triggeredAt.desc&limit=1`
//! - `PATCH events/{id}`
//!
//! The client never retries. Callers treat every failure as "do less".

pub mod client;

pub use client::BackendClient;
