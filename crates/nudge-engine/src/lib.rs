// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proactive engagement engine.
//!
//! Watches visitor behavior on a page (scroll depth, exit intent, dwell time,
//! URL, UTM attribution, cart contents), evaluates the organization's trigger
//! catalog against it, and shows at most one prompt at a time, recording every
//! firing and its outcome.
//!
//! # Components
//!
//! - [`TriggerCatalog`] - enabled definitions, highest priority first
//! - [`SignalMonitor`] - raw observations to normalized [`Signal`]s
//! - [`EvaluationEngine`] - condition checks and delayed firing
//! - [`Presenter`] - prompt lifecycle, chat widget or card
//! - [`EventRecorder`] - queued, best-effort event persistence
//! - [`EngineBuilder`] / [`HostHandle`] - the running engine and its host API

pub mod cart;
pub mod catalog;
pub mod evaluator;
pub mod glob;
pub mod handoff;
pub mod presenter;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod signal;
pub mod template;

pub use cart::{CartSnapshot, CartSource, FallbackCart, KeyValueCart, MemoryKeyValue, ProbeCart};
pub use catalog::TriggerCatalog;
pub use evaluator::{EvaluationEngine, Firing};
pub use handoff::{ChatDelivery, ChatHandoff, DeliveryKind};
pub use presenter::{
    DisplayPath, LogSurface, PresentOutcome, Presenter, PromptCard, PromptState, PromptSurface,
    VisitorAction,
};
pub use recorder::EventRecorder;
pub use runtime::{EngineBuilder, EngineReport, EngineSettings, HostCommand, HostHandle, RunningEngine};
pub use session::{PageLocation, SessionState};
pub use signal::{ScrollPosition, Signal, SignalMonitor};
