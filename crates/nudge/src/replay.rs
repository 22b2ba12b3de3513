// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nudge replay` command implementation.
//!
//! Plays a timed visitor script against a live engine and prints every
//! prompt it shows. Script format:
//!
//! ```json
//! {
//!   "landingUrl": "/pricing?utm_source=email",
//!   "lingerSecs": 5,
//!   "steps": [
//!     { "at": 1.0, "action": "scroll", "percentage": 60 },
//!     { "at": 4.0, "action": "cart", "hasItems": true, "value": 75 },
//!     { "at": 9.5, "action": "pointer_leave" },
//!     { "at": 12.0, "action": "accept", "triggerId": "exit-offer" }
//!   ]
//! }
//! ```

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nudge_client::BackendClient;
use nudge_config::NudgeConfig;
use nudge_core::{
    EventId, EventPatch, EventStore, NewTriggerEvent, NudgeError, SessionId, TriggerEvent,
    TriggerId, TriggerStore,
};
use nudge_engine::{
    EngineBuilder, EngineReport, EngineSettings, HostHandle, KeyValueCart, MemoryKeyValue,
    PromptCard, PromptSurface, ScrollPosition,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::shutdown;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplayScript {
    #[serde(default = "default_landing_url")]
    pub landing_url: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Seconds to keep the engine alive after the last step.
    #[serde(default = "default_linger_secs")]
    pub linger_secs: f64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_landing_url() -> String {
    "/".to_string()
}

fn default_linger_secs() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Seconds after page load.
    pub at: f64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Action {
    Scroll { percentage: f64 },
    PointerLeave {
        #[serde(default)]
        client_y: f64,
    },
    Navigate { url: String },
    /// Host-pushed cart snapshot.
    Cart { has_items: bool, value: f64 },
    /// Write the raw cart record the engine polls on each tick.
    CartEntry { entry: serde_json::Value },
    Customer { id: String },
    Accept { trigger_id: String },
    Decline { trigger_id: String },
    Convert { trigger_id: String },
}

impl ReplayScript {
    pub fn parse(raw: &str) -> Result<Self, NudgeError> {
        let mut script: Self = serde_json::from_str(raw).map_err(|e| NudgeError::Decode {
            message: format!("invalid replay script: {e}"),
            source: Some(Box::new(e)),
        })?;
        if let Some(step) = script.steps.iter().find(|s| !s.at.is_finite() || s.at < 0.0) {
            return Err(NudgeError::Config(format!(
                "replay step time must be a non-negative number, got {}",
                step.at
            )));
        }
        script.steps.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(script)
    }

    fn polls_cart_entry(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.action, Action::CartEntry { .. }))
    }
}

pub async fn run_replay(
    config: &NudgeConfig,
    organization_id: &str,
    script_path: &Path,
    dry_run: bool,
    plain: bool,
) -> Result<(), NudgeError> {
    let raw = tokio::fs::read_to_string(script_path).await.map_err(|e| {
        NudgeError::Config(format!("cannot read {}: {e}", script_path.display()))
    })?;
    let script = ReplayScript::parse(&raw)?;

    let client = Arc::new(BackendClient::new(&config.backend)?);
    let triggers: Arc<dyn TriggerStore> = client.clone();
    let events: Arc<dyn EventStore> = if dry_run {
        Arc::new(DryRunEvents::default())
    } else {
        client
    };

    let use_color = !plain && std::io::stdout().is_terminal();
    let cart = MemoryKeyValue::new();
    let cancel = shutdown::install_signal_handler();

    let mut builder = EngineBuilder::new(organization_id, triggers, events)
        .settings(EngineSettings::from(&config.engine))
        .landing_url(script.landing_url.clone())
        .surface(Box::new(PrintSurface { use_color }))
        .cancel_token(cancel.clone());
    if let Some(id) = &script.session_id {
        builder = builder.session_id(id.as_str());
    }
    if script.polls_cart_entry() {
        builder = builder.cart_source(Box::new(KeyValueCart::new(
            cart.clone(),
            config.cart.storage_key.clone(),
        )));
    }

    let engine = builder.spawn();
    println!("  replaying {} ({} steps)", script_path.display(), script.steps.len());
    println!("  session {}", engine.handle().session_id());

    play(&script, &engine.handle(), &cart, &config.cart.storage_key, &cancel).await?;
    let report = engine.shutdown().await?;
    print_report(&report);
    Ok(())
}

/// Apply each step at its offset from now, then linger.
pub async fn play(
    script: &ReplayScript,
    handle: &HostHandle,
    cart: &MemoryKeyValue,
    cart_key: &str,
    cancel: &CancellationToken,
) -> Result<(), NudgeError> {
    let start = Instant::now();
    for step in &script.steps {
        let at = start + secs(step.at);
        tokio::select! {
            _ = tokio::time::sleep_until(at) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
        tracing::debug!(at = step.at, action = ?step.action, "replay step");
        apply(&step.action, handle, cart, cart_key).await?;
    }

    let end = start + secs(script.steps.last().map_or(0.0, |s| s.at) + script.linger_secs);
    tokio::select! {
        _ = tokio::time::sleep_until(end) => {}
        _ = cancel.cancelled() => {}
    }
    Ok(())
}

async fn apply(
    action: &Action,
    handle: &HostHandle,
    cart: &MemoryKeyValue,
    cart_key: &str,
) -> Result<(), NudgeError> {
    match action {
        Action::Scroll { percentage } => {
            let y = percentage.clamp(0.0, 100.0);
            handle.scroll(ScrollPosition::new(y, 200.0, 100.0)).await
        }
        Action::PointerLeave { client_y } => handle.pointer_left(*client_y).await,
        Action::Navigate { url } => handle.navigate(url.as_str()).await,
        Action::Cart { has_items, value } => handle.update_cart(*has_items, *value).await,
        Action::CartEntry { entry } => {
            cart.set(cart_key, entry.to_string());
            Ok(())
        }
        Action::Customer { id } => handle.set_customer_id(id.as_str()).await,
        Action::Accept { trigger_id } => handle.accept(trigger_id.as_str()).await,
        Action::Decline { trigger_id } => handle.decline(trigger_id.as_str()).await,
        Action::Convert { trigger_id } => handle.mark_conversion(trigger_id.as_str()).await,
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn print_report(report: &EngineReport) {
    let list = |ids: &[TriggerId]| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.iter().map(TriggerId::as_str).collect::<Vec<_>>().join(", ")
        }
    };
    println!();
    println!("  catalog     {} triggers", report.catalog_size);
    println!("  fired       {}", list(&report.fired));
    println!("  shown       {}", list(&report.shown));
    println!("  suppressed  {}", list(&report.suppressed));
    println!();
}

/// Prints prompt cards to stdout.
struct PrintSurface {
    use_color: bool,
}

impl PromptSurface for PrintSurface {
    fn show(&mut self, card: &PromptCard) {
        let actions = format!("[{}] [{}]", card.accept_label, card.decline_label);
        if self.use_color {
            use colored::Colorize;
            println!(
                "  {} {}  {}  {}",
                "▶".green(),
                card.trigger_id.as_str().bold(),
                card.message,
                actions.dimmed()
            );
        } else {
            println!("  > {}  {}  {}", card.trigger_id, card.message, actions);
        }
    }

    fn remove(&mut self, trigger_id: &TriggerId) {
        println!("    ({trigger_id} closed)");
    }
}

/// Event store for `--dry-run`: keeps events in memory and logs them.
#[derive(Default)]
struct DryRunEvents {
    events: Mutex<Vec<TriggerEvent>>,
}

#[async_trait]
impl EventStore for DryRunEvents {
    async fn create(&self, event: NewTriggerEvent) -> Result<TriggerEvent, NudgeError> {
        let mut events = self.events.lock().await;
        let stored = TriggerEvent {
            id: EventId(format!("dry-run-{}", events.len() + 1)),
            record: event,
        };
        tracing::info!(trigger_id = %stored.record.trigger_id, event_id = %stored.id, "dry run: event not persisted");
        events.push(stored.clone());
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
            .rev()
            .find(|e| &e.record.trigger_id == trigger_id && &e.record.session_id == session_id)
            .cloned())
    }

    async fn patch(&self, id: &EventId, patch: EventPatch) -> Result<(), NudgeError> {
        let mut events = self.events.lock().await;
        if let Some(event) = events.iter_mut().find(|e| &e.id == id) {
            patch.apply(&mut event.record);
            tracing::info!(event_id = %id, engaged = event.record.engaged, converted = event.record.converted, "dry run: event updated");
        }
        Ok(())
    }
}
