// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine task and the host-facing handle.
//!
//! One task owns the session, catalog, evaluator, presenter and signal
//! monitor. Host commands, scheduled fires, prompt expiry, the scroll flush
//! and the periodic tick are multiplexed with `tokio::select!`, and each runs
//! to completion before the next is taken.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nudge_config::model::EngineConfig;
use nudge_config::validation::{MAX_SCROLL_THROTTLE_MS, MAX_TICK_INTERVAL_SECS, MAX_VISIBILITY_SECS};
use nudge_core::{
    CustomerId, EventOutcome, EventStore, NewTriggerEvent, NudgeError, OrganizationId,
    SessionId, TriggerId, TriggerStore,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cart::{self, CartSnapshot, CartSource};
use crate::catalog::TriggerCatalog;
use crate::evaluator::{EvaluationEngine, Firing};
use crate::handoff::{ChatDelivery, ChatHandoff};
use crate::presenter::{LogSurface, PresentOutcome, Presenter, PromptState, PromptSurface, VisitorAction};
use crate::recorder::EventRecorder;
use crate::session::{self, SessionState};
use crate::signal::{ScrollPosition, Signal, SignalMonitor};

/// Commands from the host page to the engine task.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SetCustomer(CustomerId),
    MarkConversion(TriggerId),
    UpdateCart(CartSnapshot),
    Scroll(ScrollPosition),
    PointerLeft { client_y: f64 },
    Navigate(String),
    Resolve {
        trigger_id: TriggerId,
        action: VisitorAction,
    },
}

/// Cloneable entry point for the host page.
///
/// Every method fails only when the engine has stopped.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostCommand>,
    handoff: ChatHandoff,
    session_id: SessionId,
}

impl HostHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Mount a chat widget: prompts go to the returned receiver instead of a card.
    pub fn subscribe_chat(&self) -> tokio::sync::broadcast::Receiver<ChatDelivery> {
        self.handoff.subscribe()
    }

    pub async fn set_customer_id(&self, id: impl Into<CustomerId>) -> Result<(), NudgeError> {
        self.send(HostCommand::SetCustomer(id.into())).await
    }

    /// Mark the latest event for `trigger_id` in this session as converted.
    pub async fn mark_conversion(&self, trigger_id: impl Into<TriggerId>) -> Result<(), NudgeError> {
        self.send(HostCommand::MarkConversion(trigger_id.into())).await
    }

    pub async fn update_cart(&self, has_items: bool, value: f64) -> Result<(), NudgeError> {
        self.send(HostCommand::UpdateCart(CartSnapshot::new(has_items, value)))
            .await
    }

    pub async fn scroll(&self, position: ScrollPosition) -> Result<(), NudgeError> {
        self.send(HostCommand::Scroll(position)).await
    }

    /// The pointer left the document at vertical position `client_y`.
    pub async fn pointer_left(&self, client_y: f64) -> Result<(), NudgeError> {
        self.send(HostCommand::PointerLeft { client_y }).await
    }

    pub async fn navigate(&self, url: impl Into<String>) -> Result<(), NudgeError> {
        self.send(HostCommand::Navigate(url.into())).await
    }

    pub async fn accept(&self, trigger_id: impl Into<TriggerId>) -> Result<(), NudgeError> {
        self.send(HostCommand::Resolve {
            trigger_id: trigger_id.into(),
            action: VisitorAction::Accept,
        })
        .await
    }

    pub async fn decline(&self, trigger_id: impl Into<TriggerId>) -> Result<(), NudgeError> {
        self.send(HostCommand::Resolve {
            trigger_id: trigger_id.into(),
            action: VisitorAction::Decline,
        })
        .await
    }

    async fn send(&self, command: HostCommand) -> Result<(), NudgeError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| NudgeError::Internal("engine has stopped".into()))
    }
}

/// Timing and buffer sizes for one engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub scroll_throttle: Duration,
    pub visibility: Duration,
    pub handoff_capacity: usize,
    pub command_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl EngineSettings {
    /// Clamp the timer durations to the ranges configuration accepts, so
    /// deadlines derived from them always fit in an `Instant`.
    pub fn bounded(self) -> Self {
        let bounded = Self {
            tick_interval: self.tick_interval.min(Duration::from_secs(MAX_TICK_INTERVAL_SECS)),
            scroll_throttle: self
                .scroll_throttle
                .min(Duration::from_millis(MAX_SCROLL_THROTTLE_MS)),
            visibility: self.visibility.min(Duration::from_secs(MAX_VISIBILITY_SECS)),
            ..self
        };
        if bounded != self {
            tracing::warn!(settings = ?bounded, "engine timer settings out of range, clamped");
        }
        bounded
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            scroll_throttle: config.scroll_throttle(),
            visibility: config.visibility(),
            handoff_capacity: config.handoff_capacity,
            command_buffer: config.command_buffer,
        }
    }
}

/// What happened during one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReport {
    pub session_id: SessionId,
    pub catalog_size: usize,
    /// Triggers committed to the fired registry, in firing order.
    pub fired: Vec<TriggerId>,
    /// Fired triggers whose prompt became visible.
    pub shown: Vec<TriggerId>,
    /// Fired triggers whose prompt was suppressed by a visible one.
    pub suppressed: Vec<TriggerId>,
}

pub struct EngineBuilder {
    organization_id: OrganizationId,
    triggers: Arc<dyn TriggerStore>,
    events: Arc<dyn EventStore>,
    settings: EngineSettings,
    landing_url: String,
    session_id: Option<SessionId>,
    surface: Option<Box<dyn PromptSurface>>,
    cart: Option<Box<dyn CartSource>>,
    cancel: Option<CancellationToken>,
}

impl EngineBuilder {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        triggers: Arc<dyn TriggerStore>,
        events: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            triggers,
            events,
            settings: EngineSettings::default(),
            landing_url: "/".to_string(),
            session_id: None,
            surface: None,
            cart: None,
            cancel: None,
        }
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings.bounded();
        self
    }

    /// URL the visitor landed on, including any UTM query.
    pub fn landing_url(mut self, url: impl Into<String>) -> Self {
        self.landing_url = url.into();
        self
    }

    /// Use a fixed session id instead of generating one.
    pub fn session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn surface(mut self, surface: Box<dyn PromptSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Cart source polled on every tick. Without one the cart only changes
    /// through [`HostHandle::update_cart`].
    pub fn cart_source(mut self, source: Box<dyn CartSource>) -> Self {
        self.cart = Some(source);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start the engine on the current runtime. The catalog is loaded inside
    /// the task; commands sent meanwhile are queued.
    pub fn spawn(self) -> RunningEngine {
        let session_id = self.session_id.unwrap_or_else(session::generate_session_id);
        let cancel = self.cancel.unwrap_or_default();
        let (tx, rx) = mpsc::channel(self.settings.command_buffer.max(1));
        let handoff = ChatHandoff::new(self.settings.handoff_capacity);
        let now = Instant::now();

        let (recorder, recorder_worker) = EventRecorder::spawn(self.events);
        let engine = Engine {
            session: SessionState::new(session_id.clone(), &self.landing_url, now),
            evaluator: EvaluationEngine::new(TriggerCatalog::default()),
            presenter: Presenter::new(
                session_id.clone(),
                handoff.clone(),
                self.surface.unwrap_or_else(|| Box::new(LogSurface)),
                self.settings.visibility,
            ),
            monitor: SignalMonitor::new(self.settings.scroll_throttle),
            recorder,
            organization_id: self.organization_id,
            cart: self.cart,
            report: EngineReport {
                session_id: session_id.clone(),
                ..EngineReport::default()
            },
        };

        let span = tracing::info_span!("nudge_engine", session_id = %session_id);
        let join = tokio::spawn(
            engine
                .run(
                    self.triggers,
                    rx,
                    cancel.clone(),
                    self.settings.tick_interval,
                    self.landing_url,
                    recorder_worker,
                )
                .instrument(span),
        );

        RunningEngine {
            handle: HostHandle {
                tx,
                handoff,
                session_id,
            },
            join,
            cancel,
        }
    }
}

/// A spawned engine task.
pub struct RunningEngine {
    handle: HostHandle,
    join: JoinHandle<EngineReport>,
    cancel: CancellationToken,
}

impl RunningEngine {
    pub fn handle(&self) -> HostHandle {
        self.handle.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the engine (page unload), wait for queued event writes, and
    /// return the run report.
    pub async fn shutdown(self) -> Result<EngineReport, NudgeError> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| NudgeError::Internal(format!("engine task failed: {e}")))
    }
}

struct Engine {
    session: SessionState,
    evaluator: EvaluationEngine,
    presenter: Presenter,
    monitor: SignalMonitor,
    recorder: EventRecorder,
    organization_id: OrganizationId,
    cart: Option<Box<dyn CartSource>>,
    report: EngineReport,
}

impl Engine {
    async fn run(
        mut self,
        triggers: Arc<dyn TriggerStore>,
        mut commands: mpsc::Receiver<HostCommand>,
        cancel: CancellationToken,
        tick_interval: Duration,
        landing_url: String,
        recorder_worker: JoinHandle<()>,
    ) -> EngineReport {
        let catalog = tokio::select! {
            catalog = TriggerCatalog::load(triggers.as_ref(), &self.organization_id) => catalog,
            _ = cancel.cancelled() => TriggerCatalog::default(),
        };
        self.report.catalog_size = catalog.len();
        self.evaluator = EvaluationEngine::new(catalog);

        let navigate = self.monitor.observe_navigation(landing_url);
        self.dispatch(navigate, Instant::now());

        let tick_interval = tick_interval.max(Duration::from_millis(1));
        let mut tick = time::interval_at(Instant::now() + tick_interval, tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            let next_due = self.evaluator.next_due();
            let next_expiry = self.presenter.next_expiry();
            let scroll_flush = self.monitor.pending_scroll_deadline();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until_opt(next_due) => self.fire_due(Instant::now()),
                _ = sleep_until_opt(next_expiry) => {
                    if let Some(id) = self.presenter.expire(Instant::now()) {
                        tracing::debug!(trigger_id = %id, "prompt auto-expired");
                    }
                }
                _ = sleep_until_opt(scroll_flush) => {
                    let now = Instant::now();
                    if let Some(signal) = self.monitor.flush_scroll(now) {
                        self.dispatch(signal, now);
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command, Instant::now()),
                    None => {
                        tracing::debug!("all host handles dropped");
                        commands_open = false;
                    }
                },
                _ = tick.tick() => self.on_tick(Instant::now()),
            }
        }

        let Engine {
            recorder, report, ..
        } = self;
        drop(recorder);
        if let Err(err) = recorder_worker.await {
            tracing::warn!(error = %err, "event recorder task failed");
        }
        tracing::info!(
            fired = report.fired.len(),
            shown = report.shown.len(),
            "engine stopped"
        );
        report
    }

    fn handle_command(&mut self, command: HostCommand, now: Instant) {
        match command {
            HostCommand::SetCustomer(id) => {
                tracing::debug!(customer_id = %id, "customer identified");
                self.session.set_customer(id);
            }
            HostCommand::MarkConversion(trigger_id) => {
                self.recorder.update(
                    trigger_id,
                    self.session.session_id().clone(),
                    EventOutcome::Converted,
                );
            }
            HostCommand::UpdateCart(snapshot) => {
                if let Some(signal) = self.monitor.observe_cart(snapshot) {
                    self.dispatch(signal, now);
                }
            }
            HostCommand::Scroll(position) => {
                if let Some(signal) = self.monitor.observe_scroll(position, now) {
                    self.dispatch(signal, now);
                }
            }
            HostCommand::PointerLeft { client_y } => {
                if let Some(signal) = self.monitor.observe_pointer_leave(client_y) {
                    self.dispatch(signal, now);
                }
            }
            HostCommand::Navigate(url) => {
                let signal = self.monitor.observe_navigation(url);
                self.dispatch(signal, now);
            }
            HostCommand::Resolve { trigger_id, action } => {
                if self.presenter.resolve(&trigger_id, action) == Some(PromptState::Accepted) {
                    self.recorder.update(
                        trigger_id,
                        self.session.session_id().clone(),
                        EventOutcome::Engaged,
                    );
                }
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if let Some(source) = self.cart.as_deref_mut() {
            let snapshot = cart::read_or_empty(source);
            if let Some(signal) = self.monitor.observe_cart(snapshot) {
                self.dispatch(signal, now);
            }
        }
        self.dispatch(Signal::Tick, now);
    }

    /// Evaluate a signal and commit anything already due, so zero-delay
    /// triggers fire inside the same step.
    fn dispatch(&mut self, signal: Signal, now: Instant) {
        tracing::trace!(signal = signal.name(), "signal");
        self.evaluator.on_signal(&mut self.session, &signal, now);
        self.fire_due(now);
    }

    fn fire_due(&mut self, now: Instant) {
        for firing in self.evaluator.take_due(&mut self.session, now) {
            self.commit(firing, now);
        }
    }

    fn commit(&mut self, firing: Firing, now: Instant) {
        self.recorder.record(NewTriggerEvent {
            trigger_id: firing.trigger_id.clone(),
            organization_id: self.organization_id.clone(),
            customer_id: self.session.customer_id().cloned(),
            session_id: self.session.session_id().clone(),
            page_url: firing.page_url.clone(),
            triggered_at: Utc::now(),
            engaged: false,
            converted: false,
            metadata: firing.metadata.clone(),
        });
        self.report.fired.push(firing.trigger_id.clone());

        match self.presenter.present(&firing, now) {
            PresentOutcome::Shown(_) => self.report.shown.push(firing.trigger_id),
            PresentOutcome::Suppressed { .. } => self.report.suppressed.push(firing.trigger_id),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
