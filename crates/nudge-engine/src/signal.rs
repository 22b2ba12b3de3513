// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of raw page observations into evaluation signals.

use std::time::Duration;

use nudge_core::TriggerKind;
use tokio::time::Instant;

use crate::cart::CartSnapshot;

/// One normalized change in visitor behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The scroll high-water mark rose to `percentage`.
    Scroll { percentage: u8 },
    /// The pointer left through the top edge of the viewport.
    ExitIntent,
    /// Periodic heartbeat for time- and cart-based conditions.
    Tick,
    CartChange { has_items: bool, value: f64 },
    Navigate { url: String },
}

impl Signal {
    /// Whether a trigger of `kind` is evaluated on this signal.
    pub fn routes_to(&self, kind: TriggerKind) -> bool {
        use TriggerKind::*;
        match self {
            Signal::Scroll { .. } => kind == ScrollPercentage,
            Signal::ExitIntent => kind == ExitIntent,
            Signal::Tick => matches!(kind, TimeOnPage | CartAbandonment),
            Signal::CartChange { .. } => kind == CartAbandonment,
            Signal::Navigate { .. } => matches!(kind, UrlMatch | UtmParameter | TimeOnPage),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Scroll { .. } => "scroll",
            Signal::ExitIntent => "exit_intent",
            Signal::Tick => "tick",
            Signal::CartChange { .. } => "cart_change",
            Signal::Navigate { .. } => "navigate",
        }
    }
}

/// Raw scroll geometry as reported by the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub scroll_y: f64,
    pub document_height: f64,
    pub viewport_height: f64,
}

impl ScrollPosition {
    pub fn new(scroll_y: f64, document_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_y,
            document_height,
            viewport_height,
        }
    }

    /// Percentage of the scrollable distance covered, rounded and clamped to
    /// 0-100. A page that cannot scroll counts as fully read.
    pub fn percentage(&self) -> u8 {
        let scrollable = self.document_height - self.viewport_height;
        if !scrollable.is_finite() || scrollable <= 0.0 {
            return 100;
        }
        let ratio = (self.scroll_y / scrollable * 100.0).round();
        if ratio.is_nan() {
            return 0;
        }
        ratio.clamp(0.0, 100.0) as u8
    }
}

/// Turns observations into at most one [`Signal`] per change.
///
/// Scroll emissions are throttled: a rise inside the throttle window is held
/// and released by [`flush_scroll`](Self::flush_scroll) once the window ends.
#[derive(Debug)]
pub struct SignalMonitor {
    throttle: Duration,
    high_water: u8,
    last_scroll_emit: Option<Instant>,
    pending_scroll: Option<u8>,
    exit_seen: bool,
    cart: CartSnapshot,
}

impl SignalMonitor {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            high_water: 0,
            last_scroll_emit: None,
            pending_scroll: None,
            exit_seen: false,
            cart: CartSnapshot::default(),
        }
    }

    pub fn observe_scroll(&mut self, position: ScrollPosition, now: Instant) -> Option<Signal> {
        let percentage = position.percentage();
        if percentage <= self.high_water {
            return None;
        }
        self.high_water = percentage;

        let window_open = self
            .last_scroll_emit
            .is_some_and(|last| now < last + self.throttle);
        if window_open {
            self.pending_scroll = Some(percentage);
            None
        } else {
            self.pending_scroll = None;
            self.last_scroll_emit = Some(now);
            Some(Signal::Scroll { percentage })
        }
    }

    /// When the held scroll value, if any, may be released.
    pub fn pending_scroll_deadline(&self) -> Option<Instant> {
        self.pending_scroll?;
        self.last_scroll_emit.map(|last| last + self.throttle)
    }

    /// Release the held scroll value.
    pub fn flush_scroll(&mut self, now: Instant) -> Option<Signal> {
        let percentage = self.pending_scroll.take()?;
        self.last_scroll_emit = Some(now);
        Some(Signal::Scroll { percentage })
    }

    /// Pointer left the document at vertical position `client_y`. Only an exit
    /// through the top edge counts, and only the first one.
    pub fn observe_pointer_leave(&mut self, client_y: f64) -> Option<Signal> {
        if self.exit_seen || client_y > 0.0 {
            return None;
        }
        self.exit_seen = true;
        Some(Signal::ExitIntent)
    }

    pub fn observe_cart(&mut self, snapshot: CartSnapshot) -> Option<Signal> {
        if snapshot == self.cart {
            return None;
        }
        self.cart = snapshot;
        Some(Signal::CartChange {
            has_items: snapshot.has_items,
            value: snapshot.value,
        })
    }

    pub fn observe_navigation(&mut self, url: impl Into<String>) -> Signal {
        Signal::Navigate { url: url.into() }
    }
}
