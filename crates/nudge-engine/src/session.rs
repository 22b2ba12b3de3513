// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-visit session state, owned exclusively by the engine task.

use std::collections::HashSet;

use chrono::Utc;
use nudge_core::{CustomerId, EventMetadata, SessionId, TriggerId};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::time::Instant;
use url::Url;

use crate::cart::CartSnapshot;
use crate::template::TemplateVars;

const BASE: &str = "http://localhost/";

/// The page the visitor is on, split into the pieces conditions look at.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLocation {
    href: String,
    path_and_query: String,
    path: String,
    utm_source: Option<String>,
    utm_campaign: Option<String>,
}

impl PageLocation {
    /// Parse an absolute URL or a site-relative path such as `/pricing?utm_source=ads`.
    ///
    /// Unparseable input is kept verbatim as the path so globs still see it.
    pub fn parse(raw: &str) -> Self {
        let parsed = Url::parse(raw).or_else(|_| {
            Url::parse(BASE).and_then(|base| base.join(raw))
        });
        let Ok(url) = parsed else {
            tracing::debug!(url = raw, "unparseable page URL, matching on raw text");
            return Self {
                href: raw.to_string(),
                path_and_query: raw.to_string(),
                path: raw.to_string(),
                utm_source: None,
                utm_campaign: None,
            };
        };

        let query_value = |name: &str| {
            url.query_pairs()
                .find(|(key, value)| key == name && !value.is_empty())
                .map(|(_, value)| value.into_owned())
        };
        let path = url.path().to_string();
        let path_and_query = match url.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.clone(),
        };

        Self {
            href: url.to_string(),
            path_and_query,
            path,
            utm_source: query_value("utm_source"),
            utm_campaign: query_value("utm_campaign"),
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// Path plus query string, the form recorded on trigger events.
    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The text a `pageUrl` glob is matched against: the full href when the
    /// pattern is absolute, otherwise the path.
    pub fn match_target(&self, pattern: &str) -> &str {
        if pattern.contains("://") {
            &self.href
        } else {
            &self.path
        }
    }
}

/// Generate a session id of the form `session_<unix millis>_<random>`.
pub fn generate_session_id() -> SessionId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    SessionId(format!("session_{}_{suffix}", Utc::now().timestamp_millis()))
}

/// Mutable state of one visit.
///
/// Scroll is a high-water mark, exit intent latches, and a trigger id enters
/// the fired set at most once. None of it is persisted.
#[derive(Debug)]
pub struct SessionState {
    session_id: SessionId,
    page_loaded_at: Instant,
    location: PageLocation,
    utm_source: Option<String>,
    utm_campaign: Option<String>,
    scroll_percentage: u8,
    exit_intent_fired: bool,
    fired: HashSet<TriggerId>,
    customer_id: Option<CustomerId>,
    cart: CartSnapshot,
}

impl SessionState {
    pub fn new(session_id: SessionId, landing_url: &str, now: Instant) -> Self {
        let location = PageLocation::parse(landing_url);
        Self {
            session_id,
            page_loaded_at: now,
            utm_source: location.utm_source.clone(),
            utm_campaign: location.utm_campaign.clone(),
            location,
            scroll_percentage: 0,
            exit_intent_fired: false,
            fired: HashSet::new(),
            customer_id: None,
            cart: CartSnapshot::default(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn utm_source(&self) -> Option<&str> {
        self.utm_source.as_deref()
    }

    pub fn utm_campaign(&self) -> Option<&str> {
        self.utm_campaign.as_deref()
    }

    pub fn scroll_percentage(&self) -> u8 {
        self.scroll_percentage
    }

    pub fn exit_intent_fired(&self) -> bool {
        self.exit_intent_fired
    }

    pub fn customer_id(&self) -> Option<&CustomerId> {
        self.customer_id.as_ref()
    }

    pub fn cart(&self) -> CartSnapshot {
        self.cart
    }

    pub fn has_fired(&self, id: &TriggerId) -> bool {
        self.fired.contains(id)
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    /// Time since page load.
    pub fn elapsed(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.page_loaded_at)
    }

    /// Raise the scroll high-water mark. Returns whether it moved.
    pub(crate) fn record_scroll(&mut self, percentage: u8) -> bool {
        let percentage = percentage.min(100);
        if percentage > self.scroll_percentage {
            self.scroll_percentage = percentage;
            true
        } else {
            false
        }
    }

    /// Latch exit intent. Returns `true` only on the first call.
    pub(crate) fn mark_exit_intent(&mut self) -> bool {
        !std::mem::replace(&mut self.exit_intent_fired, true)
    }

    /// Add a trigger to the fired registry. Returns `false` if it was already there.
    pub(crate) fn mark_fired(&mut self, id: &TriggerId) -> bool {
        self.fired.insert(id.clone())
    }

    pub(crate) fn set_customer(&mut self, id: CustomerId) {
        self.customer_id = Some(id);
    }

    /// Store a new cart snapshot. Returns whether it differs from the previous one.
    pub(crate) fn update_cart(&mut self, cart: CartSnapshot) -> bool {
        if self.cart == cart {
            false
        } else {
            self.cart = cart;
            true
        }
    }

    /// Move to a new page. UTM attribution from the landing page is kept
    /// unless the new URL carries its own.
    pub(crate) fn navigate(&mut self, url: &str) {
        let location = PageLocation::parse(url);
        if location.utm_source.is_some() {
            self.utm_source = location.utm_source.clone();
            self.utm_campaign = location.utm_campaign.clone();
        }
        self.location = location;
    }

    /// Snapshot attached to a trigger event.
    pub fn metadata(&self, now: Instant) -> EventMetadata {
        EventMetadata {
            scroll_percentage: self.scroll_percentage,
            time_on_page_secs: self.elapsed(now).as_secs(),
            cart_value: self.cart.value,
            utm_source: self.utm_source.clone(),
            utm_campaign: self.utm_campaign.clone(),
        }
    }

    /// Values for message placeholders.
    pub fn template_vars(&self, now: Instant) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.set("page_url", self.location.path_and_query())
            .set("scroll_percentage", self.scroll_percentage.to_string())
            .set("time_on_page", self.elapsed(now).as_secs().to_string())
            .set("cart_value", format!("{:.2}", self.cart.value));
        if let Some(source) = &self.utm_source {
            vars.set("utm_source", source.clone());
        }
        if let Some(campaign) = &self.utm_campaign {
            vars.set("utm_campaign", campaign.clone());
        }
        vars
    }
}
