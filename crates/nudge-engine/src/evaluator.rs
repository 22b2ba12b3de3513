// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger evaluation: signal routing, condition checks, delayed firing.
//!
//! Matching definitions are not fired on the spot. Each is scheduled for
//! `now + delay`, and the schedule itself blocks duplicates while it is
//! outstanding. At expiry [`EvaluationEngine::take_due`] re-checks the fired
//! registry and any URL scope before committing the firing.

use std::collections::HashMap;

use nudge_core::{EventMetadata, TriggerConditions, TriggerDefinition, TriggerId};
use tokio::time::Instant;

use crate::catalog::TriggerCatalog;
use crate::glob::UrlGlob;
use crate::session::SessionState;
use crate::signal::Signal;
use crate::template::{self, TemplateVars};

/// A trigger that passed its delay and was committed to the fired registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub trigger_id: TriggerId,
    pub priority: i32,
    /// Message with placeholders resolved from the state at eligibility.
    pub message: String,
    /// Path and query of the page the trigger fired on.
    pub page_url: String,
    pub metadata: EventMetadata,
}

#[derive(Debug)]
struct Pending {
    due_at: Instant,
    seq: u64,
    vars: TemplateVars,
}

/// Evaluates the catalog against session state as signals arrive.
#[derive(Debug)]
pub struct EvaluationEngine {
    catalog: TriggerCatalog,
    globs: HashMap<String, UrlGlob>,
    pending: HashMap<TriggerId, Pending>,
    seq: u64,
}

impl EvaluationEngine {
    pub fn new(catalog: TriggerCatalog) -> Self {
        let mut globs = HashMap::new();
        for definition in catalog.definitions() {
            for pattern in patterns(&definition.conditions) {
                globs
                    .entry(pattern.to_string())
                    .or_insert_with(|| UrlGlob::new(pattern));
            }
        }
        Self {
            catalog,
            globs,
            pending: HashMap::new(),
            seq: 0,
        }
    }

    pub fn catalog(&self) -> &TriggerCatalog {
        &self.catalog
    }

    pub fn is_scheduled(&self, id: &TriggerId) -> bool {
        self.pending.contains_key(id)
    }

    /// Earliest instant a scheduled trigger comes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.due_at).min()
    }

    /// Apply `signal` to the session, then schedule every routed definition
    /// whose conditions now hold. Returns the newly scheduled ids.
    pub fn on_signal(
        &mut self,
        session: &mut SessionState,
        signal: &Signal,
        now: Instant,
    ) -> Vec<TriggerId> {
        let exit_just_fired = match signal {
            Signal::Scroll { percentage } => {
                session.record_scroll(*percentage);
                false
            }
            Signal::ExitIntent => session.mark_exit_intent(),
            Signal::Tick => false,
            Signal::CartChange { has_items, value } => {
                session.update_cart(crate::cart::CartSnapshot::new(*has_items, *value));
                false
            }
            Signal::Navigate { url } => {
                session.navigate(url);
                false
            }
        };
        if matches!(signal, Signal::ExitIntent) && !exit_just_fired {
            return Vec::new();
        }

        let mut scheduled = Vec::new();
        for definition in self.catalog.definitions() {
            let Some(kind) = definition.kind() else {
                continue;
            };
            if !definition.enabled
                || !signal.routes_to(kind)
                || session.has_fired(&definition.id)
                || self.pending.contains_key(&definition.id)
            {
                continue;
            }
            if !self.conditions_hold(definition, session, now, exit_just_fired) {
                continue;
            }

            let Some(due_at) = now.checked_add(definition.delay) else {
                tracing::warn!(
                    trigger_id = %definition.id,
                    delay = ?definition.delay,
                    "trigger delay is out of range, it will never fire"
                );
                continue;
            };
            self.seq += 1;
            tracing::debug!(
                trigger_id = %definition.id,
                trigger = definition.label(),
                signal = signal.name(),
                delay = ?definition.delay,
                "trigger eligible, scheduled"
            );
            self.pending.insert(
                definition.id.clone(),
                Pending {
                    due_at,
                    seq: self.seq,
                    vars: session.template_vars(now),
                },
            );
            scheduled.push(definition.id.clone());
        }
        scheduled
    }

    /// Commit every scheduled trigger due at `now`, highest priority first,
    /// earliest scheduled first among equals.
    ///
    /// A trigger whose URL scope no longer matches is dropped and may become
    /// eligible again later.
    pub fn take_due(&mut self, session: &mut SessionState, now: Instant) -> Vec<Firing> {
        let due_ids: Vec<TriggerId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut due: Vec<(&TriggerDefinition, Pending)> = due_ids
            .into_iter()
            .filter_map(|id| {
                let pending = self.pending.remove(&id)?;
                let definition = self.catalog.get(&id)?;
                Some((definition, pending))
            })
            .collect();
        due.sort_by(|(a, pa), (b, pb)| b.priority.cmp(&a.priority).then(pa.seq.cmp(&pb.seq)));

        let mut firings = Vec::with_capacity(due.len());
        for (definition, pending) in due {
            if session.has_fired(&definition.id) {
                tracing::debug!(trigger_id = %definition.id, "already fired this session, dropping");
                continue;
            }
            let still_on_page = definition.conditions.page_url().is_none_or(|pattern| {
                glob_match(&self.globs, pattern, session.location().match_target(pattern))
            });
            if !still_on_page {
                tracing::debug!(
                    trigger_id = %definition.id,
                    page_url = session.location().path_and_query(),
                    "page changed during delay, dropping"
                );
                continue;
            }

            session.mark_fired(&definition.id);
            tracing::info!(
                trigger_id = %definition.id,
                trigger = definition.label(),
                priority = definition.priority,
                "trigger fired"
            );
            firings.push(Firing {
                trigger_id: definition.id.clone(),
                priority: definition.priority,
                message: template::render(&definition.message, &pending.vars),
                page_url: session.location().path_and_query().to_string(),
                metadata: session.metadata(now),
            });
        }
        firings
    }

    fn conditions_hold(
        &self,
        definition: &TriggerDefinition,
        session: &SessionState,
        now: Instant,
        exit_just_fired: bool,
    ) -> bool {
        let elapsed = session.elapsed(now).as_secs_f64();
        let location = session.location();
        let url_matches =
            |pattern: &str| glob_match(&self.globs, pattern, location.match_target(pattern));

        match &definition.conditions {
            TriggerConditions::TimeOnPage { seconds, page_url } => {
                elapsed >= *seconds && url_matches(page_url)
            }
            TriggerConditions::ScrollPercentage { percentage } => {
                f64::from(session.scroll_percentage()) >= *percentage
            }
            TriggerConditions::ExitIntent { min_time_on_site } => {
                exit_just_fired && elapsed >= *min_time_on_site
            }
            TriggerConditions::UrlMatch { page_url } => url_matches(page_url),
            TriggerConditions::UtmParameter { source, campaign } => {
                let source_ok = session
                    .utm_source()
                    .is_some_and(|actual| glob_match(&self.globs, source, actual));
                let campaign_ok = campaign.as_deref().is_none_or(|wanted| {
                    session
                        .utm_campaign()
                        .is_some_and(|actual| glob_match(&self.globs, wanted, actual))
                });
                source_ok && campaign_ok
            }
            TriggerConditions::CartAbandonment { min_value } => {
                let cart = session.cart();
                cart.has_items && cart.value >= *min_value
            }
            TriggerConditions::Invalid { .. } => false,
        }
    }
}

fn patterns(conditions: &TriggerConditions) -> Vec<&str> {
    match conditions {
        TriggerConditions::TimeOnPage { page_url, .. } | TriggerConditions::UrlMatch { page_url } => {
            vec![page_url.as_str()]
        }
        TriggerConditions::UtmParameter { source, campaign } => {
            let mut out = vec![source.as_str()];
            out.extend(campaign.as_deref());
            out
        }
        _ => Vec::new(),
    }
}

fn glob_match(globs: &HashMap<String, UrlGlob>, pattern: &str, text: &str) -> bool {
    match globs.get(pattern) {
        Some(glob) => glob.is_match(text),
        None => UrlGlob::new(pattern).is_match(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::SessionId;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn def(id: &str, conditions: TriggerConditions, delay_secs: u64, priority: i32) -> TriggerDefinition {
        TriggerDefinition {
            id: TriggerId::from(id),
            name: None,
            conditions,
            delay: Duration::from_secs(delay_secs),
            priority,
            message: format!("message {id}"),
            enabled: true,
        }
    }

    fn engine(defs: Vec<TriggerDefinition>) -> EvaluationEngine {
        EvaluationEngine::new(TriggerCatalog::from_definitions(defs))
    }

    fn session(url: &str, now: Instant) -> SessionState {
        SessionState::new(SessionId::from("s-1"), url, now)
    }

    fn ids(firings: &[Firing]) -> Vec<&str> {
        firings.iter().map(|f| f.trigger_id.as_str()).collect()
    }

    #[test]
    fn scroll_threshold_fires_once() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut e = engine(vec![def(
            "scroll",
            TriggerConditions::ScrollPercentage { percentage: 50.0 },
            0,
            1,
        )]);

        for pct in [10, 30] {
            assert!(e.on_signal(&mut s, &Signal::Scroll { percentage: pct }, t0).is_empty());
        }
        assert_eq!(e.on_signal(&mut s, &Signal::Scroll { percentage: 51 }, t0).len(), 1);
        let fired = e.take_due(&mut s, t0);
        assert_eq!(ids(&fired), ["scroll"]);
        assert_eq!(fired[0].metadata.scroll_percentage, 51);

        assert!(e.on_signal(&mut s, &Signal::Scroll { percentage: 80 }, t0).is_empty());
        assert!(e.take_due(&mut s, t0).is_empty());
        assert_eq!(s.fired_count(), 1);
    }

    #[test]
    fn delay_is_honored_and_schedule_blocks_duplicates() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut e = engine(vec![def(
            "scroll",
            TriggerConditions::ScrollPercentage { percentage: 20.0 },
            5,
            1,
        )]);

        e.on_signal(&mut s, &Signal::Scroll { percentage: 25 }, t0);
        assert!(e.is_scheduled(&TriggerId::from("scroll")));
        assert!(e.on_signal(&mut s, &Signal::Scroll { percentage: 60 }, t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(e.next_due(), Some(t0 + Duration::from_secs(5)));

        assert!(e.take_due(&mut s, t0 + Duration::from_millis(4999)).is_empty());
        assert_eq!(ids(&e.take_due(&mut s, t0 + Duration::from_secs(5))), ["scroll"]);
        assert_eq!(e.next_due(), None);
    }

    #[test]
    fn due_firings_ordered_by_priority_then_schedule_order() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut e = engine(vec![
            def("low", TriggerConditions::UrlMatch { page_url: "*".into() }, 0, 5),
            def("high", TriggerConditions::UrlMatch { page_url: "/*".into() }, 0, 9),
            def("tie", TriggerConditions::ExitIntent { min_time_on_site: 0.0 }, 0, 5),
        ]);

        e.on_signal(&mut s, &Signal::Navigate { url: "/home".into() }, t0);
        e.on_signal(&mut s, &Signal::ExitIntent, t0);
        assert_eq!(ids(&e.take_due(&mut s, t0)), ["high", "low", "tie"]);
    }

    #[test]
    fn url_scoped_trigger_dropped_when_page_changes_during_delay() {
        let t0 = Instant::now();
        let mut s = session("/pricing", t0);
        let mut e = engine(vec![def(
            "pricing",
            TriggerConditions::UrlMatch { page_url: "/pricing*".into() },
            10,
            1,
        )]);

        e.on_signal(&mut s, &Signal::Navigate { url: "/pricing".into() }, t0);
        e.on_signal(&mut s, &Signal::Navigate { url: "/about".into() }, t0 + Duration::from_secs(2));
        assert!(e.take_due(&mut s, t0 + Duration::from_secs(10)).is_empty());
        assert!(!s.has_fired(&TriggerId::from("pricing")));

        let back = t0 + Duration::from_secs(11);
        assert_eq!(e.on_signal(&mut s, &Signal::Navigate { url: "/pricing/pro".into() }, back).len(), 1);
        assert_eq!(ids(&e.take_due(&mut s, back + Duration::from_secs(10))), ["pricing"]);
    }

    #[test]
    fn time_on_page_requires_elapsed_and_url() {
        let t0 = Instant::now();
        let mut s = session("/blog/post", t0);
        let mut e = engine(vec![def(
            "dwell",
            TriggerConditions::TimeOnPage { seconds: 30.0, page_url: "/blog/*".into() },
            0,
            1,
        )]);

        assert!(e.on_signal(&mut s, &Signal::Tick, t0 + Duration::from_secs(25)).is_empty());
        assert_eq!(e.on_signal(&mut s, &Signal::Tick, t0 + Duration::from_secs(30)).len(), 1);
    }

    #[test]
    fn exit_intent_respects_min_time_and_only_evaluates_once() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut e = engine(vec![def(
            "exit",
            TriggerConditions::ExitIntent { min_time_on_site: 10.0 },
            0,
            1,
        )]);

        assert!(e.on_signal(&mut s, &Signal::ExitIntent, t0 + Duration::from_secs(3)).is_empty());
        assert!(e.on_signal(&mut s, &Signal::ExitIntent, t0 + Duration::from_secs(30)).is_empty());
    }

    #[test]
    fn utm_message_is_rendered_from_eligibility_state() {
        let t0 = Instant::now();
        let mut s = session("/landing?utm_source=email&utm_campaign=spring", t0);
        let mut definition = def(
            "utm",
            TriggerConditions::UtmParameter { source: "email".into(), campaign: Some("spr*".into()) },
            0,
            1,
        );
        definition.message = "Welcome, {utm_source} reader ({utm_campaign}) {unknown}".into();
        let mut e = engine(vec![definition]);

        e.on_signal(&mut s, &Signal::Navigate { url: "/landing?utm_source=email&utm_campaign=spring".into() }, t0);
        let fired = e.take_due(&mut s, t0);
        assert_eq!(fired[0].message, "Welcome, email reader (spring) {unknown}");
        assert_eq!(fired[0].metadata.utm_campaign.as_deref(), Some("spring"));
    }

    #[test]
    fn utm_campaign_mismatch_does_not_fire() {
        let t0 = Instant::now();
        let mut s = session("/?utm_source=email&utm_campaign=fall", t0);
        let mut e = engine(vec![def(
            "utm",
            TriggerConditions::UtmParameter { source: "*".into(), campaign: Some("spring".into()) },
            0,
            1,
        )]);
        assert!(e.on_signal(&mut s, &Signal::Navigate { url: "/?utm_source=email&utm_campaign=fall".into() }, t0).is_empty());
    }

    #[test]
    fn cart_abandonment_needs_items_and_value() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut e = engine(vec![def(
            "cart",
            TriggerConditions::CartAbandonment { min_value: 50.0 },
            0,
            1,
        )]);

        let change = |has_items, value| Signal::CartChange { has_items, value };
        assert!(e.on_signal(&mut s, &change(true, 30.0), t0).is_empty());
        assert!(e.on_signal(&mut s, &change(false, 80.0), t0).is_empty());
        assert_eq!(e.on_signal(&mut s, &change(true, 60.0), t0).len(), 1);
    }

    #[test]
    fn invalid_and_disabled_definitions_never_match() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let invalid = def(
            "broken",
            TriggerConditions::Invalid {
                kind: "url_match".into(),
                reason: "missing `pageUrl`".into(),
                raw: serde_json::Value::Null,
            },
            0,
            1,
        );
        let mut disabled = def("off", TriggerConditions::UrlMatch { page_url: "*".into() }, 0, 1);
        disabled.enabled = false;
        let mut e = engine(vec![invalid, disabled]);

        assert!(e.on_signal(&mut s, &Signal::Navigate { url: "/".into() }, t0).is_empty());
        assert!(e.catalog().get(&TriggerId::from("off")).is_none());
    }

    #[test]
    #[traced_test]
    fn out_of_range_delay_does_not_block_other_triggers() {
        let t0 = Instant::now();
        let mut s = session("/", t0);
        let mut stuck = def("stuck", TriggerConditions::UrlMatch { page_url: "*".into() }, 0, 9);
        stuck.delay = Duration::MAX;
        let healthy = def("healthy", TriggerConditions::UrlMatch { page_url: "*".into() }, 0, 1);
        let mut e = engine(vec![stuck, healthy]);

        let scheduled = e.on_signal(&mut s, &Signal::Navigate { url: "/".into() }, t0);
        assert_eq!(scheduled, vec![TriggerId::from("healthy")]);
        assert!(!e.is_scheduled(&TriggerId::from("stuck")));
        assert_eq!(ids(&e.take_due(&mut s, t0)), ["healthy"]);
        assert!(logs_contain("trigger delay is out of range"));
    }
}
