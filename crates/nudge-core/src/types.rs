// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the catalog, engine, and backend client.
//!
//! Trigger definitions travel over the wire as a flat `{type, conditions}`
//! object with a free-form condition map. Inside the engine they become a
//! [`TriggerConditions`] sum type so the evaluator can match exhaustively.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a trigger definition.
    TriggerId
);
string_id!(
    /// Identifier of a single page visit.
    SessionId
);
string_id!(
    /// Organization owning a trigger catalog.
    OrganizationId
);
string_id!(
    /// Identified visitor, set by the host page once known.
    CustomerId
);
string_id!(
    /// Backend identifier of a persisted trigger event.
    EventId
);

/// The behavioral category a trigger reacts to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    TimeOnPage,
    ScrollPercentage,
    ExitIntent,
    UrlMatch,
    UtmParameter,
    CartAbandonment,
}

/// Type-specific trigger conditions.
///
/// `Invalid` holds definitions whose type is unknown or whose condition map is
/// missing a required field. It never matches, so one broken definition cannot
/// take the rest of the catalog down with it.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerConditions {
    TimeOnPage { seconds: f64, page_url: String },
    ScrollPercentage { percentage: f64 },
    ExitIntent { min_time_on_site: f64 },
    UrlMatch { page_url: String },
    UtmParameter {
        source: String,
        campaign: Option<String>,
    },
    CartAbandonment { min_value: f64 },
    Invalid {
        kind: String,
        reason: String,
        raw: Value,
    },
}

const WILDCARD: &str = "*";

impl TriggerConditions {
    /// Parse a wire `type` and condition map into a typed variant.
    pub fn parse(kind: &str, raw: &Value) -> Self {
        let invalid = |reason: String| TriggerConditions::Invalid {
            kind: kind.to_string(),
            reason,
            raw: raw.clone(),
        };

        let Ok(parsed_kind) = kind.parse::<TriggerKind>() else {
            return invalid(format!("unknown trigger type `{kind}`"));
        };

        let empty = Map::new();
        let map = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return invalid(format!("conditions must be an object, got {other}")),
        };

        let result = match parsed_kind {
            TriggerKind::TimeOnPage => required_number(map, &["timeOnPage", "time_on_page"])
                .and_then(|seconds| {
                    let page_url = text(map, &["pageUrl", "page_url"])?
                        .unwrap_or_else(|| WILDCARD.to_string());
                    Ok(TriggerConditions::TimeOnPage { seconds, page_url })
                }),
            TriggerKind::ScrollPercentage => {
                required_number(map, &["scrollPercentage", "scroll_percentage"]).and_then(
                    |percentage| {
                        if percentage > 100.0 {
                            Err(format!("scrollPercentage {percentage} exceeds 100"))
                        } else {
                            Ok(TriggerConditions::ScrollPercentage { percentage })
                        }
                    },
                )
            }
            TriggerKind::ExitIntent => number(map, &["minTimeOnSite", "min_time_on_site"])
                .map(|min| TriggerConditions::ExitIntent {
                    min_time_on_site: min.unwrap_or(0.0),
                }),
            TriggerKind::UrlMatch => text(map, &["pageUrl", "page_url"]).and_then(|url| {
                url.map(|page_url| TriggerConditions::UrlMatch { page_url })
                    .ok_or_else(|| "missing `pageUrl`".to_string())
            }),
            TriggerKind::UtmParameter => text(map, &["utm_source", "utmSource"]).and_then(|source| {
                let source = source.ok_or_else(|| "missing `utm_source`".to_string())?;
                let campaign = text(map, &["utm_campaign", "utmCampaign"])?;
                Ok(TriggerConditions::UtmParameter { source, campaign })
            }),
            TriggerKind::CartAbandonment => required_number(map, &["cartValue", "cart_value"])
                .map(|min_value| TriggerConditions::CartAbandonment { min_value }),
        };

        result.unwrap_or_else(invalid)
    }

    /// The trigger category, or `None` for unparseable definitions.
    pub fn kind(&self) -> Option<TriggerKind> {
        match self {
            TriggerConditions::TimeOnPage { .. } => Some(TriggerKind::TimeOnPage),
            TriggerConditions::ScrollPercentage { .. } => Some(TriggerKind::ScrollPercentage),
            TriggerConditions::ExitIntent { .. } => Some(TriggerKind::ExitIntent),
            TriggerConditions::UrlMatch { .. } => Some(TriggerKind::UrlMatch),
            TriggerConditions::UtmParameter { .. } => Some(TriggerKind::UtmParameter),
            TriggerConditions::CartAbandonment { .. } => Some(TriggerKind::CartAbandonment),
            TriggerConditions::Invalid { .. } => None,
        }
    }

    /// URL glob the condition is scoped to, if any.
    pub fn page_url(&self) -> Option<&str> {
        match self {
            TriggerConditions::TimeOnPage { page_url, .. }
            | TriggerConditions::UrlMatch { page_url } => Some(page_url),
            _ => None,
        }
    }

    fn to_wire(&self) -> (String, Value) {
        let mut map = Map::new();
        let kind = match self {
            TriggerConditions::TimeOnPage { seconds, page_url } => {
                map.insert("timeOnPage".into(), Value::from(*seconds));
                map.insert("pageUrl".into(), Value::from(page_url.clone()));
                TriggerKind::TimeOnPage
            }
            TriggerConditions::ScrollPercentage { percentage } => {
                map.insert("scrollPercentage".into(), Value::from(*percentage));
                TriggerKind::ScrollPercentage
            }
            TriggerConditions::ExitIntent { min_time_on_site } => {
                map.insert("minTimeOnSite".into(), Value::from(*min_time_on_site));
                TriggerKind::ExitIntent
            }
            TriggerConditions::UrlMatch { page_url } => {
                map.insert("pageUrl".into(), Value::from(page_url.clone()));
                TriggerKind::UrlMatch
            }
            TriggerConditions::UtmParameter { source, campaign } => {
                map.insert("utm_source".into(), Value::from(source.clone()));
                if let Some(campaign) = campaign {
                    map.insert("utm_campaign".into(), Value::from(campaign.clone()));
                }
                TriggerKind::UtmParameter
            }
            TriggerConditions::CartAbandonment { min_value } => {
                map.insert("cartValue".into(), Value::from(*min_value));
                TriggerKind::CartAbandonment
            }
            TriggerConditions::Invalid { kind, raw, .. } => return (kind.clone(), raw.clone()),
        };
        (kind.to_string(), Value::Object(map))
    }
}

/// Look up the first present key and read it as a number.
///
/// Admin forms frequently store numbers as strings, so numeric strings are accepted.
fn number(map: &Map<String, Value>, keys: &[&str]) -> Result<Option<f64>, String> {
    let Some((key, value)) = keys.iter().find_map(|k| map.get(*k).map(|v| (*k, v))) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
        _ => Err(format!("`{key}` must be a non-negative number, got {value}")),
    }
}

fn required_number(map: &Map<String, Value>, keys: &[&str]) -> Result<f64, String> {
    number(map, keys)?.ok_or_else(|| format!("missing `{}`", keys[0]))
}

fn text(map: &Map<String, Value>, keys: &[&str]) -> Result<Option<String>, String> {
    let Some((key, value)) = keys.iter().find_map(|k| map.get(*k).map(|v| (*k, v))) else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        other => Err(format!("`{key}` must be a string, got {other}")),
    }
}

/// Wire shape of a trigger definition as served by the trigger storage API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerDefinitionWire {
    id: TriggerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "type", alias = "trigger_type", alias = "triggerType")]
    kind: String,
    #[serde(default)]
    conditions: Value,
    #[serde(default, alias = "delay_seconds")]
    delay_seconds: Option<f64>,
    #[serde(default)]
    priority: i32,
    #[serde(default, alias = "message_template")]
    message: String,
    #[serde(default = "default_enabled", alias = "is_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A declarative proactive-engagement rule. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TriggerDefinitionWire", into = "TriggerDefinitionWire")]
pub struct TriggerDefinition {
    pub id: TriggerId,
    pub name: Option<String>,
    pub conditions: TriggerConditions,
    /// Delay between eligibility and display. Never negative.
    pub delay: Duration,
    /// Higher wins when prompts compete for display.
    pub priority: i32,
    /// Message template with `{placeholder}` substitutions.
    pub message: String,
    pub enabled: bool,
}

impl TriggerDefinition {
    pub fn kind(&self) -> Option<TriggerKind> {
        self.conditions.kind()
    }

    /// Name for log lines: the human label when present, the id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

impl From<TriggerDefinitionWire> for TriggerDefinition {
    fn from(wire: TriggerDefinitionWire) -> Self {
        let conditions = TriggerConditions::parse(&wire.kind, &wire.conditions);
        if let TriggerConditions::Invalid { reason, .. } = &conditions {
            tracing::warn!(trigger_id = %wire.id, reason = %reason, "trigger conditions are malformed, trigger will never match");
        }
        let delay = wire
            .delay_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::ZERO);
        Self {
            id: wire.id,
            name: wire.name,
            conditions,
            delay,
            priority: wire.priority,
            message: wire.message,
            enabled: wire.enabled,
        }
    }
}

impl From<TriggerDefinition> for TriggerDefinitionWire {
    fn from(def: TriggerDefinition) -> Self {
        let (kind, conditions) = def.conditions.to_wire();
        Self {
            id: def.id,
            name: def.name,
            kind,
            conditions,
            delay_seconds: Some(def.delay.as_secs_f64()),
            priority: def.priority,
            message: def.message,
            enabled: def.enabled,
        }
    }
}

/// Snapshot of visitor state taken at firing time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub scroll_percentage: u8,
    pub time_on_page_secs: u64,
    pub cart_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
}

/// Create shape of a trigger event (`POST events`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTriggerEvent {
    pub trigger_id: TriggerId,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub session_id: SessionId,
    pub page_url: String,
    pub triggered_at: DateTime<Utc>,
    #[serde(default)]
    pub engaged: bool,
    #[serde(default)]
    pub converted: bool,
    #[serde(default)]
    pub metadata: EventMetadata,
}

/// A persisted trigger event as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: EventId,
    #[serde(flatten)]
    pub record: NewTriggerEvent,
}

/// Downstream outcome attributed to a fired trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventOutcome {
    /// The visitor accepted the prompt.
    Engaged,
    /// The host page reported a conversion (e.g. completed purchase).
    Converted,
}

/// Partial update of a trigger event (`PATCH events/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engaged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted: Option<bool>,
}

impl EventPatch {
    /// Apply the patch to a stored record.
    pub fn apply(&self, record: &mut NewTriggerEvent) {
        if let Some(engaged) = self.engaged {
            record.engaged = engaged;
        }
        if let Some(converted) = self.converted {
            record.converted = converted;
        }
    }
}

impl From<EventOutcome> for EventPatch {
    fn from(outcome: EventOutcome) -> Self {
        match outcome {
            EventOutcome::Engaged => EventPatch {
                engaged: Some(true),
                converted: None,
            },
            EventOutcome::Converted => EventPatch {
                engaged: None,
                converted: Some(true),
            },
        }
    }
}
