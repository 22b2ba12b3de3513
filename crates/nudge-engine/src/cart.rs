// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cart state sources polled on each tick.
//!
//! The conventional source is a JSON entry in a key-value store (`cart` by
//! default) shaped like `{"items": [{"price": 20, "quantity": 2}], "total": 40}`.
//! Sites without that entry can supply a [`ProbeCart`] closure instead, and
//! [`FallbackCart`] chains the two.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use nudge_core::NudgeError;
use serde_json::Value;

/// Observed cart: whether it holds anything, and its monetary value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CartSnapshot {
    pub has_items: bool,
    pub value: f64,
}

impl CartSnapshot {
    pub fn new(has_items: bool, value: f64) -> Self {
        Self { has_items, value }
    }
}

/// Somewhere the engine can read the current cart from.
pub trait CartSource: Send {
    fn read(&mut self) -> Result<CartSnapshot, NudgeError>;
}

/// A string key-value store, like the browser's local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Shared in-process key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValue {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

impl KeyValueStore for MemoryKeyValue {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

/// Reads the cart from a JSON entry in a [`KeyValueStore`].
pub struct KeyValueCart<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> KeyValueCart<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl<S: KeyValueStore> CartSource for KeyValueCart<S> {
    fn read(&mut self) -> Result<CartSnapshot, NudgeError> {
        match self.store.get(&self.key) {
            Some(raw) => parse_cart_record(&raw),
            None => Err(NudgeError::Cart(format!("no `{}` entry", self.key))),
        }
    }
}

/// Parse the conventional cart record.
///
/// The value is `total`, `value` or `subtotal` when present, otherwise the sum
/// of `price * quantity` over `items`. Items are present when the `items`
/// array is non-empty or `count`/`itemCount` is positive.
pub fn parse_cart_record(raw: &str) -> Result<CartSnapshot, NudgeError> {
    let record: Value = serde_json::from_str(raw)
        .map_err(|e| NudgeError::Cart(format!("cart entry is not JSON: {e}")))?;
    let Value::Object(map) = &record else {
        return Err(NudgeError::Cart("cart entry is not an object".into()));
    };

    let items = map.get("items").and_then(Value::as_array);
    let item_sum = items.map(|items| {
        items
            .iter()
            .map(|item| {
                let price = item.get("price").and_then(as_number).unwrap_or(0.0);
                let quantity = item.get("quantity").and_then(as_number).unwrap_or(1.0);
                price * quantity
            })
            .sum::<f64>()
    });
    let declared_total = ["total", "value", "subtotal"]
        .iter()
        .find_map(|key| map.get(*key).and_then(as_number));
    let declared_count = ["count", "itemCount"]
        .iter()
        .find_map(|key| map.get(*key).and_then(as_number));

    let has_items = items.is_some_and(|items| !items.is_empty())
        || declared_count.is_some_and(|count| count > 0.0);
    let value = declared_total.or(item_sum).unwrap_or(0.0).max(0.0);

    Ok(CartSnapshot { has_items, value })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Cart source backed by a closure, for sites that expose cart state some
/// other way.
pub struct ProbeCart<F> {
    probe: F,
}

impl<F> ProbeCart<F>
where
    F: FnMut() -> Option<CartSnapshot> + Send,
{
    pub fn new(probe: F) -> Self {
        Self { probe }
    }
}

impl<F> CartSource for ProbeCart<F>
where
    F: FnMut() -> Option<CartSnapshot> + Send,
{
    fn read(&mut self) -> Result<CartSnapshot, NudgeError> {
        (self.probe)().ok_or_else(|| NudgeError::Cart("probe found no cart".into()))
    }
}

/// Try `primary`, and on any error try `fallback`.
pub struct FallbackCart<A, B> {
    primary: A,
    fallback: B,
}

impl<A: CartSource, B: CartSource> FallbackCart<A, B> {
    pub fn new(primary: A, fallback: B) -> Self {
        Self { primary, fallback }
    }
}

impl<A: CartSource, B: CartSource> CartSource for FallbackCart<A, B> {
    fn read(&mut self) -> Result<CartSnapshot, NudgeError> {
        self.primary.read().or_else(|err| {
            tracing::trace!(error = %err, "primary cart source failed, probing fallback");
            self.fallback.read()
        })
    }
}

/// Read a source, treating any failure as an empty cart.
pub fn read_or_empty(source: &mut dyn CartSource) -> CartSnapshot {
    source.read().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "cart read failed, assuming empty cart");
        CartSnapshot::default()
    })
}
