// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Nudge engine.

use thiserror::Error;

/// The primary error type used across store traits and engine operations.
///
/// None of these are ever surfaced to a visitor: the engine logs them and
/// degrades to doing less.
#[derive(Debug, Error)]
pub enum NudgeError {
    /// Configuration errors (invalid TOML, bad URLs, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced an HTTP response (connect, TLS, DNS).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    /// A payload could not be decoded (backend body, cart record).
    #[error("decode error: {message}")]
    Decode {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The cart snapshot could not be read from any source.
    #[error("cart unavailable: {0}")]
    Cart(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors (closed channels, stopped engine).
    #[error("internal error: {0}")]
    Internal(String),
}

impl NudgeError {
    /// Returns true when the failure came from the network path rather than
    /// from the data itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, NudgeError::Transport { .. } | NudgeError::Timeout { .. })
    }
}
