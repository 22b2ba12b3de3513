// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Nudge proactive engagement engine.
//!
//! This crate provides the error type, the trigger and event domain types,
//! and the store traits implemented by the HTTP backend client and by the
//! in-memory test stores.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::NudgeError;
pub use traits::{EventStore, TriggerStore};
pub use types::{
    CustomerId, EventId, EventMetadata, EventOutcome, EventPatch, NewTriggerEvent,
    OrganizationId, SessionId, TriggerConditions, TriggerDefinition, TriggerEvent, TriggerId,
    TriggerKind,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nudge_error_has_all_variants() {
        let _config = NudgeError::Config("test".into());
        let _transport = NudgeError::Transport {
            message: "test".into(),
            source: Some(Box::new(std::io::Error::other("test"))),
        };
        let _backend = NudgeError::Backend {
            status: 500,
            message: "test".into(),
        };
        let _decode = NudgeError::Decode {
            message: "test".into(),
            source: None,
        };
        let _cart = NudgeError::Cart("test".into());
        let _timeout = NudgeError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        let _internal = NudgeError::Internal("test".into());
    }

    #[test]
    fn transport_classification() {
        assert!(
            NudgeError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }
            .is_transport()
        );
        assert!(
            !NudgeError::Backend {
                status: 404,
                message: "missing".into()
            }
            .is_transport()
        );
    }

    #[test]
    fn ids_display_as_their_inner_string() {
        let tid = TriggerId::from("t-1");
        let sid = SessionId::from("session_1_abc".to_string());
        assert_eq!(tid.to_string(), "t-1");
        assert_eq!(sid.as_str(), "session_1_abc");
        assert_eq!(tid.clone(), tid);
    }

    #[test]
    fn all_store_traits_are_exported() {
        fn _assert_trigger_store<T: TriggerStore>() {}
        fn _assert_event_store<T: EventStore>() {}
    }
}
