//! Error types for the event store.
//!
//! Three layers of failure are kept apart: [`ProviderError`] is what storage
//! backends report, [`StoreError`] is what the store surfaces to callers, and
//! [`ConfigError`] is what a misassembled store fails with at build time.
//! Handler failures are routed through hooks as [`HandlerError`] and never
//! fail an append, since the record is already durable by the time handlers
//! run.

use thiserror::Error;

use crate::types::{EventId, EventType, StreamId, Timestamp};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A data or meta payload failed its schema validator.
    #[error("validation failed at '{path}': {message}")]
    Validation {
        /// JSON-path-like location of the offending value.
        path: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The event type is not in the set declared at store construction.
    #[error("unknown event type '{0}'")]
    UnknownEvent(EventType),

    /// The append could not be completed without breaking an invariant.
    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    /// A lookup returned nothing where a value was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-owned handler code failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A reducer's fold function failed.
    ///
    /// Reducer code is caller-owned, so the failure is returned as-is to
    /// the caller of `reduce` instead of being routed through hooks.
    #[error("reduce failed: {0}")]
    Reduce(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The storage provider failed.
    #[error("storage error: {0}")]
    Storage(#[from] ProviderError),
}

/// Why an append was rejected after the retry budget was spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// A record with this id already exists but carries a different payload,
    /// so the insert cannot be treated as an idempotent replay.
    IdCollisionDistinctPayload(EventId),

    /// Every timestamp bump in the retry budget collided with an existing
    /// `(stream, created)` pair.
    StreamTimestampExhausted {
        /// Number of insert attempts made before giving up.
        attempts: u32,
    },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdCollisionDistinctPayload(id) => {
                write!(f, "id collision with distinct payload for event {id}")
            }
            Self::StreamTimestampExhausted { attempts } => {
                write!(f, "stream timestamp space exhausted after {attempts} attempts")
            }
        }
    }
}

/// A failure inside caller-owned handler code.
///
/// Raised by projector handlers, context reducers, and the ops they produce.
/// Delivered through the error hooks; the originating event stays durable.
#[derive(Debug, Error)]
#[error("handler failed for event {event_id} ({event_type}): {cause}")]
pub struct HandlerError {
    /// The event being processed when the handler failed.
    pub event_id: EventId,
    /// The type of that event.
    pub event_type: EventType,
    /// The underlying failure.
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl HandlerError {
    /// Wraps a handler failure with the event it was processing.
    pub fn new(
        event_id: EventId,
        event_type: EventType,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self {
            event_id,
            event_type,
            cause,
        }
    }
}

/// Errors reported by storage providers.
///
/// The store maps most of these straight into [`StoreError::Storage`]. The
/// two unique-violation variants are special: the append protocol turns them
/// into timestamp bumps or idempotence checks instead of failing outright.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An event with this id already exists.
    #[error("duplicate event id: {0}")]
    DuplicateEventId(EventId),

    /// A record of this stream already carries this `created` value.
    #[error("stream '{stream}' already has a record at {created}")]
    CreatedConflict {
        /// The stream with the colliding record.
        stream: StreamId,
        /// The colliding ordering key.
        created: Timestamp,
    },

    /// A value could not be serialized or deserialized at the storage boundary.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A transaction was rolled back.
    #[error("transaction rolled back: {0}")]
    TransactionRollback(String),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors detected while assembling a store.
///
/// All of these are programming or deployment mistakes and are reported
/// before the store goes live; none can occur during operation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The same event type was declared by more than one schema document.
    #[error("event type '{0}' is declared more than once")]
    DuplicateEventType(EventType),

    /// The same definition key appears in more than one schema document.
    #[error("shared definition '{0}' is declared more than once")]
    DuplicateDefinition(String),

    /// A schema document did not have the expected shape.
    #[error("malformed schema document: {0}")]
    MalformedSchema(String),

    /// A declared event type has no data validator.
    #[error("no data validator registered for declared event type '{0}'")]
    MissingDataValidator(EventType),

    /// A declared event type has no meta validator.
    #[error("no meta validator registered for declared event type '{0}'")]
    MissingMetaValidator(EventType),

    /// A validator was registered for a type outside the declared set.
    #[error("validator registered for undeclared event type '{0}'")]
    UndeclaredEventType(EventType),

    /// Two handlers were registered for the same type in the same mode.
    #[error("duplicate {mode} handler for event type '{target}'")]
    DuplicateHandler {
        /// Registration mode of the colliding handler.
        mode: &'static str,
        /// The event type (or "*" for all-events handlers).
        target: String,
    },

    /// A required component was never supplied to the builder.
    #[error("missing component: {0}")]
    MissingComponent(&'static str),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result alias for configuration-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_are_descriptive() {
        let err = StoreError::Validation {
            path: "/email".to_string(),
            message: "expected a string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "validation failed at '/email': expected a string"
        );

        let err = StoreError::UnknownEvent(EventType::try_new("nope").unwrap());
        assert_eq!(err.to_string(), "unknown event type 'nope'");

        let err = StoreError::Conflict(ConflictReason::StreamTimestampExhausted { attempts: 16 });
        assert!(err.to_string().contains("16 attempts"));
    }

    #[test]
    fn provider_conflicts_carry_their_coordinates() {
        let stream = StreamId::try_new("s1").unwrap();
        let created = Timestamp::now();
        let err = ProviderError::CreatedConflict {
            stream: stream.clone(),
            created,
        };
        let text = err.to_string();
        assert!(text.contains("s1"));
        assert!(text.contains(&created.to_string()));
    }

    #[test]
    fn handler_error_exposes_cause_chain() {
        let cause: Box<dyn std::error::Error + Send + Sync> = "read model offline".into();
        let err = HandlerError::new(
            EventId::new(),
            EventType::try_new("user:created").unwrap(),
            cause,
        );
        assert!(err.to_string().contains("read model offline"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn config_error_for_duplicate_handlers_names_the_mode() {
        let err = ConfigError::DuplicateHandler {
            mode: "on",
            target: "user:created".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate on handler for event type 'user:created'"
        );
    }
}
