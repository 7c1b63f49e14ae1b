//! Payload validation against per-type validators.
//!
//! The store never compiles schemas itself. Validators arrive as opaque
//! [`Validate`] implementations, typically produced by a schema-compiler
//! collaborator at configuration time, and are held in a [`ValidatorSet`]
//! keyed by event type. Missing validators for declared types are caught
//! when the store is built, so at runtime an absent validator can only mean
//! an undeclared type.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::record::EventRecord;
use crate::types::EventType;

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON-pointer-like location of the offending value.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Creates a violation at the given path.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// An opaque payload validator.
///
/// Implementations judge a single JSON value. They are shared across
/// concurrent appends, so they must be stateless or internally synchronized.
pub trait Validate: Send + Sync {
    /// Checks a payload, reporting the first violation found.
    fn validate(&self, value: &Value) -> Result<(), Violation>;
}

/// A shared, type-erased validator handle.
pub type SharedValidator = Arc<dyn Validate>;

/// A validator that accepts every payload.
///
/// Useful for event types whose schema is intentionally open, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validate for AcceptAll {
    fn validate(&self, _value: &Value) -> Result<(), Violation> {
        Ok(())
    }
}

/// Wraps a plain function as a validator.
///
/// # Examples
///
/// ```
/// use eventline::validation::{from_fn, Validate, Violation};
/// use serde_json::json;
///
/// let requires_email = from_fn(|value| {
///     value
///         .get("email")
///         .and_then(|v| v.as_str())
///         .map(|_| ())
///         .ok_or_else(|| Violation::new("/email", "expected a string"))
/// });
/// assert!(requires_email.validate(&json!({ "email": "j@x" })).is_ok());
/// assert!(requires_email.validate(&json!({})).is_err());
/// ```
pub fn from_fn<F>(f: F) -> SharedValidator
where
    F: Fn(&Value) -> Result<(), Violation> + Send + Sync + 'static,
{
    struct FnValidator<F>(F);

    impl<F> Validate for FnValidator<F>
    where
        F: Fn(&Value) -> Result<(), Violation> + Send + Sync,
    {
        fn validate(&self, value: &Value) -> Result<(), Violation> {
            (self.0)(value)
        }
    }

    Arc::new(FnValidator(f))
}

/// The two validator maps of a store: data schemas and meta schemas.
///
/// Assembled by the caller (usually from generated code) and handed to the
/// store builder, which checks it for completeness against the declared
/// event set before the store goes live.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    data: HashMap<EventType, SharedValidator>,
    meta: HashMap<EventType, SharedValidator>,
}

impl ValidatorSet {
    /// Creates an empty validator set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the data validator for an event type.
    #[must_use]
    pub fn data(mut self, event_type: EventType, validator: SharedValidator) -> Self {
        self.data.insert(event_type, validator);
        self
    }

    /// Registers the meta validator for an event type.
    #[must_use]
    pub fn meta(mut self, event_type: EventType, validator: SharedValidator) -> Self {
        self.meta.insert(event_type, validator);
        self
    }

    /// Registers [`AcceptAll`] for both payloads of an event type.
    #[must_use]
    pub fn open(self, event_type: EventType) -> Self {
        let accept: SharedValidator = Arc::new(AcceptAll);
        self.data(event_type.clone(), accept.clone())
            .meta(event_type, accept)
    }

    /// Returns the data validator for a type, if registered.
    pub fn data_validator(&self, event_type: &EventType) -> Option<&SharedValidator> {
        self.data.get(event_type)
    }

    /// Returns the meta validator for a type, if registered.
    pub fn meta_validator(&self, event_type: &EventType) -> Option<&SharedValidator> {
        self.meta.get(event_type)
    }

    /// Iterates over the types that have at least one validator registered.
    pub fn registered_types(&self) -> impl Iterator<Item = &EventType> {
        self.data.keys().chain(
            self.meta
                .keys()
                .filter(|t| !self.data.contains_key(*t)),
        )
    }

    /// Checks a record's payloads against the validators for its type.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownEvent`] if no validator is registered for the
    ///   record's type. A store that passed its build-time completeness check
    ///   only hits this for types outside the declared set.
    /// - [`StoreError::Validation`] on the first schema violation, with the
    ///   path prefixed by the payload it occurred in.
    pub fn check(&self, record: &EventRecord) -> StoreResult<()> {
        let data = self
            .data
            .get(&record.event_type)
            .ok_or_else(|| StoreError::UnknownEvent(record.event_type.clone()))?;
        let meta = self
            .meta
            .get(&record.event_type)
            .ok_or_else(|| StoreError::UnknownEvent(record.event_type.clone()))?;

        data.validate(&record.data)
            .map_err(|v| StoreError::Validation {
                path: format!("/data{}", v.path),
                message: v.message,
            })?;
        meta.validate(&record.meta)
            .map_err(|v| StoreError::Validation {
                path: format!("/meta{}", v.path),
                message: v.message,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{make_event, NewEvent};
    use serde_json::json;

    fn event_type(tag: &str) -> EventType {
        EventType::try_new(tag).unwrap()
    }

    fn record(tag: &str, data: Value) -> EventRecord {
        make_event(NewEvent::new(event_type(tag)).data(data))
    }

    #[test]
    fn unknown_type_is_rejected() {
        let set = ValidatorSet::new().open(event_type("known"));
        let err = set.check(&record("unknown", json!({}))).unwrap_err();
        assert!(matches!(err, StoreError::UnknownEvent(t) if t.as_ref() == "unknown"));
    }

    #[test]
    fn data_violation_is_prefixed() {
        let set = ValidatorSet::new()
            .data(
                event_type("user:created"),
                from_fn(|v| {
                    v.get("email")
                        .map(|_| ())
                        .ok_or_else(|| Violation::new("/email", "required"))
                }),
            )
            .meta(event_type("user:created"), Arc::new(AcceptAll));

        let err = set.check(&record("user:created", json!({}))).unwrap_err();
        match err {
            StoreError::Validation { path, message } => {
                assert_eq!(path, "/data/email");
                assert_eq!(message, "required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn meta_violation_is_prefixed() {
        let set = ValidatorSet::new()
            .data(event_type("t"), Arc::new(AcceptAll))
            .meta(
                event_type("t"),
                from_fn(|v| {
                    if v.get("forbidden").is_some() {
                        Err(Violation::new("/forbidden", "must not be set"))
                    } else {
                        Ok(())
                    }
                }),
            );

        let mut rec = record("t", json!({}));
        rec.meta = json!({ "forbidden": true });
        let err = set.check(&rec).unwrap_err();
        assert!(matches!(err, StoreError::Validation { path, .. } if path == "/meta/forbidden"));
    }

    #[test]
    fn valid_record_passes() {
        let set = ValidatorSet::new().open(event_type("anything"));
        assert!(set.check(&record("anything", json!({ "x": 1 }))).is_ok());
    }

    #[test]
    fn registered_types_deduplicates() {
        let set = ValidatorSet::new()
            .open(event_type("a"))
            .meta(event_type("b"), Arc::new(AcceptAll));
        let mut types: Vec<_> = set.registered_types().map(|t| t.as_ref()).collect();
        types.sort_unstable();
        assert_eq!(types, vec!["a", "b"]);
    }
}
