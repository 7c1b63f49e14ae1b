//! # Eventline
//!
//! An append-oriented event store library for event-sourced applications.
//! Callers declare a closed set of typed event kinds, append validated
//! records to named streams, and derive state by replaying events through
//! projectors, contextors, and reducers.
//!
//! ## Guarantees
//!
//! - **At most one record per event id**: re-appending a known record is an
//!   idempotent no-op, observable only through a hook.
//! - **Strict per-stream order**: within a stream, `(created, id)` is a
//!   total order and no two records share a `created` value. Collisions
//!   between concurrent writers are resolved by bumping the later record's
//!   timestamp by the smallest representable step.
//! - **Conflict detection**: a newly authored record whose `created`
//!   precedes an existing record of the same stream and type is flagged as
//!   outdated on its way to handlers.
//! - **Consistent fan-out**: every accepted record reaches the contextor
//!   and projector, concurrently with each other, before the append
//!   returns. Handler failures are reported through hooks and never undo a
//!   durable record.
//!
//! ## Architecture
//!
//! Storage is behind three port traits ([`EventProvider`],
//! [`ContextProvider`], [`SnapshotProvider`]), so any embedded or server SQL
//! engine can back the store; the `eventline-memory` crate provides
//! in-memory implementations for tests and single-process use.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventline::{
//!     ContextorBuilder, EventType, NewEvent, ProjectorBuilder, Store, ValidatorSet,
//! };
//! use eventline_memory::MemoryBackend;
//!
//! let created = EventType::try_new("user:created")?;
//!
//! let backend = MemoryBackend::new();
//! let store = Store::builder()
//!     .event_provider(backend.events())
//!     .context_provider(backend.contexts())
//!     .snapshot_provider(backend.snapshots())
//!     .events([created.clone()])
//!     .validators(ValidatorSet::new().open(created.clone()))
//!     .projector(ProjectorBuilder::new().on(created.clone(), |record, _info| async move {
//!         println!("hello {}", record.data["name"]);
//!         Ok(())
//!     }))
//!     .build()?;
//!
//! let id = store
//!     .add_event(NewEvent::new(created).data(serde_json::json!({ "name": "Jane" })))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod contextor;
pub mod errors;
pub mod hooks;
pub mod projector;
pub mod provider;
pub mod record;
pub mod reducer;
pub mod schema;
pub mod store;
pub mod types;
pub mod validation;

pub use contextor::{Contextor, ContextorBuilder};
pub use errors::{
    ConfigError, ConfigResult, ConflictReason, HandlerError, ProviderError, ProviderResult,
    StoreError, StoreResult,
};
pub use hooks::{Hooks, InsertNote};
pub use projector::{HandlerResult, ProjectionInfo, Projector, ProjectorBuilder};
pub use provider::{
    ContextEntry, ContextOp, ContextProvider, Direction, EventProvider, ReadOptions, Snapshot,
    SnapshotProvider,
};
pub use record::{make_event, EventRecord, NewEvent};
pub use reducer::{FoldResult, Reducer, ReducerSource};
pub use schema::SchemaSet;
pub use store::{SnapshotMode, Store, StoreBuilder};
pub use types::{ContextKey, EventId, EventType, ReducerName, StreamId, Timestamp};
pub use validation::{AcceptAll, SharedValidator, Validate, ValidatorSet, Violation};
