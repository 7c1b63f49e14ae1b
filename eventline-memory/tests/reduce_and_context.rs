//! Context fan-in and the reduce engine: snapshot-resumed folds must always
//! agree with a fresh full fold, and context-sourced reads return the union
//! of the key's streams in order.

use std::sync::{Arc, Mutex};

use eventline::{
    ContextEntry, ContextKey, ContextorBuilder, EventType, NewEvent, ReadOptions, Reducer,
    ReducerName, SnapshotMode, Store, StreamId, ValidatorSet,
};
use eventline_memory::MemoryBackend;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn t(tag: &str) -> EventType {
    EventType::try_new(tag).unwrap()
}

fn s(id: &str) -> StreamId {
    StreamId::try_new(id).unwrap()
}

fn name(n: &str) -> ReducerName {
    ReducerName::try_new(n).unwrap()
}

fn validators() -> ValidatorSet {
    ValidatorSet::new()
        .open(t("counter:incremented"))
        .open(t("counter:reset"))
        .open(t("tenant:assigned"))
}

fn tenant_contextor() -> ContextorBuilder {
    ContextorBuilder::new().add(t("tenant:assigned"), |record| {
        let tenant = record.data["tenantId"].as_str()?;
        let key = ContextKey::try_new(tenant).ok()?;
        Some(ContextEntry::insert(key, record.stream.clone()))
    })
}

fn store_with_mode(backend: &MemoryBackend, mode: SnapshotMode) -> Store {
    Store::builder()
        .event_provider(backend.events())
        .context_provider(backend.contexts())
        .snapshot_provider(backend.snapshots())
        .events([
            t("counter:incremented"),
            t("counter:reset"),
            t("tenant:assigned"),
        ])
        .validators(validators())
        .contextor(tenant_contextor())
        .snapshot_mode(mode)
        .build()
        .expect("test store configuration is complete")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Counter {
    n: u64,
}

/// A counting reducer that records how many events each fold call observed.
fn counting_reducer(batches: Arc<Mutex<Vec<usize>>>) -> Reducer<Counter> {
    Reducer::stream(name("counter"), Counter { n: 0 }, move |events, mut state| {
        batches.lock().unwrap().push(events.len());
        state.n += events.len() as u64;
        Ok(state)
    })
    .with_filter(vec![t("counter:incremented")])
}

async fn append_increments(store: &Store, stream: &str, count: usize) {
    for _ in 0..count {
        store
            .add_event(NewEvent::new(t("counter:incremented")).stream(s(stream)))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn reduce_without_events_or_snapshot_is_none() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    let reducer = counting_reducer(Arc::default());
    let state = store.reduce("empty-stream", &reducer).await.unwrap();
    assert_eq!(state, None);
}

#[tokio::test]
async fn auto_snapshot_lets_the_next_reduce_read_only_the_tail() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Auto);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let reducer = counting_reducer(batches.clone());

    append_increments(&store, "c1", 1000).await;
    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();
    assert_eq!(state, Counter { n: 1000 });

    append_increments(&store, "c1", 5).await;
    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();
    assert_eq!(state, Counter { n: 1005 });

    assert_eq!(
        *batches.lock().unwrap(),
        vec![1000, 5],
        "the second fold resumes from the snapshot cursor"
    );
}

#[tokio::test]
async fn snapshot_resumed_fold_matches_a_fresh_full_fold() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Auto);
    let reducer = counting_reducer(Arc::default());

    append_increments(&store, "c1", 40).await;
    store.reduce("c1", &reducer).await.unwrap();
    append_increments(&store, "c1", 17).await;
    let resumed = store.reduce("c1", &reducer).await.unwrap().unwrap();

    // The same history folded from scratch, bypassing snapshots entirely.
    let full = store
        .get_events_by_stream(
            &s("c1"),
            &ReadOptions::new().with_types(vec![t("counter:incremented")]),
        )
        .await
        .unwrap();
    let fresh = counting_reducer(Arc::default());
    let expected = fresh.fold(&full, fresh.initial()).unwrap();

    assert_eq!(resumed, expected);
}

#[tokio::test]
async fn reduce_with_no_new_events_returns_the_snapshot_state() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Auto);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let reducer = counting_reducer(batches.clone());

    append_increments(&store, "c1", 7).await;
    store.reduce("c1", &reducer).await.unwrap();
    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();

    assert_eq!(state, Counter { n: 7 });
    assert_eq!(
        *batches.lock().unwrap(),
        vec![7],
        "a fully caught-up reduce never calls the fold"
    );
}

#[tokio::test]
async fn manual_mode_never_writes_snapshots() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let reducer = counting_reducer(batches.clone());

    append_increments(&store, "c1", 3).await;
    store.reduce("c1", &reducer).await.unwrap();
    store.reduce("c1", &reducer).await.unwrap();

    assert_eq!(
        *batches.lock().unwrap(),
        vec![3, 3],
        "every reduce folds the full history"
    );
}

#[tokio::test]
async fn create_snapshot_recomputes_and_delete_restores_full_folds() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let reducer = counting_reducer(batches.clone());

    append_increments(&store, "c1", 10).await;
    store.create_snapshot("c1", &reducer).await.unwrap();
    batches.lock().unwrap().clear();

    append_increments(&store, "c1", 2).await;
    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();
    assert_eq!(state, Counter { n: 12 });
    assert_eq!(*batches.lock().unwrap(), vec![2], "reduce resumed from the forced snapshot");

    store.delete_snapshot(&name("counter"), "c1").await.unwrap();
    batches.lock().unwrap().clear();
    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();
    assert_eq!(state, Counter { n: 12 });
    assert_eq!(*batches.lock().unwrap(), vec![12], "deletion forces a full fold");
}

#[tokio::test]
async fn fold_failures_surface_as_is_to_the_caller() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    append_increments(&store, "c1", 3).await;

    let broken = Reducer::<Counter>::stream(name("broken"), Counter { n: 0 }, |_, _| {
        Err("counter state corrupted".into())
    })
    .with_filter(vec![t("counter:incremented")]);

    let err = store.reduce("c1", &broken).await.unwrap_err();
    match err {
        eventline::StoreError::Reduce(cause) => {
            assert_eq!(cause.to_string(), "counter state corrupted");
        }
        other => panic!("expected a reduce error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_snapshot_without_events_is_not_found() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    let reducer = counting_reducer(Arc::default());
    let err = store.create_snapshot("empty", &reducer).await.unwrap_err();
    assert!(matches!(err, eventline::StoreError::NotFound(_)));
}

#[tokio::test]
async fn reducer_filter_excludes_other_types() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);
    let reducer = counting_reducer(Arc::default());

    append_increments(&store, "c1", 4).await;
    store
        .add_event(NewEvent::new(t("counter:reset")).stream(s("c1")))
        .await
        .unwrap();

    let state = store.reduce("c1", &reducer).await.unwrap().unwrap();
    assert_eq!(state, Counter { n: 4 }, "reset events are filtered out");
}

#[tokio::test]
async fn context_fan_in_returns_the_union_of_streams_in_order() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);

    for stream in ["u1", "u2", "u3"] {
        store
            .add_event(
                NewEvent::new(t("tenant:assigned"))
                    .stream(s(stream))
                    .data(json!({ "tenantId": "acme" })),
            )
            .await
            .unwrap();
    }
    // A different tenant stays out of the acme context.
    store
        .add_event(
            NewEvent::new(t("tenant:assigned"))
                .stream(s("u4"))
                .data(json!({ "tenantId": "globex" })),
        )
        .await
        .unwrap();

    let key = ContextKey::try_new("acme").unwrap();
    let records = store
        .get_events_by_context(&key, &ReadOptions::new())
        .await
        .unwrap();

    let streams: Vec<_> = records.iter().map(|r| r.stream.as_ref()).collect();
    assert_eq!(streams, vec!["u1", "u2", "u3"]);
    for pair in records.windows(2) {
        assert!((pair[0].created, pair[0].id) < (pair[1].created, pair[1].id));
    }
}

#[tokio::test]
async fn context_sourced_reducers_fold_the_joined_streams() {
    let backend = MemoryBackend::new();
    let store = store_with_mode(&backend, SnapshotMode::Manual);

    for stream in ["u1", "u2", "u3"] {
        store
            .add_event(
                NewEvent::new(t("tenant:assigned"))
                    .stream(s(stream))
                    .data(json!({ "tenantId": "acme" })),
            )
            .await
            .unwrap();
    }

    let members = Reducer::context(name("tenant-members"), Vec::<String>::new(), |events, mut acc| {
        for event in events {
            acc.push(event.stream.to_string());
        }
        Ok(acc)
    });

    let state = store.reduce("acme", &members).await.unwrap().unwrap();
    assert_eq!(state, vec!["u1", "u2", "u3"]);
}
