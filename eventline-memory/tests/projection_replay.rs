//! Projection build-up over a live stream, and replay parity: replaying a
//! stream into a fresh projector must reproduce the state the live path
//! built, without touching the event table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use eventline::{
    EventRecord, EventType, NewEvent, ProjectorBuilder, Store, StreamId, ValidatorSet,
};
use eventline_memory::MemoryBackend;
use serde_json::json;

fn t(tag: &str) -> EventType {
    EventType::try_new(tag).unwrap()
}

fn s(id: &str) -> StreamId {
    StreamId::try_new(id).unwrap()
}

#[derive(Debug, Clone, Default, PartialEq)]
struct UserState {
    given: String,
    family: String,
    email: String,
}

type UserIndex = Arc<Mutex<HashMap<String, UserState>>>;

fn user_projector(index: UserIndex) -> ProjectorBuilder {
    let on_created = index.clone();
    let on_given = index.clone();
    let on_email = index;
    ProjectorBuilder::new()
        .on(t("user:created"), move |record: EventRecord, _| {
            let index = on_created.clone();
            async move {
                let state = UserState {
                    given: record.data["name"]["given"].as_str().unwrap_or_default().into(),
                    family: record.data["name"]["family"].as_str().unwrap_or_default().into(),
                    email: record.data["email"].as_str().unwrap_or_default().into(),
                };
                index.lock().unwrap().insert(record.stream.to_string(), state);
                Ok(())
            }
        })
        .on(t("user:name:given-set"), move |record: EventRecord, _| {
            let index = on_given.clone();
            async move {
                if let Some(state) = index.lock().unwrap().get_mut(record.stream.as_ref()) {
                    state.given = record.data["given"].as_str().unwrap_or_default().into();
                }
                Ok(())
            }
        })
        .on(t("user:email-set"), move |record: EventRecord, _| {
            let index = on_email.clone();
            async move {
                if let Some(state) = index.lock().unwrap().get_mut(record.stream.as_ref()) {
                    state.email = record.data["email"].as_str().unwrap_or_default().into();
                }
                Ok(())
            }
        })
}

fn validators() -> ValidatorSet {
    ValidatorSet::new()
        .open(t("user:created"))
        .open(t("user:name:given-set"))
        .open(t("user:email-set"))
        .open(t("audit:logged"))
}

fn user_store(backend: &MemoryBackend, projector: ProjectorBuilder) -> Store {
    Store::builder()
        .event_provider(backend.events())
        .context_provider(backend.contexts())
        .snapshot_provider(backend.snapshots())
        .events([
            t("user:created"),
            t("user:name:given-set"),
            t("user:email-set"),
            t("audit:logged"),
        ])
        .validators(validators())
        .projector(projector)
        .build()
        .expect("test store configuration is complete")
}

async fn append_user_history(store: &Store) {
    store
        .add_event(
            NewEvent::new(t("user:created")).stream(s("s1")).data(json!({
                "name": { "given": "Jane", "family": "Doe" },
                "email": "j@x"
            })),
        )
        .await
        .unwrap();
    store
        .add_event(
            NewEvent::new(t("user:name:given-set"))
                .stream(s("s1"))
                .data(json!({ "given": "John" })),
        )
        .await
        .unwrap();
    store
        .add_event(
            NewEvent::new(t("user:email-set"))
                .stream(s("s1"))
                .data(json!({ "email": "john@y" })),
        )
        .await
        .unwrap();
}

fn expected_state() -> UserState {
    UserState {
        given: "John".into(),
        family: "Doe".into(),
        email: "john@y".into(),
    }
}

#[tokio::test]
async fn live_appends_build_the_read_model() {
    let backend = MemoryBackend::new();
    let index: UserIndex = Arc::default();
    let store = user_store(&backend, user_projector(index.clone()));

    append_user_history(&store).await;

    let built = index.lock().unwrap().clone();
    assert_eq!(built.len(), 1);
    assert_eq!(built["s1"], expected_state());
}

#[tokio::test]
async fn replay_reproduces_the_live_state_without_reinserting() {
    let backend = MemoryBackend::new();
    let live_index: UserIndex = Arc::default();
    let live_store = user_store(&backend, user_projector(live_index.clone()));
    append_user_history(&live_store).await;
    assert_eq!(backend.event_count(), 3);

    // A second store over the same log, projecting into a fresh sink.
    let fresh_index: UserIndex = Arc::default();
    let replay_store = user_store(&backend, user_projector(fresh_index.clone()));
    replay_store.replay_events(Some(&s("s1"))).await.unwrap();

    assert_eq!(backend.event_count(), 3, "replay never inserts");
    assert_eq!(
        fresh_index.lock().unwrap().clone(),
        live_index.lock().unwrap().clone()
    );
}

#[tokio::test]
async fn replay_of_the_whole_store_covers_every_stream() {
    let backend = MemoryBackend::new();
    let index: UserIndex = Arc::default();
    let store = user_store(&backend, user_projector(index.clone()));

    for stream in ["u1", "u2"] {
        store
            .add_event(
                NewEvent::new(t("user:created")).stream(s(stream)).data(json!({
                    "name": { "given": "A", "family": "B" },
                    "email": "a@b"
                })),
            )
            .await
            .unwrap();
    }

    let fresh_index: UserIndex = Arc::default();
    let replay_store = user_store(&backend, user_projector(fresh_index.clone()));
    replay_store.replay_events(None).await.unwrap();
    assert_eq!(fresh_index.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn once_handlers_stay_silent_during_replay() {
    let backend = MemoryBackend::new();
    let welcomes = Arc::new(Mutex::new(0u32));
    let counter = welcomes.clone();
    let projector = ProjectorBuilder::new().once(t("user:created"), move |_, _| {
        let counter = counter.clone();
        async move {
            *counter.lock().unwrap() += 1;
            Ok(())
        }
    });
    let store = user_store(&backend, projector);

    store
        .add_event(
            NewEvent::new(t("user:created")).stream(s("u1")).data(json!({
                "name": { "given": "Jane", "family": "Doe" },
                "email": "j@x"
            })),
        )
        .await
        .unwrap();
    assert_eq!(*welcomes.lock().unwrap(), 1, "once fires for live appends");

    store.replay_events(Some(&s("u1"))).await.unwrap();
    assert_eq!(*welcomes.lock().unwrap(), 1, "once never fires on replay");
}

#[tokio::test]
async fn pushing_with_hydrated_true_also_suppresses_once() {
    let backend = MemoryBackend::new();
    let fired = Arc::new(Mutex::new(0u32));
    let counter = fired.clone();
    let projector = ProjectorBuilder::new().once(t("audit:logged"), move |_, _| {
        let counter = counter.clone();
        async move {
            *counter.lock().unwrap() += 1;
            Ok(())
        }
    });
    let store = user_store(&backend, projector);

    let record = eventline::make_event(NewEvent::new(t("audit:logged")).stream(s("a1")));
    store.push_event(record, true).await.unwrap();
    assert_eq!(*fired.lock().unwrap(), 0);
}
