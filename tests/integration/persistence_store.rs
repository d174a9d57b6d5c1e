//! Durable stores under the engine: sled-backed data and checkpoints, and the file checkpoint.

use crate::integration::test_utils::{
    customers, next_started, period, settings, wait_state, Harness, ScriptedGenerator,
};
use finsynth::checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SledCheckpointStore,
};
use finsynth::dataset::SectionKind;
use finsynth::directory::StaticDirectory;
use finsynth::engine::{Engine, EngineDeps, RunState};
use finsynth::generation::GenerationClient;
use finsynth::persistence::sled_store::SledDatasetStore;
use finsynth::persistence::{DatasetStore, PersistenceAdapter};
use finsynth::types::CustomerId;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Deps over one sled database holding both the data and the checkpoint.
fn sled_deps(path: &Path, ids: &[&str], generator: Arc<dyn GenerationClient>) -> EngineDeps {
    let db = sled::open(path).unwrap();
    let store = SledDatasetStore::from_db(db.clone()).unwrap();
    let checkpoints = SledCheckpointStore::new(&db).unwrap();
    EngineDeps {
        directory: Arc::new(StaticDirectory::new(customers(ids))),
        generator,
        persistence: PersistenceAdapter::new(Arc::new(store)),
        checkpoints: Arc::new(checkpoints),
    }
}

#[tokio::test]
async fn test_paused_run_survives_database_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("store");

    let mut first = ScriptedGenerator::gated();
    let gate = first.gate.clone().unwrap();
    let engine = Engine::launch(
        sled_deps(&db_path, &["A", "B"], first.client.clone()),
        settings("2024-05"),
    )
    .await
    .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut first.started).await;
    handle.pause().await.unwrap();
    gate.add_permits(1);
    wait_state(&handle, RunState::Paused).await;
    drop(handle);
    engine.shutdown().await.unwrap();

    let second = ScriptedGenerator::open();
    let engine = Engine::launch(
        sled_deps(&db_path, &["A", "B"], second.client.clone()),
        settings("2024-05"),
    )
    .await
    .unwrap();
    let handle = engine.handle();
    let restored = handle.status();
    assert_eq!(restored.state, RunState::Paused);
    assert_eq!(restored.current_index, 1);
    assert_eq!(restored.counts.success, 1);

    handle.resume().await.unwrap();
    wait_state(&handle, RunState::Completed).await;
    assert_eq!(second.client.calls(), vec![CustomerId::new("B")]);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overwrite_run_upserts_in_place() {
    let h = Harness::new(&["A"]);
    let p = period("2024-05");
    h.seed_existing("A", &p);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(
        h.deps(scripted.client.clone()),
        settings("2024-05").with_overwrite(true),
    )
    .await
    .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    wait_state(&handle, RunState::Completed).await;
    engine.shutdown().await.unwrap();

    let id = CustomerId::new("A");
    assert_eq!(h.store.load_section(SectionKind::Summary, &p, &id).unwrap().len(), 1);
    assert_eq!(h.store.load_section(SectionKind::Detail, &p, &id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreadable_file_checkpoint_is_discarded() {
    let temp = TempDir::new().unwrap();
    let checkpoint_path = temp.path().join("checkpoint.json");
    std::fs::write(&checkpoint_path, b"{ not json").unwrap();
    let checkpoints = Arc::new(FileCheckpointStore::new(&checkpoint_path));
    assert!(checkpoints.load().is_err());

    let h = Harness::new(&["A"]);
    let scripted = ScriptedGenerator::open();
    let deps = EngineDeps {
        checkpoints: checkpoints.clone(),
        ..h.deps(scripted.client.clone())
    };
    let engine = Engine::launch(deps, settings("2024-05")).await.unwrap();
    assert_eq!(engine.status().state, RunState::Idle);
    assert!(!checkpoint_path.exists());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_checkpoint_tracks_run_progress() {
    let temp = TempDir::new().unwrap();
    let checkpoints = Arc::new(FileCheckpointStore::new(temp.path().join("cp").join("run.json")));
    let h = Harness::new(&["A", "B"]);
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let deps = EngineDeps {
        checkpoints: checkpoints.clone(),
        ..h.deps(scripted.client.clone())
    };
    let engine = Engine::launch(deps, settings("2024-05")).await.unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut scripted.started).await;

    let in_flight = checkpoints.load().unwrap().expect("written before the call");
    assert!(in_flight.is_running);
    assert_eq!(in_flight.current_index, 0);

    gate.add_permits(2);
    wait_state(&handle, RunState::Completed).await;
    assert!(checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[test]
fn test_memory_checkpoint_save_stamps_time() {
    let store = MemoryCheckpointStore::new();
    let mut checkpoint =
        crate::integration::test_utils::checkpoint_for(&["A"], "2024-05", 0, true, false);
    checkpoint.timestamp = chrono::Utc::now() - chrono::Duration::hours(48);

    store.save(checkpoint).unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert!(loaded.is_valid(&period("2024-05"), chrono::Utc::now()));
}
