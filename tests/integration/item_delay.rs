//! The wait between customers, run on tokio's paused clock so long delays cost nothing.

use crate::integration::test_utils::{period, settings, Harness, ScriptedGenerator};
use finsynth::checkpoint::CheckpointStore;
use finsynth::engine::{CustomerStatus, Engine, EngineSettings, RunState};
use finsynth::types::CustomerId;
use std::time::Duration;
use tokio::time::Instant;

const LONG: Duration = Duration::from_secs(3600);
const SHORT: Duration = Duration::from_secs(60);

fn delayed(delay: Duration) -> EngineSettings {
    settings("2024-05").with_item_delay(delay)
}

#[tokio::test(start_paused = true)]
async fn test_pause_lands_during_delay() {
    let h = Harness::new(&["A", "B"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), delayed(LONG))
        .await
        .unwrap();
    let handle = engine.handle();
    let began = Instant::now();
    handle.start().await.unwrap();
    handle.wait_for(|s| s.current_index == 1).await.unwrap();

    handle.pause().await.unwrap();
    let paused = handle
        .wait_for(|s| s.state == RunState::Paused)
        .await
        .unwrap();
    assert!(began.elapsed() < LONG, "pause waited out the delay");
    assert_eq!(paused.current_index, 1);
    assert_eq!(paused.results[1].status, CustomerStatus::Pending);
    assert_eq!(scripted.client.calls(), vec![CustomerId::new("A")]);

    let checkpoint = h.checkpoints.load().unwrap().expect("paused run is checkpointed");
    assert!(checkpoint.is_paused);
    assert_eq!(checkpoint.current_index, 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_lands_during_delay() {
    let h = Harness::new(&["A", "B", "C"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), delayed(LONG))
        .await
        .unwrap();
    let handle = engine.handle();
    let began = Instant::now();
    handle.start().await.unwrap();
    handle.wait_for(|s| s.current_index == 1).await.unwrap();

    handle.stop().await.unwrap();
    let stopped = handle
        .wait_for(|s| s.state == RunState::Stopped)
        .await
        .unwrap();
    assert!(began.elapsed() < LONG, "stop waited out the delay");
    assert_eq!(stopped.current_index, 1);
    assert_eq!(scripted.client.calls(), vec![CustomerId::new("A")]);
    assert!(h.checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_delay_keeps_running_checkpoint() {
    let h = Harness::new(&["A", "B"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), delayed(LONG))
        .await
        .unwrap();
    let handle = engine.handle();
    let began = Instant::now();
    handle.start().await.unwrap();
    handle.wait_for(|s| s.current_index == 1).await.unwrap();
    drop(handle);

    engine.shutdown().await.unwrap();
    assert!(began.elapsed() < LONG, "shutdown waited out the delay");
    let checkpoint = h.checkpoints.load().unwrap().expect("run kept for resume");
    assert!(checkpoint.is_running);
    assert_eq!(checkpoint.current_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_delay_after_last_customer() {
    let h = Harness::new(&["A", "B"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), delayed(SHORT))
        .await
        .unwrap();
    let handle = engine.handle();
    let began = Instant::now();
    handle.start().await.unwrap();
    let completed = handle
        .wait_for(|s| s.state == RunState::Completed)
        .await
        .unwrap();

    let elapsed = began.elapsed();
    assert!(elapsed >= SHORT, "one delay between A and B, got {elapsed:?}");
    assert!(elapsed < SHORT * 2, "delayed after the last customer, got {elapsed:?}");
    assert_eq!(completed.counts.success, 2);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_skipped_customers_add_no_delay() {
    let h = Harness::new(&["A", "B", "C", "D"]);
    let p = period("2024-05");
    h.seed_existing("B", &p);
    h.seed_existing("C", &p);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), delayed(SHORT))
        .await
        .unwrap();
    let handle = engine.handle();
    let began = Instant::now();
    handle.start().await.unwrap();
    let completed = handle
        .wait_for(|s| s.state == RunState::Completed)
        .await
        .unwrap();

    // Only the wait after A; B and C are skipped and D is last.
    let elapsed = began.elapsed();
    assert!(elapsed >= SHORT, "got {elapsed:?}");
    assert!(elapsed < SHORT * 2, "skipped customers were delayed, got {elapsed:?}");
    assert_eq!(completed.counts.skipped, 2);
    assert_eq!(
        scripted.client.calls(),
        vec![CustomerId::new("A"), CustomerId::new("D")]
    );
    engine.shutdown().await.unwrap();
}
