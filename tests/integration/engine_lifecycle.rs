//! Integration tests for the job controller: run, pause, stop, resume and restart recovery.

use crate::integration::test_utils::{
    checkpoint_for, next_started, period, settings, wait_state, Harness, ScriptedGenerator,
};
use finsynth::checkpoint::CheckpointStore;
use finsynth::dataset::{GeneratedDataset, SectionKind};
use finsynth::engine::{CustomerStatus, Engine, RunState};
use finsynth::error::EngineError;
use finsynth::persistence::DatasetStore;
use finsynth::types::CustomerId;

fn ids(values: &[&str]) -> Vec<CustomerId> {
    values.iter().map(|id| CustomerId::new(*id)).collect()
}

fn statuses(results: &[finsynth::engine::CustomerResult]) -> Vec<CustomerStatus> {
    results.iter().map(|result| result.status).collect()
}

#[tokio::test]
async fn test_pause_then_resume_after_restart_continues_where_it_stopped() {
    let h = Harness::new(&["A", "B", "C"]);
    let mut first = ScriptedGenerator::gated();
    let gate = first.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(first.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();

    assert_eq!(next_started(&mut first.started).await, CustomerId::new("A"));
    gate.add_permits(1);
    assert_eq!(next_started(&mut first.started).await, CustomerId::new("B"));

    // B is in flight: the pause lands after it finishes.
    handle.pause().await.unwrap();
    assert_eq!(handle.status().state, RunState::Pausing);
    gate.add_permits(1);

    let paused = wait_state(&handle, RunState::Paused).await;
    assert_eq!(paused.current_index, 2);
    assert_eq!(
        statuses(&paused.results),
        vec![
            CustomerStatus::Success,
            CustomerStatus::Success,
            CustomerStatus::Pending
        ]
    );

    let checkpoint = h.checkpoints.load().unwrap().expect("paused run is checkpointed");
    assert!(checkpoint.is_paused);
    assert!(!checkpoint.is_running);
    assert_eq!(checkpoint.current_index, 2);
    assert_eq!(
        checkpoint.existing_customer_ids,
        ids(&["A", "B"]),
        "finished customers are recorded as existing"
    );

    engine.shutdown().await.unwrap();
    assert_eq!(first.client.calls(), ids(&["A", "B"]));

    // Restart on the same stores.
    let second = ScriptedGenerator::open();
    let engine = Engine::launch(h.deps(second.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    let restored = handle.status();
    assert_eq!(restored.state, RunState::Paused);
    assert!(restored.restored);
    assert_eq!(restored.current_index, 2);

    handle.resume().await.unwrap();
    let completed = wait_state(&handle, RunState::Completed).await;
    assert_eq!(second.client.calls(), ids(&["C"]));
    assert_eq!(completed.counts.success, 3);
    assert_eq!(completed.current_index, 3);
    assert!(h.checkpoints.load().unwrap().is_none(), "completion clears the checkpoint");

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_discards_checkpoint_and_keeps_results() {
    let h = Harness::new(&["A", "B", "C"]);
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut scripted.started).await;
    assert!(h.checkpoints.load().unwrap().is_some());

    handle.stop().await.unwrap();
    // A second stop while stopping is accepted.
    handle.stop().await.unwrap();
    gate.add_permits(1);

    let stopped = wait_state(&handle, RunState::Stopped).await;
    assert_eq!(stopped.current_index, 1);
    assert_eq!(stopped.results[0].status, CustomerStatus::Success);
    assert_eq!(stopped.results[1].status, CustomerStatus::Pending);
    assert!(h.checkpoints.load().unwrap().is_none());
    assert_eq!(scripted.client.calls(), ids(&["A"]));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_from_paused_clears_checkpoint() {
    let h = Harness::new(&["A", "B"]);
    h.checkpoints
        .write(&checkpoint_for(&["A", "B"], "2024-05", 1, false, true))
        .unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    assert_eq!(handle.status().state, RunState::Paused);

    handle.stop().await.unwrap();
    assert_eq!(handle.status().state, RunState::Stopped);
    assert!(h.checkpoints.load().unwrap().is_none());

    // Stopped is terminal for stop.
    let err = handle.stop().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            state: RunState::Stopped,
            ..
        }
    ));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rerun_with_all_existing_makes_no_generation_calls() {
    let h = Harness::new(&["A", "B", "C"]);
    let p = period("2024-05");
    for id in ["A", "B", "C"] {
        h.seed_existing(id, &p);
    }
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    let initial = handle.status();
    assert_eq!(initial.counts.existing, 3);
    assert!(initial.results[0]
        .existing_sections
        .map(|sections| sections.summary && sections.detail)
        .unwrap_or(false));

    handle.start().await.unwrap();
    let completed = wait_state(&handle, RunState::Completed).await;
    assert!(scripted.client.calls().is_empty());
    assert_eq!(completed.counts.skipped, 3);
    assert_eq!(completed.current_index, 3);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overwrite_regenerates_existing_customers() {
    let h = Harness::new(&["A", "B"]);
    h.seed_existing("A", &period("2024-05"));
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(
        h.deps(scripted.client.clone()),
        settings("2024-05").with_overwrite(true),
    )
    .await
    .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    let completed = wait_state(&handle, RunState::Completed).await;

    assert_eq!(scripted.client.calls(), ids(&["A", "B"]));
    assert_eq!(completed.counts.success, 2);
    assert_eq!(completed.counts.skipped, 0);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_set_overwrite_applies_to_next_start() {
    let h = Harness::new(&["A"]);
    h.seed_existing("A", &period("2024-05"));
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.set_overwrite(true).await.unwrap();
    assert!(handle.status().overwrite_existing);

    handle.start().await.unwrap();
    wait_state(&handle, RunState::Completed).await;
    assert_eq!(scripted.client.calls(), ids(&["A"]));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_generation_error_is_isolated_to_one_customer() {
    let h = Harness::new(&["A", "B", "C"]);
    let scripted = ScriptedGenerator::failing_on(&["B"]);

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    let completed = wait_state(&handle, RunState::Completed).await;

    assert_eq!(
        statuses(&completed.results),
        vec![
            CustomerStatus::Success,
            CustomerStatus::Error,
            CustomerStatus::Success
        ]
    );
    let error = completed.results[1].error.as_deref().unwrap_or_default();
    assert!(error.contains("quota exhausted"), "unexpected error: {error}");
    assert!(completed.results[1].dataset.is_none());
    assert_eq!(scripted.client.calls().len(), 3);

    let existing = h.store.existing_sections(&period("2024-05")).unwrap();
    assert!(existing.contains_key(&CustomerId::new("A")));
    assert!(!existing.contains_key(&CustomerId::new("B")));
    assert!(existing.contains_key(&CustomerId::new("C")));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_section_marks_partial_success() {
    let h = Harness::new(&["A", "B"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(
        h.deps_failing_section(scripted.client.clone(), SectionKind::Detail),
        settings("2024-05"),
    )
    .await
    .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    let completed = wait_state(&handle, RunState::Completed).await;

    assert_eq!(completed.counts.partial_success, 2);
    let first = &completed.results[0];
    assert_eq!(first.persistence_failures.len(), 1);
    assert_eq!(first.persistence_failures[0].section, SectionKind::Detail);
    let stored = first.existing_sections.expect("summary was stored");
    assert!(stored.summary);
    assert!(!stored.detail);

    let existing = h.store.existing_sections(&period("2024-05")).unwrap();
    let a = existing[&CustomerId::new("A")];
    assert!(a.summary && !a.detail);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_with_empty_directory_is_refused() {
    let h = Harness::new(&[]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    let err = handle.start().await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyDirectory));
    assert_eq!(handle.status().state, RunState::Idle);
    assert!(h.checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_transitions_leave_state_unchanged() {
    let h = Harness::new(&["A"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();

    for err in [
        handle.pause().await.unwrap_err(),
        handle.resume().await.unwrap_err(),
        handle.stop().await.unwrap_err(),
    ] {
        assert!(
            matches!(
                err,
                EngineError::InvalidTransition {
                    state: RunState::Idle,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
    }
    assert_eq!(handle.status().state, RunState::Idle);

    handle.start().await.unwrap();
    wait_state(&handle, RunState::Completed).await;

    // A completed run may be started again; A now has data and is skipped.
    handle.start().await.unwrap();
    let again = wait_state(&handle, RunState::Completed).await;
    assert_eq!(again.counts.skipped, 1);
    assert_eq!(scripted.client.calls(), ids(&["A"]));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_configuration_changes_refused_while_active() {
    let h = Harness::new(&["A", "B"]);
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut scripted.started).await;

    assert!(matches!(
        handle.start().await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
    assert!(matches!(
        handle.set_overwrite(true).await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
    assert!(matches!(
        handle.run_one(CustomerId::new("B")).await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
    assert!(!handle.status().overwrite_existing);

    handle.stop().await.unwrap();
    gate.add_permits(1);
    wait_state(&handle, RunState::Stopped).await;
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_resume_withdraws_pending_pause() {
    let h = Harness::new(&["A", "B"]);
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut scripted.started).await;

    handle.pause().await.unwrap();
    handle.resume().await.unwrap();
    assert_eq!(handle.status().state, RunState::Running);

    gate.add_permits(2);
    let completed = wait_state(&handle, RunState::Completed).await;
    assert_eq!(completed.counts.success, 2);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_select_period_during_run_stops_and_switches() {
    let h = Harness::new(&["A", "B"]);
    h.seed_existing("B", &period("2024-06"));
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    next_started(&mut scripted.started).await;

    let switcher = handle.clone();
    let switch = tokio::spawn(async move { switcher.select_period(period("2024-06")).await });
    gate.add_permits(1);
    switch.await.unwrap().unwrap();

    let status = handle.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.period, period("2024-06"));
    assert_eq!(status.current_index, 0);
    assert_eq!(
        statuses(&status.results),
        vec![CustomerStatus::Pending, CustomerStatus::Existing]
    );
    assert!(h.checkpoints.load().unwrap().is_none());
    assert_eq!(scripted.client.calls(), ids(&["A"]));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reset_rebuilds_statuses_from_store() {
    let h = Harness::new(&["A", "B"]);
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    handle.start().await.unwrap();
    wait_state(&handle, RunState::Completed).await;

    handle.reset().await.unwrap();
    let status = handle.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.current_index, 0);
    assert_eq!(status.counts.existing, 2);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_mid_run_leaves_running_checkpoint_that_auto_resumes() {
    let h = Harness::new(&["A", "B", "C"]);
    let mut first = ScriptedGenerator::gated();
    let gate = first.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(first.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    engine.handle().start().await.unwrap();
    next_started(&mut first.started).await;

    let shutdown = tokio::spawn(engine.shutdown());
    gate.add_permits(1);
    shutdown.await.unwrap().unwrap();

    let checkpoint = h.checkpoints.load().unwrap().expect("run left checkpointed");
    assert!(checkpoint.is_running);
    assert!(!checkpoint.is_paused);
    assert_eq!(checkpoint.current_index, 1);

    let second = ScriptedGenerator::open();
    let engine = Engine::launch(h.deps(second.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    let completed = wait_state(&handle, RunState::Completed).await;
    assert!(completed.restored);
    assert_eq!(second.client.calls(), ids(&["B", "C"]));
    assert_eq!(completed.counts.success, 3);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropping_every_handle_checkpoints_the_run() {
    let h = Harness::new(&["A", "B"]);
    let mut scripted = ScriptedGenerator::gated();
    let gate = scripted.gate.clone().unwrap();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let mut updates = engine.handle().subscribe();
    engine.handle().start().await.unwrap();
    next_started(&mut scripted.started).await;

    drop(engine);
    gate.add_permits(1);
    // The status sender goes away once the worker exits.
    while updates.changed().await.is_ok() {}

    let checkpoint = h.checkpoints.load().unwrap().expect("checkpoint kept");
    assert!(checkpoint.is_running);
    assert_eq!(checkpoint.current_index, 1);
    assert_eq!(scripted.client.calls(), ids(&["A"]));
}

#[tokio::test]
async fn test_interrupted_customer_is_generated_again_on_restore() {
    let h = Harness::new(&["A", "B", "C"]);
    let mut checkpoint = checkpoint_for(&["A", "B", "C"], "2024-05", 1, true, false);
    checkpoint.results[1].status = CustomerStatus::Processing;
    h.checkpoints.write(&checkpoint).unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let handle = engine.handle();
    let completed = wait_state(&handle, RunState::Completed).await;
    assert_eq!(scripted.client.calls(), ids(&["B", "C"]));
    assert_eq!(completed.results[0].status, CustomerStatus::Success);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_running_checkpoint_restores_paused_without_auto_resume() {
    let h = Harness::new(&["A", "B"]);
    let mut checkpoint = checkpoint_for(&["A", "B"], "2024-05", 1, true, false);
    checkpoint.results[1].status = CustomerStatus::Processing;
    h.checkpoints.write(&checkpoint).unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(
        h.deps(scripted.client.clone()),
        settings("2024-05").with_auto_resume(false),
    )
    .await
    .unwrap();
    let status = engine.status();
    assert_eq!(status.state, RunState::Paused);
    assert!(status.restored);
    assert_eq!(status.results[1].status, CustomerStatus::Pending);
    engine.shutdown().await.unwrap();
    assert!(scripted.client.calls().is_empty());
}

#[tokio::test]
async fn test_stale_checkpoint_is_discarded() {
    let h = Harness::new(&["A", "B"]);
    let mut checkpoint = checkpoint_for(&["A", "B"], "2024-05", 1, false, true);
    checkpoint.timestamp = chrono::Utc::now() - chrono::Duration::hours(25);
    h.checkpoints.write(&checkpoint).unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let status = engine.status();
    assert_eq!(status.state, RunState::Idle);
    assert!(!status.restored);
    assert_eq!(status.current_index, 0);
    assert!(h.checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_checkpoint_for_other_period_is_discarded() {
    let h = Harness::new(&["A", "B"]);
    h.checkpoints
        .write(&checkpoint_for(&["A", "B"], "2024-04", 1, false, true))
        .unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    assert_eq!(engine.status().state, RunState::Idle);
    assert!(h.checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_checkpoint_for_changed_directory_is_discarded() {
    let h = Harness::new(&["A", "B", "C"]);
    h.checkpoints
        .write(&checkpoint_for(&["A", "X", "C"], "2024-05", 1, false, true))
        .unwrap();
    let scripted = ScriptedGenerator::open();

    let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
        .await
        .unwrap();
    let status = engine.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.results[1].customer_id, CustomerId::new("B"));
    assert!(h.checkpoints.load().unwrap().is_none());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dataset_without_rows_does_not_count_as_existing() {
    let empty_lists = GeneratedDataset {
        channel_a: Some(Vec::new()),
        detail: Some(Vec::new()),
        ..GeneratedDataset::default()
    };
    for dataset in [empty_lists, GeneratedDataset::default()] {
        let h = Harness::new(&["A"]);
        let scripted = ScriptedGenerator::returning(dataset);

        let engine = Engine::launch(h.deps(scripted.client.clone()), settings("2024-05"))
            .await
            .unwrap();
        let handle = engine.handle();
        handle.start().await.unwrap();
        let completed = wait_state(&handle, RunState::Completed).await;

        let result = &completed.results[0];
        assert_eq!(result.status, CustomerStatus::Success);
        assert!(result.existing_sections.is_none(), "no section holds rows");
        assert!(h.store.existing_sections(&period("2024-05")).unwrap().is_empty());

        // Nothing was stored, so the next run generates A again instead of skipping it.
        handle.start().await.unwrap();
        let again = wait_state(&handle, RunState::Completed).await;
        assert_eq!(again.results[0].status, CustomerStatus::Success);
        assert_eq!(scripted.client.calls(), ids(&["A", "A"]));
        engine.shutdown().await.unwrap();
    }
}
