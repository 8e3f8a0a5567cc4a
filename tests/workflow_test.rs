mod common;

use std::sync::Arc;
use std::time::Duration;

use memepick::error::AppError;
use memepick::queue;
use memepick::queue::task::Task;
use memepick::workflow::meme::{resume_approval, run_meme_workflow};
use memepick::workflow::status::get_status;
use memepick::workflow::types::{Candidates, RunRecord, RunState, RunStatus, Variant};

use common::{next_request, test_config, test_state, FakeGenerator, FakeNotifier};

#[tokio::test]
async fn approved_run_returns_chosen_variant() {
    let tmp = tempfile::tempdir().unwrap();
    let generator = Arc::new(FakeGenerator::new());
    let (notifier, mut requests) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        generator.clone(),
        Arc::new(notifier),
    )
    .await;

    let record = RunRecord::new("cat wearing sunglasses", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    let run = {
        let state = Arc::clone(&state);
        let run_id = run_id.clone();
        tokio::spawn(async move { run_meme_workflow(&state, &run_id).await })
    };

    let request = next_request(&mut requests).await;
    assert_eq!(request.prompt, "cat wearing sunglasses");
    assert_ne!(request.variant1_url, request.variant2_url);
    assert_eq!(get_status(&state.runs, &run_id).await.unwrap(), RunStatus::Pending);

    state.tokens.resolve(&request.token_id, Some(2)).await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.variant1_reference, request.variant1_url);
    assert_eq!(result.variant2_reference, request.variant2_url);
    assert_eq!(result.selected_variant, Variant::Two);
    assert!(result.approved);

    // Exactly two generations per run
    assert_eq!(generator.calls(), 2);

    assert_eq!(
        get_status(&state.runs, &run_id).await.unwrap(),
        RunStatus::Complete(result)
    );

    // The decision was single-use
    let err = state
        .tokens
        .resolve(&request.token_id, Some(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TokenAlreadyResolved(_)));
}

#[tokio::test]
async fn run_without_decision_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, mut requests) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 1),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let record = RunRecord::new("cat wearing sunglasses", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    let err = run_meme_workflow(&state, &run_id).await.unwrap_err();
    assert!(matches!(err, AppError::ApprovalTimeout(1)));

    match get_status(&state.runs, &run_id).await.unwrap() {
        RunStatus::Error { error } => assert!(error.contains("No approval")),
        other => panic!("expected error status, got {other:?}"),
    }

    // A late click is rejected and does not change the run
    let request = next_request(&mut requests).await;
    let err = state
        .tokens
        .resolve(&request.token_id, Some(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TokenExpired(_)));
    assert!(matches!(
        get_status(&state.runs, &run_id).await.unwrap(),
        RunStatus::Error { .. }
    ));
}

#[tokio::test]
async fn invalid_variant_rejects_run() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, mut requests) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let record = RunRecord::new("cat wearing sunglasses", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    let run = {
        let state = Arc::clone(&state);
        let run_id = run_id.clone();
        tokio::spawn(async move { run_meme_workflow(&state, &run_id).await })
    };

    let request = next_request(&mut requests).await;
    let err = state
        .tokens
        .resolve(&request.token_id, Some(3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ApprovalRejected(_)));

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, AppError::ApprovalRejected(_)));
    assert!(matches!(
        get_status(&state.runs, &run_id).await.unwrap(),
        RunStatus::Error { .. }
    ));
}

#[tokio::test]
async fn one_failed_generation_fails_run_without_dispatch() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, _requests) = FakeNotifier::new();
    let notifier = Arc::new(notifier);
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::failing_on(2)),
        notifier.clone(),
    )
    .await;

    let record = RunRecord::new("p", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    let err = run_meme_workflow(&state, &run_id).await.unwrap_err();
    assert!(matches!(err, AppError::Generation(_)));
    assert!(notifier.history.lock().await.is_empty());
    assert!(state.tokens.is_empty().await);
    assert!(matches!(
        state.runs.get(&run_id).await.unwrap().state,
        RunState::Failed { .. }
    ));
}

#[tokio::test]
async fn dispatch_failure_fails_run_and_orphans_token() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, _requests) = FakeNotifier::failing();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let record = RunRecord::new("p", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    let err = run_meme_workflow(&state, &run_id).await.unwrap_err();
    assert!(matches!(err, AppError::Dispatch(_)));

    // The token was created before dispatch and is left to expire
    assert_eq!(state.tokens.len().await, 1);
    match get_status(&state.runs, &run_id).await.unwrap() {
        RunStatus::Error { error } => assert!(error.contains("Slack")),
        other => panic!("expected error status, got {other:?}"),
    }
}

#[tokio::test]
async fn same_submitter_runs_one_at_a_time() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, mut requests) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let mut run_ids = Vec::new();
    for submitter in ["alice", "alice", "bob"] {
        let record = RunRecord::new("p", submitter);
        let run_id = record.run_id.clone();
        state.runs.insert(record).await.unwrap();
        queue::submit(
            &state,
            Task::StartRun {
                run_id: run_id.clone(),
                submitter: submitter.to_string(),
            },
        );
        run_ids.push(run_id);
    }

    // alice's first run and bob's run prompt in parallel
    let first = next_request(&mut requests).await;
    let second = next_request(&mut requests).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(requests.try_recv().is_err(), "alice's second run must wait");
    assert_eq!(
        state.runs.get(&run_ids[1]).await.unwrap().state,
        RunState::Queued
    );

    let alice_first = match state.runs.get(&run_ids[0]).await.unwrap().state {
        RunState::AwaitingApproval { token_id, .. } => token_id,
        other => panic!("unexpected state {other:?}"),
    };
    assert!([&first.token_id, &second.token_id].contains(&&alice_first));

    state.tokens.resolve(&alice_first, Some(1)).await.unwrap();

    // Releasing alice's slot admits her queued run
    let third = next_request(&mut requests).await;
    assert_ne!(third.token_id, first.token_id);
    assert_ne!(third.token_id, second.token_id);
    assert!(matches!(
        state.runs.get(&run_ids[1]).await.unwrap().state,
        RunState::AwaitingApproval { .. }
    ));
}

#[tokio::test]
async fn suspended_run_resumes_after_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let deadline = chrono::Utc::now() + chrono::Duration::minutes(7);

    // A previous process left one suspended run and one cut off mid-generation
    let suspended_id;
    let interrupted_id;
    {
        let (notifier, _rx) = FakeNotifier::new();
        let state = test_state(
            test_config(tmp.path(), 600),
            Arc::new(FakeGenerator::new()),
            Arc::new(notifier),
        )
        .await;

        let suspended = RunRecord::new("cat wearing sunglasses", "alice");
        suspended_id = suspended.run_id.clone();
        state.runs.insert(suspended).await.unwrap();
        state
            .runs
            .transition(&suspended_id, RunState::Generating)
            .await
            .unwrap();
        state
            .runs
            .transition(
                &suspended_id,
                RunState::AwaitingApproval {
                    candidates: Candidates {
                        variant1_url: "u1".to_string(),
                        variant2_url: "u2".to_string(),
                    },
                    token_id: "tok_persisted".to_string(),
                    deadline,
                },
            )
            .await
            .unwrap();

        let interrupted = RunRecord::new("p", "bob");
        interrupted_id = interrupted.run_id.clone();
        state.runs.insert(interrupted).await.unwrap();
        state
            .runs
            .transition(&interrupted_id, RunState::Generating)
            .await
            .unwrap();
    }

    let (notifier, _rx) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;
    queue::startup::recover_runs(&state).await;

    assert!(matches!(
        state.runs.get(&interrupted_id).await.unwrap().state,
        RunState::Failed { .. }
    ));

    let token = state.tokens.get("tok_persisted").await.unwrap();
    assert_eq!(token.deadline, deadline);

    state.tokens.resolve("tok_persisted", Some(2)).await.unwrap();

    let mut status = RunStatus::Pending;
    for _ in 0..50 {
        status = get_status(&state.runs, &suspended_id).await.unwrap();
        if status != RunStatus::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    match status {
        RunStatus::Complete(result) => {
            assert_eq!(result.variant1_reference, "u1");
            assert_eq!(result.variant2_reference, "u2");
            assert_eq!(result.selected_variant, Variant::Two);
        }
        other => panic!("expected completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn resume_requires_awaiting_state() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, _rx) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let record = RunRecord::new("p", "alice");
    let run_id = record.run_id.clone();
    state.runs.insert(record).await.unwrap();

    assert!(matches!(
        resume_approval(&state, &run_id).await.unwrap_err(),
        AppError::Internal(_)
    ));
}

#[tokio::test]
async fn shutdown_fails_only_runs_cut_off_mid_step() {
    let tmp = tempfile::tempdir().unwrap();
    let (notifier, _rx) = FakeNotifier::new();
    let state = test_state(
        test_config(tmp.path(), 600),
        Arc::new(FakeGenerator::new()),
        Arc::new(notifier),
    )
    .await;

    let generating = RunRecord::new("p", "alice");
    let generating_id = generating.run_id.clone();
    state.runs.insert(generating).await.unwrap();
    state
        .runs
        .transition(&generating_id, RunState::Generating)
        .await
        .unwrap();

    let awaiting = RunRecord::new("p", "bob");
    let awaiting_id = awaiting.run_id.clone();
    state.runs.insert(awaiting).await.unwrap();
    let awaiting_state = RunState::AwaitingApproval {
        candidates: Candidates {
            variant1_url: "u1".to_string(),
            variant2_url: "u2".to_string(),
        },
        token_id: "tok_kept".to_string(),
        deadline: chrono::Utc::now() + chrono::Duration::minutes(5),
    };
    state
        .runs
        .transition(&awaiting_id, awaiting_state.clone())
        .await
        .unwrap();

    memepick::shutdown::graceful_shutdown(&state).await;

    match state.runs.get(&generating_id).await.unwrap().state {
        RunState::Failed { error } => assert_eq!(error, memepick::shutdown::SHUTDOWN_ERROR),
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(
        state.runs.get(&awaiting_id).await.unwrap().state,
        awaiting_state
    );
}
