//! End-to-end lifecycle tests for the workflow engine

use greenlight_engine::{EngineConfig, EngineError, ErrorKind, WorkflowEngine};
use greenlight_ledger::{ApplicationLedger, MemoryLedger, Outcome};
use greenlight_proposal::{EntityRef, ProposalState, RegistryError, SessionId};
use greenlight_test_utils::{payloads, ScriptedTracker};
use greenlight_tracker::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

fn engine_with(tracker: &Arc<ScriptedTracker>) -> (WorkflowEngine, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let config = EngineConfig::new()
        .with_retry_policy(RetryPolicy::immediate(3))
        .with_confirm_timeout(Duration::from_secs(60));
    let engine = WorkflowEngine::new(
        config,
        Arc::clone(tracker) as Arc<dyn greenlight_tracker::TrackerClient>,
        Arc::clone(&ledger) as Arc<dyn ApplicationLedger>,
    );
    (engine, ledger)
}

#[tokio::test]
async fn task_create_confirm_applies_and_records() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let proposal = engine
        .propose(session, payloads::task_create("Wire up CI", "Todo"), None)
        .unwrap();
    let event = engine.confirm(session, proposal.id, 0).await.unwrap();

    assert_eq!(event.state, ProposalState::Applied);
    let external_id = event.applied_entity_id.unwrap();
    assert_eq!(tracker.entity_status(&external_id).as_deref(), Some("Todo"));

    let record = ledger.find_by_proposal(proposal.id).await.unwrap().unwrap();
    assert_eq!(record.outcome, Outcome::Success);
    assert_eq!(record.external_mutation_id.as_deref(), Some(external_id.as_str()));

    let stored = engine.proposal(session, proposal.id).unwrap();
    assert_eq!(stored.state, ProposalState::Applied);
    assert_eq!(stored.version, 2);
    assert!(engine.entity_snapshot(&external_id).is_some());
}

#[tokio::test]
async fn status_change_confirm_moves_the_tracker_entity() {
    let tracker = Arc::new(ScriptedTracker::new());
    tracker.seed_entity("issue-42", "Todo");
    let (engine, _ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let proposal = engine
        .propose(
            session,
            payloads::status_change("Done"),
            Some(EntityRef::new("issue-42")),
        )
        .unwrap();
    let event = engine.confirm(session, proposal.id, 0).await.unwrap();

    assert_eq!(event.state, ProposalState::Applied);
    assert_eq!(event.applied_entity_id.as_deref(), Some("issue-42"));
    assert_eq!(tracker.entity_status("issue-42").as_deref(), Some("Done"));

    let shadow = engine.entity_snapshot("issue-42").unwrap();
    assert_eq!(shadow.last_known_status.as_deref(), Some("Done"));
}

#[tokio::test]
async fn reject_is_terminal_and_touches_nothing_external() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let proposal = engine
        .propose(session, payloads::issue_recommendation("Flaky test"), None)
        .unwrap();
    let event = engine.reject(session, proposal.id, 0).unwrap();

    assert_eq!(event.state, ProposalState::Rejected);
    assert_eq!(tracker.mutation_calls(), 0);
    assert!(ledger.is_empty());

    // Terminal: a later confirm cannot resurrect it.
    let err = engine.confirm(session, proposal.id, 1).await.unwrap_err();
    assert!(err.is_stale_view());
    assert_eq!(
        engine.proposal(session, proposal.id).unwrap().state,
        ProposalState::Rejected
    );
}

#[tokio::test]
async fn validation_failure_leaves_the_proposal_pending() {
    let tracker = Arc::new(ScriptedTracker::new());
    tracker.seed_entity("issue-7", "Todo");
    let (engine, _ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let proposal = engine
        .propose(
            session,
            payloads::status_change("Archived"),
            Some(EntityRef::new("issue-7")),
        )
        .unwrap();

    let err = engine.confirm(session, proposal.id, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(tracker.mutation_calls(), 0);

    let stored = engine.proposal(session, proposal.id).unwrap();
    assert_eq!(stored.state, ProposalState::Proposed);
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn foreign_session_calls_collapse_to_not_found() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, _ledger) = engine_with(&tracker);
    let owner = SessionId::new();
    let stranger = SessionId::new();

    let proposal = engine
        .propose(owner, payloads::task_create("Secret", "Todo"), None)
        .unwrap();

    let err = engine.confirm(stranger, proposal.id, 0).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Registry(RegistryError::NotFound)
    ));
    let err = engine.reject(stranger, proposal.id, 0).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Registry(RegistryError::NotFound)
    ));
    // Still confirmable by its owner.
    assert!(engine.confirm(owner, proposal.id, 0).await.is_ok());
}

#[tokio::test]
async fn targetless_status_change_is_rejected_at_propose() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, _ledger) = engine_with(&tracker);

    let err = engine
        .propose(SessionId::new(), payloads::status_change("Done"), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn lifecycle_events_reach_subscribers_in_order() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, _ledger) = engine_with(&tracker);
    let session = SessionId::new();
    let mut events = engine.subscribe();

    let proposal = engine
        .propose(session, payloads::task_create("Observable", "Todo"), None)
        .unwrap();
    engine.confirm(session, proposal.id, 0).await.unwrap();

    let states: Vec<ProposalState> = [
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
    ]
    .iter()
    .map(|e| e.state)
    .collect();
    assert_eq!(
        states,
        vec![
            ProposalState::Proposed,
            ProposalState::Confirming,
            ProposalState::Applied,
        ]
    );
}

#[tokio::test]
async fn failed_proposal_carries_error_kind_not_details() {
    let tracker = Arc::new(ScriptedTracker::new());
    tracker.seed_entity("issue-9", "Todo");
    tracker.script_failures([greenlight_tracker::TrackerError::Permanent(
        "internal: row 17 of shard 3".into(),
    )]);
    let (engine, ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let proposal = engine
        .propose(
            session,
            payloads::status_change("Done"),
            Some(EntityRef::new("issue-9")),
        )
        .unwrap();
    let event = engine.confirm(session, proposal.id, 0).await.unwrap();

    assert_eq!(event.state, ProposalState::Failed);
    assert_eq!(event.error_kind, Some(ErrorKind::TrackerPermanent));
    assert!(event.applied_entity_id.is_none());

    let record = ledger.find_by_proposal(proposal.id).await.unwrap().unwrap();
    assert_eq!(record.outcome, Outcome::Failure);
    assert_eq!(record.error_kind.as_deref(), Some("tracker_permanent"));
}

#[tokio::test]
async fn dismiss_and_end_session_clear_the_registry() {
    let tracker = Arc::new(ScriptedTracker::new());
    let (engine, _ledger) = engine_with(&tracker);
    let session = SessionId::new();

    let done = engine
        .propose(session, payloads::task_create("Done soon", "Todo"), None)
        .unwrap();
    let pending = engine
        .propose(session, payloads::task_create("Stays open", "Todo"), None)
        .unwrap();

    // Dismiss only works once terminal.
    assert!(matches!(
        engine.dismiss(session, done.id),
        Err(EngineError::Registry(RegistryError::NotTerminal(_)))
    ));
    engine.confirm(session, done.id, 0).await.unwrap();
    engine.dismiss(session, done.id).unwrap();

    assert_eq!(engine.pending(session), vec![engine
        .proposal(session, pending.id)
        .unwrap()]);
    assert_eq!(engine.end_session(session), 1);
    assert!(engine.pending(session).is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconciler_refreshes_externally_mutated_entities() {
    let tracker = Arc::new(ScriptedTracker::new());
    tracker.seed_entity("issue-5", "Todo");
    let ledger = Arc::new(MemoryLedger::new());
    let config = EngineConfig::new()
        .with_retry_policy(RetryPolicy::immediate(0))
        .with_reconcile_interval(Duration::from_millis(10));
    let engine = WorkflowEngine::new(
        config,
        Arc::clone(&tracker) as Arc<dyn greenlight_tracker::TrackerClient>,
        ledger,
    );
    let session = SessionId::new();

    let proposal = engine
        .propose(
            session,
            payloads::status_change("In Progress"),
            Some(EntityRef::new("issue-5")),
        )
        .unwrap();
    engine.confirm(session, proposal.id, 0).await.unwrap();
    assert_eq!(
        engine.entity_snapshot("issue-5").unwrap().last_known_status.as_deref(),
        Some("In Progress")
    );

    // Another actor moves the entity behind our back.
    tracker.seed_entity("issue-5", "Done");

    let _reconciler = engine.spawn_reconciler();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        engine.entity_snapshot("issue-5").unwrap().last_known_status.as_deref(),
        Some("Done")
    );
}
