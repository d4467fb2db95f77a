//! Restarting the engine on a file store.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use wego::core::seed::FixedSeed;
use wego::game::order::OrderPayload;
use wego::game::replay::verify_turn;
use wego::game::scheduler::{PhaseScheduler, Recovery, RecoveryInconsistency};
use wego::game::state::{CountryId, OrderType, Phase, ProvinceId, Turn};
use wego::{EngineConfig, FileStore, TurnStore};

struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        Scratch(std::env::temp_dir().join(format!("wego-recovery-{}.bin", uuid::Uuid::new_v4())))
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        planning_duration: Duration::from_secs(60),
        resolve_duration: Duration::from_secs(5),
        commit_duration: Duration::from_secs(30),
        ..EngineConfig::default()
    }
}

fn boot(path: &PathBuf, now: DateTime<Utc>) -> (PhaseScheduler<FileStore>, Recovery) {
    let store = FileStore::open(path).unwrap();
    PhaseScheduler::bootstrap(store, config(), Box::new(FixedSeed("restart".into())), now).unwrap()
}

fn fire(engine: &mut PhaseScheduler<FileStore>) {
    let timer = engine.pending_timer().unwrap();
    engine.fire_timer(timer.key, timer.fires_at).unwrap().unwrap();
}

#[test]
fn planning_survives_restart() {
    let scratch = Scratch::new();
    let now = Utc::now();

    let turn = {
        let (mut engine, recovery) = boot(&scratch.0, now);
        assert_eq!(recovery, Recovery::Created);
        engine.join(&CountryId::from("A")).unwrap();
        engine.submit_order(&CountryId::from("B"), &OrderPayload::new(OrderType::ClaimTarget, "P")).unwrap();
        engine.turn().clone()
    };

    let (engine, recovery) = boot(&scratch.0, now + chrono::Duration::seconds(10));
    assert_eq!(recovery, Recovery::Resumed);
    assert_eq!(engine.turn(), &turn);

    let ctx = engine.context();
    assert_eq!(ctx.countries.len(), 2);
    assert!(ctx.submitted.contains(&CountryId::from("B")));
    assert!(ctx.ready.is_empty());
    assert_eq!(engine.pending_timer().unwrap().fires_at, turn.phase_deadline.unwrap());
}

#[test]
fn crash_during_resolve_reruns_resolution() {
    let scratch = Scratch::new();
    let now = Utc::now();

    let turn_id = {
        let (mut engine, _) = boot(&scratch.0, now);
        let claim = OrderPayload::new(OrderType::ClaimTarget, "P");
        engine.submit_order(&CountryId::from("A"), &claim).unwrap();
        engine.submit_order(&CountryId::from("B"), &claim).unwrap();
        fire(&mut engine);
        assert_eq!(engine.turn().phase, Phase::Resolve);
        engine.turn().id
    };

    let (engine, recovery) = boot(&scratch.0, now);
    match recovery {
        Recovery::Forced { reason, transition } => {
            assert_eq!(reason, RecoveryInconsistency::ResolveInterrupted);
            assert_eq!(transition.to, Phase::Commit);
        }
        other => panic!("expected forced recovery, got {:?}", other),
    }

    let store = engine.store();
    let p = store.province(&ProvinceId::from("P")).unwrap().unwrap();
    assert!(p.owner_country_id.is_some());
    assert!(!p.is_contested);
    assert_eq!(store.resolutions_for_turn(turn_id).unwrap().len(), 1);
    assert!(verify_turn(store, turn_id).unwrap().is_consistent());
}

#[test]
fn expired_commit_opens_next_turn() {
    let scratch = Scratch::new();
    let now = Utc::now();

    let (first, winner) = {
        let (mut engine, _) = boot(&scratch.0, now);
        engine.submit_order(&CountryId::from("A"), &OrderPayload::new(OrderType::ClaimTarget, "P")).unwrap();
        fire(&mut engine);
        fire(&mut engine);
        assert_eq!(engine.turn().phase, Phase::Commit);
        (engine.turn().id, CountryId::from("A"))
    };

    let later = now + chrono::Duration::hours(1);
    let (engine, recovery) = boot(&scratch.0, later);
    assert!(matches!(
        recovery,
        Recovery::Forced { reason: RecoveryInconsistency::DeadlinePassed { phase: Phase::Commit, .. }, .. }
    ));

    assert_eq!(engine.turn().number, 2);
    assert_eq!(engine.turn().phase, Phase::Planning);
    assert!(engine.turn().phase_deadline.unwrap() > later);

    let committed = engine.store().turn(first).unwrap().unwrap();
    assert!(committed.committed_at.is_some());
    let p = engine.store().province(&ProvinceId::from("P")).unwrap().unwrap();
    assert_eq!(p.owner_country_id, Some(winner));
}

#[test]
fn interrupted_rollover_commits_previous_turn() {
    let scratch = Scratch::new();
    let now = Utc::now();

    let (first, mut store) = {
        let (mut engine, _) = boot(&scratch.0, now);
        engine.submit_order(&CountryId::from("A"), &OrderPayload::new(OrderType::ClaimTarget, "P")).unwrap();
        fire(&mut engine);
        fire(&mut engine);
        assert_eq!(engine.turn().phase, Phase::Commit);
        (engine.turn().id, engine.into_store())
    };

    // Stopped after writing turn 2 and before committing turn 1.
    let opened = now + chrono::Duration::seconds(90);
    store.insert_turn(&Turn::open(2, "restart".into(), opened, opened + chrono::Duration::seconds(60))).unwrap();
    drop(store);

    let (mut engine, recovery) = boot(&scratch.0, opened);
    assert_eq!(recovery, Recovery::Resumed);
    assert_eq!(engine.turn().number, 2);
    assert!(engine.store().turn(first).unwrap().unwrap().committed_at.is_some());

    fire(&mut engine);
    fire(&mut engine);
    fire(&mut engine);
    assert_eq!(engine.turn().number, 3);

    let open = engine.store().open_turns().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].number, 3);
}
