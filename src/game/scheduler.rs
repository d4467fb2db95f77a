//! Phase Scheduler
//!
//! Drives the open turn through `planning → resolve → commit` and opens the
//! next turn after commit.
//!
//! ## Transitions
//!
//! | From     | To       | Trigger                           | Effect                                   |
//! |----------|----------|-----------------------------------|------------------------------------------|
//! | planning | resolve  | deadline, or every country ready  | remaining countries auto-ready           |
//! | resolve  | commit   | resolve timer                     | conflict resolver runs, results persisted |
//! | commit   | planning | deadline                          | turn committed, next turn created        |
//!
//! The scheduler is synchronous and takes `now` explicitly; the host owns the
//! clock and the real timers. A timer is identified by (turn id, phase), so a
//! timer that fires after its phase already ended is ignored.
//!
//! ## Recovery
//!
//! State is rebuilt from the persisted open turn. A phase whose deadline has
//! passed, is missing, or cannot be reconstructed (resolve keeps its timer in
//! memory only) is a recovery inconsistency and is advanced immediately.
//! Resolution is idempotent, so re-entering commit after a crash mid-resolve
//! converges on the same outcome. A rollover interrupted after the next turn
//! was inserted leaves two open turns; the older one is committed on startup.
//!
//! ## Revisions
//!
//! Each command or timer that changes observable state bumps
//! [`MatchContext::revision`] exactly once. The counter starts at zero in
//! every process.

use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{deadline_after, ConfigError, EngineConfig};
use crate::core::seed::SeedSource;
use crate::game::order::{self, OrderPayload, SubmitError, Submission};
use crate::game::replay::verify_turn;
use crate::game::resolve::resolve_turn;
use crate::game::snapshot::{project, PublicSnapshot};
use crate::game::state::{CountryId, Phase, Turn, TurnId};
use crate::store::{StoreError, TurnStore};

// =============================================================================
// TIMERS
// =============================================================================

/// Identity of a phase timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Turn the timer belongs to.
    pub turn_id: TurnId,
    /// Phase it ends.
    pub phase: Phase,
}

/// The timer the host should have armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTimer {
    /// Identity, passed back to [`PhaseScheduler::fire_timer`].
    pub key: TimerKey,
    /// When it fires.
    pub fires_at: DateTime<Utc>,
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Live state of the match beyond what the turn row holds.
#[derive(Clone, Debug)]
pub struct MatchContext {
    /// The open turn, as persisted.
    pub turn: Turn,
    /// Every country that has joined, submitted or declared readiness.
    pub countries: BTreeSet<CountryId>,
    /// Countries ready this turn.
    pub ready: BTreeSet<CountryId>,
    /// Countries with at least one order this turn.
    pub submitted: BTreeSet<CountryId>,
    /// Currently armed timer.
    pub timer: Option<PhaseTimer>,
    /// Bumped once per command that changes observable state.
    pub revision: u64,
}

impl MatchContext {
    /// Context for a turn with nobody known yet.
    pub fn new(turn: Turn) -> Self {
        Self {
            turn,
            countries: BTreeSet::new(),
            ready: BTreeSet::new(),
            submitted: BTreeSet::new(),
            timer: None,
            revision: 0,
        }
    }

    /// Every known country is ready. Never true with no countries.
    pub fn all_ready(&self) -> bool {
        !self.countries.is_empty() && self.countries.is_subset(&self.ready)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

// =============================================================================
// ERRORS AND REPORTS
// =============================================================================

/// Scheduler failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Persistence failure; the transition can be retried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Persisted turn state that cannot be resumed as is.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryInconsistency {
    /// The phase should already have ended.
    #[error("{phase} deadline {deadline} already passed")]
    DeadlinePassed {
        /// Phase.
        phase: Phase,
        /// Persisted deadline.
        deadline: DateTime<Utc>,
    },

    /// A phase that needs a persisted deadline has none.
    #[error("{phase} has no persisted deadline")]
    MissingDeadline {
        /// Phase.
        phase: Phase,
    },

    /// Interrupted during resolve; its timer is not persisted.
    #[error("resolve phase interrupted")]
    ResolveInterrupted,
}

/// A completed phase change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Number of the turn now open.
    pub turn_number: u32,
    /// Phase left.
    pub from: Phase,
    /// Phase entered.
    pub to: Phase,
}

/// How [`PhaseScheduler::bootstrap`] found the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Empty store; turn 1 created.
    Created,
    /// Open turn resumed with its persisted deadline.
    Resumed,
    /// Open turn could not be resumed as is and was advanced.
    Forced {
        /// What was wrong.
        reason: RecoveryInconsistency,
        /// The transition performed.
        transition: Transition,
    },
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// The turn engine.
pub struct PhaseScheduler<S: TurnStore> {
    store: S,
    config: EngineConfig,
    seeds: Box<dyn SeedSource>,
    ctx: MatchContext,
}

impl<S: TurnStore> PhaseScheduler<S> {
    /// Start on a store, creating turn 1 or recovering the open turn.
    pub fn bootstrap(
        mut store: S,
        config: EngineConfig,
        mut seeds: Box<dyn SeedSource>,
        now: DateTime<Utc>,
    ) -> Result<(Self, Recovery), EngineError> {
        config.validate()?;
        let countries: BTreeSet<CountryId> = store.countries()?.into_iter().collect();

        let mut open = store.open_turns()?;
        let Some(turn) = open.pop() else {
            let deadline = deadline_after(now, config.planning_duration);
            let turn = Turn::open(1, seeds.seed_for(1), now, deadline);
            store.insert_turn(&turn)?;

            let mut scheduler = Self { store, config, seeds, ctx: MatchContext::new(turn) };
            scheduler.ctx.countries = countries;
            scheduler.arm(Phase::Planning, deadline);
            info!("Opened turn 1, planning until {}", deadline);
            return Ok((scheduler, Recovery::Created));
        };

        let mut interrupted = Vec::with_capacity(open.len());
        for mut stale in open {
            warn!(
                stale = stale.number,
                current = turn.number,
                "Committing turn left open by an interrupted rollover"
            );
            stale.committed_at = Some(turn.created_at);
            store.update_turn(&stale)?;
            interrupted.push(stale.id);
        }

        let submitted = store.orders_for_turn(turn.id)?
            .into_iter()
            .map(|o| o.country_id)
            .collect();

        let mut scheduler = Self { store, config, seeds, ctx: MatchContext::new(turn) };
        scheduler.ctx.countries = countries;
        scheduler.ctx.submitted = submitted;
        if scheduler.ctx.turn.phase != Phase::Planning {
            scheduler.ctx.ready = scheduler.ctx.countries.clone();
        }
        for turn_id in interrupted {
            scheduler.audit(turn_id);
        }

        let turn = &scheduler.ctx.turn;
        info!(
            "Recovering turn {} in {} ({} countries known)",
            turn.number,
            turn.phase,
            scheduler.ctx.countries.len(),
        );

        let inconsistency = match (turn.phase, turn.phase_deadline) {
            (Phase::Resolve, _) => Some(RecoveryInconsistency::ResolveInterrupted),
            (phase, None) => Some(RecoveryInconsistency::MissingDeadline { phase }),
            (phase, Some(deadline)) if deadline <= now => {
                Some(RecoveryInconsistency::DeadlinePassed { phase, deadline })
            }
            (phase, Some(deadline)) => {
                scheduler.arm(phase, deadline);
                None
            }
        };

        if scheduler.ctx.turn.phase == Phase::Commit {
            scheduler.audit(scheduler.ctx.turn.id);
        }

        let Some(reason) = inconsistency else {
            return Ok((scheduler, Recovery::Resumed));
        };

        warn!(%reason, "Recovery inconsistency, forcing transition");
        let transition = scheduler.advance(now)?;
        scheduler.ctx.touch();
        if transition.to == Phase::Commit {
            scheduler.audit(scheduler.ctx.turn.id);
        }
        Ok((scheduler, Recovery::Forced { reason, transition }))
    }

    // ===== QUERIES =====

    /// Live context.
    pub fn context(&self) -> &MatchContext {
        &self.ctx
    }

    /// The open turn.
    pub fn turn(&self) -> &Turn {
        &self.ctx.turn
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give back the store, e.g. to simulate a restart.
    pub fn into_store(self) -> S {
        self.store
    }

    /// The timer the host should have armed.
    pub fn pending_timer(&self) -> Option<PhaseTimer> {
        self.ctx.timer
    }

    /// Current public snapshot.
    pub fn snapshot(&self) -> Result<PublicSnapshot, StoreError> {
        let provinces = self.store.provinces()?;
        Ok(project(&self.ctx, &provinces))
    }

    // ===== COMMANDS =====

    /// Make a country known. Returns false if it already was.
    pub fn join(&mut self, country: &CountryId) -> Result<bool, EngineError> {
        let added = self.register(country)?;
        if added {
            self.ctx.touch();
            info!(country = %country, "Country joined");
        }
        Ok(added)
    }

    /// Record an order for the open turn.
    pub fn submit_order(
        &mut self,
        country: &CountryId,
        payload: &OrderPayload,
    ) -> Result<Submission, SubmitError> {
        if self.ctx.turn.phase != Phase::Planning {
            return Err(SubmitError::PhaseViolation { phase: self.ctx.turn.phase });
        }
        order::validate(payload)?;

        // Known before the order is stored, so no stored order has an unknown country.
        let joined = self.register(country)?;
        let result = order::submit(
            &mut self.store,
            &self.ctx.turn,
            country,
            payload,
            self.config.default_resolution_cost,
        );
        if joined || result.is_ok() {
            self.ctx.touch();
        }

        let submission = result?;
        self.ctx.submitted.insert(country.clone());
        Ok(submission)
    }

    /// Declare a country done planning.
    ///
    /// Ignored outside planning. Closes planning early once every known
    /// country is ready.
    pub fn mark_ready(
        &mut self,
        country: &CountryId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, EngineError> {
        if self.ctx.turn.phase != Phase::Planning {
            debug!(country = %country, phase = %self.ctx.turn.phase, "Ready ignored outside planning");
            return Ok(None);
        }

        let mut changed = self.register(country)?;
        if self.ctx.ready.insert(country.clone()) {
            changed = true;
            debug!(country = %country, ready = self.ctx.ready.len(), "Country ready");
        }

        let result = if self.ctx.all_ready() {
            info!("All {} countries ready, closing planning early", self.ctx.countries.len());
            self.advance(now).map(Some)
        } else {
            Ok(None)
        };
        if changed || matches!(result, Ok(Some(_))) {
            self.ctx.touch();
        }
        result
    }

    /// Handle an expired timer. Stale keys are ignored.
    pub fn fire_timer(
        &mut self,
        key: TimerKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, EngineError> {
        match self.ctx.timer {
            Some(timer) if timer.key == key => {
                let transition = self.advance(now)?;
                self.ctx.touch();
                Ok(Some(transition))
            }
            _ => {
                debug!(turn_id = %key.turn_id, phase = %key.phase, "Stale timer ignored");
                Ok(None)
            }
        }
    }

    // ===== TRANSITIONS =====

    /// Move the open turn to its next phase.
    ///
    /// On error nothing in memory changes and the same call can be retried.
    fn advance(&mut self, now: DateTime<Utc>) -> Result<Transition, EngineError> {
        let from = self.ctx.turn.phase;
        match from {
            Phase::Planning => self.enter_resolve(now)?,
            Phase::Resolve => self.enter_commit(now)?,
            Phase::Commit => self.open_next_turn(now)?,
        }

        let transition = Transition {
            turn_number: self.ctx.turn.number,
            from,
            to: self.ctx.turn.phase,
        };
        info!(
            turn = transition.turn_number,
            "Phase {} -> {}", transition.from, transition.to
        );
        Ok(transition)
    }

    fn enter_resolve(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let mut turn = self.ctx.turn.clone();
        turn.phase = Phase::Resolve;
        turn.phase_deadline = None;
        self.store.update_turn(&turn)?;

        self.ctx.turn = turn;
        self.ctx.ready = self.ctx.countries.clone();
        self.arm(Phase::Resolve, deadline_after(now, self.config.resolve_duration));
        Ok(())
    }

    fn enter_commit(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let plan = resolve_turn(&mut self.store, &self.ctx.turn, self.config.default_resolution_cost)?;

        let deadline = deadline_after(now, self.config.commit_duration);
        let mut turn = self.ctx.turn.clone();
        turn.phase = Phase::Commit;
        turn.phase_deadline = Some(deadline);
        self.store.update_turn(&turn)?;

        self.ctx.turn = turn;
        self.arm(Phase::Commit, deadline);
        debug!(
            decided = plan.decisions.len(),
            contested = plan.contested_count(),
            "Results committed"
        );
        Ok(())
    }

    fn open_next_turn(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let current = self.ctx.turn.number;

        // The next turn is inserted before the current one is marked
        // committed; an interrupted attempt leaves it as the highest open turn.
        let next = match self.store.open_turn()? {
            Some(turn) if turn.number > current => turn,
            _ => {
                let number = current + 1;
                let deadline = deadline_after(now, self.config.planning_duration);
                let turn = Turn::open(number, self.seeds.seed_for(number), now, deadline);
                self.store.insert_turn(&turn)?;
                turn
            }
        };

        let mut done = self.ctx.turn.clone();
        done.committed_at = Some(now);
        self.store.update_turn(&done)?;

        let deadline = next.phase_deadline.unwrap_or(now);
        self.ctx.turn = next;
        self.ctx.ready.clear();
        self.ctx.submitted.clear();
        self.arm(Phase::Planning, deadline);
        Ok(())
    }

    fn register(&mut self, country: &CountryId) -> Result<bool, StoreError> {
        if self.ctx.countries.contains(country) {
            return Ok(false);
        }
        self.store.insert_country(country)?;
        self.ctx.countries.insert(country.clone());
        Ok(true)
    }

    fn arm(&mut self, phase: Phase, fires_at: DateTime<Utc>) {
        self.ctx.timer = Some(PhaseTimer {
            key: TimerKey { turn_id: self.ctx.turn.id, phase },
            fires_at,
        });
    }

    fn audit(&self, turn_id: TurnId) {
        match verify_turn(&self.store, turn_id) {
            Ok(report) if report.is_consistent() => {
                debug!(turn = report.turn_number, "Replay matches stored results");
            }
            Ok(report) => {
                for mismatch in &report.mismatches {
                    warn!(turn = report.turn_number, "Replay mismatch: {}", mismatch);
                }
            }
            Err(e) => warn!("Replay verification failed: {}", e),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::seed::FixedSeed;
    use crate::game::state::{
        Order, OrderId, OrderStatus, OrderType, Province, ProvinceId, ResolutionRecord,
    };
    use crate::store::MemoryStore;

    /// Memory store whose country table refuses new entries.
    struct NoNewCountries(MemoryStore);

    impl TurnStore for NoNewCountries {
        fn open_turns(&self) -> Result<Vec<Turn>, StoreError> {
            self.0.open_turns()
        }
        fn turn(&self, id: TurnId) -> Result<Option<Turn>, StoreError> {
            self.0.turn(id)
        }
        fn insert_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
            self.0.insert_turn(turn)
        }
        fn update_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
            self.0.update_turn(turn)
        }
        fn upsert_order(&mut self, order: &Order) -> Result<Option<Order>, StoreError> {
            self.0.upsert_order(order)
        }
        fn orders_for_turn(&self, turn_id: TurnId) -> Result<Vec<Order>, StoreError> {
            self.0.orders_for_turn(turn_id)
        }
        fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
            self.0.set_order_status(id, status)
        }
        fn province(&self, id: &ProvinceId) -> Result<Option<Province>, StoreError> {
            self.0.province(id)
        }
        fn upsert_province(&mut self, province: &Province) -> Result<(), StoreError> {
            self.0.upsert_province(province)
        }
        fn provinces(&self) -> Result<Vec<Province>, StoreError> {
            self.0.provinces()
        }
        fn put_resolution(&mut self, record: &ResolutionRecord) -> Result<(), StoreError> {
            self.0.put_resolution(record)
        }
        fn resolutions_for_turn(&self, turn_id: TurnId) -> Result<Vec<ResolutionRecord>, StoreError> {
            self.0.resolutions_for_turn(turn_id)
        }
        fn countries(&self) -> Result<Vec<CountryId>, StoreError> {
            self.0.countries()
        }
        fn insert_country(&mut self, id: &CountryId) -> Result<bool, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("country table full, cannot add {}", id),
            )))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            planning_duration: Duration::from_secs(60),
            resolve_duration: Duration::from_secs(5),
            commit_duration: Duration::from_secs(10),
            ..EngineConfig::default()
        }
    }

    fn start(now: DateTime<Utc>) -> PhaseScheduler<MemoryStore> {
        let (scheduler, recovery) = PhaseScheduler::bootstrap(
            MemoryStore::new(),
            config(),
            Box::new(FixedSeed("seed".into())),
            now,
        ).unwrap();
        assert_eq!(recovery, Recovery::Created);
        scheduler
    }

    fn fire(scheduler: &mut PhaseScheduler<MemoryStore>) -> Transition {
        let timer = scheduler.pending_timer().unwrap();
        scheduler.fire_timer(timer.key, timer.fires_at).unwrap().unwrap()
    }

    #[test]
    fn test_bootstrap_creates_first_turn() {
        let now = Utc::now();
        let scheduler = start(now);
        let turn = scheduler.turn();
        assert_eq!(turn.number, 1);
        assert_eq!(turn.phase, Phase::Planning);
        assert_eq!(turn.phase_deadline, Some(now + chrono::Duration::seconds(60)));

        let timer = scheduler.pending_timer().unwrap();
        assert_eq!(timer.key, TimerKey { turn_id: turn.id, phase: Phase::Planning });
        assert_eq!(Some(timer.fires_at), turn.phase_deadline);
    }

    #[test]
    fn test_full_cycle_by_timers() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let first = scheduler.turn().id;

        let t = fire(&mut scheduler);
        assert_eq!((t.from, t.to), (Phase::Planning, Phase::Resolve));
        assert_eq!(scheduler.turn().phase_deadline, None);
        assert_eq!(scheduler.store().turn(first).unwrap().unwrap().phase, Phase::Resolve);

        let t = fire(&mut scheduler);
        assert_eq!((t.from, t.to), (Phase::Resolve, Phase::Commit));
        assert!(scheduler.turn().phase_deadline.is_some());

        let t = fire(&mut scheduler);
        assert_eq!((t.from, t.to, t.turn_number), (Phase::Commit, Phase::Planning, 2));
        assert!(scheduler.store().turn(first).unwrap().unwrap().committed_at.is_some());
        assert_eq!(scheduler.store().open_turn().unwrap().unwrap().number, 2);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let planning = scheduler.pending_timer().unwrap();

        scheduler.join(&CountryId::from("a")).unwrap();
        scheduler.mark_ready(&CountryId::from("a"), now).unwrap();
        assert_eq!(scheduler.turn().phase, Phase::Resolve);

        let result = scheduler.fire_timer(planning.key, planning.fires_at).unwrap();
        assert!(result.is_none());
        assert_eq!(scheduler.turn().phase, Phase::Resolve);
    }

    #[test]
    fn test_all_ready_closes_planning_early() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let (a, b) = (CountryId::from("a"), CountryId::from("b"));
        scheduler.join(&a).unwrap();
        scheduler.join(&b).unwrap();

        assert!(scheduler.mark_ready(&a, now).unwrap().is_none());
        let t = scheduler.mark_ready(&b, now).unwrap().unwrap();
        assert_eq!(t.to, Phase::Resolve);

        let timer = scheduler.pending_timer().unwrap();
        assert_eq!(timer.key.phase, Phase::Resolve);
        assert_eq!(timer.fires_at, now + chrono::Duration::seconds(5));
    }

    #[test]
    fn test_ready_with_no_countries_never_triggers() {
        let scheduler = start(Utc::now());
        assert!(!scheduler.context().all_ready());
    }

    #[test]
    fn test_ready_outside_planning_is_noop() {
        let now = Utc::now();
        let mut scheduler = start(now);
        fire(&mut scheduler);
        let revision = scheduler.context().revision;

        assert!(scheduler.mark_ready(&CountryId::from("late"), now).unwrap().is_none());
        assert_eq!(scheduler.context().revision, revision);
        assert!(!scheduler.context().countries.contains(&CountryId::from("late")));
    }

    #[test]
    fn test_planning_timeout_auto_readies() {
        let now = Utc::now();
        let mut scheduler = start(now);
        scheduler.join(&CountryId::from("a")).unwrap();
        scheduler.join(&CountryId::from("b")).unwrap();
        scheduler.mark_ready(&CountryId::from("a"), now).unwrap();

        fire(&mut scheduler);
        assert!(scheduler.context().all_ready());
    }

    #[test]
    fn test_submit_outside_planning_rejected() {
        let now = Utc::now();
        let mut scheduler = start(now);
        fire(&mut scheduler);

        let result = scheduler.submit_order(
            &CountryId::from("a"),
            &OrderPayload::new(OrderType::ClaimTarget, "p1"),
        );
        assert!(matches!(result, Err(SubmitError::PhaseViolation { phase: Phase::Resolve })));
        assert!(scheduler.store().orders_for_turn(scheduler.turn().id).unwrap().is_empty());
        assert!(scheduler.context().countries.is_empty());
    }

    #[test]
    fn test_submit_registers_country() {
        let mut scheduler = start(Utc::now());
        let a = CountryId::from("a");
        scheduler.submit_order(&a, &OrderPayload::new(OrderType::Build, "p1")).unwrap();
        assert!(scheduler.context().countries.contains(&a));
        assert!(scheduler.context().submitted.contains(&a));
        assert_eq!(scheduler.store().countries().unwrap(), vec![a]);
    }

    #[test]
    fn test_resolution_runs_on_commit_entry() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let claim = OrderPayload::new(OrderType::ClaimTarget, "p1");
        scheduler.submit_order(&CountryId::from("a"), &claim).unwrap();
        scheduler.submit_order(&CountryId::from("b"), &claim).unwrap();

        fire(&mut scheduler);
        let province = scheduler.store().province(&ProvinceId::from("p1")).unwrap().unwrap();
        assert!(province.owner_country_id.is_none());
        assert!(province.is_contested);

        fire(&mut scheduler);
        let province = scheduler.store().province(&ProvinceId::from("p1")).unwrap().unwrap();
        assert!(province.owner_country_id.is_some());
        assert!(!province.is_contested);

        let orders = scheduler.store().orders_for_turn(scheduler.turn().id).unwrap();
        let applied = orders.iter().filter(|o| o.status == OrderStatus::Applied).count();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_next_turn_resets_readiness() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let a = CountryId::from("a");
        scheduler.submit_order(&a, &OrderPayload::new(OrderType::Build, "p1")).unwrap();
        scheduler.mark_ready(&a, now).unwrap();
        fire(&mut scheduler);
        fire(&mut scheduler);

        let ctx = scheduler.context();
        assert_eq!(ctx.turn.number, 2);
        assert!(ctx.ready.is_empty());
        assert!(ctx.submitted.is_empty());
        assert!(ctx.countries.contains(&a));
    }

    #[test]
    fn test_revision_increases() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let r0 = scheduler.snapshot().unwrap().version;
        scheduler.join(&CountryId::from("a")).unwrap();
        let r1 = scheduler.snapshot().unwrap().version;
        fire(&mut scheduler);
        let r2 = scheduler.snapshot().unwrap().version;
        assert!(r0 < r1 && r1 < r2);
    }

    #[test]
    fn test_recover_resumes_future_deadline() {
        let now = Utc::now();
        let mut scheduler = start(now);
        scheduler.submit_order(&CountryId::from("a"), &OrderPayload::new(OrderType::Build, "p1")).unwrap();
        let turn = scheduler.turn().clone();

        let (recovered, recovery) = PhaseScheduler::bootstrap(
            scheduler.into_store(),
            config(),
            Box::new(FixedSeed("seed".into())),
            now + chrono::Duration::seconds(1),
        ).unwrap();

        assert_eq!(recovery, Recovery::Resumed);
        assert_eq!(recovered.turn(), &turn);
        assert!(recovered.context().submitted.contains(&CountryId::from("a")));
        assert_eq!(recovered.pending_timer().unwrap().fires_at, turn.phase_deadline.unwrap());
    }

    #[test]
    fn test_recover_commit_keeps_everyone_ready() {
        let now = Utc::now();
        let mut scheduler = start(now);
        scheduler.join(&CountryId::from("a")).unwrap();
        scheduler.join(&CountryId::from("b")).unwrap();
        fire(&mut scheduler);
        fire(&mut scheduler);
        assert_eq!(scheduler.turn().phase, Phase::Commit);

        let before = scheduler.snapshot().unwrap();
        assert_eq!(before.ready.len(), 2);
        let deadline = scheduler.turn().phase_deadline.unwrap();

        let (recovered, recovery) = PhaseScheduler::bootstrap(
            scheduler.into_store(),
            config(),
            Box::new(FixedSeed("seed".into())),
            deadline - chrono::Duration::seconds(1),
        ).unwrap();

        assert_eq!(recovery, Recovery::Resumed);
        let after = recovered.snapshot().unwrap();
        assert_eq!(after.ready, before.ready);
        assert!(after.countries.iter().all(|c| c.ready));
    }

    #[test]
    fn test_recover_commits_interrupted_rollover() {
        let now = Utc::now();
        let mut scheduler = start(now);
        fire(&mut scheduler);
        fire(&mut scheduler);
        let first = scheduler.turn().id;
        let mut store = scheduler.into_store();

        // Next turn written, previous one never marked committed.
        let later = now + chrono::Duration::seconds(90);
        let next = Turn::open(2, "seed".into(), later, later + chrono::Duration::seconds(60));
        store.insert_turn(&next).unwrap();

        let (recovered, recovery) = PhaseScheduler::bootstrap(
            store,
            config(),
            Box::new(FixedSeed("seed".into())),
            later,
        ).unwrap();

        assert_eq!(recovery, Recovery::Resumed);
        assert_eq!(recovered.turn(), &next);
        assert_eq!(recovered.store().turn(first).unwrap().unwrap().committed_at, Some(later));
        assert_eq!(recovered.store().open_turns().unwrap(), vec![next]);
    }

    #[test]
    fn test_one_revision_per_command() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let a = CountryId::from("a");
        let r0 = scheduler.context().revision;

        // Registers, readies and closes planning in one call.
        scheduler.mark_ready(&a, now).unwrap().unwrap();
        assert_eq!(scheduler.context().revision, r0 + 1);

        fire(&mut scheduler);
        assert_eq!(scheduler.context().revision, r0 + 2);

        assert!(!scheduler.join(&a).unwrap());
        assert_eq!(scheduler.context().revision, r0 + 2);
    }

    #[test]
    fn test_failed_registration_stores_no_order() {
        let (mut scheduler, _) = PhaseScheduler::bootstrap(
            NoNewCountries(MemoryStore::new()),
            config(),
            Box::new(FixedSeed("seed".into())),
            Utc::now(),
        ).unwrap();

        let result = scheduler.submit_order(
            &CountryId::from("a"),
            &OrderPayload::new(OrderType::ClaimTarget, "p1"),
        );
        assert!(matches!(result, Err(SubmitError::Store(_))));
        assert!(scheduler.store().orders_for_turn(scheduler.turn().id).unwrap().is_empty());
        assert!(scheduler.store().provinces().unwrap().is_empty());
        assert!(scheduler.context().submitted.is_empty());
    }

    #[test]
    fn test_recover_past_deadline_forces_transition() {
        let now = Utc::now();
        let scheduler = start(now);
        let later = now + chrono::Duration::seconds(120);

        let (recovered, recovery) = PhaseScheduler::bootstrap(
            scheduler.into_store(),
            config(),
            Box::new(FixedSeed("seed".into())),
            later,
        ).unwrap();

        match recovery {
            Recovery::Forced { reason, transition } => {
                assert!(matches!(reason, RecoveryInconsistency::DeadlinePassed { phase: Phase::Planning, .. }));
                assert_eq!(transition.to, Phase::Resolve);
            }
            other => panic!("expected forced recovery, got {:?}", other),
        }
        assert_eq!(recovered.turn().phase, Phase::Resolve);
    }

    #[test]
    fn test_recover_mid_resolve_reruns_resolution() {
        let now = Utc::now();
        let mut scheduler = start(now);
        let claim = OrderPayload::new(OrderType::ClaimTarget, "p1");
        scheduler.submit_order(&CountryId::from("a"), &claim).unwrap();
        scheduler.submit_order(&CountryId::from("b"), &claim).unwrap();
        fire(&mut scheduler);

        let (recovered, recovery) = PhaseScheduler::bootstrap(
            scheduler.into_store(),
            config(),
            Box::new(FixedSeed("seed".into())),
            now,
        ).unwrap();

        assert!(matches!(
            recovery,
            Recovery::Forced { reason: RecoveryInconsistency::ResolveInterrupted, .. }
        ));
        assert_eq!(recovered.turn().phase, Phase::Commit);
        let turn_id = recovered.turn().id;
        assert_eq!(recovered.store().resolutions_for_turn(turn_id).unwrap().len(), 1);
        assert!(verify_turn(recovered.store(), turn_id).unwrap().is_consistent());
    }

    #[test]
    fn test_recover_missing_deadline() {
        let now = Utc::now();
        let mut store = MemoryStore::new();
        let mut turn = Turn::open(1, "seed".into(), now, now);
        turn.phase_deadline = None;
        store.insert_turn(&turn).unwrap();

        let (_, recovery) = PhaseScheduler::bootstrap(
            store,
            config(),
            Box::new(FixedSeed("seed".into())),
            now,
        ).unwrap();
        assert!(matches!(
            recovery,
            Recovery::Forced { reason: RecoveryInconsistency::MissingDeadline { phase: Phase::Planning }, .. }
        ));
    }
}
