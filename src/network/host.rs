//! Match Host
//!
//! Runs a [`PhaseScheduler`] on a dedicated task. Commands arrive over an
//! mpsc channel and are applied one at a time, so submissions, readiness and
//! timer expiries are serialized without locking the engine.
//!
//! ```text
//!  EngineHandle ──mpsc──►  host task  ──watch──────► latest snapshot
//!                           │    ▲     ──broadcast──► subscribers
//!                   sleep ──┘    └── TimerKey
//! ```
//!
//! The host keeps exactly one timer task alive, matching
//! [`PhaseScheduler::pending_timer`]. A failed transition is retried after
//! `retry_delay` with the same timer key.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::game::order::{OrderPayload, SubmitError, Submission};
use crate::game::scheduler::{EngineError, PhaseScheduler, PhaseTimer, TimerKey, Transition};
use crate::game::snapshot::PublicSnapshot;
use crate::game::state::CountryId;
use crate::store::{StoreError, TurnStore};

/// Command queue depth.
pub const COMMAND_BUFFER: usize = 256;

/// Snapshots a slow subscriber may fall behind before skipping ahead.
pub const SNAPSHOT_BUFFER: usize = 64;

/// Host failures as seen by a handle.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Order rejected by the ledger.
    #[error(transparent)]
    Rejected(#[from] SubmitError),

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The host task has stopped.
    #[error("match host has stopped")]
    Closed,
}

/// Commands processed by the host task.
#[derive(Debug)]
pub enum HostCommand {
    /// Register a country.
    Join {
        /// Country.
        country: CountryId,
        /// Whether it was new.
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    /// Submit an order.
    SubmitOrder {
        /// Submitting country.
        country: CountryId,
        /// The order.
        order: OrderPayload,
        /// Stored order.
        reply: oneshot::Sender<Result<Submission, SubmitError>>,
    },
    /// Declare readiness.
    MarkReady {
        /// Country.
        country: CountryId,
        /// Transition it triggered, if any.
        reply: oneshot::Sender<Result<Option<Transition>, EngineError>>,
    },
    /// Stop the host.
    Shutdown,
}

/// Cloneable handle to a running host.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    commands: mpsc::Sender<HostCommand>,
    snapshots: watch::Receiver<Arc<PublicSnapshot>>,
    pushes: broadcast::Sender<Arc<PublicSnapshot>>,
}

impl EngineHandle {
    /// Register a country. Returns false if it was already known.
    pub async fn join(&self, country: CountryId) -> Result<bool, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostCommand::Join { country, reply }).await?;
        Ok(rx.await.map_err(|_| HostError::Closed)??)
    }

    /// Submit an order for the open turn.
    pub async fn submit_order(
        &self,
        country: CountryId,
        order: OrderPayload,
    ) -> Result<Submission, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostCommand::SubmitOrder { country, order, reply }).await?;
        Ok(rx.await.map_err(|_| HostError::Closed)??)
    }

    /// Declare a country ready.
    pub async fn mark_ready(&self, country: CountryId) -> Result<Option<Transition>, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostCommand::MarkReady { country, reply }).await?;
        Ok(rx.await.map_err(|_| HostError::Closed)??)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<PublicSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PublicSnapshot>> {
        self.pushes.subscribe()
    }

    /// Watch the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<PublicSnapshot>> {
        self.snapshots.clone()
    }

    /// Ask the host to stop.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HostCommand::Shutdown).await;
    }

    async fn send(&self, command: HostCommand) -> Result<(), HostError> {
        self.commands.send(command).await.map_err(|_| HostError::Closed)
    }
}

/// Start a host task for a bootstrapped scheduler.
pub fn spawn_host<S>(engine: PhaseScheduler<S>) -> Result<(EngineHandle, JoinHandle<()>), StoreError>
where
    S: TurnStore + 'static,
{
    let initial = Arc::new(engine.snapshot()?);
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (snapshots_tx, snapshots_rx) = watch::channel(initial.clone());
    let (pushes_tx, _) = broadcast::channel(SNAPSHOT_BUFFER);
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let handle = EngineHandle {
        commands: commands_tx,
        snapshots: snapshots_rx,
        pushes: pushes_tx.clone(),
    };

    let retry_delay = engine.config().retry_delay;
    let host = Host {
        engine,
        snapshots: snapshots_tx,
        pushes: pushes_tx,
        timer_tx,
        armed: None,
        timer_task: None,
        published: initial.version,
        retry_delay,
    };
    let task = tokio::spawn(host.run(commands_rx, timer_rx));

    Ok((handle, task))
}

struct Host<S: TurnStore> {
    engine: PhaseScheduler<S>,
    snapshots: watch::Sender<Arc<PublicSnapshot>>,
    pushes: broadcast::Sender<Arc<PublicSnapshot>>,
    timer_tx: mpsc::UnboundedSender<TimerKey>,
    armed: Option<PhaseTimer>,
    timer_task: Option<JoinHandle<()>>,
    published: u64,
    retry_delay: Duration,
}

impl<S: TurnStore> Host<S> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HostCommand>,
        mut timers: mpsc::UnboundedReceiver<TimerKey>,
    ) {
        info!(turn = self.engine.turn().number, phase = %self.engine.turn().phase, "Match host started");
        self.sync_timer();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(HostCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(key) = timers.recv() => self.handle_timer(key),
            }
            self.publish();
            self.sync_timer();
        }

        info!("Match host stopped");
    }

    fn handle_command(&mut self, command: HostCommand) {
        let now = Utc::now();
        match command {
            HostCommand::Join { country, reply } => {
                let _ = reply.send(self.engine.join(&country));
            }
            HostCommand::SubmitOrder { country, order, reply } => {
                let result = self.engine.submit_order(&country, &order);
                if let Err(SubmitError::Store(ref e)) = result {
                    error!(country = %country, "Order could not be stored: {}", e);
                }
                let _ = reply.send(result);
            }
            HostCommand::MarkReady { country, reply } => {
                let result = self.engine.mark_ready(&country, now);
                if let Err(ref e) = result {
                    error!(country = %country, "Ready failed: {}", e);
                }
                let _ = reply.send(result);
            }
            HostCommand::Shutdown => {}
        }
    }

    fn handle_timer(&mut self, key: TimerKey) {
        match self.engine.fire_timer(key, Utc::now()) {
            Ok(_) => {}
            Err(e) => {
                error!(phase = %key.phase, "Transition failed, retrying in {:?}: {}", self.retry_delay, e);
                self.schedule(key, self.retry_delay);
            }
        }
    }

    /// Keep one timer task matching the engine's pending timer.
    fn sync_timer(&mut self) {
        let pending = self.engine.pending_timer();
        if pending.map(|t| t.key) == self.armed.map(|t| t.key) {
            return;
        }
        match pending {
            Some(timer) => {
                let delay = (timer.fires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                debug!(phase = %timer.key.phase, "Timer armed for {:?}", delay);
                self.schedule(timer.key, delay);
                self.armed = Some(timer);
            }
            None => {
                if let Some(task) = self.timer_task.take() {
                    task.abort();
                }
                self.armed = None;
            }
        }
    }

    fn schedule(&mut self, key: TimerKey, delay: Duration) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        let tx = self.timer_tx.clone();
        self.timer_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(key);
        }));
    }

    /// Push a snapshot if anything observable changed.
    fn publish(&mut self) {
        let snapshot = match self.engine.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Snapshot failed: {}", e);
                return;
            }
        };
        if snapshot.version == self.published {
            return;
        }

        self.published = snapshot.version;
        let snapshot = Arc::new(snapshot);
        self.snapshots.send_replace(snapshot.clone());
        if self.pushes.send(snapshot).is_err() {
            debug!("No snapshot subscribers");
        }
    }
}

impl<S: TurnStore> Drop for Host<S> {
    fn drop(&mut self) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
    }
}
