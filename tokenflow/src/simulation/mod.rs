//! The event-driven simulation: manager, handlers, and the scheduler.
//!
//! One cooperative scheduler thread drives one handler per transition.
//! A handler's task is at any moment in one of three phases: queued to
//! start (an activation-queue entry), awaiting a movement reply (a
//! request in flight at the worker pool), or idle. The step loop first
//! starts queued activations — serializing the current marking into a
//! request and submitting it — then collects pool replies and runs each
//! handler's response segment to completion. All mutation of the shared
//! marking, trace, statistics, and handler states happens inside those
//! segments on the scheduler thread, so commits never interleave.
//!
//! When a handler commits it wakes or flags its neighbors according to
//! the dependency graph: downstream consumers may have just been given
//! the tokens they were missing, competitors may only have lost tokens,
//! and — under a workflow constraint — the transitions named by the
//! evaluator's side lists may have flipped either way. Wake order is
//! shuffled so dense neighborhoods do not starve a fixed victim.

mod activate;
mod handler;

pub use handler::{HandlerState, TransitionHandler};

use std::sync::Arc;
use std::time::{Duration, Instant};

use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::constraint::Formula;
use crate::net::{Marking, Movement, Net, TransitionId};
use crate::protocol::{movement_task, Reply, Request};
use activate::ActivationQueue;
use tokenflow_pool::{WorkerPool, Reply as PoolReply};

/// Shared state of one simulation run: the marking, the trace, and the
/// statistics counters. Mutated only through `perform_movement`, which
/// runs on the scheduler thread between suspension points and is
/// therefore atomic.
pub struct SimulationManager {
    marking: Marking,
    trace: Vec<TransitionId>,
    events_count: u64,
    events_distribution: Vec<u64>,
    building_start: Instant,
    simulation_start: Option<Instant>,
}

impl SimulationManager {
    fn new(net: &Net) -> Self {
        Self {
            marking: net.get_marking(),
            trace: Vec::new(),
            events_count: 0,
            events_distribution: vec![0; net.transition_count()],
            building_start: Instant::now(),
            simulation_start: None,
        }
    }

    /// The current marking.
    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    /// The number of committed firings.
    pub fn events_count(&self) -> u64 {
        self.events_count
    }

    /// Commits one firing: subtracts the movement's pre-set, adds its
    /// post-set, appends to the trace, and bumps the counters.
    ///
    /// Callers must have checked `movement.start_places <= marking`
    /// against the current marking immediately before.
    fn perform_movement(&mut self, net: &Net, transition: TransitionId, movement: &Movement) {
        let after = &(&self.marking - &movement.start_places) + &movement.end_places;
        debug!(
            "[perform_movement] {} before: {} after: {}",
            net.transition_name(transition),
            self.marking,
            after
        );
        self.marking = after;
        self.trace.push(transition);
        self.events_count += 1;
        self.events_distribution[transition] += 1;
    }
}

/// The outcome of a run: counters, trace, and wall-clock figures.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    /// Total committed firings.
    pub events_count: u64,
    /// Firing count per transition, in declaration order.
    pub events_distribution: Vec<(String, u64)>,
    /// The committed firings in order.
    pub trace: Vec<String>,
    /// Time spent building handlers before the run started.
    pub building_time: Duration,
    /// Wall-clock time of the run itself.
    pub simulation_time: Duration,
}

impl SimulationReport {
    /// Throughput of the run.
    pub fn events_per_second(&self) -> f64 {
        let seconds = self.simulation_time.as_secs_f64();
        if seconds > 0.0 {
            self.events_count as f64 / seconds
        } else {
            0.0
        }
    }

    /// Logs the full statistics block.
    pub fn log_stats(&self) {
        info!(
            "{:?} building overhead, {} / {:?} = {} events per second",
            self.building_time,
            self.events_count,
            self.simulation_time,
            self.events_per_second()
        );
        info!(
            "transition handlers distribution: {}",
            self.events_distribution
                .iter()
                .filter(|(_, count)| *count > 0)
                .map(|(name, count)| format!("{}: {}", name, count))
                .join(", ")
        );
    }

    /// Logs only the events-per-second line, for benchmark harnesses.
    pub fn log_benchmark_line(&self) {
        info!("{}", self.events_per_second());
    }
}

/// An event-driven simulation of one net, optionally under a workflow
/// constraint.
///
/// Owns the handler table, the shared [`SimulationManager`] state, and
/// the worker pool. [`Simulation::run`] drives everything to the
/// deadline and returns the report; dropping the simulation stops the
/// pool.
pub struct Simulation {
    net: Arc<Net>,
    formula: Option<Formula>,
    manager: SimulationManager,
    handlers: Vec<TransitionHandler>,
    pool: WorkerPool,
    activations: ActivationQueue,
    replies: Vec<(usize, PoolReply)>,
    rng: SmallRng,
}

impl Simulation {
    /// Starts the worker pool and builds the handler table for `net`.
    ///
    /// Passing a formula selects the workflow variant; `None` runs the
    /// plain Petri state machine. The net must already be structurally
    /// valid — arc insertion reports unknown endpoints at build time.
    /// Failing to spawn a worker thread fails the build; no partial
    /// simulation is returned.
    pub fn new(net: Net, formula: Option<Formula>, workers: usize) -> Result<Self, std::io::Error> {
        let net = Arc::new(net);
        let pool = WorkerPool::start(workers, movement_task(net.clone()))?;
        let manager = SimulationManager::new(&net);
        let handlers = handler::build_handlers(&net);
        let activations = ActivationQueue::new(handlers.len());
        Ok(Self {
            net,
            formula,
            manager,
            handlers,
            pool,
            activations,
            replies: Vec::new(),
            rng: SmallRng::from_entropy(),
        })
    }

    /// Read access to the shared state, mainly for diagnostics.
    pub fn manager(&self) -> &SimulationManager {
        &self.manager
    }

    /// The handler table, indexed by transition declaration order.
    pub fn handlers(&self) -> &[TransitionHandler] {
        &self.handlers
    }

    /// Runs the simulation until `timeout` elapses, or earlier when the
    /// net is fully quiescent (no activation queued and no request in
    /// flight — nothing can ever fire again). Consumes the simulation;
    /// the pool is stopped before the report is returned.
    pub fn run(mut self, timeout: Duration) -> SimulationReport {
        let start = self.startup();
        let deadline = start + timeout;
        while Instant::now() < deadline && self.step_or_park(deadline) {}
        let simulation_time = start.elapsed();
        let building_time = start - self.manager.building_start;

        let net = &self.net;
        SimulationReport {
            events_count: self.manager.events_count,
            events_distribution: (0..net.transition_count())
                .map(|id| (net.transition_name(id).to_string(), self.manager.events_distribution[id]))
                .collect(),
            trace: self
                .manager
                .trace
                .iter()
                .map(|&id| net.transition_name(id).to_string())
                .collect(),
            building_time,
            simulation_time,
        }
    }

    /// Records the start time, then enqueues every handler in shuffled
    /// order with state `Enqueued`.
    fn startup(&mut self) -> Instant {
        let start = Instant::now();
        self.manager.simulation_start = Some(start);
        debug!("start simulation for {:?}", self.net.name());

        let mut order: Vec<usize> = (0..self.handlers.len()).collect();
        order.shuffle(&mut self.rng);
        for index in order {
            self.handlers[index].state = HandlerState::Enqueued;
            self.activations.schedule(index);
        }
        start
    }

    /// One pass of the scheduler: start queued activations, then collect
    /// replies, parking on the pool when nothing is immediately ready.
    ///
    /// Returns `false` once the simulation is quiescent.
    fn step_or_park(&mut self, deadline: Instant) -> bool {
        while let Some(index) = self.activations.pop() {
            self.begin_activation(index);
        }

        self.pool.poll(&mut self.replies);
        if self.replies.is_empty() {
            if self.pool.is_idle() && self.activations.is_empty() {
                return false;
            }
            let now = Instant::now();
            match deadline.checked_duration_since(now) {
                Some(remaining) => self.pool.await_events(Some(remaining)),
                None => return true,
            }
            self.pool.poll(&mut self.replies);
        }

        let mut replies = std::mem::take(&mut self.replies);
        for (index, reply) in replies.drain(..) {
            if Instant::now() >= deadline {
                break;
            }
            self.on_reply(index, reply);
        }
        replies.clear();
        self.replies = replies;
        true
    }

    /// The entry segment of a handler task: mark `Enqueued` and submit
    /// the movement request for the current marking.
    fn begin_activation(&mut self, index: usize) {
        self.handlers[index].state = HandlerState::Enqueued;
        debug!("transition {} handler: calculating movement", self.handlers[index].name);

        let trace = if self.formula.is_some() {
            self.manager
                .trace
                .iter()
                .map(|&id| self.net.transition_name(id).to_string())
                .collect()
        } else {
            Vec::new()
        };
        let request = Request {
            transition: self.handlers[index].name.clone(),
            marking: self.manager.marking.clone(),
            trace,
            formula: self.formula.clone(),
        };
        self.pool.submit(index, request.encode());
    }

    /// The response segment of a handler task.
    ///
    /// Every failure mode — worker error, malformed frame, empty movement
    /// list — reduces to "no movement available". The surviving movement
    /// is rechecked against the *current* marking, which may have moved
    /// on while the request was in flight.
    fn on_reply(&mut self, index: usize, reply: PoolReply) {
        let decoded = match reply {
            Ok(frame) => Reply::decode(&frame).unwrap_or_else(|error| {
                debug!(
                    "transition {} handler: malformed reply treated as no movement: {}",
                    self.handlers[index].name, error
                );
                Reply::default()
            }),
            Err(error) => {
                debug!(
                    "transition {} handler: worker error treated as no movement: {}",
                    self.handlers[index].name, error
                );
                Reply::default()
            }
        };
        let Reply {
            movements,
            possibly_enabled,
            possibly_disabled,
        } = decoded;

        let movement = movements
            .into_iter()
            .next()
            .filter(|movement| movement.start_places <= self.manager.marking);
        debug!(
            "transition {} handler: marking {} movement available: {}",
            self.handlers[index].name,
            self.manager.marking,
            movement.is_some()
        );

        if self.formula.is_some() {
            self.on_reply_workflow(index, movement, possibly_enabled, possibly_disabled);
        } else {
            self.on_reply_petri(index, movement);
        }
    }

    fn on_reply_petri(&mut self, index: usize, movement: Option<Movement>) {
        match movement {
            None if self.handlers[index].state == HandlerState::ToRetry => {
                // A consuming neighbor fired while we were in flight; the
                // answer may be stale, so go around again.
                debug!("transition {} handler: retrying", self.handlers[index].name);
                self.activations.schedule(index);
            }
            None => {
                debug!("transition {} handler: stale", self.handlers[index].name);
                self.handlers[index].state = HandlerState::Stale;
            }
            Some(movement) => self.commit_petri(index, movement),
        }
    }

    fn on_reply_workflow(
        &mut self,
        index: usize,
        movement: Option<Movement>,
        possibly_enabled: Vec<String>,
        possibly_disabled: Vec<String>,
    ) {
        let state = self.handlers[index].state;
        if state == HandlerState::PossiblyDisabled
            || (movement.is_none() && state == HandlerState::PossiblyEnabled)
        {
            // The constraint state changed under us; this answer is moot.
            debug!(
                "transition {} handler: possibly disabled, retrying",
                self.handlers[index].name
            );
            self.activations.schedule(index);
        } else if let Some(movement) = movement {
            self.commit_workflow(index, movement, possibly_enabled, possibly_disabled);
        } else {
            debug!("transition {} handler: stale", self.handlers[index].name);
            self.handlers[index].state = HandlerState::Stale;
        }
    }

    /// Commit path of the base variant: fire, re-spawn self, then the
    /// shuffled neighbor pass over competitors and consumers.
    fn commit_petri(&mut self, index: usize, movement: Movement) {
        self.manager.perform_movement(&self.net, index, &movement);
        self.activations.schedule(index);

        let handler = &self.handlers[index];
        let union: BTreeSet<TransitionId> = handler
            .concurrent
            .iter()
            .chain(handler.consuming.iter())
            .copied()
            .filter(|&neighbor| neighbor != index)
            .collect();
        let mut neighbors: Vec<TransitionId> = union.into_iter().collect();
        neighbors.shuffle(&mut self.rng);

        for neighbor in neighbors {
            match self.handlers[neighbor].state {
                HandlerState::Stale => {
                    debug!(
                        "transition {} handler => enqueue {}",
                        self.handlers[index].name, self.handlers[neighbor].name
                    );
                    self.handlers[neighbor].state = HandlerState::Enqueued;
                    self.activations.schedule(neighbor);
                }
                HandlerState::Enqueued if self.handlers[index].is_consuming(neighbor) => {
                    // Our fire may have produced the tokens it was
                    // missing; its in-flight answer is suspect.
                    debug!(
                        "transition {} handler => to retry {}",
                        self.handlers[index].name, self.handlers[neighbor].name
                    );
                    self.handlers[neighbor].state = HandlerState::ToRetry;
                }
                _ => {}
            }
        }

        self.handlers[index].state = HandlerState::Stale;
    }

    /// Commit path of the workflow variant: fire, re-spawn self, the
    /// shuffled enable pass over consumers plus the evaluator's
    /// possibly-enabled list, then the flag-only disable pass.
    fn commit_workflow(
        &mut self,
        index: usize,
        movement: Movement,
        possibly_enabled: Vec<String>,
        possibly_disabled: Vec<String>,
    ) {
        self.manager.perform_movement(&self.net, index, &movement);
        self.activations.schedule(index);

        let mut union: BTreeSet<TransitionId> = self.handlers[index].consuming.iter().copied().collect();
        for name in &possibly_enabled {
            if let Some(id) = self.net.transition_index(name) {
                union.insert(id);
            }
        }
        union.remove(&index);
        let mut neighbors: Vec<TransitionId> = union.into_iter().collect();
        neighbors.shuffle(&mut self.rng);

        for neighbor in neighbors {
            match self.handlers[neighbor].state {
                HandlerState::Stale => {
                    debug!(
                        "transition {} handler => enqueue {}",
                        self.handlers[index].name, self.handlers[neighbor].name
                    );
                    self.handlers[neighbor].state = HandlerState::Enqueued;
                    self.activations.schedule(neighbor);
                }
                HandlerState::Enqueued => {
                    debug!(
                        "transition {} handler => possibly enabled {}",
                        self.handlers[index].name, self.handlers[neighbor].name
                    );
                    self.handlers[neighbor].state = HandlerState::PossiblyEnabled;
                }
                _ => {}
            }
        }

        // Flag pass only: runs after the enable pass and never spawns.
        for name in &possibly_disabled {
            let Some(neighbor) = self.net.transition_index(name) else {
                continue;
            };
            if neighbor != index && self.handlers[neighbor].state == HandlerState::Enqueued {
                debug!(
                    "transition {} handler => possibly disabled {}",
                    self.handlers[index].name, self.handlers[neighbor].name
                );
                self.handlers[neighbor].state = HandlerState::PossiblyDisabled;
            }
        }

        self.handlers[index].state = HandlerState::Stale;
    }
}
