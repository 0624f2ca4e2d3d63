//! Per-transition handlers and the dependency graph between them.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::debug;

use crate::net::{Net, TransitionId};

/// The scheduling state of a transition handler.
///
/// `Stale`, `Enqueued`, and `ToRetry` drive plain Petri nets. Workflow
/// nets replace `ToRetry` with the two constraint-derived hints
/// `PossiblyEnabled` and `PossiblyDisabled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    /// Not enabled at last check and nothing has changed since; the
    /// handler waits for a neighbor to wake it.
    Stale,
    /// An activation is queued or a movement request is in flight.
    Enqueued,
    /// A consuming neighbor committed while our request was in flight;
    /// the answer may be stale, so run again after it arrives.
    ToRetry,
    /// A neighbor's commit may have satisfied a `◁` constraint in our
    /// favor; if the marking check fails anyway, run again.
    PossiblyEnabled,
    /// A neighbor's commit invalidated a `~◁` constraint for us; the
    /// in-flight answer is moot, run again regardless.
    PossiblyDisabled,
}

/// One transition's handler: its scheduling state plus the neighbor sets
/// that decide who gets woken or flagged after it fires.
///
/// Neighbors are stored as sorted indices into the simulation's flat
/// handler table, so the cyclic dependency graph carries no owning
/// references.
pub struct TransitionHandler {
    pub(crate) name: String,
    pub(crate) state: HandlerState,
    /// Transitions consuming from any place this one produces into.
    pub(crate) consuming: Vec<TransitionId>,
    /// Transitions sharing at least one input place with this one.
    pub(crate) concurrent: Vec<TransitionId>,
}

impl TransitionHandler {
    /// The transition's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current scheduling state.
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Downstream neighbors, as indices into the handler table.
    pub fn consuming(&self) -> &[TransitionId] {
        &self.consuming
    }

    /// Competing neighbors, as indices into the handler table.
    pub fn concurrent(&self) -> &[TransitionId] {
        &self.concurrent
    }

    pub(crate) fn is_consuming(&self, other: TransitionId) -> bool {
        self.consuming.binary_search(&other).is_ok()
    }
}

/// Builds one handler per transition and wires the dependency graph.
///
/// A transition's consuming set is the union of the consumers of its
/// output places; its concurrent set is the union of the consumer groups
/// of its input places (which therefore contains the transition itself).
pub(crate) fn build_handlers(net: &Net) -> Vec<TransitionHandler> {
    let mut handlers: Vec<TransitionHandler> = net
        .transitions()
        .map(|name| TransitionHandler {
            name: name.to_string(),
            state: HandlerState::Stale,
            consuming: Vec::new(),
            concurrent: Vec::new(),
        })
        .collect();

    for id in 0..net.transition_count() {
        let consuming: BTreeSet<TransitionId> = net
            .transition_post_places(id)
            .flat_map(|place| net.place_consumers(place).iter().copied())
            .collect();
        handlers[id].consuming = consuming.into_iter().collect();
    }

    let mut concurrent: Vec<BTreeSet<TransitionId>> = vec![BTreeSet::new(); handlers.len()];
    for place in 0..net.place_count() {
        let consumers = net.place_consumers(place);
        for &transition in consumers {
            concurrent[transition].extend(consumers.iter().copied());
        }
    }
    for (id, group) in concurrent.into_iter().enumerate() {
        handlers[id].concurrent = group.into_iter().collect();
    }

    for handler in &handlers {
        debug!(
            "transition {} handler <-- concurrent: {}",
            handler.name,
            handler.concurrent.iter().map(|&id| net.transition_name(id)).join(", ")
        );
        debug!(
            "transition {} handler --> consuming: {}",
            handler.name,
            handler.consuming.iter().map(|&id| net.transition_name(id)).join(", ")
        );
    }

    handlers
}
