//! The scan-and-fire reference algorithm.
//!
//! No handlers, no workers: a single loop walks the transitions in
//! declaration order, fires the first enabled one, and restarts the scan.
//! Under a workflow constraint the verdict is checked inline against the
//! accumulated trace. The event-driven simulator is measured against
//! this.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::info;

use crate::constraint::{check_activation, Formula};
use crate::net::Net;

/// The outcome of a baseline run.
#[derive(Clone, Debug)]
pub struct BaselineReport {
    /// Total committed firings.
    pub events_count: u64,
    /// The committed firings in order.
    pub trace: Vec<String>,
    /// Wall-clock time of the run.
    pub simulation_time: Duration,
}

impl BaselineReport {
    /// Throughput of the run.
    pub fn events_per_second(&self) -> f64 {
        let seconds = self.simulation_time.as_secs_f64();
        if seconds > 0.0 {
            self.events_count as f64 / seconds
        } else {
            0.0
        }
    }

    /// Logs only the events-per-second line, for benchmark harnesses.
    pub fn log_benchmark_line(&self) {
        info!("{}", self.events_per_second());
    }
}

/// Runs the scan-and-fire loop until `timeout` elapses, or earlier once
/// a full scan fires nothing (the marking is dead).
pub fn run_baseline(net: &Net, formula: Option<&Formula>, timeout: Duration) -> BaselineReport {
    let start = Instant::now();
    let deadline = start + timeout;

    let mut marking = net.get_marking();
    let mut trace: Vec<String> = Vec::new();
    let mut trace_set: HashSet<String> = HashSet::new();
    let mut events_count = 0u64;

    'scan: while Instant::now() < deadline {
        let mut fired = false;
        for id in 0..net.transition_count() {
            if Instant::now() >= deadline {
                break 'scan;
            }
            let name = net.transition_name(id);
            let Some(movement) = net.movements_at(id, &marking).into_iter().next() else {
                continue;
            };
            if let Some(formula) = formula {
                let members: HashSet<&str> = trace_set.iter().map(String::as_str).collect();
                if !check_activation(formula, name, &members).allowed {
                    continue;
                }
            }

            marking = &(&marking - &movement.start_places) + &movement.end_places;
            trace.push(name.to_string());
            trace_set.insert(name.to_string());
            events_count += 1;
            fired = true;
            break;
        }
        if !fired {
            break;
        }
    }

    BaselineReport {
        events_count,
        trace,
        simulation_time: start.elapsed(),
    }
}
