//! Tokenflow is an event-driven parallel simulator for Petri nets and
//! workflow nets.
//!
//! The code is organized in crates and modules that are meant to depend
//! as little as possible on each other.
//!
//! **Nets**: the [`net`] module holds the in-memory model — places,
//! transitions, weighted arcs — and the marking algebra the simulator
//! steps through.
//!
//! **Constraints**: the [`constraint`] module defines the declarative
//! ordering formula a workflow net layers over its firing trace, and its
//! evaluation for one candidate transition.
//!
//! **Worker pool**: the [`tokenflow_pool`] crate (re-exported as
//! [`pool`]) runs the CPU-bound enablement calculations on OS worker
//! threads so the scheduler never stalls on them; the [`protocol`]
//! module defines the byte frames that cross its channels.
//!
//! **Simulation**: the [`simulation`] module owns the shared marking,
//! trace, and statistics, and drives one cooperative handler per
//! transition; after each commit the dependency graph decides which
//! neighbors are woken or flagged for retry. The [`baseline`] module is
//! the scan-and-fire reference the event-driven algorithm is measured
//! against, and [`execute`] ties a run together from a [`Config`].
//!
//! # Examples
//!
//! The following runs a tiny cycle net for a quarter of a second and
//! prints its throughput.
//!
//! ```
//! use std::time::Duration;
//!
//! let mut net = tokenflow::Net::new("cycle");
//! net.add_place("p0", 1).unwrap();
//! net.add_place("p1", 0).unwrap();
//! net.add_transition("t0").unwrap();
//! net.add_transition("t1").unwrap();
//! net.add_input("p0", "t0", 1).unwrap();
//! net.add_output("p1", "t0", 1).unwrap();
//! net.add_input("p1", "t1", 1).unwrap();
//! net.add_output("p0", "t1", 1).unwrap();
//!
//! let config = tokenflow::Config {
//!     workers_num: 2,
//!     simulation_timeout: Duration::from_millis(250),
//!     ..tokenflow::Config::default()
//! };
//! let report = tokenflow::execute(net, None, &config).unwrap();
//! println!("{} events per second", report.events_per_second());
//! ```

#![forbid(missing_docs)]

pub mod baseline;
pub mod constraint;
pub mod execute;
pub mod net;
pub mod protocol;
pub mod simulation;

/// Re-export of the `tokenflow_pool` crate.
pub mod pool {
    pub use tokenflow_pool::*;
}

pub use baseline::{run_baseline, BaselineReport};
pub use constraint::Formula;
pub use execute::{execute, Config};
pub use net::{Marking, Movement, Net, NetError};
pub use simulation::{HandlerState, Simulation, SimulationReport, TransitionHandler};
