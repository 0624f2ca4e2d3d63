//! Starts a simulation from configuration information.

use std::time::Duration;

use tracing::info;

use crate::baseline::run_baseline;
use crate::constraint::Formula;
use crate::net::Net;
use crate::simulation::{Simulation, SimulationReport};

/// Knobs recognized by [`execute`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of the worker pool.
    pub workers_num: usize,
    /// Wall-clock budget of the run.
    pub simulation_timeout: Duration,
    /// After the event-driven run, also execute the baseline algorithm
    /// on the same net and timeout and log its events/sec.
    pub is_comparing_with_baseline_algorithm: bool,
    /// Verbose tracing of handler state transitions, neighbor sets, and
    /// pre/post markings. The library only emits `debug!` events; the
    /// caller's subscriber decides whether they are shown.
    pub is_debug: bool,
    /// Emit only the single events-per-second line instead of the full
    /// stats block.
    pub is_benchmarking: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers_num: 4,
            simulation_timeout: Duration::from_secs(5),
            is_comparing_with_baseline_algorithm: false,
            is_debug: false,
            is_benchmarking: false,
        }
    }
}

impl Config {
    /// Constructs a configuration by parsing supplied text arguments.
    ///
    /// Most commonly, this uses `std::env::args().skip(1)` as the
    /// supplied iterator.
    pub fn from_args<I: Iterator<Item = String>>(args: I) -> Result<Config, String> {
        let mut opts = getopts::Options::new();
        opts.optopt("w", "workers", "size of the worker pool", "NUM");
        opts.optopt("t", "timeout", "simulation wall-clock timeout in seconds", "SECS");
        opts.optflag("c", "compare-baseline", "also run the baseline algorithm afterwards");
        opts.optflag("d", "debug", "verbose handler state tracing");
        opts.optflag("b", "benchmark", "emit only the events-per-second line");

        opts.parse(args).map_err(|e| format!("{:?}", e)).map(|matches| {
            let defaults = Config::default();
            let workers_num = matches
                .opt_str("w")
                .map(|x| x.parse().unwrap_or(defaults.workers_num))
                .unwrap_or(defaults.workers_num);
            let simulation_timeout = matches
                .opt_str("t")
                .and_then(|x| x.parse::<f64>().ok())
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.simulation_timeout);

            Config {
                workers_num,
                simulation_timeout,
                is_comparing_with_baseline_algorithm: matches.opt_present("c"),
                is_debug: matches.opt_present("d"),
                is_benchmarking: matches.opt_present("b"),
            }
        })
    }
}

/// Runs the event-driven simulation of `net` to the configured deadline,
/// logs statistics, and optionally follows with a baseline comparison
/// run on the same net and timeout.
///
/// Passing a formula selects the workflow variant. Returns the report of
/// the event-driven run, or the error that kept the worker pool from
/// starting; the pool is stopped before any statistic is logged.
pub fn execute(
    net: Net,
    formula: Option<Formula>,
    config: &Config,
) -> Result<SimulationReport, std::io::Error> {
    let comparison = config
        .is_comparing_with_baseline_algorithm
        .then(|| (net.clone(), formula.clone()));

    let simulation = Simulation::new(net, formula.clone(), config.workers_num)?;
    let report = simulation.run(config.simulation_timeout);

    if config.is_benchmarking {
        report.log_benchmark_line();
    } else {
        if let Some(formula) = &formula {
            info!("constraint formula: {}", formula);
            info!("simulation trace: {:?}", report.trace);
        }
        report.log_stats();
    }

    if let Some((net, formula)) = comparison {
        let baseline = run_baseline(&net, formula.as_ref(), config.simulation_timeout);
        if config.is_benchmarking {
            baseline.log_benchmark_line();
        } else {
            info!(
                "baseline: {} / {:?} = {} events per second",
                baseline.events_count,
                baseline.simulation_time,
                baseline.events_per_second()
            );
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_args_parses_every_option() {
        let args = ["-w", "8", "-t", "2.5", "-c", "-d", "-b"]
            .iter()
            .map(|s| s.to_string());
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.workers_num, 8);
        assert_eq!(config.simulation_timeout, Duration::from_secs_f64(2.5));
        assert!(config.is_comparing_with_baseline_algorithm);
        assert!(config.is_debug);
        assert!(config.is_benchmarking);
    }

    #[test]
    fn from_args_defaults_match_default() {
        let config = Config::from_args(std::iter::empty()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.workers_num, defaults.workers_num);
        assert_eq!(config.simulation_timeout, defaults.simulation_timeout);
        assert!(!config.is_comparing_with_baseline_algorithm);
        assert!(!config.is_debug);
        assert!(!config.is_benchmarking);
    }

    #[test]
    fn from_args_rejects_unknown_options() {
        let args = ["--frobnicate"].iter().map(|s| s.to_string());
        assert!(Config::from_args(args).is_err());
    }
}
