//! The wire format between the scheduler and the worker pool.
//!
//! Each request carries the candidate transition, the marking it should
//! be evaluated against, and — for workflow nets — the trace so far and
//! the constraint formula. Each reply carries the available movements
//! plus the constraint evaluator's side lists. Frames are bincode over
//! the serde derives, so a marking decodes on the worker byte-exactly as
//! it was encoded on the scheduler.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constraint::{check_activation, Formula};
use crate::net::{Marking, Movement, Net};

/// One movement-calculation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    /// The candidate transition's name.
    pub transition: String,
    /// The marking to evaluate enablement against.
    pub marking: Marking,
    /// The trace so far; empty for plain Petri nets.
    pub trace: Vec<String>,
    /// The workflow constraint, when one applies.
    pub formula: Option<Formula>,
}

/// One movement-calculation reply.
///
/// An empty `movements` list means "not enabled"; in that case the side
/// lists are empty as well, since the constraint is only consulted once a
/// movement exists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reply {
    /// The available movements; callers take the first.
    pub movements: Vec<Movement>,
    /// Transitions the candidate's firing could newly enable.
    pub possibly_enabled: Vec<String>,
    /// Transitions the candidate's firing could newly disable.
    pub possibly_disabled: Vec<String>,
}

impl Request {
    /// Encodes the request into a frame.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("request frame encoding")
    }

    /// Decodes a request frame.
    pub fn decode(frame: &[u8]) -> Result<Self, String> {
        bincode::deserialize(frame).map_err(|error| error.to_string())
    }
}

impl Reply {
    /// Encodes the reply into a frame.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("reply frame encoding")
    }

    /// Decodes a reply frame.
    pub fn decode(frame: &[u8]) -> Result<Self, String> {
        bincode::deserialize(frame).map_err(|error| error.to_string())
    }
}

/// Builds the work function installed into the pool.
///
/// The net is captured once and cloned into every worker at startup; a
/// request only ships the marking (and trace and formula), never the
/// structure. The movement check runs first as it is the cheaper filter;
/// the constraint verdict is consulted only when a movement exists, and
/// an invalid verdict empties the reply entirely.
pub fn movement_task(net: Arc<Net>) -> impl Fn(&[u8]) -> Result<Vec<u8>, String> + Clone + Send + 'static {
    move |frame: &[u8]| {
        let request = Request::decode(frame)?;
        let movements = net
            .movements(&request.transition, &request.marking)
            .map_err(|error| error.to_string())?;
        if movements.is_empty() {
            return Ok(Reply::default().encode());
        }

        let reply = match &request.formula {
            Some(formula) => {
                let trace: HashSet<&str> = request.trace.iter().map(String::as_str).collect();
                let verdict = check_activation(formula, &request.transition, &trace);
                if verdict.allowed {
                    Reply {
                        movements: movements.into_vec(),
                        possibly_enabled: verdict.possibly_enabled,
                        possibly_disabled: verdict.possibly_disabled,
                    }
                } else {
                    Reply::default()
                }
            }
            None => Reply {
                movements: movements.into_vec(),
                ..Reply::default()
            },
        };
        Ok(reply.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> Net {
        let mut net = Net::new("ring");
        for index in 0..2 {
            net.add_place(&format!("p{}", index), u64::from(index == 0)).unwrap();
            net.add_transition(&format!("t{}", index)).unwrap();
        }
        net.add_input("p0", "t0", 1).unwrap();
        net.add_output("p1", "t0", 1).unwrap();
        net.add_input("p1", "t1", 1).unwrap();
        net.add_output("p0", "t1", 1).unwrap();
        net
    }

    fn run_task(net: &Arc<Net>, request: &Request) -> Reply {
        let task = movement_task(net.clone());
        Reply::decode(&task(&request.encode()).unwrap()).unwrap()
    }

    #[test]
    fn base_requests_report_movements() {
        let net = Arc::new(ring());
        let marking = net.get_marking();

        let enabled = run_task(
            &net,
            &Request {
                transition: "t0".to_string(),
                marking: marking.clone(),
                trace: Vec::new(),
                formula: None,
            },
        );
        assert_eq!(enabled.movements.len(), 1);
        assert_eq!(enabled.movements[0].start_places.get("p0"), 1);
        assert!(enabled.possibly_enabled.is_empty());

        let disabled = run_task(
            &net,
            &Request {
                transition: "t1".to_string(),
                marking,
                trace: Vec::new(),
                formula: None,
            },
        );
        assert!(disabled.movements.is_empty());
    }

    #[test]
    fn invalid_constraint_empties_the_reply() {
        let net = Arc::new(ring());
        let reply = run_task(
            &net,
            &Request {
                transition: "t0".to_string(),
                marking: net.get_marking(),
                trace: Vec::new(),
                formula: Some(Formula::precedes("t1", "t0")),
            },
        );
        // The movement exists but the verdict is negative, and a negative
        // verdict suppresses the side lists too.
        assert!(reply.movements.is_empty());
        assert!(reply.possibly_enabled.is_empty());
        assert!(reply.possibly_disabled.is_empty());
    }

    #[test]
    fn valid_constraint_carries_the_side_lists() {
        let net = Arc::new(ring());
        let reply = run_task(
            &net,
            &Request {
                transition: "t0".to_string(),
                marking: net.get_marking(),
                trace: Vec::new(),
                formula: Some(Formula::precedes("t0", "t1").and(Formula::not_precedes("t0", "t1"))),
            },
        );
        assert_eq!(reply.movements.len(), 1);
        assert_eq!(reply.possibly_enabled, vec!["t1".to_string()]);
        assert_eq!(reply.possibly_disabled, vec!["t1".to_string()]);
    }

    #[test]
    fn unknown_transitions_are_worker_errors() {
        let net = Arc::new(ring());
        let task = movement_task(net);
        let request = Request {
            transition: "missing".to_string(),
            marking: Marking::new(),
            trace: Vec::new(),
            formula: None,
        };
        assert!(task(&request.encode()).is_err());
    }
}
