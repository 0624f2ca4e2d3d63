//! Declarative ordering constraints over the firing trace.
//!
//! A workflow net carries one boolean [`Formula`] built from precedence
//! atoms: `a ◁ b` ("a precedes b": b may only fire once a is in the
//! trace) and `a ~◁ b` ("a does not precede b": b may only fire while a
//! is absent from the trace), combined with `∧` and `∨`. The formula is
//! the output of an external parser; this module defines its shape and
//! its evaluation against a candidate transition.
//!
//! Besides the verdict, evaluation reports which transitions the
//! candidate's firing could flip: for every atom with the candidate on
//! the left, the right operand lands in `possibly_enabled` (for `◁`) or
//! `possibly_disabled` (for `~◁`). The scheduler uses those lists to
//! wake or re-flag neighbor handlers after a commit.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A boolean constraint formula over trace precedence atoms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formula {
    /// `left ◁ right`: for `right` to fire, `left` must be in the trace.
    Precedes(String, String),
    /// `left ~◁ right`: for `right` to fire, `left` must not be in the
    /// trace.
    NotPrecedes(String, String),
    /// Conjunction of two subformulas.
    And(Box<Formula>, Box<Formula>),
    /// Disjunction of two subformulas.
    Or(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// The atom `left ◁ right`.
    pub fn precedes(left: &str, right: &str) -> Self {
        Formula::Precedes(left.to_string(), right.to_string())
    }

    /// The atom `left ~◁ right`.
    pub fn not_precedes(left: &str, right: &str) -> Self {
        Formula::NotPrecedes(left.to_string(), right.to_string())
    }

    /// `self ∧ other`.
    pub fn and(self, other: Formula) -> Self {
        Formula::And(Box::new(self), Box::new(other))
    }

    /// `self ∨ other`.
    pub fn or(self, other: Formula) -> Self {
        Formula::Or(Box::new(self), Box::new(other))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Precedes(left, right) => write!(f, "{} ◁ {}", left, right),
            Formula::NotPrecedes(left, right) => write!(f, "{} ~◁ {}", left, right),
            Formula::And(left, right) => write!(f, "({}) ∧ ({})", left, right),
            Formula::Or(left, right) => write!(f, "({}) ∨ ({})", left, right),
        }
    }
}

/// The outcome of checking a formula for one candidate transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the candidate is allowed to fire under the formula.
    pub allowed: bool,
    /// Right operands of `◁` atoms with the candidate on the left: firing
    /// the candidate may newly satisfy their precedence.
    pub possibly_enabled: Vec<String>,
    /// Right operands of `~◁` atoms with the candidate on the left:
    /// firing the candidate invalidates their absence condition.
    pub possibly_disabled: Vec<String>,
}

/// Checks whether `candidate` may fire given the trace so far.
///
/// The trace is consulted only for membership, so callers pass it as a
/// set. The whole tree is visited — conjunction and disjunction do not
/// short-circuit — so the side lists cover every atom naming the
/// candidate on the left, independent of the verdict.
pub fn check_activation(formula: &Formula, candidate: &str, trace: &HashSet<&str>) -> Verdict {
    let mut verdict = Verdict::default();
    let allowed = eval(formula, candidate, trace, &mut verdict);
    verdict.allowed = allowed;
    verdict
}

fn eval(formula: &Formula, candidate: &str, trace: &HashSet<&str>, verdict: &mut Verdict) -> bool {
    match formula {
        Formula::Precedes(left, right) => {
            if left == candidate {
                verdict.possibly_enabled.push(right.clone());
            }
            if right != candidate {
                // Irrelevant to this candidate.
                true
            } else {
                trace.contains(left.as_str())
            }
        }
        Formula::NotPrecedes(left, right) => {
            if left == candidate {
                verdict.possibly_disabled.push(right.clone());
            }
            if right != candidate {
                true
            } else {
                !trace.contains(left.as_str())
            }
        }
        Formula::And(left, right) => {
            // Both sides are always visited so the side lists stay complete.
            let left = eval(left, candidate, trace, verdict);
            let right = eval(right, candidate, trace, verdict);
            left && right
        }
        Formula::Or(left, right) => {
            let left = eval(left, candidate, trace, verdict);
            let right = eval(right, candidate, trace, verdict);
            left || right
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace<'a>(names: &[&'a str]) -> HashSet<&'a str> {
        names.iter().copied().collect()
    }

    #[test]
    fn precedes_blocks_until_the_left_operand_fires() {
        let formula = Formula::precedes("a", "b");
        assert!(!check_activation(&formula, "b", &trace(&[])).allowed);
        assert!(check_activation(&formula, "b", &trace(&["a"])).allowed);
    }

    #[test]
    fn not_precedes_blocks_after_the_left_operand_fires() {
        let formula = Formula::not_precedes("a", "b");
        assert!(check_activation(&formula, "b", &trace(&[])).allowed);
        assert!(!check_activation(&formula, "b", &trace(&["a"])).allowed);
    }

    #[test]
    fn atoms_about_other_transitions_are_irrelevant() {
        let formula = Formula::precedes("a", "b").and(Formula::not_precedes("c", "d"));
        // Candidate "x" appears nowhere: both atoms evaluate true.
        let verdict = check_activation(&formula, "x", &trace(&[]));
        assert!(verdict.allowed);
        assert!(verdict.possibly_enabled.is_empty());
        assert!(verdict.possibly_disabled.is_empty());
    }

    #[test]
    fn side_lists_collect_right_operands_of_the_candidate() {
        let formula = Formula::precedes("a", "b")
            .and(Formula::not_precedes("a", "c"))
            .or(Formula::precedes("a", "d").and(Formula::precedes("e", "a")));
        let verdict = check_activation(&formula, "a", &trace(&["e"]));
        assert!(verdict.allowed);
        assert_eq!(verdict.possibly_enabled, vec!["b".to_string(), "d".to_string()]);
        assert_eq!(verdict.possibly_disabled, vec!["c".to_string()]);
    }

    #[test]
    fn side_lists_are_complete_even_when_the_verdict_is_negative() {
        // The left conjunct alone decides the verdict, but the atoms in
        // the right conjunct must still be collected.
        let formula = Formula::precedes("x", "a").and(Formula::not_precedes("a", "b"));
        let verdict = check_activation(&formula, "a", &trace(&[]));
        assert!(!verdict.allowed);
        assert_eq!(verdict.possibly_disabled, vec!["b".to_string()]);
    }

    #[test]
    fn side_lists_name_only_formula_transitions() {
        // Property: the side lists are subsets of the right operands that
        // pair with the candidate in the formula.
        let formula = Formula::precedes("a", "b").or(Formula::not_precedes("b", "a"));
        let verdict = check_activation(&formula, "a", &trace(&[]));
        assert_eq!(verdict.possibly_enabled, vec!["b".to_string()]);
        assert!(verdict.possibly_disabled.is_empty());
    }

    #[test]
    fn conjunction_and_disjunction_combine_verdicts() {
        let yes = Formula::precedes("a", "b"); // true once "a" fired
        let no = Formula::not_precedes("a", "b"); // false once "a" fired
        let fired = trace(&["a"]);
        assert!(!check_activation(&yes.clone().and(no.clone()), "b", &fired).allowed);
        assert!(check_activation(&yes.or(no), "b", &fired).allowed);
    }

    #[test]
    fn renders_in_the_surface_syntax() {
        let formula = Formula::precedes("a", "b").and(Formula::not_precedes("c", "d"));
        assert_eq!(formula.to_string(), "(a ◁ b) ∧ (c ~◁ d)");
    }
}
