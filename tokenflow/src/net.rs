//! In-memory Petri nets and the marking algebra the simulator runs on.
//!
//! A net is a bipartite graph of named places and transitions joined by
//! weighted arcs; a [`Marking`] assigns a count of indistinguishable
//! tokens to each place. Markings form a partially ordered commutative
//! monoid: `a <= b` is pointwise inclusion, `&a + &b` adds counts, and
//! `&a - &b` is defined only when `b <= a`. Firing a transition is the
//! subtraction of its pre-multiset followed by the addition of its
//! post-multiset, packaged as a [`Movement`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Index of a transition in a net's declaration order.
pub type TransitionId = usize;

/// Index of a place in a net's declaration order.
pub type PlaceId = usize;

/// A structural error while assembling or querying a net.
///
/// All of these are fatal at build time; a net that produced one is not
/// simulated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// An arc or query referenced a place that was never added.
    #[error("unknown place {0:?}")]
    UnknownPlace(String),
    /// An arc or query referenced a transition that was never added.
    #[error("unknown transition {0:?}")]
    UnknownTransition(String),
    /// A query referenced a name that is neither a place nor a transition.
    #[error("unknown node {0:?}")]
    UnknownNode(String),
    /// A place or transition reused a name already taken.
    #[error("duplicate node name {0:?}")]
    DuplicateName(String),
}

/// A multiset of tokens over place names.
///
/// Backed by a `BTreeMap` so iteration follows the total order over the
/// opaque names and the serialized form is deterministic. Places with a
/// zero count are not stored; `get` on an absent place is zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marking {
    counts: BTreeMap<String, u64>,
}

impl Marking {
    /// An empty marking.
    pub fn new() -> Self {
        Self::default()
    }

    /// The token count at `place`.
    pub fn get(&self, place: &str) -> u64 {
        self.counts.get(place).copied().unwrap_or(0)
    }

    /// Sets the token count at `place`; zero removes the entry.
    pub fn set(&mut self, place: &str, tokens: u64) {
        if tokens == 0 {
            self.counts.remove(place);
        } else {
            self.counts.insert(place.to_string(), tokens);
        }
    }

    /// Iterates the non-empty places in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// The total number of tokens across all places.
    pub fn tokens(&self) -> u64 {
        self.counts.values().sum()
    }

    /// True when no place holds a token.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Pointwise inclusion: every count in `self` is covered by `other`.
    pub fn le(&self, other: &Self) -> bool {
        self.counts
            .iter()
            .all(|(place, count)| *count <= other.get(place))
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        use std::cmp::Ordering;
        match (self.le(other), other.le(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl Add<&Marking> for &Marking {
    type Output = Marking;

    fn add(self, rhs: &Marking) -> Marking {
        let mut sum = self.clone();
        for (place, count) in rhs.iter() {
            let total = sum.get(place) + count;
            sum.set(place, total);
        }
        sum
    }
}

impl Sub<&Marking> for &Marking {
    type Output = Marking;

    /// Subtracts a dominated marking.
    ///
    /// # Panics
    ///
    /// Panics when `rhs` is not included in `self`. Reaching this from the
    /// simulator means the enablement recheck was skipped, which is a bug,
    /// not a recoverable condition.
    fn sub(self, rhs: &Marking) -> Marking {
        let mut difference = self.clone();
        for (place, count) in rhs.iter() {
            let have = difference.get(place);
            assert!(
                count <= have,
                "marking underflow at place {:?}: {} < {}",
                place,
                have,
                count
            );
            difference.set(place, have - count);
        }
        difference
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (place, count)) in self.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", place, count)?;
        }
        write!(f, "}}")
    }
}

/// The pre/post multisets of one firing of a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Tokens consumed from the input places.
    pub start_places: Marking,
    /// Tokens produced into the output places.
    pub end_places: Marking,
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} to {}", self.start_places, self.end_places)
    }
}

/// The movements a transition offers against one marking.
///
/// For the black-token nets handled here there is at most one.
pub type Movements = SmallVec<[Movement; 1]>;

#[derive(Clone, Debug)]
struct Place {
    name: String,
    tokens: u64,
    /// Transitions with an input arc from this place.
    consumers: Vec<TransitionId>,
    /// Transitions with an output arc into this place.
    producers: Vec<TransitionId>,
}

#[derive(Clone, Debug)]
struct Transition {
    name: String,
    /// Input arcs as `(place, weight)`.
    pre: Vec<(PlaceId, u64)>,
    /// Output arcs as `(place, weight)`.
    post: Vec<(PlaceId, u64)>,
}

/// A Petri net: named places and transitions joined by weighted arcs.
#[derive(Clone, Debug)]
pub struct Net {
    name: String,
    places: Vec<Place>,
    transitions: Vec<Transition>,
    place_ids: HashMap<String, PlaceId>,
    transition_ids: HashMap<String, TransitionId>,
}

impl Net {
    /// An empty net.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            places: Vec::new(),
            transitions: Vec::new(),
            place_ids: HashMap::new(),
            transition_ids: HashMap::new(),
        }
    }

    /// The net's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a place holding `tokens` initial tokens.
    pub fn add_place(&mut self, name: &str, tokens: u64) -> Result<(), NetError> {
        self.check_fresh(name)?;
        self.place_ids.insert(name.to_string(), self.places.len());
        self.places.push(Place {
            name: name.to_string(),
            tokens,
            consumers: Vec::new(),
            producers: Vec::new(),
        });
        Ok(())
    }

    /// Adds a transition with no arcs yet.
    pub fn add_transition(&mut self, name: &str) -> Result<(), NetError> {
        self.check_fresh(name)?;
        self.transition_ids
            .insert(name.to_string(), self.transitions.len());
        self.transitions.push(Transition {
            name: name.to_string(),
            pre: Vec::new(),
            post: Vec::new(),
        });
        Ok(())
    }

    /// Adds an input arc: `transition` consumes `weight` tokens from
    /// `place`. Repeated arcs accumulate their weights.
    pub fn add_input(&mut self, place: &str, transition: &str, weight: u64) -> Result<(), NetError> {
        let (place_id, transition_id) = self.arc_endpoints(place, transition)?;
        merge_arc(&mut self.transitions[transition_id].pre, place_id, weight);
        let consumers = &mut self.places[place_id].consumers;
        if !consumers.contains(&transition_id) {
            consumers.push(transition_id);
        }
        Ok(())
    }

    /// Adds an output arc: `transition` produces `weight` tokens into
    /// `place`. Repeated arcs accumulate their weights.
    pub fn add_output(&mut self, place: &str, transition: &str, weight: u64) -> Result<(), NetError> {
        let (place_id, transition_id) = self.arc_endpoints(place, transition)?;
        merge_arc(&mut self.transitions[transition_id].post, place_id, weight);
        let producers = &mut self.places[place_id].producers;
        if !producers.contains(&transition_id) {
            producers.push(transition_id);
        }
        Ok(())
    }

    /// Place names in declaration order.
    pub fn places(&self) -> impl Iterator<Item = &str> {
        self.places.iter().map(|place| place.name.as_str())
    }

    /// Transition names in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = &str> {
        self.transitions.iter().map(|transition| transition.name.as_str())
    }

    /// The number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// The name of the transition at `id`.
    pub fn transition_name(&self, id: TransitionId) -> &str {
        &self.transitions[id].name
    }

    /// Looks a transition up by name.
    pub fn transition_index(&self, name: &str) -> Option<TransitionId> {
        self.transition_ids.get(name).copied()
    }

    /// Downstream neighbors of a node, for a place or transition name.
    ///
    /// For a transition these are its output places; for a place, the
    /// transitions consuming from it.
    pub fn post(&self, name: &str) -> Result<BTreeSet<&str>, NetError> {
        if let Some(&id) = self.transition_ids.get(name) {
            Ok(self.transitions[id]
                .post
                .iter()
                .map(|&(place, _)| self.places[place].name.as_str())
                .collect())
        } else if let Some(&id) = self.place_ids.get(name) {
            Ok(self.places[id]
                .consumers
                .iter()
                .map(|&transition| self.transitions[transition].name.as_str())
                .collect())
        } else {
            Err(NetError::UnknownNode(name.to_string()))
        }
    }

    /// Upstream neighbors of a node, for a place or transition name.
    ///
    /// For a transition these are its input places; for a place, the
    /// transitions producing into it.
    pub fn pre(&self, name: &str) -> Result<BTreeSet<&str>, NetError> {
        if let Some(&id) = self.transition_ids.get(name) {
            Ok(self.transitions[id]
                .pre
                .iter()
                .map(|&(place, _)| self.places[place].name.as_str())
                .collect())
        } else if let Some(&id) = self.place_ids.get(name) {
            Ok(self.places[id]
                .producers
                .iter()
                .map(|&transition| self.transitions[transition].name.as_str())
                .collect())
        } else {
            Err(NetError::UnknownNode(name.to_string()))
        }
    }

    /// The initial marking declared with the places.
    pub fn get_marking(&self) -> Marking {
        let mut marking = Marking::new();
        for place in &self.places {
            if place.tokens > 0 {
                marking.set(&place.name, place.tokens);
            }
        }
        marking
    }

    /// The movements `transition` offers against `marking`.
    pub fn movements(&self, transition: &str, marking: &Marking) -> Result<Movements, NetError> {
        let id = self
            .transition_index(transition)
            .ok_or_else(|| NetError::UnknownTransition(transition.to_string()))?;
        Ok(self.movements_at(id, marking))
    }

    /// The movements the transition at `id` offers against `marking`.
    pub fn movements_at(&self, id: TransitionId, marking: &Marking) -> Movements {
        let transition = &self.transitions[id];
        let mut start_places = Marking::new();
        for &(place, weight) in &transition.pre {
            let name = &self.places[place].name;
            start_places.set(name, start_places.get(name) + weight);
        }
        if !start_places.le(marking) {
            return Movements::new();
        }
        let mut end_places = Marking::new();
        for &(place, weight) in &transition.post {
            let name = &self.places[place].name;
            end_places.set(name, end_places.get(name) + weight);
        }
        let mut movements = Movements::new();
        movements.push(Movement {
            start_places,
            end_places,
        });
        movements
    }

    /// Output places of the transition at `id`, as place ids.
    pub(crate) fn transition_post_places(&self, id: TransitionId) -> impl Iterator<Item = PlaceId> + '_ {
        self.transitions[id].post.iter().map(|&(place, _)| place)
    }

    /// Transitions consuming from the place at `id`.
    pub(crate) fn place_consumers(&self, id: PlaceId) -> &[TransitionId] {
        &self.places[id].consumers
    }

    /// The number of places.
    pub(crate) fn place_count(&self) -> usize {
        self.places.len()
    }

    fn check_fresh(&self, name: &str) -> Result<(), NetError> {
        if self.place_ids.contains_key(name) || self.transition_ids.contains_key(name) {
            return Err(NetError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn arc_endpoints(&self, place: &str, transition: &str) -> Result<(PlaceId, TransitionId), NetError> {
        let place_id = *self
            .place_ids
            .get(place)
            .ok_or_else(|| NetError::UnknownPlace(place.to_string()))?;
        let transition_id = *self
            .transition_ids
            .get(transition)
            .ok_or_else(|| NetError::UnknownTransition(transition.to_string()))?;
        Ok((place_id, transition_id))
    }
}

fn merge_arc(arcs: &mut Vec<(PlaceId, u64)>, place: PlaceId, weight: u64) {
    for arc in arcs.iter_mut() {
        if arc.0 == place {
            arc.1 += weight;
            return;
        }
    }
    arcs.push((place, weight));
}
