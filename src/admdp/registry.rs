use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::adg::Configuration;
use crate::tree::NodeId;

/// Index of a state inside its [`Admdp`](crate::admdp::Admdp).
pub type StateId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKind {
    /// Decision point of the attacker: activate another attack or wait.
    Attacker,
    /// The activation cost of `attack` is being paid.
    ActivationCost { attack: NodeId },
    /// The attacker waits for a completion or a defense.
    NoActivation,
    /// Stochastic outcome of `attack`.
    Completion { attack: NodeId },
    /// Stochastic outcome of a reset attempt by `defense`.
    Defense { defense: NodeId },
}

impl StateKind {
    pub fn tag(&self) -> &'static str {
        match self {
            StateKind::Attacker => "Attacker",
            StateKind::ActivationCost { .. } => "ActivationCost",
            StateKind::NoActivation => "NoActivation",
            StateKind::Completion { .. } => "Completion",
            StateKind::Defense { .. } => "Defense",
        }
    }

    /// Branch points are left immediately with one of two probabilistic edges.
    #[inline]
    pub fn is_branchpoint(&self) -> bool {
        matches!(self, StateKind::Completion { .. } | StateKind::Defense { .. })
    }

    /// The attack or defense this kind refers to.
    pub fn node(&self) -> Option<NodeId> {
        match *self {
            StateKind::ActivationCost { attack } | StateKind::Completion { attack } => Some(attack),
            StateKind::Defense { defense } => Some(defense),
            StateKind::Attacker | StateKind::NoActivation => None,
        }
    }
}

/// Canonical identity of a state.
///
/// Both lists hold the reduced configuration, sorted by node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub kind: StateKind,
    pub activated: Box<[NodeId]>,
    pub completed: Box<[NodeId]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    key: Rc<StateKey>,
    pub accepting: bool,
    pub initial: bool,
    /// Defenses that can change this state, in defense order
    pub active_defenses: Box<[NodeId]>,
}

impl State {
    pub fn new(key: StateKey, accepting: bool, initial: bool, active_defenses: Box<[NodeId]>) -> Self {
        State {
            key: Rc::new(key),
            accepting,
            initial,
            active_defenses,
        }
    }

    #[inline]
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    #[inline]
    pub fn kind(&self) -> StateKind {
        self.key.kind
    }

    #[inline]
    pub fn activated(&self) -> &[NodeId] {
        &self.key.activated
    }

    #[inline]
    pub fn completed(&self) -> &[NodeId] {
        &self.key.completed
    }

    pub fn configuration(&self) -> Configuration {
        Configuration {
            activated: self.activated().iter().copied().collect(),
            completed: self.completed().iter().copied().collect(),
        }
    }

    // Fields that follow from the key, they must agree whenever keys do
    fn agrees_with(&self, other: &State) -> bool {
        self.accepting == other.accepting
            && self.initial == other.initial
            && self.active_defenses == other.active_defenses
    }
}

/// Unique states of one automaton, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    states: Vec<State>,
    index: FxHashMap<Rc<StateKey>, StateId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[inline]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    #[inline]
    pub fn get(&self, id: StateId) -> Option<&State> {
        self.states.get(id as usize)
    }

    pub fn id(&self, key: &StateKey) -> Option<StateId> {
        self.index.get(key).copied()
    }

    /// Return the id of the state with the key of `state`, inserting it if it
    /// is new. The flag tells whether the state was inserted.
    ///
    /// If a state with the same key but different contents exists, its id is
    /// returned as the error.
    pub fn intern(&mut self, state: State) -> Result<(StateId, bool), StateId> {
        if let Some(&id) = self.index.get(&state.key) {
            return if self.states[id as usize].agrees_with(&state) {
                Ok((id, false))
            } else {
                Err(id)
            };
        }
        let id = self.states.len() as StateId;
        self.index.insert(Rc::clone(&state.key), id);
        self.states.push(state);
        Ok((id, true))
    }
}
