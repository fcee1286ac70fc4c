//! Construction of the attack-defense MDP.
//!
//! Starting from the empty configuration, states are expanded in discovery
//! order. Every successor configuration is normalized before it is looked up
//! in the [`Registry`], so that each canonical state is expanded exactly once.
//! Outgoing edges are stored in compressed sparse row form.

mod registry;

use std::fmt;

use log::{debug, trace};

use crate::error::*;
use crate::adg::{Adg, Configuration};
use crate::tree::NodeId;

pub use registry::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeKind {
    /// Attacker starts `attack`.
    Activation { attack: NodeId },
    /// Attacker starts paying the activation cost of `attack`.
    ActivationCost { attack: NodeId },
    /// Attacker stops activating attacks and waits.
    NoActivation,
    /// The completion time of `attack` has passed.
    ToCompletion { attack: NodeId },
    Completion { attack: NodeId, success: bool, probability: f64 },
    /// The period of `defense` has passed and it attempts a reset.
    ToDefense { defense: NodeId },
    Defense { defense: NodeId, success: bool, probability: f64 },
    /// The period of a defense that can not change the state has passed.
    LoopDefense { defense: NodeId },
}

impl EdgeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EdgeKind::Activation { .. } => "Activation",
            EdgeKind::ActivationCost { .. } => "ActivationCost",
            EdgeKind::NoActivation => "NoActivation",
            EdgeKind::ToCompletion { .. } => "ToCompletion",
            EdgeKind::Completion { .. } => "Completion",
            EdgeKind::ToDefense { .. } => "ToDefense",
            EdgeKind::Defense { .. } => "Defense",
            EdgeKind::LoopDefense { .. } => "LoopDefense",
        }
    }

    /// Probability of a branch edge.
    pub fn probability(&self) -> Option<f64> {
        match *self {
            EdgeKind::Completion { probability, .. } | EdgeKind::Defense { probability, .. } => Some(probability),
            _ => None,
        }
    }

    pub fn attack(&self) -> Option<NodeId> {
        match *self {
            EdgeKind::Activation { attack }
            | EdgeKind::ActivationCost { attack }
            | EdgeKind::ToCompletion { attack }
            | EdgeKind::Completion { attack, .. } => Some(attack),
            _ => None,
        }
    }

    pub fn defense(&self) -> Option<NodeId> {
        match *self {
            EdgeKind::ToDefense { defense }
            | EdgeKind::Defense { defense, .. }
            | EdgeKind::LoopDefense { defense } => Some(defense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: StateId,
    pub destination: StateId,
    pub kind: EdgeKind,
}

/// Limits of automaton construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConf {
    /// Construction fails with [`Error::StateLimit`] once more states are discovered.
    pub max_states: usize,
}

impl BuildConf {
    pub const STANDARD: BuildConf = BuildConf { max_states: 1 << 20 };
    /// As many states as a [`StateId`] can address.
    pub const UNLIMITED: BuildConf = BuildConf { max_states: StateId::MAX as usize };

    /// Effective state limit, never beyond the range of [`StateId`].
    #[inline]
    pub fn limit(&self) -> usize {
        self.max_states.min(StateId::MAX as usize)
    }
}

impl Default for BuildConf {
    fn default() -> Self {
        BuildConf::STANDARD
    }
}

// Destination of an edge before it is interned
enum Target {
    State(State),
    Itself,
}

/// Attack-defense MDP built from an [`Adg`].
///
/// # Example
///
/// ```
/// use admdp::{Tree, Attack, OperationType, Adg, Admdp};
///
/// let mut tree = Tree::new();
/// let a0 = tree.add_attack(Attack::new("a0", 10, 0.5)).unwrap();
/// let root = tree.add_subgoal("root", OperationType::Or, &[a0], false).unwrap();
/// let admdp = Admdp::new(Adg::new(tree, root).unwrap()).unwrap();
///
/// assert_eq!(admdp.n_states(), 5);
/// let goal = admdp.accepting().unwrap();
/// assert_eq!(admdp.state_name(goal), "Attacker(activated: [], completed: [root])");
/// ```
#[derive(Debug, Clone)]
pub struct Admdp {
    adg: Adg,
    registry: Registry,
    edges: Vec<Edge>,
    row_offsets: Vec<u32>,
    accepting: Option<StateId>,
    conf: BuildConf,
}

impl Admdp {
    pub fn new(adg: Adg) -> Result<Self> {
        Admdp::with_conf(adg, BuildConf::STANDARD)
    }

    pub fn with_conf(adg: Adg, conf: BuildConf) -> Result<Self> {
        let mut admdp = Admdp {
            adg,
            registry: Registry::new(),
            edges: Vec::new(),
            row_offsets: Vec::new(),
            accepting: None,
            conf,
        };
        admdp.build()?;
        Ok(admdp)
    }

    fn build(&mut self) -> Result<()> {
        let initial = self.make_state(StateKind::Attacker, Configuration::new())?;
        self.intern(initial)?;
        let mut idx = 0;
        while idx < self.registry.len() {
            let source = idx as StateId;
            let targets = self.successors(source)?;
            self.add_edges(source, targets)?;
            idx += 1;
        }
        let end = self.edge_offset()?;
        self.row_offsets.push(end);
        debug!("Built ADMDP with {} states and {} edges", self.n_states(), self.n_edges());
        if self.accepting.is_none() {
            debug!("Root goal {} is unreachable", self.adg.name(self.adg.root()));
        }
        Ok(())
    }

    fn successors(&self, id: StateId) -> Result<Vec<(Target, EdgeKind)>> {
        let state = self.state(id);
        let conf = state.configuration();
        let mut out = Vec::new();
        match state.kind() {
            StateKind::Attacker => {
                for attack in self.adg.available_attacks(&conf) {
                    if self.adg.expect_attack(attack)?.has_activation_cost() {
                        let target = self.make_state(StateKind::ActivationCost { attack }, conf.clone())?;
                        out.push((Target::State(target), EdgeKind::ActivationCost { attack }));
                    } else {
                        let target = self.make_state(StateKind::Attacker, conf.clone().activate(attack))?;
                        out.push((Target::State(target), EdgeKind::Activation { attack }));
                    }
                }
                if !conf.activated.is_empty() || !state.active_defenses.is_empty() {
                    let target = self.make_state(StateKind::NoActivation, conf)?;
                    out.push((Target::State(target), EdgeKind::NoActivation));
                }
            },
            StateKind::ActivationCost { attack } => {
                let target = self.make_state(StateKind::Attacker, conf.activate(attack))?;
                out.push((Target::State(target), EdgeKind::Activation { attack }));
            },
            StateKind::NoActivation => {
                for &attack in self.adg.attacks() {
                    if !conf.activated.contains(&attack) {
                        continue;
                    }
                    let target = if self.adg.expect_attack(attack)?.success_probability < 1.0 {
                        self.make_state(StateKind::Completion { attack }, conf.clone())?
                    } else {
                        self.make_state(StateKind::Attacker, conf.clone().complete(attack))?
                    };
                    out.push((Target::State(target), EdgeKind::ToCompletion { attack }));
                }
                for &defense in self.adg.defenses() {
                    if !state.active_defenses.contains(&defense) {
                        out.push((Target::Itself, EdgeKind::LoopDefense { defense }));
                        continue;
                    }
                    let target = if self.adg.expect_defense(defense)?.success_probability < 1.0 {
                        self.make_state(StateKind::Defense { defense }, conf.clone())?
                    } else {
                        let mut defended = conf.clone();
                        self.adg.apply_defense(defense, &mut defended);
                        self.make_state(StateKind::Attacker, defended)?
                    };
                    out.push((Target::State(target), EdgeKind::ToDefense { defense }));
                }
            },
            StateKind::Completion { attack } => {
                let probability = self.adg.expect_attack(attack)?.success_probability;
                let success = self.make_state(StateKind::Attacker, conf.clone().complete(attack))?;
                out.push((Target::State(success), EdgeKind::Completion { attack, success: true, probability }));
                let failure = self.make_state(StateKind::Attacker, conf.deactivate(attack))?;
                out.push((Target::State(failure), EdgeKind::Completion {
                    attack,
                    success: false,
                    probability: 1.0 - probability,
                }));
            },
            StateKind::Defense { defense } => {
                let probability = self.adg.expect_defense(defense)?.success_probability;
                let mut defended = conf.clone();
                self.adg.apply_defense(defense, &mut defended);
                let success = self.make_state(StateKind::Attacker, defended)?;
                out.push((Target::State(success), EdgeKind::Defense { defense, success: true, probability }));
                let failure = self.make_state(StateKind::Attacker, conf)?;
                out.push((Target::State(failure), EdgeKind::Defense {
                    defense,
                    success: false,
                    probability: 1.0 - probability,
                }));
            },
        }
        trace!("{} has {} successors", self.state_name(id), out.len());
        Ok(out)
    }

    // Normalize `conf` and create a state of the given kind around it
    fn make_state(&self, kind: StateKind, mut conf: Configuration) -> Result<State> {
        self.adg.normalize(&mut conf);
        let active_defenses = self.adg.active_defenses(&conf);

        let reduced_away = match kind {
            StateKind::Completion { attack } => !conf.activated.contains(&attack),
            StateKind::ActivationCost { attack } => !self.adg.is_available(attack, &conf),
            StateKind::Defense { defense } => !active_defenses.contains(&defense),
            StateKind::Attacker | StateKind::NoActivation => false,
        };
        if let (true, Some(node)) = (reduced_away, kind.node()) {
            return Err(CanonicalizationError::ReducedAwayNode {
                state: kind.tag(),
                node: self.adg.name(node).to_string(),
            }.into());
        }
        if let Some(&attack) = conf.activated.intersection(&conf.completed).next() {
            return Err(CanonicalizationError::ActivatedAndCompleted(self.adg.name(attack).to_string()).into());
        }

        let attacker = kind == StateKind::Attacker;
        let accepting = attacker && self.adg.is_accepting(&conf);
        let initial = attacker && conf.is_empty();
        let key = StateKey {
            kind,
            activated: self.adg.sorted_by_name(conf.activated),
            completed: self.adg.sorted_by_name(conf.completed),
        };
        Ok(State::new(key, accepting, initial, active_defenses.into_boxed_slice()))
    }

    fn intern(&mut self, state: State) -> Result<StateId> {
        let accepting = state.accepting;
        match self.registry.intern(state) {
            Ok((id, true)) => {
                if self.registry.len() > self.conf.limit() {
                    return Err(Error::StateLimit(self.conf.limit()));
                }
                if accepting && self.accepting.is_none() {
                    debug!("Root goal reached in state {id}");
                    self.accepting = Some(id);
                }
                Ok(id)
            },
            Ok((id, false)) => Ok(id),
            Err(id) => Err(CanonicalizationError::KeyCollision(self.state_name(id)).into()),
        }
    }

    fn add_edges(&mut self, source: StateId, targets: Vec<(Target, EdgeKind)>) -> Result<()> {
        // Start range of next state
        let start = self.edge_offset()?;
        self.row_offsets.push(start);
        for (target, kind) in targets {
            let destination = match target {
                Target::State(state) => self.intern(state)?,
                Target::Itself => source,
            };
            self.edges.push(Edge { source, destination, kind });
        }
        Ok(())
    }

    fn edge_offset(&self) -> Result<u32> {
        u32::try_from(self.edges.len()).map_err(|_| Error::EdgeLimit(u32::MAX as usize))
    }

    #[inline]
    pub fn adg(&self) -> &Adg {
        &self.adg
    }

    #[inline]
    pub fn conf(&self) -> BuildConf {
        self.conf
    }

    /// All states, indexed by [`StateId`].
    #[inline]
    pub fn states(&self) -> &[State] {
        self.registry.states()
    }

    /// # Panics
    ///
    /// Panics if `id` is not a state of this automaton.
    #[inline]
    pub fn state(&self, id: StateId) -> &State {
        &self.registry.states()[id as usize]
    }

    #[inline]
    pub fn key(&self, id: StateId) -> &StateKey {
        self.state(id).key()
    }

    pub fn state_id(&self, key: &StateKey) -> Option<StateId> {
        self.registry.id(key)
    }

    /// Outgoing edges of a state.
    pub fn edges(&self, id: StateId) -> &[Edge] {
        let start = self.row_offsets[id as usize] as usize;
        let end = self.row_offsets[id as usize + 1] as usize;
        &self.edges[start..end]
    }

    /// All edges, grouped by source state.
    #[inline]
    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The attacker state with the empty configuration.
    #[inline]
    pub fn initial(&self) -> StateId {
        0
    }

    /// The first discovered state in which the root goal is reached.
    #[inline]
    pub fn accepting(&self) -> Option<StateId> {
        self.accepting
    }

    pub fn accepting_states(&self) -> impl Iterator<Item=StateId> + '_ {
        self.states().iter()
            .enumerate()
            .filter(|(_, s)| s.accepting)
            .map(|(id, _)| id as StateId)
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Readable rendering of the key of a state, using node names.
    pub fn state_name(&self, id: StateId) -> String {
        let key = self.key(id);
        let names = |ids: &[NodeId]| ids.iter()
            .map(|&n| self.adg.name(n))
            .collect::<Vec<_>>()
            .join(", ");
        let mut name = key.kind.tag().to_string();
        if let Some(node) = key.kind.node() {
            name.push_str(&format!("[{}]", self.adg.name(node)));
        }
        name.push_str(&format!("(activated: [{}], completed: [{}])",
            names(&key.activated), names(&key.completed)));
        name
    }
}

impl fmt::Display for Admdp {
    /// The alternate form `{:#}` also lists every state with its edges.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ADMDP with {} states and {} edges", self.n_states(), self.n_edges())?;
        if f.alternate() {
            for id in 0..self.n_states() as StateId {
                write!(f, "\n{id}: {}", self.state_name(id))?;
                for edge in self.edges(id) {
                    write!(f, "\n    --{}--> {}", edge.kind.tag(), edge.destination)?;
                    if let Some(p) = edge.kind.probability() {
                        write!(f, " ({p})")?;
                    }
                }
            }
        }
        Ok(())
    }
}
