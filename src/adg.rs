//! Attack-defense graph: a rooted tree together with the indices and
//! configuration algorithms needed to build the automaton.
//!
//! A [`Configuration`] records which attacks are currently underway and which
//! nodes have been completed. Raw configurations are brought into canonical
//! form with [`Adg::normalize()`], which first propagates completion upwards
//! and then forgets all history that is subsumed by a *checkpoint*: a
//! completed node that no defense can ever reset.


use std::collections::BTreeSet;
use std::iter;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::*;
use crate::tree::{Tree, NodeId, Attack, Defense, OperationType};

/// Snapshot of attack progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Configuration {
    /// Attacks that are currently underway
    pub activated: BTreeSet<NodeId>,
    /// Attacks and subgoals that have been reached
    pub completed: BTreeSet<NodeId>,
}

impl Configuration {
    pub fn new() -> Self {
        Configuration::default()
    }

    pub fn activate(mut self, attack: NodeId) -> Self {
        self.activated.insert(attack);
        self
    }

    pub fn complete(mut self, node: NodeId) -> Self {
        self.completed.insert(node);
        self
    }

    pub fn deactivate(mut self, attack: NodeId) -> Self {
        self.activated.remove(&attack);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.completed.is_empty()
    }

    fn remove(&mut self, node: NodeId) {
        self.activated.remove(&node);
        self.completed.remove(&node);
    }
}

#[derive(Debug, Clone)]
pub struct Adg {
    tree: Tree,
    root: NodeId,
    attacks: Vec<NodeId>,
    defenses: Vec<NodeId>,
    subgoals: Vec<NodeId>,
    defense_periods: Vec<u32>,
    owners: FxHashMap<NodeId, Vec<NodeId>>,
    followers: FxHashMap<NodeId, Vec<NodeId>>,
}

impl Adg {
    /// Take ownership of `tree` and index everything reachable from `root`.
    ///
    /// Parents are assigned here, so the tree does not need to be prepared
    /// with [`Tree::set_parents()`] beforehand.
    pub fn new(mut tree: Tree, root: NodeId) -> Result<Self> {
        let root_node = tree.get(root).ok_or(StructuralError::UnknownNode(root))?;
        let Some(subgoal) = root_node.as_subgoal() else {
            return Err(StructuralError::RootNotSubgoal(root_node.name().to_string()).into());
        };
        if !subgoal.defenses.is_empty() {
            return Err(StructuralError::DefendedRoot(subgoal.name.clone()).into());
        }
        tree.set_parents(root)?;

        let mut attacks = Vec::new();
        let mut defenses = Vec::new();
        let mut subgoals = Vec::new();
        for id in tree.dfs_with_defenses(root) {
            let node = tree.node(id);
            if node.as_attack().is_some() {
                attacks.push(id);
            } else if node.as_defense().is_some() {
                defenses.push(id);
            } else {
                subgoals.push(id);
            }
        }
        let defense_periods = defenses.iter()
            .filter_map(|&d| tree.node(d).as_defense())
            .map(|d| d.period)
            .collect();

        let mut owners: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for id in tree.dfs(root) {
            for &defense in tree.node(id).defenses() {
                owners.entry(defense).or_default().push(id);
            }
        }

        let mut adg = Adg {
            tree,
            root,
            attacks,
            defenses,
            subgoals,
            defense_periods,
            owners,
            followers: FxHashMap::default(),
        };
        adg.followers = adg.compute_followers();
        debug!("ADG rooted at {}: {} attacks, {} defenses, {} subgoals",
            adg.name(root), adg.attacks.len(), adg.defenses.len(), adg.subgoals.len());
        Ok(adg)
    }

    // A defense is followed by every later defense protecting the same node
    // or a sibling of one of its owners.
    fn compute_followers(&self) -> FxHashMap<NodeId, Vec<NodeId>> {
        let related = |x: NodeId, y: NodeId| {
            x == y || self.tree.node(x).parent().is_some_and(|p| self.tree.node(y).parent() == Some(p))
        };
        let mut followers = FxHashMap::default();
        for (i, &defense) in self.defenses.iter().enumerate() {
            let list: Vec<NodeId> = self.defenses[i + 1..].iter()
                .copied()
                .filter(|&f| self.owners(defense).iter()
                    .any(|&o| self.owners(f).iter().any(|&p| related(o, p))))
                .collect();
            if !list.is_empty() {
                followers.insert(defense, list);
            }
        }
        followers
    }

    #[inline]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn name(&self, id: NodeId) -> &str {
        self.tree.name(id)
    }

    /// All attacks in depth-first order.
    #[inline]
    pub fn attacks(&self) -> &[NodeId] {
        &self.attacks
    }

    /// All defenses in depth-first order, each listed after its first owner.
    #[inline]
    pub fn defenses(&self) -> &[NodeId] {
        &self.defenses
    }

    /// All subgoals in depth-first order, starting with the root.
    #[inline]
    pub fn subgoals(&self) -> &[NodeId] {
        &self.subgoals
    }

    /// Periods of [`defenses()`](Adg::defenses), in the same order.
    #[inline]
    pub fn defense_periods(&self) -> &[u32] {
        &self.defense_periods
    }

    /// Nodes protected by `defense`.
    pub fn owners(&self, defense: NodeId) -> &[NodeId] {
        self.owners.get(&defense).map_or(&[], Vec::as_slice)
    }

    pub fn followers(&self, defense: NodeId) -> &[NodeId] {
        self.followers.get(&defense).map_or(&[], Vec::as_slice)
    }

    pub fn attack(&self, id: NodeId) -> Option<&Attack> {
        self.tree.get(id).and_then(|n| n.as_attack())
    }

    pub fn defense(&self, id: NodeId) -> Option<&Defense> {
        self.tree.get(id).and_then(|n| n.as_defense())
    }

    pub(crate) fn expect_attack(&self, id: NodeId) -> Result<&Attack> {
        self.attack(id).ok_or_else(|| self.tree.wrong_kind(id, "an attack"))
    }

    pub(crate) fn expect_defense(&self, id: NodeId) -> Result<&Defense> {
        self.defense(id).ok_or_else(|| self.tree.wrong_kind(id, "a defense"))
    }

    /// Add every subgoal whose completion follows from `completed`.
    pub fn propagate(&self, completed: &mut BTreeSet<NodeId>) {
        // Children come after their parent in DFS order, so a reversed pass
        // reaches the fixed point at once.
        for &goal in self.subgoals.iter().rev() {
            if completed.contains(&goal) {
                continue;
            }
            let Some(subgoal) = self.tree.node(goal).as_subgoal() else {
                continue;
            };
            let mut children = self.tree.children(goal);
            let reached = match subgoal.operation_type {
                OperationType::And => children.all(|c| completed.contains(&c)),
                OperationType::Or | OperationType::Edge => children.any(|c| completed.contains(&c)),
            };
            if reached {
                completed.insert(goal);
            }
        }
    }

    /// Nodes without defenses that are not reset subgoals.
    /// Once completed, they can never be undone.
    pub fn is_checkpoint(&self, id: NodeId) -> bool {
        let node = self.tree.node(id);
        node.defenses().is_empty() && !node.is_reset()
    }

    /// Whether some strict ancestor of `id` is a completed checkpoint.
    pub fn behind_checkpoint(&self, id: NodeId, completed: &BTreeSet<NodeId>) -> bool {
        self.tree.ancestors(id).any(|a| completed.contains(&a) && self.is_checkpoint(a))
    }

    /// Drop all progress that is subsumed by completed checkpoints.
    pub fn reduce(&self, conf: &mut Configuration) {
        let Configuration { activated, completed } = conf;
        activated.retain(|a| !completed.contains(a));
        let subsumed: Vec<NodeId> = completed.iter()
            .copied()
            .filter(|&n| self.behind_checkpoint(n, completed))
            .collect();
        for node in subsumed {
            completed.remove(&node);
        }
        activated.retain(|&a| !self.behind_checkpoint(a, completed));
    }

    /// Canonical form of a configuration: propagate, then reduce.
    pub fn normalize(&self, conf: &mut Configuration) {
        self.propagate(&mut conf.completed);
        self.reduce(conf);
    }

    /// Whether `attack` may still be activated in `conf`.
    pub fn is_available(&self, attack: NodeId, conf: &Configuration) -> bool {
        !conf.activated.contains(&attack)
            && !conf.completed.contains(&attack)
            && !self.behind_checkpoint(attack, &conf.completed)
    }

    pub fn available_attacks<'a>(&'a self, conf: &'a Configuration) -> impl Iterator<Item=NodeId> + 'a {
        self.attacks.iter().copied().filter(move |&a| self.is_available(a, conf))
    }

    /// Defenses that can change `conf` when they succeed, in defense order.
    ///
    /// These are the defenses attached to activated or completed nodes, or to
    /// reset subgoals above them.
    pub fn active_defenses(&self, conf: &Configuration) -> Vec<NodeId> {
        let mut in_scope = FxHashSet::default();
        for &node in conf.activated.iter().chain(&conf.completed) {
            let resets = self.tree.ancestors(node).filter(|&a| self.tree.node(a).is_reset());
            for touched in iter::once(node).chain(resets) {
                in_scope.extend(self.tree.node(touched).defenses().iter().copied());
            }
        }
        self.defenses.iter().copied().filter(|d| in_scope.contains(d)).collect()
    }

    /// Apply a successful reset by `defense` to `conf`.
    ///
    /// Every owner loses its progress. Reset subgoals additionally erase the
    /// progress of all their descendants. Completed ancestors of an owner are
    /// retracted as well, up to the first checkpoint; the next propagation
    /// completes them again where the remaining progress still suffices. The
    /// same holds for a non-reset subgoal owner whose children are still
    /// completed.
    ///
    /// Owners below a completed checkpoint are already subsumed and left alone.
    pub fn apply_defense(&self, defense: NodeId, conf: &mut Configuration) {
        let owners: Vec<NodeId> = self.owners(defense).iter()
            .copied()
            .filter(|&o| !self.behind_checkpoint(o, &conf.completed))
            .collect();
        for owner in owners {
            if self.tree.node(owner).is_reset() {
                for node in self.tree.dfs(owner) {
                    conf.remove(node);
                }
            } else {
                conf.remove(owner);
            }
            for ancestor in self.tree.ancestors(owner).take_while(|&a| !self.is_checkpoint(a)) {
                conf.completed.remove(&ancestor);
            }
        }
    }

    /// Whether the root goal is reached.
    #[inline]
    pub fn is_accepting(&self, conf: &Configuration) -> bool {
        conf.completed.contains(&self.root)
    }

    /// Sort node ids by their names.
    pub fn sorted_by_name(&self, ids: impl IntoIterator<Item=NodeId>) -> Box<[NodeId]> {
        let mut ids: Vec<NodeId> = ids.into_iter().collect();
        ids.sort_by(|&a, &b| self.name(a).cmp(self.name(b)));
        ids.into_boxed_slice()
    }
}
