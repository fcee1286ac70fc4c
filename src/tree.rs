//! Node model of attack-defense trees.
//!
//! Nodes live in an arena ([`Tree`]) and refer to each other by [`NodeId`].
//! Children are given when a subgoal is added, parents are assigned afterwards
//! by a single walk with [`Tree::set_parents()`].
//! Defenses are not part of the parent relation: a defense is attached to the
//! attacks and subgoals it protects and may protect more than one node.

#[cfg(feature = "serde")]
pub mod scenario;

use std::fmt;
use std::iter;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::*;

/// Index of a node inside its [`Tree`].
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OperationType {
    And,
    Or,
    /// Refinement of a single child. Completes like [`OperationType::Or`].
    Edge,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::And => write!(f, "AND"),
            OperationType::Or => write!(f, "OR"),
            OperationType::Edge => write!(f, "EDGE"),
        }
    }
}

/// Atomic attack.
///
/// ```
/// use admdp::Attack;
///
/// let attack = Attack::new("phishing", 10, 0.5)
///     .with_activation_cost(5)
///     .with_proportional_cost(1);
/// assert!(attack.has_activation_cost());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attack {
    pub name: String,
    /// Time the attack needs once it is activated
    pub completion_time: u32,
    pub success_probability: f64,
    /// Cost paid once, when the attack is activated
    pub activation_cost: Option<u32>,
    /// Cost per time unit while the attack is activated
    pub proportional_cost: Option<u32>,
    /// Defenses that can reset this attack
    pub defenses: Vec<NodeId>,
}

impl Attack {
    pub fn new(name: impl Into<String>, completion_time: u32, success_probability: f64) -> Self {
        Attack {
            name: name.into(),
            completion_time,
            success_probability,
            activation_cost: None,
            proportional_cost: None,
            defenses: Vec::new(),
        }
    }

    pub fn with_activation_cost(mut self, cost: u32) -> Self {
        self.activation_cost = Some(cost);
        self
    }

    pub fn with_proportional_cost(mut self, cost: u32) -> Self {
        self.proportional_cost = Some(cost);
        self
    }

    pub fn with_defenses(mut self, defenses: &[NodeId]) -> Self {
        self.defenses.extend_from_slice(defenses);
        self
    }

    /// Whether activating this attack needs its own cost accrual step.
    #[inline]
    pub fn has_activation_cost(&self) -> bool {
        self.activation_cost.is_some_and(|cost| cost > 0)
    }
}

/// Periodic defense, which resets the progress of the nodes it is attached to.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Defense {
    pub name: String,
    /// Time between two reset attempts
    pub period: u32,
    pub success_probability: f64,
    pub cost: u32,
}

impl Defense {
    pub fn new(name: impl Into<String>, period: u32, success_probability: f64, cost: u32) -> Self {
        Defense {
            name: name.into(),
            period,
            success_probability,
            cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subgoal {
    pub name: String,
    pub operation_type: OperationType,
    pub attack_children: Vec<NodeId>,
    pub subgoal_children: Vec<NodeId>,
    pub defenses: Vec<NodeId>,
    /// A successful defense on a reset subgoal erases the progress of all its descendants.
    /// Reset subgoals are never checkpoints.
    pub reset: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Attack(Attack),
    Defense(Defense),
    Subgoal(Subgoal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
}

impl Node {
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Attack(a) => &a.name,
            NodeKind::Defense(d) => &d.name,
            NodeKind::Subgoal(s) => &s.name,
        }
    }

    /// Parent goal, only known after [`Tree::set_parents()`] was run.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Defenses attached to this node. Always empty for defenses.
    pub fn defenses(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Attack(a) => &a.defenses,
            NodeKind::Subgoal(s) => &s.defenses,
            NodeKind::Defense(_) => &[],
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(&self.kind, NodeKind::Subgoal(s) if s.reset)
    }

    pub fn as_attack(&self) -> Option<&Attack> {
        match &self.kind {
            NodeKind::Attack(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_defense(&self) -> Option<&Defense> {
        match &self.kind {
            NodeKind::Defense(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_subgoal(&self) -> Option<&Subgoal> {
        match &self.kind {
            NodeKind::Subgoal(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arena of attack-defense tree nodes.
///
/// # Example
///
/// ```
/// use admdp::{Tree, Attack, Defense, OperationType};
///
/// let mut tree = Tree::new();
/// let d0 = tree.add_defense(Defense::new("d0", 5, 0.6, 1)).unwrap();
/// let a0 = tree.add_attack(Attack::new("a0", 10, 0.5)).unwrap();
/// let a1 = tree.add_attack(Attack::new("a1", 3, 0.2)).unwrap();
/// let g1 = tree.add_subgoal("g1", OperationType::And, &[a0, a1, d0], true).unwrap();
/// let root = tree.add_subgoal("root", OperationType::Or, &[g1], false).unwrap();
/// tree.set_parents(root).unwrap();
///
/// assert_eq!(tree.node(a0).parent(), Some(g1));
/// assert_eq!(tree.dfs(root), vec![root, g1, a0, a1]);
/// ```
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    names: FxHashMap<String, NodeId>,
    max_arity: usize,
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            nodes: Vec::new(),
            names: FxHashMap::default(),
            max_arity: usize::MAX,
        }
    }

    /// Limit the number of attack and subgoal children of every subgoal added afterwards.
    pub fn with_max_arity(max_arity: usize) -> Self {
        Tree {
            max_arity,
            ..Tree::new()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree.
    #[inline]
    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).name()
    }

    /// Look up a node by its name.
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn add_attack(&mut self, attack: Attack) -> Result<NodeId> {
        check_probability(&attack.name, attack.success_probability)?;
        for &defense in &attack.defenses {
            self.expect_kind(defense, |n| n.as_defense().is_some(), "a defense")?;
        }
        self.insert(NodeKind::Attack(attack))
    }

    pub fn add_defense(&mut self, defense: Defense) -> Result<NodeId> {
        check_probability(&defense.name, defense.success_probability)?;
        if defense.period == 0 {
            return Err(ScenarioParameterError::ZeroPeriod(defense.name).into());
        }
        self.insert(NodeKind::Defense(defense))
    }

    /// Add a subgoal over already existing nodes.
    ///
    /// `children` is partitioned by kind into attack children, subgoal children
    /// and attached defenses, keeping their relative order.
    pub fn add_subgoal(
        &mut self,
        name: impl Into<String>,
        operation_type: OperationType,
        children: &[NodeId],
        reset: bool,
    ) -> Result<NodeId> {
        let name = name.into();
        let mut attack_children = Vec::new();
        let mut subgoal_children = Vec::new();
        let mut defenses = Vec::new();
        for &child in children {
            let node = self.get(child).ok_or(StructuralError::UnknownNode(child))?;
            match node.kind {
                NodeKind::Attack(_) => attack_children.push(child),
                NodeKind::Subgoal(_) => subgoal_children.push(child),
                NodeKind::Defense(_) => defenses.push(child),
            }
        }

        let arity = attack_children.len() + subgoal_children.len();
        if arity == 0 || arity > self.max_arity {
            return Err(StructuralError::Arity {
                subgoal: name,
                children: arity,
                max: self.max_arity,
            }.into());
        }
        if operation_type == OperationType::Edge && arity != 1 {
            return Err(StructuralError::EdgeArity { subgoal: name, children: arity }.into());
        }

        self.insert(NodeKind::Subgoal(Subgoal {
            name,
            operation_type,
            attack_children,
            subgoal_children,
            defenses,
            reset,
        }))
    }

    /// Attack and subgoal children of a node, attacks first.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item=NodeId> + '_ {
        let (attacks, subgoals): (&[NodeId], &[NodeId]) = match &self.node(id).kind {
            NodeKind::Subgoal(s) => (s.attack_children.as_slice(), s.subgoal_children.as_slice()),
            _ => (&[], &[]),
        };
        attacks.iter().chain(subgoals).copied()
    }

    /// All proper ancestors of a node, closest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item=NodeId> + '_ {
        iter::successors(self.node(id).parent, move |&p| self.node(p).parent)
    }

    /// Assign the parent of every attack and subgoal below `root`.
    ///
    /// Running this again with the same root is a no-op.
    ///
    /// # Errors
    ///
    /// A [`StructuralError::ConflictingParent`] is returned if a node is the child of two
    /// different subgoals, or if `root` already has a parent.
    pub fn set_parents(&mut self, root: NodeId) -> Result<()> {
        let root_node = self.get(root).ok_or(StructuralError::UnknownNode(root))?;
        if let Some(parent) = root_node.parent {
            return Err(self.conflict(root, parent, None).into());
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children: Vec<NodeId> = self.children(id).collect();
            for &child in &children {
                match self.nodes[child as usize].parent {
                    None => self.nodes[child as usize].parent = Some(id),
                    Some(parent) if parent == id => {},
                    Some(parent) => return Err(self.conflict(child, parent, Some(id)).into()),
                }
            }
            // Reversed, so that children are popped in order
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Depth first search starting at `start`.
    ///
    /// Returns `start` followed by all attack and subgoal descendants,
    /// every node before its children.
    pub fn dfs(&self, start: NodeId) -> Vec<NodeId> {
        let mut visited = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            visited.push(id);
            let len = stack.len();
            stack.extend(self.children(id));
            stack[len..].reverse();
        }
        visited
    }

    /// Same as [`dfs()`](Tree::dfs), but also visits attached defenses.
    ///
    /// A defense is listed right after the first node it is attached to.
    pub fn dfs_with_defenses(&self, start: NodeId) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        let mut visited = Vec::new();
        for id in self.dfs(start) {
            visited.push(id);
            for &defense in self.node(id).defenses() {
                if seen.insert(defense) {
                    visited.push(defense);
                }
            }
        }
        visited
    }

    fn insert(&mut self, kind: NodeKind) -> Result<NodeId> {
        let node = Node { kind, parent: None };
        let name = node.name();
        if !is_identifier(name) {
            return Err(StructuralError::InvalidName(name.to_string()).into());
        }
        if self.names.contains_key(name) {
            return Err(StructuralError::DuplicateName(name.to_string()).into());
        }
        let id = self.nodes.len() as NodeId;
        self.names.insert(name.to_string(), id);
        self.nodes.push(node);
        Ok(id)
    }

    fn expect_kind(&self, id: NodeId, test: impl Fn(&Node) -> bool, expected: &'static str) -> Result<()> {
        let node = self.get(id).ok_or(StructuralError::UnknownNode(id))?;
        if test(node) {
            Ok(())
        } else {
            Err(StructuralError::WrongKind { node: node.name().to_string(), expected }.into())
        }
    }

    fn conflict(&self, node: NodeId, parent: NodeId, other: Option<NodeId>) -> StructuralError {
        StructuralError::ConflictingParent {
            node: self.name(node).to_string(),
            parent: self.name(parent).to_string(),
            other: other.map_or("<none>".to_string(), |o| self.name(o).to_string()),
        }
    }

    pub(crate) fn wrong_kind(&self, id: NodeId, expected: &'static str) -> Error {
        match self.get(id) {
            Some(node) => StructuralError::WrongKind {
                node: node.name().to_string(),
                expected,
            }.into(),
            None => StructuralError::UnknownNode(id).into(),
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

fn check_probability(node: &str, value: f64) -> Result<()> {
    // Also rejects NaN
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ScenarioParameterError::Probability { node: node.to_string(), value }.into())
    }
}

// Names end up as identifiers in the exported model
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}


#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let d0 = tree.add_defense(Defense::new("d0", 5, 0.5, 1)).unwrap();
        let a0 = tree.add_attack(Attack::new("a0", 10, 0.5).with_defenses(&[d0])).unwrap();
        let a1 = tree.add_attack(Attack::new("a1", 3, 0.2)).unwrap();
        let a2 = tree.add_attack(Attack::new("a2", 7, 0.7)).unwrap();
        let g1 = tree.add_subgoal("g1", OperationType::Or, &[a0, a1], false).unwrap();
        let g0 = tree.add_subgoal("g0", OperationType::And, &[g1, a2], false).unwrap();
        tree.set_parents(g0).unwrap();
        (tree, g0)
    }

    fn names(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| tree.name(id).to_string()).collect()
    }

    #[test]
    fn children_are_partitioned() {
        let (tree, root) = small();
        let g0 = tree.node(root).as_subgoal().unwrap();
        assert_eq!(names(&tree, &g0.attack_children), ["a2"]);
        assert_eq!(names(&tree, &g0.subgoal_children), ["g1"]);
        assert!(g0.defenses.is_empty());
    }

    #[test]
    fn dfs_visits_parents_first() {
        let (tree, root) = small();
        // Attack children are listed before subgoal children
        assert_eq!(names(&tree, &tree.dfs(root)), ["g0", "a2", "g1", "a0", "a1"]);
        assert_eq!(names(&tree, &tree.dfs_with_defenses(root)), ["g0", "a2", "g1", "a0", "d0", "a1"]);
    }

    #[test]
    fn parents_and_ancestors() {
        let (tree, root) = small();
        let a0 = tree.id("a0").unwrap();
        let g1 = tree.id("g1").unwrap();
        assert_eq!(tree.node(a0).parent(), Some(g1));
        assert_eq!(tree.ancestors(a0).collect::<Vec<_>>(), vec![g1, root]);
        assert_eq!(tree.node(root).parent(), None);
        // Defenses are outside the parent relation
        assert_eq!(tree.node(tree.id("d0").unwrap()).parent(), None);
    }

    #[test]
    fn set_parents_is_idempotent() {
        let (mut tree, root) = small();
        let before: Vec<_> = (0..tree.len() as NodeId).map(|id| tree.node(id).parent()).collect();
        tree.set_parents(root).unwrap();
        let after: Vec<_> = (0..tree.len() as NodeId).map(|id| tree.node(id).parent()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn shared_child_is_rejected() {
        let mut tree = Tree::new();
        let a0 = tree.add_attack(Attack::new("a0", 1, 1.0)).unwrap();
        let g0 = tree.add_subgoal("g0", OperationType::Or, &[a0], false).unwrap();
        let g1 = tree.add_subgoal("g1", OperationType::Or, &[a0], false).unwrap();
        let root = tree.add_subgoal("root", OperationType::And, &[g0, g1], false).unwrap();
        let err = tree.set_parents(root).unwrap_err();
        assert_eq!(err, Error::Structural(StructuralError::ConflictingParent {
            node: "a0".to_string(),
            parent: "g0".to_string(),
            other: "g1".to_string(),
        }));
    }

    #[test]
    fn set_parents_below_the_root_fails() {
        let (mut tree, _) = small();
        let g1 = tree.id("g1").unwrap();
        assert!(matches!(tree.set_parents(g1),
            Err(Error::Structural(StructuralError::ConflictingParent { .. }))));
    }

    #[test]
    fn arity_is_checked() {
        let mut tree = Tree::with_max_arity(2);
        let a: Vec<_> = (0..3)
            .map(|i| tree.add_attack(Attack::new(format!("a{i}"), 1, 0.5)).unwrap())
            .collect();
        assert!(matches!(tree.add_subgoal("g", OperationType::And, &a, false),
            Err(Error::Structural(StructuralError::Arity { children: 3, max: 2, .. }))));
        assert!(matches!(tree.add_subgoal("g", OperationType::And, &[], false),
            Err(Error::Structural(StructuralError::Arity { children: 0, .. }))));
        assert!(matches!(tree.add_subgoal("g", OperationType::Edge, &a[..2], false),
            Err(Error::Structural(StructuralError::EdgeArity { children: 2, .. }))));
        assert!(tree.add_subgoal("g", OperationType::Edge, &a[..1], false).is_ok());
    }

    #[test]
    fn parameters_are_validated() {
        let mut tree = Tree::new();
        assert!(matches!(tree.add_attack(Attack::new("a", 1, 1.5)),
            Err(Error::Parameter(ScenarioParameterError::Probability { .. }))));
        assert!(matches!(tree.add_attack(Attack::new("a", 1, f64::NAN)),
            Err(Error::Parameter(ScenarioParameterError::Probability { .. }))));
        assert!(matches!(tree.add_defense(Defense::new("d", 0, 0.5, 1)),
            Err(Error::Parameter(ScenarioParameterError::ZeroPeriod(_)))));
        assert!(tree.is_empty());
    }

    #[test]
    fn names_are_unique_identifiers() {
        let mut tree = Tree::new();
        tree.add_attack(Attack::new("a0", 1, 0.5)).unwrap();
        assert_eq!(tree.add_attack(Attack::new("a0", 2, 0.5)),
            Err(Error::Structural(StructuralError::DuplicateName("a0".to_string()))));
        assert_eq!(tree.add_attack(Attack::new("0a", 2, 0.5)),
            Err(Error::Structural(StructuralError::InvalidName("0a".to_string()))));
        assert_eq!(tree.add_attack(Attack::new("a-b", 2, 0.5)),
            Err(Error::Structural(StructuralError::InvalidName("a-b".to_string()))));
    }

    #[test]
    fn attack_defenses_must_be_defenses() {
        let mut tree = Tree::new();
        let a0 = tree.add_attack(Attack::new("a0", 1, 0.5)).unwrap();
        assert!(matches!(tree.add_attack(Attack::new("a1", 1, 0.5).with_defenses(&[a0])),
            Err(Error::Structural(StructuralError::WrongKind { expected: "a defense", .. }))));
        assert!(matches!(tree.add_attack(Attack::new("a1", 1, 0.5).with_defenses(&[42])),
            Err(Error::Structural(StructuralError::UnknownNode(42)))));
    }
}
