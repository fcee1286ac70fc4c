//! Declarative scenario format.
//!
//! A [`Scenario`] describes a whole attack-defense tree as one nested value,
//! which is convenient to read from JSON:
//!
//! ```json
//! {
//!   "defenses": [
//!     { "name": "d0", "period": 10, "success_probability": 0.5, "cost": 1 }
//!   ],
//!   "root": {
//!     "type": "subgoal", "name": "g0", "operation": "or",
//!     "children": [
//!       { "type": "attack", "name": "a0", "completion_time": 100,
//!         "success_probability": 0.8, "activation_cost": 1, "defenses": ["d0"] },
//!       { "type": "attack", "name": "a1", "completion_time": 10, "success_probability": 0.9 }
//!     ]
//!   }
//! }
//! ```
//!
//! Defenses can be declared in the top-level list or inline, as children of
//! the subgoal they protect. Attacks refer to their defenses by name; the
//! defense must be declared before the attack, in depth-first order.

use serde::{Serialize, Deserialize};

use crate::error::*;
use super::{Tree, NodeId, Attack, Defense, OperationType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub defenses: Vec<DefenseSpec>,
    pub root: ScenarioNode,
    /// Maximum number of attack and subgoal children per subgoal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_arity: Option<usize>,
}

// Integers are read as i64 so that negative values can be reported properly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseSpec {
    pub name: String,
    pub period: i64,
    pub success_probability: f64,
    #[serde(default)]
    pub cost: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScenarioNode {
    Attack {
        name: String,
        completion_time: i64,
        success_probability: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        activation_cost: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        proportional_cost: Option<i64>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        defenses: Vec<String>,
    },
    Defense(DefenseSpec),
    Subgoal {
        name: String,
        operation: OperationType,
        children: Vec<ScenarioNode>,
        #[serde(default)]
        reset: bool,
    },
}

enum Frame<'a> {
    Enter(&'a ScenarioNode),
    // All children of this subgoal have been added
    Exit(&'a ScenarioNode),
}

impl Scenario {
    /// Build the tree described by this scenario and assign parents.
    ///
    /// Returns the tree together with the id of its root.
    pub fn into_tree(self) -> Result<(Tree, NodeId)> {
        let mut tree = match self.max_arity {
            Some(max) => Tree::with_max_arity(max),
            None => Tree::new(),
        };
        for defense in &self.defenses {
            add_defense(&mut tree, defense)?;
        }

        // Post-order walk, children are added before their subgoal
        let mut added: Vec<NodeId> = Vec::new();
        let mut stack = vec![Frame::Enter(&self.root)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(node @ ScenarioNode::Subgoal { children, .. }) => {
                    stack.push(Frame::Exit(node));
                    stack.extend(children.iter().rev().map(Frame::Enter));
                },
                Frame::Enter(ScenarioNode::Defense(defense)) => {
                    added.push(add_defense(&mut tree, defense)?);
                },
                Frame::Enter(ScenarioNode::Attack {
                    name,
                    completion_time,
                    success_probability,
                    activation_cost,
                    proportional_cost,
                    defenses,
                }) => {
                    let mut attack = Attack::new(
                        name.as_str(),
                        non_negative(name, "completion time", *completion_time)?,
                        *success_probability,
                    );
                    if let Some(cost) = activation_cost {
                        attack = attack.with_activation_cost(non_negative(name, "activation cost", *cost)?);
                    }
                    if let Some(cost) = proportional_cost {
                        attack = attack.with_proportional_cost(non_negative(name, "proportional cost", *cost)?);
                    }
                    for defense in defenses {
                        let id = tree.id(defense)
                            .ok_or_else(|| StructuralError::UnknownName(defense.clone()))?;
                        attack.defenses.push(id);
                    }
                    added.push(tree.add_attack(attack)?);
                },
                Frame::Exit(ScenarioNode::Subgoal { name, operation, children, reset }) => {
                    let children_ids = added.split_off(added.len() - children.len());
                    added.push(tree.add_subgoal(name.as_str(), *operation, &children_ids, *reset)?);
                },
                Frame::Exit(_) => unreachable!("only subgoals are exited"),
            }
        }

        let root = added.pop().ok_or(StructuralError::RootNotSubgoal(String::new()))?;
        tree.set_parents(root)?;
        Ok((tree, root))
    }
}

fn add_defense(tree: &mut Tree, spec: &DefenseSpec) -> Result<NodeId> {
    tree.add_defense(Defense::new(
        spec.name.as_str(),
        non_negative(&spec.name, "period", spec.period)?,
        spec.success_probability,
        non_negative(&spec.name, "cost", spec.cost)?,
    ))
}

fn non_negative(node: &str, field: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(ScenarioParameterError::Negative { node: node.to_string(), field, value }.into());
    }
    u32::try_from(value)
        .map_err(|_| ScenarioParameterError::TooLarge { node: node.to_string(), field, value }.into())
}


#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "defenses": [
            { "name": "d0", "period": 10, "success_probability": 0.5, "cost": 1 }
        ],
        "root": {
            "type": "subgoal", "name": "g0", "operation": "or",
            "children": [
                { "type": "attack", "name": "a0", "completion_time": 100,
                  "success_probability": 0.8, "activation_cost": 1, "defenses": ["d0"] },
                { "type": "subgoal", "name": "g1", "operation": "and", "reset": true,
                  "children": [
                    { "type": "defense", "name": "d1", "period": 20, "success_probability": 0.3 },
                    { "type": "attack", "name": "a1", "completion_time": 10, "success_probability": 0.9 },
                    { "type": "attack", "name": "a2", "completion_time": 5, "success_probability": 1.0 }
                  ] }
            ]
        }
    }"#;

    #[test]
    fn load_json_scenario() {
        let scenario: Scenario = serde_json::from_str(JSON).unwrap();
        let (tree, root) = scenario.into_tree().unwrap();
        assert_eq!(tree.name(root), "g0");

        let a0 = tree.node(tree.id("a0").unwrap()).as_attack().unwrap();
        assert_eq!(a0.activation_cost, Some(1));
        assert_eq!(a0.defenses, vec![tree.id("d0").unwrap()]);

        let g1_id = tree.id("g1").unwrap();
        let g1 = tree.node(g1_id).as_subgoal().unwrap();
        assert!(g1.reset);
        assert_eq!(g1.operation_type, OperationType::And);
        assert_eq!(g1.defenses, vec![tree.id("d1").unwrap()]);
        assert_eq!(g1.attack_children.len(), 2);
        assert_eq!(tree.node(tree.id("a2").unwrap()).parent(), Some(g1_id));
        assert_eq!(tree.node(g1_id).parent(), Some(root));
    }

    #[test]
    fn negative_values_are_rejected() {
        let json = r#"{ "root": { "type": "subgoal", "name": "g", "operation": "or", "children": [
            { "type": "attack", "name": "a", "completion_time": -3, "success_probability": 0.5 }
        ] } }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.into_tree().unwrap_err(), Error::Parameter(ScenarioParameterError::Negative {
            node: "a".to_string(),
            field: "completion time",
            value: -3,
        }));
    }

    #[test]
    fn unknown_defense_name() {
        let json = r#"{ "root": { "type": "subgoal", "name": "g", "operation": "or", "children": [
            { "type": "attack", "name": "a", "completion_time": 3, "success_probability": 0.5,
              "defenses": ["nope"] }
        ] } }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.into_tree().unwrap_err(),
            Error::Structural(StructuralError::UnknownName("nope".to_string())));
    }
}
