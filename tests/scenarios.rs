use std::collections::VecDeque;

use ::admdp::*;
use ::admdp::uppaal::{UppaalExporter, QueryConf};

// gt: OR
// ├── g1: OR
// │   ├── a2
// │   └── g0: AND [d0]
// │       ├── a0
// │       └── a1
// └── g2: OR
//     ├── a3
//     └── g3: EDGE, reset [d1]
//         └── g4: OR, reset [d2]
//             ├── a4
//             └── g5: AND
//                 ├── g6: AND
//                 │   ├── a5
//                 │   └── a6
//                 └── g7: AND [d3]
//                     └── a7
fn large() -> (Tree, NodeId) {
    let mut tree = Tree::new();
    let a0 = tree.add_attack(Attack::new("a0", 100, 0.66)
        .with_activation_cost(10)
        .with_proportional_cost(1)).unwrap();
    let a1 = tree.add_attack(Attack::new("a1", 10, 0.1).with_activation_cost(1)).unwrap();
    let a2 = tree.add_attack(Attack::new("a2", 10, 0.5).with_activation_cost(300)).unwrap();
    let a3 = tree.add_attack(Attack::new("a3", 700, 0.95).with_activation_cost(1)).unwrap();
    let a4 = tree.add_attack(Attack::new("a4", 200, 0.75).with_activation_cost(6)).unwrap();
    let a5 = tree.add_attack(Attack::new("a5", 20, 0.66).with_activation_cost(1)).unwrap();
    let a6 = tree.add_attack(Attack::new("a6", 100, 0.9).with_activation_cost(1)).unwrap();
    let a7 = tree.add_attack(Attack::new("a7", 30, 0.1).with_activation_cost(1)).unwrap();

    let d0 = tree.add_defense(Defense::new("d0", 50, 0.6, 1)).unwrap();
    let d1 = tree.add_defense(Defense::new("d1", 40, 0.8, 1)).unwrap();
    let d2 = tree.add_defense(Defense::new("d2", 40, 0.3, 1)).unwrap();
    let d3 = tree.add_defense(Defense::new("d3", 20, 0.7, 1)).unwrap();

    let g0 = tree.add_subgoal("g0", OperationType::And, &[d0, a0, a1], false).unwrap();
    let g1 = tree.add_subgoal("g1", OperationType::Or, &[g0, a2], false).unwrap();
    let g7 = tree.add_subgoal("g7", OperationType::And, &[d3, a7], false).unwrap();
    let g6 = tree.add_subgoal("g6", OperationType::And, &[a5, a6], false).unwrap();
    let g5 = tree.add_subgoal("g5", OperationType::And, &[g6, g7], false).unwrap();
    let g4 = tree.add_subgoal("g4", OperationType::Or, &[d2, a4, g5], true).unwrap();
    let g3 = tree.add_subgoal("g3", OperationType::Edge, &[d1, g4], true).unwrap();
    let g2 = tree.add_subgoal("g2", OperationType::Or, &[a3, g3], false).unwrap();
    let gt = tree.add_subgoal("gt", OperationType::Or, &[g1, g2], false).unwrap();
    (tree, gt)
}

fn build() -> Admdp {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tree, root) = large();
    Admdp::new(Adg::new(tree, root).unwrap()).unwrap()
}

#[test]
fn accepting_state() {
    let admdp = build();
    let goal = admdp.accepting().unwrap();
    assert_eq!(admdp.state_name(goal), "Attacker(activated: [], completed: [gt])");
    assert_eq!(admdp.accepting_states().collect::<Vec<_>>(), [goal]);
    assert!(admdp.edges(goal).is_empty());
}

#[test]
fn branch_completeness() {
    let admdp = build();
    for (id, state) in admdp.states().iter().enumerate() {
        let edges = admdp.edges(id as StateId);
        match state.kind() {
            StateKind::Completion { .. } | StateKind::Defense { .. } => {
                assert_eq!(edges.len(), 2, "{}", admdp.state_name(id as StateId));
                let total: f64 = edges.iter().filter_map(|e| e.kind.probability()).sum();
                assert!((total - 1.0).abs() < 1e-9);
            },
            StateKind::ActivationCost { attack } => {
                assert_eq!(edges.len(), 1);
                assert_eq!(edges[0].kind, EdgeKind::Activation { attack });
            },
            StateKind::NoActivation => {
                // One edge per activated attack and one per defense
                let expected = state.activated().len() + admdp.adg().defenses().len();
                assert_eq!(edges.len(), expected);
            },
            StateKind::Attacker => {
                assert!(state.accepting || !edges.is_empty(), "{}", admdp.state_name(id as StateId));
            },
        }
    }
}

#[test]
fn reachability_closure() {
    let admdp = build();
    let mut seen = vec![false; admdp.n_states()];
    let mut queue = VecDeque::from([admdp.initial()]);
    seen[admdp.initial() as usize] = true;
    while let Some(id) = queue.pop_front() {
        for edge in admdp.edges(id) {
            assert_eq!(edge.source, id);
            if !seen[edge.destination as usize] {
                seen[edge.destination as usize] = true;
                queue.push_back(edge.destination);
            }
        }
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn states_are_canonical() {
    let admdp = build();
    let adg = admdp.adg();
    for (id, state) in admdp.states().iter().enumerate() {
        let mut conf = state.configuration();
        adg.normalize(&mut conf);
        assert_eq!(conf, state.configuration(), "{}", admdp.state_name(id as StateId));
        assert_eq!(admdp.state_id(state.key()), Some(id as StateId));
    }
}

#[test]
fn reset_defenses_clear_their_subtree() {
    let admdp = build();
    let adg = admdp.adg();
    let tree = adg.tree();
    for name in ["d1", "d2"] {
        let defense = tree.id(name).unwrap();
        let owner = adg.owners(defense)[0];
        let subtree = tree.dfs(owner);
        let successes = admdp.all_edges().iter()
            .filter(|e| matches!(e.kind, EdgeKind::Defense { defense: d, success: true, .. } if d == defense));
        let mut count = 0;
        for edge in successes {
            let target = admdp.state(edge.destination);
            assert!(target.activated().iter().chain(target.completed()).all(|n| !subtree.contains(n)));
            count += 1;
        }
        assert!(count > 0, "{name} never succeeds");
    }
}

#[test]
fn deterministic() {
    let first = build();
    let second = build();
    assert_eq!(first.n_states(), second.n_states());
    assert_eq!(first.all_edges(), second.all_edges());
    for id in 0..first.n_states() as StateId {
        assert_eq!(first.state_name(id), second.state_name(id));
    }
}

#[test]
fn state_limit() {
    let (tree, root) = large();
    let adg = Adg::new(tree, root).unwrap();
    let err = Admdp::with_conf(adg, BuildConf { max_states: 10 }).unwrap_err();
    assert_eq!(err, Error::StateLimit(10));
}

#[test]
fn export() {
    let admdp = build();
    let exporter = UppaalExporter::new(&admdp);
    let xml = exporter.to_xml();
    let locations = xml.matches("<location ").count();
    let branchpoints = xml.matches("<branchpoint ").count();
    assert_eq!(locations + branchpoints, admdp.n_states());
    assert_eq!(xml.matches("<transition").count(), admdp.n_edges());
    assert_eq!(xml.matches("<query>").count(), 8);
    assert!(xml.contains("const int n_a = 8;\nconst int n_d = 4;\n"));
    assert!(xml.contains("const int c_a2 = 300, c_a0 = 10, c_a1 = 1, c_a3 = 1, c_a4 = 6, c_a5 = 1, c_a6 = 1, c_a7 = 1;"));

    let fast = UppaalExporter::with_conf(&admdp, QueryConf::FAST).to_xml();
    assert_eq!(fast.matches("<query>").count(), 4);
}

#[cfg(feature = "serde")]
#[test]
fn json_scenario_matches_builder() {
    use ::admdp::tree::scenario::Scenario;

    let json = r#"{
        "root": { "type": "subgoal", "name": "gt", "operation": "or", "children": [
            { "type": "subgoal", "name": "g1", "operation": "or", "children": [
                { "type": "subgoal", "name": "g0", "operation": "and", "children": [
                    { "type": "defense", "name": "d0", "period": 50, "success_probability": 0.6, "cost": 1 },
                    { "type": "attack", "name": "a0", "completion_time": 100, "success_probability": 0.66,
                      "activation_cost": 10, "proportional_cost": 1 },
                    { "type": "attack", "name": "a1", "completion_time": 10, "success_probability": 0.1,
                      "activation_cost": 1 }
                ] },
                { "type": "attack", "name": "a2", "completion_time": 10, "success_probability": 0.5,
                  "activation_cost": 300 }
            ] },
            { "type": "subgoal", "name": "g2", "operation": "or", "children": [
                { "type": "attack", "name": "a3", "completion_time": 700, "success_probability": 0.95,
                  "activation_cost": 1 },
                { "type": "subgoal", "name": "g3", "operation": "edge", "reset": true, "children": [
                    { "type": "defense", "name": "d1", "period": 40, "success_probability": 0.8, "cost": 1 },
                    { "type": "subgoal", "name": "g4", "operation": "or", "reset": true, "children": [
                        { "type": "defense", "name": "d2", "period": 40, "success_probability": 0.3, "cost": 1 },
                        { "type": "attack", "name": "a4", "completion_time": 200, "success_probability": 0.75,
                          "activation_cost": 6 },
                        { "type": "subgoal", "name": "g5", "operation": "and", "children": [
                            { "type": "subgoal", "name": "g6", "operation": "and", "children": [
                                { "type": "attack", "name": "a5", "completion_time": 20,
                                  "success_probability": 0.66, "activation_cost": 1 },
                                { "type": "attack", "name": "a6", "completion_time": 100,
                                  "success_probability": 0.9, "activation_cost": 1 }
                            ] },
                            { "type": "subgoal", "name": "g7", "operation": "and", "children": [
                                { "type": "defense", "name": "d3", "period": 20, "success_probability": 0.7, "cost": 1 },
                                { "type": "attack", "name": "a7", "completion_time": 30,
                                  "success_probability": 0.1, "activation_cost": 1 }
                            ] }
                        ] }
                    ] }
                ] }
            ] }
        ] }
    }"#;
    let scenario: Scenario = serde_json::from_str(json).unwrap();
    let (tree, root) = scenario.into_tree().unwrap();
    let from_json = Admdp::new(Adg::new(tree, root).unwrap()).unwrap();
    let built = build();
    assert_eq!(from_json.n_states(), built.n_states());
    assert_eq!(from_json.n_edges(), built.n_edges());
    for id in 0..built.n_states() as StateId {
        assert_eq!(from_json.state_name(id), built.state_name(id));
    }
}
