//! Compilation of attack-defense trees into attack-defense Markov decision
//! processes (ADMDPs), and export of those to
//! [UPPAAL Stratego](https://uppaal.org/features/#uppaal-stratego)
//! for strategy synthesis.
//!
//! An attack-defense tree describes how an attacker can reach a root goal by
//! completing attacks, combined through AND, OR and EDGE subgoals.
//! Defenses are attached to attacks and subgoals and periodically try to reset
//! the attacker's progress.
//! The ADMDP explores every canonical configuration of attack progress that
//! can be reached, alternating between choices of the attacker and stochastic
//! outcomes of attacks and defenses.
//!
//! Requires **Rust version** >= 1.73.
//!
//! # Usage
//!
//! A scenario is first assembled as a [`Tree`]. Wrapping it in an [`Adg`]
//! checks the structure and indexes all nodes below the root, after which the
//! automaton is built with [`Admdp::new()`].
//!
//! ```
//! use admdp::{Tree, Attack, Defense, OperationType, Adg, Admdp};
//! use admdp::uppaal::UppaalExporter;
//!
//! let mut tree = Tree::new();
//! let d0 = tree.add_defense(Defense::new("d0", 50, 0.6, 1))?;
//! let a0 = tree.add_attack(Attack::new("a0", 100, 0.66)
//!     .with_activation_cost(10)
//!     .with_defenses(&[d0]))?;
//! let a1 = tree.add_attack(Attack::new("a1", 10, 0.1))?;
//! let root = tree.add_subgoal("root", OperationType::Or, &[a0, a1], false)?;
//!
//! let admdp = Admdp::new(Adg::new(tree, root)?)?;
//! let goal = admdp.accepting().unwrap();
//! assert_eq!(admdp.state_name(goal), "Attacker(activated: [], completed: [root])");
//!
//! // Every state and edge can be inspected
//! for edge in admdp.edges(admdp.initial()) {
//!     println!("{} -> {}", edge.kind.tag(), admdp.state_name(edge.destination));
//! }
//!
//! let xml = UppaalExporter::new(&admdp).to_xml();
//! assert!(xml.contains("<system>system AttackDefenseADMDP;</system>"));
//! # Ok::<(), admdp::Error>(())
//! ```
//!
//! ### Verification
//!
//! The exported model contains queries that learn strategies for the
//! attacker (see [`uppaal::QueryConf`]).
//! If UPPAAL is installed, [`verify::Verifyta`] runs them and reads back
//! expected time, expected cost and success probability of each strategy:
//!
//! ```no_run
//! # use admdp::{Tree, Attack, OperationType, Adg, Admdp};
//! use admdp::uppaal::{UppaalExporter, QueryConf};
//! use admdp::verify::Verifyta;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut tree = Tree::new();
//! # let a0 = tree.add_attack(Attack::new("a0", 100, 0.66))?;
//! # let root = tree.add_subgoal("root", OperationType::Or, &[a0], false)?;
//! # let admdp = Admdp::new(Adg::new(tree, root)?)?;
//! let exporter = UppaalExporter::with_conf(&admdp, QueryConf::FAST);
//! let verifyta = Verifyta::new("/opt/uppaal/bin/verifyta");
//! for result in verifyta.verify(&exporter, "model.xml")? {
//!     println!("{}: {:?}", result.strategy, result.expected_time);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Serde
//!
//! When compiled with the feature flag `serde` (disabled by default),
//! the node types implement serde's `Serialize` and `Deserialize` traits,
//! and whole scenarios can be read with
//! [`Scenario`](crate::tree::scenario::Scenario).
//! The feature `cli` additionally builds the `admdp` binary,
//! which compiles a JSON scenario into an UPPAAL model.

pub mod tree;
pub mod adg;
pub mod admdp;
pub mod uppaal;
pub mod verify;
mod error;

// Re-exports
pub use error::*;
pub use tree::{Tree, NodeId, Node, NodeKind, Attack, Defense, Subgoal, OperationType};
pub use adg::{Adg, Configuration};
pub use admdp::{Admdp, BuildConf, State, StateId, StateKey, StateKind, Edge, EdgeKind};
