//! Export of an [`Admdp`] as an UPPAAL Stratego project.
//!
//! The automaton becomes a single template named [`TEMPLATE_NAME`].
//! Attacker, no-activation and activation-cost states are locations,
//! completion and defense states are branch points.
//! Every attack and defense gets its own clock, which together with the
//! constants in the global declaration drives the timed behavior:
//! an attack completes when its clock reaches its completion time,
//! a defense attempts a reset whenever its clock reaches its period.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::error::*;
use crate::admdp::{Admdp, StateId, StateKind, Edge, EdgeKind};
use crate::tree::NodeId;

pub const TEMPLATE_NAME: &str = "AttackDefenseADMDP";

// Layout of locations in the editor
const DX: i64 = 100;
const DY: i64 = 100;
const COLUMN: i64 = 8;

/// Parameters of the generated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConf {
    /// Number of simulation runs for expected values
    pub simulation_number: u32,
    /// Learn the cheapest strategy that reaches the goal within this time
    pub time_limit: Option<u32>,
    /// Learn the fastest strategy that reaches the goal within this cost
    pub cost_limit: Option<u32>,
    /// Bound for simulations that are not limited otherwise
    pub horizon: u32,
    /// Branch probabilities are exported as `round(p * probability_scale)`
    pub probability_scale: u32,
}

impl QueryConf {
    pub const STANDARD: QueryConf = QueryConf {
        simulation_number: 10000,
        time_limit: Some(1000),
        cost_limit: Some(400),
        horizon: 100000,
        probability_scale: 1000,
    };

    /// Only the fastest strategy, without limits.
    pub const FAST: QueryConf = QueryConf {
        time_limit: None,
        cost_limit: None,
        ..QueryConf::STANDARD
    };
}

impl Default for QueryConf {
    fn default() -> Self {
        QueryConf::STANDARD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Strategy,
    ExpectedTime,
    ExpectedCost,
    SuccessProbability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Name of the strategy the query learns or evaluates
    pub strategy: &'static str,
    pub kind: QueryKind,
    pub formula: String,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct UppaalExporter<'a> {
    admdp: &'a Admdp,
    conf: QueryConf,
    periods: FxHashMap<NodeId, u32>,
}

impl<'a> UppaalExporter<'a> {
    pub fn new(admdp: &'a Admdp) -> Self {
        UppaalExporter::with_conf(admdp, QueryConf::STANDARD)
    }

    pub fn with_conf(admdp: &'a Admdp, conf: QueryConf) -> Self {
        UppaalExporter {
            admdp,
            conf,
            periods: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn conf(&self) -> QueryConf {
        self.conf
    }

    pub fn set_conf(&mut self, conf: QueryConf) {
        self.conf = conf;
    }

    /// Override the period of a defense in the exported model.
    ///
    /// The automaton does not depend on defense periods, so it does not need
    /// to be rebuilt.
    pub fn set_defense_period(&mut self, name: &str, period: u32) -> Result<()> {
        let adg = self.admdp.adg();
        let defense = adg.tree().id(name)
            .ok_or_else(|| StructuralError::UnknownName(name.to_string()))?;
        adg.expect_defense(defense)?;
        if !adg.defenses().contains(&defense) {
            return Err(StructuralError::UnknownName(name.to_string()).into());
        }
        if period == 0 {
            return Err(ScenarioParameterError::ZeroPeriod(name.to_string()).into());
        }
        self.periods.insert(defense, period);
        Ok(())
    }

    /// Exported period of a defense.
    pub fn defense_period(&self, defense: NodeId) -> u32 {
        self.periods.get(&defense).copied()
            .or_else(|| self.admdp.adg().defense(defense).map(|d| d.period))
            .unwrap_or(0)
    }

    /// Name of the location of a state.
    pub fn location_name(&self, id: StateId) -> String {
        format!("{}_{id}", self.admdp.state(id).kind().tag())
    }

    /// Global declarations: clocks and constants for all attacks and defenses.
    pub fn declaration(&self) -> String {
        let adg = self.admdp.adg();
        let attacks: Vec<_> = adg.attacks().iter()
            .filter_map(|&a| adg.attack(a))
            .collect();
        let defenses: Vec<_> = adg.defenses().iter()
            .filter_map(|&d| adg.defense(d).map(|defense| (d, defense)))
            .collect();

        let mut out = String::new();
        let _ = writeln!(out, "const int n_a = {};", attacks.len());
        let _ = writeln!(out, "const int n_d = {};", defenses.len());
        out.push_str("hybrid clock time;\nhybrid clock cost;\n\nhybrid clock xcost;\n");

        if !attacks.is_empty() {
            out.push('\n');
            declare(&mut out, "hybrid clock", attacks.iter().map(|a| format!("x_{}", a.name)));
            declare(&mut out, "const int", attacks.iter()
                .map(|a| format!("t_{} = {}", a.name, a.completion_time)));
            declare(&mut out, "const double", attacks.iter()
                .map(|a| format!("p_{} = {:.5}", a.name, a.success_probability)));
            declare(&mut out, "const int", attacks.iter()
                .filter_map(|a| a.activation_cost.map(|c| format!("c_{} = {c}", a.name))));
            declare(&mut out, "const int", attacks.iter()
                .filter_map(|a| a.proportional_cost.map(|c| format!("cp_{} = {c}", a.name))));
        }
        if !defenses.is_empty() {
            out.push('\n');
            declare(&mut out, "hybrid clock", defenses.iter().map(|(_, d)| format!("x_{}", d.name)));
            declare(&mut out, "const int", defenses.iter()
                .map(|&(id, d)| format!("t_{} = {}", d.name, self.defense_period(id))));
            declare(&mut out, "const double", defenses.iter()
                .map(|(_, d)| format!("p_{} = {:.5}", d.name, d.success_probability)));
        }
        out
    }

    /// Goal of the queries: any accepting location.
    ///
    /// `None` if the root goal is unreachable.
    pub fn goal(&self) -> Option<String> {
        let locations: Vec<String> = self.admdp.accepting_states()
            .map(|id| format!("{TEMPLATE_NAME}.{}", self.location_name(id)))
            .collect();
        match locations.len() {
            0 => None,
            1 => locations.into_iter().next(),
            _ => Some(format!("({})", locations.join(" || "))),
        }
    }

    /// Queries learning and evaluating strategies that reach the accepting states.
    ///
    /// Without a reachable accepting state there is nothing to ask for.
    pub fn queries(&self) -> Vec<Query> {
        let Some(goal) = self.goal() else {
            return Vec::new();
        };
        let QueryConf { simulation_number: runs, horizon, .. } = self.conf;
        let mut queries = Vec::new();
        let mut push = |strategy, kind, formula: String, comment: String| {
            queries.push(Query { strategy, kind, formula, comment });
        };

        if self.conf.time_limit.is_none() && self.conf.cost_limit.is_none() {
            push("fast", QueryKind::Strategy,
                format!("strategy fast = minE(time)[time<={horizon}]: <>{goal}"),
                "Fast strategy".to_string());
            push("fast", QueryKind::ExpectedTime,
                format!("E[time<={horizon};{runs}](max: time) under fast"),
                "Expected time under fast".to_string());
            push("fast", QueryKind::ExpectedCost,
                format!("E[time<={horizon};{runs}](max: cost) under fast"),
                "Expected cost under fast".to_string());
            push("fast", QueryKind::SuccessProbability,
                format!("Pr[time<={horizon}](<>{goal}) under fast"),
                "Success probability under fast".to_string());
        }
        if let Some(limit) = self.conf.time_limit {
            push("cheap", QueryKind::Strategy,
                format!("strategy cheap = minE(cost)[time<={limit}]: <>{goal}"),
                "Cheap strategy".to_string());
            push("cheap", QueryKind::ExpectedTime,
                format!("E[time<={horizon};{runs}](max: time) under cheap"),
                "Expected time under cheap".to_string());
            push("cheap", QueryKind::ExpectedCost,
                format!("E[time<={horizon};{runs}](max: cost) under cheap"),
                "Expected cost under cheap".to_string());
            push("cheap", QueryKind::SuccessProbability,
                format!("Pr[time<={limit}](<>{goal}) under cheap"),
                "Success probability under cheap".to_string());
        }
        if let Some(limit) = self.conf.cost_limit {
            push("limited_cost", QueryKind::Strategy,
                format!("strategy limited_cost = minE(time)[cost<={limit}]: <>{goal}"),
                "Limited cost fastest strategy".to_string());
            push("limited_cost", QueryKind::ExpectedTime,
                format!("E[cost<={horizon};{runs}](max: time) under limited_cost"),
                "Expected time under limited cost".to_string());
            push("limited_cost", QueryKind::ExpectedCost,
                format!("E[cost<={horizon};{runs}](max: cost) under limited_cost"),
                "Expected cost under limited cost".to_string());
            push("limited_cost", QueryKind::SuccessProbability,
                format!("Pr[cost<={limit}](<>{goal}) under limited_cost"),
                "Success probability under limited cost".to_string());
        }
        queries
    }

    /// Complete project file.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<!DOCTYPE nta PUBLIC '-//Uppaal Team//DTD Flat System 1.1//EN' \
            'http://www.it.uu.se/research/group/darts/uppaal/flat-1_2.dtd'>\n");
        out.push_str("<nta>\n");
        let _ = writeln!(out, "\t<declaration>{}</declaration>", escape(&self.declaration()));
        self.write_template(&mut out);
        let _ = writeln!(out, "\t<system>system {TEMPLATE_NAME};</system>");

        let queries = self.queries();
        if queries.is_empty() {
            warn!("No accepting state, the exported model has no queries");
            out.push_str("\t<queries></queries>\n");
        } else {
            out.push_str("\t<queries>\n");
            for query in queries {
                out.push_str("\t\t<query>\n");
                let _ = writeln!(out, "\t\t\t<formula>{}</formula>", escape(&query.formula));
                let _ = writeln!(out, "\t\t\t<comment>{}</comment>", escape(&query.comment));
                out.push_str("\t\t</query>\n");
            }
            out.push_str("\t</queries>\n");
        }
        out.push_str("</nta>\n");
        out
    }

    pub fn write(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_xml())?;
        info!("Wrote UPPAAL model with {} locations to {}", self.admdp.n_states(), path.display());
        Ok(())
    }

    fn write_template(&self, out: &mut String) {
        out.push_str("\t<template>\n");
        let _ = writeln!(out, "\t\t<name x=\"0\" y=\"0\">{TEMPLATE_NAME}</name>");
        out.push_str("\t\t<parameter></parameter>\n\t\t<declaration></declaration>\n");

        let n_states = self.admdp.n_states() as StateId;
        // Locations have to precede branch points
        for id in (0..n_states).filter(|&id| !self.admdp.state(id).kind().is_branchpoint()) {
            let (x, y) = position(id);
            let _ = writeln!(out, "\t\t<location id=\"id{id}\" x=\"{x}\" y=\"{y}\">");
            let _ = writeln!(out, "\t\t\t<name x=\"{}\" y=\"{}\">{}</name>", x - 50, y - 34, self.location_name(id));
            let _ = writeln!(out, "\t\t\t<label kind=\"invariant\" x=\"{}\" y=\"{}\">{}</label>",
                x - 50, y + 20, escape(&self.invariant(id)));
            out.push_str("\t\t</location>\n");
        }
        for id in (0..n_states).filter(|&id| self.admdp.state(id).kind().is_branchpoint()) {
            let (x, y) = position(id);
            let _ = writeln!(out, "\t\t<branchpoint id=\"id{id}\" x=\"{x}\" y=\"{y}\"></branchpoint>");
        }
        let _ = writeln!(out, "\t\t<init ref=\"id{}\"></init>", self.admdp.initial());
        for edge in self.admdp.all_edges() {
            self.write_transition(out, edge);
        }
        out.push_str("\t</template>\n");
    }

    fn invariant(&self, id: StateId) -> String {
        let adg = self.admdp.adg();
        let state = self.admdp.state(id);
        if state.accepting {
            // Time and cost stop once the goal is reached
            return "time' == 0 && cost' == 0".to_string();
        }
        match state.kind() {
            StateKind::ActivationCost { attack } => {
                let mut inv = format!("time' == 0 &&\nxcost <= 1 &&\ncost' == c_{}", adg.name(attack));
                for &node in adg.attacks().iter().chain(adg.defenses()) {
                    let _ = write!(inv, " &&\nx_{}' == 0", adg.name(node));
                }
                inv
            },
            _ => {
                let rates: Vec<String> = state.activated().iter()
                    .filter_map(|&a| adg.attack(a))
                    .filter(|a| a.proportional_cost.is_some())
                    .map(|a| format!("cp_{}", a.name))
                    .collect();
                let mut inv = if rates.is_empty() {
                    "cost' == 0".to_string()
                } else {
                    format!("cost' == {}", rates.join(" + "))
                };
                for &defense in adg.defenses() {
                    let name = adg.name(defense);
                    let _ = write!(inv, " &&\nx_{name} <= t_{name}");
                }
                for &attack in state.activated() {
                    let name = adg.name(attack);
                    let _ = write!(inv, " &&\nx_{name} <= t_{name}");
                }
                inv
            },
        }
    }

    fn write_transition(&self, out: &mut String, edge: &Edge) {
        let adg = self.admdp.adg();
        let mut controllable = true;
        let mut labels: Vec<(&str, String)> = Vec::new();
        match edge.kind {
            EdgeKind::Activation { attack } => {
                labels.push(("assignment", format!("x_{} = 0", adg.name(attack))));
                if matches!(self.admdp.state(edge.source).kind(), StateKind::ActivationCost { .. }) {
                    controllable = false;
                    labels.push(("guard", "xcost >= 1".to_string()));
                }
            },
            EdgeKind::ActivationCost { .. } => {
                labels.push(("assignment", "xcost = 0".to_string()));
            },
            EdgeKind::NoActivation => {},
            EdgeKind::ToCompletion { attack } => {
                controllable = false;
                let name = adg.name(attack);
                labels.push(("guard", format!("x_{name} >= t_{name}")));
            },
            EdgeKind::ToDefense { defense } | EdgeKind::LoopDefense { defense } => {
                controllable = false;
                labels.push(("assignment", format!("x_{} = 0", adg.name(defense))));
                labels.push(("guard", self.defense_guard(defense)));
            },
            EdgeKind::Completion { probability, .. } | EdgeKind::Defense { probability, .. } => {
                let weight = (probability * f64::from(self.conf.probability_scale)).round() as u64;
                labels.push(("probability", weight.to_string()));
            },
        }

        let (sx, sy) = position(edge.source);
        let (tx, ty) = position(edge.destination);
        let (lx, ly) = ((sx + tx) / 2, (sy + ty) / 2);
        if controllable {
            out.push_str("\t\t<transition>\n");
        } else {
            out.push_str("\t\t<transition controllable=\"false\">\n");
        }
        let _ = writeln!(out, "\t\t\t<source ref=\"id{}\"></source>", edge.source);
        let _ = writeln!(out, "\t\t\t<target ref=\"id{}\"></target>", edge.destination);
        for (kind, text) in labels {
            let _ = writeln!(out, "\t\t\t<label kind=\"{kind}\" x=\"{lx}\" y=\"{ly}\">{}</label>", escape(&text));
        }
        out.push_str("\t\t</transition>\n");
    }

    // A defense only fires while none of its followers is due
    fn defense_guard(&self, defense: NodeId) -> String {
        let adg = self.admdp.adg();
        let name = adg.name(defense);
        let mut guard = format!("x_{name} >= t_{name}");
        for &follower in adg.followers(defense) {
            let f = adg.name(follower);
            let _ = write!(guard, " && x_{f} < t_{f}");
        }
        guard
    }
}

fn position(id: StateId) -> (i64, i64) {
    let id = i64::from(id);
    (DX * (id / COLUMN), DY * (id % COLUMN))
}

fn declare(out: &mut String, prefix: &str, items: impl Iterator<Item=String>) {
    let items: Vec<String> = items.collect();
    if !items.is_empty() {
        let _ = writeln!(out, "{prefix} {};", items.join(", "));
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
