//! Running `verifyta` on an exported model and reading back its results.
//!
//! The output of verifyta contains one block per query, introduced by a
//! `Verifying formula N` line. Queries come in groups of four per strategy
//! (see [`UppaalExporter::queries()`]): learning the strategy, its expected
//! time, its expected cost and its success probability.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use log::{debug, info, warn};
use regex_lite::Regex;

use crate::error::VerifyError;
use crate::uppaal::{Query, QueryKind, UppaalExporter};

/// Environment variable naming the verifyta binary.
pub const VERIFYTA_ENV: &str = "ADMDP_VERIFYTA";

const NUMBER: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?";

/// Simulation estimate `mean ± deviation`, with the deviation being the half
/// width of the confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub mean: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub strategy: String,
    /// Whether a strategy reaching the goal was found. Without one, the other
    /// fields are `None`.
    pub satisfied: bool,
    pub expected_time: Option<Estimate>,
    pub expected_cost: Option<Estimate>,
    /// Confidence interval of the probability to reach the goal
    pub success_probability: Option<(f64, f64)>,
}

impl StrategyResult {
    fn new(strategy: &str) -> Self {
        StrategyResult {
            strategy: strategy.to_string(),
            satisfied: false,
            expected_time: None,
            expected_cost: None,
            success_probability: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verifyta {
    binary: PathBuf,
}

impl Verifyta {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Verifyta { binary: binary.into() }
    }

    /// Binary named by [`VERIFYTA_ENV`], if set.
    pub fn from_env() -> Option<Self> {
        env::var_os(VERIFYTA_ENV)
            .filter(|path| !path.is_empty())
            .map(Verifyta::new)
    }

    #[inline]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run verifyta on a model file containing `queries`.
    pub fn run(&self, model: impl AsRef<OsStr>, queries: &[Query]) -> Result<Vec<StrategyResult>, VerifyError> {
        info!("Running {} on {}", self.binary.display(), model.as_ref().to_string_lossy());
        let output = Command::new(&self.binary)
            .arg("-s")
            .arg(model)
            .output()?;
        if !output.status.success() {
            warn!("verifyta exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr));
        }
        parse_output(&String::from_utf8_lossy(&output.stdout), queries)
    }

    /// Write the model of `exporter` to `path` and verify it.
    pub fn verify(&self, exporter: &UppaalExporter, path: impl AsRef<Path>) -> Result<Vec<StrategyResult>, VerifyError> {
        let path = path.as_ref();
        exporter.write(path)?;
        self.run(path, &exporter.queries())
    }
}

/// Extract the results for each strategy in `queries` from verifyta output.
pub fn parse_output(output: &str, queries: &[Query]) -> Result<Vec<StrategyResult>, VerifyError> {
    let output = output.replace("\x1b[2K", "").replace("\x1b[K", "");
    let blocks = formula_blocks(&output);
    debug!("verifyta reported {} formulas for {} queries", blocks.len(), queries.len());

    let mut results: Vec<StrategyResult> = Vec::new();
    for (index, query) in queries.iter().enumerate() {
        let formula = index + 1;
        if results.last().map_or(true, |r| r.strategy != query.strategy) {
            results.push(StrategyResult::new(query.strategy));
        }
        let Some(result) = results.last_mut() else {
            continue;
        };
        if query.kind != QueryKind::Strategy && !result.satisfied {
            continue;
        }
        let block = blocks.iter()
            .find(|&&(n, _)| n == formula)
            .map(|&(_, text)| text)
            .ok_or(VerifyError::MissingOutput(formula))?;
        match query.kind {
            QueryKind::Strategy => {
                result.satisfied = block.contains("Formula is satisfied.");
                if !result.satisfied {
                    info!("No strategy {} found", query.strategy);
                }
            },
            QueryKind::ExpectedTime => result.expected_time = Some(parse_estimate(block, formula)?),
            QueryKind::ExpectedCost => result.expected_cost = Some(parse_estimate(block, formula)?),
            QueryKind::SuccessProbability => {
                result.success_probability = Some(parse_interval(block, formula)?);
            },
        }
    }
    Ok(results)
}

// Pairs of formula number and the text reported for it
fn formula_blocks(output: &str) -> Vec<(usize, &str)> {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    let header = ONCE.get_or_init(|| Regex::new(r"Verifying formula (\d+)").expect("Static regex"));

    let starts: Vec<_> = header.captures_iter(output)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().parse::<usize>().ok()?)))
        .collect();
    starts.iter().enumerate().map(|(i, &(start, n))| {
        let end = starts.get(i + 1).map_or(output.len(), |&(next, _)| next);
        (n, &output[start..end])
    }).collect()
}

fn parse_estimate(block: &str, formula: usize) -> Result<Estimate, VerifyError> {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    let re = ONCE.get_or_init(|| Regex::new(&format!(r"≈\s*({NUMBER})\s*±\s*({NUMBER})")).expect("Static regex"));
    let caps = re.captures(block)
        .ok_or(VerifyError::MissingResult { formula, expected: "an expected value" })?;
    Ok(Estimate {
        mean: caps[1].parse()?,
        deviation: caps[2].parse()?,
    })
}

fn parse_interval(block: &str, formula: usize) -> Result<(f64, f64), VerifyError> {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    let re = ONCE.get_or_init(|| Regex::new(&format!(r"in \[\s*({NUMBER})\s*,\s*({NUMBER})\s*\]")).expect("Static regex"));
    let caps = re.captures(block)
        .ok_or(VerifyError::MissingResult { formula, expected: "a probability interval" })?;
    Ok((caps[1].parse()?, caps[2].parse()?))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn query(strategy: &'static str, kind: QueryKind) -> Query {
        Query {
            strategy,
            kind,
            formula: String::new(),
            comment: String::new(),
        }
    }

    fn queries(strategy: &'static str) -> Vec<Query> {
        vec![
            query(strategy, QueryKind::Strategy),
            query(strategy, QueryKind::ExpectedTime),
            query(strategy, QueryKind::ExpectedCost),
            query(strategy, QueryKind::SuccessProbability),
        ]
    }

    const OUTPUT: &str = "\
Options for the verification:
  Generating no trace
  Search order is breadth first

\x1b[2KVerifying formula 1 at /nta/queries/query[1]/formula
\x1b[K -- Formula is satisfied.
Learning statistics for best strategy:
\tNumber of resets: 2

\x1b[2KVerifying formula 2 at /nta/queries/query[2]/formula
 -- Formula is satisfied.
(10000 runs) E(max) \u{2248} 186.215 \u{b1} 2.11387 (95% CI)
Values in [10,999.0] mean=186.215 steps=1

\x1b[2KVerifying formula 3 at /nta/queries/query[3]/formula
 -- Formula is satisfied.
(10000 runs) E(max) \u{2248} 41 \u{b1} 0.5 (95% CI)

\x1b[2KVerifying formula 4 at /nta/queries/query[4]/formula
 -- Formula is satisfied.
(2995 runs) Pr(<> ...) in [0.898,0.998] (95% CI)
";

    #[test]
    fn parse_strategy() {
        let results = parse_output(OUTPUT, &queries("cheap")).unwrap();
        assert_eq!(results, [StrategyResult {
            strategy: "cheap".to_string(),
            satisfied: true,
            expected_time: Some(Estimate { mean: 186.215, deviation: 2.11387 }),
            expected_cost: Some(Estimate { mean: 41.0, deviation: 0.5 }),
            success_probability: Some((0.898, 0.998)),
        }]);
    }

    #[test]
    fn unsatisfied_strategy() {
        let output = "Verifying formula 1 at /nta/queries/query[1]/formula\n -- Formula is NOT satisfied.\n";
        let results = parse_output(output, &queries("fast")).unwrap();
        assert_eq!(results, [StrategyResult::new("fast")]);
    }

    #[test]
    fn missing_output() {
        let mut qs = queries("cheap");
        qs.extend(queries("limited_cost"));
        assert!(matches!(parse_output(OUTPUT, &qs), Err(VerifyError::MissingOutput(5))));

        let truncated = &OUTPUT[..OUTPUT.find("(10000 runs)").unwrap()];
        assert!(matches!(parse_output(truncated, &queries("cheap")),
            Err(VerifyError::MissingResult { formula: 2, .. })));
    }

    #[test]
    fn blocks_are_split_by_formula() {
        let blocks = formula_blocks(OUTPUT);
        assert_eq!(blocks.iter().map(|b| b.0).collect::<Vec<_>>(), [1, 2, 3, 4]);
        assert!(blocks[3].1.contains("Pr(<> ...)"));
        assert!(!blocks[0].1.contains("E(max)"));
    }
}
