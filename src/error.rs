use std::{fmt, io, num, error, result};

/// Malformed scenario trees. The scenario has to be fixed before an
/// automaton can be built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A node would receive a second, different parent.
    ConflictingParent { node: String, parent: String, other: String },
    /// Defenses must not be attached to the root goal.
    DefendedRoot(String),
    RootNotSubgoal(String),
    /// A subgoal has no children, or more than the allowed maximum.
    Arity { subgoal: String, children: usize, max: usize },
    /// Edge subgoals refine exactly one child.
    EdgeArity { subgoal: String, children: usize },
    UnknownNode(u32),
    UnknownName(String),
    /// A node was referenced where a node of another kind was expected.
    WrongKind { node: String, expected: &'static str },
    DuplicateName(String),
    InvalidName(String),
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::ConflictingParent { node, parent, other } => write!(f,
                "node {node} already has parent {parent}, can not assign parent {other}"),
            StructuralError::DefendedRoot(root) => write!(f, "root goal {root} has attached defenses"),
            StructuralError::RootNotSubgoal(root) => write!(f, "root {root} is not a subgoal"),
            StructuralError::Arity { subgoal, children, max } => write!(f,
                "subgoal {subgoal} has {children} children, expected between 1 and {max}"),
            StructuralError::EdgeArity { subgoal, children } => write!(f,
                "edge subgoal {subgoal} has {children} children, expected exactly 1"),
            StructuralError::UnknownNode(id) => write!(f, "no node with id {id}"),
            StructuralError::UnknownName(name) => write!(f, "no node named {name}"),
            StructuralError::WrongKind { node, expected } => write!(f, "node {node} is not {expected}"),
            StructuralError::DuplicateName(name) => write!(f, "node name {name} is used twice"),
            StructuralError::InvalidName(name) => write!(f, "{name:?} is not a valid identifier"),
        }
    }
}

impl error::Error for StructuralError {}

/// Violated internal invariants of state canonicalization.
///
/// These indicate a defect in the construction, not a problem with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizationError {
    /// Two states with different contents produced the same key.
    KeyCollision(String),
    /// After reduction, an attack is still both activated and completed.
    ActivatedAndCompleted(String),
    /// A state was constructed around a node that reduction already removed.
    ReducedAwayNode { state: &'static str, node: String },
}

impl fmt::Display for CanonicalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalizationError::KeyCollision(key) => write!(f, "state key {key} collides with a different state"),
            CanonicalizationError::ActivatedAndCompleted(attack) => write!(f,
                "attack {attack} is both activated and completed after reduction"),
            CanonicalizationError::ReducedAwayNode { state, node } => write!(f,
                "{state} state constructed for {node}, which is not part of the reduced configuration"),
        }
    }
}

impl error::Error for CanonicalizationError {}

/// Out of range numbers in node parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioParameterError {
    Probability { node: String, value: f64 },
    ZeroPeriod(String),
    Negative { node: String, field: &'static str, value: i64 },
    TooLarge { node: String, field: &'static str, value: i64 },
}

impl fmt::Display for ScenarioParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioParameterError::Probability { node, value } => write!(f,
                "success probability {value} of {node} is not in [0, 1]"),
            ScenarioParameterError::ZeroPeriod(node) => write!(f, "defense {node} has period 0"),
            ScenarioParameterError::Negative { node, field, value } => write!(f,
                "{field} of {node} is negative ({value})"),
            ScenarioParameterError::TooLarge { node, field, value } => write!(f,
                "{field} of {node} does not fit into 32 bits ({value})"),
        }
    }
}

impl error::Error for ScenarioParameterError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Structural(StructuralError),
    Canonicalization(CanonicalizationError),
    Parameter(ScenarioParameterError),
    /// The automaton grew beyond the configured number of states.
    StateLimit(usize),
    /// The edges no longer fit into 32 bit offsets.
    EdgeLimit(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Structural(source) => write!(f, "malformed attack-defense tree: {source}"),
            Error::Canonicalization(source) => write!(f, "state canonicalization failed: {source}"),
            Error::Parameter(source) => write!(f, "invalid scenario parameter: {source}"),
            Error::StateLimit(max) => write!(f, "automaton exceeds the limit of {max} states"),
            Error::EdgeLimit(max) => write!(f, "automaton exceeds the limit of {max} edges"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Structural(source) => Some(source),
            Error::Canonicalization(source) => Some(source),
            Error::Parameter(source) => Some(source),
            Error::StateLimit(_) | Error::EdgeLimit(_) => None,
        }
    }
}

impl From<StructuralError> for Error {
    fn from(err: StructuralError) -> Error {
        Error::Structural(err)
    }
}

impl From<CanonicalizationError> for Error {
    fn from(err: CanonicalizationError) -> Error {
        Error::Canonicalization(err)
    }
}

impl From<ScenarioParameterError> for Error {
    fn from(err: ScenarioParameterError) -> Error {
        Error::Parameter(err)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// Type alias for `Result<T, admdp::Error>`
pub type Result<T> = result::Result<T, Error>;


#[derive(Debug)]
pub enum VerifyError {
    IOError(io::Error),
    /// verifyta printed nothing for the given formula.
    MissingOutput(usize),
    /// A formula block did not contain the expected result line.
    MissingResult { formula: usize, expected: &'static str },
    ParseError(num::ParseFloatError),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::IOError(source) => source.fmt(f),
            VerifyError::ParseError(source) => source.fmt(f),
            VerifyError::MissingOutput(formula) => write!(f, "no output for formula {formula}"),
            VerifyError::MissingResult { formula, expected } => write!(f,
                "formula {formula} does not report {expected}"),
        }
    }
}

impl error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            VerifyError::IOError(source) => Some(source),
            VerifyError::ParseError(source) => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for VerifyError {
    fn from(e: io::Error) -> Self {
        VerifyError::IOError(e)
    }
}

impl From<num::ParseFloatError> for VerifyError {
    fn from(e: num::ParseFloatError) -> Self {
        VerifyError::ParseError(e)
    }
}

impl From<VerifyError> for io::Error {
    fn from(e: VerifyError) -> io::Error {
        match e {
            VerifyError::IOError(source) => source,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
