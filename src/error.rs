use crate::{
    algebra::{ops::EvaluationError, MatrixError, ParseError},
    config::ConfigError,
    registry::RegistryError,
};
use std::time::Duration;

/// Something went wrong while turning text into a solvable model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("no equations were provided")]
    Empty,
    #[error("line {line} is malformed: \"{text}\"")]
    Malformed { line: usize, text: String },
    #[error("\"{name}\" is not a defined constant")]
    UndefinedConstant { name: String },
    #[error("unable to parse equation {equation} (\"{text}\"): {source}")]
    Parse {
        equation: usize,
        text: String,
        #[source]
        source: ParseError,
    },
    #[error(
        "the system has {equations} equations but {variables} variables"
    )]
    CountMismatch { equations: usize, variables: usize },
    #[error(
        "block {block} has {equations} equations but {unknowns} unknowns"
    )]
    InconsistentBlock {
        block: usize,
        equations: usize,
        unknowns: usize,
    },
    #[error(
        "Number of variables in block {block} ({variables}) exceeded the maximum of {max}"
    )]
    BlockTooLarge {
        block: usize,
        variables: usize,
        max: usize,
    },
}

/// Something went wrong while running Newton-Raphson over a loaded model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("Time out after {limit:?}")]
    TimedOut { limit: Duration },
    #[error(
        "Number of iterations in block {block} exceeded the maximum limit of {max_iterations}"
    )]
    IterationLimit { block: usize, max_iterations: usize },
    #[error("the Jacobian for block {block} is singular")]
    Singular { block: usize },
    #[error("unable to evaluate block {block}: {source}")]
    Evaluation {
        block: usize,
        #[source]
        source: EvaluationError,
    },
    #[error("matrix error in block {block}: {source}")]
    Matrix {
        block: usize,
        #[source]
        source: MatrixError,
    },
}

impl SolveError {
    /// The block being solved when the error happened, if any.
    pub fn block(&self) -> Option<usize> {
        match self {
            SolveError::TimedOut { .. } => None,
            SolveError::IterationLimit { block, .. }
            | SolveError::Singular { block }
            | SolveError::Evaluation { block, .. }
            | SolveError::Matrix { block, .. } => Some(*block),
        }
    }
}

/// Every error this crate can produce.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no equations have been loaded")]
    NotLoaded,
}
