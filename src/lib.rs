//! Solve systems of non-linear equations written as plain text.
//!
//! Each equation is rearranged into the form `f(x) = 0`, the system is split
//! into the smallest blocks of equations which need to be solved together,
//! and then each block is solved using Newton-Raphson with a finite
//! difference Jacobian.
//!
//! ```rust
//! use equations::Solver;
//!
//! let solver = Solver::new();
//! let solution = solver.solve_text("x + y = 3; x - y = 1")?;
//!
//! assert_eq!(solution.get("x"), Some(2.0));
//! assert_eq!(solution.get("y"), Some(1.0));
//! # Ok::<(), equations::Error>(())
//! ```

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod algebra;
mod config;
mod equations;
mod error;
mod jacobian;
mod partition;
mod registry;
mod session;
mod solve;
mod solver;

pub use crate::{
    config::{ConfigError, SolverConfig},
    equations::{load_equations, normalize, Equation, Line},
    error::{Error, LoadError, SolveError},
    jacobian::Jacobian,
    partition::{pad_blocks, partition, Block},
    registry::{Arity, Callable, Constants, Functions, RegistryError},
    session::Session,
    solve::{Assignments, Newton, Solution},
    solver::{LoadedModel, Solver},
};
