//! A stateful wrapper around [`Solver`] which remembers the last loaded
//! system and keeps a log of everything that went wrong.

use crate::{
    error::Error,
    registry::{Arity, Callable},
    solve::Solution,
    solver::{LoadedModel, Solver},
};
use std::time::Duration;

/// Load equations, solve them, and check [`Session::errors()`] when
/// something returns `false` or `None`.
#[derive(Debug, Clone, Default)]
pub struct Session {
    solver: Solver,
    model: Option<LoadedModel>,
    errors: Vec<String>,
}

impl Session {
    pub fn new() -> Self { Session::default() }

    pub fn with_solver(solver: Solver) -> Self {
        Session {
            solver,
            ..Session::default()
        }
    }

    pub fn solver(&self) -> &Solver { &self.solver }

    /// Replace the currently loaded system. If loading fails, nothing will be
    /// loaded afterwards.
    pub fn load(&mut self, text: &str) -> bool {
        self.model = None;

        match self.solver.load(text) {
            Ok(model) => {
                self.model = Some(model);
                true
            },
            Err(e) => {
                self.record(e);
                false
            },
        }
    }

    pub fn is_loaded(&self) -> bool { self.model.is_some() }

    pub fn model(&self) -> Option<&LoadedModel> { self.model.as_ref() }

    /// Solve the loaded system.
    pub fn solve(&mut self) -> Option<Solution> {
        let outcome = match &self.model {
            Some(model) => self.solver.solve(model).map_err(Error::from),
            None => Err(Error::NotLoaded),
        };

        match outcome {
            Ok(solution) => Some(solution),
            Err(e) => {
                self.record(e);
                None
            },
        }
    }

    /// Load some text and immediately solve it.
    pub fn solve_text(&mut self, text: &str) -> Option<Solution> {
        if self.load(text) {
            self.solve()
        } else {
            None
        }
    }

    pub fn set_step(&mut self, step: f64) -> bool {
        let outcome = self.solver.config_mut().set_step(step);
        self.check(outcome)
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> bool {
        let outcome = self.solver.config_mut().set_max_iterations(max_iterations);
        self.check(outcome)
    }

    pub fn set_accuracy(&mut self, accuracy: u32) -> bool {
        let outcome = self.solver.config_mut().set_accuracy(accuracy);
        self.check(outcome)
    }

    pub fn set_max_time(&mut self, max_time: Duration) -> bool {
        let outcome = self.solver.config_mut().set_max_time(max_time);
        self.check(outcome)
    }

    pub fn set_max_variables_per_block(&mut self, max_variables: usize) -> bool {
        let outcome = self
            .solver
            .config_mut()
            .set_max_variables_per_block(max_variables);
        self.check(outcome)
    }

    pub fn add_secure_function(
        &mut self,
        name: &str,
        arity: Arity,
        body: Callable,
    ) -> bool {
        let outcome = self.solver.functions_mut().register(name, arity, body);
        self.check(outcome)
    }

    pub fn add_constant(&mut self, name: &str, value: f64) -> bool {
        let outcome = self.solver.constants_mut().define(name, value);
        self.check(outcome)
    }

    /// Every error message recorded so far, oldest first.
    pub fn errors(&self) -> &[String] { &self.errors }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    pub fn has_error(&self) -> bool { !self.errors.is_empty() }

    pub fn clear_errors(&mut self) { self.errors.clear(); }

    fn check<E: Into<Error>>(&mut self, outcome: Result<(), E>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.record(e);
                false
            },
        }
    }

    fn record<E: Into<Error>>(&mut self, error: E) {
        let error = error.into();
        tracing::warn!(%error, "Recorded an error");
        self.errors.push(error.to_string());
    }
}
