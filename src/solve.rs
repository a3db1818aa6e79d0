use crate::{
    algebra::{
        ops::{self, Context, EvaluationError},
        DeterminantTemplates, Matrix, MatrixError,
    },
    config::SolverConfig,
    equations::Equation,
    error::SolveError,
    jacobian::Jacobian,
    partition::Block,
};
use serde::Serialize;
use smol_str::SmolStr;
use std::{collections::BTreeMap, time::Instant};

/// The current value of every variable we know about.
///
/// This is shared by every block in a solve, so the values found by one
/// block are available as constants to the blocks after it.
pub type Assignments = BTreeMap<SmolStr, f64>;

/// The result of a successful solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    /// The value of each variable, rounded to the configured accuracy.
    pub values: BTreeMap<SmolStr, f64>,
    /// How many iterations each block took to converge.
    pub iterations: Vec<usize>,
}

impl Solution {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Solve each block in a system using Newton-Raphson.
///
/// The iterative equation for Newton's method when applied to a set of
/// equations, `F`, is:
///
/// ```text
///  x_next = x_current - jacobian(F).inverse() * F(x_current)
/// ```
///
/// This is the multi-variable equivalent of Newton-Raphson, where the jacobian
/// is the slope of our equations, and we pre-multiply by the inverse because
/// that's the matrix equivalent of division. Here the jacobian is
/// approximated using finite differences.
///
/// See also:
///
/// - https://en.wikipedia.org/wiki/Newton%27s_method#Nonlinear_systems_of_equations
#[derive(Debug, Clone)]
pub struct Newton<'a> {
    config: &'a SolverConfig,
    templates: &'a DeterminantTemplates,
    started: Instant,
}

impl<'a> Newton<'a> {
    /// Start the clock on a new solve.
    pub fn new(
        config: &'a SolverConfig,
        templates: &'a DeterminantTemplates,
    ) -> Self {
        Newton {
            config,
            templates,
            started: Instant::now(),
        }
    }

    /// Solve every block in order, stopping at the first failure.
    pub fn solve_system<C>(
        &self,
        blocks: &[Block],
        equations: &[Equation],
        jacobians: &[Jacobian],
        ctx: &C,
    ) -> Result<Solution, SolveError>
    where
        C: Context + ?Sized,
    {
        let mut assignments = Assignments::new();
        let mut iterations = Vec::with_capacity(blocks.len());

        for (block, jacobian) in blocks.iter().zip(jacobians) {
            let outcome = self.solve_block(
                block,
                equations,
                jacobian,
                &mut assignments,
                ctx,
            );

            match outcome {
                Ok(n) => iterations.push(n),
                Err(e) => {
                    tracing::warn!(
                        block = block.id,
                        error = %e,
                        "Unable to solve the system"
                    );
                    return Err(e);
                },
            }
        }

        let accuracy = self.config.accuracy() as i32;
        let padding: Vec<&SmolStr> =
            blocks.iter().filter_map(|b| b.padding.as_ref()).collect();

        let values = assignments
            .into_iter()
            .filter(|(name, _)| !padding.contains(&name))
            .map(|(name, value)| (name, ops::round_to(value, accuracy)))
            .collect();

        Ok(Solution { values, iterations })
    }

    /// Run Newton-Raphson on a single block, returning the number of
    /// iterations it took to converge.
    ///
    /// Every unknown in the block starts at `1.0`, and whatever is already in
    /// `assignments` is treated as a known constant.
    pub fn solve_block<C>(
        &self,
        block: &Block,
        equations: &[Equation],
        jacobian: &Jacobian,
        assignments: &mut Assignments,
        ctx: &C,
    ) -> Result<usize, SolveError>
    where
        C: Context + ?Sized,
    {
        let rows: Vec<&Equation> = block.rows(equations).collect();
        let accuracy = self.config.accuracy() as i32;
        let evaluation = |source: EvaluationError| SolveError::Evaluation {
            block: block.id,
            source,
        };

        for unknown in &block.unknowns {
            assignments.insert(unknown.clone(), 1.0);
        }

        let mut iteration = 0;

        loop {
            if self.started.elapsed() > self.config.max_time() {
                return Err(SolveError::TimedOut {
                    limit: self.config.max_time(),
                });
            }

            iteration += 1;

            let residuals = residuals(&rows, assignments, ctx).map_err(evaluation)?;
            tracing::trace!(
                block = block.id,
                iteration,
                ?residuals,
                "Evaluated the residuals"
            );

            if residuals.iter().all(|r| ops::round_to(*r, accuracy) == 0.0) {
                return Ok(iteration);
            }

            if iteration > self.config.max_iterations() {
                return Err(SolveError::IterationLimit {
                    block: block.id,
                    max_iterations: self.config.max_iterations(),
                });
            }

            let slope = jacobian
                .evaluate(|name| assignments.get(name).copied(), ctx)
                .map_err(evaluation)?;
            let delta = Matrix::divide(
                &Matrix::column_vector(residuals),
                &slope,
                self.templates,
            )
            .map_err(|e| match e {
                MatrixError::Singular => SolveError::Singular { block: block.id },
                other => SolveError::Matrix {
                    block: block.id,
                    source: other,
                },
            })?;

            for (row, unknown) in block.unknowns.iter().enumerate() {
                if let Some(value) = assignments.get_mut(unknown) {
                    *value -= delta[(row, 0)];
                }
            }
        }
    }
}

fn residuals<C>(
    rows: &[&Equation],
    assignments: &Assignments,
    ctx: &C,
) -> Result<Vec<f64>, EvaluationError>
where
    C: Context + ?Sized,
{
    rows.iter()
        .map(|eq| {
            ops::evaluate(&eq.body, |name| assignments.get(name).copied(), ctx)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        equations::load_equations,
        partition::{pad_blocks, partition},
        registry::{Constants, Functions},
    };
    use std::time::Duration;

    struct System {
        equations: Vec<Equation>,
        blocks: Vec<Block>,
        jacobians: Vec<Jacobian>,
    }

    fn system(text: &str) -> System {
        let mut equations =
            load_equations(text, &Constants::default(), &Functions::default())
                .unwrap();
        let mut blocks = partition(&equations, 8).unwrap();
        pad_blocks(&mut blocks, &mut equations);
        let jacobians = blocks
            .iter()
            .map(|b| Jacobian::for_block(b, &equations, 0.01))
            .collect();

        System {
            equations,
            blocks,
            jacobians,
        }
    }

    fn solve_with(text: &str, config: &SolverConfig) -> Result<Solution, SolveError> {
        let system = system(text);
        let templates = DeterminantTemplates::new();

        Newton::new(config, &templates).solve_system(
            &system.blocks,
            &system.equations,
            &system.jacobians,
            &Functions::default(),
        )
    }

    fn solve(text: &str) -> Result<Solution, SolveError> {
        solve_with(text, &SolverConfig::default())
    }

    #[test]
    fn initial_guess_is_already_a_root() {
        let got = solve("x = 1").unwrap();

        assert_eq!(got.get("x"), Some(1.0));
        assert_eq!(got.iterations, vec![1]);
    }

    #[test]
    fn linear_equations_take_a_single_step() {
        let got = solve("5 - x + 2*4 = 88").unwrap();

        assert_eq!(got.get("x"), Some(-75.0));
        assert_eq!(got.iterations, vec![2]);
    }

    #[test]
    fn padding_is_removed_from_the_solution() {
        let got = solve("x = 3").unwrap();

        let names: Vec<_> = got.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn later_blocks_see_earlier_results() {
        let got = solve("x = 3; y = x*2").unwrap();

        assert_eq!(got.get("x"), Some(3.0));
        assert_eq!(got.get("y"), Some(6.0));
        assert_eq!(got.iterations.len(), 2);
    }

    #[test]
    fn nonlinear_pair() {
        let got = solve("x*y = 6; x - y = 1").unwrap();

        let x = got.get("x").unwrap();
        let y = got.get("y").unwrap();
        approx::assert_abs_diff_eq!(x * y, 6.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(x - y, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn structurally_singular_blocks_are_an_error() {
        let got = solve("x + y = 2; x + y = 3").unwrap_err();

        assert_eq!(got, SolveError::Singular { block: 1 });
    }

    #[test]
    fn give_up_after_too_many_iterations() {
        let mut config = SolverConfig::default();
        config.set_max_iterations(1).unwrap();

        let got = solve_with("x*x = 2", &config).unwrap_err();

        assert_eq!(
            got,
            SolveError::IterationLimit {
                block: 1,
                max_iterations: 1
            }
        );
    }

    #[test]
    fn give_up_when_out_of_time() {
        let mut config = SolverConfig::default();
        config.set_max_time(Duration::from_nanos(1)).unwrap();
        let system = system("x*x = 2");
        let templates = DeterminantTemplates::new();
        let newton = Newton::new(&config, &templates);
        std::thread::sleep(Duration::from_millis(1));

        let got = newton
            .solve_system(
                &system.blocks,
                &system.equations,
                &system.jacobians,
                &Functions::default(),
            )
            .unwrap_err();

        assert_eq!(
            got,
            SolveError::TimedOut {
                limit: Duration::from_nanos(1)
            }
        );
    }

    #[test]
    fn unavailable_functions_fail_at_evaluation() {
        let system = system("sqrt(x) = 2");
        let config = SolverConfig::default();
        let templates = DeterminantTemplates::new();
        let mut assignments = Assignments::new();

        let got = Newton::new(&config, &templates)
            .solve_block(
                &system.blocks[0],
                &system.equations,
                &system.jacobians[0],
                &mut assignments,
                &ops::Arithmetic,
            )
            .unwrap_err();

        assert_eq!(got.block(), Some(1));
        assert!(matches!(got, SolveError::Evaluation { .. }));
    }
}
