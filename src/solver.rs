use crate::{
    algebra::DeterminantTemplates,
    config::SolverConfig,
    equations::{self, Equation},
    error::{Error, LoadError, SolveError},
    jacobian::Jacobian,
    partition::{self, Block},
    registry::{Constants, Functions},
    solve::{Newton, Solution},
};
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// Everything needed to load and solve systems of equations.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    config: SolverConfig,
    functions: Functions,
    constants: Constants,
    templates: DeterminantTemplates,
}

impl Solver {
    pub fn new() -> Self { Solver::default() }

    pub fn with_config(config: SolverConfig) -> Self {
        Solver {
            config,
            ..Solver::default()
        }
    }

    pub fn config(&self) -> &SolverConfig { &self.config }

    pub fn config_mut(&mut self) -> &mut SolverConfig { &mut self.config }

    pub fn functions(&self) -> &Functions { &self.functions }

    pub fn functions_mut(&mut self) -> &mut Functions { &mut self.functions }

    pub fn constants(&self) -> &Constants { &self.constants }

    pub fn constants_mut(&mut self) -> &mut Constants { &mut self.constants }

    pub fn templates(&self) -> &DeterminantTemplates { &self.templates }

    pub fn templates_mut(&mut self) -> &mut DeterminantTemplates {
        &mut self.templates
    }

    /// Parse some text and break it into blocks, ready to be solved.
    pub fn load(&self, text: &str) -> Result<LoadedModel, LoadError> {
        let mut equations =
            equations::load_equations(text, &self.constants, &self.functions)?;
        let variables = equations
            .iter()
            .flat_map(|eq| eq.variables.iter().cloned())
            .collect();

        let mut blocks = partition::partition(
            &equations,
            self.config.max_variables_per_block(),
        )?;
        partition::pad_blocks(&mut blocks, &mut equations);

        let jacobians = blocks
            .iter()
            .map(|block| {
                Jacobian::for_block(block, &equations, self.config.step())
            })
            .collect();

        for block in &blocks {
            tracing::debug!(
                block = block.id,
                equations = ?block.equations,
                unknowns = ?block.unknowns,
                "Built a block"
            );
        }

        Ok(LoadedModel {
            equations,
            blocks,
            jacobians,
            variables,
        })
    }

    /// Run Newton-Raphson over each block in a [`LoadedModel`].
    pub fn solve(&self, model: &LoadedModel) -> Result<Solution, SolveError> {
        let solution = Newton::new(&self.config, &self.templates).solve_system(
            &model.blocks,
            &model.equations,
            &model.jacobians,
            &self.functions,
        )?;

        tracing::info!(
            variables = solution.len(),
            iterations = solution.iterations.iter().sum::<usize>(),
            "Solved the system"
        );

        Ok(solution)
    }

    /// Load and solve in one step.
    pub fn solve_text(&self, text: &str) -> Result<Solution, Error> {
        let model = self.load(text)?;
        self.solve(&model).map_err(Error::from)
    }
}

/// A system of equations which has been parsed and partitioned.
///
/// This is never modified by a solve, so it can be solved as many times as
/// you like.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    equations: Vec<Equation>,
    blocks: Vec<Block>,
    jacobians: Vec<Jacobian>,
    variables: BTreeSet<SmolStr>,
}

impl LoadedModel {
    /// Every equation, including the ones added to pad a block.
    pub fn equations(&self) -> &[Equation] { &self.equations }

    /// The blocks, in the order they'll be solved.
    pub fn blocks(&self) -> &[Block] { &self.blocks }

    pub fn jacobians(&self) -> &[Jacobian] { &self.jacobians }

    /// The variables from the original equations.
    pub fn variables(&self) -> &BTreeSet<SmolStr> { &self.variables }

    pub fn equation(&self, id: usize) -> Option<&Equation> {
        self.equations.iter().find(|eq| eq.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_a_padded_system() {
        let solver = Solver::new();

        let model = solver.load("y = 2*x; x = 4").unwrap();

        let ids: Vec<_> = model.blocks().iter().map(|b| b.equations.clone()).collect();
        assert_eq!(ids, vec![vec![2, 3], vec![1, 4]]);
        assert_eq!(model.equations().len(), 4);
        assert_eq!(model.jacobians().len(), 2);
        assert_eq!(model.variables().len(), 2);
        assert_eq!(model.equation(3).unwrap().text, "#pad1");
    }

    #[test]
    fn solving_leaves_the_model_alone() {
        let solver = Solver::new();
        let model = solver.load("y = 2*x; x = 4").unwrap();
        let before = model.clone();

        let first = solver.solve(&model).unwrap();
        let second = solver.solve(&model).unwrap();

        assert_eq!(model, before);
        assert_eq!(first, second);
        assert_eq!(first.get("y"), Some(8.0));
    }

    #[test]
    fn the_config_flows_through() {
        let mut config = SolverConfig::default();
        config.set_max_variables_per_block(1).unwrap();
        let solver = Solver::with_config(config);

        let got = solver.load("x + y = 3; x - y = 1").unwrap_err();

        assert_eq!(
            got,
            LoadError::BlockTooLarge {
                block: 1,
                variables: 2,
                max: 1
            }
        );
    }

    #[test]
    fn templates_dont_change_the_answer() {
        let text = "a+b+2*c=5\na-b=u\nu-2*a=4\n2*b=a";
        let mut with_templates = Solver::new();
        for size in 2..=4 {
            with_templates.templates_mut().generate(size);
        }

        let got = with_templates.solve_text(text).unwrap();
        let should_be = Solver::new().solve_text(text).unwrap();

        assert_eq!(got, should_be);
    }
}
