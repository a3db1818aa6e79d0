use crate::{
    algebra::{
        ops::{self, Context, EvaluationError},
        Expression, Matrix,
    },
    equations::Equation,
    partition::Block,
};
use std::fmt::{self, Display, Formatter};

/// The finite difference approximation of a block's Jacobian, kept in
/// symbolic form so it only needs to be built once.
///
/// The cell at `(row, column)` is
/// `(f_row(x_column + step) - f_row(x_column)) / step`.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    cells: Matrix<Expression>,
}

impl Jacobian {
    pub fn for_block(block: &Block, equations: &[Equation], step: f64) -> Self {
        let rows: Vec<&Equation> = block.rows(equations).collect();

        let cells = Matrix::init(rows.len(), block.unknowns.len(), |row, column| {
            let function = &rows[row].body;
            let variable = &block.unknowns[column];

            if !function.depends_on(variable) {
                return Expression::Constant(0.0);
            }

            let nudged = ops::substitute(
                function,
                variable,
                &(Expression::parameter(variable.clone())
                    + Expression::Constant(step)),
            );

            (nudged - function.clone()) / Expression::Constant(step)
        });

        Jacobian { cells }
    }

    pub fn dimension(&self) -> usize { self.cells.row_count() }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Expression> {
        self.cells.get(row, column)
    }

    pub fn cells(&self) -> &Matrix<Expression> { &self.cells }

    /// Evaluate every cell at the current assignment.
    pub fn evaluate<F, C>(
        &self,
        lookup_parameter_value: F,
        ctx: &C,
    ) -> Result<Matrix<f64>, EvaluationError>
    where
        F: Fn(&str) -> Option<f64>,
        C: Context + ?Sized,
    {
        self.cells.try_map(|_, _, cell| {
            if let Expression::Constant(value) = cell {
                return Ok(*value);
            }

            ops::evaluate(cell, &lookup_parameter_value, ctx)
        })
    }
}

impl Display for Jacobian {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter_rows().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }

            for (j, cell) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{}", cell)?;
            }
        }

        Ok(())
    }
}
