//! A small dense matrix type with just the operations a Newton-Raphson step
//! needs.
//!
//! Determinants and inverses are calculated with cofactor expansion, which
//! works for both numbers and symbolic [`Expression`]s. Expansion is
//! factorial in the matrix size, so numeric matrices larger than
//! [`COFACTOR_LIMIT`] fall back to an LU decomposition.

use crate::algebra::{
    ops::{self, Arithmetic},
    parse, Expression,
};
use nalgebra::DMatrix;
use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    ops::{Add, Index, IndexMut, Mul, Neg, Sub},
};

/// The largest numeric matrix we'll invert using cofactor expansion.
pub const COFACTOR_LIMIT: usize = 8;

/// A general-purpose MxN matrix laid out sequentially (row-major) in memory.
#[derive(Clone, PartialEq)]
pub struct Matrix<T> {
    cells: Box<[T]>,
    rows: usize,
    columns: usize,
}

impl<T> Matrix<T> {
    /// Create a new [`Matrix`] by invoking some `fn(row, column) -> T` function
    /// for each cell.
    pub fn init<F>(rows: usize, columns: usize, mut get_cell: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut cells = Vec::with_capacity(columns * rows);

        for row in 0..rows {
            for column in 0..columns {
                cells.push(get_cell(row, column));
            }
        }

        Matrix {
            cells: cells.into_boxed_slice(),
            rows,
            columns,
        }
    }

    /// A version of [`Matrix::init()`] which lets you initialize a matrix using
    /// a function which may fail.
    pub fn try_init<F, E>(
        rows: usize,
        columns: usize,
        mut get_cell: F,
    ) -> Result<Self, E>
    where
        F: FnMut(usize, usize) -> Result<T, E>,
    {
        let mut cells = Vec::with_capacity(columns * rows);

        for row in 0..rows {
            for column in 0..columns {
                cells.push(get_cell(row, column)?);
            }
        }

        Ok(Matrix {
            cells: cells.into_boxed_slice(),
            rows,
            columns,
        })
    }

    /// Create a single-column matrix.
    pub fn column_vector(values: Vec<T>) -> Self {
        let rows = values.len();

        Matrix {
            cells: values.into_boxed_slice(),
            rows,
            columns: 1,
        }
    }

    pub fn row_count(&self) -> usize { self.rows }

    pub fn column_count(&self) -> usize { self.columns }

    pub fn is_square(&self) -> bool { self.rows == self.columns }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.cells.chunks(self.columns.max(1)).take(self.rows)
    }

    fn index_of(&self, row: usize, column: usize) -> Option<usize> {
        if row < self.rows && column < self.columns {
            Some(row * self.columns + column)
        } else {
            None
        }
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&T> {
        let ix = self.index_of(row, column)?;
        self.cells.get(ix)
    }

    pub fn get_mut(&mut self, row: usize, column: usize) -> Option<&mut T> {
        let ix = self.index_of(row, column)?;
        self.cells.get_mut(ix)
    }

    pub fn map<F, Q>(&self, mut func: F) -> Matrix<Q>
    where
        F: FnMut(&T) -> Q,
    {
        Matrix::init(self.rows, self.columns, |row, column| {
            func(&self[(row, column)])
        })
    }

    pub fn try_map<F, Q, E>(&self, mut func: F) -> Result<Matrix<Q>, E>
    where
        F: FnMut(usize, usize, &T) -> Result<Q, E>,
    {
        Matrix::try_init(self.rows, self.columns, |row, column| {
            func(row, column, &self[(row, column)])
        })
    }

    pub fn transposed(&self) -> Self
    where
        T: Clone,
    {
        Matrix::init(self.columns, self.rows, |row, column| {
            self[(column, row)].clone()
        })
    }

    /// The matrix you get after removing a row and a column.
    pub fn minor(&self, row: usize, column: usize) -> Self
    where
        T: Clone,
    {
        Matrix::init(
            self.rows.saturating_sub(1),
            self.columns.saturating_sub(1),
            |r, c| {
                let r = if r < row { r } else { r + 1 };
                let c = if c < column { c } else { c + 1 };
                self[(r, c)].clone()
            },
        )
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &T)> + '_ {
        let columns = self.columns;

        self.cells
            .iter()
            .enumerate()
            .map(move |(ix, cell)| (ix / columns, ix % columns, cell))
    }

    fn ensure_square(&self) -> Result<(), MatrixError> {
        if self.is_square() {
            Ok(())
        } else {
            Err(MatrixError::NotSquare {
                rows: self.rows,
                columns: self.columns,
            })
        }
    }
}

/// Something that can be stored in a matrix we want to take the determinant
/// of.
pub trait Cell:
    Clone
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    fn zero() -> Self;
    fn one() -> Self;
    fn is_zero(&self) -> bool;
}

impl Cell for f64 {
    fn zero() -> Self { 0.0 }

    fn one() -> Self { 1.0 }

    fn is_zero(&self) -> bool { *self == 0.0 }
}

impl Cell for Expression {
    fn zero() -> Self { Expression::Constant(0.0) }

    fn one() -> Self { Expression::Constant(1.0) }

    fn is_zero(&self) -> bool {
        match self {
            Expression::Constant(value) => *value == 0.0,
            _ => false,
        }
    }
}

fn is_even(n: usize) -> bool { n % 2 == 0 }

impl<T: Cell> Matrix<T> {
    /// Calculate the determinant using cofactor expansion.
    pub fn cofactor_expansion(&self) -> Result<T, MatrixError> {
        self.ensure_square()?;
        Ok(self.expand(&mut Matrix::expand_recursively))
    }

    /// The matrix of cofactors, where each cell is the signed determinant of
    /// the corresponding minor.
    pub fn cofactors(&self) -> Result<Matrix<T>, MatrixError> {
        self.ensure_square()?;
        Ok(self.cofactors_with(&mut Matrix::expand_recursively))
    }

    /// The transpose of the cofactor matrix.
    pub fn adjoint(&self) -> Result<Matrix<T>, MatrixError> {
        self.cofactors().map(|cofactors| cofactors.transposed())
    }

    pub fn multiply(&self, other: &Matrix<T>) -> Result<Matrix<T>, MatrixError> {
        if self.columns != other.rows {
            return Err(MatrixError::DimensionMismatch {
                left: (self.rows, self.columns),
                right: (other.rows, other.columns),
            });
        }

        Ok(Matrix::init(self.rows, other.columns, |row, column| {
            let mut sum = T::zero();

            for i in 0..self.columns {
                let product =
                    self[(row, i)].clone() * other[(i, column)].clone();
                sum = if sum.is_zero() { product } else { sum + product };
            }

            sum
        }))
    }

    fn expand_recursively(&self) -> T {
        self.expand(&mut Matrix::expand_recursively)
    }

    /// Expand along the row with the most zeroes, using `determinant` to
    /// evaluate each minor.
    fn expand<F>(&self, determinant: &mut F) -> T
    where
        F: FnMut(&Matrix<T>) -> T,
    {
        match self.rows {
            0 => T::one(),
            1 => self[(0, 0)].clone(),
            2 => {
                let a = self[(0, 0)].clone();
                let b = self[(0, 1)].clone();
                let c = self[(1, 0)].clone();
                let d = self[(1, 1)].clone();
                a * d - b * c
            },
            n => {
                let pivot = self.sparsest_row();
                let mut total: Option<T> = None;

                for column in 0..n {
                    let cell = &self[(pivot, column)];

                    if cell.is_zero() {
                        continue;
                    }

                    let term = cell.clone() * determinant(&self.minor(pivot, column));
                    let positive = is_even(pivot + column);

                    total = Some(match total {
                        None if positive => term,
                        None => -term,
                        Some(sum) if positive => sum + term,
                        Some(sum) => sum - term,
                    });
                }

                total.unwrap_or_else(T::zero)
            },
        }
    }

    fn cofactors_with<F>(&self, determinant: &mut F) -> Matrix<T>
    where
        F: FnMut(&Matrix<T>) -> T,
    {
        Matrix::init(self.rows, self.columns, |row, column| {
            let minor = determinant(&self.minor(row, column));

            if is_even(row + column) {
                minor
            } else {
                -minor
            }
        })
    }

    fn sparsest_row(&self) -> usize {
        let mut best = 0;
        let mut most_zeroes = 0;

        for (row, cells) in self.iter_rows().enumerate() {
            let zeroes = cells.iter().filter(|cell| cell.is_zero()).count();

            if zeroes > most_zeroes {
                best = row;
                most_zeroes = zeroes;
            }
        }

        best
    }
}

impl Matrix<f64> {
    /// Calculate the determinant, preferring a closed-form template when one
    /// is available.
    pub fn determinant(
        &self,
        templates: &DeterminantTemplates,
    ) -> Result<f64, MatrixError> {
        self.ensure_square()?;
        Ok(self.numeric_determinant(templates))
    }

    /// Invert the matrix, failing if its determinant is zero.
    pub fn inverse(
        &self,
        templates: &DeterminantTemplates,
    ) -> Result<Matrix<f64>, MatrixError> {
        self.ensure_square()?;

        if self.rows > COFACTOR_LIMIT {
            return self
                .to_nalgebra()
                .lu()
                .try_inverse()
                .map(|inverse| Matrix::from_nalgebra(&inverse))
                .ok_or(MatrixError::Singular);
        }

        let determinant = self.numeric_determinant(templates);

        if determinant == 0.0 {
            return Err(MatrixError::Singular);
        }

        let adjoint = self
            .cofactors_with(&mut |minor| minor.numeric_determinant(templates))
            .transposed();

        Ok(adjoint.map(|cell| cell / determinant))
    }

    /// Calculate `denominator⁻¹ · numerator`.
    pub fn divide(
        numerator: &Matrix<f64>,
        denominator: &Matrix<f64>,
        templates: &DeterminantTemplates,
    ) -> Result<Matrix<f64>, MatrixError> {
        denominator.inverse(templates)?.multiply(numerator)
    }

    fn numeric_determinant(&self, templates: &DeterminantTemplates) -> f64 {
        if let Some(value) = templates.evaluate(self) {
            return value;
        }

        if self.rows > COFACTOR_LIMIT {
            return self.to_nalgebra().lu().determinant();
        }

        self.expand(&mut |minor| minor.numeric_determinant(templates))
    }

    pub fn to_nalgebra(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.columns, &self.cells)
    }

    pub fn from_nalgebra(matrix: &DMatrix<f64>) -> Self {
        Matrix::init(matrix.nrows(), matrix.ncols(), |row, column| {
            matrix[(row, column)]
        })
    }
}

impl<T: Debug> Debug for Matrix<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter_rows()).finish()
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (row, column): (usize, usize)) -> &Self::Output {
        assert!(row < self.rows, "Row index out of bounds");
        assert!(column < self.columns, "Column index out of bounds");

        self.get(row, column)
            .expect("We've already done bounds checks")
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(
        &mut self,
        (row, column): (usize, usize),
    ) -> &mut Self::Output {
        assert!(row < self.rows, "Row index out of bounds");
        assert!(column < self.columns, "Column index out of bounds");

        self.get_mut(row, column)
            .expect("We've already done bounds checks")
    }
}

impl<T, const ROWS: usize, const COLUMNS: usize> From<[[T; COLUMNS]; ROWS]>
    for Matrix<T>
{
    fn from(other: [[T; COLUMNS]; ROWS]) -> Self {
        let cells: Vec<T> = other.into_iter().flatten().collect();

        Matrix {
            cells: cells.into_boxed_slice(),
            rows: ROWS,
            columns: COLUMNS,
        }
    }
}

impl<T: PartialEq, const ROWS: usize, const COLUMNS: usize>
    PartialEq<[[T; COLUMNS]; ROWS]> for Matrix<T>
{
    fn eq(&self, other: &[[T; COLUMNS]; ROWS]) -> bool {
        self.rows == ROWS
            && self.columns == COLUMNS
            && self
                .cells()
                .all(|(row, column, value)| *value == other[row][column])
    }
}

/// Closed-form determinant formulas, keyed by matrix size.
///
/// A formula refers to the cells of the matrix as `j_<row>_<column>`, with
/// 1-based indices. Templates only ever make things faster, a matrix with no
/// matching template is expanded the normal way.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeterminantTemplates {
    formulas: BTreeMap<usize, Expression>,
}

impl DeterminantTemplates {
    pub fn new() -> Self { DeterminantTemplates::default() }

    /// Derive the formula for an `size`x`size` matrix by symbolically
    /// expanding the determinant.
    pub fn generate(&mut self, size: usize) {
        let symbolic = Matrix::init(size, size, |row, column| {
            Expression::parameter(cell_name(row, column))
        });

        self.formulas.insert(size, symbolic.expand_recursively());
    }

    /// Add a formula written as text.
    pub fn insert(
        &mut self,
        size: usize,
        formula: &str,
    ) -> Result<(), MatrixError> {
        let invalid = |reason: String| MatrixError::InvalidTemplate { size, reason };

        let formula = parse(formula).map_err(|e| invalid(e.to_string()))?;

        for name in formula.params() {
            match cell_index(name) {
                Some((row, column)) if row < size && column < size => {},
                _ => {
                    return Err(invalid(format!(
                        "\"{}\" isn't a cell in a {}x{} matrix",
                        name, size, size
                    )))
                },
            }
        }

        if let Some(function) = formula.functions().into_iter().next() {
            return Err(invalid(format!(
                "templates can't call functions like {}()",
                function
            )));
        }

        self.formulas.insert(size, formula);
        Ok(())
    }

    pub fn get(&self, size: usize) -> Option<&Expression> {
        self.formulas.get(&size)
    }

    pub fn len(&self) -> usize { self.formulas.len() }

    pub fn is_empty(&self) -> bool { self.formulas.is_empty() }

    fn evaluate(&self, matrix: &Matrix<f64>) -> Option<f64> {
        let formula = self.formulas.get(&matrix.rows)?;

        ops::evaluate(
            formula,
            |name| {
                let (row, column) = cell_index(name)?;
                matrix.get(row, column).copied()
            },
            &Arithmetic,
        )
        .ok()
    }
}

fn cell_name(row: usize, column: usize) -> String {
    format!("j_{}_{}", row + 1, column + 1)
}

/// Parse a `j_<row>_<column>` name back into 0-based indices.
fn cell_index(name: &str) -> Option<(usize, usize)> {
    let (row, column) = name.strip_prefix("j_")?.split_once('_')?;
    let row: usize = row.parse().ok()?;
    let column: usize = column.parse().ok()?;

    Some((row.checked_sub(1)?, column.checked_sub(1)?))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixError {
    #[error("the matrix is singular")]
    Singular,
    #[error("expected a square matrix, found {rows}x{columns}")]
    NotSquare { rows: usize, columns: usize },
    #[error(
        "can't multiply a {}x{} matrix by a {}x{} matrix",
        .left.0, .left.1, .right.0, .right.1
    )]
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("invalid determinant template for size {size}: {reason}")]
    InvalidTemplate { size: usize, reason: String },
}
