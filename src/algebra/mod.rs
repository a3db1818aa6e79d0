//! The symbolic algebra system.

mod expr;
mod matrix;
pub mod ops;
mod parse;

pub use expr::{BinaryOperation, Expression};
pub use matrix::{
    Cell, DeterminantTemplates, Matrix, MatrixError, COFACTOR_LIMIT,
};
pub use parse::{parse, variables, ParseError, TokenKind};
