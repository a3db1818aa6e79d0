//! [`Expression`] operations.

use crate::{
    algebra::{parse, BinaryOperation, Expression, ParseError},
    registry::Arity,
};
use smol_str::SmolStr;

/// Contextual information used when evaluating an [`Expression`].
///
/// This is the only way an expression can call out to the rest of the
/// world, so implementations decide which functions are safe to call.
pub trait Context {
    fn evaluate_function(
        &self,
        name: &str,
        arguments: &[f64],
    ) -> Result<f64, EvaluationError>;
}

impl<C: Context + ?Sized> Context for &C {
    fn evaluate_function(
        &self,
        name: &str,
        arguments: &[f64],
    ) -> Result<f64, EvaluationError> {
        (**self).evaluate_function(name, arguments)
    }
}

/// A [`Context`] which only allows arithmetic and rejects every function
/// call.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Arithmetic;

impl Context for Arithmetic {
    fn evaluate_function(
        &self,
        name: &str,
        _arguments: &[f64],
    ) -> Result<f64, EvaluationError> {
        Err(EvaluationError::UnknownFunction { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("no value was provided for \"{name}\"")]
    UnboundVariable { name: SmolStr },
    #[error("{name} is not a secure function")]
    UnknownFunction { name: SmolStr },
    #[error("{name}() takes {expected} but was called with {found}")]
    WrongArity {
        name: SmolStr,
        expected: Arity,
        found: usize,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Evaluate an [`Expression`], using `lookup_parameter_value` to get the
/// value of each variable.
pub fn evaluate<F, C>(
    expr: &Expression,
    lookup_parameter_value: F,
    ctx: &C,
) -> Result<f64, EvaluationError>
where
    F: Fn(&str) -> Option<f64>,
    C: Context + ?Sized,
{
    evaluate_inner(expr, &lookup_parameter_value, ctx)
}

/// Parse some text and evaluate it in one step.
pub fn evaluate_str<F, C>(
    src: &str,
    lookup_parameter_value: F,
    ctx: &C,
) -> Result<f64, EvaluationError>
where
    F: Fn(&str) -> Option<f64>,
    C: Context + ?Sized,
{
    let expr = parse(src)?;
    evaluate(&expr, lookup_parameter_value, ctx)
}

fn evaluate_inner<F, C>(
    expr: &Expression,
    lookup: &F,
    ctx: &C,
) -> Result<f64, EvaluationError>
where
    F: Fn(&str) -> Option<f64>,
    C: Context + ?Sized,
{
    match expr {
        Expression::Parameter(name) => {
            lookup(name.as_str()).ok_or_else(|| {
                EvaluationError::UnboundVariable { name: name.clone() }
            })
        },
        Expression::Constant(value) => Ok(*value),
        Expression::Binary { left, right, op } => {
            let left = evaluate_inner(left, lookup, ctx)?;
            let right = evaluate_inner(right, lookup, ctx)?;

            Ok(match op {
                BinaryOperation::Plus => left + right,
                BinaryOperation::Minus => left - right,
                BinaryOperation::Times => left * right,
                BinaryOperation::Divide => left / right,
            })
        },
        Expression::Negate(inner) => Ok(-evaluate_inner(inner, lookup, ctx)?),
        Expression::FunctionCall {
            function,
            arguments,
        } => {
            let arguments = arguments
                .iter()
                .map(|argument| evaluate_inner(argument, lookup, ctx))
                .collect::<Result<Vec<_>, _>>()?;

            ctx.evaluate_function(function.as_str(), &arguments)
        },
    }
}

/// Replace all references to a variable with an [`Expression`].
pub fn substitute(
    expression: &Expression,
    name: &str,
    value: &Expression,
) -> Expression {
    match expression {
        Expression::Parameter(p) => {
            if p == name {
                value.clone()
            } else {
                Expression::Parameter(p.clone())
            }
        },
        Expression::Constant(value) => Expression::Constant(*value),
        Expression::Binary { left, right, op } => {
            let left = substitute(left, name, value);
            let right = substitute(right, name, value);
            Expression::Binary {
                left: Box::new(left),
                right: Box::new(right),
                op: *op,
            }
        },
        Expression::Negate(inner) => -substitute(inner, name, value),
        Expression::FunctionCall {
            function,
            arguments,
        } => Expression::FunctionCall {
            function: function.clone(),
            arguments: arguments
                .iter()
                .map(|argument| substitute(argument, name, value))
                .collect(),
        },
    }
}

/// Round to a number of decimal places, with halves rounded away from zero.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    let rounded = (value * scale).round() / scale;

    // don't let a -0.0 leak out
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Functions;
    use std::collections::HashMap;

    fn no_variables(_: &str) -> Option<f64> { None }

    #[test]
    fn evaluate_simple_arithmetic() {
        let inputs = vec![
            ("1", 1.0),
            ("1 + 1.5", 1.0 + 1.5),
            ("1 - 1.5", 1.0 - 1.5),
            ("2 * 3", 2.0 * 3.0),
            ("4 / 2", 4.0 / 2.0),
            ("1 + 2*3", 7.0),
            ("(1 + 2)*3", 9.0),
            ("10 - 4 - 3", 3.0),
            ("16/4/2", 2.0),
            ("-(1 + 2)", -(1.0 + 2.0)),
            ("--2", 2.0),
            ("2*-3", -6.0),
            ("sqrt(4)", 4_f64.sqrt()),
            ("sqrt(2 + sqrt(4))", (2.0 + 4_f64.sqrt()).sqrt()),
            ("pow(2, 10)", 1024.0),
            ("max(1, 5, 3)", 5.0),
            ("5*(100)", 500.0),
        ];
        let ctx = Functions::default();

        for (src, should_be) in inputs {
            let got = evaluate_str(src, no_variables, &ctx).unwrap();

            assert_eq!(got, should_be, "{} != {}", src, should_be);
        }
    }

    #[test]
    fn look_up_variables() {
        let values: HashMap<&str, f64> =
            vec![("x", 3.0), ("y", 4.0)].into_iter().collect();
        let ctx = Functions::default();

        let got = evaluate_str(
            "sqrt(x*x + y*y)",
            |name| values.get(name).copied(),
            &ctx,
        )
        .unwrap();

        assert_eq!(got, 5.0);
    }

    #[test]
    fn unbound_variables_are_an_error() {
        let ctx = Functions::default();

        let got = evaluate_str("x + 1", no_variables, &ctx).unwrap_err();

        assert_eq!(got, EvaluationError::UnboundVariable { name: "x".into() });
    }

    #[test]
    fn only_secure_functions_can_be_called() {
        let ctx = Functions::default();

        let got = evaluate_str("exec(1)", no_variables, &ctx).unwrap_err();

        assert_eq!(got, EvaluationError::UnknownFunction { name: "exec".into() });
    }

    #[test]
    fn arithmetic_context_rejects_all_functions() {
        let got = evaluate_str("sin(1)", no_variables, &Arithmetic).unwrap_err();

        assert_eq!(got, EvaluationError::UnknownFunction { name: "sin".into() });
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let got = evaluate_str("1 +", no_variables, &Arithmetic).unwrap_err();

        assert_eq!(
            got,
            EvaluationError::Parse(ParseError::UnexpectedEndOfInput)
        );
    }

    #[test]
    fn basic_substitutions() {
        let inputs = vec![
            ("1 + 2", "3", "1 + 2"),
            ("x", "5", "5"),
            ("y", "5", "y"),
            ("x + 5", "5", " 5 + 5"),
            ("-x", "5", "-5"),
            ("sin(x)", "y + y", "sin(y + y)"),
            ("pow(x, x)", "2", "pow(2, 2)"),
        ];

        for (src, new_value, should_be) in inputs {
            let original = parse(src).unwrap();
            let new_value = parse(new_value).unwrap();
            let should_be = parse(should_be).unwrap();

            let got = substitute(&original, "x", &new_value);

            assert_eq!(got, should_be, "{} != {}", got, should_be);
        }
    }

    #[test]
    fn round_to_decimal_places() {
        let inputs = vec![
            (-2.666_666_7, 4, -2.6667),
            (4.499_99, 4, 4.5),
            (0.000_04, 4, 0.0),
            (-0.000_04, 4, 0.0),
            (2.5, 0, 3.0),
            (-2.5, 0, -3.0),
        ];

        for (value, digits, should_be) in inputs {
            let got = round_to(value, digits);

            assert_eq!(got, should_be);
            assert!(!got.is_sign_negative() || got != 0.0);
        }
    }
}
