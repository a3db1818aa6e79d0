//! The functions and named constants equations are allowed to use.

use crate::algebra::ops::{self, Context, EvaluationError};
use smol_str::SmolStr;
use std::{
    collections::BTreeMap,
    f64::consts::PI,
    fmt::{self, Debug, Display, Formatter},
};

/// The signature of a function which can be called from an equation.
pub type Callable = fn(&[f64]) -> f64;

/// How many arguments a function accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::Between(low, high) => low <= count && count <= high,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(1) => write!(f, "1 argument"),
            Arity::Exactly(n) => write!(f, "{} arguments", n),
            Arity::Between(low, high) => {
                write!(f, "{} to {} arguments", low, high)
            },
            Arity::AtLeast(n) => write!(f, "at least {} arguments", n),
        }
    }
}

#[derive(Copy, Clone)]
struct Function {
    arity: Arity,
    body: Callable,
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("arity", &self.arity)
            .finish()
    }
}

/// The whitelist of functions an equation may call.
///
/// Every function call made while evaluating an equation goes through this
/// table, and anything not registered here is rejected.
#[derive(Debug, Clone)]
pub struct Functions {
    functions: BTreeMap<SmolStr, Function>,
}

impl Functions {
    /// A table with no functions at all.
    pub fn empty() -> Self {
        Functions {
            functions: BTreeMap::new(),
        }
    }

    /// Add a new function to the whitelist.
    pub fn register(
        &mut self,
        name: &str,
        arity: Arity,
        body: Callable,
    ) -> Result<(), RegistryError> {
        validate_name(name)?;

        if self.contains(name) {
            return Err(RegistryError::AlreadyDefined {
                kind: "secure function",
                name: name.to_string(),
            });
        }

        self.functions.insert(name.into(), Function { arity, body });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.functions.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize { self.functions.len() }

    pub fn is_empty(&self) -> bool { self.functions.is_empty() }

    fn builtin(&mut self, name: &'static str, arity: Arity, body: Callable) {
        self.functions.insert(name.into(), Function { arity, body });
    }
}

impl Default for Functions {
    /// The standard maths functions. Angles are in radians.
    fn default() -> Self {
        use Arity::*;

        let mut functions = Functions::empty();

        functions.builtin("pow", Exactly(2), |args| args[0].powf(args[1]));
        functions.builtin("sin", Exactly(1), |args| args[0].sin());
        functions.builtin("cos", Exactly(1), |args| args[0].cos());
        functions.builtin("tan", Exactly(1), |args| args[0].tan());
        functions.builtin("asin", Exactly(1), |args| args[0].asin());
        functions.builtin("acos", Exactly(1), |args| args[0].acos());
        functions.builtin("atan", Exactly(1), |args| args[0].atan());
        functions.builtin("sinh", Exactly(1), |args| args[0].sinh());
        functions.builtin("cosh", Exactly(1), |args| args[0].cosh());
        functions.builtin("tanh", Exactly(1), |args| args[0].tanh());
        functions.builtin("asinh", Exactly(1), |args| args[0].asinh());
        functions.builtin("acosh", Exactly(1), |args| args[0].acosh());
        functions.builtin("atanh", Exactly(1), |args| args[0].atanh());
        functions.builtin("atan2", Exactly(2), |args| args[0].atan2(args[1]));
        functions.builtin("ceil", Exactly(1), |args| args[0].ceil());
        functions.builtin("exp", Exactly(1), |args| args[0].exp());
        functions.builtin("floor", Exactly(1), |args| args[0].floor());
        functions.builtin("log", Between(1, 2), |args| match args {
            [x, base] => x.ln() / base.ln(),
            _ => args[0].ln(),
        });
        functions.builtin("log10", Exactly(1), |args| args[0].log10());
        functions.builtin("min", AtLeast(1), |args| {
            args.iter().copied().fold(f64::INFINITY, f64::min)
        });
        functions.builtin("max", AtLeast(1), |args| {
            args.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        });
        functions.builtin("pi", Exactly(0), |_| PI);
        functions.builtin("rad2deg", Exactly(1), |args| args[0].to_degrees());
        functions.builtin("round", Between(1, 2), |args| match args {
            [x, digits] => ops::round_to(*x, *digits as i32),
            _ => ops::round_to(args[0], 0),
        });
        functions.builtin("sqrt", Exactly(1), |args| args[0].sqrt());

        functions
    }
}

impl Context for Functions {
    fn evaluate_function(
        &self,
        name: &str,
        arguments: &[f64],
    ) -> Result<f64, EvaluationError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownFunction { name: name.into() })?;

        if !function.arity.accepts(arguments.len()) {
            return Err(EvaluationError::WrongArity {
                name: name.into(),
                expected: function.arity,
                found: arguments.len(),
            });
        }

        Ok((function.body)(arguments))
    }
}

/// Named constants which can be referenced in equation text as `NAME#`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constants {
    values: BTreeMap<SmolStr, f64>,
}

impl Constants {
    pub fn empty() -> Self {
        Constants {
            values: BTreeMap::new(),
        }
    }

    /// Add a new constant. Names are stored in upper case, so `define("g",
    /// ..)` is referenced as `G#`.
    pub fn define(&mut self, name: &str, value: f64) -> Result<(), RegistryError> {
        validate_name(name)?;
        let name = name.to_ascii_uppercase();

        if !value.is_finite() {
            return Err(RegistryError::NotFinite { name, value });
        }

        if self.values.contains_key(name.as_str()) {
            return Err(RegistryError::AlreadyDefined {
                kind: "constant",
                name,
            });
        }

        self.values.insert(name.into(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl Default for Constants {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(SmolStr::from("PI"), PI);

        Constants { values }
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("{name} is already a {kind}")]
    AlreadyDefined { kind: &'static str, name: String },
    #[error(
        "\"{name}\" is not a valid name, only letters, digits and underscores are allowed"
    )]
    InvalidName { name: String },
    #[error("the constant {name} must be a finite number, not {value}")]
    NotFinite { name: String, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trig_functions_use_radians() {
        let functions = Functions::default();

        let got = functions.evaluate_function("sin", &[PI / 2.0]).unwrap();

        assert_eq!(got, 1.0);
    }

    #[test]
    fn optional_arguments() {
        let functions = Functions::default();

        let inputs = vec![
            ("round", vec![2.5], 3.0),
            ("round", vec![1.23456, 2.0], 1.23),
            ("log", vec![8.0, 2.0], 3.0),
            ("min", vec![4.0, -1.0, 2.0], -1.0),
            ("pi", vec![], PI),
        ];

        for (name, args, should_be) in inputs {
            let got = functions.evaluate_function(name, &args).unwrap();
            approx::assert_relative_eq!(got, should_be);
        }
    }

    #[test]
    fn calling_with_the_wrong_number_of_arguments() {
        let functions = Functions::default();

        let got = functions.evaluate_function("pow", &[1.0]).unwrap_err();

        assert_eq!(
            got,
            EvaluationError::WrongArity {
                name: "pow".into(),
                expected: Arity::Exactly(2),
                found: 1,
            }
        );
        assert_eq!(got.to_string(), "pow() takes 2 arguments but was called with 1");
    }

    #[test]
    fn register_a_new_function() {
        let mut functions = Functions::default();

        functions
            .register("hypot", Arity::Exactly(2), |args| args[0].hypot(args[1]))
            .unwrap();

        assert!(functions.contains("hypot"));
        let got = functions.evaluate_function("hypot", &[3.0, 4.0]).unwrap();
        assert_eq!(got, 5.0);
    }

    #[test]
    fn functions_cant_be_registered_twice() {
        let mut functions = Functions::default();

        let got = functions
            .register("sin", Arity::Exactly(1), |args| args[0])
            .unwrap_err();

        assert_eq!(got.to_string(), "sin is already a secure function");
    }

    #[test]
    fn names_must_be_identifiers() {
        let mut functions = Functions::default();
        let mut constants = Constants::default();

        for name in &["", "rm -rf", "a.b", "x#"] {
            assert!(functions.register(name, Arity::Exactly(0), |_| 0.0).is_err());
            assert_eq!(
                constants.define(name, 1.0),
                Err(RegistryError::InvalidName {
                    name: name.to_string()
                })
            );
        }
    }

    #[test]
    fn define_constants() {
        let mut constants = Constants::default();

        constants.define("g", 9.81).unwrap();

        assert_eq!(constants.get("G"), Some(9.81));
        assert_eq!(constants.get("g"), None);
        assert_eq!(constants.get("PI"), Some(PI));
        assert_eq!(
            constants.define("PI", 3.0).unwrap_err().to_string(),
            "PI is already a constant"
        );
    }

    #[test]
    fn constants_must_be_finite() {
        let mut constants = Constants::default();
        let inputs = vec![f64::INFINITY, f64::NEG_INFINITY, f64::NAN];

        for value in inputs {
            let got = constants.define("big", value).unwrap_err();

            assert!(
                matches!(got, RegistryError::NotFinite { ref name, .. } if name == "BIG"),
                "{:?}",
                got
            );
            assert_eq!(constants.get("BIG"), None);
        }
        assert_eq!(
            constants.define("big", f64::INFINITY).unwrap_err().to_string(),
            "the constant BIG must be a finite number, not inf"
        );
    }
}
