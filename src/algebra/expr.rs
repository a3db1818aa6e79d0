use smol_str::SmolStr;
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
    ops::{Add, Div, Mul, Neg, Sub},
};

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A named variable.
    Parameter(SmolStr),
    Constant(f64),
    /// An expression involving two operands.
    Binary {
        left: Box<Expression>,
        right: Box<Expression>,
        op: BinaryOperation,
    },
    /// Negate the expression.
    Negate(Box<Expression>),
    /// Invoke a function by name.
    FunctionCall {
        function: SmolStr,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn parameter<S: Into<SmolStr>>(name: S) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    /// Iterate over every variable reference in this expression, in the
    /// order they appear (duplicates included).
    pub fn params(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        let mut found = Vec::new();
        self.visit(&mut |expr| {
            if let Expression::Parameter(name) = expr {
                found.push(name);
            }
        });
        found.into_iter()
    }

    /// The distinct variables this expression references.
    pub fn variables(&self) -> BTreeSet<SmolStr> {
        self.params().cloned().collect()
    }

    /// Does this expression reference the named variable?
    pub fn depends_on(&self, name: &str) -> bool {
        self.params().any(|p| p == name)
    }

    /// The names of every function this expression calls.
    pub fn functions(&self) -> BTreeSet<&SmolStr> {
        let mut found = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Expression::FunctionCall { function, .. } = expr {
                found.insert(function);
            }
        });
        found
    }

    fn visit<'a, F>(&'a self, visitor: &mut F)
    where
        F: FnMut(&'a Expression),
    {
        visitor(self);

        match self {
            Expression::Parameter(_) | Expression::Constant(_) => {},
            Expression::Binary { left, right, .. } => {
                left.visit(visitor);
                right.visit(visitor);
            },
            Expression::Negate(inner) => inner.visit(visitor),
            Expression::FunctionCall { arguments, .. } => {
                for argument in arguments {
                    argument.visit(visitor);
                }
            },
        }
    }

    /// How tightly this expression binds when printed next to an operator.
    fn precedence(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => op.precedence(),
            Expression::Negate(_) => 3,
            Expression::Constant(value) if value.is_sign_negative() => 3,
            _ => 4,
        }
    }
}

/// An operation that can be applied to two arguments.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BinaryOperation {
    Plus,
    Minus,
    Times,
    Divide,
}

impl BinaryOperation {
    fn precedence(self) -> u8 {
        match self {
            BinaryOperation::Plus | BinaryOperation::Minus => 1,
            BinaryOperation::Times | BinaryOperation::Divide => 2,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOperation::Plus => " + ",
            BinaryOperation::Minus => " - ",
            BinaryOperation::Times => "*",
            BinaryOperation::Divide => "/",
        }
    }
}

// define some operator overloads to make constructing an expression easier.

impl Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        binary(self, rhs, BinaryOperation::Plus)
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        binary(self, rhs, BinaryOperation::Minus)
    }
}

impl Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        binary(self, rhs, BinaryOperation::Times)
    }
}

impl Div for Expression {
    type Output = Expression;

    fn div(self, rhs: Expression) -> Expression {
        binary(self, rhs, BinaryOperation::Divide)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Self::Output { Expression::Negate(Box::new(self)) }
}

fn binary(left: Expression, right: Expression, op: BinaryOperation) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        right: Box::new(right),
        op,
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Parameter(name) => write!(f, "{}", name),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Binary { left, right, op } => {
                let precedence = op.precedence();
                // binary operators are left-associative, so anything of the
                // same precedence on the right needs brackets
                write_operand(left, left.precedence() < precedence, f)?;
                write!(f, "{}", op.symbol())?;
                write_operand(right, right.precedence() <= precedence, f)
            },
            Expression::Negate(inner) => {
                write!(f, "-")?;
                write_operand(inner, inner.precedence() < 3, f)
            },
            Expression::FunctionCall {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;

                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }

                write!(f, ")")
            },
        }
    }
}

fn write_operand(
    expr: &Expression,
    bracketed: bool,
    f: &mut Formatter<'_>,
) -> fmt::Result {
    if bracketed {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}
