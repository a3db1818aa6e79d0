//! Turning raw text into a list of zero-form equations.

use crate::{
    algebra::{self, Expression},
    error::LoadError,
    registry::{Constants, Functions},
};
use smol_str::SmolStr;
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};

/// Characters which are silently removed from the input.
const IGNORED: &[char] =
    &['<', '>', ':', '~', '`', '!', '@', '$', '^', '&', '|', '?'];

/// A single equation in zero form, `body = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    /// The 1-based position of this equation in the system.
    pub id: usize,
    /// The canonical text, e.g. `a-(b)`.
    pub text: String,
    pub body: Expression,
    pub variables: BTreeSet<SmolStr>,
}

impl Equation {
    /// The trivial `name = 0` equation used to pad a block.
    pub fn padding(id: usize, name: &str) -> Self {
        let mut variables = BTreeSet::new();
        variables.insert(SmolStr::from(name));

        Equation {
            id,
            text: name.to_string(),
            body: Expression::parameter(name),
            variables,
        }
    }
}

impl Display for Equation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} = 0", self.text)
    }
}

/// A cleaned up line of input.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// The 1-based statement number, counting `;` as a line break.
    pub number: usize,
    pub text: String,
}

/// Strip comments and noise from the input, expand `%` and substitute
/// constants, returning only the lines which still have something on them.
pub fn normalize(
    text: &str,
    constants: &Constants,
) -> Result<Vec<Line>, LoadError> {
    let mut lines = Vec::new();

    for (ix, raw) in text.split(|c: char| c == ';' || c == '\n').enumerate() {
        let raw = match raw.find("//") {
            Some(comment) => &raw[..comment],
            None => raw,
        };

        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !IGNORED.contains(c))
            .collect();
        let cleaned = cleaned.replace('%', "*(100)");
        let cleaned = substitute_constants(&cleaned, constants)?;

        if !cleaned.is_empty() {
            lines.push(Line {
                number: ix + 1,
                text: cleaned,
            });
        }
    }

    Ok(lines)
}

/// Replace every `NAME#` with the constant's value in brackets.
fn substitute_constants(
    line: &str,
    constants: &Constants,
) -> Result<String, LoadError> {
    let mut output = String::with_capacity(line.len());

    for c in line.chars() {
        if c != '#' {
            output.push(c);
            continue;
        }

        let start = output
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|ix| ix + 1)
            .unwrap_or(0);
        let name = &output[start..];

        match constants.get(name) {
            Some(value) if !name.is_empty() => {
                output.truncate(start);
                output.push_str(&format!("({})", value));
            },
            _ => {
                return Err(LoadError::UndefinedConstant {
                    name: format!("{}#", name),
                })
            },
        }
    }

    Ok(output)
}

/// Parse text containing one or more equations.
///
/// A chain like `a = b = c` becomes the two equations `a-(b)` and `a-(c)`,
/// and a line without an `=` is compared against zero. The system must be
/// exactly determined, so the number of distinct variables has to match
/// the number of equations.
pub fn load_equations(
    text: &str,
    constants: &Constants,
    functions: &Functions,
) -> Result<Vec<Equation>, LoadError> {
    let mut equations = Vec::new();

    for line in normalize(text, constants)? {
        let mut segments = line.text.split('=');
        let lhs = segments.next().unwrap_or_default();

        if lhs.is_empty() {
            return Err(LoadError::Malformed {
                line: line.number,
                text: line.text.clone(),
            });
        }

        let rest: Vec<&str> = segments.collect();

        if rest.is_empty() {
            equations.push(lhs.to_string());
        }

        for rhs in rest {
            if rhs.is_empty() {
                equations.push(lhs.to_string());
            } else {
                equations.push(format!("{}-({})", lhs, rhs));
            }
        }
    }

    if equations.is_empty() {
        return Err(LoadError::Empty);
    }

    let equations = equations
        .into_iter()
        .enumerate()
        .map(|(ix, text)| parse_equation(ix + 1, text, functions))
        .collect::<Result<Vec<_>, _>>()?;

    let variables: BTreeSet<&SmolStr> =
        equations.iter().flat_map(|eq| &eq.variables).collect();

    if variables.len() != equations.len() {
        return Err(LoadError::CountMismatch {
            equations: equations.len(),
            variables: variables.len(),
        });
    }

    tracing::debug!(
        equations = equations.len(),
        "Loaded a system of equations"
    );

    Ok(equations)
}

fn parse_equation(
    id: usize,
    text: String,
    functions: &Functions,
) -> Result<Equation, LoadError> {
    let parsed = algebra::variables(&text, |name| functions.contains(name))
        .and_then(|variables| Ok((variables, algebra::parse(&text)?)));

    match parsed {
        Ok((variables, body)) => Ok(Equation {
            id,
            text,
            body,
            variables,
        }),
        Err(source) => Err(LoadError::Parse {
            equation: id,
            text,
            source,
        }),
    }
}
