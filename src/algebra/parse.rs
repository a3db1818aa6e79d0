use crate::algebra::{BinaryOperation, Expression};
use smol_str::SmolStr;
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
    iter::Peekable,
    ops::Range,
};

/// Parse an [`Expression`] tree from some text.
pub fn parse(s: &str) -> Result<Expression, ParseError> {
    Parser::new(s).parse()
}

/// Find the distinct variables referenced by an expression without building
/// a tree.
///
/// Any identifier immediately followed by a `(` is treated as a function
/// call and must pass the `is_secure` check. Numbers are skipped, and no
/// attempt is made to check the expression is well-formed.
pub fn variables<F>(
    src: &str,
    mut is_secure: F,
) -> Result<BTreeSet<SmolStr>, ParseError>
where
    F: FnMut(&str) -> bool,
{
    let mut found = BTreeSet::new();
    let mut tokens = Tokens::new(src).peekable();

    while let Some(token) = tokens.next() {
        let token = token?;

        if token.kind != TokenKind::Identifier {
            continue;
        }

        let is_call = matches!(
            tokens.peek(),
            Some(Ok(Token {
                kind: TokenKind::OpenParen,
                ..
            }))
        );

        if !is_call {
            found.insert(SmolStr::from(token.text));
        } else if !is_secure(token.text) {
            return Err(ParseError::InsecureFunction {
                name: token.text.into(),
            });
        }
    }

    Ok(found)
}

/// A simple recursive descent parser (`LL(1)`) for converting a string into an
/// expression tree.
///
/// The grammar:
///
/// ```text
/// expression     := term (("+" | "-") term)*
///
/// term           := unary (("*" | "/") unary)*
///
/// unary          := "-" unary
///                 | factor
///
/// factor         := variable_or_function_call
///                 | "(" expression ")"
///                 | NUMBER
///
/// variable_or_function_call = IDENTIFIER "(" arguments? ")"
///                           | IDENTIFIER
///
/// arguments      := expression ("," expression)*
/// ```
#[derive(Debug, Clone)]
pub(crate) struct Parser<'a> {
    tokens: Peekable<Tokens<'a>>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Parser {
            tokens: Tokens::new(src).peekable(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expression, ParseError> {
        let expr = self.expression()?;

        match self.tokens.next() {
            None => Ok(expr),
            Some(Ok(token)) => Err(ParseError::UnexpectedToken {
                found: token.kind,
                span: token.span,
                expected: &[
                    TokenKind::Plus,
                    TokenKind::Minus,
                    TokenKind::Times,
                    TokenKind::Divide,
                ],
            }),
            Some(Err(e)) => Err(e),
        }
    }

    fn peek(&mut self) -> Option<TokenKind> {
        self.tokens
            .peek()
            .and_then(|result| result.as_ref().ok())
            .map(|tok| tok.kind)
    }

    fn advance(&mut self) -> Result<Token<'a>, ParseError> {
        match self.tokens.next() {
            Some(result) => result,
            None => Err(ParseError::UnexpectedEndOfInput),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'a>, ParseError> {
        let token = self.advance()?;

        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                found: token.kind,
                span: token.span,
                expected: kind.as_slice(),
            })
        }
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.term()?;

        while let Some(op) = self.binary_op(&[TokenKind::Plus, TokenKind::Minus])
        {
            let _ = self.advance()?;
            let right = self.term()?;
            left = Expression::Binary {
                left: Box::new(left),
                right: Box::new(right),
                op,
            };
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.unary()?;

        while let Some(op) =
            self.binary_op(&[TokenKind::Times, TokenKind::Divide])
        {
            let _ = self.advance()?;
            let right = self.unary()?;
            left = Expression::Binary {
                left: Box::new(left),
                right: Box::new(right),
                op,
            };
        }

        Ok(left)
    }

    /// If the next token is one of the `expected` operators, get the
    /// corresponding [`BinaryOperation`].
    fn binary_op(&mut self, expected: &[TokenKind]) -> Option<BinaryOperation> {
        let kind = self.peek()?;

        if expected.contains(&kind) {
            kind.as_binary_op()
        } else {
            None
        }
    }

    fn unary(&mut self) -> Result<Expression, ParseError> {
        if self.peek() == Some(TokenKind::Minus) {
            let _ = self.advance()?;
            let operand = self.unary()?;
            return Ok(Expression::Negate(Box::new(operand)));
        }

        self.factor()
    }

    fn factor(&mut self) -> Result<Expression, ParseError> {
        let expected = &[
            TokenKind::Number,
            TokenKind::Identifier,
            TokenKind::Minus,
            TokenKind::OpenParen,
        ];

        match self.peek() {
            Some(TokenKind::Number) => {
                return self.number();
            },
            Some(TokenKind::Identifier) => {
                return self.variable_or_function_call()
            },
            Some(TokenKind::OpenParen) => {
                let _ = self.advance()?;
                let expr = self.expression()?;
                self.expect(TokenKind::CloseParen)?;
                return Ok(expr);
            },
            _ => {},
        }

        // we couldn't parse the factor, return a nice error
        match self.tokens.next() {
            Some(Ok(Token { span, kind, .. })) => {
                Err(ParseError::UnexpectedToken {
                    found: kind,
                    expected,
                    span,
                })
            },
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEndOfInput),
        }
    }

    fn variable_or_function_call(&mut self) -> Result<Expression, ParseError> {
        let ident = self.expect(TokenKind::Identifier)?;

        if self.peek() == Some(TokenKind::OpenParen) {
            self.function_call(ident)
        } else {
            Ok(Expression::parameter(ident.text))
        }
    }

    fn function_call(
        &mut self,
        identifier: Token<'a>,
    ) -> Result<Expression, ParseError> {
        self.expect(TokenKind::OpenParen)?;

        let mut arguments = Vec::new();

        if self.peek() == Some(TokenKind::CloseParen) {
            let _ = self.advance()?;
        } else {
            loop {
                arguments.push(self.expression()?);

                let Token { kind, span, .. } = self.advance()?;

                match kind {
                    TokenKind::Comma => continue,
                    TokenKind::CloseParen => break,
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            found: kind,
                            span,
                            expected: &[
                                TokenKind::Comma,
                                TokenKind::CloseParen,
                            ],
                        })
                    },
                }
            }
        }

        Ok(Expression::FunctionCall {
            function: identifier.text.into(),
            arguments,
        })
    }

    fn number(&mut self) -> Result<Expression, ParseError> {
        let token = self.expect(TokenKind::Number)?;

        token
            .text
            .parse()
            .map(Expression::Constant)
            .map_err(|_| ParseError::InvalidNumber {
                text: token.text.to_string(),
                span: token.span,
            })
    }
}

/// Possible errors that may occur while parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid character {character:?} at index {index}")]
    InvalidCharacter { character: char, index: usize },
    #[error("\"{text}\" is not a valid number")]
    InvalidNumber { text: String, span: Range<usize> },
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    #[error("found {found} at {span:?} but expected {}", one_of(.expected))]
    UnexpectedToken {
        found: TokenKind,
        span: Range<usize>,
        expected: &'static [TokenKind],
    },
    #[error("{name} is an insecure function")]
    InsecureFunction { name: SmolStr },
}

fn one_of(kinds: &[TokenKind]) -> String {
    let names: Vec<_> = kinds.iter().map(ToString::to_string).collect();

    match names.as_slice() {
        [] => String::from("nothing"),
        [single] => single.clone(),
        [rest @ .., last] => format!("{} or {}", rest.join(", "), last),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tokens<'a> {
    src: &'a str,
    cursor: usize,
}

impl<'a> Tokens<'a> {
    fn new(src: &'a str) -> Self { Tokens { src, cursor: 0 } }

    fn rest(&self) -> &'a str { &self.src[self.cursor..] }

    fn peek(&self) -> Option<char> { self.rest().chars().next() }

    fn peek_second(&self) -> Option<char> { self.rest().chars().nth(1) }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn chomp(
        &mut self,
        kind: TokenKind,
    ) -> Option<Result<Token<'a>, ParseError>> {
        let start = self.cursor;
        self.advance()?;
        let end = self.cursor;

        Some(Ok(Token::from_text(self.src, start..end, kind)))
    }

    fn take_while<P>(&mut self, mut predicate: P) -> Range<usize>
    where
        P: FnMut(char) -> bool,
    {
        let start = self.cursor;

        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }

            self.advance();
        }

        start..self.cursor
    }

    fn chomp_number(&mut self) -> Token<'a> {
        let start = self.cursor;
        self.take_while(|c| c.is_ascii_digit());

        if self.peek() == Some('.') {
            // skip past the decimal
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }

        if self.at_exponent() {
            self.advance();
            if let Some('+') | Some('-') = self.peek() {
                self.advance();
            }
            self.take_while(|c| c.is_ascii_digit());
        }

        let end = self.cursor;

        Token::from_text(self.src, start..end, TokenKind::Number)
    }

    /// An `e` only starts an exponent when digits follow it, so `2e` and
    /// `2e_x` stay a number followed by an identifier.
    fn at_exponent(&self) -> bool {
        let mut chars = self.rest().chars();

        match chars.next() {
            Some('e') | Some('E') => {},
            _ => return false,
        }

        match chars.next() {
            Some('+') | Some('-') => {
                chars.next().map_or(false, |c| c.is_ascii_digit())
            },
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn chomp_identifier(&mut self) -> Token<'a> {
        let mut seen_first_character = false;

        let span = self.take_while(|c| {
            if seen_first_character {
                c.is_ascii_alphanumeric() || c == '_'
            } else {
                seen_first_character = true;
                c.is_ascii_alphabetic() || c == '_'
            }
        });

        Token::from_text(self.src, span, TokenKind::Identifier)
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.peek()? {
                space if space.is_whitespace() => {
                    self.advance();
                    continue;
                },
                '(' => self.chomp(TokenKind::OpenParen),
                ')' => self.chomp(TokenKind::CloseParen),
                '+' => self.chomp(TokenKind::Plus),
                '-' => self.chomp(TokenKind::Minus),
                '*' => self.chomp(TokenKind::Times),
                '/' => self.chomp(TokenKind::Divide),
                ',' => self.chomp(TokenKind::Comma),
                '=' => self.chomp(TokenKind::Equals),
                '_' | 'a'..='z' | 'A'..='Z' => {
                    Some(Ok(self.chomp_identifier()))
                },
                '0'..='9' => Some(Ok(self.chomp_number())),
                '.' if matches!(self.peek_second(), Some('0'..='9')) => {
                    Some(Ok(self.chomp_number()))
                },
                other => Some(Err(ParseError::InvalidCharacter {
                    character: other,
                    index: self.cursor,
                })),
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token<'a> {
    text: &'a str,
    span: Range<usize>,
    kind: TokenKind,
}

impl<'a> Token<'a> {
    fn from_text(
        original_source: &'a str,
        span: Range<usize>,
        kind: TokenKind,
    ) -> Self {
        Token {
            text: &original_source[span.clone()],
            span,
            kind,
        }
    }
}

/// The kinds of token that can appear in an [`Expression`]'s text form.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    Number,
    OpenParen,
    CloseParen,
    Plus,
    Minus,
    Times,
    Divide,
    Comma,
    Equals,
}

impl TokenKind {
    fn as_binary_op(self) -> Option<BinaryOperation> {
        match self {
            TokenKind::Plus => Some(BinaryOperation::Plus),
            TokenKind::Minus => Some(BinaryOperation::Minus),
            TokenKind::Times => Some(BinaryOperation::Times),
            TokenKind::Divide => Some(BinaryOperation::Divide),
            _ => None,
        }
    }

    fn as_slice(self) -> &'static [TokenKind] {
        match self {
            TokenKind::Identifier => &[TokenKind::Identifier],
            TokenKind::Number => &[TokenKind::Number],
            TokenKind::OpenParen => &[TokenKind::OpenParen],
            TokenKind::CloseParen => &[TokenKind::CloseParen],
            TokenKind::Plus => &[TokenKind::Plus],
            TokenKind::Minus => &[TokenKind::Minus],
            TokenKind::Times => &[TokenKind::Times],
            TokenKind::Divide => &[TokenKind::Divide],
            TokenKind::Comma => &[TokenKind::Comma],
            TokenKind::Equals => &[TokenKind::Equals],
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier => write!(f, "an identifier"),
            TokenKind::Number => write!(f, "a number"),
            TokenKind::OpenParen => write!(f, "\"(\""),
            TokenKind::CloseParen => write!(f, "\")\""),
            TokenKind::Plus => write!(f, "\"+\""),
            TokenKind::Minus => write!(f, "\"-\""),
            TokenKind::Times => write!(f, "\"*\""),
            TokenKind::Divide => write!(f, "\"/\""),
            TokenKind::Comma => write!(f, "\",\""),
            TokenKind::Equals => write!(f, "\"=\""),
        }
    }
}

#[cfg(test)]
mod tokenizer_tests {
    use super::*;

    macro_rules! tokenize_test {
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let mut tokens = Tokens::new($src);

                let got = tokens.next().unwrap().unwrap();

                let Range { start, end } = got.span;
                assert_eq!(start, 0);
                assert_eq!(end, $src.len());
                assert_eq!(got.kind, $should_be);

                assert!(
                    tokens.next().is_none(),
                    "{:?} should be empty",
                    tokens
                );
            }
        };
    }

    tokenize_test!(open_paren, "(", TokenKind::OpenParen);
    tokenize_test!(close_paren, ")", TokenKind::CloseParen);
    tokenize_test!(plus, "+", TokenKind::Plus);
    tokenize_test!(minus, "-", TokenKind::Minus);
    tokenize_test!(times, "*", TokenKind::Times);
    tokenize_test!(divide, "/", TokenKind::Divide);
    tokenize_test!(comma, ",", TokenKind::Comma);
    tokenize_test!(equals, "=", TokenKind::Equals);
    tokenize_test!(single_digit_integer, "3", TokenKind::Number);
    tokenize_test!(multi_digit_integer, "31", TokenKind::Number);
    tokenize_test!(number_with_trailing_dot, "31.", TokenKind::Number);
    tokenize_test!(number_with_leading_dot, ".5", TokenKind::Number);
    tokenize_test!(simple_decimal, "3.14", TokenKind::Number);
    tokenize_test!(exponent, "1e3", TokenKind::Number);
    tokenize_test!(upper_case_exponent, "2.5E2", TokenKind::Number);
    tokenize_test!(negative_exponent, "6.674e-11", TokenKind::Number);
    tokenize_test!(explicitly_positive_exponent, "1e+3", TokenKind::Number);
    tokenize_test!(simple_identifier, "x", TokenKind::Identifier);
    tokenize_test!(longer_identifier, "hello", TokenKind::Identifier);
    tokenize_test!(
        identifiers_can_have_underscores,
        "hello_world",
        TokenKind::Identifier
    );
    tokenize_test!(
        identifiers_can_start_with_underscores,
        "_hello_world",
        TokenKind::Identifier
    );
    tokenize_test!(
        identifiers_can_contain_numbers,
        "var5",
        TokenKind::Identifier
    );

    #[test]
    fn an_e_without_digits_is_an_identifier() {
        let inputs =
            vec![("2e", "e"), ("2e_x", "e_x"), ("3e+", "e"), ("4E-x", "E")];

        for (src, identifier) in inputs {
            let mut tokens = Tokens::new(src);

            let number = tokens.next().unwrap().unwrap();
            assert_eq!(number.kind, TokenKind::Number);
            assert_eq!(number.span, 0..1);

            let next = tokens.next().unwrap().unwrap();
            assert_eq!(next.kind, TokenKind::Identifier, "{}", src);
            assert_eq!(&src[next.span], identifier);
        }
    }

    #[test]
    fn reject_unknown_characters() {
        let mut tokens = Tokens::new("x$");

        let _ = tokens.next().unwrap().unwrap();
        let got = tokens.next().unwrap();

        assert_eq!(
            got,
            Err(ParseError::InvalidCharacter {
                character: '$',
                index: 1
            })
        );
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    macro_rules! parser_test {
        ($name:ident, $src:expr) => {
            parser_test!($name, $src, $src);
        };
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let got = Parser::new($src).parse().unwrap();

                let round_tripped = got.to_string();
                assert_eq!(round_tripped, $should_be);
            }
        };
    }

    parser_test!(simple_integer, "1");
    parser_test!(exponent, "2.5E2", "250");
    parser_test!(negative_exponent, "x*5e-1", "x*0.5");
    parser_test!(one_plus_one, "1 + 1");
    parser_test!(one_plus_one_plus_negative_one, "1 + -1");
    parser_test!(one_plus_one_times_three, "1 + 1*3");
    parser_test!(one_plus_one_all_times_three, "(1 + 1)*3");
    parser_test!(negative_one, "-1");
    parser_test!(negative_one_plus_one, "-1 + 1");
    parser_test!(negative_one_plus_x, "-1 + x");
    parser_test!(number_in_parens, "(1)", "1");
    parser_test!(bimdas, "1*2 + 3*4/(5 - 2)*1 - 3");
    parser_test!(subtraction_is_left_associative, "a-b-c", "a - b - c");
    parser_test!(keep_brackets_on_the_right, "a-(b-c)", "a - (b - c)");
    parser_test!(division_is_left_associative, "a/b/c");
    parser_test!(function_call, "sin(1)", "sin(1)");
    parser_test!(function_call_with_expression, "sin(1/0)");
    parser_test!(function_call_with_no_arguments, "pi()");
    parser_test!(function_call_with_two_arguments, "pow(x,2)", "pow(x, 2)");
    parser_test!(
        function_calls_function_calls_function_with_variable,
        "foo(bar(baz(pi)))"
    );
    parser_test!(
        canonical_equation,
        "5-x+2*4-(88)",
        "5 - x + 2*4 - 88"
    );

    #[test]
    fn subtraction_groups_to_the_left() {
        let got = parse("a-b-c").unwrap();

        let should_be = (Expression::parameter("a") - Expression::parameter("b"))
            - Expression::parameter("c");
        assert_eq!(got, should_be);
    }

    #[test]
    fn unbalanced_brackets_are_an_error() {
        let got = parse("(1 + 2").unwrap_err();

        assert_eq!(got, ParseError::UnexpectedEndOfInput);
    }

    #[test]
    fn trailing_tokens_are_an_error() {
        let got = parse("1 + 2)").unwrap_err();

        assert!(matches!(
            got,
            ParseError::UnexpectedToken {
                found: TokenKind::CloseParen,
                ..
            }
        ));
    }

    #[test]
    fn dangling_operator_is_an_error() {
        let got = parse("x*").unwrap_err();

        assert_eq!(got, ParseError::UnexpectedEndOfInput);
    }
}

#[cfg(test)]
mod variable_tests {
    use super::*;

    fn whitelist(name: &str) -> bool { matches!(name, "sin" | "pow") }

    #[test]
    fn find_variables_and_skip_numbers() {
        let got = variables("a+b*2-sin(a)/pow(c,3.5)", whitelist).unwrap();

        let should_be: BTreeSet<SmolStr> =
            ["a", "b", "c"].iter().map(|&s| SmolStr::from(s)).collect();
        assert_eq!(got, should_be);
    }

    #[test]
    fn reject_functions_which_arent_whitelisted() {
        let got = variables("system(x)-1", whitelist).unwrap_err();

        assert_eq!(
            got,
            ParseError::InsecureFunction {
                name: "system".into()
            }
        );
    }

    #[test]
    fn constant_expressions_have_no_variables() {
        let got = variables("1+2*(3)", whitelist).unwrap();

        assert!(got.is_empty());
    }
}
