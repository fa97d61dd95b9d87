//! Converts a raw token stream into a [`Token`](crate::token::Token) sequence.
//!
//! By the time tokens reach this stage the lexer has already validated
//! brace/paren balance and repetition bounds, so conversion here is
//! infallible: it is pure structural reshaping plus auto-naming of
//! anonymous variables.

use std::fmt;

use crate::debug_error;
use crate::token::{Separator, Token, Variable};

use super::lexer::{tokenize, RawToken, RepeatSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorReason {
    UnbalancedBrace,
    UnclosedRegexGroup,
    EmptyRegexGroup,
    InvalidRepetitionBounds,
    UnknownRepetitionShorthand,
    DanglingRepetition,
    InvalidRegex,
}

impl fmt::Display for ParseErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseErrorReason::UnbalancedBrace => "unbalanced brace",
            ParseErrorReason::UnclosedRegexGroup => "unclosed regex group",
            ParseErrorReason::EmptyRegexGroup => "empty regex group",
            ParseErrorReason::InvalidRepetitionBounds => "invalid repetition bounds",
            ParseErrorReason::UnknownRepetitionShorthand => "unknown repetition shorthand",
            ParseErrorReason::DanglingRepetition => "dangling repetition",
            ParseErrorReason::InvalidRegex => "invalid regex",
        };
        write!(f, "{}", msg)
    }
}

/// Failure to parse a pattern string. `offset` is the character index
/// into the pattern where the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub reason: ParseErrorReason,
    pub offset: usize,
}

impl ParseError {
    pub fn new(reason: ParseErrorReason, offset: usize) -> Self {
        debug_error!("parse error at offset {}: {}", offset, reason);
        ParseError { reason, offset }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.reason, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// Parses a pattern string into its token sequence.
pub fn parse(pattern: &str) -> Result<Vec<Token>, ParseError> {
    let raw = tokenize(pattern)?;
    Ok(tokens_to_pattern(&raw))
}

fn tokens_to_pattern(raw: &[RawToken]) -> Vec<Token> {
    let mut out = Vec::new();
    let mut pending_sep = true; // the leading slash is implicit
    let mut anon_counter = 0usize;
    let mut i = 0;

    while i < raw.len() {
        match &raw[i] {
            RawToken::Slash => {
                pending_sep = true;
                i += 1;
            }
            RawToken::Literal(s) => {
                if pending_sep {
                    out.push(Token::Epsilon(Separator::Slash));
                    pending_sep = false;
                }
                out.push(Token::Literal(s.clone()));
                i += 1;
            }
            RawToken::BraceOpen => {
                if pending_sep {
                    out.push(Token::Epsilon(Separator::Slash));
                    pending_sep = false;
                }
                let (variable, next) = parse_variable(raw, i + 1, &mut anon_counter);
                out.push(Token::Variable(variable));
                i = next;
            }
            _ => unreachable!("lexer only emits Slash/Literal/BraceOpen at the top level"),
        }
    }

    // A trailing separator run (pending_sep still true here) is dropped
    // rather than rendered as a redundant epsilon before eps(end).
    out.push(Token::Epsilon(Separator::End));
    out
}

/// Consumes one variable body starting just past its `BraceOpen`. Returns
/// the built variable and the index just past its `BraceClose`.
fn parse_variable(raw: &[RawToken], mut i: usize, anon_counter: &mut usize) -> (Variable, usize) {
    let mut name: Option<String> = None;
    let mut regex: Option<String> = None;
    let mut min: i64 = 1;
    let mut max: i64 = 1;

    match raw.get(i) {
        Some(RawToken::Repeat(sym)) => {
            let (lo, hi) = repeat_bounds(*sym);
            min = lo;
            max = hi;
            i += 1;
        }
        _ => {
            if let Some(RawToken::Ident(s)) = raw.get(i) {
                name = Some(s.clone());
                i += 1;
            }
            if let Some(RawToken::Regex(s)) = raw.get(i) {
                regex = Some(s.clone());
                i += 1;
            }
            match raw.get(i) {
                Some(RawToken::Repeat(sym)) => {
                    let (lo, hi) = repeat_bounds(*sym);
                    min = lo;
                    max = hi;
                    i += 1;
                }
                Some(RawToken::Bound(lo, hi)) => {
                    min = *lo;
                    max = hi.unwrap_or(*lo);
                    i += 1;
                }
                _ => {}
            }
        }
    }

    debug_assert_eq!(raw.get(i), Some(&RawToken::BraceClose));
    i += 1;

    let name = name.unwrap_or_else(|| {
        *anon_counter += 1;
        anon_counter.to_string()
    });

    (Variable { name, regex, min, max }, i)
}

fn repeat_bounds(sym: RepeatSymbol) -> (i64, i64) {
    match sym {
        RepeatSymbol::Opt => (0, 1),
        RepeatSymbol::Plus => (1, -1),
        RepeatSymbol::Star => (0, -1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_worked_fixture() {
        let tokens = parse(r"//hello/{who?}///{how(\w){5}}/{+}/").unwrap();
        let rendered: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "eps('/')",
                r#"lit("hello")"#,
                "eps('/')",
                r#"var("who", none, 0, 1)"#,
                "eps('/')",
                r#"var("how", "(\\w)", 5, 5)"#,
                "eps('/')",
                r#"var("1", none, 1, -1)"#,
                "eps(end)",
            ]
        );
    }

    #[test]
    fn implicit_leading_slash() {
        let tokens = parse("hello").unwrap();
        assert_eq!(tokens[0], Token::Epsilon(Separator::Slash));
    }

    #[test]
    fn star_shorthand_is_unbounded_anonymous() {
        let tokens = parse("/admin/{*}").unwrap();
        let var = match &tokens[3] {
            Token::Variable(v) => v,
            other => panic!("expected variable, got {:?}", other),
        };
        assert_eq!(var.name, "1");
        assert_eq!(var.regex, None);
        assert_eq!(var.min, 0);
        assert_eq!(var.max, -1);
    }

    #[test]
    fn anon_counter_skips_named_variables() {
        let tokens = parse("/{named}/{*}/{+}").unwrap();
        let names: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Variable(v) => Some(v.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["named", "1", "2"]);
    }

    #[test]
    fn propagates_lexer_errors() {
        let err = parse("/{unterminated").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::UnbalancedBrace);
    }
}
