//! Raw character-level tokenization of a pattern string.
//!
//! Braces nest exactly two levels deep: the variable body `{...}` and,
//! inside it, an optional repetition count `{N}` / `{N,M}`. A regex group
//! is delimited by balanced parens and scanned independently of brace
//! depth, so a regex like `([0-9a-f]{40})` never confuses the repetition
//! scan that follows it.

use super::ParseError;
use super::ParseErrorReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawToken {
    Slash,
    Literal(String),
    BraceOpen,
    BraceClose,
    Ident(String),
    /// Regex source, parens included, exactly as written in the pattern.
    Regex(String),
    Repeat(RepeatSymbol),
    /// `{N}` (second field `None`) or `{N,M}` / `{N,}` (second field set).
    Bound(i64, Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatSymbol {
    Opt,
    Plus,
    Star,
}

pub fn tokenize(pattern: &str) -> Result<Vec<RawToken>, ParseError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '/' => {
                tokens.push(RawToken::Slash);
                i += 1;
            }
            '{' => {
                tokens.push(RawToken::BraceOpen);
                i += 1;
                i = tokenize_variable_body(&chars, i, &mut tokens)?;
                if i >= chars.len() || chars[i] != '}' {
                    return Err(ParseError::new(ParseErrorReason::UnbalancedBrace, i));
                }
                tokens.push(RawToken::BraceClose);
                i += 1;
            }
            '}' => return Err(ParseError::new(ParseErrorReason::UnbalancedBrace, i)),
            _ => {
                let start = i;
                while i < chars.len() && !matches!(chars[i], '/' | '{' | '}') {
                    i += 1;
                }
                tokens.push(RawToken::Literal(chars[start..i].iter().collect()));
            }
        }
    }

    Ok(tokens)
}

/// Scans the inside of a `{...}` body. Returns the index of the closing
/// `}` (not consumed).
fn tokenize_variable_body(
    chars: &[char],
    mut i: usize,
    tokens: &mut Vec<RawToken>,
) -> Result<usize, ParseError> {
    // A bare repetition symbol is the whole body: `{*}`, `{+}`, `{?}`.
    if let Some(sym) = bare_repeat_symbol(chars.get(i).copied()) {
        tokens.push(RawToken::Repeat(sym));
        return Ok(i + 1);
    }

    if let Some(c) = chars.get(i).copied() {
        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            tokens.push(RawToken::Ident(chars[start..i].iter().collect()));
        }
    }

    if chars.get(i) == Some(&'(') {
        let start = i;
        let mut depth = 0i32;
        loop {
            if i >= chars.len() {
                return Err(ParseError::new(ParseErrorReason::UnclosedRegexGroup, start));
            }
            match chars[i] {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        let source: String = chars[start..i].iter().collect();
        if source == "()" {
            return Err(ParseError::new(ParseErrorReason::EmptyRegexGroup, start));
        }
        if regex::Regex::new(&source).is_err() {
            return Err(ParseError::new(ParseErrorReason::InvalidRegex, start));
        }
        tokens.push(RawToken::Regex(source));
    }

    if let Some(sym) = bare_repeat_symbol(chars.get(i).copied()) {
        tokens.push(RawToken::Repeat(sym));
        i += 1;
    } else if chars.get(i) == Some(&'{') {
        let start = i;
        i += 1;
        let (min, mut i2) = scan_number(chars, i, start)?;
        let max = if chars.get(i2) == Some(&',') {
            i2 += 1;
            if chars.get(i2) == Some(&'}') {
                Some(-1)
            } else {
                let (m, rest) = scan_number(chars, i2, start)?;
                i2 = rest;
                if chars.get(i2) == Some(&',') {
                    return Err(ParseError::new(ParseErrorReason::DanglingRepetition, i2));
                }
                Some(m)
            }
        } else {
            None
        };
        if chars.get(i2) != Some(&'}') {
            return Err(ParseError::new(ParseErrorReason::InvalidRepetitionBounds, start));
        }
        let hi = max.unwrap_or(min);
        if hi != -1 && hi < min {
            return Err(ParseError::new(ParseErrorReason::InvalidRepetitionBounds, start));
        }
        i = i2 + 1;
        tokens.push(RawToken::Bound(min, max));
    }

    if let Some(c) = chars.get(i).copied() {
        if c != '}' {
            return Err(ParseError::new(ParseErrorReason::UnknownRepetitionShorthand, i));
        }
    }

    Ok(i)
}

fn bare_repeat_symbol(c: Option<char>) -> Option<RepeatSymbol> {
    match c {
        Some('*') => Some(RepeatSymbol::Star),
        Some('+') => Some(RepeatSymbol::Plus),
        Some('?') => Some(RepeatSymbol::Opt),
        _ => None,
    }
}

fn scan_number(chars: &[char], mut i: usize, err_at: usize) -> Result<(i64, usize), ParseError> {
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        return Err(ParseError::new(ParseErrorReason::InvalidRepetitionBounds, err_at));
    }
    let value: i64 = chars[start..i]
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| ParseError::new(ParseErrorReason::InvalidRepetitionBounds, err_at))?;
    Ok((value, i))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_literal_and_slash() {
        let tokens = tokenize("/hello").unwrap();
        assert_eq!(
            tokens,
            vec![RawToken::Slash, RawToken::Literal("hello".into())]
        );
    }

    #[test]
    fn tokenizes_star_shorthand() {
        let tokens = tokenize("{*}").unwrap();
        assert_eq!(
            tokens,
            vec![
                RawToken::BraceOpen,
                RawToken::Repeat(RepeatSymbol::Star),
                RawToken::BraceClose,
            ]
        );
    }

    #[test]
    fn tokenizes_named_variable_with_repetition() {
        let tokens = tokenize("{who?}").unwrap();
        assert_eq!(
            tokens,
            vec![
                RawToken::BraceOpen,
                RawToken::Ident("who".into()),
                RawToken::Repeat(RepeatSymbol::Opt),
                RawToken::BraceClose,
            ]
        );
    }

    #[test]
    fn tokenizes_regex_with_embedded_braces() {
        let tokens = tokenize("{hash([0-9a-f]{40})}").unwrap();
        assert_eq!(
            tokens,
            vec![
                RawToken::BraceOpen,
                RawToken::Ident("hash".into()),
                RawToken::Regex("([0-9a-f]{40})".into()),
                RawToken::BraceClose,
            ]
        );
    }

    #[test]
    fn tokenizes_exact_count_repetition() {
        let tokens = tokenize(r"{how(\w){5}}").unwrap();
        assert_eq!(
            tokens,
            vec![
                RawToken::BraceOpen,
                RawToken::Ident("how".into()),
                RawToken::Regex(r"(\w)".into()),
                RawToken::Bound(5, None),
                RawToken::BraceClose,
            ]
        );
    }

    #[test]
    fn rejects_unbalanced_brace() {
        let err = tokenize("/{who").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::UnbalancedBrace);
    }

    #[test]
    fn rejects_unclosed_regex() {
        let err = tokenize("{x(abc}").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::UnclosedRegexGroup);
    }

    #[test]
    fn rejects_empty_regex_group() {
        let err = tokenize("{x()}").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::EmptyRegexGroup);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = tokenize("{x{5,2}}").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::InvalidRepetitionBounds);
    }

    #[test]
    fn rejects_stray_close_brace() {
        let err = tokenize("/foo}").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::UnbalancedBrace);
    }

    #[test]
    fn rejects_invalid_regex_source() {
        let err = tokenize("{x(*)}").unwrap_err();
        assert_eq!(err.reason, ParseErrorReason::InvalidRegex);
    }
}
