//! Arithmetic over token slices: `+ - * /` with parentheses, unary minus and
//! unit tracking.
//!
//! [`eval_expr`] evaluates a slice that must be a single expression.
//! [`evaluate`] scans a whole value and replaces every sub-expression it can
//! evaluate, leaving lists like `10px -5px` and ratios like `12px/1.5`
//! alone. Expressions whose units are unknown or incompatible pass through
//! untouched.

use crate::error::{Span, ValueError};
use crate::token::{matching, render, skip_space, trim, Token, TokenKind, Tokens};
use crate::tokenizer::Tokenizer;
use std::fmt;
use tracing::trace;

/// Units arithmetic understands. Anything else makes an expression opaque.
pub const UNITS: &[&str] = &["px", "em", "rem", "vh", "vw", "%"];

#[derive(Clone, Debug, PartialEq)]
pub struct Number {
    pub value: f64,
    pub unit: String,
}

impl Number {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn unitless(value: f64) -> Self {
        Self::new(value, "")
    }

    pub fn to_tokens(&self, span: Span) -> Tokens {
        Tokenizer::fragment(&self.to_string(), span)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", format_number(self.value), self.unit)
    }
}

/// Shortest decimal rendering with at most eight fractional digits.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1e8).round() / 1e8;
    if rounded == rounded.trunc() {
        let int = rounded as i64;
        return int.to_string();
    }
    let text = format!("{:.8}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Parse a slice holding exactly one number with an optional unit, such as
/// `-1.5em` or `20%`. Any unit is accepted here.
pub fn parse_number(tokens: &[Token]) -> Option<Number> {
    let tokens = trim(tokens);
    let (negative, rest) = match tokens.first()?.kind {
        TokenKind::Minus => (true, &tokens[1..]),
        TokenKind::Plus => (false, &tokens[1..]),
        _ => (false, tokens),
    };
    let first = rest.first()?;
    if !first.is(TokenKind::Number) {
        return None;
    }
    let unit = match rest.len() {
        1 => String::new(),
        2 if matches!(rest[1].kind, TokenKind::Ident | TokenKind::Percent) => rest[1].text.clone(),
        _ => return None,
    };
    let value: f64 = first.text.parse().ok()?;
    Some(Number::new(if negative { -value } else { value }, unit))
}

enum Fail {
    /// Not an expression; leave the tokens alone.
    Syntax,
    Value(ValueError),
}

impl From<ValueError> for Fail {
    fn from(e: ValueError) -> Self {
        Fail::Value(e)
    }
}

struct Expr<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    ops: usize,
}

impl<'t> Expr<'t> {
    fn new(tokens: &'t [Token], pos: usize) -> Self {
        Self {
            tokens,
            pos,
            depth: 0,
            ops: 0,
        }
    }

    /// Whether the operator at `k` is a binary operator here. Outside
    /// parentheses `a -b` starts a new list item and `/` needs spaces on
    /// both sides, so `12px/1.5` stays a ratio.
    fn binary_at(&self, k: usize, op: TokenKind) -> bool {
        if self.depth > 0 {
            return true;
        }
        let space_before = k > self.pos;
        let space_after = self.tokens.get(k + 1).is_some_and(Token::is_space);
        match op {
            TokenKind::Plus | TokenKind::Minus => !(space_before && !space_after),
            TokenKind::Slash => space_before && space_after,
            _ => true,
        }
    }

    fn sum(&mut self) -> Result<Number, Fail> {
        let mut left = self.product()?;
        loop {
            let k = skip_space(self.tokens, self.pos);
            let Some(op) = self.tokens.get(k).map(|t| t.kind) else {
                break;
            };
            if !matches!(op, TokenKind::Plus | TokenKind::Minus) || !self.binary_at(k, op) {
                break;
            }
            let save = self.pos;
            self.pos = k + 1;
            let right = match self.product() {
                Ok(right) => right,
                Err(Fail::Syntax) => {
                    self.pos = save;
                    break;
                }
                Err(e) => return Err(e),
            };
            let op = if op == TokenKind::Plus { '+' } else { '-' };
            left = apply(op, left, right)?;
            self.ops += 1;
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Number, Fail> {
        let mut left = self.unary()?;
        loop {
            let k = skip_space(self.tokens, self.pos);
            let Some(op) = self.tokens.get(k).map(|t| t.kind) else {
                break;
            };
            if !matches!(op, TokenKind::Star | TokenKind::Slash) || !self.binary_at(k, op) {
                break;
            }
            let save = self.pos;
            self.pos = k + 1;
            let right = match self.unary() {
                Ok(right) => right,
                Err(Fail::Syntax) => {
                    self.pos = save;
                    break;
                }
                Err(e) => return Err(e),
            };
            let op = if op == TokenKind::Star { '*' } else { '/' };
            left = apply(op, left, right)?;
            self.ops += 1;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Number, Fail> {
        let k = skip_space(self.tokens, self.pos);
        let token = self.tokens.get(k).ok_or(Fail::Syntax)?;
        match token.kind {
            TokenKind::Minus => {
                let next = self.tokens.get(k + 1).ok_or(Fail::Syntax)?;
                if !matches!(
                    next.kind,
                    TokenKind::Number | TokenKind::LParen | TokenKind::Minus
                ) {
                    return Err(Fail::Syntax);
                }
                self.pos = k + 1;
                let mut n = self.unary()?;
                n.value = -n.value;
                if next.kind != TokenKind::Number {
                    self.ops += 1;
                }
                Ok(n)
            }
            TokenKind::Number => {
                self.pos = k + 1;
                let mut unit = String::new();
                if let Some(next) = self.tokens.get(self.pos) {
                    if matches!(next.kind, TokenKind::Ident | TokenKind::Percent) {
                        unit = next.text.clone();
                        self.pos += 1;
                    }
                }
                if !unit.is_empty() && !UNITS.contains(&unit.as_str()) {
                    return Err(Fail::Syntax);
                }
                let value: f64 = token
                    .text
                    .parse()
                    .map_err(|_| ValueError::InvalidNumber(token.text.clone()))?;
                Ok(Number::new(value, unit))
            }
            TokenKind::LParen => {
                self.depth += 1;
                self.pos = k + 1;
                let n = self.sum()?;
                let close = skip_space(self.tokens, self.pos);
                if !self.tokens.get(close).is_some_and(|t| t.is(TokenKind::RParen)) {
                    return Err(Fail::Syntax);
                }
                self.pos = close + 1;
                self.depth -= 1;
                self.ops += 1;
                Ok(n)
            }
            _ => Err(Fail::Syntax),
        }
    }
}

fn apply(op: char, left: Number, right: Number) -> Result<Number, ValueError> {
    let incompatible = |left: &Number, right: &Number| ValueError::IncompatibleUnits {
        op,
        left: left.to_string(),
        right: right.to_string(),
    };
    match op {
        '+' | '-' => {
            if left.unit != right.unit {
                return Err(incompatible(&left, &right));
            }
            let value = if op == '+' {
                left.value + right.value
            } else {
                left.value - right.value
            };
            Ok(Number::new(value, left.unit))
        }
        '*' => {
            if !left.unit.is_empty() && !right.unit.is_empty() {
                return Err(incompatible(&left, &right));
            }
            let unit = if left.unit.is_empty() {
                right.unit
            } else {
                left.unit
            };
            Ok(Number::new(left.value * right.value, unit))
        }
        _ => {
            if right.value == 0.0 {
                return Err(ValueError::DivisionByZero);
            }
            let unit = if right.unit.is_empty() {
                left.unit
            } else if right.unit == left.unit {
                String::new()
            } else {
                return Err(incompatible(&left, &right));
            };
            Ok(Number::new(left.value / right.value, unit))
        }
    }
}

/// Evaluate a slice that must be exactly one arithmetic expression.
pub fn eval_expr(tokens: &[Token]) -> Result<Number, ValueError> {
    let tokens = trim(tokens);
    let mut expr = Expr::new(tokens, 0);
    expr.depth = 1;
    match expr.sum() {
        Ok(n) if skip_space(tokens, expr.pos) == tokens.len() => Ok(n),
        Err(Fail::Value(e)) => Err(e),
        _ => Err(ValueError::InvalidNumber(render(tokens))),
    }
}

fn starts_expression(tokens: &[Token], i: usize) -> bool {
    let prev = i.checked_sub(1).map(|p| &tokens[p]);
    match tokens[i].kind {
        TokenKind::Number => !prev.is_some_and(|p| {
            matches!(
                p.kind,
                TokenKind::Hash | TokenKind::Ident | TokenKind::Escape | TokenKind::Dot
            )
        }),
        TokenKind::LParen => !prev.is_some_and(|p| {
            matches!(
                p.kind,
                TokenKind::Ident | TokenKind::Escape | TokenKind::Percent | TokenKind::RParen
            )
        }),
        TokenKind::Minus => {
            tokens
                .get(i + 1)
                .is_some_and(|n| matches!(n.kind, TokenKind::Number | TokenKind::LParen))
                && prev.map_or(true, |p| {
                    p.is_space() || matches!(p.kind, TokenKind::LParen | TokenKind::Comma)
                })
        }
        _ => false,
    }
}

/// Replace every evaluable arithmetic sub-expression in a value.
pub fn evaluate(tokens: &[Token]) -> Tokens {
    let mut out = Vec::with_capacity(tokens.len());
    let mut quote: Option<TokenKind> = None;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if let Some(q) = quote {
            if token.kind == q {
                quote = None;
            }
            out.push(token.clone());
            i += 1;
            continue;
        }
        if token.kind.is_quote() {
            quote = Some(token.kind);
            out.push(token.clone());
            i += 1;
            continue;
        }

        if starts_expression(tokens, i) {
            let mut expr = Expr::new(tokens, i);
            match expr.sum() {
                Ok(n) if expr.ops > 0 => {
                    out.extend(n.to_tokens(token.span));
                    i = expr.pos;
                    continue;
                }
                Ok(_) | Err(Fail::Syntax) => {}
                Err(Fail::Value(e)) => {
                    trace!(expr = %render(&tokens[i..]), error = %e, "left unevaluated");
                }
            }
        }

        // function arguments were already evaluated one by one
        if token.is(TokenKind::LParen) {
            if let Some(close) = matching(tokens, i) {
                out.extend_from_slice(&tokens[i..=close]);
                i = close + 1;
                continue;
            }
        }

        out.push(token.clone());
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::render_compact;

    fn lex(src: &str) -> Tokens {
        Tokenizer::new().tokenize(src, "t.less")
    }

    fn value(src: &str) -> String {
        render_compact(&evaluate(&lex(src)))
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(value("1+1"), "2");
        assert_eq!(value("2px * 2"), "4px");
        assert_eq!(value("6px / 3px"), "2");
        assert_eq!(value("(1 + 2) * 3"), "9");
        assert_eq!(value("10px - 2 * 3px"), "4px");
        assert_eq!(value("-(2px + 1px)"), "-3px");
        assert_eq!(value("10% * 2"), "20%");
        assert_eq!(value("1.5em + .25em"), "1.75em");
    }

    #[test]
    fn mismatched_units_pass_through() {
        assert_eq!(value("1rem + 1px"), "1rem + 1px");
        assert_eq!(value("2px * 3px"), "2px * 3px");
        assert_eq!(value("1s + 2s"), "1s + 2s");
    }

    #[test]
    fn lists_and_ratios_are_left_alone() {
        assert_eq!(value("10px -5px"), "10px -5px");
        assert_eq!(value("12px/1.5 Arial"), "12px/1.5 Arial");
        assert_eq!(value("0 auto"), "0 auto");
        assert_eq!(value("1px solid #333"), "1px solid #333");
        assert_eq!(value("translate(10px, 0)"), "translate(10px, 0)");
        assert_eq!(value("'1 + 1'"), "'1 + 1'");
    }

    #[test]
    fn expressions_inside_lists() {
        assert_eq!(value("2px*2 auto"), "4px auto");
        assert_eq!(value("0 (10px / 2)"), "0 5px");
    }

    #[test]
    fn eval_expr_reports_errors() {
        assert_eq!(eval_expr(&lex("6px / 3px")).unwrap(), Number::unitless(2.0));
        assert_eq!(eval_expr(&lex("12px/4")).unwrap(), Number::new(3.0, "px"));
        assert!(matches!(
            eval_expr(&lex("1rem + 1px")),
            Err(ValueError::IncompatibleUnits { op: '+', .. })
        ));
        assert_eq!(eval_expr(&lex("1 / 0")), Err(ValueError::DivisionByZero));
        assert!(eval_expr(&lex("1 + foo")).is_err());
    }

    #[test]
    fn number_parsing_and_formatting() {
        assert_eq!(parse_number(&lex("-1.5em")), Some(Number::new(-1.5, "em")));
        assert_eq!(parse_number(&lex("20%")), Some(Number::new(20.0, "%")));
        assert_eq!(parse_number(&lex("a")), None);
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(1.0 / 3.0), "0.33333333");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(-0.0), "0");
    }
}
