//! Variable resolution, value evaluation and guards.
//!
//! Lookups walk an [`Env`]: a chain of scopes, innermost first. A scope is
//! either a tree node (whose `vars` were collected by the parser) or the
//! parameter bindings of one mixin invocation. Variables of nodes outside
//! any mixin always evaluate to the same value, so they are cached per
//! `(node, name)`.

use crate::ast::{Binding, NodeId, Stylesheet};
use crate::error::{LessError, Result, Span, ValueError};
use crate::functions;
use crate::math::parse_number;
use crate::token::{matching, render_compact, split_top_level, trim, unquote, Token, TokenKind, Tokens};
use crate::tokenizer::Tokenizer;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

pub type Bindings = IndexMap<String, Binding>;

#[derive(Debug, Clone)]
pub enum Scope {
    Node(NodeId),
    Params(Rc<Bindings>),
}

/// A scope chain. Cloning an `Rc<Env>` shares the tail.
#[derive(Debug)]
pub struct Env {
    pub scope: Scope,
    pub parent: Option<Rc<Env>>,
}

impl Env {
    pub fn root(root: NodeId) -> Rc<Env> {
        Rc::new(Env {
            scope: Scope::Node(root),
            parent: None,
        })
    }

    pub fn push(self: &Rc<Self>, scope: Scope) -> Rc<Env> {
        Rc::new(Env {
            scope,
            parent: Some(Rc::clone(self)),
        })
    }

    pub fn push_node(self: &Rc<Self>, id: NodeId) -> Rc<Env> {
        self.push(Scope::Node(id))
    }

    /// This env and its ancestors, innermost first.
    pub fn chain(self: &Rc<Self>) -> impl Iterator<Item = Rc<Env>> {
        std::iter::successors(Some(Rc::clone(self)), |e| e.parent.clone())
    }
}

pub struct Evaluator<'s> {
    pub sheet: &'s Stylesheet,
    cache: HashMap<(NodeId, String), Tokens>,
    resolving: Vec<(NodeId, String)>,
}

fn literal(name: &str, span: Span) -> Tokens {
    vec![
        Token::new(TokenKind::At, "@", span),
        Token::new(TokenKind::Ident, name, span),
    ]
}

impl<'s> Evaluator<'s> {
    pub fn new(sheet: &'s Stylesheet) -> Self {
        Self {
            sheet,
            cache: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    pub fn eval_error(&self, span: Span, message: impl Into<String>) -> LessError {
        LessError::Eval {
            location: self.sheet.locate(span),
            selector: None,
            message: message.into(),
        }
    }

    fn value_error(&self, span: Span, e: ValueError) -> LessError {
        self.eval_error(span, e.to_string())
    }

    /// Find the binding of `@name`, returning the env suffix it was found in.
    pub fn lookup(&self, name: &str, env: &Rc<Env>) -> Option<(Rc<Env>, Binding)> {
        let sheet = self.sheet;
        env.chain().find_map(|e| {
            let binding = match &e.scope {
                Scope::Params(bindings) => bindings.get(name).cloned(),
                Scope::Node(id) => sheet.node(*id).vars.get(name).cloned(),
            };
            binding.map(|b| (e, b))
        })
    }

    /// The detached ruleset bound to `@name`, if any.
    pub fn ruleset(&self, name: &str, env: &Rc<Env>) -> Option<(Rc<Env>, NodeId)> {
        match self.lookup(name, env)? {
            (found, Binding::Ruleset(id)) => Some((found, id)),
            _ => None,
        }
    }

    /// Resolve `@name` to its evaluated value. Unknown variables, and a
    /// variable referenced from its own definition, stay as literal `@name`.
    pub fn resolve_var(&mut self, name: &str, env: &Rc<Env>, span: Span) -> Result<Tokens> {
        let Some((found, binding)) = self.lookup(name, env) else {
            trace!(name, "undefined variable left as is");
            return Ok(literal(name, span));
        };
        let Binding::Value(raw) = binding else {
            return Ok(literal(name, span));
        };
        let id = match found.scope {
            Scope::Params(_) => return Ok(raw),
            Scope::Node(id) => id,
        };

        let key = (id, name.to_string());
        if let Some(value) = self.cache.get(&key) {
            return Ok(value.clone());
        }
        if self.resolving.contains(&key) {
            debug!(name, "self-referencing variable");
            return Ok(literal(name, span));
        }

        self.resolving.push(key.clone());
        let result = self.eval_value(&raw, &found);
        self.resolving.pop();
        let value = result?;
        if !self.sheet.node(id).in_mixin {
            self.cache.insert(key, value.clone());
        }
        Ok(value)
    }

    /// `@c-1` scans as a single name. When that name is unbound but a
    /// prefix ending before `-<digit>` is, split it into `@c` and `1`.
    fn split_subtraction<'n>(&self, name: &'n str, env: &Rc<Env>) -> Option<(&'n str, &'n str)> {
        name.char_indices()
            .rev()
            .filter(|&(i, c)| c == '-' && i > 0 && name[i + 1..].starts_with(|d: char| d.is_ascii_digit()))
            .map(|(i, _)| (&name[..i], &name[i + 1..]))
            .find(|(prefix, _)| self.lookup(prefix, env).is_some())
    }

    /// Replace `@{name}` interpolations only. Used for selectors and
    /// property names, where a bare `@` means something else.
    pub fn interpolate(&mut self, tokens: &[Token], env: &Rc<Env>) -> Result<Tokens> {
        self.substitute_with(tokens, env, false)
    }

    /// Replace `@name`, `@@name` and `@{name}` references.
    pub fn substitute(&mut self, tokens: &[Token], env: &Rc<Env>) -> Result<Tokens> {
        self.substitute_with(tokens, env, true)
    }

    fn substitute_with(&mut self, tokens: &[Token], env: &Rc<Env>, vars: bool) -> Result<Tokens> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut quote: Option<TokenKind> = None;
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            match quote {
                Some(q) if token.kind == q => quote = None,
                None if token.kind.is_quote() => quote = Some(token.kind),
                _ => {}
            }
            if !token.is(TokenKind::At) {
                out.push(token.clone());
                i += 1;
                continue;
            }

            let next = tokens.get(i + 1);
            if next.is_some_and(|t| t.is(TokenKind::LBrace)) {
                if let Some(close) = matching(tokens, i + 1) {
                    let name = render_compact(&tokens[i + 2..close]);
                    let value = self.resolve_var(&name, env, token.span)?;
                    let text = render_compact(&value);
                    out.extend(Tokenizer::fragment(unquote(&text), token.span));
                    i = close + 1;
                    continue;
                }
            }

            if vars && quote.is_none() {
                if let Some(next) = next {
                    if next.is(TokenKind::Ident) {
                        if self.lookup(&next.text, env).is_none() {
                            if let Some((name, rest)) = self.split_subtraction(&next.text, env) {
                                out.extend(self.resolve_var(name, env, token.span)?);
                                out.extend(Tokenizer::fragment(&format!(" - {}", rest), next.span));
                                i += 2;
                                continue;
                            }
                        }
                        out.extend(self.resolve_var(&next.text, env, token.span)?);
                        i += 2;
                        continue;
                    }
                    let indirect = tokens.get(i + 2);
                    if next.is(TokenKind::At) && indirect.is_some_and(|t| t.is(TokenKind::Ident)) {
                        let inner = self.resolve_var(&tokens[i + 2].text, env, token.span)?;
                        let name = render_compact(&inner);
                        out.extend(self.resolve_var(unquote(&name), env, token.span)?);
                        i += 3;
                        continue;
                    }
                }
            }

            out.push(token.clone());
            i += 1;
        }
        Ok(out)
    }

    /// Full value evaluation: substitution, functions, arithmetic.
    pub fn eval_value(&mut self, tokens: &[Token], env: &Rc<Env>) -> Result<Tokens> {
        let substituted = self.substitute(tokens, env)?;
        let span = tokens.first().map_or_else(Span::dummy, |t| t.span);
        functions::evaluate(&substituted).map_err(|e| self.value_error(span, e))
    }

    /// Evaluate a `when` guard. An empty guard is true.
    pub fn eval_guard(&mut self, guard: &[Token], env: &Rc<Env>) -> Result<bool> {
        let guard = trim(guard);
        if guard.is_empty() {
            return Ok(true);
        }
        let span = guard[0].span;
        let mut result = true;
        for clause in split_conjunction(guard) {
            if !self.eval_condition(clause, env, span)? {
                result = false;
                break;
            }
        }
        debug!(guard = %render_compact(guard), result, "guard");
        Ok(result)
    }

    fn eval_condition(&mut self, clause: &[Token], env: &Rc<Env>, span: Span) -> Result<bool> {
        let mut clause = trim(clause);
        let negate = clause.first().is_some_and(|t| t.is_ident("not"));
        if negate {
            clause = trim(&clause[1..]);
        }
        let wrapped = clause.first().is_some_and(|t| t.is(TokenKind::LParen))
            && matching(clause, 0) == Some(clause.len() - 1);
        if !wrapped {
            return Err(self.eval_error(
                span,
                format!("invalid guard condition `{}`", render_compact(clause)),
            ));
        }
        let inner = &clause[1..clause.len() - 1];

        let value = match find_comparison(inner) {
            Some((start, end, op)) => {
                let lhs = self.eval_value(&inner[..start], env)?;
                let rhs = self.eval_value(&inner[end..], env)?;
                compare(&lhs, op, &rhs)
            }
            None => render_compact(&self.eval_value(inner, env)?) == "true",
        };
        Ok(value != negate)
    }
}

/// Split a guard at top-level `and` keywords.
fn split_conjunction(guard: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in guard.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Ident if depth == 0 && token.text == "and" => {
                parts.push(&guard[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&guard[start..]);
    parts
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Comparison {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Locate a top-level comparison operator: `=`, `<`, `>`, `<=`, `>=`, `=<`.
fn find_comparison(tokens: &[Token]) -> Option<(usize, usize, Comparison)> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Lt | TokenKind::Gt | TokenKind::Eq if depth == 0 => {
                let followed_by_eq = tokens.get(i + 1).is_some_and(|t| t.is(TokenKind::Eq));
                let followed_by_lt = tokens.get(i + 1).is_some_and(|t| t.is(TokenKind::Lt));
                return Some(match token.kind {
                    TokenKind::Lt if followed_by_eq => (i, i + 2, Comparison::Le),
                    TokenKind::Gt if followed_by_eq => (i, i + 2, Comparison::Ge),
                    TokenKind::Eq if followed_by_lt => (i, i + 2, Comparison::Le),
                    TokenKind::Lt => (i, i + 1, Comparison::Lt),
                    TokenKind::Gt => (i, i + 1, Comparison::Gt),
                    _ => (i, i + 1, Comparison::Eq),
                });
            }
            _ => {}
        }
    }
    None
}

fn compare(lhs: &[Token], op: Comparison, rhs: &[Token]) -> bool {
    if let (Some(a), Some(b)) = (parse_number(lhs), parse_number(rhs)) {
        if a.unit == b.unit || a.unit.is_empty() || b.unit.is_empty() {
            return match op {
                Comparison::Eq => a.value == b.value,
                Comparison::Lt => a.value < b.value,
                Comparison::Gt => a.value > b.value,
                Comparison::Le => a.value <= b.value,
                Comparison::Ge => a.value >= b.value,
            };
        }
        return false;
    }
    let (a, b) = (render_compact(lhs), render_compact(rhs));
    op == Comparison::Eq && unquote(&a) == unquote(&b)
}

/// Split a list value into items: at top-level commas when there are any,
/// otherwise at whitespace.
pub fn list_items(tokens: &[Token]) -> Vec<Tokens> {
    let tokens = trim(tokens);
    if tokens.is_empty() {
        return Vec::new();
    }
    let parts = split_top_level(tokens, TokenKind::Comma);
    if parts.len() > 1 {
        return parts.into_iter().map(|p| trim(p).to_vec()).collect();
    }
    split_top_level(tokens, TokenKind::Space)
        .into_iter()
        .flat_map(|p| split_top_level(p, TokenKind::Newline))
        .map(|p| trim(p).to_vec())
        .filter(|p| !p.is_empty())
        .collect()
}
