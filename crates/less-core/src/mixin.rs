//! Mixin calls: parsing call sites and parameter lists, binding arguments,
//! and finding the definitions a call expands to.

use crate::ast::{Binding, NodeId, NodeKind};
use crate::error::{Result, Span};
use crate::resolver::{Bindings, Env, Evaluator, Scope};
use crate::token::{matching, render_compact, skip_space, split_arguments, split_top_level, trim, Token, TokenKind, Tokens};
use std::rc::Rc;
use tracing::debug;

/// One parameter of a mixin definition.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    /// `@name` or `@name: default`
    Variable { name: String, default: Option<Tokens> },
    /// A literal value the argument must equal, as in `.m(dark; @c)`.
    Literal(Tokens),
    /// `...` or `@rest...`
    Rest(Option<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Tokens,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// Normalized name: `#ns > .m` becomes `#ns.m`.
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Bound {
    Given(Tokens),
    /// Evaluated later, in the scope of the invocation.
    Default(Tokens),
}

/// A definition selected for expansion, with the scope its body runs in.
#[derive(Debug, Clone)]
pub struct Instance {
    pub node: NodeId,
    pub env: Rc<Env>,
}

/// Name key of a selector or call: whitespace and `>` are dropped.
pub fn mixin_key(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| !t.is_space() && !t.is(TokenKind::Gt))
        .map(|t| t.text.as_str())
        .collect()
}

/// `@name` followed by `:`; returns the name and the index after the colon.
fn named_prefix(tokens: &[Token]) -> Option<(String, usize)> {
    if tokens.first()?.kind != TokenKind::At {
        return None;
    }
    let ident = tokens.get(1).filter(|t| t.is(TokenKind::Ident))?;
    let colon = skip_space(tokens, 2);
    tokens
        .get(colon)
        .filter(|t| t.is(TokenKind::Colon))
        .map(|_| (ident.text.clone(), colon + 1))
}

pub fn parse_call(tokens: &[Token]) -> Option<Call> {
    let mut tokens = trim(tokens);
    if let Some(bang) = tokens.iter().position(|t| t.is(TokenKind::Bang)) {
        tokens = trim(&tokens[..bang]);
    }
    let (name_tokens, inner) = match tokens.iter().position(|t| t.is(TokenKind::LParen)) {
        Some(open) => {
            let close = matching(tokens, open)?;
            if close != tokens.len() - 1 {
                return None;
            }
            (&tokens[..open], &tokens[open + 1..close])
        }
        None => (tokens, &tokens[tokens.len()..]),
    };
    let name = mixin_key(name_tokens);
    if name.is_empty() {
        return None;
    }
    let args = split_arguments(inner)
        .into_iter()
        .map(|arg| {
            let arg = trim(arg);
            match named_prefix(arg) {
                Some((name, start)) => Arg {
                    name: Some(name),
                    value: trim(&arg[start..]).to_vec(),
                },
                None => Arg {
                    name: None,
                    value: arg.to_vec(),
                },
            }
        })
        .collect();
    Some(Call { name, args })
}

pub fn parse_params(matcher: &[Token]) -> Vec<Param> {
    split_arguments(matcher)
        .into_iter()
        .map(|param| {
            let param = trim(param);
            let dots = param
                .iter()
                .rev()
                .take_while(|t| t.is(TokenKind::Dot))
                .count();
            if dots == 3 {
                let name = match param {
                    [at, ident, ..] if at.is(TokenKind::At) && ident.is(TokenKind::Ident) => {
                        Some(ident.text.clone())
                    }
                    _ => None,
                };
                return Param::Rest(name);
            }
            if let Some((name, start)) = named_prefix(param) {
                return Param::Variable {
                    name,
                    default: Some(trim(&param[start..]).to_vec()),
                };
            }
            match param {
                [at, ident] if at.is(TokenKind::At) && ident.is(TokenKind::Ident) => {
                    Param::Variable {
                        name: ident.text.clone(),
                        default: None,
                    }
                }
                _ => Param::Literal(param.to_vec()),
            }
        })
        .collect()
}

fn join(values: &[&Tokens]) -> Tokens {
    let mut out = Vec::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            let span = value.first().map_or_else(Span::dummy, |t| t.span);
            out.push(Token::new(TokenKind::Space, " ", span));
        }
        out.extend(value.iter().cloned());
    }
    out
}

/// Match arguments against a parameter list. `None` means the definition
/// does not accept this call.
pub fn bind(params: &[Param], args: &[Arg]) -> Option<Vec<(String, Bound)>> {
    let positional: Vec<&Tokens> = args
        .iter()
        .filter(|a| a.name.is_none())
        .map(|a| &a.value)
        .collect();
    let mut bound = Vec::new();
    let mut used_named = 0;
    let mut pos = 0;
    let mut variadic = false;

    for param in params {
        match param {
            Param::Variable { name, default } => {
                let named = args
                    .iter()
                    .find(|a| a.name.as_deref() == Some(name.as_str()));
                if let Some(arg) = named {
                    used_named += 1;
                    bound.push((name.clone(), Bound::Given(arg.value.clone())));
                } else if pos < positional.len() {
                    bound.push((name.clone(), Bound::Given(positional[pos].clone())));
                    pos += 1;
                } else if let Some(default) = default {
                    bound.push((name.clone(), Bound::Default(default.clone())));
                } else {
                    return None;
                }
            }
            Param::Literal(expected) => {
                let arg = positional.get(pos)?;
                if render_compact(arg) != render_compact(expected) {
                    return None;
                }
                pos += 1;
            }
            Param::Rest(name) => {
                variadic = true;
                if let Some(name) = name {
                    let rest = positional.get(pos..).unwrap_or_default();
                    bound.push((name.clone(), Bound::Given(join(rest))));
                }
                pos = positional.len();
            }
        }
    }

    let named_total = args.iter().filter(|a| a.name.is_some()).count();
    if used_named != named_total || (pos < positional.len() && !variadic) {
        return None;
    }
    Some(bound)
}

impl<'s> Evaluator<'s> {
    /// The scope a definition's body runs in: the caller's scope, then the
    /// definition's lexical ancestors, then its own variables.
    fn lexical_env(&self, def: NodeId, caller: &Rc<Env>) -> Rc<Env> {
        let sheet = self.sheet;
        let mut ancestors: Vec<NodeId> = sheet.ancestors(def).filter(|a| *a != sheet.root).collect();
        ancestors.reverse();
        ancestors
            .into_iter()
            .fold(Rc::clone(caller), |env, id| env.push_node(id))
    }

    fn instantiate(&mut self, def: NodeId, bound: Vec<(String, Bound)>, caller: &Rc<Env>) -> Result<Rc<Env>> {
        let base = self.lexical_env(def, caller);
        let mut bindings = Bindings::new();
        for (name, value) in bound {
            let value = match value {
                Bound::Given(tokens) => tokens,
                Bound::Default(tokens) => {
                    let env = base.push(Scope::Params(Rc::new(bindings.clone())));
                    self.eval_value(&tokens, &env)?
                }
            };
            bindings.insert(name, Binding::Value(value));
        }
        let values: Vec<Tokens> = bindings
            .values()
            .filter_map(|b| match b {
                Binding::Value(v) => Some(v.clone()),
                Binding::Ruleset(_) => None,
            })
            .collect();
        let refs: Vec<&Tokens> = values.iter().collect();
        bindings.insert("arguments".to_string(), Binding::Value(join(&refs)));
        Ok(base
            .push(Scope::Params(Rc::new(bindings)))
            .push_node(def))
    }

    /// Find a plain rule usable as a mixin, such as `.a` for `.a;` or
    /// `#ns .m` for `#ns.m;`.
    fn find_rule(&self, key: &str, env: &Rc<Env>) -> Option<NodeId> {
        env.chain().find_map(|e| match e.scope {
            Scope::Node(owner) => self
                .sheet
                .node(owner)
                .children
                .iter()
                .find_map(|child| self.match_rule(*child, "", key)),
            Scope::Params(_) => None,
        })
    }

    fn match_rule(&self, id: NodeId, prefix: &str, key: &str) -> Option<NodeId> {
        let node = self.sheet.node(id);
        if node.kind != NodeKind::Rule {
            return None;
        }
        for part in split_top_level(&node.matcher, TokenKind::Comma) {
            let text = format!("{}{}", prefix, mixin_key(part));
            if text == key {
                return Some(id);
            }
            if key.starts_with(&text) {
                if let Some(found) = node
                    .children
                    .iter()
                    .find_map(|child| self.match_rule(*child, &text, key))
                {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Resolve a mixin or detached-ruleset call to the definitions it
    /// expands to. Definitions whose guard fails are dropped silently; a
    /// call nothing accepts is an error.
    pub fn resolve_mixin(&mut self, tokens: &[Token], env: &Rc<Env>, span: Span) -> Result<Vec<Instance>> {
        let call = parse_call(tokens)
            .ok_or_else(|| self.eval_error(span, format!("malformed mixin call `{}`", render_compact(tokens))))?;

        if let Some(name) = call.name.strip_prefix('@') {
            let name = name.to_string();
            return match self.ruleset(&name, env) {
                Some((_, id)) => Ok(vec![Instance {
                    node: id,
                    env: env.push_node(id),
                }]),
                None => Err(self.eval_error(span, format!("unknown detached ruleset `@{}`", name))),
            };
        }

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(Arg {
                name: arg.name.clone(),
                value: self.eval_value(&arg.value, env)?,
            });
        }

        let sheet = self.sheet;
        let mut defined = false;
        let mut matched = false;
        let mut instances = Vec::new();
        for scope in env.chain() {
            let Scope::Node(owner) = scope.scope else {
                continue;
            };
            let Some(defs) = sheet.node(owner).mixins.get(&call.name) else {
                continue;
            };
            defined = true;
            for &def in defs {
                let params = parse_params(&sheet.node(def).matcher);
                let Some(bound) = bind(&params, &args) else {
                    continue;
                };
                matched = true;
                let instance_env = self.instantiate(def, bound, env)?;
                if self.eval_guard(&sheet.node(def).guard, &instance_env)? {
                    instances.push(Instance {
                        node: def,
                        env: instance_env,
                    });
                }
            }
            if matched {
                break;
            }
        }

        if !matched {
            if call.args.is_empty() {
                if let Some(rule) = self.find_rule(&call.name, env) {
                    debug!(name = %call.name, "rule used as mixin");
                    let base = self.lexical_env(rule, env);
                    return Ok(vec![Instance {
                        node: rule,
                        env: base.push_node(rule),
                    }]);
                }
            }
            let message = if defined {
                format!("no definition of `{}` matches the arguments", call.name)
            } else {
                format!("unknown mixin `{}`", call.name)
            };
            return Err(self.eval_error(span, message));
        }

        debug!(name = %call.name, count = instances.len(), "mixin resolved");
        Ok(instances)
    }

    /// Items of an `each()` list.
    pub fn each_items(&mut self, list: &[Token], env: &Rc<Env>) -> Result<Vec<Tokens>> {
        let value = self.eval_value(list, env)?;
        Ok(crate::resolver::list_items(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn lex(src: &str) -> Tokens {
        Tokenizer::new().tokenize(src, "t.less")
    }

    fn text(bound: &Bound) -> String {
        match bound {
            Bound::Given(t) | Bound::Default(t) => render_compact(t),
        }
    }

    #[test]
    fn call_names_are_normalized() {
        let call = parse_call(&lex("#ns > .m(1px; @b: red) !important")).unwrap();
        assert_eq!(call.name, "#ns.m");
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.args[1].name.as_deref(), Some("b"));
        assert_eq!(render_compact(&call.args[1].value), "red");

        let call = parse_call(&lex(".a")).unwrap();
        assert_eq!(call.name, ".a");
        assert!(call.args.is_empty());
        assert!(parse_call(&lex(".m(1) x")).is_none());
    }

    #[test]
    fn params() {
        let params = parse_params(&lex("@a; @b: 2px; dark; @rest..."));
        assert_eq!(params.len(), 4);
        assert!(matches!(&params[0], Param::Variable { name, default: None } if name == "a"));
        assert!(matches!(&params[1], Param::Variable { default: Some(_), .. }));
        assert!(matches!(&params[2], Param::Literal(_)));
        assert_eq!(params[3], Param::Rest(Some("rest".into())));
        assert_eq!(parse_params(&lex("...")), vec![Param::Rest(None)]);
    }

    #[test]
    fn binding_positional_named_and_defaults() {
        let params = parse_params(&lex("@a, @b: 2, @c: 3"));
        let call = parse_call(&lex(".m(1, @c: 9)")).unwrap();
        let bound = bind(&params, &call.args).unwrap();
        let got: Vec<(String, String)> = bound.iter().map(|(n, b)| (n.clone(), text(b))).collect();
        assert_eq!(
            got,
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("c".into(), "9".into())
            ]
        );
        assert!(matches!(bound[1].1, Bound::Default(_)));
    }

    #[test]
    fn binding_rejects_mismatches() {
        let params = parse_params(&lex("dark; @c"));
        assert!(bind(&params, &parse_call(&lex(".m(dark; red)")).unwrap().args).is_some());
        assert!(bind(&params, &parse_call(&lex(".m(light; red)")).unwrap().args).is_none());

        let params = parse_params(&lex("@a"));
        assert!(bind(&params, &parse_call(&lex(".m(1, 2)")).unwrap().args).is_none());
        assert!(bind(&params, &parse_call(&lex(".m()")).unwrap().args).is_none());
        assert!(bind(&params, &parse_call(&lex(".m(@z: 1)")).unwrap().args).is_none());
    }

    #[test]
    fn variadic_collects_the_rest() {
        let params = parse_params(&lex("@a; @rest..."));
        let bound = bind(&params, &parse_call(&lex(".m(1; 2; 3)")).unwrap().args).unwrap();
        assert_eq!(text(&bound[1].1), "2 3");
    }
}
