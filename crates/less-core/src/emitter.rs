//! Print pass: walks the tree, expands mixins, evaluates values and streams
//! CSS through a [`Writer`].
//!
//! Blocks are opened lazily. Every declaration is written with the full
//! path of blocks it belongs in (enclosing at-rules, then the selector
//! list); the writer closes and opens blocks only where that path differs
//! from what is currently open. This is what bubbles `@media` out of rules
//! and keeps empty rules out of the output.

use crate::ast::{Binding, Directive, DirectiveKind, EachBody, NodeId, NodeKind};
use crate::error::{LessError, Result, Span};
use crate::linker::Links;
use crate::math::Number;
use crate::resolver::{Bindings, Env, Evaluator, Scope};
use crate::selector::{combine_selectors, dedupe, split_selector_terms, substitute_all};
use crate::sourcemap::SourceMapBuilder;
use crate::token::render_compact;
use std::rc::Rc;
use tracing::trace;

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: String,
    pub span: Span,
}

/// Single-line CSS output with lazily opened blocks.
#[derive(Debug, Default)]
pub struct Writer {
    out: String,
    /// Output length in UTF-16 code units, the column unit of source maps.
    column: usize,
    open: Vec<String>,
    map: SourceMapBuilder,
}

impl Writer {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
        self.column += text.encode_utf16().count();
    }

    fn separate(&mut self) {
        if !self.out.is_empty() {
            self.push(" ");
        }
    }

    fn mark(&mut self, span: Span) {
        self.map.add(self.column, span);
    }

    fn common_prefix(&self, path: &[Block]) -> usize {
        self.open
            .iter()
            .zip(path)
            .take_while(|(open, block)| **open == block.header)
            .count()
    }

    fn close_one(&mut self) {
        self.separate();
        self.push("}");
        self.open.pop();
    }

    /// Close every open block that is not part of `path`.
    pub fn leave(&mut self, path: &[Block]) {
        let keep = self.common_prefix(path);
        while self.open.len() > keep {
            self.close_one();
        }
    }

    fn enter(&mut self, path: &[Block]) {
        self.leave(path);
        for block in &path[self.open.len()..] {
            self.separate();
            self.mark(block.span);
            self.push(&block.header);
            self.push(" {");
            self.open.push(block.header.clone());
        }
    }

    pub fn declaration(&mut self, path: &[Block], name: &str, value: &str, span: Span) {
        self.enter(path);
        self.separate();
        self.mark(span);
        self.push(name);
        self.push(": ");
        self.push(value);
        self.push(";");
    }

    /// A statement such as `@charset "UTF-8";`.
    pub fn statement(&mut self, path: &[Block], text: &str, span: Span) {
        self.enter(path);
        self.separate();
        self.mark(span);
        self.push(text);
        if !text.ends_with(';') {
            self.push(";");
        }
    }

    /// Text copied as is, such as an `(inline)` import.
    pub fn raw(&mut self, path: &[Block], text: &str, span: Span) {
        if text.is_empty() {
            return;
        }
        self.enter(path);
        self.separate();
        self.mark(span);
        self.push(text);
    }

    pub fn finish(mut self) -> (String, SourceMapBuilder) {
        self.leave(&[]);
        (self.out, self.map)
    }
}

#[derive(Clone, Debug, Default)]
struct Context {
    /// Enclosing at-rules, outermost first.
    at_rules: Vec<Block>,
    selectors: Vec<String>,
    rule_span: Span,
    /// Mixin expansion depth.
    depth: usize,
    /// Printing the body of a mixin, where extends and `(reference)` do not
    /// apply.
    in_instance: bool,
}

impl Context {
    fn path(&self) -> Vec<Block> {
        let mut path = self.at_rules.clone();
        if !self.selectors.is_empty() {
            path.push(Block {
                header: self.selectors.join(","),
                span: self.rule_span,
            });
        }
        path
    }
}

/// Nodes produced by mixin expansion, printed after the caller's own
/// declarations.
type Deferred = Vec<(NodeId, Rc<Env>, Context)>;

pub struct Printer<'s, 'l> {
    eval: Evaluator<'s>,
    links: &'l Links,
    writer: Writer,
    max_depth: usize,
}

/// Print the whole stylesheet. Returns the CSS and the mappings recorded
/// while writing it.
pub fn print(eval: Evaluator<'_>, links: &Links, max_depth: usize) -> Result<(String, SourceMapBuilder)> {
    let sheet = eval.sheet;
    let mut printer = Printer {
        eval,
        links,
        writer: Writer::default(),
        max_depth,
    };
    let env = Env::root(sheet.root);
    printer.print_body(sheet.root, &env, &Context::default())?;
    Ok(printer.writer.finish())
}

impl<'s, 'l> Printer<'s, 'l> {
    fn print_body(&mut self, id: NodeId, env: &Rc<Env>, ctx: &Context) -> Result<()> {
        let sheet = self.eval.sheet;
        let node = sheet.node(id);
        let mut deferred = Deferred::new();
        for directive in &node.directives {
            self.print_directive(directive, env, ctx, &mut deferred)?;
        }
        for (child, child_env, child_ctx) in deferred {
            self.print_node(child, &child_env, &child_ctx)?;
        }
        for &child in &node.children {
            self.print_node(child, env, ctx)?;
        }
        Ok(())
    }

    fn print_node(&mut self, id: NodeId, env: &Rc<Env>, ctx: &Context) -> Result<()> {
        let sheet = self.eval.sheet;
        let node = sheet.node(id);
        if node.reference && !ctx.in_instance {
            return Ok(());
        }
        if !self.eval.eval_guard(&node.guard, env)? {
            trace!(selector = %node.selector_text(), "guard false");
            return Ok(());
        }

        let parent_path = ctx.path();
        match node.kind {
            NodeKind::Rule => {
                let env = env.push_node(id);
                let matcher = self.eval.interpolate(&node.matcher, &env)?;
                let mut selectors = combine_selectors(&ctx.selectors, &split_selector_terms(&matcher));
                if !ctx.in_instance {
                    selectors = self.apply_links(id, selectors);
                }
                let inner = Context {
                    selectors,
                    rule_span: node.span,
                    ..ctx.clone()
                };
                self.print_body(id, &env, &inner)
                    .map_err(|e| e.in_selector(&inner.selectors.join(",")))?;
            }
            NodeKind::Media => {
                let env = env.push_node(id);
                let (name, query) = self.at_rule_prelude(id, &env)?;
                let mut at_rules = ctx.at_rules.clone();
                let prefix = format!("@{} ", name);
                let nested = !query.is_empty()
                    && at_rules.last().is_some_and(|last| last.header.starts_with(&prefix));
                match at_rules.last_mut().filter(|_| nested) {
                    // nested queries of the same kind combine
                    Some(last) => {
                        last.header.push_str(" and ");
                        last.header.push_str(&query);
                    }
                    None => at_rules.push(Block {
                        header: join_header(&name, &query),
                        span: node.span,
                    }),
                }
                let inner = Context {
                    at_rules,
                    ..ctx.clone()
                };
                self.print_body(id, &env, &inner)?;
            }
            NodeKind::Keyframes | NodeKind::AtBlock => {
                let env = env.push_node(id);
                let (name, prelude) = self.at_rule_prelude(id, &env)?;
                let mut at_rules = ctx.at_rules.clone();
                at_rules.push(Block {
                    header: join_header(&name, &prelude),
                    span: node.span,
                });
                let inner = Context {
                    at_rules,
                    selectors: Vec::new(),
                    ..ctx.clone()
                };
                self.print_body(id, &env, &inner)?;
            }
            NodeKind::Root | NodeKind::Mixin | NodeKind::Ruleset => {
                self.print_body(id, env, ctx)?;
            }
        }
        self.writer.leave(&parent_path);
        Ok(())
    }

    /// At-rule keyword and evaluated prelude, such as `("media", "print")`.
    fn at_rule_prelude(&mut self, id: NodeId, env: &Rc<Env>) -> Result<(String, String)> {
        let sheet = self.eval.sheet;
        let matcher = &sheet.node(id).matcher;
        let name = matcher.get(1).map(|t| t.text.clone()).unwrap_or_default();
        let rest = matcher.get(2..).unwrap_or_default();
        let prelude = self.eval.eval_value(rest, env)?;
        Ok((name, render_compact(&prelude)))
    }

    fn apply_links(&self, id: NodeId, mut selectors: Vec<String>) -> Vec<String> {
        let own = selectors.clone();
        if let Some(extra) = self.links.extends.get(&id) {
            selectors.extend(extra.iter().cloned());
        }
        if let Some(replacements) = self.links.replacements.get(&id) {
            for (target, extenders) in replacements {
                selectors.extend(substitute_all(&own, target, extenders));
            }
        }
        dedupe(selectors)
    }

    fn print_directive(
        &mut self,
        directive: &Directive,
        env: &Rc<Env>,
        ctx: &Context,
        deferred: &mut Deferred,
    ) -> Result<()> {
        match &directive.kind {
            DirectiveKind::Declaration => {
                let name = render_compact(&self.eval.interpolate(&directive.name, env)?);
                let value = render_compact(&self.eval.eval_value(&directive.value, env)?);
                let path = ctx.path();
                if path.is_empty() {
                    return Err(self.eval.eval_error(
                        directive.span,
                        format!("declaration `{}` outside of a rule", name),
                    ));
                }
                self.writer.declaration(&path, &name, &value, directive.span);
            }
            DirectiveKind::MixinCall => {
                let instances = self.eval.resolve_mixin(&directive.value, env, directive.span)?;
                for instance in instances {
                    self.expand(instance.node, &instance.env, ctx, directive.span, deferred)?;
                }
            }
            DirectiveKind::Each { body } => {
                let body_id = match body {
                    EachBody::Inline(id) => *id,
                    EachBody::Variable(tokens) => {
                        let name = tokens.get(1).map(|t| t.text.clone()).unwrap_or_default();
                        self.eval
                            .ruleset(&name, env)
                            .map(|(_, id)| id)
                            .ok_or_else(|| {
                                self.eval.eval_error(
                                    directive.span,
                                    format!("each(): `@{}` is not a detached ruleset", name),
                                )
                            })?
                    }
                };
                let items = self.eval.each_items(&directive.value, env)?;
                for (index, item) in items.into_iter().enumerate() {
                    let position = Number::unitless((index + 1) as f64).to_tokens(directive.span);
                    let mut bindings = Bindings::new();
                    bindings.insert("value".to_string(), Binding::Value(item));
                    bindings.insert("key".to_string(), Binding::Value(position.clone()));
                    bindings.insert("index".to_string(), Binding::Value(position));
                    let item_env = env.push(Scope::Params(Rc::new(bindings))).push_node(body_id);
                    self.expand(body_id, &item_env, ctx, directive.span, deferred)?;
                }
            }
            DirectiveKind::Extend { .. } => {}
            DirectiveKind::Statement => {
                let text = render_compact(&directive.value);
                self.writer.statement(&ctx.at_rules, &text, directive.span);
            }
            DirectiveKind::Inline => {
                let text = render_compact(&directive.value);
                self.writer.raw(&ctx.path(), &text, directive.span);
            }
        }
        Ok(())
    }

    /// Print a mixin body, detached ruleset or `each()` body in place.
    fn expand(
        &mut self,
        def: NodeId,
        env: &Rc<Env>,
        ctx: &Context,
        span: Span,
        deferred: &mut Deferred,
    ) -> Result<()> {
        if ctx.depth + 1 > self.max_depth {
            return Err(LessError::RecursionLimit {
                location: self.eval.sheet.locate(span),
                limit: self.max_depth,
            });
        }
        trace!(node = def.0, depth = ctx.depth + 1, "expand");
        let inner = Context {
            depth: ctx.depth + 1,
            in_instance: true,
            ..ctx.clone()
        };
        let sheet = self.eval.sheet;
        let node = sheet.node(def);
        for directive in &node.directives {
            self.print_directive(directive, env, &inner, deferred)?;
        }
        for &child in &node.children {
            deferred.push((child, Rc::clone(env), inner.clone()));
        }
        Ok(())
    }
}

fn join_header(name: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        format!("@{}", name)
    } else {
        format!("@{} {}", name, prelude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(header: &str) -> Block {
        Block {
            header: header.to_string(),
            span: Span::dummy(),
        }
    }

    #[test]
    fn writer_opens_blocks_lazily() {
        let mut writer = Writer::default();
        let a = [block(".a")];
        writer.declaration(&a, "color", "red", Span::dummy());
        writer.declaration(&a, "margin", "0", Span::dummy());
        writer.declaration(&[block("@media print"), block(".a")], "color", "blue", Span::dummy());
        writer.leave(&a);
        writer.declaration(&[block(".b")], "x", "y", Span::dummy());
        let (css, _) = writer.finish();
        assert_eq!(
            css,
            ".a { color: red; margin: 0; } @media print { .a { color: blue; } } .b { x: y; }"
        );
    }

    #[test]
    fn statements_and_raw_text() {
        let mut writer = Writer::default();
        writer.statement(&[], "@charset \"UTF-8\"", Span::dummy());
        writer.raw(&[], ".x { a: b; }", Span::dummy());
        writer.declaration(&[block(".y")], "c", "d", Span::dummy());
        let (css, _) = writer.finish();
        assert_eq!(css, "@charset \"UTF-8\"; .x { a: b; } .y { c: d; }");
    }

    #[test]
    fn mapped_columns_count_utf16_units() {
        let span = Span {
            line: 1,
            column: 1,
            ..Span::dummy()
        };
        let mut writer = Writer::default();
        writer.declaration(&[block(".é")], "content", "'😀'", span);
        writer.declaration(&[block(".é")], "color", "red", span);
        let (css, map) = writer.finish();
        assert_eq!(css, ".é { content: '😀'; color: red; }");
        let columns: Vec<usize> = map.mappings().iter().map(|m| m.generated_column).collect();
        // the emoji is two UTF-16 units but four bytes
        assert_eq!(columns, vec![5, 20]);
    }

    #[test]
    fn empty_output() {
        let (css, map) = Writer::default().finish();
        assert!(css.is_empty());
        assert!(map.mappings().is_empty());
    }
}
