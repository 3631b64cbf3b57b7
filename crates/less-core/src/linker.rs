//! Link pass: one pre-order walk over the static tree that resolves
//! `:extend()` targets. Results go into a side table so the tree stays
//! read-only; the printer merges them when it prints each target.

use crate::ast::{Directive, DirectiveKind, NodeId, NodeKind};
use crate::error::{LessError, Result};
use crate::resolver::{Env, Evaluator};
use crate::selector::{combine_selectors, split_selector_terms};
use crate::token::{render_compact, split_top_level, TokenKind};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Links {
    /// Selectors to add to a target rule's own selector list.
    pub extends: HashMap<NodeId, Vec<String>>,
    /// `all` extends: the matched text and the selectors replacing it in
    /// each of the target's selectors.
    pub replacements: HashMap<NodeId, Vec<(String, Vec<String>)>>,
}

pub fn link(eval: &mut Evaluator<'_>) -> Result<Links> {
    let root = eval.sheet.root;
    let mut linker = Linker {
        eval,
        links: Links::default(),
    };
    let env = Env::root(root);
    let mut stack = vec![root];
    linker.walk(root, &env, &[], &mut stack)?;
    Ok(linker.links)
}

struct Linker<'e, 's> {
    eval: &'e mut Evaluator<'s>,
    links: Links,
}

impl<'e, 's> Linker<'e, 's> {
    fn walk(&mut self, id: NodeId, env: &Rc<Env>, parents: &[String], stack: &mut Vec<NodeId>) -> Result<()> {
        let sheet = self.eval.sheet;
        for &child in &sheet.node(id).children {
            let node = sheet.node(child);
            if !self.eval.eval_guard(&node.guard, env)? {
                debug!(selector = %node.selector_text(), "guard false, skipping subtree");
                continue;
            }
            let selectors = match node.kind {
                NodeKind::Rule => {
                    let matcher = self.eval.interpolate(&node.matcher, env)?;
                    combine_selectors(parents, &split_selector_terms(&matcher))
                }
                NodeKind::Media | NodeKind::AtBlock => parents.to_vec(),
                _ => continue,
            };
            let child_env = env.push_node(child);
            for directive in &node.directives {
                if let DirectiveKind::Extend { all } = directive.kind {
                    self.extend(child, directive, all, &selectors, stack)?;
                }
            }
            stack.push(child);
            self.walk(child, &child_env, &selectors, stack)?;
            stack.pop();
        }
        Ok(())
    }

    fn extend(
        &mut self,
        extender: NodeId,
        directive: &Directive,
        all: bool,
        selectors: &[String],
        stack: &[NodeId],
    ) -> Result<()> {
        let sheet = self.eval.sheet;
        let target = render_compact(&directive.value);
        let mut found = Vec::new();
        for &scope in stack.iter().rev() {
            for &child in &sheet.node(scope).children {
                self.collect_targets(child, &target, all, &mut found);
            }
            if !found.is_empty() {
                break;
            }
        }
        if found.is_empty() {
            return Err(LessError::Link {
                location: sheet.locate(directive.span),
                message: format!("extend target `{}` not found", target),
            });
        }

        let nested = sheet.node(extender).depth > 1;
        for target_id in found {
            if target_id == extender {
                continue;
            }
            if nested && sheet.node(target_id).depth == 1 {
                return Err(LessError::Link {
                    location: sheet.locate(directive.span),
                    message: format!("cannot extend top-level `{}` from a nested rule", target),
                });
            }
            debug!(target = %target, all, "extend");
            if all {
                self.links
                    .replacements
                    .entry(target_id)
                    .or_default()
                    .push((target.clone(), selectors.to_vec()));
            } else {
                self.links
                    .extends
                    .entry(target_id)
                    .or_default()
                    .extend(selectors.iter().cloned());
            }
        }
        Ok(())
    }

    fn collect_targets(&self, id: NodeId, target: &str, all: bool, found: &mut Vec<NodeId>) {
        let node = self.eval.sheet.node(id);
        match node.kind {
            NodeKind::Rule => {
                let hit = split_top_level(&node.matcher, TokenKind::Comma)
                    .into_iter()
                    .map(render_compact)
                    .any(|part| if all { part.contains(target) } else { part == target });
                if hit {
                    found.push(id);
                }
            }
            NodeKind::Media => {}
            _ => return,
        }
        for &child in &node.children {
            self.collect_targets(child, target, all, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::io;
    use std::path::Path;

    fn link_source(src: &'static str) -> Result<(crate::ast::Stylesheet, Links)> {
        let reader = move |_: &Path| -> io::Result<Vec<u8>> { Ok(src.as_bytes().to_vec()) };
        let sheet = parse(&reader, Path::new("main.less"))?;
        let links = {
            let mut eval = Evaluator::new(&sheet);
            link(&mut eval)?
        };
        Ok((sheet, links))
    }

    fn rule(sheet: &crate::ast::Stylesheet, selector: &str) -> NodeId {
        (0..sheet.nodes.len())
            .map(NodeId)
            .find(|id| sheet.node(*id).kind == NodeKind::Rule && sheet.node(*id).selector_text() == selector)
            .unwrap()
    }

    #[test]
    fn extend_appends_extender_selectors() {
        let (sheet, links) = link_source(".foo { color: blue; } .bar { &:extend(.foo); }").unwrap();
        assert_eq!(links.extends[&rule(&sheet, ".foo")], vec![".bar".to_string()]);
    }

    #[test]
    fn selector_level_extend() {
        let (sheet, links) = link_source(".a { x: 1; } .b:extend(.a all) { y: 2; }").unwrap();
        let replacements = &links.replacements[&rule(&sheet, ".a")];
        assert_eq!(replacements[0].0, ".a");
        assert_eq!(replacements[0].1, vec![".b".to_string()]);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let err = link_source(".bar { &:extend(.nope); }").unwrap_err();
        assert!(matches!(err, LessError::Link { .. }));
        assert!(err.to_string().contains("`.nope` not found"));
    }

    #[test]
    fn nested_extend_of_top_level_rule_is_an_error() {
        let err = link_source(".c { a: b; } .a { .b { &:extend(.c); } }").unwrap_err();
        assert!(err.to_string().contains("nested rule"));
    }

    #[test]
    fn guarded_out_rules_do_not_extend() {
        let (_, links) = link_source("@on: false; .foo { a: b; } .bar when (@on) { &:extend(.foo); }").unwrap();
        assert!(links.extends.is_empty());
    }
}
