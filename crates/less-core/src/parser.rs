//! Recursive-descent parser building the [`Stylesheet`] arena.
//!
//! `consume` walks one file's tokens statement by statement. A statement
//! ends at the first top-level `;`, `{` or `}`; what precedes a `{` is the
//! prelude of a nested block (rule, mixin definition, at-rule or detached
//! ruleset), anything else is a declaration, a variable, a mixin call or an
//! at-rule statement. `@import` recurses into the imported file in place so
//! output order follows import order.

use crate::ast::{Binding, Directive, DirectiveKind, EachBody, NodeId, NodeKind, Stylesheet};
use crate::error::{LessError, Location, Result, Span};
use crate::loader::{resolve_import, FileReader, ImportOptions, Loader};
use crate::token::{
    closing_quote, find_top_level, matching, render, split_top_level, trim, Token, TokenKind,
};
use crate::tokenizer::Tokenizer;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parse `path` and everything it imports.
pub fn parse(reader: &dyn FileReader, path: &Path) -> Result<Stylesheet> {
    let mut parser = Parser {
        sheet: Stylesheet::new(),
        tokenizer: Tokenizer::new(),
        loader: Loader::new(reader),
        reference: false,
    };
    let root = parser.sheet.root;
    let path = crate::loader::normalize(path);
    parser.parse_path(&path, root, ImportOptions::default())?;

    let Parser {
        mut sheet,
        tokenizer,
        loader,
        ..
    } = parser;
    sheet.files = tokenizer.into_files();
    sheet.imports = loader.into_imports();
    debug!(
        nodes = sheet.nodes.len(),
        files = sheet.files.len(),
        "parsed stylesheet"
    );
    Ok(sheet)
}

struct Parser<'r> {
    sheet: Stylesheet,
    tokenizer: Tokenizer,
    loader: Loader<'r>,
    /// Parsing a `(reference)` import.
    reference: bool,
}

enum Terminator {
    Block,
    Semicolon,
    Close,
    Eof,
}

const BUBBLING_AT_RULES: &[&str] = &["media", "supports", "container", "document"];
const KEYFRAMES_AT_RULES: &[&str] = &[
    "keyframes",
    "-webkit-keyframes",
    "-moz-keyframes",
    "-o-keyframes",
];
const DECLARATION_AT_RULES: &[&str] = &["font-face", "viewport", "-ms-viewport", "page"];

impl<'r> Parser<'r> {
    fn parse_path(&mut self, path: &Path, parent: NodeId, options: ImportOptions) -> Result<()> {
        let Some(source) = self.loader.enter(path, options)? else {
            return Ok(());
        };
        debug!(path = %path.display(), "parsing");
        let tokens = self.tokenizer.tokenize(&source, &path.display().to_string());

        let outer_reference = self.reference;
        self.reference |= options.reference;
        let result = self.consume(path, &tokens, 0, parent, true);
        self.reference = outer_reference;
        result?;

        self.loader.leave();
        Ok(())
    }

    fn error(&self, span: Span, message: impl Into<String>) -> LessError {
        let files = self.tokenizer.files();
        LessError::Parse {
            location: Location {
                file: files
                    .get(span.file.index())
                    .cloned()
                    .unwrap_or_else(|| "<input>".to_string()),
                line: span.line,
                column: span.column,
                offset: span.offset,
            },
            message: message.into(),
        }
    }

    fn alloc(&mut self, kind: NodeKind, parent: NodeId, span: Span) -> NodeId {
        let id = self.sheet.alloc(kind, parent, span);
        if self.reference {
            self.sheet.node_mut(id).reference = true;
        }
        id
    }

    /// Consume statements into `node` starting at `start`. Nested blocks
    /// return the index just past their closing `}`; the top level of a
    /// file runs to the end of its tokens.
    fn consume(
        &mut self,
        file: &Path,
        tokens: &[Token],
        start: usize,
        node: NodeId,
        top: bool,
    ) -> Result<usize> {
        let mut i = start;
        loop {
            while i < tokens.len() && (tokens[i].is_space() || tokens[i].is(TokenKind::Semicolon))
            {
                i += 1;
            }
            if i >= tokens.len() {
                if top {
                    return Ok(i);
                }
                let span = self.sheet.node(node).span;
                return Err(self.error(span, "unexpected end of file, missing `}`"));
            }
            if tokens[i].is(TokenKind::RBrace) {
                if top {
                    return Err(self.error(tokens[i].span, "unexpected `}`"));
                }
                return Ok(i + 1);
            }

            if tokens[i].is_ident("each") && tokens.get(i + 1).is_some_and(|t| t.is(TokenKind::LParen))
            {
                i = self.each(file, tokens, i, node)?;
                continue;
            }

            let (end, terminator) = self.scan_statement(tokens, i)?;
            match terminator {
                Terminator::Block => {
                    i = self.block(file, tokens, i, end, node)?;
                }
                Terminator::Semicolon => {
                    self.statement(file, &tokens[i..end], node)?;
                    i = end + 1;
                }
                Terminator::Close | Terminator::Eof => {
                    self.statement(file, &tokens[i..end], node)?;
                    i = end;
                }
            }
        }
    }

    fn scan_statement(&self, tokens: &[Token], start: usize) -> Result<(usize, Terminator)> {
        let mut opens: Vec<usize> = Vec::new();
        let mut j = start;
        while j < tokens.len() {
            let token = &tokens[j];
            match token.kind {
                TokenKind::SingleQuote | TokenKind::DoubleQuote => {
                    j = closing_quote(tokens, j)
                        .ok_or_else(|| self.error(token.span, "unterminated string"))?;
                }
                TokenKind::At if tokens.get(j + 1).is_some_and(|t| t.is(TokenKind::LBrace)) => {
                    j = matching(tokens, j + 1)
                        .ok_or_else(|| self.error(token.span, "unterminated `@{`"))?;
                }
                TokenKind::LParen | TokenKind::LBracket => opens.push(j),
                TokenKind::RParen | TokenKind::RBracket => {
                    if opens.pop().is_none() {
                        return Err(self.error(token.span, format!("unbalanced `{}`", token.text)));
                    }
                }
                TokenKind::LBrace if opens.is_empty() => return Ok((j, Terminator::Block)),
                TokenKind::LBrace => {
                    j = matching(tokens, j)
                        .ok_or_else(|| self.error(token.span, "unbalanced `{`"))?;
                }
                TokenKind::Semicolon if opens.is_empty() => return Ok((j, Terminator::Semicolon)),
                TokenKind::RBrace if opens.is_empty() => return Ok((j, Terminator::Close)),
                TokenKind::RBrace => {
                    return Err(self.error(token.span, "unbalanced `}` inside parentheses"));
                }
                _ => {}
            }
            j += 1;
        }
        if let Some(open) = opens.first() {
            let token = &tokens[*open];
            return Err(self.error(token.span, format!("unbalanced `{}`", token.text)));
        }
        Ok((tokens.len(), Terminator::Eof))
    }

    fn block(
        &mut self,
        file: &Path,
        tokens: &[Token],
        start: usize,
        brace: usize,
        node: NodeId,
    ) -> Result<usize> {
        let prelude = trim(&tokens[start..brace]);
        let Some(first) = prelude.first() else {
            return Err(self.error(tokens[brace].span, "missing selector before `{`"));
        };
        let span = first.span;

        if first.is(TokenKind::At) {
            return self.at_block(file, tokens, prelude, brace, node);
        }

        let (prelude, guard) = split_guard(prelude);
        if let Some((name, params)) = mixin_signature(prelude) {
            let id = self.alloc(NodeKind::Mixin, node, span);
            {
                let def = self.sheet.node_mut(id);
                def.name = name.clone();
                def.matcher = params.to_vec();
                def.guard = guard.to_vec();
            }
            let end = self.consume(file, tokens, brace + 1, id, false)?;
            self.register_mixin(id, &name, node);
            return Ok(end);
        }

        let (matcher, extends) = split_extends(prelude);
        let id = self.alloc(NodeKind::Rule, node, span);
        {
            let rule = self.sheet.node_mut(id);
            rule.matcher = matcher;
            rule.guard = guard.to_vec();
            rule.directives.extend(extends);
        }
        self.sheet.node_mut(node).children.push(id);
        self.consume(file, tokens, brace + 1, id, false)
    }

    fn at_block(
        &mut self,
        file: &Path,
        tokens: &[Token],
        prelude: &[Token],
        brace: usize,
        node: NodeId,
    ) -> Result<usize> {
        let at = &prelude[0];
        let Some(name) = prelude.get(1).filter(|t| t.is(TokenKind::Ident)) else {
            return Err(self.error(at.span, "unexpected token after `@`"));
        };

        // `@rules: { ... }` detached ruleset
        let rest = trim(&prelude[2..]);
        if rest.len() == 1 && rest[0].is(TokenKind::Colon) {
            let id = self.alloc(NodeKind::Ruleset, node, at.span);
            let end = self.consume(file, tokens, brace + 1, id, false)?;
            self.sheet
                .node_mut(node)
                .vars
                .insert(name.text.clone(), Binding::Ruleset(id));
            return Ok(end);
        }

        let keyword = name.text.as_str();
        let kind = if BUBBLING_AT_RULES.contains(&keyword) {
            NodeKind::Media
        } else if KEYFRAMES_AT_RULES.contains(&keyword) {
            NodeKind::Keyframes
        } else if DECLARATION_AT_RULES.contains(&keyword) {
            NodeKind::AtBlock
        } else {
            return Err(self.error(at.span, format!("unknown at-rule `@{}`", keyword)));
        };

        let id = self.alloc(kind, node, at.span);
        self.sheet.node_mut(id).matcher = prelude.to_vec();
        self.sheet.node_mut(node).children.push(id);
        self.consume(file, tokens, brace + 1, id, false)
    }

    fn statement(&mut self, file: &Path, stmt: &[Token], node: NodeId) -> Result<()> {
        let stmt = trim(stmt);
        let Some(first) = stmt.first() else {
            return Ok(());
        };
        let span = first.span;

        if first.is(TokenKind::At) {
            return self.at_statement(file, stmt, node);
        }

        if first.is(TokenKind::Amp)
            && stmt.get(1).is_some_and(|t| t.is(TokenKind::Colon))
            && stmt.get(2).is_some_and(|t| t.is_ident("extend"))
        {
            let directives = extend_directives(&stmt[1..])
                .ok_or_else(|| self.error(span, "malformed `:extend()`"))?;
            self.sheet.node_mut(node).directives.extend(directives);
            return Ok(());
        }

        if matches!(first.kind, TokenKind::Dot | TokenKind::Hash) {
            self.sheet.node_mut(node).directives.push(Directive {
                kind: DirectiveKind::MixinCall,
                name: Vec::new(),
                value: stmt.to_vec(),
                span,
            });
            return Ok(());
        }

        self.declaration(stmt, node)
    }

    fn declaration(&mut self, stmt: &[Token], node: NodeId) -> Result<()> {
        let span = stmt[0].span;
        let Some(colon) = find_top_level(stmt, TokenKind::Colon) else {
            return Err(self.error(
                span,
                format!("missing `:` in declaration `{}`", render(stmt)),
            ));
        };
        let name = trim(&stmt[..colon]);
        if name.is_empty() {
            return Err(self.error(span, "missing property name before `:`"));
        }
        self.sheet.node_mut(node).directives.push(Directive {
            kind: DirectiveKind::Declaration,
            name: name.to_vec(),
            value: trim(&stmt[colon + 1..]).to_vec(),
            span,
        });
        Ok(())
    }

    fn at_statement(&mut self, file: &Path, stmt: &[Token], node: NodeId) -> Result<()> {
        let at = &stmt[0];
        let Some(next) = stmt.get(1) else {
            return Err(self.error(at.span, "unexpected token after `@`"));
        };

        // `@{prop}: value` interpolated property name
        if next.is(TokenKind::LBrace) {
            return self.declaration(stmt, node);
        }
        if !next.is(TokenKind::Ident) {
            return Err(self.error(next.span, "unexpected token after `@`"));
        }

        let after = crate::token::skip_space(stmt, 2);
        if stmt.get(after).is_some_and(|t| t.is(TokenKind::Colon)) {
            let value = trim(&stmt[after + 1..]).to_vec();
            self.sheet
                .node_mut(node)
                .vars
                .insert(next.text.clone(), Binding::Value(value));
            return Ok(());
        }

        match next.text.as_str() {
            "import" => self.import(file, stmt, node),
            "charset" => {
                let root = self.sheet.root;
                self.sheet.node_mut(root).directives.insert(
                    0,
                    Directive {
                        kind: DirectiveKind::Statement,
                        name: Vec::new(),
                        value: stmt.to_vec(),
                        span: at.span,
                    },
                );
                Ok(())
            }
            "namespace" => {
                self.sheet.node_mut(node).directives.push(Directive {
                    kind: DirectiveKind::Statement,
                    name: Vec::new(),
                    value: stmt.to_vec(),
                    span: at.span,
                });
                Ok(())
            }
            _ if stmt.get(2).is_some_and(|t| t.is(TokenKind::LParen)) => {
                self.sheet.node_mut(node).directives.push(Directive {
                    kind: DirectiveKind::MixinCall,
                    name: Vec::new(),
                    value: stmt.to_vec(),
                    span: at.span,
                });
                Ok(())
            }
            other => Err(self.error(at.span, format!("unexpected `@{}`", other))),
        }
    }

    fn import(&mut self, file: &Path, stmt: &[Token], node: NodeId) -> Result<()> {
        let span = stmt[0].span;
        let mut i = crate::token::skip_space(stmt, 2);
        let mut options = ImportOptions::default();

        if stmt.get(i).is_some_and(|t| t.is(TokenKind::LParen)) {
            let close = matching(stmt, i).ok_or_else(|| self.error(span, "unbalanced `(`"))?;
            for keyword in split_top_level(&stmt[i + 1..close], TokenKind::Comma) {
                let keyword = trim(keyword);
                let text = render(keyword);
                if !options.set(&text) {
                    return Err(self.error(span, format!("unknown import option `{}`", text)));
                }
            }
            i = crate::token::skip_space(stmt, close + 1);
        }

        let target = match stmt.get(i) {
            Some(t) if t.kind.is_quote() => {
                let close = closing_quote(stmt, i)
                    .ok_or_else(|| self.error(t.span, "unterminated string"))?;
                let target = render(&stmt[i + 1..close]);
                let media = trim(&stmt[close + 1..]);
                if !media.is_empty() {
                    options.css = true;
                }
                target
            }
            Some(t) if t.is_ident("url") => {
                options.css = true;
                String::new()
            }
            Some(t) => return Err(self.error(t.span, "expected a quoted path after `@import`")),
            None => return Err(self.error(span, "missing path after `@import`")),
        };

        if options.css || (target.ends_with(".css") && !options.less && !options.inline) {
            let root = self.sheet.root;
            self.sheet.node_mut(root).directives.push(Directive {
                kind: DirectiveKind::Statement,
                name: Vec::new(),
                value: stmt.to_vec(),
                span,
            });
            return Ok(());
        }

        let path: PathBuf = resolve_import(file, &target);
        if options.inline {
            if let Some(content) = self.loader.read_inline(&path, options.optional)? {
                let tokens = self.tokenizer.tokenize(&content, &path.display().to_string());
                self.sheet.node_mut(node).directives.push(Directive {
                    kind: DirectiveKind::Inline,
                    name: Vec::new(),
                    value: tokens,
                    span,
                });
            }
            return Ok(());
        }

        debug!(from = %file.display(), target = %path.display(), "import");
        self.parse_path(&path, node, options)
    }

    /// `each(@list, { ... })` or `each(@list, @ruleset)`.
    fn each(&mut self, file: &Path, tokens: &[Token], start: usize, node: NodeId) -> Result<usize> {
        let span = tokens[start].span;
        let open = start + 1;
        let close = matching(tokens, open).ok_or_else(|| self.error(span, "unbalanced `(`"))?;
        let inner = &tokens[open + 1..close];
        let Some(comma) = find_top_level(inner, TokenKind::Comma) else {
            return Err(self.error(span, "each() expects a list and a ruleset"));
        };
        let list = trim(&inner[..comma]).to_vec();
        let body_tokens = trim(&inner[comma + 1..]);

        let body = match body_tokens.first() {
            Some(t) if t.is(TokenKind::LBrace) => {
                let brace = crate::token::skip_space(tokens, open + 2 + comma);
                let id = self.alloc(NodeKind::Ruleset, node, t.span);
                let end = self.consume(file, tokens, brace + 1, id, false)?;
                if crate::token::skip_space(tokens, end) != close {
                    return Err(self.error(t.span, "unexpected tokens after each() ruleset"));
                }
                EachBody::Inline(id)
            }
            Some(t) if t.is(TokenKind::At) => EachBody::Variable(body_tokens.to_vec()),
            _ => return Err(self.error(span, "each() expects a ruleset as second argument")),
        };

        self.sheet.node_mut(node).directives.push(Directive {
            kind: DirectiveKind::Each { body },
            name: Vec::new(),
            value: list,
            span,
        });
        Ok(close + 1)
    }

    /// Register a mixin under its own name in `owner`, and under every
    /// qualified name (`#ns.m`) formed by simple `#id`/`.class` ancestors.
    fn register_mixin(&mut self, id: NodeId, name: &str, owner: NodeId) {
        self.sheet
            .node_mut(owner)
            .mixins
            .entry(name.to_string())
            .or_default()
            .push(id);

        let mut key = name.to_string();
        let mut current = owner;
        while let Some(parent) = self.sheet.node(current).parent {
            let node = self.sheet.node(current);
            let qualifier = match node.kind {
                NodeKind::Mixin => node.name.clone(),
                NodeKind::Rule if is_simple_selector(&node.matcher) => render(&node.matcher),
                _ => break,
            };
            key = format!("{}{}", qualifier, key);
            self.sheet
                .node_mut(parent)
                .mixins
                .entry(key.clone())
                .or_default()
                .push(id);
            current = parent;
        }
    }
}

/// `#id` or `.class` with nothing else.
fn is_simple_selector(tokens: &[Token]) -> bool {
    let tokens = trim(tokens);
    tokens.len() == 2
        && matches!(tokens[0].kind, TokenKind::Dot | TokenKind::Hash)
        && tokens[1].is(TokenKind::Ident)
}

/// Split `prelude when (guard)`; the guard is empty when there is none.
fn split_guard(prelude: &[Token]) -> (&[Token], &[Token]) {
    let mut nesting = crate::token::Nesting::default();
    for (i, token) in prelude.iter().enumerate() {
        if nesting.step(token) && token.is_ident("when") && i > 0 && prelude[i - 1].is_space() {
            return (trim(&prelude[..i]), trim(&prelude[i + 1..]));
        }
    }
    (prelude, &[])
}

/// `.name(params)` / `#name(params)` with nothing after the closing paren.
fn mixin_signature(prelude: &[Token]) -> Option<(String, &[Token])> {
    if prelude.len() < 4
        || !matches!(prelude[0].kind, TokenKind::Dot | TokenKind::Hash)
        || !prelude[1].is(TokenKind::Ident)
        || !prelude[2].is(TokenKind::LParen)
    {
        return None;
    }
    let close = matching(prelude, 2)?;
    if close != prelude.len() - 1 {
        return None;
    }
    let name = format!("{}{}", prelude[0].text, prelude[1].text);
    Some((name, &prelude[3..close]))
}

/// Pull `:extend(...)` out of a selector.
fn split_extends(prelude: &[Token]) -> (Vec<Token>, Vec<Directive>) {
    let mut matcher = Vec::new();
    let mut extends = Vec::new();
    let mut i = 0;
    while i < prelude.len() {
        if prelude[i].is(TokenKind::Colon)
            && prelude.get(i + 1).is_some_and(|t| t.is_ident("extend"))
            && prelude.get(i + 2).is_some_and(|t| t.is(TokenKind::LParen))
        {
            if let Some(close) = matching(prelude, i + 2) {
                if let Some(found) = extend_directives(&prelude[i..=close]) {
                    extends.extend(found);
                    i = close + 1;
                    continue;
                }
            }
        }
        matcher.push(prelude[i].clone());
        i += 1;
    }
    (trim(&matcher).to_vec(), extends)
}

/// Parse `:extend(.a, .b all)` starting at the colon.
fn extend_directives(tokens: &[Token]) -> Option<Vec<Directive>> {
    let span = tokens.first()?.span;
    let open = 2;
    if !tokens.get(open)?.is(TokenKind::LParen) {
        return None;
    }
    let close = matching(tokens, open)?;
    let mut out = Vec::new();
    for target in split_top_level(&tokens[open + 1..close], TokenKind::Comma) {
        let mut target = trim(target);
        let all = target.last().is_some_and(|t| t.is_ident("all"));
        if all {
            target = trim(&target[..target.len() - 1]);
        }
        if target.is_empty() {
            return None;
        }
        out.push(Directive {
            kind: DirectiveKind::Extend { all },
            name: Vec::new(),
            value: target.to_vec(),
            span,
        });
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::render_compact;
    use std::collections::HashMap;
    use std::io;

    fn parse_files(files: &[(&str, &str)]) -> Result<Stylesheet> {
        let map: HashMap<PathBuf, Vec<u8>> = files
            .iter()
            .map(|(p, s)| (PathBuf::from(p), s.as_bytes().to_vec()))
            .collect();
        let reader = move |p: &Path| -> io::Result<Vec<u8>> {
            map.get(p)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        };
        parse(&reader, Path::new(files[0].0))
    }

    fn parse_one(src: &str) -> Stylesheet {
        parse_files(&[("main.less", src)]).expect("parse")
    }

    #[test]
    fn rules_directives_and_children() {
        let sheet = parse_one(".a, .b { color: red; .c { margin: 0 } }");
        let root = sheet.node(sheet.root);
        assert_eq!(root.children.len(), 1);
        let a = sheet.node(root.children[0]);
        assert_eq!(a.selector_text(), ".a, .b");
        assert_eq!(a.directives.len(), 1);
        assert_eq!(render_compact(&a.directives[0].name), "color");
        assert_eq!(render_compact(&a.directives[0].value), "red");
        let c = sheet.node(a.children[0]);
        assert_eq!(c.selector_text(), ".c");
        assert_eq!(render_compact(&c.directives[0].value), "0");
    }

    #[test]
    fn variables_last_write_wins() {
        let sheet = parse_one("@a: 1; @b: @a; @a: 2;");
        let root = sheet.node(sheet.root);
        match root.vars.get("a") {
            Some(Binding::Value(v)) => assert_eq!(render(v), "2"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(root.vars.contains_key("b"));
    }

    #[test]
    fn mixin_definitions_are_not_children() {
        let sheet = parse_one(".m(@a; @b: 2) when (@a > 1) { width: @a; } .x { .m(3); }");
        let root = sheet.node(sheet.root);
        assert_eq!(root.children.len(), 1);
        let defs = &root.mixins[".m"];
        let def = sheet.node(defs[0]);
        assert_eq!(def.kind, NodeKind::Mixin);
        assert_eq!(render_compact(&def.matcher), "@a; @b: 2");
        assert_eq!(render_compact(&def.guard), "(@a > 1)");
        let x = sheet.node(root.children[0]);
        assert_eq!(x.directives[0].kind, DirectiveKind::MixinCall);
    }

    #[test]
    fn selectors_with_pseudo_arguments_stay_rules() {
        let sheet = parse_one("li:nth-child(2n+1) { color: red; } .a:not(.b) { color: blue; }");
        let root = sheet.node(sheet.root);
        assert_eq!(root.children.len(), 2);
        assert!(root.mixins.is_empty());
    }

    #[test]
    fn namespaced_mixins_register_qualified_names() {
        let sheet = parse_one("#ns { .m() { color: red; } }");
        let root = sheet.node(sheet.root);
        assert!(root.mixins.contains_key("#ns.m"));
        let ns = sheet.node(root.children[0]);
        assert!(ns.mixins.contains_key(".m"));
    }

    #[test]
    fn guards_on_plain_rules() {
        let sheet = parse_one(".a when (@mode = dark) { color: black; }");
        let a = sheet.node(sheet.node(sheet.root).children[0]);
        assert_eq!(a.kind, NodeKind::Rule);
        assert_eq!(render_compact(&a.guard), "(@mode = dark)");
        assert_eq!(a.selector_text(), ".a");
    }

    #[test]
    fn at_rules() {
        let sheet = parse_one(
            "@charset \"UTF-8\"; .a { @media (min-width: 10px) { color: red; } } \
             @keyframes spin { from { opacity: 0; } } @font-face { font-family: x; }",
        );
        let root = sheet.node(sheet.root);
        assert_eq!(root.directives[0].kind, DirectiveKind::Statement);
        let a = sheet.node(root.children[0]);
        assert_eq!(sheet.node(a.children[0]).kind, NodeKind::Media);
        assert_eq!(sheet.node(root.children[1]).kind, NodeKind::Keyframes);
        assert_eq!(sheet.node(root.children[2]).kind, NodeKind::AtBlock);
    }

    #[test]
    fn extend_in_selector_and_body() {
        let sheet = parse_one(".a:extend(.b all) { color: red; } .c { &:extend(.d, .e); }");
        let root = sheet.node(sheet.root);
        let a = sheet.node(root.children[0]);
        assert_eq!(a.selector_text(), ".a");
        assert_eq!(a.directives[0].kind, DirectiveKind::Extend { all: true });
        assert_eq!(render_compact(&a.directives[0].value), ".b");
        let c = sheet.node(root.children[1]);
        assert_eq!(c.directives.len(), 2);
    }

    #[test]
    fn detached_rulesets_and_each() {
        let sheet = parse_one("@r: { color: red; }; .a { @r(); } each(@list, { .x-@{value} { a: b; } });");
        let root = sheet.node(sheet.root);
        assert!(matches!(root.vars.get("r"), Some(Binding::Ruleset(_))));
        let each = root
            .directives
            .iter()
            .find(|d| matches!(d.kind, DirectiveKind::Each { .. }))
            .expect("each directive");
        assert_eq!(render_compact(&each.value), "@list");
    }

    #[test]
    fn imports_inline_in_order_and_record_files() {
        let sheet = parse_files(&[
            ("main.less", ".a { x: 1; } @import 'other'; .c { x: 3; }"),
            ("other.less", ".b { x: 2; }"),
        ])
        .unwrap();
        let root = sheet.node(sheet.root);
        let selectors: Vec<String> = root
            .children
            .iter()
            .map(|c| sheet.node(*c).selector_text())
            .collect();
        assert_eq!(selectors, vec![".a", ".b", ".c"]);
        assert_eq!(
            sheet.imports,
            vec![PathBuf::from("main.less"), PathBuf::from("other.less")]
        );
    }

    #[test]
    fn css_imports_become_statements() {
        let sheet = parse_one("@import 'theme.css'; @import url(x.css);");
        let root = sheet.node(sheet.root);
        assert_eq!(root.directives.len(), 2);
        assert!(root
            .directives
            .iter()
            .all(|d| d.kind == DirectiveKind::Statement));
    }

    #[test]
    fn cyclic_imports_fail_fast() {
        let err = parse_files(&[("a.less", "@import 'b';"), ("b.less", "@import 'a';")])
            .unwrap_err();
        assert!(matches!(err, LessError::CyclicImport { .. }));
    }

    #[test]
    fn parse_errors_carry_location() {
        let err = parse_files(&[("main.less", ".a {\n  color red;\n}")]).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("main.less:2:3"), "{}", message);
        assert!(message.contains("missing `:`"));

        assert!(parse_files(&[("main.less", ".a { color: red;")]).is_err());
        assert!(parse_files(&[("main.less", ".a { } }")]).is_err());
        assert!(parse_files(&[("main.less", ".a { width: calc(1px; }")]).is_err());
        assert!(parse_files(&[("main.less", "@ foo;")]).is_err());
        assert!(parse_files(&[("main.less", "@unknown x { }")]).is_err());
    }

    #[test]
    fn reference_imports_mark_nodes() {
        let sheet = parse_files(&[
            ("main.less", "@import (reference) 'lib'; .a { .m(); }"),
            ("lib.less", ".m() { color: red; } .lib { color: blue; }"),
        ])
        .unwrap();
        let root = sheet.node(sheet.root);
        assert!(sheet.node(root.children[0]).reference);
        assert!(!sheet.node(root.children[1]).reference);
    }
}
