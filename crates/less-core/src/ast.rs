use crate::error::{Location, Span};
use crate::token::{render_compact, Tokens};
use indexmap::IndexMap;
use std::path::PathBuf;

/// Index of a node in the [`Stylesheet`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    /// A selector block.
    Rule,
    /// A parameterised mixin definition; `matcher` holds the parameters.
    Mixin,
    /// A detached ruleset or an `each()` body.
    Ruleset,
    /// `@media`-like blocks that bubble up through enclosing rules.
    Media,
    /// `@keyframes`: children are keyframe selectors, not nested ones.
    Keyframes,
    /// `@font-face`, `@page`, `@viewport`: declarations sit directly inside.
    AtBlock,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DirectiveKind {
    /// `name: value;`
    Declaration,
    /// Mixin or detached-ruleset call; `value` holds the call tokens.
    MixinCall,
    /// `&:extend(target)`; `value` holds the target selector.
    Extend { all: bool },
    /// `each(list, body)`; `value` holds the list expression.
    Each { body: EachBody },
    /// A raw at-rule statement such as `@charset` or a CSS `@import`.
    Statement,
    /// Contents of an `(inline)` import, printed verbatim.
    Inline,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EachBody {
    Inline(NodeId),
    Variable(Tokens),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub name: Tokens,
    pub value: Tokens,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    Value(Tokens),
    Ruleset(NodeId),
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// Mixin name (`.m`, `#ns`) for mixin definitions, empty otherwise.
    pub name: String,
    pub matcher: Tokens,
    pub guard: Tokens,
    pub directives: Vec<Directive>,
    pub children: Vec<NodeId>,
    pub vars: IndexMap<String, Binding>,
    pub mixins: IndexMap<String, Vec<NodeId>>,
    pub parent: Option<NodeId>,
    pub depth: usize,
    /// Inside a mixin or ruleset body: values depend on the invocation.
    pub in_mixin: bool,
    /// Imported with `(reference)`: never printed on its own.
    pub reference: bool,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, parent: Option<NodeId>, span: Span) -> Self {
        Self {
            kind,
            name: String::new(),
            matcher: Vec::new(),
            guard: Vec::new(),
            directives: Vec::new(),
            children: Vec::new(),
            vars: IndexMap::new(),
            mixins: IndexMap::new(),
            parent,
            depth: 0,
            in_mixin: false,
            reference: false,
            span,
        }
    }

    /// Whitespace-normalized selector text of the matcher.
    pub fn selector_text(&self) -> String {
        render_compact(&self.matcher)
    }
}

/// The parsed tree of one compile: all files, with imports inlined.
#[derive(Debug)]
pub struct Stylesheet {
    pub nodes: Vec<Node>,
    pub root: NodeId,
    pub files: Vec<String>,
    /// Every file read, entry file first, in first-encountered order.
    pub imports: Vec<PathBuf>,
}

impl Default for Stylesheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Stylesheet {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root, None, Span::dummy())],
            root: NodeId(0),
            files: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Allocate a node under `parent`, inheriting depth and mixin scope.
    /// The caller decides whether it is listed among the parent's children.
    pub fn alloc(&mut self, kind: NodeKind, parent: NodeId, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent_node = self.node(parent);
        let mut node = Node::new(kind, Some(parent), span);
        node.depth = parent_node.depth + 1;
        node.in_mixin =
            parent_node.in_mixin || matches!(kind, NodeKind::Mixin | NodeKind::Ruleset);
        node.reference = parent_node.reference;
        self.nodes.push(node);
        id
    }

    /// Lexical ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |p| self.node(*p).parent)
    }

    pub fn locate(&self, span: Span) -> Location {
        Location {
            file: self
                .files
                .get(span.file.index())
                .cloned()
                .unwrap_or_else(|| "<input>".to_string()),
            line: span.line,
            column: span.column,
            offset: span.offset,
        }
    }
}
