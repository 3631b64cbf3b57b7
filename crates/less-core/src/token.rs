//! Token types and the slice helpers the parser and evaluator share.
//!
//! A [`Tokens`] value is an ordered run of tokens that can be sliced and
//! recombined freely; every helper here works on `&[Token]` so sub-slices of
//! a parsed buffer never need copying until a value is actually rewritten.

use crate::error::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Space,
    Newline,
    Ident,
    Number,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    At,
    Amp,
    Hash,
    Percent,
    Tilde,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Eq,
    Bang,
    SingleQuote,
    DoubleQuote,
    /// A backslash together with the character it escapes.
    Escape,
    Other,
}

impl TokenKind {
    pub fn is_space(self) -> bool {
        matches!(self, TokenKind::Space | TokenKind::Newline)
    }

    pub fn is_quote(self) -> bool {
        matches!(self, TokenKind::SingleQuote | TokenKind::DoubleQuote)
    }

    fn opens(self) -> bool {
        matches!(
            self,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace
        )
    }

    fn closes(self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_space(&self) -> bool {
        self.kind.is_space()
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }
}

pub type Tokens = Vec<Token>;

/// Tracks bracket depth and quoted-string state while walking a token run.
#[derive(Default)]
pub(crate) struct Nesting {
    depth: usize,
    quote: Option<TokenKind>,
}

impl Nesting {
    /// Feed one token; returns true when the token sits at the top level
    /// (outside brackets and strings). Brackets themselves are never top
    /// level.
    pub(crate) fn step(&mut self, token: &Token) -> bool {
        if let Some(quote) = self.quote {
            if token.kind == quote {
                self.quote = None;
            }
            return false;
        }
        if token.kind.is_quote() {
            self.quote = Some(token.kind);
            return false;
        }
        if token.kind.opens() {
            self.depth += 1;
            return false;
        }
        if token.kind.closes() {
            self.depth = self.depth.saturating_sub(1);
            return false;
        }
        self.depth == 0
    }
}

/// Reconstruct the exact source text of a token run.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.text);
    }
    out
}

/// Render with every whitespace run outside strings collapsed to a single
/// space and the ends trimmed.
pub fn render_compact(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut quote: Option<TokenKind> = None;
    let mut pending_space = false;
    for token in trim(tokens) {
        if quote.is_none() && token.is_space() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match quote {
            Some(q) if token.kind == q => quote = None,
            None if token.kind.is_quote() => quote = Some(token.kind),
            _ => {}
        }
        out.push_str(&token.text);
    }
    out
}

/// Strip leading and trailing whitespace tokens.
pub fn trim(tokens: &[Token]) -> &[Token] {
    let start = tokens
        .iter()
        .position(|t| !t.is_space())
        .unwrap_or(tokens.len());
    let end = tokens
        .iter()
        .rposition(|t| !t.is_space())
        .map_or(start, |i| i + 1);
    &tokens[start..end]
}

/// Index of the first non-whitespace token at or after `i`.
pub fn skip_space(tokens: &[Token], mut i: usize) -> usize {
    while i < tokens.len() && tokens[i].is_space() {
        i += 1;
    }
    i
}

/// Index of the bracket closing the one at `open`, skipping nested brackets
/// and quoted strings.
pub fn matching(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<TokenKind> = None;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if token.kind == q {
                quote = None;
            }
            continue;
        }
        if token.kind.is_quote() {
            quote = Some(token.kind);
        } else if token.kind.opens() {
            depth += 1;
        } else if token.kind.closes() {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Index of the quote token closing the string opened at `open`.
pub fn closing_quote(tokens: &[Token], open: usize) -> Option<usize> {
    let kind = tokens.get(open)?.kind;
    tokens
        .iter()
        .enumerate()
        .skip(open + 1)
        .find(|(_, t)| t.kind == kind)
        .map(|(i, _)| i)
}

/// Position of the first top-level token of the given kind.
pub fn find_top_level(tokens: &[Token], kind: TokenKind) -> Option<usize> {
    let mut nesting = Nesting::default();
    tokens
        .iter()
        .position(|t| nesting.step(t) && t.kind == kind)
}

/// Split at every top-level token of `kind`; separators are dropped and
/// the pieces are not trimmed.
pub fn split_top_level(tokens: &[Token], kind: TokenKind) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if nesting.step(token) && token.kind == kind {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Split an argument list: at top-level semicolons when there are any (so
/// arguments may themselves contain commas), otherwise at commas.
pub fn split_arguments(tokens: &[Token]) -> Vec<&[Token]> {
    if trim(tokens).is_empty() {
        return Vec::new();
    }
    let separator = if find_top_level(tokens, TokenKind::Semicolon).is_some() {
        TokenKind::Semicolon
    } else {
        TokenKind::Comma
    };
    let mut parts = split_top_level(tokens, separator);
    // `.m(1;)` style trailing separator
    if parts.len() > 1 && parts.last().is_some_and(|p| trim(p).is_empty()) {
        parts.pop();
    }
    parts
}

/// Strip one level of matching quotes from text.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn lex(src: &str) -> Tokens {
        Tokenizer::new().tokenize(src, "test.less")
    }

    #[test]
    fn compact_render_collapses_whitespace_outside_strings() {
        let tokens = lex("  1px \n\t solid  'a  b'  ");
        assert_eq!(render_compact(&tokens), "1px solid 'a  b'");
    }

    #[test]
    fn top_level_split_ignores_nested_commas() {
        let tokens = lex("rgb(1,2,3), 'a,b', c");
        let parts: Vec<String> = split_top_level(&tokens, TokenKind::Comma)
            .into_iter()
            .map(render_compact)
            .collect();
        assert_eq!(parts, vec!["rgb(1,2,3)", "'a,b'", "c"]);
    }

    #[test]
    fn arguments_prefer_semicolons() {
        let tokens = lex("1, 2; 3");
        let parts: Vec<String> = split_arguments(&tokens)
            .into_iter()
            .map(render_compact)
            .collect();
        assert_eq!(parts, vec!["1, 2", "3"]);
        assert!(split_arguments(&lex("  ")).is_empty());
    }

    #[test]
    fn matching_bracket_skips_nesting() {
        let tokens = lex("(a (b) ')' c) d");
        let close = matching(&tokens, 0).unwrap();
        assert_eq!(render(&tokens[..=close]), "(a (b) ')' c)");
    }

    #[test]
    fn unquote_strips_one_level() {
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"a\""), "a");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("'"), "'");
    }
}
