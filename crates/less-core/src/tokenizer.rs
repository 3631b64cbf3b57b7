//! Single left-to-right scan from LESS source into [`Tokens`].
//!
//! The tokenizer never fails: anything it does not recognise becomes an
//! [`TokenKind::Other`] token for the parser to reject. Comments are dropped;
//! everything else, whitespace included, survives so that
//! [`render`](crate::token::render) gives back the source text.

use crate::error::{FileId, Span};
use crate::token::{Token, TokenKind, Tokens};

/// Tokenizer with a per-compile file table. Each file path gets a stable
/// [`FileId`] the first time it is seen.
#[derive(Debug, Default)]
pub struct Tokenizer {
    files: Vec<String>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, path: &str) -> FileId {
        if let Some(pos) = self.files.iter().position(|f| f == path) {
            return FileId(pos as u32);
        }
        self.files.push(path.to_string());
        FileId((self.files.len() - 1) as u32)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn into_files(self) -> Vec<String> {
        self.files
    }

    pub fn tokenize(&mut self, source: &str, path: &str) -> Tokens {
        let file = self.intern(path);
        scan(source, file)
    }

    /// Tokenize evaluator output; every token takes the span of `origin`.
    pub fn fragment(text: &str, origin: Span) -> Tokens {
        let mut tokens = scan(text, origin.file);
        for token in &mut tokens {
            token.span = origin;
        }
        tokens
    }
}

struct Scanner<'a> {
    chars: Vec<(usize, char)>,
    src: &'a str,
    file: FileId,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.src.len(), |(offset, _)| *offset)
    }

    fn span(&self) -> Span {
        Span {
            file: self.file,
            line: self.line,
            column: self.column,
            offset: self.offset(),
        }
    }

    fn bump(&mut self) {
        if let Some((_, c)) = self.chars.get(self.pos) {
            if *c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek(0) {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn skip_comment(&mut self) {
        if self.peek(1) == Some('/') {
            self.bump_while(|c| c != '\n');
            return;
        }
        self.bump();
        self.bump();
        while let Some(c) = self.peek(0) {
            if c == '*' && self.peek(1) == Some('/') {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn punctuation(c: char) -> TokenKind {
    match c {
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        ',' => TokenKind::Comma,
        ';' => TokenKind::Semicolon,
        ':' => TokenKind::Colon,
        '.' => TokenKind::Dot,
        '@' => TokenKind::At,
        '&' => TokenKind::Amp,
        '#' => TokenKind::Hash,
        '%' => TokenKind::Percent,
        '~' => TokenKind::Tilde,
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        '=' => TokenKind::Eq,
        '!' => TokenKind::Bang,
        '\'' => TokenKind::SingleQuote,
        '"' => TokenKind::DoubleQuote,
        _ => TokenKind::Other,
    }
}

fn scan(source: &str, file: FileId) -> Tokens {
    let mut s = Scanner {
        chars: source.char_indices().collect(),
        src: source,
        file,
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens: Tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut in_url = false;

    while let Some(c) = s.peek(0) {
        if c == '/'
            && quote.is_none()
            && !in_url
            && matches!(s.peek(1), Some('/') | Some('*'))
        {
            s.skip_comment();
            continue;
        }

        let span = s.span();
        let start = s.pos;
        let after_at = tokens.last().is_some_and(|t| t.kind == TokenKind::At);
        let kind = match c {
            ' ' | '\t' | '\r' | '\x0c' => {
                s.bump_while(|c| matches!(c, ' ' | '\t' | '\r' | '\x0c'));
                TokenKind::Space
            }
            '\n' => {
                s.bump_while(|c| c == '\n');
                TokenKind::Newline
            }
            '0'..='9' => {
                scan_number(&mut s);
                TokenKind::Number
            }
            '.' if s.peek(1).is_some_and(|n| n.is_ascii_digit()) => {
                scan_number(&mut s);
                TokenKind::Number
            }
            '-' | '_' if after_at => {
                s.bump();
                s.bump_while(is_ident_char);
                TokenKind::Ident
            }
            c if is_ident_start(c) => {
                s.bump();
                s.bump_while(is_ident_char);
                TokenKind::Ident
            }
            '\\' => {
                s.bump();
                s.bump();
                TokenKind::Escape
            }
            c => {
                s.bump();
                let kind = punctuation(c);
                match kind {
                    TokenKind::SingleQuote | TokenKind::DoubleQuote => match quote {
                        Some(q) if q == c => quote = None,
                        None => quote = Some(c),
                        _ => {}
                    },
                    TokenKind::LParen if quote.is_none() => {
                        let url = tokens.last().is_some_and(|t| t.is_ident("url"));
                        let next = s.chars[s.pos..]
                            .iter()
                            .map(|(_, c)| *c)
                            .find(|c| !c.is_whitespace());
                        in_url = url && !matches!(next, Some('\'') | Some('"'));
                    }
                    TokenKind::RParen if quote.is_none() => in_url = false,
                    _ => {}
                }
                kind
            }
        };

        let end = s.offset();
        let text = &source[span.offset..end];
        debug_assert!(s.pos > start);
        tokens.push(Token::new(kind, text, span));
    }
    tokens
}

fn scan_number(s: &mut Scanner<'_>) {
    s.bump_while(|c| c.is_ascii_digit());
    if s.peek(0) == Some('.') && s.peek(1).is_some_and(|c| c.is_ascii_digit()) {
        s.bump();
        s.bump_while(|c| c.is_ascii_digit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::render;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        Tokenizer::new()
            .tokenize(src, "t.less")
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn reconstructs_source_without_comments() {
        let src = ".a { color: @red; } // trailing\n/* block\n comment */.b{margin:1.5px -2px}";
        let tokens = Tokenizer::new().tokenize(src, "t.less");
        assert_eq!(
            render(&tokens),
            ".a { color: @red; } \n.b{margin:1.5px -2px}"
        );
    }

    #[test]
    fn round_trips_plain_source() {
        let src = "@import (less) 'x';\n.m(@a; @b: 2) when (@a > 1) {\n  width: ~\"calc(100% - @{b})\";\n}\n";
        let tokens = Tokenizer::new().tokenize(src, "t.less");
        assert_eq!(render(&tokens), src);
    }

    #[test]
    fn variable_names_keep_dashes() {
        let got = kinds("@my-var:@-x");
        assert_eq!(
            got,
            vec![
                (TokenKind::At, "@".into()),
                (TokenKind::Ident, "my-var".into()),
                (TokenKind::Colon, ":".into()),
                (TokenKind::At, "@".into()),
                (TokenKind::Ident, "-x".into()),
            ]
        );
    }

    #[test]
    fn numbers_and_units() {
        let got = kinds("1.5px .5em 10%");
        assert_eq!(got[0], (TokenKind::Number, "1.5".into()));
        assert_eq!(got[1], (TokenKind::Ident, "px".into()));
        assert_eq!(got[3], (TokenKind::Number, ".5".into()));
        assert_eq!(got[4], (TokenKind::Ident, "em".into()));
        assert_eq!(got[6], (TokenKind::Number, "10".into()));
        assert_eq!(got[7], (TokenKind::Percent, "%".into()));
    }

    #[test]
    fn comments_are_not_recognised_in_strings_or_urls() {
        let src = "a: '//x'; b: url(http://y/z.png);";
        let tokens = Tokenizer::new().tokenize(src, "t.less");
        assert_eq!(render(&tokens), src);
    }

    #[test]
    fn tracks_lines_and_columns_across_comments() {
        let tokens = Tokenizer::new().tokenize("/* a\nb */\n  .x", "t.less");
        let dot = tokens.iter().find(|t| t.kind == TokenKind::Dot).unwrap();
        assert_eq!((dot.span.line, dot.span.column), (3, 3));
        assert_eq!(dot.span.offset, 12);
    }

    #[test]
    fn interns_files_once() {
        let mut tokenizer = Tokenizer::new();
        let a = tokenizer.intern("a.less");
        let b = tokenizer.intern("b.less");
        assert_ne!(a, b);
        assert_eq!(tokenizer.intern("a.less"), a);
        assert_eq!(tokenizer.files(), ["a.less", "b.less"]);
    }

    #[test]
    fn escapes_keep_the_escaped_char() {
        let got = kinds(r"'a\'b'");
        assert_eq!(got[2], (TokenKind::Escape, r"\'".into()));
        assert_eq!(got.last().unwrap().0, TokenKind::SingleQuote);
    }
}
