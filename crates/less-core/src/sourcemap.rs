//! Version 3 source maps.
//!
//! The printer writes CSS on a single line, so every mapping lives on
//! generated line 0 and the generated column counts UTF-16 code units from
//! the start of the output.

use crate::error::{FileId, Span};
use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Serialize)]
pub struct SourceMap {
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "sourceRoot", skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub generated_column: usize,
    pub source: FileId,
    /// 1-based, like [`Span`].
    pub line: usize,
    pub column: usize,
}

/// Collects mappings while the printer writes.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn add(&mut self, generated_column: usize, span: Span) {
        if span.line == 0 {
            return;
        }
        if self
            .mappings
            .last()
            .is_some_and(|m| m.generated_column == generated_column)
        {
            return;
        }
        self.mappings.push(Mapping {
            generated_column,
            source: span.file,
            line: span.line,
            column: span.column,
        });
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn build(&self, sources: &[String], file: Option<String>, source_root: Option<String>) -> SourceMap {
        let mut mappings = String::new();
        let (mut column, mut source, mut line, mut source_column) = (0i64, 0i64, 0i64, 0i64);
        for (i, m) in self.mappings.iter().enumerate() {
            if i > 0 {
                mappings.push(',');
            }
            let generated = m.generated_column as i64;
            let file = m.source.index() as i64;
            let orig_line = m.line as i64 - 1;
            let orig_column = m.column.saturating_sub(1) as i64;
            encode_vlq(&mut mappings, generated - column);
            encode_vlq(&mut mappings, file - source);
            encode_vlq(&mut mappings, orig_line - line);
            encode_vlq(&mut mappings, orig_column - source_column);
            column = generated;
            source = file;
            line = orig_line;
            source_column = orig_column;
        }
        SourceMap {
            version: 3,
            file,
            source_root,
            sources: sources.to_vec(),
            names: Vec::new(),
            mappings,
        }
    }
}

/// Append one base64 VLQ value.
pub fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = vlq & 31;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 32;
        }
        out.push(BASE64[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(&mut out, value);
        out
    }

    fn span(file: u32, line: usize, column: usize) -> Span {
        Span {
            file: FileId(file),
            line,
            column,
            offset: 0,
        }
    }

    #[test]
    fn vlq_encoding() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(123), "2H");
    }

    #[test]
    fn mappings_are_delta_encoded() {
        let mut builder = SourceMapBuilder::default();
        builder.add(0, span(0, 1, 1));
        builder.add(0, span(0, 1, 5));
        builder.add(5, span(0, 2, 3));
        builder.add(9, span(1, 1, 1));
        builder.add(12, Span::dummy());
        assert_eq!(builder.mappings().len(), 3);

        let map = builder.build(&["a.less".into(), "b.less".into()], Some("out.css".into()), None);
        assert_eq!(map.mappings, "AAAA,KACE,ICDF");
        let json = map.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 3);
        assert_eq!(value["file"], "out.css");
        assert_eq!(value["sources"][1], "b.less");
        assert!(value.get("sourceRoot").is_none());
    }
}
