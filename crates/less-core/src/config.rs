use crate::error::{LessError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Compiler options. Every field has a default, so an options file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Nested mixin expansions allowed before compilation fails.
    pub max_mixin_depth: usize,
    pub source_map: bool,
    /// Value of the map's `file` field, usually the CSS file name.
    pub source_map_file: Option<String>,

    #[serde(rename = "sourceRoot")]
    pub source_root: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_mixin_depth: 1000,
            source_map: true,
            source_map_file: None,
            source_root: None,
        }
    }
}

impl CompileOptions {
    /// Load options from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| LessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data).map_err(|e| LessError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_missing_keys() {
        let options = CompileOptions::from_json(r#"{ "max_mixin_depth": 50 }"#).unwrap();
        assert_eq!(options.max_mixin_depth, 50);
        assert!(options.source_map);
        assert_eq!(options.source_root, None);
    }

    #[test]
    fn source_root_uses_source_map_spelling() {
        let options = CompileOptions::from_json(r#"{ "sourceRoot": "/src" }"#).unwrap();
        assert_eq!(options.source_root.as_deref(), Some("/src"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "source_map": false, "source_map_file": "out.css" }}"#).unwrap();
        let options = CompileOptions::load(file.path()).unwrap();
        assert!(!options.source_map);
        assert_eq!(options.source_map_file.as_deref(), Some("out.css"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "colour": "red" }}"#).unwrap();
        let err = CompileOptions::load(file.path()).unwrap_err();
        assert!(matches!(err, LessError::Config { .. }));
    }
}
