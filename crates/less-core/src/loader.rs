use crate::error::{LessError, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Source of stylesheet bytes. The filesystem is one implementation; any
/// `Fn(&Path) -> io::Result<Vec<u8>>` is another, which is how tests and
/// in-memory archives feed the compiler.
pub trait FileReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl<F> FileReader for F
where
    F: Fn(&Path) -> io::Result<Vec<u8>>,
{
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self(path)
    }
}

/// Reads from the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

/// Options in `@import (less, optional) "file";`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub less: bool,
    pub css: bool,
    pub inline: bool,
    pub reference: bool,
    pub optional: bool,
    pub multiple: bool,
}

impl ImportOptions {
    pub fn set(&mut self, keyword: &str) -> bool {
        match keyword {
            "less" => self.less = true,
            "css" => self.css = true,
            "inline" => self.inline = true,
            "reference" => self.reference = true,
            "optional" => self.optional = true,
            "multiple" => self.multiple = true,
            "once" => self.multiple = false,
            _ => return false,
        }
        true
    }
}

/// Tracks which files are being parsed (for cycle detection) and which
/// were already imported (so each is inlined once).
pub struct Loader<'r> {
    reader: &'r dyn FileReader,
    visited: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
    imports: Vec<PathBuf>,
}

impl<'r> Loader<'r> {
    pub fn new(reader: &'r dyn FileReader) -> Self {
        Self {
            reader,
            visited: HashSet::new(),
            stack: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Start parsing `path`. Returns `None` when the file should be skipped:
    /// already imported (unless `multiple`) or missing with `optional`.
    pub fn enter(&mut self, path: &Path, options: ImportOptions) -> Result<Option<String>> {
        if self.stack.iter().any(|p| p == path) {
            let mut chain = self.stack.clone();
            chain.push(path.to_path_buf());
            return Err(LessError::CyclicImport { chain });
        }

        if self.visited.contains(path) && !options.multiple {
            debug!(path = %path.display(), "skipping already imported file");
            return Ok(None);
        }

        let data = match self.reader.read(path) {
            Ok(data) => data,
            Err(e) if options.optional && e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "optional import not found");
                return Ok(None);
            }
            Err(source) => {
                return Err(LessError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let source = String::from_utf8(data).map_err(|_| LessError::Encoding {
            path: path.to_path_buf(),
        })?;

        self.stack.push(path.to_path_buf());
        if self.visited.insert(path.to_path_buf()) {
            self.imports.push(path.to_path_buf());
        }
        Ok(Some(source))
    }

    pub fn leave(&mut self) {
        self.stack.pop();
    }

    /// Read a file verbatim for `(inline)` imports, without parsing it.
    pub fn read_inline(&mut self, path: &Path, optional: bool) -> Result<Option<String>> {
        match self.reader.read(path) {
            Ok(data) => {
                if self.visited.insert(path.to_path_buf()) {
                    self.imports.push(path.to_path_buf());
                }
                String::from_utf8(data)
                    .map(Some)
                    .map_err(|_| LessError::Encoding {
                        path: path.to_path_buf(),
                    })
            }
            Err(e) if optional && e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LessError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn into_imports(self) -> Vec<PathBuf> {
        self.imports
    }
}

/// Resolve an import target against the importing file's directory,
/// defaulting the extension to `.less`.
pub fn resolve_import(current: &Path, target: &str) -> PathBuf {
    let base = current.parent().unwrap_or_else(|| Path::new(""));
    let mut path = base.join(target);
    if path.extension().is_none() {
        path.set_extension("less");
    }
    normalize(&path)
}

/// Lexically remove `.` and `..` components. The reader may not be backed
/// by a real filesystem, so paths are never canonicalized.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fixture_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/imports")
    }

    #[test]
    fn resolves_relative_to_importer_with_default_extension() {
        let got = resolve_import(Path::new("styles/main.less"), "../shared/vars");
        assert_eq!(got, PathBuf::from("shared/vars.less"));
        let got = resolve_import(Path::new("main.less"), "theme.css");
        assert_eq!(got, PathBuf::from("theme.css"));
    }

    #[test]
    fn skip_duplicate_imports() {
        let path = fixture_dir().join("a.less");
        let mut loader = Loader::new(&FsReader);
        assert!(loader.enter(&path, ImportOptions::default()).unwrap().is_some());
        loader.leave();
        assert!(loader.enter(&path, ImportOptions::default()).unwrap().is_none());
        let multiple = ImportOptions {
            multiple: true,
            ..ImportOptions::default()
        };
        assert!(loader.enter(&path, multiple).unwrap().is_some());
        assert_eq!(loader.into_imports(), vec![path]);
    }

    #[test]
    fn detect_cycles() {
        let files: HashMap<PathBuf, Vec<u8>> = [
            (PathBuf::from("a.less"), b"@import 'b';".to_vec()),
            (PathBuf::from("b.less"), b"@import 'a';".to_vec()),
        ]
        .into_iter()
        .collect();
        let reader = move |p: &Path| -> io::Result<Vec<u8>> {
            files
                .get(p)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        };
        let mut loader = Loader::new(&reader);
        loader
            .enter(Path::new("a.less"), ImportOptions::default())
            .unwrap();
        loader
            .enter(Path::new("b.less"), ImportOptions::default())
            .unwrap();
        let err = loader
            .enter(Path::new("a.less"), ImportOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("a.less -> b.less -> a.less"));
    }

    #[test]
    fn missing_file_error() {
        let path = fixture_dir().join("missing.less");
        let mut loader = Loader::new(&FsReader);
        let err = loader.enter(&path, ImportOptions::default()).unwrap_err();
        assert!(err.to_string().contains("failed to read"));

        let optional = ImportOptions {
            optional: true,
            ..ImportOptions::default()
        };
        assert!(loader.enter(&path, optional).unwrap().is_none());
    }

    #[test]
    fn import_option_keywords() {
        let mut options = ImportOptions::default();
        assert!(options.set("reference"));
        assert!(options.set("optional"));
        assert!(!options.set("bogus"));
        assert!(options.reference && options.optional);
    }
}
