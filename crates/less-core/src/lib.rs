//! LESS to CSS compiler.
//!
//! A compile runs four passes over one shared arena:
//! tokenize and parse (imports inlined in place), link (extends), then
//! print, which evaluates values and expands mixins while streaming CSS.
//!
//! ```no_run
//! let output = less_core::parse("styles/main.less")?;
//! println!("{}", output.css);
//! # Ok::<(), less_core::LessError>(())
//! ```

pub mod ast;
pub mod color;
pub mod config;
pub mod emitter;
pub mod error;
pub mod functions;
pub mod linker;
pub mod loader;
pub mod math;
pub mod mixin;
pub mod parser;
pub mod resolver;
pub mod selector;
pub mod sourcemap;
pub mod token;
pub mod tokenizer;

pub use config::CompileOptions;
pub use error::{LessError, Location, Result, ValueError};
pub use loader::{FileReader, FsReader};

use ast::Stylesheet;
use resolver::Evaluator;
use sourcemap::SourceMapBuilder;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::info;

/// Stack reserved per nested mixin expansion, with room for unoptimized
/// builds.
const STACK_PER_EXPANSION: usize = 24 * 1024;
const BASE_STACK: usize = 2 * 1024 * 1024;

/// Result of a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub css: String,
    /// Source map JSON; empty when source maps are disabled.
    pub source_map: String,
    /// Every file read, entry file first.
    pub imports: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn compile(&self, path: impl AsRef<Path>) -> Result<Output> {
        self.compile_using(&FsReader, path)
    }

    /// Compile with files supplied by `reader` instead of the filesystem.
    pub fn compile_using<R: FileReader>(&self, reader: &R, path: impl AsRef<Path>) -> Result<Output> {
        let path = path.as_ref();
        let sheet = parser::parse(reader, path)?;

        let (css, mappings) = self.print(&sheet)?;

        let source_map = if self.options.source_map {
            mappings
                .build(
                    &sheet.files,
                    self.options.source_map_file.clone(),
                    self.options.source_root.clone(),
                )
                .to_json()?
        } else {
            String::new()
        };

        info!(path = %path.display(), bytes = css.len(), files = sheet.imports.len(), "compiled");
        Ok(Output {
            css,
            source_map,
            imports: sheet.imports,
        })
    }

    /// Link and print on a thread whose stack holds `max_mixin_depth`
    /// nested expansions, so runaway recursion ends in
    /// [`LessError::RecursionLimit`] whatever stack the caller runs on.
    fn print(&self, sheet: &Stylesheet) -> Result<(String, SourceMapBuilder)> {
        let depth = self.options.max_mixin_depth;
        let stack_size = STACK_PER_EXPANSION
            .saturating_mul(depth)
            .saturating_add(BASE_STACK);
        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name("less-print".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, move || {
                    let mut eval = Evaluator::new(sheet);
                    let links = linker::link(&mut eval)?;
                    emitter::print(eval, &links, depth)
                })
                .map_err(LessError::Thread)?;
            handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    }
}

/// Compile a file from disk with default options.
pub fn parse(path: impl AsRef<Path>) -> Result<Output> {
    Compiler::default().compile(path)
}

/// Compile with files supplied by `reader`.
pub fn parse_using<R: FileReader>(reader: &R, path: impl AsRef<Path>) -> Result<Output> {
    Compiler::default().compile_using(reader, path)
}
