mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use less_core::{CompileOptions, Compiler};
use std::fs;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            input,
            output,
            source_map,
            config,
            max_depth,
        } => build(&input, output.as_deref(), source_map.as_deref(), config.as_deref(), max_depth),
    }
}

fn build(
    input: &Path,
    output: Option<&Path>,
    source_map: Option<&Path>,
    config: Option<&Path>,
    max_depth: Option<usize>,
) -> Result<()> {
    let options = match config {
        Some(path) => CompileOptions::load(path)?,
        None => CompileOptions::default(),
    };
    let options = apply_flags(options, output, source_map, max_depth);

    let compiled = Compiler::new(options)
        .compile(input)
        .with_context(|| format!("failed to compile {}", input.display()))?;
    debug!(files = compiled.imports.len(), "read input files");

    let mut css = compiled.css;
    if let Some(map) = source_map.filter(|_| !compiled.source_map.is_empty()) {
        fs::write(map, &compiled.source_map)
            .with_context(|| format!("failed to write {}", map.display()))?;
        if let Some(name) = file_name(map) {
            css.push_str(&format!("\n/*# sourceMappingURL={} */", name));
        }
    }

    match output {
        Some(path) => {
            fs::write(path, css).with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => println!("{}", css),
    }
    Ok(())
}

/// Command-line flags win over the options file, but only when given.
fn apply_flags(
    mut options: CompileOptions,
    output: Option<&Path>,
    source_map: Option<&Path>,
    max_depth: Option<usize>,
) -> CompileOptions {
    if let Some(depth) = max_depth {
        options.max_mixin_depth = depth;
    }
    if source_map.is_some() {
        options.source_map = true;
    }
    if options.source_map_file.is_none() {
        options.source_map_file = output.and_then(file_name);
    }
    options
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_file_is_kept_without_flags() {
        let options = CompileOptions::from_json(r#"{ "source_map": false, "max_mixin_depth": 7 }"#).unwrap();
        let options = apply_flags(options, None, None, None);
        assert!(!options.source_map);
        assert_eq!(options.max_mixin_depth, 7);
    }

    #[test]
    fn flags_override_options_file() {
        let options = CompileOptions::from_json(r#"{ "source_map": false }"#).unwrap();
        let options = apply_flags(
            options,
            Some(Path::new("out/site.css")),
            Some(Path::new("out/site.css.map")),
            Some(50),
        );
        assert!(options.source_map);
        assert_eq!(options.max_mixin_depth, 50);
        assert_eq!(options.source_map_file.as_deref(), Some("site.css"));
    }
}
