use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lessc")]
#[command(about = "Compile LESS stylesheets to CSS")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug)]
pub enum Commands {
    /// Compile one entry file and everything it imports.
    Build {
        input: PathBuf,
        /// CSS output path; prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write a source map to this path.
        #[arg(long, value_name = "MAP")]
        source_map: Option<PathBuf>,
        /// JSON file with compiler options.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the mixin recursion limit.
        #[arg(long)]
        max_depth: Option<usize>,
    },
}
