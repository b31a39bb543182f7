use clap::Parser;
use std::path::PathBuf;

/// verileak CLI options.
#[derive(Debug, Parser)]
#[command(
    name = "verileak",
    version,
    about = "Trace timing and value information flows through Verilog designs"
)]
pub struct Args {
    /// Verilog source files; alternatively a single JSON batch spec.
    #[arg(value_name = "FILE", required_unless_present = "batch")]
    pub files: Vec<PathBuf>,

    /// Run the JSON batch driver on the given spec instead of the REPL.
    ///
    /// The spec has the shape
    /// `{ "sources": [...], "signals": [{"module": M, "field": F}, ...] }`;
    /// a `field` ending in `*` expands to every port with that prefix.
    #[arg(long, value_name = "SPEC", conflicts_with = "files")]
    pub batch: Option<PathBuf>,

    /// Suppress the progress status line on stderr.
    #[arg(long)]
    pub quiet: bool,
}
