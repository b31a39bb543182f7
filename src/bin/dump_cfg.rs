//! CFG dumping tool for debugging the lowering pass.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use verileak::{Analyzer, telemetry};

fn main() -> ExitCode {
    telemetry::init_tracing();

    let files: Vec<PathBuf> = env::args().skip(1).map(PathBuf::from).collect();
    if files.is_empty() {
        eprintln!("Usage: dump-cfg <file.v>...");
        return ExitCode::from(1);
    }

    let mut analyzer = Analyzer::new();
    if let Err(err) = analyzer.analyze_files(&files) {
        eprintln!("{err}");
        return ExitCode::from(2);
    }
    if analyzer.module_count() == 0 {
        eprintln!("no module survived parsing");
        return ExitCode::from(2);
    }

    for module in analyzer.design().modules() {
        println!("{module}");
    }
    ExitCode::SUCCESS
}
