use std::process::ExitCode;

use clap::Parser;
use verileak::cli::Args;
use verileak::{Analyzer, batch, repl, status, telemetry};

fn main() -> ExitCode {
    telemetry::init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            status::fatal(&format!("{err:#}"));
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help/--version exit cleanly; everything else is wrong usage.
            let clean = err.exit_code() == 0;
            let _ = err.print();
            return Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }
    };
    status::set_quiet(args.quiet);

    if let Some(path) = &args.batch {
        let spec = batch::load_spec(path)?;
        return run_batch(&spec);
    }

    // A single input that parses as a JSON spec selects batch mode, like
    // passing it via --batch.
    if args.files.len() == 1 {
        if let Some(spec) = batch::try_load_spec(&args.files[0]) {
            return run_batch(&spec);
        }
    }

    let mut analyzer = Analyzer::new();
    analyzer.analyze_files(&args.files)?;
    if analyzer.module_count() == 0 {
        status::fatal("no module survived parsing");
        return Ok(ExitCode::from(2));
    }

    repl::run(&mut analyzer)?;
    Ok(ExitCode::SUCCESS)
}

fn run_batch(spec: &batch::BatchSpec) -> anyhow::Result<ExitCode> {
    let mut analyzer = Analyzer::new();
    let reports = batch::run(&mut analyzer, spec)?;
    if analyzer.module_count() == 0 {
        status::fatal("no module survived parsing");
        return Ok(ExitCode::from(2));
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(ExitCode::SUCCESS)
}
