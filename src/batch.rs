//! JSON batch driver.
//!
//! Input: `{ "sources": [path, ...], "signals": [{"module": M, "field": F},
//! ...] }`, where a `field` ending in `*` means "every port with this
//! prefix" (case-insensitive, like the interactive completer). Output: one
//! report per expanded signal, in input order, printed as a JSON array.
//! Signals that fail to resolve produce an entry with empty leak arrays
//! rather than aborting the run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Analyzer;
use crate::error::Result;
use crate::status;

/// Parsed batch specification.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSpec {
    pub sources: Vec<PathBuf>,
    pub signals: Vec<SignalSpec>,
}

/// One requested signal, possibly a `prefix*` wildcard.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalSpec {
    pub module: String,
    pub field: String,
}

/// Result entry for one expanded signal.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignalReport {
    pub module: String,
    pub field: String,
    pub timing: Vec<String>,
    pub non_timing: Vec<String>,
}

/// Probe whether `path` holds a batch spec. Files that are not JSON objects
/// with the expected shape are treated as Verilog sources by the caller.
pub fn try_load_spec(path: &Path) -> Option<BatchSpec> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Load a spec, failing loudly; used by the explicit `--batch` flag.
pub fn load_spec(path: &Path) -> Result<BatchSpec> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Analyze the spec's sources and trace every requested signal.
pub fn run(analyzer: &mut Analyzer, spec: &BatchSpec) -> Result<Vec<SignalReport>> {
    analyzer.analyze_files(&spec.sources)?;

    let mut reports = Vec::new();
    for signal in &spec.signals {
        for field in expand_field(analyzer, signal) {
            reports.push(trace_one(analyzer, &signal.module, &field));
        }
    }
    Ok(reports)
}

/// Expand a trailing-`*` field against the module's ports; a plain field
/// passes through untouched.
fn expand_field(analyzer: &Analyzer, signal: &SignalSpec) -> Vec<String> {
    let Some(prefix) = signal.field.strip_suffix('*') else {
        return vec![signal.field.clone()];
    };

    let ports = match analyzer.ports(&signal.module) {
        Ok(ports) => ports,
        Err(err) => {
            status::warn(&err.to_string());
            return Vec::new();
        }
    };

    let prefix = prefix.to_lowercase();
    ports
        .into_iter()
        .filter(|port| port.to_lowercase().starts_with(&prefix))
        .collect()
}

fn trace_one(analyzer: &mut Analyzer, module: &str, field: &str) -> SignalReport {
    match analyzer.query(module, field) {
        Ok(result) => SignalReport {
            module: module.to_string(),
            field: field.to_string(),
            timing: result.timing.into_iter().collect(),
            non_timing: result.non_timing.into_iter().collect(),
        },
        Err(err) => {
            status::warn(&err.to_string());
            SignalReport {
                module: module.to_string(),
                field: field.to_string(),
                timing: Vec::new(),
                non_timing: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source(
                "mux.v",
                "module Mux(input sel, input s_a, input s_b, output z);\
                 assign z = sel ? s_a : s_b;\
                 endmodule",
            )
            .expect("analysis should succeed");
        analyzer
    }

    #[test]
    fn plain_field_passes_through() {
        let analyzer = analyzer();
        let signal = SignalSpec {
            module: "Mux".into(),
            field: "z".into(),
        };
        assert_eq!(expand_field(&analyzer, &signal), vec!["z"]);
    }

    #[test]
    fn wildcard_expands_case_insensitively() {
        let analyzer = analyzer();
        let signal = SignalSpec {
            module: "Mux".into(),
            field: "S_*".into(),
        };
        assert_eq!(expand_field(&analyzer, &signal), vec!["s_a", "s_b"]);
    }

    #[test]
    fn unknown_signal_yields_empty_report() {
        let mut analyzer = analyzer();
        let report = trace_one(&mut analyzer, "Mux", "nope");
        assert!(report.timing.is_empty());
        assert!(report.non_timing.is_empty());
    }

    #[test]
    fn trace_reports_leaks() {
        let mut analyzer = analyzer();
        let report = trace_one(&mut analyzer, "Mux", "z");
        assert_eq!(report.non_timing, vec!["Mux.s_a", "Mux.s_b", "Mux.sel"]);
        assert!(report.timing.is_empty());
    }

    #[test]
    fn spec_deserializes() {
        let spec: BatchSpec = serde_json::from_str(
            r#"{ "sources": ["a.v"], "signals": [{ "module": "M", "field": "q*" }] }"#,
        )
        .expect("spec should deserialize");
        assert_eq!(spec.sources, vec![PathBuf::from("a.v")]);
        assert_eq!(spec.signals[0].field, "q*");
    }
}
