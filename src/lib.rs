//! Static information-flow analyzer for Verilog designs.
//!
//! Given a set of source files and a query of the form `<module>.<port>`,
//! the analyzer reports which module ports the queried signal depends on,
//! split into *timing* channels (the time at which a value settles) and
//! *non-timing* channels (the value itself). The pipeline is: parse →
//! lower to a control-flow graph of def/use-carrying instructions →
//! resolve instantiation links → index def-use chains → run the
//! dependence closure, with dominator trees built lazily per module.

pub mod ast;
pub mod batch;
pub mod cfg;
pub mod cli;
pub mod dep;
pub mod dom;
pub mod error;
pub mod ids;
pub mod instr;
pub mod lexer;
pub mod link;
pub mod lower;
pub mod parser;
pub mod repl;
pub mod status;
pub mod telemetry;

use std::path::{Path, PathBuf};

use crate::cfg::Design;
use crate::dep::DepAnalysis;

pub use crate::dep::QueryResult;
pub use crate::error::{Error, Result};

/// Analysis engine: owns the design and answers dependence queries.
pub struct Analyzer {
    design: Design,
    failed_files: Vec<(PathBuf, Error)>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            design: Design::new(),
            failed_files: Vec::new(),
        }
    }

    /// Load, lower, resolve, and index the given source files.
    ///
    /// A file that fails to read or parse is reported and skipped; the
    /// caller decides whether "no module survived" is fatal (the CLI exits
    /// with code 2). Model-invariant violations abort the analysis.
    pub fn analyze_files(&mut self, files: &[PathBuf]) -> Result<()> {
        let total = files.len();
        for (index, path) in files.iter().enumerate() {
            status::update(&format!(
                "analyzing input files [ {:3} of {:3} ] ... ",
                index + 1,
                total
            ));
            let source = match std::fs::read_to_string(path) {
                Ok(source) => source,
                Err(err) => {
                    status::warn(&format!("{}: {err}", path.display()));
                    self.failed_files.push((path.clone(), err.into()));
                    continue;
                }
            };
            self.ingest(path, &source)?;
        }
        status::clear();
        self.finalize()
    }

    /// Analyze an in-memory source string (used by tests and tooling).
    pub fn analyze_source(&mut self, name: &str, source: &str) -> Result<()> {
        self.ingest(Path::new(name), source)?;
        self.finalize()
    }

    /// Parse one file and lower every module it defines, in order.
    fn ingest(&mut self, path: &Path, source: &str) -> Result<()> {
        let unit = match parser::parse(path, source) {
            Ok(unit) => unit,
            Err(err) => {
                status::warn(&err.to_string());
                self.failed_files.push((path.to_path_buf(), err));
                return Ok(());
            }
        };
        for module in &unit.modules {
            lower::lower_module(&mut self.design, module)?;
        }
        Ok(())
    }

    /// Resolve links and (re)build the def-use index; both are idempotent.
    fn finalize(&mut self) -> Result<()> {
        status::update("building def-use chains ... ");
        link::resolve_links(&mut self.design)?;
        self.design.build_def_use_chains();
        self.design.collect_undefined_ids();
        status::clear();
        Ok(())
    }

    /// Trace `(module, id)` and return the leaking ports.
    pub fn query(&mut self, module: &str, id: &str) -> Result<QueryResult> {
        let module_id = self
            .design
            .lookup(module)
            .ok_or_else(|| Error::UnknownModule(module.to_string()))?;
        if !self.design.module(module_id).knows_id(id) {
            return Err(Error::UnknownId {
                module: module.to_string(),
                id: id.to_string(),
            });
        }
        DepAnalysis::compute(&mut self.design, module_id, id)
    }

    /// Port names of `module`, for completion and wildcard expansion.
    pub fn ports(&self, module: &str) -> Result<Vec<String>> {
        let module_id = self
            .design
            .lookup(module)
            .ok_or_else(|| Error::UnknownModule(module.to_string()))?;
        Ok(self
            .design
            .module(module_id)
            .ports()
            .iter()
            .cloned()
            .collect())
    }

    /// Module names in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.design.modules().map(|m| m.name())
    }

    pub fn module_count(&self) -> usize {
        self.design.module_count()
    }

    /// Files that failed to read or parse during [`Self::analyze_files`].
    pub fn failed_files(&self) -> &[(PathBuf, Error)] {
        &self.failed_files
    }

    /// Read-only view of the lowered design (used by the CFG dump tool and
    /// the test suite).
    pub fn design(&self) -> &Design {
        &self.design
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_and_query_in_memory() {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source("id.v", "module Id(input a, output b); assign b = a; endmodule")
            .expect("analysis should succeed");
        let result = analyzer.query("Id", "b").expect("query should succeed");
        assert!(result.non_timing.contains("Id.a"));
        assert!(result.timing.is_empty());
    }

    #[test]
    fn unknown_module_is_usage_error() {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source("m.v", "module m(input a); endmodule")
            .expect("analysis should succeed");
        assert!(matches!(
            analyzer.query("nope", "x"),
            Err(Error::UnknownModule(_))
        ));
        assert!(matches!(
            analyzer.query("m", "nope"),
            Err(Error::UnknownId { .. })
        ));
    }

    #[test]
    fn ports_listed_for_completion() {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source(
                "m.v",
                "module m(input clk, input d, output q); assign q = d; endmodule",
            )
            .expect("analysis should succeed");
        let ports = analyzer.ports("m").expect("ports should resolve");
        assert_eq!(ports, vec!["clk", "d", "q"]);
    }

    #[test]
    fn querying_internal_signals_is_allowed() {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source(
                "m.v",
                "module m(input a, output b);\
                 wire t;\
                 assign t = a;\
                 assign b = t;\
                 endmodule",
            )
            .expect("analysis should succeed");
        let result = analyzer.query("m", "t").expect("query should succeed");
        assert!(result.non_timing.contains("m.a"));
    }
}
