//! Interactive query prompt.
//!
//! A line of the form `<module>.<port>` runs a dependence query; `quit`
//! exits. Tab completion first offers module names (appending the `.`
//! separator), then port names of the chosen module, both matched by
//! case-insensitive prefix.

use rustyline::Editor;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;

use crate::Analyzer;
use crate::status;

/// Completion data snapshot: module name plus its port names.
pub struct QueryCompleter {
    modules: Vec<(String, Vec<String>)>,
}

impl QueryCompleter {
    fn new(analyzer: &Analyzer) -> Self {
        let modules = analyzer
            .modules()
            .map(|name| {
                let ports = analyzer.ports(name).unwrap_or_default();
                (name.to_string(), ports)
            })
            .collect();
        Self { modules }
    }

    fn matches(&self, text: &str) -> Vec<String> {
        match text.split_once('.') {
            None => {
                let prefix = text.to_lowercase();
                self.modules
                    .iter()
                    .filter(|(name, _)| name.to_lowercase().starts_with(&prefix))
                    .map(|(name, _)| format!("{name}."))
                    .collect()
            }
            Some((module, field)) => {
                let Some((name, ports)) = self.modules.iter().find(|(name, _)| name == module)
                else {
                    return Vec::new();
                };
                let prefix = field.to_lowercase();
                ports
                    .iter()
                    .filter(|port| port.to_lowercase().starts_with(&prefix))
                    .map(|port| format!("{name}.{port}"))
                    .collect()
            }
        }
    }
}

impl Completer for QueryCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok((0, self.matches(&line[..pos])))
    }
}

impl Hinter for QueryCompleter {
    type Hint = String;
}

impl Highlighter for QueryCompleter {}
impl Validator for QueryCompleter {}
impl rustyline::Helper for QueryCompleter {}

/// Run the prompt loop until `quit` or end of input.
pub fn run(analyzer: &mut Analyzer) -> anyhow::Result<()> {
    let mut editor: Editor<QueryCompleter, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(QueryCompleter::new(analyzer)));

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    return Ok(());
                }
                let _ = editor.add_history_entry(line);
                process_line(analyzer, line);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

fn process_line(analyzer: &mut Analyzer, line: &str) {
    let Some((module, field)) = line.split_once('.') else {
        status::warn(&format!("need <module>.<port>, found '{line}'"));
        return;
    };

    match analyzer.query(module, field) {
        Ok(result) => {
            if result.is_empty() {
                status::update("did not find any leakage.\n");
                return;
            }
            if !result.timing.is_empty() {
                status::underline("found timing leak:");
                status::dump_set(&result.timing);
            }
            if !result.non_timing.is_empty() {
                status::underline("found non-timing leak:");
                status::dump_set(&result.non_timing);
            }
        }
        Err(err) => status::warn(&err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completer() -> QueryCompleter {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source(
                "test.v",
                "module Counter(input clk, input rst, output reg [3:0] count);\
                 always @(posedge clk) count <= rst ? 0 : count + 1;\
                 endmodule\
                 module Checker(input x, output y);\
                 assign y = x;\
                 endmodule",
            )
            .expect("analysis should succeed");
        QueryCompleter::new(&analyzer)
    }

    #[test]
    fn completes_module_names_with_separator() {
        let completer = completer();
        assert_eq!(completer.matches("Cou"), vec!["Counter."]);
        // Case-insensitive prefix, offered in design order.
        assert_eq!(completer.matches("c"), vec!["Counter.", "Checker."]);
    }

    #[test]
    fn completes_port_names_after_separator() {
        let completer = completer();
        assert_eq!(completer.matches("Counter.c"), vec!["Counter.clk", "Counter.count"]);
        assert_eq!(completer.matches("Counter.r"), vec!["Counter.rst"]);
    }

    #[test]
    fn unknown_module_completes_nothing() {
        let completer = completer();
        assert!(completer.matches("Ghost.x").is_empty());
    }
}
