//! The dependence-closure engine.
//!
//! A worklist of `(kind, identifier, module)` triples is seeded with the
//! queried signal and drained to a fixed point. Each popped triple walks the
//! defining instructions of its identifier and gathers four dependence
//! classes: inter-module (through `Invoke` port bindings), explicit (use
//! sets), implicit (guard predicates found via post-dominance), and timing
//! (the trigger of the enclosing `always` block). Kind escalation is
//! monotone: once a path crosses a trigger it stays `Timing` downstream.
//!
//! Newly seen identifiers that are ports of their module are recorded as
//! leaks — except when they enter through a port binding itself, which is
//! leak-neutral: wiring `out` to `Inner.b` does not by itself make `b` a
//! leaking port, but anything feeding `b` inside `Inner` is.

use std::collections::BTreeSet;

use crate::ast::Identifier;
use crate::cfg::{BlockKind, Design, InstrRef, ModuleId};
use crate::dom;
use crate::error::{Error, Result};
use crate::instr::InstrKind;

/// Dependence channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DepKind {
    /// The *time* a value settles leaks, not the value itself.
    Timing,
    /// A conventional value dependency.
    Ordinary,
}

/// Worklist element. The derived order (module, then id, then kind) fixes
/// the traversal order and with it full determinism of the closure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Dependence {
    module: ModuleId,
    id: Identifier,
    kind: DepKind,
}

/// Leaking ports, as qualified `module.port` names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub timing: BTreeSet<String>,
    pub non_timing: BTreeSet<String>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.timing.is_empty() && self.non_timing.is_empty()
    }
}

/// One dependence query over the design.
#[derive(Debug, Default)]
pub struct DepAnalysis {
    workset: BTreeSet<Dependence>,
    seen: BTreeSet<Dependence>,
    /// Identifier projection of `seen`, for the port-binding intersection.
    seen_ids: BTreeSet<Identifier>,
    timing: BTreeSet<String>,
    non_timing: BTreeSet<String>,
}

impl DepAnalysis {
    /// Trace everything feeding `(module, id)` and return the leaking ports.
    ///
    /// Dominators are built lazily: for the queried module up front, and for
    /// any other module the first time the closure examines one of its
    /// instructions.
    pub fn compute(design: &mut Design, module: ModuleId, id: &str) -> Result<QueryResult> {
        let mut analysis = Self::default();

        dom::ensure_dominators(design.module_mut(module))?;

        let seed = Dependence {
            module,
            id: id.to_string(),
            kind: DepKind::Ordinary,
        };
        analysis.seen_ids.insert(seed.id.clone());
        analysis.seen.insert(seed.clone());
        analysis.workset.insert(seed);

        while let Some(dep) = analysis.workset.pop_first() {
            let def_refs: Vec<InstrRef> = design
                .module(dep.module)
                .def_instrs(&dep.id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();

            for r in def_refs {
                analysis.gather(design, r, &dep)?;
            }
        }

        Ok(QueryResult {
            timing: analysis.timing,
            non_timing: analysis.non_timing,
        })
    }

    /// Add identifiers under `kind` in `module`. A newly seen identifier
    /// that is a port of its module is recorded as a leak unless the caller
    /// asked for a silent add (port bindings).
    fn add_new_ids<I>(&mut self, design: &Design, ids: I, kind: DepKind, module: ModuleId, record: bool)
    where
        I: IntoIterator<Item = Identifier>,
    {
        for id in ids {
            let dep = Dependence { module, id, kind };
            if self.seen.contains(&dep) {
                continue;
            }
            if record && design.module(module).is_port(&dep.id) {
                let qualified = format!("{}.{}", design.module(module).name(), dep.id);
                match kind {
                    DepKind::Timing => self.timing.insert(qualified),
                    DepKind::Ordinary => self.non_timing.insert(qualified),
                };
            }
            self.seen_ids.insert(dep.id.clone());
            self.workset.insert(dep.clone());
            self.seen.insert(dep);
        }
    }

    /// Gather every dependence of one defining instruction.
    fn gather(&mut self, design: &mut Design, r: InstrRef, dep: &Dependence) -> Result<()> {
        let host = r.module;
        dom::ensure_dominators(design.module_mut(host))?;

        // (a) Inter-module dependencies through the instantiation site.
        if design.instr(r).as_invoke().is_some() {
            self.gather_inter_module(design, r, dep.kind)?;
        }

        // (b) Explicit dependencies.
        let uses: Vec<Identifier> = design.instr(r).uses().iter().cloned().collect();
        self.add_new_ids(design, uses, dep.kind, host, true);

        let m = design.module(host);
        let block = r.block;
        let entry = m.block(block).entry_block().ok_or_else(|| {
            Error::invariant(format!(
                "no entry block recorded for block {} in module {}",
                m.block(block).name(),
                m.name()
            ))
        })?;

        // (c) Implicit control dependencies: the block is guarded when it
        // does not post-dominate its entry, and every guard predicate feeds
        // the instruction.
        if !m.postdominates(block, entry)? {
            let mut guard_uses = Vec::new();
            for guard in m.guard_blocks(block)? {
                let cmpr = m.block(guard).comparison().ok_or_else(|| {
                    Error::invariant(format!(
                        "guard block {} in module {} has no terminal comparison",
                        m.block(guard).name(),
                        m.name()
                    ))
                })?;
                guard_uses.extend(cmpr.uses().iter().cloned());
            }
            self.add_new_ids(design, guard_uses, dep.kind, host, true);
        }

        // (d) Timing dependencies: triggered execution escalates to Timing.
        let m = design.module(host);
        if m.block(entry).kind() == BlockKind::Always {
            let first = m.block(entry).instrs().first().ok_or_else(|| {
                Error::invariant(format!("empty always block in module {}", m.name()))
            })?;
            let InstrKind::Trigger(ids) = first.kind() else {
                return Err(Error::invariant(format!(
                    "always block in module {} does not begin with a trigger",
                    m.name()
                )));
            };
            let ids: Vec<Identifier> = ids.iter().cloned().collect();
            self.add_new_ids(design, ids, DepKind::Timing, host, true);
        }

        Ok(())
    }

    /// Transfer taint through an instantiation: connections whose actuals
    /// are already part of the exploration taint the bound formal in the
    /// callee. The binding itself is leak-neutral, so the formals enter
    /// silently.
    fn gather_inter_module(&mut self, design: &mut Design, r: InstrRef, kind: DepKind) -> Result<()> {
        let (callee, formals) = {
            let Some(invoke) = design.instr(r).as_invoke() else {
                return Err(Error::invariant("gathering across a non-invoke instruction"));
            };
            let Some(callee) = invoke.callee else {
                // Unresolved module reference: warned at link time, carries
                // no dependency.
                return Ok(());
            };
            let formals: Vec<Identifier> = invoke
                .conns
                .iter()
                .filter(|conn| conn.ids.iter().any(|id| self.seen_ids.contains(id)))
                .filter_map(|conn| conn.formal.clone())
                .collect();
            (callee, formals)
        };

        if !formals.is_empty() {
            dom::ensure_dominators(design.module_mut(callee))?;
            self.add_new_ids(design, formals, kind, callee, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link;
    use crate::lower;
    use crate::parser;
    use std::path::PathBuf;

    fn build(src: &str) -> Design {
        let unit = parser::parse(&PathBuf::from("test.v"), src).expect("parse should succeed");
        let mut design = Design::new();
        for module in &unit.modules {
            lower::lower_module(&mut design, module).expect("lowering should succeed");
        }
        link::resolve_links(&mut design).expect("link resolution should succeed");
        design.build_def_use_chains();
        design.collect_undefined_ids();
        design
    }

    fn query(design: &mut Design, module: &str, id: &str) -> QueryResult {
        let module = design.lookup(module).expect("module exists");
        DepAnalysis::compute(design, module, id).expect("query should succeed")
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wire_through_dependency() {
        let mut design = build("module Id(input a, output b); assign b = a; endmodule");
        let result = query(&mut design, "Id", "b");
        assert_eq!(result.non_timing, set(&["Id.a"]));
        assert!(result.timing.is_empty());
    }

    #[test]
    fn clocked_register_has_timing_leak() {
        let mut design = build(
            "module Reg(input clk, input d, output reg q);\
             always @(posedge clk) q <= d;\
             endmodule",
        );
        let result = query(&mut design, "Reg", "q");
        assert_eq!(result.non_timing, set(&["Reg.d"]));
        assert_eq!(result.timing, set(&["Reg.clk"]));
    }

    #[test]
    fn guarded_assignment_leaks_the_guard() {
        let mut design = build(
            "module Leak(input clk, input secret, output reg out);\
             always @(posedge clk) if (secret) out <= 1; else out <= 0;\
             endmodule",
        );
        let result = query(&mut design, "Leak", "out");
        assert_eq!(result.non_timing, set(&["Leak.secret"]));
        assert_eq!(result.timing, set(&["Leak.clk"]));
    }

    #[test]
    fn port_binding_is_leak_neutral() {
        let mut design = build(
            "module Inner(input a, output b);\
             assign b = a;\
             endmodule\
             module Outer(input in, output out);\
             Inner i0(.a(in), .b(out));\
             endmodule",
        );
        let result = query(&mut design, "Outer", "out");
        // Inner.b is wired straight to the query target and must not count;
        // Inner.a transitively feeds it and must.
        assert_eq!(result.non_timing, set(&["Outer.in", "Inner.a"]));
        assert!(result.timing.is_empty());
    }

    #[test]
    fn undefined_identifier_contributes_nothing() {
        let mut design = build("module U(input a, output b); assign b = a | ghost; endmodule");
        let result = query(&mut design, "U", "b");
        assert_eq!(result.non_timing, set(&["U.a"]));
        let module = design.lookup("U").expect("module");
        assert!(
            design
                .module(module)
                .warnings()
                .undefined_ids
                .contains("ghost")
        );
    }

    #[test]
    fn timing_kind_is_monotone_downstream() {
        // q is clocked by c2, and c2 is itself computed inside an always
        // block triggered by c1: the c1 trigger is reached under Timing and
        // stays Timing.
        let mut design = build(
            "module Chain(input c1, input c2, input d, output reg q);\
             reg gate;\
             always @(posedge c1) gate <= d;\
             always @(posedge c2) if (gate) q <= d; else q <= 0;\
             endmodule",
        );
        let result = query(&mut design, "Chain", "q");
        assert!(result.timing.contains("Chain.c2"));
        // gate feeds q through the guard; its own clock arrives as timing.
        assert!(result.timing.contains("Chain.c1"));
        assert!(result.non_timing.contains("Chain.d"));
    }

    #[test]
    fn query_is_idempotent_and_deterministic() {
        let src = "module Mux(input s, input x, input y, output z);\
                   assign z = s ? x : y;\
                   endmodule";
        let mut design = build(src);
        let first = query(&mut design, "Mux", "z");
        let second = query(&mut design, "Mux", "z");
        assert_eq!(first, second);

        let mut other = build(src);
        assert_eq!(first, query(&mut other, "Mux", "z"));
    }
}
