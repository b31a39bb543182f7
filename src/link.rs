//! Link resolution: matching `Invoke` instructions against the invoked
//! module's formal port directions.
//!
//! Directions are encoded from the caller's perspective, so the flags flip at
//! the boundary: a port the callee *drives* (`USE`) defines the caller's
//! actual, and a port the callee *reads* (`DEF`) uses the caller's actuals.
//! Each resolved connection installs two edges, one in the caller's view
//! (the `Invoke`'s own def/use sets, picked up by the def-use index build)
//! and one directly in the callee's index, so the dependence closure can walk
//! through the call site in either direction.

use crate::cfg::{Design, InstrRef, ModuleId};
use crate::error::{Error, Result};
use crate::ids::Role;
use crate::instr::InstrKind;

/// Resolve every `Invoke` in the design. Idempotent: a second run installs
/// the identical edges.
pub fn resolve_links(design: &mut Design) -> Result<()> {
    for caller in design.module_ids().collect::<Vec<_>>() {
        let invokes = collect_invokes(design, caller);
        for r in invokes {
            resolve_invoke(design, r)?;
        }
    }
    Ok(())
}

fn collect_invokes(design: &Design, module: ModuleId) -> Vec<InstrRef> {
    let m = design.module(module);
    let mut refs = Vec::new();
    for &block in m.listed_blocks() {
        for (slot, instr) in m.block(block).instrs().iter().enumerate() {
            if instr.as_invoke().is_some() {
                refs.push(InstrRef {
                    module,
                    block,
                    instr: slot,
                });
            }
        }
    }
    refs
}

fn resolve_invoke(design: &mut Design, r: InstrRef) -> Result<()> {
    let caller = r.module;
    let Some(invoke) = design.instr(r).as_invoke() else {
        return Err(Error::invariant("resolving a non-invoke instruction"));
    };
    let (callee_name, conn_count) = (invoke.module.clone(), invoke.conns.len());

    let Some(callee) = design.lookup(&callee_name) else {
        tracing::warn!(
            module = design.module(caller).name(),
            referenced = callee_name.as_str(),
            "reference to undefined module"
        );
        design
            .module_mut(caller)
            .warnings
            .unresolved_modules
            .insert(callee_name);
        return Ok(());
    };

    if let InstrKind::Invoke(invoke) = design.module_mut(caller).instr_mut(r).kind_mut() {
        invoke.callee = Some(callee);
    }

    for idx in 0..conn_count {
        resolve_connection(design, r, caller, callee, idx)?;
    }
    Ok(())
}

fn resolve_connection(
    design: &mut Design,
    r: InstrRef,
    caller: ModuleId,
    callee: ModuleId,
    idx: usize,
) -> Result<()> {
    let Some(invoke) = design.instr(r).as_invoke() else {
        return Err(Error::invariant("resolving a non-invoke instruction"));
    };
    let conn = &invoke.conns[idx];
    let ids: Vec<String> = conn.ids.iter().cloned().collect();

    // Positional connections are matched against the callee's declared
    // port order.
    let formal = match conn.formal.clone() {
        Some(formal) => formal,
        None => match design.module(callee).port_order().get(idx) {
            Some(formal) => formal.clone(),
            None => {
                tracing::warn!(
                    module = design.module(caller).name(),
                    callee = design.module(callee).name(),
                    position = idx,
                    "positional connection beyond the callee's port list"
                );
                return Ok(());
            }
        },
    };

    let role = design.module(callee).port_role(&formal);

    if let InstrKind::Invoke(invoke) = design.module_mut(caller).instr_mut(r).kind_mut() {
        let conn = &mut invoke.conns[idx];
        conn.formal = Some(formal.clone());
        conn.role = role;
    }

    if role.is_empty() {
        tracing::warn!(
            module = design.module(callee).name(),
            port = formal.as_str(),
            "connection to a port with unknown direction carries no dependency"
        );
        design
            .module_mut(callee)
            .warnings
            .unknown_direction_ports
            .insert(formal);
        return Ok(());
    }

    if role.contains(Role::USE) {
        // The pin is driven by the callee: the actual receives a def in the
        // caller, and the formal is used by the invocation in the callee.
        if ids.len() > 1 {
            return Err(Error::invariant(format!(
                "connection to output port {}.{} would define {} identifiers at once",
                design.module(callee).name(),
                formal,
                ids.len()
            )));
        }
        if let Some(id) = ids.first() {
            design
                .module_mut(caller)
                .instr_mut(r)
                .add_def(id.clone());
            design.module_mut(callee).add_use(formal.clone(), r);
        }
    }

    if role.contains(Role::DEF) {
        // The pin is read by the callee: every actual identifier is a use in
        // the caller, and the formal is defined by the invocation.
        for id in &ids {
            design.module_mut(caller).instr_mut(r).add_use(id.clone());
        }
        design.module_mut(callee).add_def(formal, r);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Design;
    use crate::instr::IdSet;
    use crate::lower;
    use crate::parser;
    use std::path::PathBuf;

    fn build(src: &str) -> Design {
        let unit = parser::parse(&PathBuf::from("test.v"), src).expect("parse should succeed");
        let mut design = Design::new();
        for module in &unit.modules {
            lower::lower_module(&mut design, module).expect("lowering should succeed");
        }
        resolve_links(&mut design).expect("link resolution should succeed");
        design.build_def_use_chains();
        design
    }

    const TWO_LEVEL: &str = "module Inner(input a, output b);\
                             assign b = a;\
                             endmodule\
                             module Outer(input in, output out);\
                             Inner i0(.a(in), .b(out));\
                             endmodule";

    #[test]
    fn output_connection_defines_caller_actual() {
        let design = build(TWO_LEVEL);
        let outer = design.module(design.lookup("Outer").expect("module"));
        let defs = outer.def_instrs("out").expect("out is defined");
        assert_eq!(defs.len(), 1);
        let invoke_ref = *defs.iter().next().expect("one def");
        assert!(design.instr(invoke_ref).as_invoke().is_some());
        // The invocation reads the input actual.
        assert_eq!(
            design.instr(invoke_ref).uses(),
            &IdSet::from(["in".to_string()])
        );
    }

    #[test]
    fn input_connection_defines_callee_formal() {
        let design = build(TWO_LEVEL);
        let inner = design.module(design.lookup("Inner").expect("module"));
        let defs = inner.def_instrs("a").expect("a is defined by the invoke");
        let invoke_ref = *defs.iter().next().expect("one def");
        // The defining instruction lives in the caller's block arena.
        assert_eq!(invoke_ref.module, design.lookup("Outer").expect("module"));
        // The output formal is used by the same invocation.
        let uses = inner.use_instrs("b").expect("b is used by the invoke");
        assert!(uses.contains(&invoke_ref));
    }

    #[test]
    fn positional_connections_resolve_against_port_order() {
        let design = build(
            "module Inner(input a, output b);\
             assign b = a;\
             endmodule\
             module Outer(input in, output out);\
             Inner i0(in, out);\
             endmodule",
        );
        let outer = design.module(design.lookup("Outer").expect("module"));
        assert!(outer.def_instrs("out").is_some());
        let inner = design.module(design.lookup("Inner").expect("module"));
        assert!(inner.def_instrs("a").is_some());
    }

    #[test]
    fn inout_ports_install_both_edges() {
        let design = build(
            "module Pad(inout w);\
             endmodule\
             module Top(inout bus);\
             Pad p0(.w(bus));\
             endmodule",
        );
        let top = design.module(design.lookup("Top").expect("module"));
        assert!(top.def_instrs("bus").is_some());
        let pad = design.module(design.lookup("Pad").expect("module"));
        assert!(pad.def_instrs("w").is_some());
        assert!(pad.use_instrs("w").is_some());
    }

    #[test]
    fn unresolved_module_is_warned_not_fatal() {
        let design = build(
            "module Top(input a);\
             Ghost g0(.x(a));\
             endmodule",
        );
        let top = design.module(design.lookup("Top").expect("module"));
        assert!(top.warnings().unresolved_modules.contains("Ghost"));
    }

    #[test]
    fn unknown_direction_port_is_warned_and_skipped() {
        // Non-ANSI header without body direction declarations.
        let design = build(
            "module Inner(a);\
             endmodule\
             module Top(input x);\
             Inner i0(.a(x));\
             endmodule",
        );
        let inner = design.module(design.lookup("Inner").expect("module"));
        assert!(inner.warnings().unknown_direction_ports.contains("a"));
        assert!(inner.def_instrs("a").is_none());
    }

    #[test]
    fn multi_identifier_output_connection_is_invariant_error() {
        let unit = parser::parse(
            &PathBuf::from("test.v"),
            "module Inner(output b);\
             endmodule\
             module Top(output x, output y);\
             Inner i0(.b({x, y}));\
             endmodule",
        )
        .expect("parse should succeed");
        let mut design = Design::new();
        for module in &unit.modules {
            lower::lower_module(&mut design, module).expect("lowering should succeed");
        }
        let err = resolve_links(&mut design).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn resolution_is_idempotent() {
        let unit =
            parser::parse(&PathBuf::from("test.v"), TWO_LEVEL).expect("parse should succeed");
        let mut design = Design::new();
        for module in &unit.modules {
            lower::lower_module(&mut design, module).expect("lowering should succeed");
        }
        resolve_links(&mut design).expect("first resolution");
        resolve_links(&mut design).expect("second resolution");
        design.build_def_use_chains();

        let outer = design.module(design.lookup("Outer").expect("module"));
        assert_eq!(outer.def_instrs("out").expect("defs").len(), 1);
        let inner = design.module(design.lookup("Inner").expect("module"));
        assert_eq!(inner.def_instrs("a").expect("defs").len(), 1);
    }
}
