//! Structural invariants of the lowered model, checked over a design that
//! exercises branching, instantiation, and triggered execution.

use verileak::Analyzer;
use verileak::cfg::{BlockId, Design};

const DESIGN: &str = "module Inner(input a, output b);\
                      assign b = a;\
                      endmodule\
                      module Top(input clk, input sel, input d, output reg q, output w);\
                      Inner i0(.a(d), .b(w));\
                      always @(posedge clk)\
                        if (sel) q <= d;\
                        else q <= w;\
                      endmodule";

fn analyzed() -> Analyzer {
    let mut analyzer = Analyzer::new();
    analyzer
        .analyze_source("invariants.v", DESIGN)
        .expect("analysis should succeed");
    // Queries force lazy dominator construction in every visited module.
    analyzer.query("Top", "q").expect("query should succeed");
    analyzer.query("Top", "w").expect("query should succeed");
    analyzer
}

#[test]
fn predecessors_invert_successors() {
    let analyzer = analyzed();
    let design: &Design = analyzer.design();

    for module in design.modules() {
        for block in module.block_ids() {
            for succ in [
                module.block(block).left_successor(),
                module.block(block).right_successor(),
            ]
            .into_iter()
            .flatten()
            {
                assert!(
                    module.block(succ).preds().contains(&block),
                    "missing back edge {} -> {} in {}",
                    module.block(block).name(),
                    module.block(succ).name(),
                    module.name()
                );
            }
            for &pred in module.block(block).preds() {
                let p = module.block(pred);
                assert!(
                    p.left_successor() == Some(block) || p.right_successor() == Some(block),
                    "stale predecessor {} of {} in {}",
                    p.name(),
                    module.block(block).name(),
                    module.name()
                );
            }
        }
    }
}

#[test]
fn two_successors_require_terminal_comparison() {
    let analyzer = analyzed();
    let mut branching = 0;
    for module in analyzer.design().modules() {
        for block in module.block_ids() {
            if module.block(block).succ_count() == 2 {
                branching += 1;
                assert!(
                    module.block(block).comparison().is_some(),
                    "block {} in {} branches without a comparison",
                    module.block(block).name(),
                    module.name()
                );
            }
        }
    }
    assert!(branching > 0, "design should contain a branching block");
}

#[test]
fn top_level_blocks_have_no_predecessors() {
    let analyzer = analyzed();
    for module in analyzer.design().modules() {
        for block in module.block_ids() {
            let top = module.top_level_blocks().contains(&block);
            assert_eq!(
                top,
                module.block(block).pred_count() == 0,
                "top-level tracking out of sync for {} in {}",
                module.block(block).name(),
                module.name()
            );
        }
    }
}

#[test]
fn reachable_blocks_share_their_entry() {
    let analyzer = analyzed();
    for module in analyzer.design().modules() {
        for &root in module.top_level_blocks() {
            for block in module.reachable_from(root) {
                assert_eq!(
                    module.block(block).entry_block(),
                    Some(root),
                    "block {} in {} lost its entry",
                    module.block(block).name(),
                    module.name()
                );
            }
        }
    }
}

#[test]
fn use_index_entries_use_their_identifier() {
    let analyzer = analyzed();
    let design = analyzer.design();
    for module in design.modules() {
        for (id, instrs) in module.use_index() {
            for &r in instrs {
                // Cross-module entries encode the direction flip at the
                // instantiation boundary; the intra-module ones must agree
                // with the instruction's own use-set.
                if r.module == module.id() {
                    assert!(
                        design.instr(r).uses().contains(id),
                        "index claims a use of {id} in {} that the instruction lacks",
                        module.name()
                    );
                }
            }
        }
    }
}

#[test]
fn immediate_dominators_are_unique_and_dominating() {
    let analyzer = analyzed();
    for module in analyzer.design().modules() {
        if !module.dominators_built() {
            continue;
        }
        for block in module.block_ids() {
            let Some(dom_set) = module.dominator_set(block) else {
                continue;
            };
            let entry = module.block(block).entry_block();
            if entry == Some(block) {
                assert_eq!(module.immediate_dominator(block), None);
                continue;
            }
            let idom = module
                .immediate_dominator(block)
                .expect("non-root block must have an immediate dominator");
            assert!(
                dom_set.contains(&idom),
                "immediate dominator of {} does not dominate it",
                module.block(block).name()
            );
        }
    }
}

#[test]
fn postdominance_is_reflexive_and_transitive() {
    let analyzer = analyzed();
    for module in analyzer.design().modules() {
        if !module.dominators_built() {
            continue;
        }
        let blocks: Vec<BlockId> = module
            .block_ids()
            .filter(|&b| module.postdominator_set(b).is_some())
            .collect();

        for &a in &blocks {
            assert!(module.postdominates(a, a).expect("reflexive lookup"));
        }

        for &a in &blocks {
            for &b in &blocks {
                for &c in &blocks {
                    let ab = module.postdominates(a, b).expect("lookup");
                    let bc = module.postdominates(b, c).expect("lookup");
                    if ab && bc {
                        assert!(
                            module.postdominates(a, c).expect("lookup"),
                            "postdominance not transitive in {}",
                            module.name()
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn relowering_produces_structurally_equal_modules() {
    let build = || {
        let mut analyzer = Analyzer::new();
        analyzer
            .analyze_source("invariants.v", DESIGN)
            .expect("analysis should succeed");
        analyzer
    };
    let first = build();
    let second = build();

    for (m1, m2) in first.design().modules().zip(second.design().modules()) {
        assert_eq!(m1.name(), m2.name());
        assert_eq!(m1.block_count(), m2.block_count());
        for (a, b) in m1.block_ids().zip(m2.block_ids()) {
            assert_eq!(m1.block(a).name(), m2.block(b).name());
            assert_eq!(m1.block(a).instrs(), m2.block(b).instrs());
            assert_eq!(
                m1.block(a).left_successor(),
                m2.block(b).left_successor()
            );
            assert_eq!(
                m1.block(a).right_successor(),
                m2.block(b).right_successor()
            );
        }
    }
}
