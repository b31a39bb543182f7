//! Dominator and post-dominator analysis.
//!
//! Per module, computed lazily on first dependence query: for each top-level
//! block, the reachable sub-graph is gathered and the classical iterative
//! fixpoint runs over it. The O(V^2) algorithm is deliberate; per-process
//! sub-graphs are small enough that Lengauer-Tarjan would not pay for
//! itself here.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfg::{BlockId, ModuleGraph};
use crate::error::{Error, Result};

type BlockSets = BTreeMap<BlockId, BTreeSet<BlockId>>;

/// Build dominator tables for `module` if they are not present yet.
pub fn ensure_dominators(module: &mut ModuleGraph) -> Result<()> {
    if module.dominators_built() {
        return Ok(());
    }

    let mut dom = BlockSets::new();
    let mut pdom = BlockSets::new();

    let roots: Vec<BlockId> = module.top_level_blocks().iter().copied().collect();
    for root in roots {
        if module.block(root).pred_count() != 0 {
            return Err(Error::invariant(format!(
                "top-level block {} of module {} has predecessors",
                module.block(root).name(),
                module.name()
            )));
        }
        let reachable = module.mark_reachable(root);
        solve(module, &reachable, &mut dom, &mut pdom);
    }

    let mut idom = BTreeMap::new();
    let mut ipdom = BTreeMap::new();
    for (&block, set) in &dom {
        idom.insert(block, find_immediate(module, &dom, block, set, "dominator")?);
    }
    for (&block, set) in &pdom {
        ipdom.insert(
            block,
            find_immediate(module, &pdom, block, set, "postdominator")?,
        );
    }

    module.set_dominators(dom, pdom, idom, ipdom);
    Ok(())
}

/// Iterative fixpoint over one reachable sub-graph.
///
///   Dom(b)  = {b} ∪ ⋂ Dom(p)  over predecessors p
///   PDom(b) = {b} ∪ ⋂ PDom(s) over successors s
fn solve(module: &ModuleGraph, reachable: &BTreeSet<BlockId>, dom: &mut BlockSets, pdom: &mut BlockSets) {
    for &block in reachable {
        let b = module.block(block);
        if b.pred_count() == 0 {
            dom.insert(block, BTreeSet::from([block]));
        } else {
            dom.insert(block, reachable.clone());
        }
        if b.succ_count() == 0 {
            pdom.insert(block, BTreeSet::from([block]));
        } else {
            pdom.insert(block, reachable.clone());
        }
    }

    loop {
        let mut changed = false;

        for &block in reachable {
            let b = module.block(block);

            if b.pred_count() > 0 {
                let mut next = reachable.clone();
                for &pred in b.preds() {
                    let Some(pred_dom) = dom.get(&pred) else {
                        continue;
                    };
                    next.retain(|candidate| pred_dom.contains(candidate));
                }
                next.insert(block);
                if dom[&block] != next {
                    dom.insert(block, next);
                    changed = true;
                }
            }

            if b.succ_count() > 0 {
                let mut next = reachable.clone();
                for succ in [b.left_successor(), b.right_successor()].into_iter().flatten() {
                    let succ_pdom = &pdom[&succ];
                    next.retain(|candidate| succ_pdom.contains(candidate));
                }
                next.insert(block);
                if pdom[&block] != next {
                    pdom.insert(block, next);
                    changed = true;
                }
            }
        }

        if !changed {
            return;
        }
    }
}

/// The immediate (post)dominator of `block`: the unique element of its
/// (post)dominator set, minus itself, that (post)dominates no other element
/// of that set. Multiplicity is a model-invariant violation; a root has
/// none.
fn find_immediate(
    module: &ModuleGraph,
    sets: &BlockSets,
    block: BlockId,
    set: &BTreeSet<BlockId>,
    what: &str,
) -> Result<Option<BlockId>> {
    let mut immediate = None;

    for &candidate in set {
        if candidate == block {
            continue;
        }
        let dominates_another = set.iter().any(|&other| {
            other != block && other != candidate && sets[&other].contains(&candidate)
        });
        if dominates_another {
            continue;
        }
        if immediate.is_some() {
            return Err(Error::invariant(format!(
                "multiple immediate {what}s for block {} in module {}",
                module.block(block).name(),
                module.name()
            )));
        }
        immediate = Some(candidate);
    }

    Ok(immediate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{BlockKind, Design};

    /// entry -> {then, else} -> merge
    fn diamond() -> (Design, BlockId, BlockId, BlockId, BlockId) {
        let mut design = Design::new();
        let id = design.create_module("m").expect("module");
        let m = design.module_mut(id);
        let entry = m.create_block("always", BlockKind::Always, true);
        let then_bb = m.create_block("then", BlockKind::Ordinary, true);
        let else_bb = m.create_block("else", BlockKind::Ordinary, true);
        let merge = m.create_block("merge", BlockKind::Ordinary, true);
        m.set_left_successor(entry, then_bb).expect("edge");
        m.set_right_successor(entry, else_bb).expect("edge");
        m.set_left_successor(then_bb, merge).expect("edge");
        m.set_left_successor(else_bb, merge).expect("edge");
        (design, entry, then_bb, else_bb, merge)
    }

    #[test]
    fn diamond_dominators() {
        let (mut design, entry, then_bb, else_bb, merge) = diamond();
        let m = design.module_mut(crate::cfg::ModuleId(0));
        ensure_dominators(m).expect("dominators should build");

        assert_eq!(m.immediate_dominator(entry), None);
        assert_eq!(m.immediate_dominator(then_bb), Some(entry));
        assert_eq!(m.immediate_dominator(else_bb), Some(entry));
        assert_eq!(m.immediate_dominator(merge), Some(entry));

        let merge_dom = m.dominator_set(merge).expect("dominator set");
        assert!(merge_dom.contains(&entry));
        assert!(!merge_dom.contains(&then_bb));
    }

    #[test]
    fn diamond_postdominators() {
        let (mut design, entry, then_bb, _else_bb, merge) = diamond();
        let m = design.module_mut(crate::cfg::ModuleId(0));
        ensure_dominators(m).expect("dominators should build");

        // merge postdominates everything; then does not postdominate entry.
        assert!(m.postdominates(merge, entry).expect("lookup"));
        assert!(m.postdominates(merge, then_bb).expect("lookup"));
        assert!(!m.postdominates(then_bb, entry).expect("lookup"));
        assert_eq!(m.immediate_postdominator(entry), Some(merge));
    }

    #[test]
    fn postdominance_is_reflexive_and_transitive() {
        let (mut design, entry, then_bb, else_bb, merge) = diamond();
        let m = design.module_mut(crate::cfg::ModuleId(0));
        ensure_dominators(m).expect("dominators should build");

        for block in [entry, then_bb, else_bb, merge] {
            assert!(m.postdominates(block, block).expect("reflexive"));
        }

        // merge pdom then, then pdom then ⇒ transitivity over the chain
        // entry -> then -> merge.
        assert!(m.postdominates(then_bb, then_bb).expect("lookup"));
        assert!(m.postdominates(merge, then_bb).expect("lookup"));
        assert!(m.postdominates(merge, entry).expect("lookup"));
    }

    #[test]
    fn chain_immediate_dominators_are_unique_parents() {
        let mut design = Design::new();
        let id = design.create_module("m").expect("module");
        let m = design.module_mut(id);
        let a = m.create_block("a", BlockKind::Always, true);
        let b = m.create_block("b", BlockKind::Ordinary, true);
        let c = m.create_block("c", BlockKind::Ordinary, true);
        m.set_left_successor(a, b).expect("edge");
        m.set_left_successor(b, c).expect("edge");
        ensure_dominators(m).expect("dominators should build");

        assert_eq!(m.immediate_dominator(c), Some(b));
        assert_eq!(m.immediate_dominator(b), Some(a));
        let c_dom = m.dominator_set(c).expect("dominator set");
        assert_eq!(c_dom, &BTreeSet::from([a, b, c]));
    }

    #[test]
    fn guard_blocks_of_guarded_branch() {
        let (mut design, entry, then_bb, _else_bb, merge) = diamond();
        let m = design.module_mut(crate::cfg::ModuleId(0));
        ensure_dominators(m).expect("dominators should build");

        let guards = m.guard_blocks(then_bb).expect("guard walk");
        assert_eq!(guards, BTreeSet::from([entry]));

        // The merge block runs unconditionally.
        let guards = m.guard_blocks(merge).expect("guard walk");
        assert!(guards.is_empty());

        // So does the entry itself.
        let guards = m.guard_blocks(entry).expect("guard walk");
        assert!(guards.is_empty());
    }

    #[test]
    fn multiple_roots_are_independent() {
        let mut design = Design::new();
        let id = design.create_module("m").expect("module");
        let m = design.module_mut(id);
        let a = m.create_block("always", BlockKind::Always, true);
        let b = m.create_block("cassign", BlockKind::ContAssign, true);
        ensure_dominators(m).expect("dominators should build");

        assert_eq!(m.block(a).entry_block(), Some(a));
        assert_eq!(m.block(b).entry_block(), Some(b));
        assert!(m.postdominates(a, a).expect("lookup"));
        assert!(m.postdominates(b, b).expect("lookup"));
    }

    #[test]
    fn ensure_is_lazy_and_idempotent() {
        let (mut design, ..) = diamond();
        let m = design.module_mut(crate::cfg::ModuleId(0));
        assert!(!m.dominators_built());
        ensure_dominators(m).expect("first build");
        assert!(m.dominators_built());
        let snapshot: Vec<_> = m.block_ids().map(|b| m.immediate_dominator(b)).collect();
        ensure_dominators(m).expect("second build is a no-op");
        let again: Vec<_> = m.block_ids().map(|b| m.immediate_dominator(b)).collect();
        assert_eq!(snapshot, again);
    }
}
