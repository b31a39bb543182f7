//! Basic blocks, per-module control-flow graphs, and the design-wide
//! module map.
//!
//! Blocks are arena-owned by their [`ModuleGraph`] and refer to each other by
//! [`BlockId`]; predecessor sets are maintained as the exact inverse of the
//! successor pointers. Instructions are owned by their block and addressed
//! globally with an [`InstrRef`], which lets the def-use index reference
//! instructions across module boundaries (an `Invoke` in the caller can
//! define and use identifiers of the callee).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;

use crate::ast::Identifier;
use crate::error::{Error, Result};
use crate::ids::Role;
use crate::instr::{IdSet, Instr};

/// Handle of a module inside a [`Design`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub usize);

/// Handle of a block inside its module's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// Global handle of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrRef {
    pub module: ModuleId,
    pub block: BlockId,
    pub instr: usize,
}

/// What a basic block models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Always,
    Params,
    Args,
    ContAssign,
    Initial,
    /// A statement appearing at module scope.
    Dangling,
    /// Interior of control flow.
    Ordinary,
    /// Synthesized scaffolding for nested predicates and procedure bodies.
    Hidden,
}

impl BlockKind {
    fn label(self) -> &'static str {
        match self {
            BlockKind::Always => "always",
            BlockKind::Params => "params",
            BlockKind::Args => "args",
            BlockKind::ContAssign => "cassign",
            BlockKind::Initial => "initial",
            BlockKind::Dangling => "dangling",
            BlockKind::Ordinary => "ordinary",
            BlockKind::Hidden => "hidden",
        }
    }
}

/// Straight-line sequence of instructions with up to two successor edges.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    name: String,
    kind: BlockKind,
    instrs: Vec<Instr>,
    preds: BTreeSet<BlockId>,
    left: Option<BlockId>,
    right: Option<BlockId>,
    /// Top-level block this one was discovered from; set when the reachable
    /// sub-graph is walked.
    entry: Option<BlockId>,
}

impl BasicBlock {
    fn new(name: String, kind: BlockKind) -> Self {
        Self {
            name,
            kind,
            instrs: Vec::new(),
            preds: BTreeSet::new(),
            left: None,
            right: None,
            entry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn preds(&self) -> &BTreeSet<BlockId> {
        &self.preds
    }

    pub fn left_successor(&self) -> Option<BlockId> {
        self.left
    }

    pub fn right_successor(&self) -> Option<BlockId> {
        self.right
    }

    pub fn pred_count(&self) -> usize {
        self.preds.len()
    }

    pub fn succ_count(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some())
    }

    /// Entry block of the reachable sub-graph this block belongs to.
    pub fn entry_block(&self) -> Option<BlockId> {
        self.entry
    }

    /// The comparison deciding this block's successors, if the block ends in
    /// one.
    pub fn comparison(&self) -> Option<&Instr> {
        self.instrs.last().filter(|instr| instr.is_cmpr())
    }
}

/// Semantic observations collected per module; reported, never fatal.
#[derive(Debug, Clone, Default)]
pub struct ModuleWarnings {
    /// Identifiers used but never defined (ports excluded).
    pub undefined_ids: IdSet,
    /// Function/task names called but never declared.
    pub unresolved_procs: IdSet,
    /// Instantiated modules with no definition in the design.
    pub unresolved_modules: IdSet,
    /// Connected ports whose direction never resolved.
    pub unknown_direction_ports: IdSet,
}

impl ModuleWarnings {
    pub fn is_empty(&self) -> bool {
        self.undefined_ids.is_empty()
            && self.unresolved_procs.is_empty()
            && self.unresolved_modules.is_empty()
            && self.unknown_direction_ports.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct DomTables {
    built: bool,
    dom: BTreeMap<BlockId, BTreeSet<BlockId>>,
    pdom: BTreeMap<BlockId, BTreeSet<BlockId>>,
    idom: BTreeMap<BlockId, Option<BlockId>>,
    ipdom: BTreeMap<BlockId, Option<BlockId>>,
}

/// One lowered module: block arena, port state, def-use index, dominators.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    id: ModuleId,
    name: Identifier,
    blocks: Vec<BasicBlock>,
    /// Blocks that participate in link resolution and def-use indexing, in
    /// creation order. Hidden scaffolding stays arena-resident but unlisted.
    listed: Vec<BlockId>,
    top_level: BTreeSet<BlockId>,
    block_name_counters: BTreeMap<String, u32>,

    def_index: BTreeMap<Identifier, BTreeSet<InstrRef>>,
    use_index: BTreeMap<Identifier, BTreeSet<InstrRef>>,

    ports: BTreeSet<Identifier>,
    port_order: Vec<Identifier>,
    port_roles: BTreeMap<Identifier, Role>,

    /// Declared task/function names, for call resolution in the extractor.
    pub(crate) proc_names: BTreeSet<Identifier>,
    proc_decls: BTreeMap<Identifier, InstrRef>,

    doms: DomTables,

    pub(crate) warnings: ModuleWarnings,
}

impl ModuleGraph {
    fn new(id: ModuleId, name: Identifier) -> Self {
        Self {
            id,
            name,
            blocks: Vec::new(),
            listed: Vec::new(),
            top_level: BTreeSet::new(),
            block_name_counters: BTreeMap::new(),
            def_index: BTreeMap::new(),
            use_index: BTreeMap::new(),
            ports: BTreeSet::new(),
            port_order: Vec::new(),
            port_roles: BTreeMap::new(),
            proc_names: BTreeSet::new(),
            proc_decls: BTreeMap::new(),
            doms: DomTables::default(),
            warnings: ModuleWarnings::default(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a block with a deterministic unique name derived from `stem`.
    ///
    /// Every block starts out top-level; gaining a predecessor demotes it.
    /// `listed` mirrors whether the block takes part in link resolution and
    /// def-use indexing.
    pub fn create_block(&mut self, stem: &str, kind: BlockKind, listed: bool) -> BlockId {
        let counter = self.block_name_counters.entry(stem.to_string()).or_insert(0);
        let name = format!("{stem}.{counter}");
        *counter += 1;

        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(name, kind));
        self.top_level.insert(id);
        if listed {
            self.listed.push(id);
        }
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Blocks participating in resolution and indexing, in creation order.
    pub fn listed_blocks(&self) -> &[BlockId] {
        &self.listed
    }

    /// Exact set of blocks with no predecessor; dominator-analysis roots.
    pub fn top_level_blocks(&self) -> &BTreeSet<BlockId> {
        &self.top_level
    }

    pub fn append_instr(&mut self, block: BlockId, instr: Instr) -> InstrRef {
        let slot = self.blocks[block.0].instrs.len();
        self.blocks[block.0].instrs.push(instr);
        InstrRef {
            module: self.id,
            block,
            instr: slot,
        }
    }

    pub fn instr(&self, r: InstrRef) -> &Instr {
        &self.blocks[r.block.0].instrs[r.instr]
    }

    pub(crate) fn instr_mut(&mut self, r: InstrRef) -> &mut Instr {
        &mut self.blocks[r.block.0].instrs[r.instr]
    }

    fn add_predecessor(&mut self, block: BlockId, pred: BlockId) -> Result<()> {
        if !self.blocks[block.0].preds.insert(pred) {
            return Err(Error::invariant(format!(
                "duplicate predecessor {} of block {} in module {}",
                self.blocks[pred.0].name, self.blocks[block.0].name, self.name
            )));
        }
        self.top_level.remove(&block);
        Ok(())
    }

    /// Install the taken successor; the target stops being top-level.
    pub fn set_left_successor(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        if self.blocks[from.0].left.is_some() {
            return Err(Error::invariant(format!(
                "overwriting left successor of block {} in module {}",
                self.blocks[from.0].name, self.name
            )));
        }
        self.blocks[from.0].left = Some(to);
        self.add_predecessor(to, from)
    }

    /// Install the not-taken successor.
    pub fn set_right_successor(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        if self.blocks[from.0].right.is_some() {
            return Err(Error::invariant(format!(
                "overwriting right successor of block {} in module {}",
                self.blocks[from.0].name, self.name
            )));
        }
        self.blocks[from.0].right = Some(to);
        self.add_predecessor(to, from)
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    /// Record a port with its caller-perspective role; first sighting fixes
    /// declaration order (used to match positional connections).
    pub fn add_port(&mut self, name: Identifier, role: Role) {
        if self.ports.insert(name.clone()) {
            self.port_order.push(name.clone());
        }
        self.port_roles.insert(name, role);
    }

    /// Direction update from a body declaration (non-ANSI style).
    pub fn update_port(&mut self, name: Identifier, role: Role) {
        self.add_port(name, role);
    }

    pub fn ports(&self) -> &BTreeSet<Identifier> {
        &self.ports
    }

    /// Ports in declaration order.
    pub fn port_order(&self) -> &[Identifier] {
        &self.port_order
    }

    pub fn is_port(&self, id: &str) -> bool {
        self.ports.contains(id)
    }

    /// Caller-perspective role of a port; empty when unknown.
    pub fn port_role(&self, name: &str) -> Role {
        self.port_roles.get(name).copied().unwrap_or(Role::empty())
    }

    // ------------------------------------------------------------------
    // Procedures
    // ------------------------------------------------------------------

    pub fn register_proc(&mut self, name: Identifier, decl: InstrRef) {
        self.proc_names.insert(name.clone());
        self.proc_decls.insert(name, decl);
    }

    pub fn proc_decl(&self, name: &str) -> Option<InstrRef> {
        self.proc_decls.get(name).copied()
    }

    // ------------------------------------------------------------------
    // Def-use index
    // ------------------------------------------------------------------

    pub fn add_def(&mut self, id: Identifier, instr: InstrRef) {
        self.def_index.entry(id).or_default().insert(instr);
    }

    pub fn add_use(&mut self, id: Identifier, instr: InstrRef) {
        self.use_index.entry(id).or_default().insert(instr);
    }

    /// Instructions defining `id`. A missing entry is the conservative empty
    /// set; undefined identifiers are surfaced on the warning channel.
    pub fn def_instrs(&self, id: &str) -> Option<&BTreeSet<InstrRef>> {
        self.def_index.get(id)
    }

    pub fn use_instrs(&self, id: &str) -> Option<&BTreeSet<InstrRef>> {
        self.use_index.get(id)
    }

    pub fn def_index(&self) -> &BTreeMap<Identifier, BTreeSet<InstrRef>> {
        &self.def_index
    }

    pub fn use_index(&self) -> &BTreeMap<Identifier, BTreeSet<InstrRef>> {
        &self.use_index
    }

    /// Whether the module mentions `id` anywhere the analysis can see.
    pub fn knows_id(&self, id: &str) -> bool {
        self.ports.contains(id)
            || self.def_index.contains_key(id)
            || self.use_index.contains_key(id)
    }

    pub fn warnings(&self) -> &ModuleWarnings {
        &self.warnings
    }

    // ------------------------------------------------------------------
    // Reachability and dominators
    // ------------------------------------------------------------------

    /// Walk the sub-graph reachable from `root`, recording `root` as the
    /// entry block of every block found.
    pub(crate) fn mark_reachable(&mut self, root: BlockId) -> BTreeSet<BlockId> {
        let mut reachable = BTreeSet::from([root]);
        let mut workset = vec![root];
        self.blocks[root.0].entry = Some(root);

        while let Some(item) = workset.pop() {
            let succs = [self.blocks[item.0].left, self.blocks[item.0].right];
            for succ in succs.into_iter().flatten() {
                if reachable.insert(succ) {
                    self.blocks[succ.0].entry = Some(root);
                    workset.push(succ);
                }
            }
        }
        reachable
    }

    /// Forward-reachable blocks without touching entry pointers.
    pub fn reachable_from(&self, root: BlockId) -> BTreeSet<BlockId> {
        let mut reachable = BTreeSet::from([root]);
        let mut workset = vec![root];
        while let Some(item) = workset.pop() {
            let succs = [self.blocks[item.0].left, self.blocks[item.0].right];
            for succ in succs.into_iter().flatten() {
                if reachable.insert(succ) {
                    workset.push(succ);
                }
            }
        }
        reachable
    }

    pub fn dominators_built(&self) -> bool {
        self.doms.built
    }

    pub(crate) fn set_dominators(
        &mut self,
        dom: BTreeMap<BlockId, BTreeSet<BlockId>>,
        pdom: BTreeMap<BlockId, BTreeSet<BlockId>>,
        idom: BTreeMap<BlockId, Option<BlockId>>,
        ipdom: BTreeMap<BlockId, Option<BlockId>>,
    ) {
        self.doms = DomTables {
            built: true,
            dom,
            pdom,
            idom,
            ipdom,
        };
    }

    pub fn dominator_set(&self, block: BlockId) -> Option<&BTreeSet<BlockId>> {
        self.doms.dom.get(&block)
    }

    pub fn postdominator_set(&self, block: BlockId) -> Option<&BTreeSet<BlockId>> {
        self.doms.pdom.get(&block)
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.doms.idom.get(&block).copied().flatten()
    }

    pub fn immediate_postdominator(&self, block: BlockId) -> Option<BlockId> {
        self.doms.ipdom.get(&block).copied().flatten()
    }

    /// `lo` post-dominates `hi` iff every path from `hi` to an exit passes
    /// through `lo`.
    pub fn postdominates(&self, lo: BlockId, hi: BlockId) -> Result<bool> {
        let pdom = self.doms.pdom.get(&hi).ok_or_else(|| {
            Error::invariant(format!(
                "postdominators not computed for block {} in module {}",
                self.blocks[hi.0].name, self.name
            ))
        })?;
        Ok(pdom.contains(&lo))
    }

    /// Blocks whose predicate decides whether `block` executes: dominators
    /// of `block` that `block` does not post-dominate, walked up to the
    /// entry block.
    pub fn guard_blocks(&self, block: BlockId) -> Result<BTreeSet<BlockId>> {
        let entry = self.blocks[block.0].entry.ok_or_else(|| {
            Error::invariant(format!(
                "entry block not recorded for block {} in module {}",
                self.blocks[block.0].name, self.name
            ))
        })?;

        let mut guards = BTreeSet::new();
        let mut reference = block;
        let mut hi = block;

        while hi != entry {
            // Climb past everything the reference block post-dominates.
            loop {
                if !self.postdominates(reference, hi)? {
                    break;
                }
                match self.immediate_dominator(hi) {
                    Some(next) => hi = next,
                    None => return Ok(guards),
                }
            }
            guards.insert(hi);
            reference = hi;
        }
        Ok(guards)
    }
}

impl fmt::Display for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for block in &self.blocks {
            let marker = if block.preds.is_empty() { "-T-" } else { "   " };
            let left = block
                .left
                .map_or("-nil-".to_string(), |id| self.blocks[id.0].name.clone());
            let right = block
                .right
                .map_or("-nil-".to_string(), |id| self.blocks[id.0].name.clone());
            writeln!(
                f,
                "{marker} [{}] ({})  pointing to  {left} and {right}",
                block.name,
                block.kind.label()
            )?;
            for instr in &block.instrs {
                writeln!(f, "        {instr}")?;
            }
        }
        Ok(())
    }
}

/// The design under analysis: every lowered module, addressed by name or
/// handle. Passed explicitly into the resolver and the closure engine.
#[derive(Debug, Default)]
pub struct Design {
    modules: Vec<ModuleGraph>,
    by_name: BTreeMap<Identifier, ModuleId>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new module. The first definition of a name wins; a
    /// duplicate is reported to the caller as `None`.
    pub fn create_module(&mut self, name: &str) -> Option<ModuleId> {
        if self.by_name.contains_key(name) {
            return None;
        }
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleGraph::new(id, name.to_string()));
        self.by_name.insert(name.to_string(), id);
        Some(id)
    }

    pub fn module(&self, id: ModuleId) -> &ModuleGraph {
        &self.modules[id.0]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleGraph {
        &mut self.modules[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleGraph> {
        self.modules.iter()
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.modules.len()).map(ModuleId)
    }

    pub fn instr(&self, r: InstrRef) -> &Instr {
        self.modules[r.module.0].instr(r)
    }

    /// Populate every module's def-use index from the instructions of its
    /// listed blocks. Idempotent: the index entries are sets.
    pub fn build_def_use_chains(&mut self) {
        for m in 0..self.modules.len() {
            let module_id = ModuleId(m);
            let listed = self.modules[m].listed.clone();
            for block in listed {
                for slot in 0..self.modules[m].block(block).instrs.len() {
                    let r = InstrRef {
                        module: module_id,
                        block,
                        instr: slot,
                    };
                    let defs: Vec<Identifier> =
                        self.modules[m].instr(r).defs().iter().cloned().collect();
                    let uses: Vec<Identifier> =
                        self.modules[m].instr(r).uses().iter().cloned().collect();
                    for id in defs {
                        self.modules[m].add_def(id, r);
                    }
                    for id in uses {
                        self.modules[m].add_use(id, r);
                    }
                }
            }
        }
    }

    /// Record identifiers that are used but never defined (spec'd semantic
    /// warning; ports are the module boundary and excluded).
    pub fn collect_undefined_ids(&mut self) {
        for module in &mut self.modules {
            let undefined: IdSet = module
                .use_index
                .keys()
                .filter(|id| !module.def_index.contains_key(*id) && !module.ports.contains(*id))
                .cloned()
                .collect();
            if !undefined.is_empty() {
                let ids = undefined.iter().join(", ");
                tracing::warn!(
                    module = module.name.as_str(),
                    ids = ids.as_str(),
                    "undefined identifier(s) used"
                );
                module.warnings.undefined_ids.extend(undefined);
            }
        }
    }
}
