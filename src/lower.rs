//! Lowering: parsed modules into control-flow graphs of typed instructions.
//!
//! Module items each open a block of the matching kind; statements append
//! instructions with def/use sets frozen at construction. Conditionals split
//! blocks (then/else/merge, re-seating the caller's cursor). A structured
//! statement nested *inside* an ordinary statement position is lowered into a
//! synthesized `Hidden` sub-graph off to the side, and the sub-graph's
//! def/use sets (including `Cmpr` uses, which keeps implicit flows visible)
//! are merged back into the containing instruction.

use crate::ast::{
    Connection, Direction, Expr, Identifier, ModuleDecl, ModuleItem, SensitivityList, Statement,
};
use crate::cfg::{BlockId, BlockKind, Design, ModuleGraph, ModuleId};
use crate::error::{Error, Result};
use crate::ids::{Role, describe_expr};
use crate::instr::{Conn, IdSet, Instr, Invoke, ProcData};

/// Lower one parsed module into the design.
///
/// Returns `None` (with a warning) when the module name is already taken;
/// the first definition wins.
pub fn lower_module(design: &mut Design, decl: &ModuleDecl) -> Result<Option<ModuleId>> {
    let Some(id) = design.create_module(&decl.name) else {
        tracing::warn!(module = decl.name.as_str(), "duplicate module definition ignored");
        return Ok(None);
    };

    let mut lowerer = Lowerer {
        m: design.module_mut(id),
        warned_loop: false,
    };
    lowerer.run(decl)?;
    Ok(Some(id))
}

fn direction_role(direction: Direction) -> Role {
    match direction {
        Direction::Input => Role::DEF,
        Direction::Output => Role::USE,
        Direction::Inout => Role::DEF | Role::USE,
    }
}

struct Lowerer<'a> {
    m: &'a mut ModuleGraph,
    warned_loop: bool,
}

impl Lowerer<'_> {
    fn run(&mut self, decl: &ModuleDecl) -> Result<()> {
        if !decl.params.is_empty() {
            let block = self.m.create_block("params", BlockKind::Params, true);
            for name in &decl.params {
                self.m.append_instr(block, Instr::param(name.clone()));
            }
        }

        if !decl.ports.is_empty() || !decl.port_names.is_empty() {
            // Header ports anchor the module's argument state.
            self.m.create_block("args", BlockKind::Args, true);
            for port in &decl.ports {
                for name in &port.names {
                    self.m.add_port(name.clone(), direction_role(port.direction));
                }
            }
            for name in &decl.port_names {
                self.m.add_port(name.clone(), Role::empty());
            }
        }

        for item in &decl.items {
            self.module_item(item)?;
        }
        Ok(())
    }

    fn module_item(&mut self, item: &ModuleItem) -> Result<()> {
        match item {
            ModuleItem::PortDecl(decl) => {
                let role = direction_role(decl.direction);
                for name in &decl.names {
                    self.m.update_port(name.clone(), role);
                }
            }
            ModuleItem::NetDecl(names) => {
                // Initializers behave like continuous assignments; plain
                // declarations carry nothing.
                let initialized: Vec<_> = names.iter().filter(|n| n.init.is_some()).collect();
                if initialized.is_empty() {
                    return Ok(());
                }
                let block = self.m.create_block("cassign", BlockKind::ContAssign, true);
                for decl in initialized {
                    let mut defs = IdSet::from([decl.name.clone()]);
                    let mut uses = IdSet::new();
                    if let Some(init) = &decl.init {
                        self.extract(init, Role::USE, &mut defs, &mut uses);
                    }
                    self.m.append_instr(block, Instr::assign(defs, uses));
                }
            }
            ModuleItem::ParamDecl(names) | ModuleItem::Defparam(names) => {
                let block = self.m.create_block("params", BlockKind::Params, true);
                for name in names {
                    self.m.append_instr(block, Instr::param(name.clone()));
                }
            }
            ModuleItem::ContAssign(assigns) => {
                let block = self.m.create_block("cassign", BlockKind::ContAssign, true);
                for (target, value) in assigns {
                    let mut defs = IdSet::new();
                    let mut uses = IdSet::new();
                    self.extract(target, Role::DEF, &mut defs, &mut uses);
                    self.extract(value, Role::USE, &mut defs, &mut uses);
                    self.m.append_instr(block, Instr::assign(defs, uses));
                }
            }
            ModuleItem::Always(stmt) => {
                let mut block = self.m.create_block("always", BlockKind::Always, true);
                self.process_statement(&mut block, stmt)?;
            }
            ModuleItem::Initial(stmt) => {
                let mut block = self.m.create_block("initial", BlockKind::Initial, true);
                self.process_statement(&mut block, stmt)?;
            }
            ModuleItem::Instantiation { module, instances } => {
                let block = self.m.create_block("instantiation", BlockKind::Ordinary, true);
                for instance in instances {
                    let conns = instance
                        .connections
                        .iter()
                        .map(|conn| self.lower_connection(conn))
                        .collect();
                    self.m.append_instr(
                        block,
                        Instr::invoke(Invoke {
                            module: module.clone(),
                            instance: instance.name.clone(),
                            conns,
                            callee: None,
                        }),
                    );
                }
            }
            ModuleItem::TaskDecl(decl) | ModuleItem::FunctionDecl(decl) => {
                let kind_stem = if matches!(item, ModuleItem::TaskDecl(_)) {
                    "taskdecl"
                } else {
                    "funcdecl"
                };
                let block = self.m.create_block(kind_stem, BlockKind::Ordinary, true);

                let mut body = self.m.create_block("begin", BlockKind::Hidden, false);
                for stmt in &decl.body {
                    self.process_statement(&mut body, stmt)?;
                }

                let args = decl
                    .args
                    .iter()
                    .map(|(name, direction)| (name.clone(), direction_role(*direction)))
                    .collect();
                let r = self.m.append_instr(
                    block,
                    Instr::proc_decl(ProcData {
                        name: decl.name.clone(),
                        args,
                        body,
                    }),
                );
                self.m.register_proc(decl.name.clone(), r);
            }
            ModuleItem::Statement(stmt) => {
                let mut block = self.m.create_block("dangling", BlockKind::Dangling, true);
                self.process_statement(&mut block, stmt)?;
            }
        }
        Ok(())
    }

    fn lower_connection(&mut self, conn: &Connection) -> Conn {
        let mut ids = IdSet::new();
        if let Some(actual) = &conn.actual {
            let mut defs = IdSet::new();
            let mut uses = IdSet::new();
            self.extract(actual, Role::USE, &mut defs, &mut uses);
            ids.extend(uses);
            ids.extend(defs);
        }
        Conn {
            formal: conn.formal.clone(),
            ids,
            role: Role::empty(),
        }
    }

    /// Statement dispatch within a block cursor. The cursor is re-seated to
    /// the merge block when control flow splits.
    fn process_statement(&mut self, bb: &mut BlockId, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::Null | Statement::SystemTaskCall { .. } => {}

            Statement::Blocking { .. }
            | Statement::NonBlocking { .. }
            | Statement::ProcAssign { .. }
            | Statement::Deassign { .. }
            | Statement::Case { .. }
            | Statement::Delay { .. }
            | Statement::Disable { .. }
            | Statement::EventTrigger { .. }
            | Statement::Wait { .. } => {
                let mut defs = IdSet::new();
                let mut uses = IdSet::new();
                self.fold_statement(stmt, &mut defs, &mut uses)?;
                self.m.append_instr(*bb, Instr::stmt(defs, uses));
            }

            Statement::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                let floating = !self.is_listed(*bb);

                let mut defs = IdSet::new();
                let mut uses = IdSet::new();
                self.extract(condition, Role::USE, &mut defs, &mut uses);
                self.m.append_instr(*bb, Instr::cmpr(uses));

                let merge = self.m.create_block("merge", BlockKind::Ordinary, !floating);
                let mut then_bb = self.m.create_block("then", BlockKind::Ordinary, !floating);
                self.m.set_left_successor(*bb, then_bb)?;
                self.process_statement(&mut then_bb, then_stmt)?;
                self.m.set_left_successor(then_bb, merge)?;

                if let Some(else_stmt) = else_stmt {
                    let mut else_bb = self.m.create_block("else", BlockKind::Ordinary, !floating);
                    self.m.set_right_successor(*bb, else_bb)?;
                    self.process_statement(&mut else_bb, else_stmt)?;
                    self.m.set_left_successor(else_bb, merge)?;
                }

                *bb = merge;
            }

            Statement::EventControl { sensitivity, body } => {
                if self.m.block(*bb).kind() != BlockKind::Always {
                    return Err(Error::invariant(format!(
                        "event control outside an always block in module {}",
                        self.m.name()
                    )));
                }
                let ids = self.sensitivity_ids(sensitivity);
                self.m.append_instr(*bb, Instr::trigger(ids));
                self.process_statement(bb, body)?;
            }

            Statement::Block { stmts } => {
                for stmt in stmts {
                    self.process_statement(bb, stmt)?;
                }
            }

            Statement::For { body, .. }
            | Statement::While { body, .. }
            | Statement::Repeat { body, .. }
            | Statement::Forever { body } => {
                self.warn_flattened_loop();
                self.process_statement(bb, body)?;
            }

            Statement::TaskCall { name, args } => {
                let instr = self.lower_task_call(name, args)?;
                self.m.append_instr(*bb, instr);
            }
        }
        Ok(())
    }

    /// Def/use folding for a statement appended as a single `Stmt`.
    fn fold_statement(&mut self, stmt: &Statement, defs: &mut IdSet, uses: &mut IdSet) -> Result<()> {
        match stmt {
            Statement::Null | Statement::SystemTaskCall { .. } | Statement::Disable { .. } => {}

            Statement::Blocking { target, value }
            | Statement::NonBlocking { target, value }
            | Statement::ProcAssign { target, value } => {
                self.extract(target, Role::DEF, defs, uses);
                self.extract(value, Role::USE, defs, uses);
            }

            Statement::Deassign { target } => {
                self.extract(target, Role::DEF, defs, uses);
            }

            Statement::Case { selector, arms } => {
                self.extract(selector, Role::USE, defs, uses);
                for arm in arms {
                    for pattern in &arm.patterns {
                        self.extract(pattern, Role::USE, defs, uses);
                    }
                    self.fold_statement(&arm.body, defs, uses)?;
                }
            }

            Statement::EventTrigger { name } => {
                defs.insert(name.clone());
            }

            Statement::Wait { condition, body } => {
                self.extract(condition, Role::USE, defs, uses);
                if let Some(body) = body {
                    self.fold_statement(body, defs, uses)?;
                }
            }

            Statement::Delay { delay, body } => {
                self.extract(delay, Role::USE, defs, uses);
                self.fold_statement(body, defs, uses)?;
            }

            Statement::For { body, .. }
            | Statement::While { body, .. }
            | Statement::Repeat { body, .. }
            | Statement::Forever { body } => {
                self.warn_flattened_loop();
                self.fold_statement(body, defs, uses)?;
            }

            // Structured statements in an ordinary position: lower into a
            // hidden sub-graph and merge its def/use sets back.
            Statement::Block { .. }
            | Statement::If { .. }
            | Statement::TaskCall { .. }
            | Statement::EventControl { .. } => {
                self.hidden_def_use(stmt, defs, uses)?;
            }
        }
        Ok(())
    }

    /// Lower `stmt` into a floating `Hidden` sub-graph, then gather the
    /// def/use sets of every instruction reachable from its root.
    fn hidden_def_use(&mut self, stmt: &Statement, defs: &mut IdSet, uses: &mut IdSet) -> Result<()> {
        let root = self.m.create_block("nested", BlockKind::Hidden, false);
        let mut cursor = root;
        self.process_statement(&mut cursor, stmt)?;

        let reachable = self.m.mark_reachable(root);
        for block in reachable {
            for instr in self.m.block(block).instrs() {
                defs.extend(instr.defs().iter().cloned());
                uses.extend(instr.uses().iter().cloned());
            }
        }
        Ok(())
    }

    fn lower_task_call(&mut self, name: &Identifier, args: &[Expr]) -> Result<Instr> {
        let mut defs = IdSet::new();
        let mut uses = IdSet::new();

        let Some(decl_ref) = self.m.proc_decl(name) else {
            tracing::warn!(
                module = self.m.name(),
                task = name.as_str(),
                "call to undeclared task"
            );
            self.m.warnings.unresolved_procs.insert(name.clone());
            return Ok(Instr::proc_call(name.clone(), defs, uses));
        };

        let formals = match self.m.instr(decl_ref).kind() {
            crate::instr::InstrKind::ProcDecl(data) => data.args.clone(),
            _ => {
                return Err(Error::invariant(format!(
                    "procedure map entry for {name} is not a declaration"
                )));
            }
        };

        if formals.len() != args.len() {
            return Err(Error::invariant(format!(
                "task {name} declared with {} argument(s) but called with {}",
                formals.len(),
                args.len()
            )));
        }

        for ((_, role), actual) in formals.iter().zip(args) {
            let mut actual_defs = IdSet::new();
            let mut actual_ids = IdSet::new();
            self.extract(actual, Role::USE, &mut actual_defs, &mut actual_ids);
            if role.contains(Role::DEF) {
                // Input argument: the call site reads the actual.
                uses.extend(actual_ids.iter().cloned());
            }
            if role.contains(Role::USE) {
                // Output argument: the call site writes the actual.
                defs.extend(actual_ids.iter().cloned());
            }
        }

        Ok(Instr::proc_call(name.clone(), defs, uses))
    }

    fn sensitivity_ids(&mut self, sensitivity: &SensitivityList) -> IdSet {
        let mut ids = IdSet::new();
        match sensitivity {
            // `@*` carries no explicit event identifiers.
            SensitivityList::Star => {}
            SensitivityList::List(items) => {
                for item in items {
                    let mut defs = IdSet::new();
                    let mut uses = IdSet::new();
                    self.extract(&item.signal, Role::USE, &mut defs, &mut uses);
                    ids.extend(uses);
                }
            }
        }
        ids
    }

    fn extract(&mut self, expr: &Expr, hint: Role, defs: &mut IdSet, uses: &mut IdSet) {
        let mut descs = Vec::new();
        describe_expr(
            expr,
            hint,
            &self.m.proc_names,
            &mut self.m.warnings.unresolved_procs,
            &mut descs,
        );
        for desc in descs {
            if desc.role.contains(Role::DEF) {
                defs.insert(desc.name.clone());
            }
            if desc.role.contains(Role::USE) {
                uses.insert(desc.name);
            }
        }
    }

    fn is_listed(&self, block: BlockId) -> bool {
        self.m.listed_blocks().contains(&block)
    }

    fn warn_flattened_loop(&mut self) {
        if !self.warned_loop {
            self.warned_loop = true;
            tracing::warn!(
                module = self.m.name(),
                "loop body flattened into enclosing block; loop-carried dependencies are lost"
            );
        }
    }
}
