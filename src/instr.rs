//! The instruction model: a tagged variant set with frozen def/use sets.
//!
//! Every instruction belongs to exactly one basic block. Def/use sets are
//! fixed when the instruction is appended; the one exception is `Invoke`,
//! whose sets are filled in by link resolution once the callee's port
//! directions are known.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;

use crate::ast::Identifier;
use crate::cfg::{BlockId, ModuleId};
use crate::ids::Role;

/// Ordered set of identifiers.
pub type IdSet = BTreeSet<Identifier>;

/// One instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    kind: InstrKind,
    defs: IdSet,
    uses: IdSet,
}

/// Instruction variants.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// Declared parameter constant.
    Param(Identifier),
    /// Identifiers of an event control heading an `always` block. For timing
    /// purposes the trigger *is* the definition of these identifiers.
    Trigger(IdSet),
    /// Generic procedural statement.
    Stmt,
    /// Continuous assignment.
    Assign,
    /// Module instantiation site.
    Invoke(Invoke),
    /// Predicate deciding a block's successor.
    Cmpr,
    /// Task or function declaration; the body lives in a hidden block.
    ProcDecl(ProcData),
    /// Task enable.
    ProcCall(Identifier),
}

/// Instantiation payload of an [`InstrKind::Invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    /// Name of the instantiated module.
    pub module: Identifier,
    /// Instance name.
    pub instance: Identifier,
    /// Port bindings in source order.
    pub conns: Vec<Conn>,
    /// Resolved callee, filled by link resolution.
    pub callee: Option<ModuleId>,
}

/// A single (formal, actuals) binding on an instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Conn {
    /// Formal port name. Positional bindings start as `None` and are matched
    /// against the callee's declared port order during link resolution.
    pub formal: Option<Identifier>,
    /// Identifiers appearing in the actual expression.
    pub ids: IdSet,
    /// Formal direction from the caller's perspective; empty until resolved,
    /// and left empty for unknown-direction ports.
    pub role: Role,
}

/// Declaration payload of an [`InstrKind::ProcDecl`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcData {
    pub name: Identifier,
    /// Formal arguments in declaration order with caller-perspective roles.
    pub args: Vec<(Identifier, Role)>,
    /// Hidden block holding the lowered body.
    pub body: BlockId,
}

impl Instr {
    /// Parameter constant: defines its own name.
    pub fn param(name: Identifier) -> Self {
        let defs = IdSet::from([name.clone()]);
        Self {
            kind: InstrKind::Param(name),
            defs,
            uses: IdSet::new(),
        }
    }

    /// Trigger: defines every identifier in the event list.
    pub fn trigger(ids: IdSet) -> Self {
        Self {
            kind: InstrKind::Trigger(ids.clone()),
            defs: ids,
            uses: IdSet::new(),
        }
    }

    pub fn stmt(defs: IdSet, uses: IdSet) -> Self {
        Self {
            kind: InstrKind::Stmt,
            defs,
            uses,
        }
    }

    pub fn assign(defs: IdSet, uses: IdSet) -> Self {
        Self {
            kind: InstrKind::Assign,
            defs,
            uses,
        }
    }

    pub fn cmpr(uses: IdSet) -> Self {
        Self {
            kind: InstrKind::Cmpr,
            defs: IdSet::new(),
            uses,
        }
    }

    /// Instantiation; def/use sets stay empty until link resolution.
    pub fn invoke(invoke: Invoke) -> Self {
        Self {
            kind: InstrKind::Invoke(invoke),
            defs: IdSet::new(),
            uses: IdSet::new(),
        }
    }

    /// Declaration instructions define and use nothing themselves.
    pub fn proc_decl(data: ProcData) -> Self {
        Self {
            kind: InstrKind::ProcDecl(data),
            defs: IdSet::new(),
            uses: IdSet::new(),
        }
    }

    /// Task enable: outputs of the callee are defs, inputs are uses.
    pub fn proc_call(name: Identifier, defs: IdSet, uses: IdSet) -> Self {
        Self {
            kind: InstrKind::ProcCall(name),
            defs,
            uses,
        }
    }

    pub fn kind(&self) -> &InstrKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut InstrKind {
        &mut self.kind
    }

    /// Set of identifiers defined by this instruction.
    pub fn defs(&self) -> &IdSet {
        &self.defs
    }

    /// Set of identifiers used by this instruction.
    pub fn uses(&self) -> &IdSet {
        &self.uses
    }

    pub(crate) fn add_def(&mut self, id: Identifier) {
        self.defs.insert(id);
    }

    pub(crate) fn add_use(&mut self, id: Identifier) {
        self.uses.insert(id);
    }

    pub fn is_cmpr(&self) -> bool {
        matches!(self.kind, InstrKind::Cmpr)
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, InstrKind::Trigger(_))
    }

    pub fn as_invoke(&self) -> Option<&Invoke> {
        match &self.kind {
            InstrKind::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstrKind::Param(name) => write!(f, "param {name}")?,
            InstrKind::Trigger(ids) => write!(f, "trigger @({})", ids.iter().join(", "))?,
            InstrKind::Stmt => write!(f, "stmt")?,
            InstrKind::Assign => write!(f, "assign")?,
            InstrKind::Invoke(invoke) => {
                write!(f, "invoke {} {}", invoke.module, invoke.instance)?;
            }
            InstrKind::Cmpr => write!(f, "cmpr")?,
            InstrKind::ProcDecl(data) => write!(f, "procdecl {}", data.name)?,
            InstrKind::ProcCall(name) => write!(f, "proccall {name}")?,
        }
        write!(
            f,
            "  [def: {}] [use: {}]",
            self.defs.iter().join(" "),
            self.uses.iter().join(" ")
        )
    }
}
