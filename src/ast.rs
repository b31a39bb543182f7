//! Parser-adapter AST for the analyzer.
//!
//! Lowering consumes exactly these shapes; it never looks at lexer internals.
//! The enums are closed on purpose: every construct the parser accepts has a
//! lowering rule, and everything else is rejected at parse time.

/// Identifier name, by value. Equality is structural.
pub type Identifier = String;

/// A parsed source file: the top-level modules, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub modules: Vec<ModuleDecl>,
}

/// A Verilog module declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: Identifier,
    /// Parameter names from the ANSI `#(parameter ...)` header list.
    pub params: Vec<Identifier>,
    /// ANSI header port declarations (empty for non-ANSI headers).
    pub ports: Vec<PortDecl>,
    /// Non-ANSI header port names (directions come from body declarations).
    pub port_names: Vec<Identifier>,
    pub items: Vec<ModuleItem>,
}

/// Port or signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    Inout,
}

/// A port declaration, either in an ANSI header or as a module item.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDecl {
    pub direction: Direction,
    pub names: Vec<Identifier>,
}

/// A declared net or variable name with an optional initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclName {
    pub name: Identifier,
    pub init: Option<Expr>,
}

/// An item declared inside a module body.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleItem {
    /// `input`/`output`/`inout` declaration in the module body (non-ANSI).
    PortDecl(PortDecl),
    /// `wire`/`reg`/`integer` declaration; initializers behave like
    /// continuous assignments.
    NetDecl(Vec<DeclName>),
    /// `parameter`/`localparam` declaration.
    ParamDecl(Vec<Identifier>),
    /// `defparam inst.NAME = value;`
    Defparam(Vec<Identifier>),
    /// `assign lhs = rhs, ...;`
    ContAssign(Vec<(Expr, Expr)>),
    /// `always stmt`
    Always(Statement),
    /// `initial stmt`
    Initial(Statement),
    /// Module instantiation: one item may declare several instances.
    Instantiation {
        module: Identifier,
        instances: Vec<Instance>,
    },
    /// `task name; ... endtask`
    TaskDecl(ProcDecl),
    /// `function [range] name; ... endfunction`
    FunctionDecl(ProcDecl),
    /// A bare statement at module scope.
    Statement(Statement),
}

/// One instance within an instantiation item.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: Identifier,
    pub connections: Vec<Connection>,
}

/// A single port binding on an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Formal port name for named connections; `None` for positional ones,
    /// which are matched against the callee's declared port order.
    pub formal: Option<Identifier>,
    /// `None` models an explicitly unconnected port (`.q()`).
    pub actual: Option<Expr>,
}

/// A task or function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDecl {
    pub name: Identifier,
    /// Formal arguments in declaration order, with their directions.
    pub args: Vec<(Identifier, Direction)>,
    pub body: Vec<Statement>,
}

/// A statement in a procedural context.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `lhs = rhs;`
    Blocking { target: Expr, value: Expr },
    /// `lhs <= rhs;`
    NonBlocking { target: Expr, value: Expr },
    /// Procedural continuous assignment: `assign lhs = rhs;`
    ProcAssign { target: Expr, value: Expr },
    /// `deassign lhs;`
    Deassign { target: Expr },
    /// `begin ... end` (sequential) or `fork ... join` (parallel).
    Block { stmts: Vec<Statement> },
    /// `if (cond) s [else s]`
    If {
        condition: Expr,
        then_stmt: Box<Statement>,
        else_stmt: Option<Box<Statement>>,
    },
    /// `case`/`casex`/`casez`
    Case { selector: Expr, arms: Vec<CaseArm> },
    /// `for (init; cond; step) body` — only the body is modeled.
    For {
        init: Box<Statement>,
        condition: Expr,
        step: Box<Statement>,
        body: Box<Statement>,
    },
    /// `while (cond) body`
    While { condition: Expr, body: Box<Statement> },
    /// `repeat (count) body`
    Repeat { count: Expr, body: Box<Statement> },
    /// `forever body`
    Forever { body: Box<Statement> },
    /// `wait (cond) [stmt]`
    Wait {
        condition: Expr,
        body: Option<Box<Statement>>,
    },
    /// `@(...) stmt` — legal only at the head of an `always` body.
    EventControl {
        sensitivity: SensitivityList,
        body: Box<Statement>,
    },
    /// `#delay stmt`
    Delay { delay: Expr, body: Box<Statement> },
    /// `-> event_name;`
    EventTrigger { name: Identifier },
    /// `name(args);` task enable.
    TaskCall { name: Identifier, args: Vec<Expr> },
    /// `$name(args);` — ignored by lowering.
    SystemTaskCall { name: Identifier, args: Vec<Expr> },
    /// `disable name;`
    Disable { name: Identifier },
    /// Lone `;`.
    Null,
}

/// One arm of a case statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    /// Match expressions; empty for the `default` arm.
    pub patterns: Vec<Expr>,
    pub body: Statement,
}

/// Sensitivity list of an event control.
#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityList {
    /// `@*` / `@(*)`
    Star,
    /// `@(posedge clk or a, b)`
    List(Vec<SensitivityItem>),
}

/// A single event in a sensitivity list.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityItem {
    pub edge: Option<Edge>,
    pub signal: Expr,
}

/// Edge specifier of a sensitivity item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Posedge,
    Negedge,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A plain identifier reference.
    Id(Identifier),
    /// A hierarchical name such as `sub.sig`; the analysis keys on the parts.
    Selected(Vec<Identifier>),
    /// Numeric, real, or string literal. The value itself never matters to
    /// the dependence analysis, so only the spelling is kept.
    Literal(String),
    /// Bit select or memory index: `base[idx]`.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// Part select: `base[msb:lsb]` and the `+:`/`-:` forms.
    Range {
        base: Box<Expr>,
        msb: Box<Expr>,
        lsb: Box<Expr>,
    },
    /// `{a, b, c}`
    Concat(Vec<Expr>),
    /// `{n{a}}`
    Replicate { count: Box<Expr>, elems: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `cond ? a : b`
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// User function call; arguments are treated conservatively.
    FuncCall { name: Identifier, args: Vec<Expr> },
    /// `$func(args)`; the function name is not an identifier.
    SystemCall { name: Identifier, args: Vec<Expr> },
}

/// Unary operators; the analysis only cares about operand structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogNot,
    BitNot,
    RedAnd,
    RedNand,
    RedOr,
    RedNor,
    RedXor,
    RedXnor,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    CaseEq,
    CaseNeq,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
    BitAnd,
    BitOr,
    BitXor,
    BitXnor,
    Shl,
    Shr,
    AShl,
    AShr,
}
