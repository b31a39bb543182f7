//! Recursive-descent parser for the Verilog subset the analyzer ingests.
//!
//! The grammar is Verilog-2001 restricted to what lowering models: modules,
//! declarations, continuous assignments, procedural blocks, instantiations,
//! and tasks/functions. SystemVerilog-only constructs and gate primitives are
//! rejected with a fatal diagnostic rather than silently approximated.
//! Vector ranges and parameter values are parsed but discarded where they
//! cannot carry a dependence.

use std::path::Path;

use crate::ast::{
    BinaryOp, CaseArm, Connection, DeclName, Direction, Edge, Expr, Instance, ModuleDecl,
    ModuleItem, PortDecl, ProcDecl, SensitivityItem, SensitivityList, SourceUnit, Statement,
    UnaryOp,
};
use crate::error::{Error, Result};
use crate::lexer::{self, Kw, Tok, Token};

/// Parse a complete source file.
pub fn parse(path: &Path, source: &str) -> Result<SourceUnit> {
    let tokens = lexer::lex(path, source)?;
    let mut parser = Parser {
        path,
        tokens,
        pos: 0,
    };
    parser.source_unit()
}

struct Parser<'a> {
    path: &'a Path,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek2(&self) -> &Tok {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].tok
    }

    fn bump(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        self.eat(&Tok::Kw(kw))
    }

    fn err(&self, message: impl Into<String>) -> Error {
        let token = &self.tokens[self.pos];
        Error::parse(self.path, token.line, token.col, message)
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_kw(&mut self, kw: Kw, what: &str) -> Result<()> {
        self.expect(&Tok::Kw(kw), what)
    }

    fn expect_id(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Tok::Id(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            other => Err(self.err(format!("expected {what}, found {other:?}"))),
        }
    }

    // ------------------------------------------------------------------
    // Source structure
    // ------------------------------------------------------------------

    fn source_unit(&mut self) -> Result<SourceUnit> {
        let mut modules = Vec::new();
        while *self.peek() != Tok::Eof {
            if !self.eat_kw(Kw::Module) {
                return Err(self.err(format!("expected `module`, found {:?}", self.peek())));
            }
            modules.push(self.module_decl()?);
        }
        Ok(SourceUnit { modules })
    }

    fn module_decl(&mut self) -> Result<ModuleDecl> {
        let name = self.expect_id("module name")?;
        let mut module = ModuleDecl {
            name,
            params: Vec::new(),
            ports: Vec::new(),
            port_names: Vec::new(),
            items: Vec::new(),
        };

        if self.eat(&Tok::Hash) {
            self.expect(&Tok::LParen, "`(` after `#`")?;
            module.params = self.parameter_names(&Tok::RParen)?;
            self.expect(&Tok::RParen, "`)` closing parameter list")?;
        }

        if self.eat(&Tok::LParen) {
            self.module_port_list(&mut module)?;
            self.expect(&Tok::RParen, "`)` closing port list")?;
        }
        self.expect(&Tok::Semi, "`;` after module header")?;

        while !self.eat_kw(Kw::Endmodule) {
            if *self.peek() == Tok::Eof {
                return Err(self.err("unexpected end of file inside module body"));
            }
            if let Some(item) = self.module_item()? {
                module.items.push(item);
            }
        }

        Ok(module)
    }

    /// `#(parameter A = 1, B = 2)` and body `parameter`/`localparam` lists:
    /// collect declared names, discard types, ranges, and values.
    fn parameter_names(&mut self, terminator: &Tok) -> Result<Vec<String>> {
        let mut names = Vec::new();
        while self.peek() != terminator {
            while matches!(
                self.peek(),
                Tok::Kw(Kw::Parameter | Kw::Localparam | Kw::Integer | Kw::Real | Kw::Signed)
            ) {
                self.bump();
            }
            self.skip_range()?;
            names.push(self.expect_id("parameter name")?);
            if self.eat(&Tok::Eq) {
                self.expr()?;
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(names)
    }

    fn module_port_list(&mut self, module: &mut ModuleDecl) -> Result<()> {
        if *self.peek() == Tok::RParen {
            return Ok(());
        }

        if matches!(self.peek(), Tok::Kw(Kw::Input | Kw::Output | Kw::Inout)) {
            // ANSI header: directions inline; names without a direction
            // extend the previous declaration.
            let mut current: Option<PortDecl> = None;
            loop {
                if let Some(direction) = self.try_direction() {
                    if let Some(done) = current.take() {
                        module.ports.push(done);
                    }
                    self.skip_net_type();
                    self.skip_range()?;
                    current = Some(PortDecl {
                        direction,
                        names: Vec::new(),
                    });
                }
                let name = self.expect_id("port name")?;
                self.skip_range()?;
                match current.as_mut() {
                    Some(decl) => decl.names.push(name),
                    None => return Err(self.err("port name before any direction")),
                }
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            if let Some(done) = current {
                module.ports.push(done);
            }
        } else {
            // Non-ANSI header: names only; directions come from body items.
            loop {
                module.port_names.push(self.expect_id("port name")?);
                self.skip_range()?;
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn try_direction(&mut self) -> Option<Direction> {
        let direction = match self.peek() {
            Tok::Kw(Kw::Input) => Direction::Input,
            Tok::Kw(Kw::Output) => Direction::Output,
            Tok::Kw(Kw::Inout) => Direction::Inout,
            _ => return None,
        };
        self.bump();
        Some(direction)
    }

    fn skip_net_type(&mut self) {
        while matches!(
            self.peek(),
            Tok::Kw(
                Kw::Wire
                    | Kw::Tri
                    | Kw::Supply0
                    | Kw::Supply1
                    | Kw::Reg
                    | Kw::Logic
                    | Kw::Integer
                    | Kw::Real
                    | Kw::Signed
            )
        ) {
            self.bump();
        }
    }

    /// Parse and discard a `[msb:lsb]` range if present. Dimensions carry no
    /// dependence of their own at declaration sites.
    fn skip_range(&mut self) -> Result<()> {
        while *self.peek() == Tok::LBracket {
            self.bump();
            self.expr()?;
            if self.eat(&Tok::Colon) {
                self.expr()?;
            }
            self.expect(&Tok::RBracket, "`]` closing range")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Module items
    // ------------------------------------------------------------------

    fn module_item(&mut self) -> Result<Option<ModuleItem>> {
        match self.peek().clone() {
            Tok::Kw(Kw::Input | Kw::Output | Kw::Inout) => {
                let Some(direction) = self.try_direction() else {
                    return Err(self.err("expected port direction"));
                };
                self.skip_net_type();
                self.skip_range()?;
                let mut names = vec![self.expect_id("port name")?];
                while self.eat(&Tok::Comma) {
                    names.push(self.expect_id("port name")?);
                }
                self.expect(&Tok::Semi, "`;` after port declaration")?;
                Ok(Some(ModuleItem::PortDecl(PortDecl { direction, names })))
            }
            Tok::Kw(
                Kw::Wire
                | Kw::Tri
                | Kw::Supply0
                | Kw::Supply1
                | Kw::Reg
                | Kw::Logic
                | Kw::Integer
                | Kw::Real
                | Kw::Event,
            ) => {
                self.bump();
                self.skip_net_type();
                self.skip_range()?;
                let mut names = vec![self.decl_name()?];
                while self.eat(&Tok::Comma) {
                    names.push(self.decl_name()?);
                }
                self.expect(&Tok::Semi, "`;` after declaration")?;
                Ok(Some(ModuleItem::NetDecl(names)))
            }
            Tok::Kw(Kw::Parameter | Kw::Localparam) => {
                let names = self.parameter_names(&Tok::Semi)?;
                self.expect(&Tok::Semi, "`;` after parameter declaration")?;
                Ok(Some(ModuleItem::ParamDecl(names)))
            }
            Tok::Kw(Kw::Defparam) => {
                self.bump();
                let mut names = Vec::new();
                loop {
                    names.push(self.dotted_name()?);
                    self.expect(&Tok::Eq, "`=` in defparam")?;
                    self.expr()?;
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::Semi, "`;` after defparam")?;
                Ok(Some(ModuleItem::Defparam(names)))
            }
            Tok::Kw(Kw::Assign) => {
                self.bump();
                if self.eat(&Tok::Hash) {
                    self.delay_value()?;
                }
                let mut assigns = Vec::new();
                loop {
                    let target = self.lvalue()?;
                    self.expect(&Tok::Eq, "`=` in continuous assignment")?;
                    let value = self.expr()?;
                    assigns.push((target, value));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(&Tok::Semi, "`;` after continuous assignment")?;
                Ok(Some(ModuleItem::ContAssign(assigns)))
            }
            Tok::Kw(Kw::Always) => {
                self.bump();
                Ok(Some(ModuleItem::Always(self.statement()?)))
            }
            Tok::Kw(Kw::Initial) => {
                self.bump();
                Ok(Some(ModuleItem::Initial(self.statement()?)))
            }
            Tok::Kw(Kw::Task) => Ok(Some(ModuleItem::TaskDecl(self.task_decl()?))),
            Tok::Kw(Kw::Function) => Ok(Some(ModuleItem::FunctionDecl(self.function_decl()?))),
            Tok::Kw(Kw::Genvar) => {
                self.bump();
                self.expect_id("genvar name")?;
                while self.eat(&Tok::Comma) {
                    self.expect_id("genvar name")?;
                }
                self.expect(&Tok::Semi, "`;` after genvar declaration")?;
                Ok(None)
            }
            Tok::Kw(Kw::Generate) => {
                // Not lowered; dependencies through generated logic are lost.
                tracing::warn!("skipping generate block (not modeled)");
                let mut depth = 1usize;
                loop {
                    match self.bump() {
                        Tok::Kw(Kw::Generate) => depth += 1,
                        Tok::Kw(Kw::Endgenerate) => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Tok::Eof => return Err(self.err("unterminated generate block")),
                        _ => {}
                    }
                }
                Ok(None)
            }
            Tok::Kw(
                Kw::And | Kw::Nand | Kw::Nor | Kw::Xor | Kw::Xnor | Kw::Not | Kw::Buf | Kw::Or,
            ) => Err(self.err("gate-primitive instantiation is not supported")),
            Tok::Kw(Kw::Specify) => Err(self.err("specify block is not supported")),
            Tok::Kw(Kw::Module) => Err(self.err("nested module definitions are not supported")),
            Tok::Id(_) if self.looks_like_instantiation() => Ok(Some(self.instantiation_item()?)),
            // A bare statement at module scope.
            _ => Ok(Some(ModuleItem::Statement(self.statement()?))),
        }
    }

    fn decl_name(&mut self) -> Result<DeclName> {
        let name = self.expect_id("declared name")?;
        self.skip_range()?;
        let init = if self.eat(&Tok::Eq) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(DeclName { name, init })
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_id("name")?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.expect_id("name after `.`")?);
        }
        Ok(name)
    }

    /// `Mod inst(...)` vs. a bare statement starting with an identifier:
    /// an instantiation is two identifiers in a row (optionally `#(...)`).
    fn looks_like_instantiation(&self) -> bool {
        matches!(
            (self.peek(), self.peek2()),
            (Tok::Id(_), Tok::Id(_)) | (Tok::Id(_), Tok::Hash)
        )
    }

    fn instantiation_item(&mut self) -> Result<ModuleItem> {
        let module = self.expect_id("module name")?;
        if self.eat(&Tok::Hash) {
            // Parameter overrides do not carry port dependencies.
            self.expect(&Tok::LParen, "`(` after `#`")?;
            self.connection_list()?;
            self.expect(&Tok::RParen, "`)` closing parameter overrides")?;
        }
        let mut instances = Vec::new();
        loop {
            let name = self.expect_id("instance name")?;
            self.skip_range()?;
            self.expect(&Tok::LParen, "`(` opening port connections")?;
            let connections = self.connection_list()?;
            self.expect(&Tok::RParen, "`)` closing port connections")?;
            instances.push(Instance { name, connections });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::Semi, "`;` after instantiation")?;
        Ok(ModuleItem::Instantiation { module, instances })
    }

    fn connection_list(&mut self) -> Result<Vec<Connection>> {
        let mut connections = Vec::new();
        if *self.peek() == Tok::RParen {
            return Ok(connections);
        }
        loop {
            if self.eat(&Tok::Dot) {
                let formal = self.expect_id("formal port name")?;
                self.expect(&Tok::LParen, "`(` after formal port name")?;
                let actual = if *self.peek() == Tok::RParen {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&Tok::RParen, "`)` closing port connection")?;
                connections.push(Connection {
                    formal: Some(formal),
                    actual,
                });
            } else if *self.peek() == Tok::Comma || *self.peek() == Tok::RParen {
                // Unconnected positional slot.
                connections.push(Connection {
                    formal: None,
                    actual: None,
                });
            } else {
                connections.push(Connection {
                    formal: None,
                    actual: Some(self.expr()?),
                });
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(connections)
    }

    fn task_decl(&mut self) -> Result<ProcDecl> {
        self.expect_kw(Kw::Task, "`task`")?;
        self.eat_kw(Kw::Automatic);
        let name = self.expect_id("task name")?;
        let mut args = Vec::new();
        if self.eat(&Tok::LParen) {
            self.proc_port_list(&mut args)?;
            self.expect(&Tok::RParen, "`)` closing task ports")?;
        }
        self.expect(&Tok::Semi, "`;` after task header")?;

        let body = self.proc_body(&mut args, Kw::Endtask)?;
        Ok(ProcDecl { name, args, body })
    }

    fn function_decl(&mut self) -> Result<ProcDecl> {
        self.expect_kw(Kw::Function, "`function`")?;
        self.eat_kw(Kw::Automatic);
        self.skip_net_type();
        self.skip_range()?;
        let name = self.expect_id("function name")?;
        let mut args = Vec::new();
        if self.eat(&Tok::LParen) {
            self.proc_port_list(&mut args)?;
            self.expect(&Tok::RParen, "`)` closing function ports")?;
        }
        self.expect(&Tok::Semi, "`;` after function header")?;

        let body = self.proc_body(&mut args, Kw::Endfunction)?;
        Ok(ProcDecl { name, args, body })
    }

    fn proc_port_list(&mut self, args: &mut Vec<(String, Direction)>) -> Result<()> {
        if *self.peek() == Tok::RParen {
            return Ok(());
        }
        let mut direction = Direction::Input;
        loop {
            if let Some(dir) = self.try_direction() {
                direction = dir;
            }
            self.skip_net_type();
            self.skip_range()?;
            args.push((self.expect_id("argument name")?, direction));
            if !self.eat(&Tok::Comma) {
                return Ok(());
            }
        }
    }

    /// Declarations then statements, up to the given end keyword.
    fn proc_body(
        &mut self,
        args: &mut Vec<(String, Direction)>,
        end: Kw,
    ) -> Result<Vec<Statement>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Kw(kw) if *kw == end => {
                    self.bump();
                    return Ok(body);
                }
                Tok::Eof => return Err(self.err("unexpected end of file in task/function body")),
                Tok::Kw(Kw::Input | Kw::Output | Kw::Inout) => {
                    let Some(direction) = self.try_direction() else {
                        return Err(self.err("expected argument direction"));
                    };
                    self.skip_net_type();
                    self.skip_range()?;
                    args.push((self.expect_id("argument name")?, direction));
                    while self.eat(&Tok::Comma) {
                        args.push((self.expect_id("argument name")?, direction));
                    }
                    self.expect(&Tok::Semi, "`;` after argument declaration")?;
                }
                Tok::Kw(Kw::Reg | Kw::Logic | Kw::Integer | Kw::Real | Kw::Wire) => {
                    self.bump();
                    self.skip_net_type();
                    self.skip_range()?;
                    self.decl_name()?;
                    while self.eat(&Tok::Comma) {
                        self.decl_name()?;
                    }
                    self.expect(&Tok::Semi, "`;` after local declaration")?;
                }
                _ => body.push(self.statement()?),
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Statement> {
        match self.peek().clone() {
            Tok::Semi => {
                self.bump();
                Ok(Statement::Null)
            }
            Tok::Kw(Kw::Begin) => self.block(Kw::End),
            Tok::Kw(Kw::Fork) => self.block(Kw::Join),
            Tok::Kw(Kw::If) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `if`")?;
                let condition = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing if condition")?;
                let then_stmt = Box::new(self.statement()?);
                let else_stmt = if self.eat_kw(Kw::Else) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Statement::If {
                    condition,
                    then_stmt,
                    else_stmt,
                })
            }
            Tok::Kw(Kw::Case | Kw::Casex | Kw::Casez) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `case`")?;
                let selector = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing case selector")?;
                let mut arms = Vec::new();
                while !self.eat_kw(Kw::Endcase) {
                    if *self.peek() == Tok::Eof {
                        return Err(self.err("unexpected end of file in case statement"));
                    }
                    let patterns = if self.eat_kw(Kw::Default) {
                        self.eat(&Tok::Colon);
                        Vec::new()
                    } else {
                        let mut patterns = vec![self.expr()?];
                        while self.eat(&Tok::Comma) {
                            patterns.push(self.expr()?);
                        }
                        self.expect(&Tok::Colon, "`:` after case patterns")?;
                        patterns
                    };
                    let body = self.statement()?;
                    arms.push(CaseArm { patterns, body });
                }
                Ok(Statement::Case { selector, arms })
            }
            Tok::Kw(Kw::For) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `for`")?;
                let init = Box::new(self.simple_assignment()?);
                self.expect(&Tok::Semi, "`;` after for initializer")?;
                let condition = self.expr()?;
                self.expect(&Tok::Semi, "`;` after for condition")?;
                let step = Box::new(self.simple_assignment()?);
                self.expect(&Tok::RParen, "`)` closing for header")?;
                let body = Box::new(self.statement()?);
                Ok(Statement::For {
                    init,
                    condition,
                    step,
                    body,
                })
            }
            Tok::Kw(Kw::While) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `while`")?;
                let condition = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing while condition")?;
                Ok(Statement::While {
                    condition,
                    body: Box::new(self.statement()?),
                })
            }
            Tok::Kw(Kw::Repeat) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `repeat`")?;
                let count = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing repeat count")?;
                Ok(Statement::Repeat {
                    count,
                    body: Box::new(self.statement()?),
                })
            }
            Tok::Kw(Kw::Forever) => {
                self.bump();
                Ok(Statement::Forever {
                    body: Box::new(self.statement()?),
                })
            }
            Tok::Kw(Kw::Wait) => {
                self.bump();
                self.expect(&Tok::LParen, "`(` after `wait`")?;
                let condition = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing wait condition")?;
                let body = if self.eat(&Tok::Semi) {
                    None
                } else {
                    Some(Box::new(self.statement()?))
                };
                Ok(Statement::Wait { condition, body })
            }
            Tok::At => {
                self.bump();
                let sensitivity = self.sensitivity_list()?;
                Ok(Statement::EventControl {
                    sensitivity,
                    body: Box::new(self.statement()?),
                })
            }
            Tok::Hash => {
                self.bump();
                let delay = self.delay_value()?;
                Ok(Statement::Delay {
                    delay,
                    body: Box::new(self.statement()?),
                })
            }
            Tok::Arrow => {
                self.bump();
                let name = self.expect_id("event name after `->`")?;
                self.expect(&Tok::Semi, "`;` after event trigger")?;
                Ok(Statement::EventTrigger { name })
            }
            Tok::Kw(Kw::Disable) => {
                self.bump();
                let name = self.expect_id("name after `disable`")?;
                self.expect(&Tok::Semi, "`;` after disable")?;
                Ok(Statement::Disable { name })
            }
            Tok::Kw(Kw::Assign) => {
                self.bump();
                let target = self.lvalue()?;
                self.expect(&Tok::Eq, "`=` in procedural assign")?;
                let value = self.expr()?;
                self.expect(&Tok::Semi, "`;` after procedural assign")?;
                Ok(Statement::ProcAssign { target, value })
            }
            Tok::Kw(Kw::Deassign) => {
                self.bump();
                let target = self.lvalue()?;
                self.expect(&Tok::Semi, "`;` after deassign")?;
                Ok(Statement::Deassign { target })
            }
            Tok::SysId(name) => {
                self.bump();
                let mut args = Vec::new();
                if self.eat(&Tok::LParen) {
                    if *self.peek() != Tok::RParen {
                        args.push(self.expr()?);
                        while self.eat(&Tok::Comma) {
                            args.push(self.expr()?);
                        }
                    }
                    self.expect(&Tok::RParen, "`)` closing system task arguments")?;
                }
                self.expect(&Tok::Semi, "`;` after system task")?;
                Ok(Statement::SystemTaskCall { name, args })
            }
            Tok::Id(name) if *self.peek2() == Tok::LParen => {
                // Task enable with arguments.
                self.bump();
                self.bump();
                let mut args = Vec::new();
                if *self.peek() != Tok::RParen {
                    args.push(self.expr()?);
                    while self.eat(&Tok::Comma) {
                        args.push(self.expr()?);
                    }
                }
                self.expect(&Tok::RParen, "`)` closing task arguments")?;
                self.expect(&Tok::Semi, "`;` after task enable")?;
                Ok(Statement::TaskCall { name, args })
            }
            Tok::Id(name) if *self.peek2() == Tok::Semi => {
                // Argument-less task enable.
                self.bump();
                self.bump();
                Ok(Statement::TaskCall {
                    name,
                    args: Vec::new(),
                })
            }
            _ => {
                let stmt = self.simple_assignment()?;
                self.expect(&Tok::Semi, "`;` after assignment")?;
                Ok(stmt)
            }
        }
    }

    fn block(&mut self, end: Kw) -> Result<Statement> {
        self.bump(); // begin / fork
        if self.eat(&Tok::Colon) {
            self.expect_id("block label")?;
        }
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Tok::Kw(kw) if *kw == end => {
                    self.bump();
                    return Ok(Statement::Block { stmts });
                }
                Tok::Eof => return Err(self.err("unexpected end of file in block")),
                // Local declarations inside named blocks carry no assignments.
                Tok::Kw(Kw::Reg | Kw::Logic | Kw::Integer | Kw::Real | Kw::Wire) => {
                    self.bump();
                    self.skip_net_type();
                    self.skip_range()?;
                    self.expect_id("declared name")?;
                    while self.eat(&Tok::Comma) {
                        self.expect_id("declared name")?;
                    }
                    self.expect(&Tok::Semi, "`;` after local declaration")?;
                }
                _ => stmts.push(self.statement()?),
            }
        }
    }

    /// `lhs = rhs` or `lhs <= rhs`, without the trailing `;` (shared with
    /// `for` headers). Intra-assignment timing controls are discarded.
    fn simple_assignment(&mut self) -> Result<Statement> {
        let target = self.lvalue()?;
        let blocking = if self.eat(&Tok::Eq) {
            true
        } else if self.eat(&Tok::Le) {
            false
        } else {
            return Err(self.err(format!(
                "expected `=` or `<=` in assignment, found {:?}",
                self.peek()
            )));
        };
        if self.eat(&Tok::Hash) {
            self.delay_value()?;
        } else if self.eat(&Tok::At) {
            self.sensitivity_list()?;
        }
        let value = self.expr()?;
        if blocking {
            Ok(Statement::Blocking { target, value })
        } else {
            Ok(Statement::NonBlocking { target, value })
        }
    }

    fn sensitivity_list(&mut self) -> Result<SensitivityList> {
        if self.eat(&Tok::Star) {
            return Ok(SensitivityList::Star);
        }
        if !self.eat(&Tok::LParen) {
            // `@clk` shorthand.
            let signal = Expr::Id(self.expect_id("event identifier")?);
            return Ok(SensitivityList::List(vec![SensitivityItem {
                edge: None,
                signal,
            }]));
        }
        if self.eat(&Tok::Star) {
            self.expect(&Tok::RParen, "`)` closing `@(*)`")?;
            return Ok(SensitivityList::Star);
        }
        let mut items = Vec::new();
        loop {
            let edge = if self.eat_kw(Kw::Posedge) {
                Some(Edge::Posedge)
            } else if self.eat_kw(Kw::Negedge) {
                Some(Edge::Negedge)
            } else {
                None
            };
            let signal = self.expr()?;
            items.push(SensitivityItem { edge, signal });
            if !(self.eat_kw(Kw::Or) || self.eat(&Tok::Comma)) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` closing sensitivity list")?;
        Ok(SensitivityList::List(items))
    }

    fn delay_value(&mut self) -> Result<Expr> {
        if self.eat(&Tok::LParen) {
            let expr = self.expr()?;
            self.expect(&Tok::RParen, "`)` closing delay")?;
            Ok(expr)
        } else {
            self.primary()
        }
    }

    /// Assignment targets: identifiers with selects, or concatenations.
    fn lvalue(&mut self) -> Result<Expr> {
        match self.peek() {
            Tok::LBrace => self.primary(),
            Tok::Id(_) => self.postfix_id(),
            other => Err(self.err(format!("expected assignment target, found {other:?}"))),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr> {
        let condition = self.binary_expr(0)?;
        if self.eat(&Tok::Question) {
            let then_expr = Box::new(self.expr()?);
            self.expect(&Tok::Colon, "`:` in conditional expression")?;
            let else_expr = Box::new(self.expr()?);
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_expr,
                else_expr,
            });
        }
        Ok(condition)
    }

    fn binary_op(&self, min_prec: u8) -> Option<(BinaryOp, u8)> {
        let (op, prec) = match self.peek() {
            Tok::PipePipe => (BinaryOp::LogOr, 1),
            Tok::AmpAmp => (BinaryOp::LogAnd, 2),
            Tok::Pipe => (BinaryOp::BitOr, 3),
            Tok::Caret => (BinaryOp::BitXor, 4),
            Tok::TildeCaret => (BinaryOp::BitXnor, 4),
            Tok::Amp => (BinaryOp::BitAnd, 5),
            Tok::EqEq => (BinaryOp::Eq, 6),
            Tok::BangEq => (BinaryOp::Neq, 6),
            Tok::EqEqEq => (BinaryOp::CaseEq, 6),
            Tok::BangEqEq => (BinaryOp::CaseNeq, 6),
            Tok::Lt => (BinaryOp::Lt, 7),
            Tok::Le => (BinaryOp::Le, 7),
            Tok::Gt => (BinaryOp::Gt, 7),
            Tok::Ge => (BinaryOp::Ge, 7),
            Tok::Shl => (BinaryOp::Shl, 8),
            Tok::Shr => (BinaryOp::Shr, 8),
            Tok::AShl => (BinaryOp::AShl, 8),
            Tok::AShr => (BinaryOp::AShr, 8),
            Tok::Plus => (BinaryOp::Add, 9),
            Tok::Minus => (BinaryOp::Sub, 9),
            Tok::Star => (BinaryOp::Mul, 10),
            Tok::Slash => (BinaryOp::Div, 10),
            Tok::Percent => (BinaryOp::Mod, 10),
            Tok::StarStar => (BinaryOp::Pow, 11),
            _ => return None,
        };
        (prec >= min_prec).then_some((op, prec))
    }

    fn binary_expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.unary_expr()?;
        while let Some((op, prec)) = self.binary_op(min_prec) {
            self.bump();
            let right = self.binary_expr(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Tok::Plus => UnaryOp::Plus,
            Tok::Minus => UnaryOp::Minus,
            Tok::Bang => UnaryOp::LogNot,
            Tok::Tilde => UnaryOp::BitNot,
            Tok::Amp => UnaryOp::RedAnd,
            Tok::TildeAmp => UnaryOp::RedNand,
            Tok::Pipe => UnaryOp::RedOr,
            Tok::TildePipe => UnaryOp::RedNor,
            Tok::Caret => UnaryOp::RedXor,
            Tok::TildeCaret => UnaryOp::RedXnor,
            _ => return self.primary(),
        };
        self.bump();
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary_expr()?),
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Tok::Number(text) => {
                self.bump();
                Ok(Expr::Literal(text))
            }
            Tok::Str(text) => {
                self.bump();
                Ok(Expr::Literal(text))
            }
            Tok::LParen => {
                self.bump();
                let expr = self.expr()?;
                self.expect(&Tok::RParen, "`)` closing parenthesized expression")?;
                Ok(expr)
            }
            Tok::LBrace => {
                self.bump();
                let first = self.expr()?;
                if *self.peek() == Tok::LBrace {
                    // Replication: {count{a, b}}.
                    self.bump();
                    let mut elems = vec![self.expr()?];
                    while self.eat(&Tok::Comma) {
                        elems.push(self.expr()?);
                    }
                    self.expect(&Tok::RBrace, "`}` closing replication body")?;
                    self.expect(&Tok::RBrace, "`}` closing replication")?;
                    return Ok(Expr::Replicate {
                        count: Box::new(first),
                        elems,
                    });
                }
                let mut elems = vec![first];
                while self.eat(&Tok::Comma) {
                    elems.push(self.expr()?);
                }
                self.expect(&Tok::RBrace, "`}` closing concatenation")?;
                Ok(Expr::Concat(elems))
            }
            Tok::SysId(name) => {
                self.bump();
                let mut args = Vec::new();
                if self.eat(&Tok::LParen) {
                    if *self.peek() != Tok::RParen {
                        args.push(self.expr()?);
                        while self.eat(&Tok::Comma) {
                            args.push(self.expr()?);
                        }
                    }
                    self.expect(&Tok::RParen, "`)` closing system call")?;
                }
                Ok(Expr::SystemCall { name, args })
            }
            Tok::Id(_) => self.postfix_id(),
            other => Err(self.err(format!("expected expression, found {other:?}"))),
        }
    }

    /// An identifier with optional call, hierarchy, and select suffixes.
    fn postfix_id(&mut self) -> Result<Expr> {
        let name = self.expect_id("identifier")?;

        if *self.peek() == Tok::LParen {
            self.bump();
            let mut args = Vec::new();
            if *self.peek() != Tok::RParen {
                args.push(self.expr()?);
                while self.eat(&Tok::Comma) {
                    args.push(self.expr()?);
                }
            }
            self.expect(&Tok::RParen, "`)` closing function call")?;
            return Ok(Expr::FuncCall { name, args });
        }

        let mut expr = if *self.peek() == Tok::Dot {
            let mut parts = vec![name];
            while self.eat(&Tok::Dot) {
                parts.push(self.expect_id("name after `.`")?);
            }
            Expr::Selected(parts)
        } else {
            Expr::Id(name)
        };

        while *self.peek() == Tok::LBracket {
            self.bump();
            let first = self.expr()?;
            expr = if self.eat(&Tok::Colon) {
                let lsb = self.expr()?;
                Expr::Range {
                    base: Box::new(expr),
                    msb: Box::new(first),
                    lsb: Box::new(lsb),
                }
            } else if self.eat(&Tok::PlusColon) || self.eat(&Tok::MinusColon) {
                let width = self.expr()?;
                Expr::Range {
                    base: Box::new(expr),
                    msb: Box::new(first),
                    lsb: Box::new(width),
                }
            } else {
                Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(first),
                }
            };
            self.expect(&Tok::RBracket, "`]` closing select")?;
        }

        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse_ok(src: &str) -> SourceUnit {
        parse(&PathBuf::from("test.v"), src).expect("parse should succeed")
    }

    fn parse_err(src: &str) -> Error {
        parse(&PathBuf::from("test.v"), src).expect_err("parse should fail")
    }

    #[test]
    fn parses_ansi_module() {
        let unit = parse_ok("module Id(input a, output b); assign b = a; endmodule");
        assert_eq!(unit.modules.len(), 1);
        let module = &unit.modules[0];
        assert_eq!(module.name, "Id");
        assert_eq!(module.ports.len(), 2);
        assert_eq!(module.ports[0].direction, Direction::Input);
        assert_eq!(module.ports[1].direction, Direction::Output);
        assert!(matches!(module.items[0], ModuleItem::ContAssign(_)));
    }

    #[test]
    fn parses_ansi_header_with_shared_direction() {
        let unit = parse_ok("module m(input a, b, output c); endmodule");
        let module = &unit.modules[0];
        assert_eq!(module.ports[0].names, vec!["a", "b"]);
        assert_eq!(module.ports[1].names, vec!["c"]);
    }

    #[test]
    fn parses_non_ansi_module() {
        let unit = parse_ok("module m(a, b); input a; output b; assign b = a; endmodule");
        let module = &unit.modules[0];
        assert_eq!(module.port_names, vec!["a", "b"]);
        assert!(matches!(module.items[0], ModuleItem::PortDecl(_)));
    }

    #[test]
    fn parses_always_with_sensitivity() {
        let unit = parse_ok(
            "module Reg(input clk, input d, output reg q);\
             always @(posedge clk) q <= d;\
             endmodule",
        );
        let ModuleItem::Always(stmt) = &unit.modules[0].items[0] else {
            panic!("expected always item");
        };
        let Statement::EventControl { sensitivity, body } = stmt else {
            panic!("expected event control at always head");
        };
        let SensitivityList::List(items) = sensitivity else {
            panic!("expected explicit sensitivity list");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].edge, Some(Edge::Posedge));
        assert!(matches!(**body, Statement::NonBlocking { .. }));
    }

    #[test]
    fn parses_if_else_and_case() {
        let unit = parse_ok(
            "module m(input s, output reg q);\
             always @(s) begin\
               if (s) q = 1; else q = 0;\
               case (s)\
                 1'b0: q = 0;\
                 default: q = 1;\
               endcase\
             end\
             endmodule",
        );
        assert_eq!(unit.modules[0].items.len(), 1);
    }

    #[test]
    fn parses_instantiation_named_and_positional() {
        let unit = parse_ok(
            "module Outer(input a, output b);\
             Inner i0(.x(a), .y(b));\
             Inner i1(a, b);\
             endmodule",
        );
        let items = &unit.modules[0].items;
        let ModuleItem::Instantiation { module, instances } = &items[0] else {
            panic!("expected instantiation");
        };
        assert_eq!(module, "Inner");
        assert_eq!(instances[0].connections[0].formal.as_deref(), Some("x"));
        let ModuleItem::Instantiation { instances, .. } = &items[1] else {
            panic!("expected instantiation");
        };
        assert_eq!(instances[0].connections[0].formal, None);
    }

    #[test]
    fn parses_task_with_directions() {
        let unit = parse_ok(
            "module m;\
             task t;\
               input a;\
               output b;\
               b = a;\
             endtask\
             endmodule",
        );
        let ModuleItem::TaskDecl(decl) = &unit.modules[0].items[0] else {
            panic!("expected task declaration");
        };
        assert_eq!(
            decl.args,
            vec![
                ("a".to_string(), Direction::Input),
                ("b".to_string(), Direction::Output)
            ]
        );
        assert_eq!(decl.body.len(), 1);
    }

    #[test]
    fn parses_expressions_with_precedence() {
        let unit = parse_ok("module m(input a, b, c, output o); assign o = a | b & c; endmodule");
        let ModuleItem::ContAssign(assigns) = &unit.modules[0].items[0] else {
            panic!("expected continuous assign");
        };
        let Expr::Binary { op, right, .. } = &assigns[0].1 else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::BitOr);
        assert!(matches!(
            **right,
            Expr::Binary {
                op: BinaryOp::BitAnd,
                ..
            }
        ));
    }

    #[test]
    fn parses_ternary_concat_and_selects() {
        parse_ok(
            "module m(input s, input [7:0] x, y, output [7:0] z, output w);\
             assign z = s ? {x[3:0], y[7:4]} : {2{x[1:0]}};\
             assign w = z[s];\
             endmodule",
        );
    }

    #[test]
    fn rejects_gate_primitives() {
        let err = parse_err("module m(input a, output y); and g(y, a); endmodule");
        assert!(err.to_string().contains("gate-primitive"));
    }

    #[test]
    fn rejects_nested_modules() {
        let err = parse_err("module m; module inner; endmodule endmodule");
        assert!(err.to_string().contains("nested module"));
    }

    #[test]
    fn skips_generate_blocks() {
        let unit = parse_ok(
            "module m(input a, output b);\
             generate genvar i; endgenerate\
             assign b = a;\
             endmodule",
        );
        assert_eq!(unit.modules[0].items.len(), 1);
    }

    #[test]
    fn parse_error_carries_position() {
        let err = parse_err("module m(input a output b); endmodule");
        let Error::Parse { line, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(line, 1);
    }

    #[test]
    fn parses_delay_wait_and_trigger() {
        parse_ok(
            "module m(input a, output reg q);\
             always @(a) begin\
               #5 q = a;\
               wait (a) q = 0;\
               -> done;\
             end\
             endmodule",
        );
    }
}
