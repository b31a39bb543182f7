//! Hand-written lexer for the Verilog subset the analyzer ingests.
//!
//! Produces a flat token stream with line/column positions. Comments are
//! skipped; compiler directives (`` `timescale `` and friends) are consumed
//! to end of line, since macro expansion is outside the analyzer's scope.

use std::path::Path;

use crate::error::{Error, Result};

/// A lexed token with its source position (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub col: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Id(String),
    /// `$display`, `$clog2`, ...
    SysId(String),
    /// Numeric literal spelling, e.g. `42`, `8'hFF`, `1.5e3`.
    Number(String),
    Str(String),
    Kw(Kw),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Colon,
    Dot,
    Hash,
    At,
    Question,

    Eq,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    Lt,
    /// `<=`: relational or non-blocking assignment, disambiguated by the parser.
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    AShl,
    AShr,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    Tilde,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    /// `~^` or `^~`
    TildeCaret,
    /// `~&`
    TildeAmp,
    /// `~|`
    TildePipe,
    /// `->`
    Arrow,
    /// `+:`
    PlusColon,
    /// `-:`
    MinusColon,

    Eof,
}

/// Reserved words the parser distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    Module,
    Endmodule,
    Input,
    Output,
    Inout,
    Wire,
    Tri,
    Supply0,
    Supply1,
    Reg,
    Logic,
    Integer,
    Real,
    Event,
    Parameter,
    Localparam,
    Defparam,
    Assign,
    Deassign,
    Always,
    Initial,
    Begin,
    End,
    If,
    Else,
    Case,
    Casex,
    Casez,
    Endcase,
    Default,
    For,
    While,
    Repeat,
    Forever,
    Wait,
    Disable,
    Fork,
    Join,
    Task,
    Endtask,
    Function,
    Endfunction,
    Posedge,
    Negedge,
    Or,
    And,
    Nand,
    Nor,
    Xor,
    Xnor,
    Not,
    Buf,
    Signed,
    Automatic,
    Genvar,
    Generate,
    Endgenerate,
    Specify,
    Endspecify,
}

fn keyword(word: &str) -> Option<Kw> {
    let kw = match word {
        "module" | "macromodule" => Kw::Module,
        "endmodule" => Kw::Endmodule,
        "input" => Kw::Input,
        "output" => Kw::Output,
        "inout" => Kw::Inout,
        "wire" => Kw::Wire,
        "tri" => Kw::Tri,
        "supply0" => Kw::Supply0,
        "supply1" => Kw::Supply1,
        "reg" => Kw::Reg,
        "logic" => Kw::Logic,
        "integer" => Kw::Integer,
        "real" | "realtime" | "time" => Kw::Real,
        "event" => Kw::Event,
        "parameter" => Kw::Parameter,
        "localparam" => Kw::Localparam,
        "defparam" => Kw::Defparam,
        "assign" => Kw::Assign,
        "deassign" => Kw::Deassign,
        "always" => Kw::Always,
        "initial" => Kw::Initial,
        "begin" => Kw::Begin,
        "end" => Kw::End,
        "if" => Kw::If,
        "else" => Kw::Else,
        "case" => Kw::Case,
        "casex" => Kw::Casex,
        "casez" => Kw::Casez,
        "endcase" => Kw::Endcase,
        "default" => Kw::Default,
        "for" => Kw::For,
        "while" => Kw::While,
        "repeat" => Kw::Repeat,
        "forever" => Kw::Forever,
        "wait" => Kw::Wait,
        "disable" => Kw::Disable,
        "fork" => Kw::Fork,
        "join" => Kw::Join,
        "task" => Kw::Task,
        "endtask" => Kw::Endtask,
        "function" => Kw::Function,
        "endfunction" => Kw::Endfunction,
        "posedge" => Kw::Posedge,
        "negedge" => Kw::Negedge,
        "or" => Kw::Or,
        "and" => Kw::And,
        "nand" => Kw::Nand,
        "nor" => Kw::Nor,
        "xor" => Kw::Xor,
        "xnor" => Kw::Xnor,
        "not" => Kw::Not,
        "buf" => Kw::Buf,
        "signed" => Kw::Signed,
        "automatic" => Kw::Automatic,
        "genvar" => Kw::Genvar,
        "generate" => Kw::Generate,
        "endgenerate" => Kw::Endgenerate,
        "specify" => Kw::Specify,
        "endspecify" => Kw::Endspecify,
        _ => return None,
    };
    Some(kw)
}

struct Lexer<'a> {
    path: &'a Path,
    src: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn new(path: &'a Path, src: &'a str) -> Self {
        Self {
            path,
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::parse(self.path, self.line, self.col, message)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => {
                    let (line, col) = (self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'*') if self.peek2() == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(Error::parse(
                                    self.path,
                                    line,
                                    col,
                                    "unterminated block comment",
                                ));
                            }
                        }
                    }
                }
                // Compiler directives are consumed to end of line.
                Some(b'`') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_word(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    /// Consume the `'b1010` tail of a based literal, starting at the tick.
    fn lex_based_tail(&mut self) {
        self.bump(); // '
        if let Some(b) = self.peek() {
            if b == b's' || b == b'S' {
                self.bump();
            }
        }
        if let Some(b) = self.peek() {
            if b.is_ascii_alphabetic() {
                self.bump(); // base character
            }
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'?' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_number(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        match self.peek() {
            Some(b'\'') => self.lex_based_tail(),
            Some(b'.') if self.peek2().is_some_and(|b| b.is_ascii_digit()) => {
                self.bump();
                while let Some(b) = self.peek() {
                    if b.is_ascii_digit() || b == b'_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.lex_exponent();
            }
            Some(b'e' | b'E') => self.lex_exponent(),
            _ => {}
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_exponent(&mut self) {
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            while let Some(b) = self.peek() {
                if b.is_ascii_digit() {
                    self.bump();
                } else {
                    break;
                }
            }
        }
    }

    fn lex_string(&mut self) -> Result<String> {
        let (line, col) = (self.line, self.col);
        self.bump(); // opening quote
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => {
                    let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                    self.bump();
                    return Ok(text);
                }
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
                None => {
                    return Err(Error::parse(self.path, line, col, "unterminated string"));
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;

        let (line, col) = (self.line, self.col);
        let at = |tok| Token { tok, line, col };

        let Some(b) = self.peek() else {
            return Ok(at(Tok::Eof));
        };

        if b.is_ascii_alphabetic() || b == b'_' {
            let word = self.lex_word();
            let tok = match keyword(&word) {
                Some(kw) => Tok::Kw(kw),
                None => Tok::Id(word),
            };
            return Ok(at(tok));
        }

        if b == b'$' {
            self.bump();
            let word = self.lex_word();
            return Ok(at(Tok::SysId(word)));
        }

        if b.is_ascii_digit() {
            return Ok(at(Tok::Number(self.lex_number())));
        }

        // Unsized based literal: 'b1010
        if b == b'\'' {
            let start = self.pos;
            self.lex_based_tail();
            let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            return Ok(at(Tok::Number(text)));
        }

        if b == b'"' {
            return Ok(at(Tok::Str(self.lex_string()?)));
        }

        // Escaped identifier: backslash up to the next whitespace.
        if b == b'\\' {
            self.bump();
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b.is_ascii_whitespace() {
                    break;
                }
                self.bump();
            }
            let word = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
            if word.is_empty() {
                return Err(self.err("empty escaped identifier"));
            }
            return Ok(at(Tok::Id(word)));
        }

        self.bump();
        let two = self.peek();
        let tok = match (b, two) {
            (b'=', Some(b'=')) => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::EqEqEq
                } else {
                    Tok::EqEq
                }
            }
            (b'=', _) => Tok::Eq,
            (b'!', Some(b'=')) => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::BangEqEq
                } else {
                    Tok::BangEq
                }
            }
            (b'!', _) => Tok::Bang,
            (b'<', Some(b'=')) => {
                self.bump();
                Tok::Le
            }
            (b'<', Some(b'<')) => {
                self.bump();
                if self.peek() == Some(b'<') {
                    self.bump();
                    Tok::AShl
                } else {
                    Tok::Shl
                }
            }
            (b'<', _) => Tok::Lt,
            (b'>', Some(b'=')) => {
                self.bump();
                Tok::Ge
            }
            (b'>', Some(b'>')) => {
                self.bump();
                if self.peek() == Some(b'>') {
                    self.bump();
                    Tok::AShr
                } else {
                    Tok::Shr
                }
            }
            (b'>', _) => Tok::Gt,
            (b'&', Some(b'&')) => {
                self.bump();
                Tok::AmpAmp
            }
            (b'&', _) => Tok::Amp,
            (b'|', Some(b'|')) => {
                self.bump();
                Tok::PipePipe
            }
            (b'|', _) => Tok::Pipe,
            (b'^', Some(b'~')) => {
                self.bump();
                Tok::TildeCaret
            }
            (b'^', _) => Tok::Caret,
            (b'~', Some(b'^')) => {
                self.bump();
                Tok::TildeCaret
            }
            (b'~', Some(b'&')) => {
                self.bump();
                Tok::TildeAmp
            }
            (b'~', Some(b'|')) => {
                self.bump();
                Tok::TildePipe
            }
            (b'~', _) => Tok::Tilde,
            (b'-', Some(b'>')) => {
                self.bump();
                Tok::Arrow
            }
            (b'-', Some(b':')) => {
                self.bump();
                Tok::MinusColon
            }
            (b'-', _) => Tok::Minus,
            (b'+', Some(b':')) => {
                self.bump();
                Tok::PlusColon
            }
            (b'+', _) => Tok::Plus,
            (b'*', Some(b'*')) => {
                self.bump();
                Tok::StarStar
            }
            (b'*', _) => Tok::Star,
            (b'/', _) => Tok::Slash,
            (b'%', _) => Tok::Percent,
            (b'(', _) => Tok::LParen,
            (b')', _) => Tok::RParen,
            (b'[', _) => Tok::LBracket,
            (b']', _) => Tok::RBracket,
            (b'{', _) => Tok::LBrace,
            (b'}', _) => Tok::RBrace,
            (b';', _) => Tok::Semi,
            (b',', _) => Tok::Comma,
            (b':', _) => Tok::Colon,
            (b'.', _) => Tok::Dot,
            (b'#', _) => Tok::Hash,
            (b'@', _) => Tok::At,
            (b'?', _) => Tok::Question,
            _ => {
                return Err(Error::parse(
                    self.path,
                    line,
                    col,
                    format!("unexpected character '{}'", b as char),
                ));
            }
        };

        Ok(at(tok))
    }
}

/// Lex a complete source file into a token stream ending with `Tok::Eof`.
pub fn lex(path: &Path, source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(path, source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn toks(src: &str) -> Vec<Tok> {
        lex(&PathBuf::from("test.v"), src)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn lexes_module_header() {
        let t = toks("module m(input a);");
        assert_eq!(
            t,
            vec![
                Tok::Kw(Kw::Module),
                Tok::Id("m".into()),
                Tok::LParen,
                Tok::Kw(Kw::Input),
                Tok::Id("a".into()),
                Tok::RParen,
                Tok::Semi,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn lexes_based_literals() {
        let t = toks("8'hFF 'b10_10 12'd42");
        assert_eq!(
            t,
            vec![
                Tok::Number("8'hFF".into()),
                Tok::Number("'b10_10".into()),
                Tok::Number("12'd42".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn lexes_operators() {
        let t = toks("<= < << <<< == === -> ~^ ~| +:");
        assert_eq!(
            t,
            vec![
                Tok::Le,
                Tok::Lt,
                Tok::Shl,
                Tok::AShl,
                Tok::EqEq,
                Tok::EqEqEq,
                Tok::Arrow,
                Tok::TildeCaret,
                Tok::TildePipe,
                Tok::PlusColon,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_directives() {
        let t = toks("`timescale 1ns/1ps\n// line\n/* block\n*/ wire");
        assert_eq!(t, vec![Tok::Kw(Kw::Wire), Tok::Eof]);
    }

    #[test]
    fn tracks_positions() {
        let tokens = lex(&PathBuf::from("test.v"), "wire\n  reg").expect("lexing should succeed");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].col, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].col, 3);
    }

    #[test]
    fn reports_unterminated_comment() {
        let err = lex(&PathBuf::from("test.v"), "/* never closed").unwrap_err();
        assert!(err.to_string().contains("unterminated block comment"));
    }

    #[test]
    fn lexes_system_identifiers() {
        let t = toks("$display(x)");
        assert_eq!(
            t,
            vec![
                Tok::SysId("display".into()),
                Tok::LParen,
                Tok::Id("x".into()),
                Tok::RParen,
                Tok::Eof,
            ]
        );
    }
}
