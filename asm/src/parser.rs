// parser.rs

use crate::error::Error;
use crate::eval::{BinOp, UnOp};
use crate::expr::{compile, ExprArena, Node, NodeId, ARENA_CAPACITY};
use crate::scanner::Token;
use crate::symbol::{class, Keyword, SymbolId, SymbolTable};
use cp1600::op::OpKind;
use cp1600::table::{opcode_name, opsym};
use std::iter::Peekable;

/// Array slice `name[first, last]`. Both ends are inclusive and the slice
/// runs downward when `first > last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub base: SymbolId,
    pub first: i32,
    pub last: i32,
}

impl Slice {
    pub fn len(&self) -> usize {
        (self.last as i64 - self.first as i64).unsigned_abs() as usize + 1
    }

    pub fn indices(&self) -> impl Iterator<Item = i32> {
        let step = if self.first > self.last { -1 } else { 1 };
        let first = self.first as i64;
        (0..self.len() as i64).map(move |i| (first + i * step) as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRef {
    Plain(SymbolId),
    Slice(Slice),
}

/// Operands of a machine instruction, one variant per syntax shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    Imp,
    Exp(NodeId),
    ExpExp(NodeId, NodeId),
    Reg(i32),
    RegReg(i32, i32),
    RegExp(i32, NodeId),
    RegCex(i32, NodeId),
    ExpReg(NodeId, i32),
    CexReg(NodeId, i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgValue {
    Int(NodeId),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Empty,
    Instr {
        op: usize,
        operands: Operands,
    },
    Data {
        kind: OpKind,
        items: Vec<NodeId>,
    },
    Res(NodeId),
    Assign {
        kind: OpKind,
        items: Vec<NodeId>,
    },
    Org {
        addr: NodeId,
        load: Option<NodeId>,
        page: Option<NodeId>,
        mode: Option<String>,
    },
    Romw {
        width: NodeId,
        fwd: Option<NodeId>,
    },
    Proc,
    Endp,
    Struct(NodeId),
    Ends,
    MemAttr {
        lo: NodeId,
        hi: NodeId,
        mode: String,
    },
    /// `None` when the condition was dropped by the skip filter.
    If(Option<NodeId>),
    Else,
    Endi,
    Rpt(Option<NodeId>),
    Endr,
    BrkIf(NodeId),
    Include(String),
    End,
    MacroErr,
    Message {
        kind: OpKind,
        text: String,
    },
    Listing(String),
    ListCol(NodeId, NodeId, NodeId),
    SrcFile {
        file: String,
        line: NodeId,
    },
    CfgVar {
        name: String,
        value: CfgValue,
    },
    Overwrite {
        kind: OpKind,
        value: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub label: Option<LabelRef>,
    pub stmt: Stmt,
}

/// A parsed line plus the errors found on the way. `line` is `None` after a
/// syntax error.
#[derive(Debug, Default)]
pub struct Parsed {
    pub line: Option<Line>,
    pub errors: Vec<String>,
}

#[derive(Debug)]
enum ParseError {
    Syntax(String),
    Fatal(Error),
}

impl From<Error> for ParseError {
    fn from(e: Error) -> Self {
        ParseError::Fatal(e)
    }
}

const INVALID_ESCAPE: &str = "invalid escape sequence in string";

/// Deepest nesting of parentheses, unary operators and indices in one
/// expression.
const NEST_LIMIT: usize = 64;

/// Parse the tokens of one source line. `locctr` is the address `$` refers
/// to. Only arena exhaustion is fatal.
pub fn parse_line(
    tokens: Vec<Token>,
    syms: &mut SymbolTable,
    arena: &mut ExprArena,
    locctr: i32,
) -> Result<Parsed, Error> {
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        syms,
        arena,
        locctr,
        in_list: false,
        slice: None,
        depth: 0,
        errors: Vec::new(),
    };
    match parser.parse_line() {
        Ok(line) => Ok(Parsed {
            line: Some(line),
            errors: parser.errors,
        }),
        Err(ParseError::Syntax(msg)) => {
            parser.errors.push(msg);
            Ok(Parsed {
                line: None,
                errors: parser.errors,
            })
        }
        Err(ParseError::Fatal(e)) => Err(e),
    }
}

struct Parser<'a, I: Iterator<Item = Token>> {
    tokens: Peekable<I>,
    syms: &'a mut SymbolTable,
    arena: &'a mut ExprArena,
    locctr: i32,
    /// Symbol slices are only allowed as items of an expression list.
    in_list: bool,
    slice: Option<(NodeId, Slice)>,
    depth: usize,
    errors: Vec<String>,
}

// ------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------

impl<'a, I: Iterator<Item = Token>> Parser<'a, I> {
    /// Check next token is match with condition
    fn check_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> bool {
        self.tokens.peek().is_some_and(cond)
    }

    /// Consume if next token is match with condition
    fn consume_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Option<Token> {
        self.tokens.next_if(|token| cond(token))
    }

    /// Next token must be match with condition
    fn expect_tobe<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Result<Token, ParseError> {
        match self.tokens.peek() {
            Some(token) if cond(token) => Ok(self.tokens.next().unwrap_or(Token::Eol)),
            _ => Err(self.unexpected()),
        }
    }

    fn unexpected(&mut self) -> ParseError {
        let what = match self.tokens.peek().cloned() {
            None | Some(Token::Eol) => "End of Line".to_string(),
            Some(Token::Invalid) => {
                return ParseError::Syntax("syntax error at invalid token".to_string())
            }
            Some(Token::Char(c)) => format!("character \"{}\"", c as char),
            Some(Token::Str(s)) => format!("string \"{}\"", String::from_utf8_lossy(&s)),
            Some(tok) => format!("token \"{}\"", self.spell(&tok)),
        };
        ParseError::Syntax(format!("syntax error at/before {}", what))
    }

    fn spell(&self, tok: &Token) -> String {
        match tok {
            Token::Label(id) | Token::Symbol(id) | Token::Feature(id) => {
                self.syms.get(*id).display_name()
            }
            Token::Reg(r) => format!("R{}", r),
            Token::Keyword(kw) => format!("{:?}", kw).to_ascii_uppercase(),
            Token::Opcode(op) => opcode_name(*op).to_string(),
            Token::Constant(v) => v.to_string(),
            Token::QChar(c) => format!("'{}'", (*c as u8) as char),
            Token::ProgCtr => "$".to_string(),
            Token::Percent => "%".to_string(),
            Token::Eq => "=".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Le => "<=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Ne => "<>".to_string(),
            Token::Char(c) => (*c as char).to_string(),
            Token::Str(s) => String::from_utf8_lossy(s).into_owned(),
            Token::Eol | Token::Invalid => String::new(),
        }
    }

    fn node(&mut self, node: Node) -> Result<NodeId, ParseError> {
        Ok(self.arena.push(node)?)
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= NEST_LIMIT {
            return Err(ParseError::Syntax("expression stack overflow".to_string()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// A slice over `base`, unless it has more elements than a line can hold.
    fn bounded_slice(&mut self, base: SymbolId, first: i32, last: i32) -> Option<Slice> {
        let slice = Slice { base, first, last };
        if slice.len() > ARENA_CAPACITY {
            self.errors.push("array slice too large".to_string());
            return None;
        }
        Some(slice)
    }

    /// Value of an expression that must be known now.
    fn constant(&mut self, id: NodeId, what: &str) -> Option<i32> {
        let (value, errors) = compile(self.arena, self.syms, self.locctr, id);
        self.errors.extend(errors);
        if value.is_abs() {
            Some(value.value)
        } else {
            self.errors
                .push(format!("noncomputable expression for {}", what));
            None
        }
    }

    fn string(&mut self) -> Result<Vec<u8>, ParseError> {
        match self.expect_tobe(|t| matches!(t, Token::Str(_) | Token::QChar(_)))? {
            Token::Str(s) => Ok(s),
            Token::QChar(c) => Ok(vec![c as u8]),
            _ => Err(self.unexpected()),
        }
    }

    /// String operand with escapes left in place.
    fn raw_string(&mut self) -> Result<String, ParseError> {
        let s = self.string()?;
        Ok(String::from_utf8_lossy(&s).into_owned())
    }

    /// String operand with escapes expanded, one value per character.
    fn chars(&mut self) -> Result<Vec<i32>, ParseError> {
        let s = self.string()?;
        Ok(unescape(&s).unwrap_or_else(|msg| {
            self.errors.push(msg.to_string());
            Vec::new()
        }))
    }

    fn reg(&mut self) -> Result<i32, ParseError> {
        match self.expect_tobe(|t| matches!(t, Token::Reg(_)))? {
            Token::Reg(r) => Ok(r),
            _ => Err(self.unexpected()),
        }
    }
}

macro_rules! check {
    ($parser:expr, $kind:pat) => {
        $parser.check_if(|token| matches!(token, $kind))
    };
}

macro_rules! expect {
    ($parser:expr, $kind:pat) => {
        $parser.expect_tobe(|token| matches!(token, $kind))
    };
}

macro_rules! optional {
    ($parser:expr, $kind:pat) => {
        $parser.consume_if(|token| matches!(token, $kind))
    };
}

// ------------------------------------------------------------------------
// Lines
// ------------------------------------------------------------------------

impl<'a, I: Iterator<Item = Token>> Parser<'a, I> {
    fn parse_line(&mut self) -> Result<Line, ParseError> {
        let labeled = check!(self, Token::Label(_));
        let label = self.parse_label()?;
        if labeled {
            optional!(self, Token::Char(b':'));
        }

        let stmt = match self.tokens.peek() {
            None | Some(Token::Eol) => Stmt::Empty,
            Some(Token::Opcode(op)) => {
                let op = *op;
                if matches!(label, Some(LabelRef::Slice(_))) && !is_assign(opsym(op).kind) {
                    return Err(self.unexpected());
                }
                self.tokens.next();
                self.parse_stmt(op, labeled)?
            }
            Some(_) => return Err(self.unexpected()),
        };
        expect!(self, Token::Eol)?;
        Ok(Line { label, stmt })
    }

    /// `LABEL`, `LABEL[i]..`, or `LABEL[a, b]` for EQU and SET lists.
    fn parse_label(&mut self) -> Result<Option<LabelRef>, ParseError> {
        let Some(Token::Label(mut id)) = optional!(self, Token::Label(_)) else {
            return Ok(None);
        };

        let mut label = Some(LabelRef::Plain(id));
        while optional!(self, Token::Char(b'[')).is_some() {
            let first = self.parse_index()?;
            if optional!(self, Token::Char(b',')).is_none() {
                expect!(self, Token::Char(b']'))?;
                match self.constant(first, "label array index") {
                    Some(idx) => id = self.syms.intern_indexed(id, idx),
                    None => label = None,
                }
                if label.is_some() {
                    label = Some(LabelRef::Plain(id));
                }
                continue;
            }

            let last = self.parse_index()?;
            expect!(self, Token::Char(b']'))?;
            if check!(self, Token::Char(b'[')) {
                self.errors
                    .push("array slice allowed on last index only".to_string());
                self.skip_indices()?;
                return Ok(None);
            }
            let first = self.constant(first, "label slice index");
            let last = self.constant(last, "label slice index");
            return Ok(match (first, last, label) {
                (Some(first), Some(last), Some(_)) => {
                    self.bounded_slice(id, first, last).map(LabelRef::Slice)
                }
                _ => None,
            });
        }
        Ok(label)
    }

    fn skip_indices(&mut self) -> Result<(), ParseError> {
        while optional!(self, Token::Char(b'[')).is_some() {
            self.parse_index()?;
            if optional!(self, Token::Char(b',')).is_some() {
                self.parse_index()?;
            }
            expect!(self, Token::Char(b']'))?;
        }
        Ok(())
    }

    fn parse_stmt(&mut self, op: usize, labeled: bool) -> Result<Stmt, ParseError> {
        let kind = opsym(op).kind;
        let stmt = match kind {
            OpKind::Opcode
            | OpKind::OpcodeInd
            | OpKind::RelBranch
            | OpKind::RelBranchExt
            | OpKind::Sdbd => Stmt::Instr {
                op,
                operands: self.parse_operands()?,
            },

            OpKind::Decle | OpKind::Bidecle | OpKind::Byte | OpKind::Str => Stmt::Data {
                kind,
                items: self.parse_list()?,
            },
            OpKind::Res => Stmt::Res(self.parse_expr()?),

            OpKind::Equ | OpKind::Set | OpKind::Qequ | OpKind::Qset => {
                if !labeled {
                    return Err(self.unexpected());
                }
                Stmt::Assign {
                    kind,
                    items: self.parse_list()?,
                }
            }

            OpKind::Org => self.parse_org()?,
            OpKind::Romw => {
                let width = self.parse_expr()?;
                let fwd = match optional!(self, Token::Char(b',')) {
                    Some(_) => Some(self.parse_expr()?),
                    None => None,
                };
                Stmt::Romw { width, fwd }
            }
            OpKind::Proc | OpKind::Struct if !labeled => return Err(self.unexpected()),
            OpKind::Proc => Stmt::Proc,
            OpKind::Endp => Stmt::Endp,
            OpKind::Struct => Stmt::Struct(self.parse_expr()?),
            OpKind::Ends => Stmt::Ends,
            OpKind::MemAttr => {
                let lo = self.parse_expr()?;
                expect!(self, Token::Char(b','))?;
                let hi = self.parse_expr()?;
                expect!(self, Token::Char(b','))?;
                let mode = self.raw_string()?;
                Stmt::MemAttr { lo, hi, mode }
            }

            OpKind::If => Stmt::If(self.parse_opt_expr()?),
            OpKind::Else => Stmt::Else,
            OpKind::Endi => Stmt::Endi,
            OpKind::Rpt => Stmt::Rpt(self.parse_opt_expr()?),
            OpKind::Endr => Stmt::Endr,
            OpKind::BrkIf => Stmt::BrkIf(self.parse_expr()?),

            OpKind::Include => Stmt::Include(self.raw_string()?),
            OpKind::End => {
                optional!(self, Token::Symbol(_) | Token::Label(_));
                Stmt::End
            }
            OpKind::MacroErr => {
                while !check!(self, Token::Eol) && self.tokens.next().is_some() {}
                Stmt::MacroErr
            }

            OpKind::UserErr | OpKind::Cmsg | OpKind::Smsg | OpKind::Wmsg => Stmt::Message {
                kind,
                text: self.raw_string()?,
            },
            OpKind::Listing => Stmt::Listing(self.raw_string()?),
            OpKind::ListCol => {
                let a = self.parse_expr()?;
                expect!(self, Token::Char(b','))?;
                let b = self.parse_expr()?;
                expect!(self, Token::Char(b','))?;
                let c = self.parse_expr()?;
                Stmt::ListCol(a, b, c)
            }
            OpKind::SrcFile => {
                let file = self.raw_string()?;
                expect!(self, Token::Char(b','))?;
                let line = self.parse_expr()?;
                Stmt::SrcFile { file, line }
            }
            OpKind::CfgVar => {
                let name = self.raw_string()?;
                expect!(self, Token::Eq)?;
                let value = if check!(self, Token::Str(_)) {
                    CfgValue::Str(self.raw_string()?)
                } else {
                    CfgValue::Int(self.parse_expr()?)
                };
                Stmt::CfgVar { name, value }
            }
            OpKind::ErrIfOverwritten | OpKind::ForceOverwrite => Stmt::Overwrite {
                kind,
                value: self.parse_expr()?,
            },
        };
        Ok(stmt)
    }

    /// `ORG a [, b [, "mode"]]` or `ORG a : p [, "mode"]`.
    fn parse_org(&mut self) -> Result<Stmt, ParseError> {
        let addr = self.parse_expr()?;
        let mut load = None;
        let mut page = None;
        if optional!(self, Token::Char(b':')).is_some() {
            page = Some(self.parse_expr()?);
        } else if optional!(self, Token::Char(b',')).is_some() {
            load = Some(self.parse_expr()?);
        }
        let mode = match (load.or(page), optional!(self, Token::Char(b','))) {
            (Some(_), Some(_)) => Some(self.raw_string()?),
            (None, Some(_)) => return Err(self.unexpected()),
            _ => None,
        };
        Ok(Stmt::Org {
            addr,
            load,
            page,
            mode,
        })
    }

    fn parse_operands(&mut self) -> Result<Operands, ParseError> {
        if check!(self, Token::Eol) {
            return Ok(Operands::Imp);
        }

        if let Some(Token::Reg(r)) = optional!(self, Token::Reg(_)) {
            if optional!(self, Token::Char(b',')).is_none() {
                return Ok(Operands::Reg(r));
            }
            if let Some(Token::Reg(r2)) = optional!(self, Token::Reg(_)) {
                return Ok(Operands::RegReg(r, r2));
            }
            if optional!(self, Token::Char(b'#')).is_some() {
                return Ok(Operands::RegCex(r, self.parse_expr()?));
            }
            return Ok(Operands::RegExp(r, self.parse_expr()?));
        }

        if optional!(self, Token::Char(b'#')).is_some() {
            let e = self.parse_expr()?;
            expect!(self, Token::Char(b','))?;
            return Ok(Operands::CexReg(e, self.reg()?));
        }

        let e = self.parse_expr()?;
        if optional!(self, Token::Char(b',')).is_none() {
            return Ok(Operands::Exp(e));
        }
        if check!(self, Token::Reg(_)) {
            return Ok(Operands::ExpReg(e, self.reg()?));
        }
        Ok(Operands::ExpExp(e, self.parse_expr()?))
    }

    /// Comma separated expressions. Strings give one item per character and
    /// symbol slices one item per element.
    fn parse_list(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut items = Vec::new();
        loop {
            if check!(self, Token::Str(_)) {
                for c in self.chars()? {
                    items.push(self.node(Node::Constant(c))?);
                }
            } else {
                self.in_list = true;
                let root = self.parse_expr();
                self.in_list = false;
                let root = root?;
                match self.slice.take() {
                    Some((at, slice)) if at == root => {
                        for idx in slice.indices() {
                            let elem = self.syms.element(slice.base, idx);
                            items.push(self.node(Node::Symbol(elem))?);
                        }
                    }
                    Some(_) => return Err(self.unexpected()),
                    None => items.push(root),
                }
            }
            if optional!(self, Token::Char(b',')).is_none() {
                return Ok(items);
            }
        }
    }
}

fn is_assign(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::Equ | OpKind::Set | OpKind::Qequ | OpKind::Qset
    )
}

// ------------------------------------------------------------------------
// Expressions
// ------------------------------------------------------------------------

impl<'a, I: Iterator<Item = Token>> Parser<'a, I> {
    fn parse_opt_expr(&mut self) -> Result<Option<NodeId>, ParseError> {
        if check!(self, Token::Eol) {
            return Ok(None);
        }
        Ok(Some(self.parse_expr()?))
    }

    fn parse_expr(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::parse_or)
    }

    fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId, ParseError> {
        self.node(Node::Binary(op, lhs, rhs))
    }

    /// `<expr> OR <expr>` | `<expr> XOR <expr>`
    fn parse_or(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = match self.tokens.peek() {
                Some(Token::Keyword(Keyword::Or)) => BinOp::Or,
                Some(Token::Keyword(Keyword::Xor)) => BinOp::Xor,
                _ => return Ok(lhs),
            };
            self.tokens.next();
            let rhs = self.parse_and()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    /// `<expr> AND <expr>`
    fn parse_and(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.parse_not()?;
        while optional!(self, Token::Keyword(Keyword::And)).is_some() {
            let rhs = self.parse_not()?;
            lhs = self.binary(BinOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    /// `NOT <expr>`
    fn parse_not(&mut self) -> Result<NodeId, ParseError> {
        if optional!(self, Token::Keyword(Keyword::Not)).is_some() {
            let expr = self.nested(Self::parse_not)?;
            return self.node(Node::Unary(UnOp::Not, expr));
        }
        self.parse_cmp()
    }

    /// One comparison at most: `<expr> = <expr>`, `<expr> <> <expr>`, ...
    fn parse_cmp(&mut self) -> Result<NodeId, ParseError> {
        let lhs = self.parse_add()?;
        let op = match self.tokens.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne | Token::Keyword(Keyword::Ne)) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le | Token::Keyword(Keyword::Le)) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge | Token::Keyword(Keyword::Ge)) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.tokens.next();
        if op == BinOp::Eq {
            optional!(self, Token::Eq);
        }
        let rhs = self.parse_add()?;
        self.binary(op, lhs, rhs)
    }

    /// `<expr> + <expr>` | `<expr> - <expr>`
    fn parse_add(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.tokens.peek() {
                Some(Token::Char(b'+')) => BinOp::Add,
                Some(Token::Char(b'-')) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.tokens.next();
            let rhs = self.parse_mul()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    /// `*`, `/`, `%`, `MOD`, shifts and rotates.
    fn parse_mul(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, negate) = match self.tokens.peek() {
                Some(Token::Char(b'*')) => (BinOp::Mul, false),
                Some(Token::Char(b'/')) => (BinOp::Div, false),
                Some(Token::Percent | Token::Keyword(Keyword::Mod)) => (BinOp::Mod, false),
                Some(Token::Keyword(Keyword::Shl)) => (BinOp::Shl, false),
                Some(Token::Keyword(Keyword::Shr)) => (BinOp::Shr, false),
                Some(Token::Keyword(Keyword::Shru)) => (BinOp::Shru, false),
                Some(Token::Keyword(Keyword::Rotl16)) => (BinOp::Rotl16, false),
                Some(Token::Keyword(Keyword::Rotl32)) => (BinOp::Rotl32, false),
                Some(Token::Keyword(Keyword::Rotr16)) => (BinOp::Rotl16, true),
                Some(Token::Keyword(Keyword::Rotr32)) => (BinOp::Rotl32, true),
                _ => return Ok(lhs),
            };
            self.tokens.next();
            let mut rhs = self.parse_unary()?;
            if negate {
                rhs = self.node(Node::Unary(UnOp::Neg, rhs))?;
            }
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    /// `- <expr>` | `+ <expr>` | `HIGH <expr>` | `LOW <expr>`
    fn parse_unary(&mut self) -> Result<NodeId, ParseError> {
        let op = match self.tokens.peek() {
            Some(Token::Char(b'+')) => {
                self.tokens.next();
                return self.nested(Self::parse_unary);
            }
            Some(Token::Char(b'-')) => UnOp::Neg,
            Some(Token::Keyword(Keyword::High)) => UnOp::High,
            Some(Token::Keyword(Keyword::Low)) => UnOp::Low,
            _ => return self.parse_prim(),
        };
        self.tokens.next();
        let expr = self.nested(Self::parse_unary)?;
        self.node(Node::Unary(op, expr))
    }

    fn parse_prim(&mut self) -> Result<NodeId, ParseError> {
        let Some(token) = self.tokens.peek().cloned() else {
            return Err(self.unexpected());
        };
        match token {
            // Nested expression:
            Token::Char(b'(') => {
                self.tokens.next();
                let inner = self.parse_expr()?;
                expect!(self, Token::Char(b')'))?;
                Ok(inner)
            }
            Token::Constant(v) | Token::QChar(v) => {
                self.tokens.next();
                self.node(Node::Constant(v))
            }
            Token::Str(ref s) => {
                // A one character string is a character constant.
                let chars = unescape(s).map_err(|msg| ParseError::Syntax(msg.to_string()))?;
                match chars.as_slice() {
                    [c] => {
                        self.tokens.next();
                        self.node(Node::Constant(*c))
                    }
                    _ => Err(self.unexpected()),
                }
            }
            Token::ProgCtr => {
                self.tokens.next();
                self.node(Node::ProgramCounter)
            }
            Token::Symbol(id) | Token::Label(id) => {
                self.tokens.next();
                self.parse_symbol(id)
            }
            Token::Keyword(Keyword::Defined) => {
                self.tokens.next();
                match self.tokens.next() {
                    Some(Token::Symbol(id) | Token::Label(id)) => self.node(Node::Defined(id)),
                    Some(Token::Feature(_)) => self.node(Node::Constant(1)),
                    _ => Err(ParseError::Syntax(
                        "syntax error at/before DEFINED".to_string(),
                    )),
                }
            }
            Token::Keyword(Keyword::Classify) => {
                self.tokens.next();
                self.parse_classify()
            }
            Token::Keyword(Keyword::Strlen) => {
                self.tokens.next();
                expect!(self, Token::Char(b'('))?;
                let len = self.chars()?.len() as i32;
                expect!(self, Token::Char(b')'))?;
                self.node(Node::Constant(len))
            }
            Token::Keyword(Keyword::Asc) => {
                self.tokens.next();
                expect!(self, Token::Char(b'('))?;
                let chars = self.chars()?;
                expect!(self, Token::Char(b','))?;
                let idx = self.parse_expr()?;
                expect!(self, Token::Char(b')'))?;
                let value = match self.constant(idx, "index to ASC") {
                    Some(i) if i >= 0 => chars.get(i as usize).copied().unwrap_or(0),
                    _ => 0,
                };
                self.node(Node::Constant(value))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Index expression inside `[...]`. Slices are never valid here.
    fn parse_index(&mut self) -> Result<NodeId, ParseError> {
        let in_list = std::mem::replace(&mut self.in_list, false);
        let idx = self.parse_expr();
        self.in_list = in_list;
        idx
    }

    /// Symbol reference with any `[i]` indices, or a `[a, b]` slice.
    fn parse_symbol(&mut self, mut id: SymbolId) -> Result<NodeId, ParseError> {
        while optional!(self, Token::Char(b'[')).is_some() {
            let first = self.parse_index()?;
            if optional!(self, Token::Char(b',')).is_some() {
                let last = self.parse_index()?;
                expect!(self, Token::Char(b']'))?;
                if check!(self, Token::Char(b'[')) {
                    self.errors
                        .push("array slice allowed on last index only".to_string());
                    self.skip_indices()?;
                    return self.node(Node::Constant(0));
                }
                if !self.in_list {
                    return Err(ParseError::Syntax(
                        "syntax error at/before character \",\"".to_string(),
                    ));
                }
                let first = self.constant(first, "symbol slice index");
                let last = self.constant(last, "symbol slice index");
                let at = self.node(Node::Constant(0))?;
                if let (Some(first), Some(last)) = (first, last) {
                    self.slice = self.bounded_slice(id, first, last).map(|slice| (at, slice));
                }
                return Ok(at);
            }
            expect!(self, Token::Char(b']'))?;
            if let Some(idx) = self.constant(first, "symbol array index") {
                id = self.syms.intern_indexed(id, idx);
            }
        }
        self.node(Node::Symbol(id))
    }

    /// `CLASSIFY(e)` for any operand, including strings and reserved words.
    fn parse_classify(&mut self) -> Result<NodeId, ParseError> {
        expect!(self, Token::Char(b'('))?;
        let fixed = match self.tokens.peek() {
            Some(Token::Char(b')')) => Some(class::EMPTY),
            Some(Token::Str(_)) => Some(class::STRING),
            Some(Token::Feature(_)) => Some(class::FEATURE),
            Some(Token::Reg(_) | Token::Keyword(_) | Token::Opcode(_)) => Some(class::RESV),
            _ => None,
        };

        let node = match fixed {
            Some(c) => {
                if c != class::EMPTY {
                    self.tokens.next();
                }
                Node::Constant(c)
            }
            None => {
                let e = self.parse_expr()?;
                match self.arena.get(e) {
                    Node::Symbol(sym) => Node::ClassifySymbol(sym),
                    _ => Node::Unary(UnOp::Classify, e),
                }
            }
        };
        expect!(self, Token::Char(b')'))?;
        self.node(node)
    }
}

// ------------------------------------------------------------------------
// Strings
// ------------------------------------------------------------------------

/// Expand escapes: `\' \" \\`, up to three octal digits, `\xHH`, `\$HHHH`
/// and `\&HHHHHHHH`.
pub fn unescape(raw: &[u8]) -> Result<Vec<i32>, &'static str> {
    let mut out = Vec::with_capacity(raw.len());
    let mut it = raw.iter().copied().peekable();
    while let Some(c) = it.next() {
        if c != b'\\' {
            out.push(c as i32);
            continue;
        }
        let v = match it.next() {
            Some(e @ (b'\'' | b'"' | b'\\')) => e as i32,
            Some(e @ b'0'..=b'7') => {
                let mut v = (e - b'0') as i32;
                for _ in 0..2 {
                    match it.next_if(|d| (b'0'..=b'7').contains(d)) {
                        Some(d) => v = v * 8 + (d - b'0') as i32,
                        None => break,
                    }
                }
                v & 0xFF
            }
            Some(b'x') => hex_escape(&mut it, 2)?,
            Some(b'$') => hex_escape(&mut it, 4)?,
            Some(b'&') => hex_escape(&mut it, 8)?,
            _ => return Err(INVALID_ESCAPE),
        };
        out.push(v);
    }
    Ok(out)
}

fn hex_escape<I: Iterator<Item = u8>>(
    it: &mut Peekable<I>,
    max: usize,
) -> Result<i32, &'static str> {
    let mut v: u32 = 0;
    let mut n = 0;
    while n < max {
        match it.next_if(|d| d.is_ascii_hexdigit()) {
            Some(d) => v = (v << 4) | (d as char).to_digit(16).unwrap_or(0),
            None => break,
        }
        n += 1;
    }
    if n == 0 {
        return Err(INVALID_ESCAPE);
    }
    Ok(v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes() {
        assert_eq!(unescape(b"AB"), Ok(vec![0x41, 0x42]));
        assert_eq!(unescape(br#"\"\\"#), Ok(vec![0x22, 0x5C]));
        assert_eq!(unescape(br"\101\7"), Ok(vec![0x41, 7]));
        assert_eq!(unescape(br"\x41\xg"), Err(INVALID_ESCAPE));
        assert_eq!(unescape(br"\$1234\&DEADBEEF"), Ok(vec![0x1234, 0xDEADBEEFu32 as i32]));
        assert_eq!(unescape(br"\x4G"), Ok(vec![4, b'G' as i32]));
        assert_eq!(unescape(br"\q"), Err(INVALID_ESCAPE));
    }

    #[test]
    fn slice_indices() {
        let up = Slice { base: 0, first: 1, last: 3 };
        assert_eq!(up.indices().collect::<Vec<_>>(), vec![1, 2, 3]);
        let down = Slice { base: 0, first: 2, last: 0 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.indices().collect::<Vec<_>>(), vec![2, 1, 0]);

        let wide = Slice { base: 0, first: 1, last: i32::MIN };
        assert_eq!(wide.len() as u64, (1u64 << 31) + 2);
    }
}
