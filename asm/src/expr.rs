use crate::error::{Error, Result};
use crate::eval::{BinOp, UnOp, STACK_DEPTH};
use crate::symbol::{Segment, SymbolId, SymbolTable};
use cp1600::polish::{push_hex, Pol};

pub type NodeId = usize;

pub const ARENA_CAPACITY: usize = 1 << 20;
pub const POLISH_LEN: usize = 1024;

/// Stack levels kept free for operators used outside the expression.
const STACK_ALLOWANCE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Unary(UnOp, NodeId),
    Binary(BinOp, NodeId, NodeId),
    Symbol(SymbolId),
    Constant(i32),
    ProgramCounter,
    Defined(SymbolId),
    ClassifySymbol(SymbolId),
}

// ----------------------------------------------------------------------------
// Arena

/// Line-scoped node storage. Handle 0 is never handed out.
pub struct ExprArena {
    nodes: Vec<Node>,
}

impl Default for ExprArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena {
            nodes: vec![Node::Constant(0)],
        }
    }

    /// Drop every node. Called at the start of each source line.
    pub fn reset(&mut self) {
        self.nodes.truncate(1);
    }

    pub fn push(&mut self, node: Node) -> Result<NodeId> {
        if self.nodes.len() >= ARENA_CAPACITY {
            return Err(Error::ExprArenaExhausted);
        }
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Node {
        self.nodes.get(id).copied().unwrap_or(Node::Constant(0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

// ----------------------------------------------------------------------------
// Polish compiler

/// Result of compiling one expression: the value as far as it is known now,
/// and the polish string that recomputes it in the output pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluated {
    pub seg: Segment,
    pub value: i32,
    pub polish: String,
}

impl Default for Evaluated {
    fn default() -> Self {
        Evaluated {
            seg: Segment::Undefined,
            value: 0,
            polish: String::new(),
        }
    }
}

impl Evaluated {
    pub fn abs(value: i32) -> Self {
        let mut polish = String::new();
        push_hex(&mut polish, value as u32);
        Evaluated {
            seg: Segment::Absolute,
            value,
            polish,
        }
    }

    pub fn is_abs(&self) -> bool {
        self.seg == Segment::Absolute
    }
}

enum Step {
    Visit(NodeId),
    /// Polish length before the CLASSIFY operand.
    Classify(usize),
    Unary(UnOp),
    /// Left operand done; `NodeId` is the right one.
    Operand(BinOp, NodeId),
    Binary(BinOp),
}

struct Compiler<'a> {
    arena: &'a ExprArena,
    syms: &'a SymbolTable,
    locctr: i32,
    stack: Vec<(i32, Segment)>,
    polish: String,
    overflow: bool,
    etop: i32,
    etopseg: Segment,
    errors: Vec<String>,
}

impl<'a> Compiler<'a> {
    fn out(&mut self, c: char) {
        if self.polish.len() < POLISH_LEN - 1 {
            self.polish.push(c);
        } else if !self.overflow {
            self.overflow = true;
            self.errors
                .push("overflow in polish expression conversion".to_string());
        }
    }

    fn out_num(&mut self, v: u32) {
        let mut digits = String::new();
        push_hex(&mut digits, v);
        for c in digits.chars() {
            self.out(c);
        }
    }

    /// Post-order walk driven by an explicit work list, so tree depth is
    /// bounded by the arena and not by the host stack.
    fn walk(&mut self, root: NodeId) -> bool {
        let mut work = vec![Step::Visit(root)];
        while let Some(step) = work.pop() {
            match step {
                Step::Visit(id) => self.visit(id, &mut work),
                Step::Classify(start) => {
                    // Folded now; the operand's own polish is dropped.
                    self.polish.truncate(start);
                    self.etop = self.etopseg.class();
                    self.etopseg = Segment::Absolute;
                    self.out_num(self.etop as u32);
                }
                Step::Unary(op) => {
                    if let Some(p) = op.pol() {
                        self.out(p.ch());
                    }
                    self.etop = op.apply(self.etop);
                }
                Step::Operand(op, right) => {
                    self.out(Pol::Load.ch());
                    if self.stack.len() >= STACK_DEPTH - 1 - STACK_ALLOWANCE {
                        self.errors.push("expression stack overflow".to_string());
                        return false;
                    }
                    self.stack.push((self.etop, self.etopseg));
                    self.etop = 0;
                    self.etopseg = Segment::Unused;
                    work.push(Step::Binary(op));
                    work.push(Step::Visit(right));
                }
                Step::Binary(op) => self.binary(op),
            }
        }
        true
    }

    fn visit(&mut self, id: NodeId, work: &mut Vec<Step>) {
        match self.arena.get(id) {
            Node::Unary(UnOp::Classify, left) => {
                work.push(Step::Classify(self.polish.len()));
                work.push(Step::Visit(left));
            }
            Node::Unary(op, left) => {
                work.push(Step::Unary(op));
                work.push(Step::Visit(left));
            }
            Node::Binary(op, left, right) => {
                work.push(Step::Operand(op, right));
                work.push(Step::Visit(left));
            }
            Node::ClassifySymbol(sym) => {
                self.etop = self.syms.get(sym).class();
                self.etopseg = Segment::Absolute;
                self.out_num(self.etop as u32);
            }
            Node::Defined(sym) => {
                self.etop = self.syms.get(sym).seg.is_defined() as i32;
                self.etopseg = Segment::Absolute;
                self.out_num(self.etop as u32);
            }
            Node::Symbol(id) => {
                let sym = self.syms.get(id);
                self.etop = sym.value;
                self.etopseg = sym.seg;
                if matches!(sym.seg, Segment::Equ | Segment::Set) {
                    self.etopseg = Segment::Absolute;
                    self.out_num(sym.value as u32);
                } else {
                    self.out_num(sym.symnum as u32);
                    self.out(Pol::Symbol.ch());
                }
            }
            Node::ProgramCounter => {
                self.out(Pol::ProgCtr.ch());
                self.etop = self.locctr;
                self.etopseg = Segment::Absolute;
            }
            Node::Constant(v) => {
                self.out_num(v as u32);
                self.etop = v;
                self.etopseg = Segment::Absolute;
            }
        }
    }

    fn binary(&mut self, op: BinOp) {
        self.out(op.pol().ch());

        let (lv, lseg) = self.stack.pop().unwrap_or((0, Segment::Absolute));
        let known = lseg == Segment::Absolute && self.etopseg == Segment::Absolute;
        if lseg != Segment::Absolute {
            self.etopseg = lseg;
        }
        self.etop = match op.apply(lv, self.etop) {
            Ok(v) => v,
            Err(msg) => {
                // Unknown operands are checked again in the output pass.
                if known {
                    self.errors.push(msg.to_string());
                }
                0
            }
        };
    }
}

/// Compile an expression tree. Errors are local to the expression: the
/// caller reports them and gets an Undefined result when compilation failed.
pub fn compile(
    arena: &ExprArena,
    syms: &SymbolTable,
    locctr: i32,
    root: NodeId,
) -> (Evaluated, Vec<String>) {
    let mut c = Compiler {
        arena,
        syms,
        locctr,
        stack: Vec::new(),
        polish: String::new(),
        overflow: false,
        etop: 0,
        etopseg: Segment::Unused,
        errors: Vec::new(),
    };
    let ok = c.walk(root) && !c.overflow;
    let result = if ok {
        Evaluated {
            seg: c.etopseg,
            value: c.etop,
            polish: c.polish,
        }
    } else {
        Evaluated::default()
    };
    (result, c.errors)
}

