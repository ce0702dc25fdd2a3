use strum::Display;

/// Operand shapes an instruction can be written in.
pub mod syntax {
    pub const REGREG: u16 = 0x0001;
    pub const REGEXP: u16 = 0x0002;
    pub const EXPREG: u16 = 0x0004;
    pub const REGCEX: u16 = 0x0008;
    pub const CEXREG: u16 = 0x0010;
    pub const REG: u16 = 0x0020;
    pub const EXP: u16 = 0x0040;
    pub const IMP: u16 = 0x0080;
    pub const EXPEXP: u16 = 0x0100;
}

/// Addressing criteria matched against a generator's selection mask.
pub mod criteria {
    pub const JSR_RG: u16 = 0x0001;
    pub const SHF_RG: u16 = 0x0002;
    pub const IND_RG: u16 = 0x0004;
    pub const SDBD: u16 = 0x0008;
}

/// How the parser treats a mnemonic found in the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OpKind {
    // Machine instructions
    Opcode,
    OpcodeInd,
    RelBranch,
    RelBranchExt,
    Sdbd,

    // Data
    Decle,
    Bidecle,
    Byte,
    Str,
    Res,

    // Symbols
    Equ,
    Set,
    Qequ,
    Qset,

    // Layout
    Org,
    Romw,
    Proc,
    Endp,
    Struct,
    Ends,
    MemAttr,

    // Conditional and repeated assembly
    If,
    Else,
    Endi,
    Rpt,
    Endr,
    BrkIf,

    // Source control
    Include,
    End,
    MacroErr,

    // Messages and listing
    UserErr,
    Cmsg,
    Smsg,
    Wmsg,
    Listing,
    ListCol,
    SrcFile,
    CfgVar,

    // ROM overwrite policy
    ErrIfOverwritten,
    ForceOverwrite,
}

impl OpKind {
    /// Directives that stay live while an IF block is being skipped.
    pub fn passes_if_skip(self) -> bool {
        matches!(self, OpKind::If | OpKind::Else | OpKind::Endi | OpKind::End)
    }

    /// Directives that stay live while a REPEAT block is being skipped.
    pub fn passes_rpt_skip(self) -> bool {
        matches!(self, OpKind::Rpt | OpKind::Endr | OpKind::End)
    }
}
