//! The bytecode instruction set shared by the compiler and the VM
//! (SPEC_FULL.md §4.G). Kept exhaustive per the VM's failure semantics: an
//! unrecognized opcode value can never occur at the Rust type level, but the
//! VM still falls through unknown *cases* to binary-op dispatch rather than
//! panicking, matching the spec's stated contract.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum OpCode {
    Halt,
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    /// String concatenation — the VM's distinct counterpart to the
    /// evaluator's string-producing `add` overload (SPEC_FULL.md §4.A).
    Sconcat,
    Neg,
    Not,
    Equ,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    MkList,
    AppendList,
    ListSize,
    Def,
    Call,
    Ret,
    Closure,
    OpenScope,
    CloseScope,
    Br,
    Brf,
    GLoad,
    GLda,
    GStore,
    Load,
    Lda,
    Store,
    FLoad,
    FLda,
    FStore,
    Struct,
    Null,
    Print,
    Println,
    Pop,
    Label,
}

/// `{op, operand}` — `operand` is `Value::Null` when the opcode doesn't use one.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: Value,
}

impl Instruction {
    pub fn new(op: OpCode, operand: Value) -> Self {
        Self { op, operand }
    }

    pub fn bare(op: OpCode) -> Self {
        Self::new(op, Value::Null)
    }
}
