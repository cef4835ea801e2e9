//! Bytecode backend: ISA + constant pool (component G), compiler (H), and
//! stack VM (I) — an alternate executor over the same value model the
//! tree-walking evaluator uses (SPEC_FULL.md §2).

pub mod compiler;
pub mod constant_pool;
pub mod opcode;
pub mod vm;

pub use compiler::{compile, CompiledProgram};
pub use constant_pool::ConstantPool;
pub use opcode::{Instruction, OpCode};
pub use vm::Vm;
