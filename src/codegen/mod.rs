//! Instruction emission backend

mod code;
mod constpool;
mod gen;
pub mod opcodes;

pub use code::{Bytecode, ExceptionTableEntry};
pub use constpool::{ConstPool, PoolEntry, RecordingPool};
pub use gen::{BridgeKind, BridgeMember, CodeGen, CompiledBody};
