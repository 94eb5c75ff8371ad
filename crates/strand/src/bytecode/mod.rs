//! Bytecode instructions, validated code objects, the code builder and the VM.
//!
//! Hosts assemble [`Code`] with [`CodeBuilder`] (or deserialize it) and execute it
//! through [`Runner`](crate::Runner); the VM itself stays crate-private.

mod builder;
mod code;
mod inst;
mod vm;

pub use builder::{CodeBuilder, JumpLabel};
pub use code::{Code, CodeError};
pub use inst::Inst;
pub(crate) use vm::VM;
