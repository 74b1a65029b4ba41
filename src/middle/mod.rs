//! Everything after reading: the IR data model, the runtime contract and the
//! code generator that connects them.

pub mod codegen;
pub mod ir;
pub mod runtime;
