//! Symbolic instruction streams and their compiled form
//!
//! Method bodies are modelled as streams of [`CodeSink`] events whose operands are names and
//! labels rather than constant pool indices, so a body recorded from one class can be replayed
//! into another. [`decode_code`] lifts a compiled `Code` attribute into events; [`encode_code`]
//! lowers an op list back down, re-resolving constants against the destination pool.

mod decode;
mod encode;
pub mod opcodes;
mod ops;
mod sequence;
mod sink;

pub use decode::decode_code;
pub use encode::encode_code;
pub use ops::{Label, LoadableConstant, Op};
pub use sequence::{replay_op, InstructionSequence};
pub use sink::CodeSink;
