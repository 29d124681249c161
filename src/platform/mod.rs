//! Player script extraction and replay

pub mod grammar;
pub mod patterns;
mod runtime;
pub mod signature;
pub mod switch_vm;
pub mod transform;

pub use grammar::{ArrayElement, ElementGrammar, Primitive, VariableRef};
pub use signature::{SignatureOperation, SignatureProgram};
pub use switch_vm::{Instruction, SubstitutionTable, MAX_REPLAY_ITERATIONS};
pub use transform::{Action, ActionArg, TransformProgram};
