//! Emission, lowering and encoding of the generated instructions.

mod assembler;
mod builder;
pub mod control_flow;
mod finalized;
mod lowering;
mod matrix;
pub mod scheduling;

pub use assembler::{AssembledCode, Assembler, ReferenceAssembler};
pub use builder::{AsmBuilder, LoweredProgram};
pub use control_flow::{LabelResolver, LabelTable, MAX_BRANCH_NESTING, MAX_LABELS};
pub use finalized::{GeneratedProgram, ProgramCode};
pub use lowering::lower_instruction;
