//! Shared vocabulary of the fixed-function T&L code generator: the feature enables that
//! describe a pipeline, the descriptor handed to the compiler, the binding tags that name every
//! register the generated program uses, and the capabilities of the cores it can target.

pub mod binding;
pub mod descriptor;
pub mod features;
pub mod target;

pub use binding::*;
pub use descriptor::*;
pub use features::*;
pub use target::*;
