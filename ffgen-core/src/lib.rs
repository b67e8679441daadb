//! Code generator for fixed-function transform and lighting.
//!
//! [`compile_pipeline`] turns a [`PipelineDescriptor`](ffgen_types::PipelineDescriptor) into a
//! vertex program for one of the supported cores, along with the register usage tables the host
//! needs to bind its state to the program.

pub mod asm_generation;
pub mod asm_lang;
mod build_config;
pub mod register_allocation;
pub mod session;
pub mod tnl;
pub mod uniflex;

pub use asm_generation::{Assembler, GeneratedProgram, ProgramCode, ReferenceAssembler};
pub use build_config::{BuildConfig, CodegenMode, OutputKind};
pub use tnl::{compile_pipeline, compile_pipeline_with, Pass, PASSES};
