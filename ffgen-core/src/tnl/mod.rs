//! Generation of a fixed-function transform-and-lighting program.
//!
//! The program is produced by a fixed, linear sequence of passes. Each pass looks at the
//! features it is responsible for, removes them from the session's working set and emits its
//! part of the program. Values needed by more than one pass travel between them in
//! [`CarriedValues`](crate::session::CarriedValues).

mod clip;
mod colour;
mod eye_vector;
mod fog;
mod lighting;
mod outputs;
mod point_size;
mod redirect;
mod texturing;
mod transform;

use crate::{
    asm_generation::{Assembler, GeneratedProgram, ReferenceAssembler},
    build_config::BuildConfig,
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::PipelineDescriptor;

pub type PassRunner = fn(&mut CompilationSession) -> Result<(), CompileError>;

pub struct Pass {
    pub name: &'static str,
    pub descr: &'static str,
    pub runner: PassRunner,
}

/// Every pass, in the order they run.
pub const PASSES: &[Pass] = &[
    Pass {
        name: "outputs",
        descr: "Assign output registers",
        runner: outputs::assign_output_registers,
    },
    Pass {
        name: "transform",
        descr: "Position and normal transformation",
        runner: transform::transform,
    },
    Pass {
        name: "clip",
        descr: "User clip plane distances",
        runner: clip::clip,
    },
    Pass {
        name: "colour",
        descr: "Vertex colour passthrough",
        runner: colour::colour,
    },
    Pass {
        name: "fog",
        descr: "Fog coordinate and factor",
        runner: fog::fog,
    },
    Pass {
        name: "eye-vector",
        descr: "Normalised vertex to eye vector",
        runner: eye_vector::eye_vector,
    },
    Pass {
        name: "point-size",
        descr: "Point size and distance attenuation",
        runner: point_size::point_size,
    },
    Pass {
        name: "lighting",
        descr: "Per vertex lighting",
        runner: lighting::lighting,
    },
    Pass {
        name: "texturing",
        descr: "Texture coordinate generation",
        runner: texturing::texturing,
    },
    Pass {
        name: "finish",
        descr: "Output redirection and program end",
        runner: redirect::finish_program,
    },
];

/// Compiles `desc` and encodes it with the [`ReferenceAssembler`].
pub fn compile_pipeline(
    desc: &PipelineDescriptor,
    config: &BuildConfig,
) -> Result<GeneratedProgram, CompileError> {
    compile_pipeline_with(desc, config, &mut ReferenceAssembler)
}

/// Compiles `desc`, handing the finished instruction list to `assembler`.
pub fn compile_pipeline_with(
    desc: &PipelineDescriptor,
    config: &BuildConfig,
    assembler: &mut dyn Assembler,
) -> Result<GeneratedProgram, CompileError> {
    desc.validate()?;
    let desc = desc.clone().with_derived_requirements();
    tracing::debug!(
        "compiling for {} with features {}",
        config.target(),
        desc.features
    );

    let mut session = CompilationSession::new(&desc, config)?;
    for pass in PASSES {
        session.pass = pass.name;
        tracing::debug!("running pass `{}`", pass.name);
        session.new_block(pass.descr)?;
        (pass.runner)(&mut session)?;
        tracing::debug!(
            "finished pass `{}`, {} temporary words live",
            pass.name,
            session.registers.current_temp_size()
        );
    }
    if !session.asm.branches.is_empty() {
        return Err(CompileError::UnterminatedBranch);
    }
    session.finish(assembler)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asm_lang::Opcode;
    use ffgen_types::{Feature, Features, Target};

    pub(crate) fn compile(desc: &PipelineDescriptor, target: Target) -> GeneratedProgram {
        compile_pipeline(desc, &BuildConfig::new(target)).unwrap()
    }

    /// Executable opcodes of a hardware program, padding excluded.
    pub(crate) fn opcodes(program: &GeneratedProgram) -> Vec<Opcode> {
        program
            .hw_instructions()
            .iter()
            .map(|inst| inst.opcode)
            .filter(|op| !op.is_annotation() && *op != Opcode::Nop)
            .collect()
    }

    /// Listing lines of the executable instructions.
    pub(crate) fn listing(program: &GeneratedProgram) -> Vec<String> {
        program
            .hw_instructions()
            .iter()
            .filter(|inst| !inst.opcode.is_annotation() && inst.opcode != Opcode::Nop)
            .map(|inst| inst.to_string())
            .collect()
    }

    #[test]
    fn pass_names_are_unique() {
        let mut names = PASSES.iter().map(|pass| pass.name).collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PASSES.len());
        assert_eq!(PASSES.first().map(|p| p.name), Some("outputs"));
        assert_eq!(PASSES.last().map(|p| p.name), Some("finish"));
    }

    #[test]
    fn conflicting_descriptors_are_rejected_before_generation() {
        let desc = PipelineDescriptor::new(
            Features::new()
                .with(Feature::StandardTransformation)
                .with(Feature::VertexBlending),
        );
        assert!(matches!(
            compile_pipeline(&desc, &BuildConfig::new(Target::Sgx535)),
            Err(CompileError::Descriptor(_))
        ));
    }

    #[test]
    fn empty_descriptor_passes_the_position_through() {
        let program = compile(&PipelineDescriptor::default(), Target::Sgx530);
        assert_eq!(opcodes(&program), vec![Opcode::Mov, Opcode::End]);
        assert_eq!(program.outputs.len(), 1);
    }
}
