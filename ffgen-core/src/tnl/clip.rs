//! User clip planes.

use crate::{
    asm_lang::{Instruction, Opcode},
    session::CompilationSession,
};

use ffgen_error::{error::CompileError, warning::Warning};
use ffgen_types::{BindingTag, Feature, MAX_CLIP_PLANES};

/// Writes the signed distance of the eye-space position to every enabled plane.
pub(super) fn clip(s: &mut CompilationSession) -> Result<(), CompileError> {
    if !s.consume(Feature::Clipping) {
        return Ok(());
    }
    let mask = s.desc.clip_planes;
    if mask == 0 {
        s.warn(Warning::EmptyClipPlaneMask);
        return Ok(());
    }
    let eye = s.eye_position()?;
    for plane in (0..MAX_CLIP_PLANES).filter(|plane| mask & (1 << plane) != 0) {
        let distance = s.output(BindingTag::OutputClipDistance(plane))?;
        let coefficients = s.constant(BindingTag::ClipPlane(plane))?;
        s.emit(Instruction::alu(Opcode::Dp4, distance, [coefficients, eye]))?;
        s.release(coefficients);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, opcodes};
    use crate::asm_lang::Opcode;
    use ffgen_error::warning::Warning;
    use ffgen_types::{BindingTag, Feature, PipelineDescriptor, Target};

    #[test]
    fn one_distance_per_enabled_plane() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::Clipping)
            .with_clip_planes(0b100010);
        let program = compile(&desc, Target::Sgx543);
        // Position, eye position, then the two planes.
        assert_eq!(
            opcodes(&program),
            vec![Opcode::Vdp4, Opcode::Vdp4, Opcode::Dp4, Opcode::Dp4, Opcode::End]
        );
        let planes = program
            .constants
            .iter()
            .filter(|usage| matches!(usage.binding, BindingTag::ClipPlane(_)))
            .map(|usage| usage.binding)
            .collect::<Vec<_>>();
        assert_eq!(
            planes,
            vec![BindingTag::ClipPlane(1), BindingTag::ClipPlane(5)]
        );
    }

    #[test]
    fn empty_mask_warns_and_emits_nothing() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::Clipping);
        let program = compile(&desc, Target::Sgx543);
        assert_eq!(opcodes(&program), vec![Opcode::Vdp4, Opcode::End]);
        assert_eq!(program.warnings.len(), 1);
        assert_eq!(program.warnings[0].pass, "clip");
        assert_eq!(
            program.warnings[0].warning_content,
            Warning::EmptyClipPlaneMask
        );
    }
}
