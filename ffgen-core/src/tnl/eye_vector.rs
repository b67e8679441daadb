//! The normalised vertex-to-eye vector and the eye distance.

use crate::{
    asm_lang::{Instruction, Opcode},
    register_allocation::Register,
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::Feature;

impl CompilationSession<'_> {
    pub(super) fn eye_position(&self) -> Result<Register, CompileError> {
        self.carried
            .eye_position
            .ok_or(CompileError::Internal("eye-space position was not computed"))
    }

    pub(super) fn eye_normal(&self) -> Result<Register, CompileError> {
        self.carried
            .eye_normal
            .ok_or(CompileError::Internal("eye-space normal was not computed"))
    }

    /// Distance from the eye to the vertex.
    ///
    /// Reuses the carried distance when there is one. Otherwise it is computed into a fresh
    /// temporary and the flag returned alongside is set so the caller releases it.
    pub(super) fn eye_distance(&mut self) -> Result<(Register, bool), CompileError> {
        if let Some(distance) = self.carried.eye_distance {
            return Ok((distance, false));
        }
        let eye = self.eye_position()?.first(3);
        let distance = self.alloc_temp(1)?;
        self.emit(Instruction::alu(Opcode::Dp3, distance, [eye, eye]))?;
        self.emit(Instruction::alu(Opcode::Rsq, distance, [distance]))?;
        self.emit(Instruction::alu(Opcode::Rcp, distance, [distance]).with_comment("eye distance"))?;
        Ok((distance, true))
    }
}

pub(super) fn eye_vector(s: &mut CompilationSession) -> Result<(), CompileError> {
    if !s.consume(Feature::EyeVector) {
        return Ok(());
    }
    let eye = s.eye_position()?.first(3);
    let distance = s.alloc_temp(1)?;
    let vector = s.alloc_temp(3)?;
    s.emit(Instruction::alu(Opcode::Dp3, distance, [eye, eye]))?;
    s.emit(Instruction::alu(Opcode::Rsq, distance, [distance]))?;
    s.emit(
        Instruction::alu(Opcode::Mul, vector, [eye.neg(), distance.into()])
            .with_comment("vertex to eye"),
    )?;
    s.emit(Instruction::alu(Opcode::Rcp, distance, [distance]).with_comment("eye distance"))?;
    s.carried.eye_vector = Some(vector);
    s.carried.eye_distance = Some(distance);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, listing, opcodes};
    use crate::asm_lang::Opcode;
    use ffgen_types::{Feature, PipelineDescriptor, Target};

    #[test]
    fn vector_and_distance_share_one_rsq() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::EyeVector);
        let program = compile(&desc, Target::Sgx543);
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::Vdp4,
                Opcode::Vdp4,
                Opcode::Dp3,
                Opcode::Rsq,
                Opcode::Mul,
                Opcode::Rcp,
                Opcode::End
            ]
        );
        let lines = listing(&program);
        assert!(lines[4].starts_with("    mul.r3 r5, -r0, r4"));
    }

    #[test]
    fn eye_distance_is_reused_by_point_attenuation() {
        let base = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::PointSize)
            .with_feature(Feature::PointAttenuation);
        let without = opcodes(&compile(&base, Target::Sgx543));
        let with = opcodes(&compile(
            &base.clone().with_feature(Feature::EyeVector),
            Target::Sgx543,
        ));
        let rcp = |ops: &[Opcode]| ops.iter().filter(|op| **op == Opcode::Rcp).count();
        assert_eq!(rcp(&without), 1);
        assert_eq!(rcp(&with), 1);
        assert_eq!(with.len(), without.len() + 1);
    }
}
