//! Point size.

use crate::{
    asm_lang::{Instruction, Opcode},
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::{point, BindingTag, Feature};

/// `clamp(size / sqrt(a + b*d + c*d^2), min, max)`, the attenuation only when enabled.
pub(super) fn point_size(s: &mut CompilationSession) -> Result<(), CompileError> {
    let enabled = s.consume(Feature::PointSize);
    let from_vertex = s.consume(Feature::VertexPointSize);
    let attenuate = s.consume(Feature::PointAttenuation);
    if !enabled {
        return Ok(());
    }

    let out = s.output(BindingTag::OutputPointSize)?;
    let params = s.constant(BindingTag::PointParams)?;
    let size = if from_vertex {
        s.input(BindingTag::InputPointSize, 1)?
    } else {
        params.at(point::SIZE)
    };

    let attenuated = if attenuate {
        let (distance, owned) = s.eye_distance()?;
        let k = params.sub(point::ATTENUATION, 3);
        let t = s.alloc_temp(1)?;
        s.emit(Instruction::alu(Opcode::Mad, t, [distance, k.at(2), k.at(1)]))?;
        s.emit(Instruction::alu(Opcode::Mad, t, [distance, t, k.at(0)]))?;
        s.emit(Instruction::alu(Opcode::Rsq, t, [t]))?;
        s.emit(Instruction::alu(Opcode::Mul, t, [t, size]).with_comment("attenuated size"))?;
        if owned {
            s.release(distance);
        }
        Some(t)
    } else {
        None
    };

    let clamped = s.alloc_temp(1)?;
    s.emit(Instruction::alu(
        Opcode::Max,
        clamped,
        [attenuated.unwrap_or(size), params.at(point::MIN)],
    ))?;
    s.emit(Instruction::alu(Opcode::Min, out, [clamped, params.at(point::MAX)]))?;

    s.release(clamped);
    if let Some(t) = attenuated {
        s.release(t);
    }
    s.release(params);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, listing, opcodes};
    use crate::asm_lang::Opcode;
    use ffgen_types::{Feature, PipelineDescriptor, Target};

    #[test]
    fn constant_size_is_clamped() {
        let desc = PipelineDescriptor::default().with_feature(Feature::PointSize);
        let program = compile(&desc, Target::Sgx530);
        assert_eq!(
            opcodes(&program),
            vec![Opcode::Mov, Opcode::Max, Opcode::Min, Opcode::End]
        );
        // Size, min and max all come from the point parameters.
        let lines = listing(&program);
        assert_eq!(lines[1], "    max r0, sa4, sa5");
        assert_eq!(lines[2], "    min o4, r0, sa6");
    }

    #[test]
    fn vertex_size_with_attenuation() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::PointSize)
            .with_feature(Feature::VertexPointSize)
            .with_feature(Feature::PointAttenuation);
        let program = compile(&desc, Target::Sgx543);
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::Vdp4,
                Opcode::Vdp4,
                Opcode::Dp3,
                Opcode::Rsq,
                Opcode::Rcp,
                Opcode::Mad,
                Opcode::Mad,
                Opcode::Rsq,
                Opcode::Mul,
                Opcode::Max,
                Opcode::Min,
                Opcode::End
            ]
        );
        assert!(program.inputs.iter().any(|usage| usage.size == 1));
    }
}
