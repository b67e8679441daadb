//! Fog coordinate and per-vertex fog factor.

use crate::{
    asm_lang::{Instruction, Opcode},
    register_allocation::Register,
    session::CompilationSession,
};

use ffgen_error::{error::CompileError, warning::Warning};
use ffgen_types::{fixed, fog, BindingTag, Feature};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FogMode {
    /// The coordinate itself is written.
    Coordinate,
    Linear,
    Exp,
    Exp2,
}

pub(super) fn fog(s: &mut CompilationSession) -> Result<(), CompileError> {
    let enabled = s.consume(Feature::Fog);
    let attribute = s.consume(Feature::FogCoordAttribute);
    let eye_z = s.consume(Feature::FogCoordEyeZ);
    let radial = s.consume(Feature::FogCoordRadial);
    let linear = s.consume(Feature::FogLinear);
    let exp = s.consume(Feature::FogExp);
    let exp2 = s.consume(Feature::FogExp2);
    if !enabled {
        return Ok(());
    }

    let mode = match (linear, exp, exp2) {
        (true, _, _) => FogMode::Linear,
        (_, true, _) => FogMode::Exp,
        (_, _, true) => FogMode::Exp2,
        _ => FogMode::Coordinate,
    };

    // The coordinate, and whether it is a temporary owned here.
    let (coord, owned) = if attribute {
        (s.input(BindingTag::InputFogCoord, 1)?, false)
    } else if eye_z {
        let eye = s.eye_position()?;
        let coord = s.alloc_temp(1)?;
        s.emit(Instruction::mov(coord, eye.at(2).abs()).with_comment("|eye z|"))?;
        (coord, true)
    } else if radial {
        s.eye_distance()?
    } else {
        s.warn(Warning::MissingFogCoordinateSource);
        return Ok(());
    };

    let out = s.output(BindingTag::OutputFog)?;
    write_factor(s, out, coord, mode)?;
    if owned {
        s.release(coord);
    }
    Ok(())
}

fn write_factor(
    s: &mut CompilationSession,
    out: Register,
    coord: Register,
    mode: FogMode,
) -> Result<(), CompileError> {
    if mode == FogMode::Coordinate {
        return s.emit(Instruction::mov(out, coord));
    }
    let params = s.constant(BindingTag::FogParams)?;
    let t = s.alloc_temp(1)?;
    match mode {
        FogMode::Linear => {
            // (end - c) * scale
            s.emit(Instruction::alu(
                Opcode::Add,
                t,
                [coord.neg(), params.at(fog::END).into()],
            ))?;
            s.emit(Instruction::alu(Opcode::Mul, out, [t, params.at(fog::SCALE)]))?;
        }
        FogMode::Exp => {
            // 2^(-density * log2(e) * c)
            let log2_e = s.fixed(fixed::LOG2_E)?;
            s.emit(Instruction::alu(
                Opcode::Mul,
                t,
                [coord, params.at(fog::EXP_DENSITY)],
            ))?;
            s.emit(Instruction::alu(Opcode::Mul, t, [t, log2_e]))?;
            s.emit(Instruction::alu(Opcode::Exp, out, [t.neg()]))?;
            s.release(log2_e);
        }
        FogMode::Exp2 => {
            // 2^(-(density' * c)^2), density' holds density * sqrt(log2(e))
            s.emit(Instruction::alu(
                Opcode::Mul,
                t,
                [coord, params.at(fog::EXP2_DENSITY)],
            ))?;
            s.emit(Instruction::alu(Opcode::Mul, t, [t, t]))?;
            s.emit(Instruction::alu(Opcode::Exp, out, [t.neg()]))?;
        }
        FogMode::Coordinate => {}
    }
    s.release(t);
    s.release(params);
    Ok(())
}
