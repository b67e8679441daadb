//! Texture coordinate generation.
//!
//! The generation modes of a unit are applied in a fixed order, each writing the components
//! selected by its mask. When the unit has a texture matrix the coordinates are first built in a
//! temporary holding `(0, 0, 0, 1)` for every component no mode writes, and the matrix product is
//! what reaches the output.

use crate::{
    asm_lang::{Instruction, Opcode},
    register_allocation::Register,
    session::CompilationSession,
};

use ffgen_error::{error::CompileError, warning::Warning};
use ffgen_types::{fixed, BindingTag, CoordMask, Feature, TextureUnitGen};

pub(super) fn texturing(s: &mut CompilationSession) -> Result<(), CompileError> {
    if !s.consume(Feature::Texturing) {
        return Ok(());
    }
    let desc = s.desc;

    for (unit, gen) in desc.texture_units.iter().enumerate() {
        if gen.texture_matrix && !gen.is_enabled() {
            s.warn(Warning::TextureUnitWithoutCoordinates { unit: unit as u8 });
        }
    }
    let units = desc.enabled_texture_units().collect::<Vec<_>>();
    if units.is_empty() {
        s.warn(Warning::EmptyTexturingMask);
        return Ok(());
    }

    for (unit, gen) in units {
        generate_unit(s, unit, gen)?;
    }

    if let Some(reflection) = s.carried.reflection_vector.take() {
        s.release(reflection);
    }
    Ok(())
}

fn generate_unit(
    s: &mut CompilationSession,
    unit: u8,
    gen: &TextureUnitGen,
) -> Result<(), CompileError> {
    s.comment(format!("texture unit {unit}: {}", gen.generated()))?;
    let out = s.output(BindingTag::OutputTexCoord(unit))?;

    if gen.texture_matrix && gen.computed().is_empty() {
        // Nothing but the attribute feeds the matrix, so it is read in place.
        let coords = s.input(BindingTag::InputTexCoord(unit), 4)?;
        return texture_matrix(s, unit, out, coords, gen.dimension());
    }

    let target = if gen.texture_matrix {
        let target = s.alloc_temp(4)?;
        fill_unwritten(s, target, gen.generated())?;
        target
    } else {
        out
    };

    if !gen.passthrough.is_empty() {
        let coords = s.input(BindingTag::InputTexCoord(unit), 4)?;
        for (first, count) in gen.passthrough.runs() {
            s.emit(Instruction::mov(
                target.sub(first, count),
                coords.sub(first, count),
            ))?;
        }
    }
    if !gen.eye_linear.is_empty() {
        let eye = s.eye_position()?;
        plane_dots(s, target, eye, BindingTag::EyePlanes(unit), gen.eye_linear)?;
    }
    if !gen.object_linear.is_empty() {
        let position = s.input(BindingTag::InputPosition, 4)?;
        plane_dots(
            s,
            target,
            position,
            BindingTag::ObjectPlanes(unit),
            gen.object_linear,
        )?;
    }
    if !gen.sphere_map.is_empty() {
        let reflection = reflection_vector(s)?;
        sphere_map(s, target, reflection, gen.sphere_map)?;
    }
    if !gen.normal_map.is_empty() {
        let normal = s.eye_normal()?;
        copy_vector(s, target, normal, gen.normal_map)?;
    }
    if !gen.position_map.is_empty() {
        let eye = s.eye_position()?;
        for c in gen.position_map.components() {
            s.emit(Instruction::mov(target.at(c), eye.at(c)))?;
        }
    }
    if !gen.reflection_map.is_empty() {
        let reflection = reflection_vector(s)?;
        copy_vector(s, target, reflection, gen.reflection_map)?;
    }

    if gen.texture_matrix {
        texture_matrix(s, unit, out, target, gen.dimension())?;
        s.release(target);
    }
    Ok(())
}

/// Writes zero to every s, t and r component outside `written` and one to an unwritten q.
fn fill_unwritten(
    s: &mut CompilationSession,
    target: Register,
    written: CoordMask,
) -> Result<(), CompileError> {
    for c in (0..4).filter(|c| !written.contains(*c)) {
        let word = if c == 3 { fixed::ONE } else { fixed::ZERO };
        let value = s.fixed(word)?;
        s.emit(Instruction::mov(target.at(c), value))?;
        s.release(value);
    }
    Ok(())
}

/// `target.c = plane_c . v` for every component of `mask`.
fn plane_dots(
    s: &mut CompilationSession,
    target: Register,
    v: Register,
    planes: BindingTag,
    mask: CoordMask,
) -> Result<(), CompileError> {
    let planes = s.constant(planes)?;
    for c in mask.components() {
        s.emit(Instruction::alu(
            Opcode::Dp4,
            target.at(c),
            [v.first(4), planes.sub(c * 4, 4)],
        ))?;
    }
    s.release(planes);
    Ok(())
}

/// Copies the s, t and r components of a three word vector, writing one to q.
fn copy_vector(
    s: &mut CompilationSession,
    target: Register,
    v: Register,
    mask: CoordMask,
) -> Result<(), CompileError> {
    for (first, count) in mask.intersect(CoordMask::STR).runs() {
        s.emit(Instruction::mov(target.sub(first, count), v.sub(first, count)))?;
    }
    if mask.contains(3) {
        let one = s.fixed(fixed::ONE)?;
        s.emit(Instruction::mov(target.at(3), one))?;
        s.release(one);
    }
    Ok(())
}

/// `R = 2 (n.v) n - v`, computed once per program.
fn reflection_vector(s: &mut CompilationSession) -> Result<Register, CompileError> {
    if let Some(reflection) = s.carried.reflection_vector {
        return Ok(reflection);
    }
    let normal = s.eye_normal()?.first(3);
    let eye_vector = s
        .carried
        .eye_vector
        .ok_or(CompileError::Internal("reflection without an eye vector"))?;
    let two = s.fixed(fixed::TWO)?;

    let n_dot_v = s.alloc_temp(1)?;
    let reflection = s.alloc_temp(3)?;
    s.emit(Instruction::alu(Opcode::Dp3, n_dot_v, [normal, eye_vector]))?;
    s.emit(Instruction::alu(Opcode::Mul, n_dot_v, [n_dot_v, two]))?;
    s.emit(
        Instruction::alu(
            Opcode::Mad,
            reflection,
            [normal.into(), n_dot_v.into(), eye_vector.neg()],
        )
        .with_comment("reflection"),
    )?;
    s.release(n_dot_v);
    s.release(two);
    s.carried.reflection_vector = Some(reflection);
    Ok(reflection)
}

/// `s, t = R.xy / m + 0.5` with `m = 2 |R + (0, 0, 1)|`.
fn sphere_map(
    s: &mut CompilationSession,
    target: Register,
    reflection: Register,
    mask: CoordMask,
) -> Result<(), CompileError> {
    let one = s.fixed(fixed::ONE)?;
    let half = s.fixed(fixed::HALF)?;

    let shifted = s.alloc_temp(3)?;
    let inv_m = s.alloc_temp(1)?;
    s.emit(Instruction::mov(shifted, reflection))?;
    s.emit(Instruction::alu(
        Opcode::Add,
        shifted.at(2),
        [shifted.at(2), one],
    ))?;
    s.emit(Instruction::alu(Opcode::Dp3, inv_m, [shifted, shifted]))?;
    s.emit(Instruction::alu(Opcode::Rsq, inv_m, [inv_m]))?;
    s.emit(Instruction::alu(Opcode::Mul, inv_m, [inv_m, half]))?;
    for c in mask.intersect(CoordMask::ST).components() {
        s.emit(
            Instruction::alu(
                Opcode::Mad,
                target.at(c),
                [reflection.at(c), inv_m, half],
            )
            .with_comment("sphere map"),
        )?;
    }

    s.release(inv_m);
    s.release(shifted);
    s.release(half);
    s.release(one);
    Ok(())
}

fn texture_matrix(
    s: &mut CompilationSession,
    unit: u8,
    out: Register,
    coords: Register,
    rows: u32,
) -> Result<(), CompileError> {
    let matrix = s.constant(BindingTag::TextureMatrix(unit))?;
    match rows {
        4 => s.m4x4(out, coords, matrix)?,
        3 => s.m4x3(out, coords, matrix)?,
        _ => s.matrix_transform(out, coords, matrix, rows, 4)?,
    }
    s.release(matrix);
    Ok(())
}
