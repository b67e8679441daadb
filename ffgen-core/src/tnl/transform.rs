//! Position transformation, eye-space position and normal.

use crate::{
    asm_lang::{Instruction, Opcode},
    register_allocation::{IndexedBy, Register, RegisterAllocator, RegisterSpace},
    session::CompilationSession,
};

use ffgen_error::{error::CompileError, warning::Warning};
use ffgen_types::{
    fixed, BindingTag, Feature, PALETTE_MATRIX_STRIDE, PALETTE_NORMAL_STRIDE,
};

/// Where the blend matrices of one unit come from.
#[derive(Clone, Copy, Debug)]
enum BlendSource {
    /// One model-view and normal matrix per unit.
    PerUnit,
    /// Matrices picked per vertex from a palette of `entries` matrices.
    Palette { entries: u8, index: Register },
}

pub(super) fn transform(s: &mut CompilationSession) -> Result<(), CompileError> {
    let position_out = s.output(BindingTag::OutputPosition)?;
    let position = s.input(BindingTag::InputPosition, 4)?;

    if s.has(Feature::OutputRedirection) {
        // The stage the outputs are redirected to transforms the position itself.
        s.consume_all(&[
            Feature::StandardTransformation,
            Feature::VertexBlending,
            Feature::MatrixPaletteBlending,
        ]);
        s.emit(Instruction::mov(position_out, position).with_comment("redirected"))?;
    } else if s.consume(Feature::StandardTransformation) {
        let mvp = s.constant(BindingTag::ModelViewProjection)?;
        s.m4x4(position_out, position, mvp)?;
        s.release(mvp);
    } else if s.consume(Feature::VertexBlending) {
        blend(s, position_out, position, BlendSource::PerUnit)?;
    } else if s.consume(Feature::MatrixPaletteBlending) {
        let index = palette_indices(s)?;
        let entries = s.desc.matrix_palette_size;
        blend(s, position_out, position, BlendSource::Palette { entries, index })?;
        s.release(index);
    } else {
        s.emit(Instruction::mov(position_out, position).with_comment("untransformed"))?;
    }

    // Whatever blending did not provide is computed with the single model-view matrix.
    if s.consume(Feature::EyePosition) {
        let eye = s.alloc_temp(4)?;
        let model_view = s.constant(BindingTag::ModelView)?;
        s.m4x4(eye, position, model_view)?;
        s.release(model_view);
        s.carried.eye_position = Some(eye);
    }
    if s.consume(Feature::TransformNormals) {
        let normal = s.alloc_temp(3)?;
        let normal_in = s.input(BindingTag::InputNormal, 3)?;
        let normal_matrix = s.constant(BindingTag::NormalMatrix)?;
        s.m3x3(normal, normal_in, normal_matrix)?;
        s.release(normal_matrix);
        s.carried.eye_normal = Some(normal);
    }

    let rescale = s.consume(Feature::RescaleNormals);
    let normalise = s.consume(Feature::NormaliseNormals);
    if let Some(normal) = s.carried.eye_normal {
        if rescale {
            let scale = s.constant(BindingTag::NormalScale)?;
            s.emit(Instruction::alu(Opcode::Mul, normal, [normal, scale]).with_comment("rescale"))?;
            s.release(scale);
        }
        if normalise {
            s.normalise(normal)?;
        }
    }
    Ok(())
}

impl CompilationSession<'_> {
    /// Scales the three word vector `v` to unit length in place.
    pub(super) fn normalise(&mut self, v: Register) -> Result<(), CompileError> {
        let inv_len = self.alloc_temp(1)?;
        self.emit(Instruction::alu(Opcode::Dp3, inv_len, [v.first(3), v.first(3)]))?;
        self.emit(Instruction::alu(Opcode::Rsq, inv_len, [inv_len]))?;
        self.emit(Instruction::alu(Opcode::Mul, v, [v, inv_len]).with_comment("normalise"))?;
        self.release(inv_len);
        Ok(())
    }
}

/// Turns the per-vertex palette indices into integers clamped to the palette.
fn palette_indices(s: &mut CompilationSession) -> Result<Register, CompileError> {
    let units = s.desc.blend_units.max(1) as u32;
    let indices = s.input(BindingTag::InputPaletteIndices, units)?;
    let limit = s.constant(BindingTag::PaletteIndexLimit)?;
    let zero = s.fixed(fixed::ZERO)?;

    let index = s.alloc_temp(units)?;
    s.emit(Instruction::alu(Opcode::Flr, index, [indices]))?;
    s.emit(Instruction::alu(Opcode::Max, index, [index, zero]))?;
    s.emit(Instruction::alu(Opcode::Min, index, [index, limit]))?;
    s.emit(Instruction::alu(Opcode::F2i, index, [index]).with_comment("palette indices"))?;

    s.release(zero);
    s.release(limit);
    Ok(index)
}

/// `acc = weight * term` for the first unit, `acc += weight * term` after that.
fn accumulate(
    s: &mut CompilationSession,
    acc: Register,
    term: Register,
    weight: Register,
    first: bool,
) -> Result<(), CompileError> {
    let inst = if first {
        Instruction::alu(Opcode::Mul, acc, [term, weight])
    } else {
        Instruction::alu(Opcode::Mad, acc, [term, weight, acc])
    };
    s.emit(inst)
}

fn blend_model_view(
    s: &mut CompilationSession,
    source: BlendSource,
    unit: u8,
) -> Result<Register, CompileError> {
    match source {
        BlendSource::PerUnit => s.constant(BindingTag::BlendModelView(unit)),
        BlendSource::Palette { entries, index } => s.get_or_alloc(
            RegisterSpace::Constant,
            BindingTag::MatrixPalette(entries),
            0,
            PALETTE_MATRIX_STRIDE,
            Some(IndexedBy {
                value: index.at(unit as u32),
                stride: PALETTE_MATRIX_STRIDE,
                register: RegisterAllocator::index_register(0),
            }),
        ),
    }
}

fn blend_normal_matrix(
    s: &mut CompilationSession,
    source: BlendSource,
    unit: u8,
) -> Result<Register, CompileError> {
    match source {
        BlendSource::PerUnit => s.constant(BindingTag::BlendNormalMatrix(unit)),
        BlendSource::Palette { entries, index } => s.get_or_alloc(
            RegisterSpace::Constant,
            BindingTag::NormalPalette(entries),
            0,
            PALETTE_NORMAL_STRIDE,
            Some(IndexedBy {
                value: index.at(unit as u32),
                stride: PALETTE_NORMAL_STRIDE,
                register: RegisterAllocator::index_register(1),
            }),
        ),
    }
}

/// Weighted sum of the position (and normal) transformed by each unit's matrices, projected
/// into clip space.
fn blend(
    s: &mut CompilationSession,
    position_out: Register,
    position: Register,
    source: BlendSource,
) -> Result<(), CompileError> {
    let units = s.desc.blend_units;
    if units == 0 {
        s.warn(Warning::BlendingWithoutUnits);
        return s.emit(Instruction::mov(position_out, position).with_comment("no blend units"));
    }
    let with_normal = s.has(Feature::TransformNormals);
    if let BlendSource::Palette { entries, .. } = source {
        // Both palettes are placed before the first indexed access so neither is split.
        s.alloc_space(
            RegisterSpace::Constant,
            BindingTag::MatrixPalette(entries),
            entries as u32 * PALETTE_MATRIX_STRIDE,
            false,
        )?;
        if with_normal {
            s.alloc_space(
                RegisterSpace::Constant,
                BindingTag::NormalPalette(entries),
                entries as u32 * PALETTE_NORMAL_STRIDE,
                false,
            )?;
        }
    }

    let weights = s.input(BindingTag::InputBlendWeights, units as u32)?;
    let normal_in = if with_normal {
        Some(s.input(BindingTag::InputNormal, 3)?)
    } else {
        None
    };
    let eye = s.alloc_temp(4)?;
    let normal = match normal_in {
        Some(_) => Some(s.alloc_temp(3)?),
        None => None,
    };
    let partial = s.alloc_temp(4)?;

    for unit in 0..units {
        s.comment(format!("blend unit {unit}"))?;
        let weight = weights.at(unit as u32);
        let model_view = blend_model_view(s, source, unit)?;
        s.m4x4(partial, position, model_view)?;
        s.release(model_view);
        accumulate(s, eye, partial, weight, unit == 0)?;

        if let (Some(normal), Some(normal_in)) = (normal, normal_in) {
            let normal_matrix = blend_normal_matrix(s, source, unit)?;
            s.m3x3(partial.first(3), normal_in, normal_matrix)?;
            s.release(normal_matrix);
            accumulate(s, normal, partial.first(3), weight, unit == 0)?;
        }
    }
    s.release(partial);

    let projection = s.constant(BindingTag::Projection)?;
    s.m4x4(position_out, eye, projection)?;
    s.release(projection);

    if s.consume(Feature::EyePosition) {
        s.carried.eye_position = Some(eye);
    } else {
        s.release(eye);
    }
    if let Some(normal) = normal {
        s.consume(Feature::TransformNormals);
        s.carried.eye_normal = Some(normal);
    }
    Ok(())
}
