//! Output layout.
//!
//! Every output the program writes is assigned before anything is emitted, so the layout the
//! host binds against depends only on the descriptor and not on the order the passes write.

use crate::{register_allocation::RegisterSpace, session::CompilationSession};

use ffgen_error::error::CompileError;
use ffgen_types::{BindingTag, Feature, MAX_CLIP_PLANES};

/// Fog is only written when it has a coordinate source.
const FOG_SOURCES: [Feature; 3] = [
    Feature::FogCoordAttribute,
    Feature::FogCoordEyeZ,
    Feature::FogCoordRadial,
];

impl CompilationSession<'_> {
    fn assign_output(&mut self, binding: BindingTag, size: u32) -> Result<(), CompileError> {
        let reg = self.get_or_alloc(RegisterSpace::Output, binding, 0, size, None)?;
        tracing::trace!("{binding} -> {reg}");
        Ok(())
    }
}

pub(super) fn assign_output_registers(s: &mut CompilationSession) -> Result<(), CompileError> {
    let desc = s.desc;

    s.assign_output(BindingTag::OutputPosition, 4)?;

    let lighting = s.has(Feature::Lighting);
    let specular_colour = lighting && s.has(Feature::SeparateSpecular);
    if lighting || s.has(Feature::PassthroughColour0) {
        s.assign_output(BindingTag::OutputFrontColour0, 4)?;
    }
    if specular_colour || s.has(Feature::PassthroughColour1) {
        s.assign_output(BindingTag::OutputFrontColour1, 4)?;
    }
    if lighting && s.has(Feature::TwoSidedLighting) {
        s.assign_output(BindingTag::OutputBackColour0, 4)?;
        if specular_colour {
            s.assign_output(BindingTag::OutputBackColour1, 4)?;
        }
    }

    if s.has(Feature::Fog) && desc.features.contains_any(&FOG_SOURCES) {
        s.assign_output(BindingTag::OutputFog, 1)?;
    }
    if s.has(Feature::PointSize) {
        s.assign_output(BindingTag::OutputPointSize, 1)?;
    }
    if s.has(Feature::Clipping) {
        for plane in (0..MAX_CLIP_PLANES).filter(|plane| desc.clip_planes & (1 << plane) != 0) {
            s.assign_output(BindingTag::OutputClipDistance(plane), 1)?;
        }
    }
    if s.has(Feature::Texturing) {
        for (unit, gen) in desc.enabled_texture_units() {
            s.assign_output(BindingTag::OutputTexCoord(unit), gen.dimension())?;
        }
    }
    Ok(())
}
