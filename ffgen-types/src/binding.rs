use serde::{Deserialize, Serialize};

use std::fmt;

/// Values the host must place in the [`BindingTag::FixedValues`] block.
pub const FIXED_VALUES: [f32; 8] = [
    0.0,
    1.0,
    0.5,
    2.0,
    -1.0,
    std::f32::consts::LOG2_E,
    0.0,
    0.0,
];

/// Word offsets into [`FIXED_VALUES`].
pub mod fixed {
    pub const ZERO: u32 = 0;
    pub const ONE: u32 = 1;
    pub const HALF: u32 = 2;
    pub const TWO: u32 = 3;
    pub const MINUS_ONE: u32 = 4;
    pub const LOG2_E: u32 = 5;
}

/// Word offsets into a [`BindingTag::LightSource`] block.
pub mod light_source {
    /// xyz position (local lights) or normalised direction towards the light (infinite lights).
    pub const POSITION: u32 = 0;
    /// xyz normalised spot direction, w holds the cosine of the cutoff angle.
    pub const SPOT_DIRECTION: u32 = 4;
    pub const SPOT_COS_CUTOFF: u32 = 7;
    /// Constant, linear and quadratic attenuation followed by the spot exponent.
    pub const ATTENUATION: u32 = 8;
    pub const SPOT_EXPONENT: u32 = 11;
    /// Normalised half vector for infinite lights with an infinite viewer.
    pub const HALF_VECTOR: u32 = 12;
}

/// Word offsets into [`BindingTag::LightProducts`], [`BindingTag::BackLightProducts`] and
/// [`BindingTag::LightColours`] blocks.
pub mod light_terms {
    pub const AMBIENT: u32 = 0;
    pub const DIFFUSE: u32 = 4;
    pub const SPECULAR: u32 = 8;
}

/// Word offsets into [`BindingTag::FrontMaterial`] and [`BindingTag::BackMaterial`].
pub mod material {
    pub const EMISSION: u32 = 0;
    pub const AMBIENT: u32 = 4;
    pub const GLOBAL_AMBIENT: u32 = 8;
    /// Emission plus global ambient times material ambient.
    pub const SCENE_COLOUR: u32 = 12;
    pub const SHININESS: u32 = 16;
    pub const DIFFUSE_ALPHA: u32 = 17;
}

/// Word offsets into [`BindingTag::FogParams`].
pub mod fog {
    pub const END: u32 = 0;
    /// `1 / (end - start)`.
    pub const SCALE: u32 = 1;
    /// `density * log2(e)`.
    pub const EXP_DENSITY: u32 = 2;
    /// `density * sqrt(log2(e))`.
    pub const EXP2_DENSITY: u32 = 3;
}

/// Word offsets into [`BindingTag::PointParams`].
pub mod point {
    pub const SIZE: u32 = 0;
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 2;
    /// Constant, linear and quadratic distance attenuation.
    pub const ATTENUATION: u32 = 4;
}

/// Identifies why a register exists.
///
/// The tag is the key used to find a previously allocated register for the same logical
/// quantity, and it is what the host sees in the register-usage tables of the generated program
/// when it binds real state to the program's inputs, outputs and constants.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BindingTag {
    /// Anonymous scratch temporary.
    Temp,

    /* Vertex inputs (primary attributes). */
    InputPosition,
    InputNormal,
    InputColour0,
    InputColour1,
    InputFogCoord,
    InputPointSize,
    InputBlendWeights,
    InputPaletteIndices,
    InputTexCoord(u8),

    /* Vertex outputs. */
    OutputPosition,
    OutputFrontColour0,
    OutputFrontColour1,
    OutputBackColour0,
    OutputBackColour1,
    OutputFog,
    OutputPointSize,
    OutputClipDistance(u8),
    OutputTexCoord(u8),

    /* Constants. */
    ModelViewProjection,
    ModelView,
    Projection,
    NormalMatrix,
    NormalScale,
    BlendModelView(u8),
    BlendNormalMatrix(u8),
    /// Model-view matrices indexed at runtime, the payload is the number of entries.
    MatrixPalette(u8),
    /// Normal matrices matching [`BindingTag::MatrixPalette`].
    NormalPalette(u8),
    /// Largest valid palette index as a float, used to clamp the per-vertex indices.
    PaletteIndexLimit,
    LightSource(u8),
    LightProducts(u8),
    BackLightProducts(u8),
    LightColours(u8),
    FrontMaterial,
    BackMaterial,
    ClipPlane(u8),
    FogParams,
    PointParams,
    EyePlanes(u8),
    ObjectPlanes(u8),
    TextureMatrix(u8),
    FixedValues,
    RedirectAddress,
    /// The secondary attribute holding the memory-constant base address. Owned by the host.
    MemoryConstantBase,
}

/// Words per matrix palette entry.
pub const PALETTE_MATRIX_STRIDE: u32 = 16;
/// Words per normal palette entry.
pub const PALETTE_NORMAL_STRIDE: u32 = 12;

impl BindingTag {
    pub fn is_input(&self) -> bool {
        use BindingTag::*;
        matches!(
            self,
            InputPosition
                | InputNormal
                | InputColour0
                | InputColour1
                | InputFogCoord
                | InputPointSize
                | InputBlendWeights
                | InputPaletteIndices
                | InputTexCoord(_)
        )
    }

    pub fn is_output(&self) -> bool {
        use BindingTag::*;
        matches!(
            self,
            OutputPosition
                | OutputFrontColour0
                | OutputFrontColour1
                | OutputBackColour0
                | OutputBackColour1
                | OutputFog
                | OutputPointSize
                | OutputClipDistance(_)
                | OutputTexCoord(_)
        )
    }

    pub fn is_constant(&self) -> bool {
        self.constant_size().is_some()
    }

    /// The fixed word size of a constant binding, `None` for non-constant bindings.
    pub fn constant_size(&self) -> Option<u32> {
        use BindingTag::*;
        Some(match self {
            ModelViewProjection | ModelView | Projection => 16,
            NormalMatrix => 12,
            NormalScale => 1,
            BlendModelView(_) => 16,
            BlendNormalMatrix(_) => 12,
            MatrixPalette(entries) => *entries as u32 * PALETTE_MATRIX_STRIDE,
            NormalPalette(entries) => *entries as u32 * PALETTE_NORMAL_STRIDE,
            PaletteIndexLimit => 1,
            LightSource(_) => 16,
            LightProducts(_) | BackLightProducts(_) | LightColours(_) => 12,
            FrontMaterial | BackMaterial => 20,
            ClipPlane(_) => 4,
            FogParams => 4,
            PointParams => 8,
            EyePlanes(_) | ObjectPlanes(_) | TextureMatrix(_) => 16,
            FixedValues => FIXED_VALUES.len() as u32,
            RedirectAddress | MemoryConstantBase => 1,
            _ => return None,
        })
    }

    /// Palettes are the only constants addressed through an index register.
    pub fn is_palette(&self) -> bool {
        matches!(self, BindingTag::MatrixPalette(_) | BindingTag::NormalPalette(_))
    }
}

impl fmt::Display for BindingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BindingTag::*;
        match self {
            InputTexCoord(n) => write!(f, "InputTexCoord{n}"),
            OutputClipDistance(n) => write!(f, "OutputClipDistance{n}"),
            OutputTexCoord(n) => write!(f, "OutputTexCoord{n}"),
            BlendModelView(n) => write!(f, "BlendModelView{n}"),
            BlendNormalMatrix(n) => write!(f, "BlendNormalMatrix{n}"),
            MatrixPalette(n) => write!(f, "MatrixPalette[{n}]"),
            NormalPalette(n) => write!(f, "NormalPalette[{n}]"),
            LightSource(n) => write!(f, "LightSource{n}"),
            LightProducts(n) => write!(f, "LightProducts{n}"),
            BackLightProducts(n) => write!(f, "BackLightProducts{n}"),
            LightColours(n) => write!(f, "LightColours{n}"),
            ClipPlane(n) => write!(f, "ClipPlane{n}"),
            EyePlanes(n) => write!(f, "EyePlanes{n}"),
            ObjectPlanes(n) => write!(f, "ObjectPlanes{n}"),
            TextureMatrix(n) => write!(f, "TextureMatrix{n}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let tags = [
            BindingTag::Temp,
            BindingTag::InputNormal,
            BindingTag::InputTexCoord(3),
            BindingTag::OutputFog,
            BindingTag::OutputTexCoord(1),
            BindingTag::LightSource(2),
            BindingTag::MatrixPalette(9),
            BindingTag::MemoryConstantBase,
        ];
        for tag in tags {
            let kinds = [tag.is_input(), tag.is_output(), tag.is_constant()];
            assert!(kinds.iter().filter(|k| **k).count() <= 1, "{tag}");
        }
        assert!(!BindingTag::Temp.is_constant());
    }

    #[test]
    fn palette_sizes_scale_with_entries() {
        assert_eq!(BindingTag::MatrixPalette(9).constant_size(), Some(144));
        assert_eq!(BindingTag::NormalPalette(9).constant_size(), Some(108));
        assert!(BindingTag::NormalPalette(2).is_palette());
        assert!(!BindingTag::ModelView.is_palette());
    }

    #[test]
    fn block_layouts_fit_their_sizes() {
        assert!(light_source::HALF_VECTOR + 4 <= BindingTag::LightSource(0).constant_size().unwrap());
        assert!(material::DIFFUSE_ALPHA < BindingTag::FrontMaterial.constant_size().unwrap());
        assert!(point::ATTENUATION + 3 <= BindingTag::PointParams.constant_size().unwrap());
        assert_eq!(FIXED_VALUES[fixed::ONE as usize], 1.0);
    }
}
