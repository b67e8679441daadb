use crate::features::{Feature, Features, UnknownEnableBits};

use serde::{Deserialize, Serialize};
use strum::EnumIter;
use thiserror::Error;

use std::fmt;

pub const MAX_TEXTURE_UNITS: usize = 8;
pub const MAX_LIGHTS: u8 = 8;
pub const MAX_BLEND_UNITS: u8 = 4;
pub const MAX_CLIP_PLANES: u8 = 6;
pub const MAX_PALETTE_ENTRIES: u8 = 32;

/// A mask over the four texture coordinate components S, T, R and Q.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordMask(u8);

impl CoordMask {
    pub const NONE: CoordMask = CoordMask(0);
    pub const S: CoordMask = CoordMask(0b0001);
    pub const T: CoordMask = CoordMask(0b0010);
    pub const R: CoordMask = CoordMask(0b0100);
    pub const Q: CoordMask = CoordMask(0b1000);
    pub const ST: CoordMask = CoordMask(0b0011);
    pub const STR: CoordMask = CoordMask(0b0111);
    pub const STRQ: CoordMask = CoordMask(0b1111);

    pub fn new(bits: u8) -> Self {
        CoordMask(bits & 0xf)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, component: u32) -> bool {
        component < 4 && self.0 & (1 << component) != 0
    }

    pub fn union(self, other: CoordMask) -> CoordMask {
        CoordMask(self.0 | other.0)
    }

    pub fn intersect(self, other: CoordMask) -> CoordMask {
        CoordMask(self.0 & other.0)
    }

    /// Enabled components in ascending order.
    pub fn components(self) -> impl Iterator<Item = u32> {
        (0..4).filter(move |c| self.contains(*c))
    }

    /// Number of coordinate words needed to hold the highest enabled component.
    pub fn dimension(self) -> u32 {
        8 - self.0.leading_zeros()
    }

    /// Maximal runs of consecutive enabled components as `(first, count)`.
    pub fn runs(self) -> Vec<(u32, u32)> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for component in self.components() {
            match runs.last_mut() {
                Some((first, count)) if *first + *count == component => *count += 1,
                _ => runs.push((component, 1)),
            }
        }
        runs
    }
}

impl fmt::Display for CoordMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, name) in ['s', 't', 'r', 'q'].iter().enumerate() {
            if self.contains(c as u32) {
                write!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

/// Texture coordinate generation enabled for one texture unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureUnitGen {
    /// Components copied from the unit's texture coordinate attribute.
    pub passthrough: CoordMask,
    pub eye_linear: CoordMask,
    pub object_linear: CoordMask,
    pub sphere_map: CoordMask,
    pub normal_map: CoordMask,
    pub position_map: CoordMask,
    pub reflection_map: CoordMask,
    /// Transform the generated coordinates by the unit's texture matrix.
    pub texture_matrix: bool,
}

impl TextureUnitGen {
    /// Union of every generation mode enabled on the unit.
    pub fn generated(&self) -> CoordMask {
        self.passthrough
            .union(self.eye_linear)
            .union(self.object_linear)
            .union(self.sphere_map)
            .union(self.normal_map)
            .union(self.position_map)
            .union(self.reflection_map)
    }

    pub fn is_enabled(&self) -> bool {
        !self.generated().is_empty()
    }

    /// Output dimension of the unit.
    pub fn dimension(&self) -> u32 {
        self.generated().dimension()
    }

    /// Coordinates that come from something other than the texture coordinate attribute.
    pub fn computed(&self) -> CoordMask {
        self.eye_linear
            .union(self.object_linear)
            .union(self.sphere_map)
            .union(self.normal_map)
            .union(self.position_map)
            .union(self.reflection_map)
    }

    pub fn needs_eye_position(&self) -> bool {
        !self.eye_linear.is_empty() || !self.position_map.is_empty() || self.needs_reflection()
    }

    pub fn needs_normal(&self) -> bool {
        !self.normal_map.is_empty() || self.needs_reflection()
    }

    pub fn needs_reflection(&self) -> bool {
        !self.sphere_map.is_empty() || !self.reflection_map.is_empty()
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, strum::Display,
)]
pub enum LightKind {
    InfinitePoint,
    LocalPoint,
    InfiniteSpot,
    LocalSpot,
}

impl LightKind {
    pub fn is_local(self) -> bool {
        matches!(self, LightKind::LocalPoint | LightKind::LocalSpot)
    }

    pub fn is_spot(self) -> bool {
        matches!(self, LightKind::InfiniteSpot | LightKind::LocalSpot)
    }
}

/// Per-light enables. Bit `n` of each mask refers to light `n`; a light may be of at most one
/// kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LightMasks {
    pub infinite_point: u8,
    pub local_point: u8,
    pub infinite_spot: u8,
    pub local_spot: u8,
    /// Lights contributing a specular term.
    pub specular: u8,
}

/// One enabled light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnabledLight {
    pub index: u8,
    pub kind: LightKind,
    pub specular: bool,
}

impl LightMasks {
    fn kind_masks(&self) -> [(LightKind, u8); 4] {
        [
            (LightKind::InfinitePoint, self.infinite_point),
            (LightKind::LocalPoint, self.local_point),
            (LightKind::InfiniteSpot, self.infinite_spot),
            (LightKind::LocalSpot, self.local_spot),
        ]
    }

    pub fn any_enabled(&self) -> bool {
        self.infinite_point | self.local_point | self.infinite_spot | self.local_spot != 0
    }

    /// Enabled lights in ascending index order.
    pub fn enabled(&self) -> Vec<EnabledLight> {
        (0..MAX_LIGHTS)
            .filter_map(|index| {
                self.kind_masks()
                    .iter()
                    .find(|(_, mask)| mask & (1 << index) != 0)
                    .map(|(kind, _)| EnabledLight {
                        index,
                        kind: *kind,
                        specular: self.specular & (1 << index) != 0,
                    })
            })
            .collect()
    }

    /// The first light enabled as more than one kind.
    pub fn first_conflict(&self) -> Option<u8> {
        (0..MAX_LIGHTS).find(|index| {
            self.kind_masks()
                .iter()
                .filter(|(_, mask)| mask & (1 << index) != 0)
                .count()
                > 1
        })
    }

    /// A local viewer needs the normalised vertex-to-eye vector for every specular light.
    pub fn needs_eye_vector(&self, local_viewer: bool) -> bool {
        local_viewer && self.enabled().iter().any(|light| light.specular)
    }
}

/// Secondary attributes the program may use for constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecondaryBudget {
    /// First secondary attribute available to the program.
    pub start: u32,
    /// One past the last available secondary attribute.
    pub end: u32,
    /// Secondary attribute holding the base address of the memory-constant buffer.
    pub base_address: u32,
}

impl Default for SecondaryBudget {
    fn default() -> Self {
        SecondaryBudget {
            start: 4,
            end: 128,
            base_address: 0,
        }
    }
}

impl SecondaryBudget {
    pub fn size(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Features {first} and {second} are mutually exclusive.")]
    MutuallyExclusive { first: Feature, second: Feature },
    #[error("Light {light} is enabled as more than one kind of light.")]
    ConflictingLightKinds { light: u8 },
    #[error("{count} texture units configured, at most {MAX_TEXTURE_UNITS} are supported.")]
    TooManyTextureUnits { count: usize },
    #[error("{count} blend units configured, at most {MAX_BLEND_UNITS} are supported.")]
    TooManyBlendUnits { count: u8 },
    #[error("Matrix palette of {entries} entries, between 1 and {MAX_PALETTE_ENTRIES} are supported.")]
    InvalidPaletteSize { entries: u8 },
    #[error("Clip plane mask {mask:#04x} selects planes beyond the {MAX_CLIP_PLANES} supported.")]
    InvalidClipPlanes { mask: u8 },
    #[error("Secondary attribute budget {start}..{end} is empty or contains the base address register {base_address}.")]
    InvalidSecondaryBudget {
        start: u32,
        end: u32,
        base_address: u32,
    },
    #[error("{0}")]
    UnknownEnableBits(#[from] UnknownEnableBits),
}

/// An immutable description of one fixed-function T&L pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDescriptor {
    pub features: Features,
    pub texture_units: Vec<TextureUnitGen>,
    pub lights: LightMasks,
    /// Number of vertex blend or matrix palette units.
    pub blend_units: u8,
    /// Number of entries in the matrix palette.
    pub matrix_palette_size: u8,
    /// Enabled user clip planes, bit `n` for plane `n`.
    pub clip_planes: u8,
    pub secondary: SecondaryBudget,
}

impl PipelineDescriptor {
    pub fn new(features: Features) -> Self {
        PipelineDescriptor {
            features,
            ..Default::default()
        }
    }

    /// Builds a descriptor from the raw enable words.
    pub fn from_enables(enables1: u32, enables2: u32) -> Result<Self, DescriptorError> {
        Ok(Self::new(Features::from_enables(enables1, enables2)?))
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn with_texture_unit(mut self, unit: usize, gen: TextureUnitGen) -> Self {
        if self.texture_units.len() <= unit {
            self.texture_units.resize(unit + 1, TextureUnitGen::default());
        }
        self.texture_units[unit] = gen;
        self
    }

    pub fn with_light(mut self, index: u8, kind: LightKind, specular: bool) -> Self {
        let bit = 1 << index;
        let mask = match kind {
            LightKind::InfinitePoint => &mut self.lights.infinite_point,
            LightKind::LocalPoint => &mut self.lights.local_point,
            LightKind::InfiniteSpot => &mut self.lights.infinite_spot,
            LightKind::LocalSpot => &mut self.lights.local_spot,
        };
        *mask |= bit;
        if specular {
            self.lights.specular |= bit;
        } else {
            self.lights.specular &= !bit;
        }
        self
    }

    pub fn with_blend_units(mut self, units: u8) -> Self {
        self.blend_units = units;
        self
    }

    pub fn with_matrix_palette(mut self, entries: u8) -> Self {
        self.matrix_palette_size = entries;
        self
    }

    pub fn with_clip_planes(mut self, mask: u8) -> Self {
        self.clip_planes = mask;
        self
    }

    pub fn with_secondary_budget(mut self, budget: SecondaryBudget) -> Self {
        self.secondary = budget;
        self
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    /// Texture units that generate at least one coordinate.
    pub fn enabled_texture_units(&self) -> impl Iterator<Item = (u8, &TextureUnitGen)> {
        self.texture_units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.is_enabled())
            .map(|(index, unit)| (index as u8, unit))
    }

    /// Enables the eye-space quantities other enabled features depend on.
    pub fn with_derived_requirements(mut self) -> Self {
        let has = |f: Feature| self.features.contains(f);
        let texturing = has(Feature::Texturing);
        let lighting = has(Feature::Lighting) && self.lights.any_enabled();

        let reflection = texturing
            && self
                .texture_units
                .iter()
                .any(|unit| unit.needs_reflection());
        let eye_vector = reflection
            || (lighting && self.lights.needs_eye_vector(has(Feature::LocalViewer)));
        let normal = lighting
            || (texturing && self.texture_units.iter().any(|unit| unit.needs_normal()));
        let eye_position = eye_vector
            || has(Feature::EyeVector)
            || lighting
            || (has(Feature::Clipping) && self.clip_planes != 0)
            || (has(Feature::Fog)
                && self
                    .features
                    .contains_any(&[Feature::FogCoordEyeZ, Feature::FogCoordRadial]))
            || (has(Feature::PointSize) && has(Feature::PointAttenuation))
            || (texturing
                && self
                    .texture_units
                    .iter()
                    .any(|unit| unit.needs_eye_position()));

        if eye_vector {
            self.features.insert(Feature::EyeVector);
        }
        if normal {
            self.features.insert(Feature::TransformNormals);
        }
        if eye_position {
            self.features.insert(Feature::EyePosition);
        }
        self
    }

    /// Checks the invariants every pass relies on.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if let Some((first, second)) = self.features.first_conflict() {
            return Err(DescriptorError::MutuallyExclusive { first, second });
        }
        if let Some(light) = self.lights.first_conflict() {
            return Err(DescriptorError::ConflictingLightKinds { light });
        }
        if self.texture_units.len() > MAX_TEXTURE_UNITS {
            return Err(DescriptorError::TooManyTextureUnits {
                count: self.texture_units.len(),
            });
        }
        if self.blend_units > MAX_BLEND_UNITS {
            return Err(DescriptorError::TooManyBlendUnits {
                count: self.blend_units,
            });
        }
        if self.has(Feature::MatrixPaletteBlending)
            && (self.matrix_palette_size == 0 || self.matrix_palette_size > MAX_PALETTE_ENTRIES)
        {
            return Err(DescriptorError::InvalidPaletteSize {
                entries: self.matrix_palette_size,
            });
        }
        if self.clip_planes >> MAX_CLIP_PLANES != 0 {
            return Err(DescriptorError::InvalidClipPlanes {
                mask: self.clip_planes,
            });
        }
        let budget = &self.secondary;
        if budget.start >= budget.end
            || (budget.start..budget.end).contains(&budget.base_address)
        {
            return Err(DescriptorError::InvalidSecondaryBudget {
                start: budget.start,
                end: budget.end,
                base_address: budget.base_address,
            });
        }
        Ok(())
    }
}
