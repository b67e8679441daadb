use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

use std::{collections::BTreeSet, fmt};

/// The two raw enable words a pipeline state is traditionally packed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum EnableWord {
    Enables1,
    Enables2,
}

/// A single fixed-function enable.
///
/// Every feature has a fixed position in one of the two enable words, see
/// [`Feature::enable_bit`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Feature {
    /* Enables1: transform, normals, clip, colour, fog, point size, texturing. */
    StandardTransformation,
    VertexBlending,
    MatrixPaletteBlending,
    OutputRedirection,
    TransformNormals,
    NormaliseNormals,
    RescaleNormals,
    EyePosition,
    EyeVector,
    Clipping,
    PassthroughColour0,
    PassthroughColour1,
    Fog,
    FogCoordAttribute,
    FogCoordEyeZ,
    FogCoordRadial,
    FogLinear,
    FogExp,
    FogExp2,
    PointSize,
    VertexPointSize,
    PointAttenuation,
    Texturing,

    /* Enables2: lighting. */
    Lighting,
    TwoSidedLighting,
    SeparateSpecular,
    LocalViewer,
    ColourMaterialAmbient,
    ColourMaterialDiffuse,
    ColourMaterialSpecular,
    ColourMaterialEmission,
}

/// Sets of features of which at most one may be enabled at a time.
const EXCLUSIVE_GROUPS: &[&[Feature]] = &[
    &[
        Feature::StandardTransformation,
        Feature::VertexBlending,
        Feature::MatrixPaletteBlending,
    ],
    &[
        Feature::FogCoordAttribute,
        Feature::FogCoordEyeZ,
        Feature::FogCoordRadial,
    ],
    &[Feature::FogLinear, Feature::FogExp, Feature::FogExp2],
    &[Feature::Lighting, Feature::PassthroughColour0],
];

impl Feature {
    /// The word and bit index this feature occupies in the raw enable bitmasks.
    pub fn enable_bit(self) -> (EnableWord, u32) {
        use Feature::*;
        match self {
            StandardTransformation => (EnableWord::Enables1, 0),
            VertexBlending => (EnableWord::Enables1, 1),
            MatrixPaletteBlending => (EnableWord::Enables1, 2),
            OutputRedirection => (EnableWord::Enables1, 3),
            TransformNormals => (EnableWord::Enables1, 4),
            NormaliseNormals => (EnableWord::Enables1, 5),
            RescaleNormals => (EnableWord::Enables1, 6),
            EyePosition => (EnableWord::Enables1, 7),
            EyeVector => (EnableWord::Enables1, 8),
            Clipping => (EnableWord::Enables1, 9),
            PassthroughColour0 => (EnableWord::Enables1, 10),
            PassthroughColour1 => (EnableWord::Enables1, 11),
            Fog => (EnableWord::Enables1, 12),
            FogCoordAttribute => (EnableWord::Enables1, 13),
            FogCoordEyeZ => (EnableWord::Enables1, 14),
            FogCoordRadial => (EnableWord::Enables1, 15),
            FogLinear => (EnableWord::Enables1, 16),
            FogExp => (EnableWord::Enables1, 17),
            FogExp2 => (EnableWord::Enables1, 18),
            PointSize => (EnableWord::Enables1, 19),
            VertexPointSize => (EnableWord::Enables1, 20),
            PointAttenuation => (EnableWord::Enables1, 21),
            Texturing => (EnableWord::Enables1, 22),

            Lighting => (EnableWord::Enables2, 0),
            TwoSidedLighting => (EnableWord::Enables2, 1),
            SeparateSpecular => (EnableWord::Enables2, 2),
            LocalViewer => (EnableWord::Enables2, 3),
            ColourMaterialAmbient => (EnableWord::Enables2, 4),
            ColourMaterialDiffuse => (EnableWord::Enables2, 5),
            ColourMaterialSpecular => (EnableWord::Enables2, 6),
            ColourMaterialEmission => (EnableWord::Enables2, 7),
        }
    }

    /// The mask of this feature within its enable word.
    pub fn mask(self) -> u32 {
        1 << self.enable_bit().1
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown bits {bits:#010x} set in {word}.")]
pub struct UnknownEnableBits {
    pub word: EnableWord,
    pub bits: u32,
}

/// A set of enabled features.
///
/// The code generator works on a private copy of the descriptor's features and removes each
/// feature as the pass responsible for it handles it, so an empty set at the end of generation
/// proves that every enabled feature was looked at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(BTreeSet<Feature>);

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style insertion.
    pub fn with(mut self, feature: Feature) -> Self {
        self.0.insert(feature);
        self
    }

    pub fn insert(&mut self, feature: Feature) -> bool {
        self.0.insert(feature)
    }

    /// Removes `feature`, returning whether it was enabled.
    pub fn remove(&mut self, feature: Feature) -> bool {
        self.0.remove(&feature)
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    pub fn contains_any(&self, features: &[Feature]) -> bool {
        features.iter().any(|f| self.contains(*f))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.iter().copied()
    }

    /// Decodes the raw `Enables1`/`Enables2` bitmasks.
    pub fn from_enables(enables1: u32, enables2: u32) -> Result<Features, UnknownEnableBits> {
        let mut features = Features::new();
        let mut known1 = 0;
        let mut known2 = 0;
        for feature in Feature::iter() {
            let (word, bit) = feature.enable_bit();
            let (enables, known) = match word {
                EnableWord::Enables1 => (enables1, &mut known1),
                EnableWord::Enables2 => (enables2, &mut known2),
            };
            *known |= 1 << bit;
            if enables & (1 << bit) != 0 {
                features.insert(feature);
            }
        }
        if enables1 & !known1 != 0 {
            return Err(UnknownEnableBits {
                word: EnableWord::Enables1,
                bits: enables1 & !known1,
            });
        }
        if enables2 & !known2 != 0 {
            return Err(UnknownEnableBits {
                word: EnableWord::Enables2,
                bits: enables2 & !known2,
            });
        }
        Ok(features)
    }

    /// Packs the set back into `(Enables1, Enables2)`.
    pub fn to_enables(&self) -> (u32, u32) {
        self.iter().fold((0, 0), |(e1, e2), feature| match feature.enable_bit() {
            (EnableWord::Enables1, bit) => (e1 | (1 << bit), e2),
            (EnableWord::Enables2, bit) => (e1, e2 | (1 << bit)),
        })
    }

    /// Returns the first pair of enabled features that must not be enabled together.
    pub fn first_conflict(&self) -> Option<(Feature, Feature)> {
        EXCLUSIVE_GROUPS.iter().find_map(|group| {
            let mut enabled = group.iter().filter(|f| self.contains(**f));
            match (enabled.next(), enabled.next()) {
                (Some(first), Some(second)) => Some((*first, *second)),
                _ => None,
            }
        })
    }
}

impl FromIterator<Feature> for Features {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Features(iter.into_iter().collect())
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(|f| f.to_string()).collect::<Vec<_>>();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_bits_are_unique() {
        let mut seen = BTreeSet::new();
        for feature in Feature::iter() {
            assert!(
                seen.insert(feature.enable_bit()),
                "{feature} shares its enable bit with another feature"
            );
        }
    }

    #[test]
    fn decodes_raw_enables() {
        let e1 = Feature::StandardTransformation.mask() | Feature::Fog.mask();
        let e2 = Feature::Lighting.mask();
        let features = Features::from_enables(e1, e2).unwrap();
        assert!(features.contains(Feature::StandardTransformation));
        assert!(features.contains(Feature::Fog));
        assert!(features.contains(Feature::Lighting));
        assert_eq!(features.len(), 3);
        assert_eq!(features.to_enables(), (e1, e2));
    }

    #[test]
    fn rejects_unknown_bits() {
        let err = Features::from_enables(1 << 31, 0).unwrap_err();
        assert_eq!(err.word, EnableWord::Enables1);
        assert_eq!(err.bits, 1 << 31);

        let err = Features::from_enables(0, 1 << 20).unwrap_err();
        assert_eq!(err.word, EnableWord::Enables2);
    }

    #[test]
    fn finds_exclusive_conflicts() {
        let features = Features::new()
            .with(Feature::VertexBlending)
            .with(Feature::MatrixPaletteBlending);
        assert_eq!(
            features.first_conflict(),
            Some((Feature::VertexBlending, Feature::MatrixPaletteBlending))
        );

        let features = Features::new()
            .with(Feature::StandardTransformation)
            .with(Feature::FogExp);
        assert_eq!(features.first_conflict(), None);
    }

    #[test]
    fn serializes_as_feature_names() {
        let features = Features::new().with(Feature::Fog).with(Feature::FogLinear);
        let json = serde_json::to_string(&features).unwrap();
        assert_eq!(json, r#"["Fog","FogLinear"]"#);
        let back: Features = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);
    }
}
