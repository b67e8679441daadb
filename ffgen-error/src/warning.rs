use core::fmt;

/// Malformed-descriptor conditions that skip part of a pass without stopping generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    EmptyClipPlaneMask,
    EmptyTexturingMask,
    MissingFogCoordinateSource,
    LightingWithoutLights,
    BlendingWithoutUnits,
    TextureUnitWithoutCoordinates { unit: u8 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Warning::*;
        match self {
            EmptyClipPlaneMask => write!(
                f,
                "Clipping is enabled but no clip plane is. No clip distances are generated."
            ),
            EmptyTexturingMask => write!(
                f,
                "Texturing is enabled but no texture unit generates coordinates. \
                 No texture coordinates are generated."
            ),
            MissingFogCoordinateSource => write!(
                f,
                "Fog is enabled without a fog coordinate source. No fog coordinate is generated."
            ),
            LightingWithoutLights => write!(
                f,
                "Lighting is enabled but no light is. Only the scene colour is generated."
            ),
            BlendingWithoutUnits => write!(
                f,
                "Vertex blending is enabled with zero blend units. The position is left \
                 untransformed."
            ),
            TextureUnitWithoutCoordinates { unit } => write!(
                f,
                "Texture unit {unit} transforms by its texture matrix but generates no \
                 coordinates."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileWarning {
    /// The pass that noticed the condition.
    pub pass: &'static str,
    pub warning_content: Warning,
}

impl CompileWarning {
    pub fn to_friendly_warning_string(&self) -> String {
        self.warning_content.to_string()
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.pass, self.warning_content)
    }
}
