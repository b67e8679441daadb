use ffgen_types::{Capabilities, Target};
use serde::{Deserialize, Serialize};

/// How instructions get from the passes to their final encoding.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::EnumString,
    strum::Display,
)]
pub enum CodegenMode {
    /// Lower every instruction as soon as it is emitted.
    #[default]
    #[serde(rename = "one-pass")]
    #[clap(name = "one-pass")]
    #[strum(serialize = "one-pass")]
    OnePass,
    /// Store every instruction and replay the list once register placement is final.
    #[serde(rename = "two-pass")]
    #[clap(name = "two-pass")]
    #[strum(serialize = "two-pass")]
    TwoPass,
}

/// The form of the generated program.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::EnumString,
    strum::Display,
)]
pub enum OutputKind {
    /// Hardware instructions handed to an [`Assembler`](crate::asm_generation::Assembler).
    #[default]
    #[serde(rename = "hardware")]
    #[clap(name = "hardware")]
    #[strum(serialize = "hardware")]
    Hardware,
    /// Portable instructions for a downstream shader compiler.
    #[serde(rename = "uniflex")]
    #[clap(name = "uniflex")]
    #[strum(serialize = "uniflex")]
    Uniflex,
}

/// Configuration for generating one program.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub(crate) target: Target,
    pub(crate) capabilities: Capabilities,
    pub(crate) codegen: CodegenMode,
    pub(crate) output: OutputKind,
    pub(crate) print_intermediate_asm: bool,
    pub(crate) print_finalized_asm: bool,
    pub(crate) verify_feature_coverage: bool,
}

impl BuildConfig {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            capabilities: Capabilities::for_target(target),
            codegen: CodegenMode::default(),
            output: match target {
                Target::Uniflex => OutputKind::Uniflex,
                _ => OutputKind::Hardware,
            },
            print_intermediate_asm: false,
            print_finalized_asm: false,
            verify_feature_coverage: cfg!(debug_assertions),
        }
    }

    pub fn codegen(self, codegen: CodegenMode) -> Self {
        Self { codegen, ..self }
    }

    pub fn output(self, output: OutputKind) -> Self {
        Self { output, ..self }
    }

    /// Replaces the capability table of the target.
    pub fn capabilities(self, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..self
        }
    }

    pub fn print_intermediate_asm(self, a: bool) -> Self {
        Self {
            print_intermediate_asm: a,
            ..self
        }
    }

    pub fn print_finalized_asm(self, a: bool) -> Self {
        Self {
            print_finalized_asm: a,
            ..self
        }
    }

    /// Whether generation fails when a pass leaves an enabled feature unhandled.
    ///
    /// Default: on in debug builds.
    pub fn verify_feature_coverage(self, verify_feature_coverage: bool) -> Self {
        Self {
            verify_feature_coverage,
            ..self
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn caps(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn codegen_mode(&self) -> CodegenMode {
        self.codegen
    }

    pub fn output_kind(&self) -> OutputKind {
        self.output
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig::new(Target::default())
    }
}
