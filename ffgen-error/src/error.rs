use ffgen_types::{BindingTag, DescriptorError, Feature};
use thiserror::Error;

/// A condition that stops generation of the current program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid pipeline descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Zero sized allocation requested for {binding}.")]
    ZeroSizeAllocation { binding: BindingTag },
    #[error(
        "{binding} was allocated with {existing} words and re-acquired with {requested} words \
         at offset {offset}."
    )]
    BindingSizeMismatch {
        binding: BindingTag,
        existing: u32,
        offset: u32,
        requested: u32,
    },
    #[error("Immediate offset {value} is out of range, at most {limit} can be encoded.")]
    ImmediateOutOfRange { value: i64, limit: u32 },
    #[error(
        "Secondary attributes exhausted: {binding} needs {requested} words, {available} are left."
    )]
    SecondaryAttributesExhausted {
        binding: BindingTag,
        requested: u32,
        available: u32,
    },
    #[error("Temporaries exhausted: {requested} more words requested above {in_use}, limit is {limit}.")]
    TemporariesExhausted {
        requested: u32,
        in_use: u32,
        limit: u32,
    },
    #[error("Indexable secondary window cannot hold {binding} ({requested} words).")]
    IndexableWindowExhausted { binding: BindingTag, requested: u32 },
    #[error("{binding} must be resolved through an index register but none was given.")]
    MissingIndex { binding: BindingTag },

    #[error("Predicated blocks nested deeper than {max}.")]
    BranchNestingTooDeep { max: usize },
    #[error("\"{what}\" without a matching open predicated block.")]
    UnbalancedBranch { what: &'static str },
    #[error("Predicated blocks left open at the end of generation.")]
    UnterminatedBranch,
    #[error("Label table is full ({limit} labels).")]
    LabelTableFull { limit: usize },
    #[error("Label {label} was referenced but never placed.")]
    UndefinedLabel { label: u32 },

    #[error("Enable bits not consumed by any pass: {}.", features.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", "))]
    UnconsumedFeatures { features: Vec<Feature> },

    #[error("Opcode {opcode} has no portable equivalent.")]
    UnsupportedUniflexOpcode { opcode: String },
    #[error("Invalid operand for {opcode}: {reason}.")]
    InvalidOperand { opcode: String, reason: &'static str },
    #[error("Assembler failed: {0}")]
    Assembler(String),

    #[error("Internal compiler error: {0}")]
    Internal(&'static str),
}
