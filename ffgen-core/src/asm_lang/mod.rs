//! The instruction vocabulary shared by every stage of code generation.
//!
//! Passes build [`Instruction`]s over [`Operand`]s that still refer to allocator registers; the
//! encoder lowers them to [`HwInstruction`]s whose operands carry final register numbers.

mod instruction;
mod operand;

pub use instruction::*;
pub use operand::*;

use std::fmt;

/// Which half of a paired fused multiply-accumulate an EFO instruction performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EfoMode {
    /// `i = a.xy . b.xy`
    Seed,
    /// `dst = i + a.zw . b.zw`
    Finish,
    /// Finish, then seed the same internal register from a second pair of sources.
    FinishReseed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    Add,
    Mul,
    Mad,
    Dp3,
    Dp4,
    /// Repeated three wide vector dot product, one destination word per matrix row.
    Vdp3,
    Vdp4,
    Rsq,
    Rcp,
    /// Base two exponent.
    Exp,
    /// Base two logarithm.
    Log,
    Max,
    Min,
    Frc,
    Flr,
    Efo(EfoMode),
    /// Sets a predicate from comparing a source with zero.
    Test,
    F2i,
    Iadd,
    /// Integer multiply-add.
    Imae,
    Shl,
    Ld,
    /// Load that post-increments its address register.
    LdInc,
    St,
    StInc,
    /// Wait for a data-ready channel.
    Wdf,
    /// Turns destination auto-increment of repeated instructions on (`#1`) or off (`#0`).
    IncrementMode,
    Br,
    Label,
    Nop,
    End,
    Comment,
    Block,
}

impl Opcode {
    /// Annotations have no semantic effect and are never encoded.
    pub fn is_annotation(self) -> bool {
        matches!(self, Opcode::Comment | Opcode::Block)
    }

    /// Operations that apply to each word of the destination in turn.
    pub fn is_componentwise(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Mov | Add | Mul | Mad | Rsq | Rcp | Exp | Log | Max | Min | Frc | Flr | F2i
        )
    }

    /// Instructions on which the no-reschedule flag can be set.
    pub fn accepts_no_sched(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Mov | Add
                | Mul
                | Mad
                | Dp3
                | Dp4
                | Vdp3
                | Vdp4
                | Rsq
                | Rcp
                | Exp
                | Log
                | Max
                | Min
                | Frc
                | Flr
                | Efo(_)
                | Nop
        )
    }

    /// Instructions after which the hardware always deschedules the thread.
    pub fn forces_deschedule(self) -> bool {
        matches!(self, Opcode::Label | Opcode::Br | Opcode::Wdf)
    }

    /// Operations whose first source must be a temporary or a primary attribute.
    pub fn requires_temp_src0(self) -> bool {
        matches!(self, Opcode::Mad | Opcode::Mul | Opcode::Add)
    }

    /// Whether operand 0 is written rather than read.
    pub fn has_destination(self) -> bool {
        use Opcode::*;
        !matches!(
            self,
            St | StInc | Wdf | IncrementMode | Br | Label | Nop | End | Comment | Block | Efo(EfoMode::Seed)
        )
    }

    /// Eight bit opcode of the reference encoding.
    pub fn code(self) -> u32 {
        use Opcode::*;
        match self {
            Mov => 0x01,
            Add => 0x02,
            Mul => 0x03,
            Mad => 0x04,
            Dp3 => 0x05,
            Dp4 => 0x06,
            Vdp3 => 0x07,
            Vdp4 => 0x08,
            Rsq => 0x09,
            Rcp => 0x0a,
            Exp => 0x0b,
            Log => 0x0c,
            Max => 0x0d,
            Min => 0x0e,
            Frc => 0x0f,
            Flr => 0x10,
            Efo(EfoMode::Seed) => 0x11,
            Efo(EfoMode::Finish) => 0x12,
            Efo(EfoMode::FinishReseed) => 0x13,
            Test => 0x14,
            F2i => 0x15,
            Iadd => 0x16,
            Imae => 0x17,
            Shl => 0x18,
            Ld => 0x19,
            LdInc => 0x1a,
            St => 0x1b,
            StInc => 0x1c,
            Wdf => 0x1d,
            Br => 0x1e,
            Label => 0x1f,
            Nop => 0x20,
            End => 0x21,
            IncrementMode => 0x22,
            Comment | Block => 0x00,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Opcode::*;
        let name = match self {
            Mov => "mov",
            Add => "add",
            Mul => "mul",
            Mad => "mad",
            Dp3 => "dp3",
            Dp4 => "dp4",
            Vdp3 => "vdp3",
            Vdp4 => "vdp4",
            Rsq => "rsq",
            Rcp => "rcp",
            Exp => "exp",
            Log => "log",
            Max => "max",
            Min => "min",
            Frc => "frc",
            Flr => "flr",
            Efo(EfoMode::Seed) => "efo.seed",
            Efo(EfoMode::Finish) => "efo.fin",
            Efo(EfoMode::FinishReseed) => "efo.finseed",
            Test => "test",
            F2i => "f2i",
            Iadd => "iadd",
            Imae => "imae",
            Shl => "shl",
            Ld => "ld",
            LdInc => "ldinc",
            St => "st",
            StInc => "stinc",
            Wdf => "wdf",
            IncrementMode => "incmode",
            Br => "br",
            Label => "label",
            Nop => "nop",
            End => "end",
            Comment => "comment",
            Block => "block",
        };
        write!(f, "{name}")
    }
}

/// Comparison of a test instruction's source against zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TestCondition {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl TestCondition {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn inverse(self) -> TestCondition {
        use TestCondition::*;
        match self {
            Gt => Le,
            Ge => Lt,
            Lt => Ge,
            Le => Gt,
            Eq => Ne,
            Ne => Eq,
        }
    }
}

/// Instruction predication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub reg: u8,
    pub negate: bool,
}

impl Predicate {
    pub fn new(reg: u8) -> Self {
        Predicate { reg, negate: false }
    }

    pub fn negated(self) -> Self {
        Predicate {
            negate: !self.negate,
            ..self
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "!p{}", self.reg)
        } else {
            write!(f, "p{}", self.reg)
        }
    }
}

/// Scheduling flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstFlags {
    /// The scheduler must not switch threads between this instruction and the next.
    pub no_sched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efo_can_be_pinned_but_branches_cannot() {
        assert!(Opcode::Efo(EfoMode::Seed).accepts_no_sched());
        assert!(Opcode::Nop.accepts_no_sched());
        assert!(!Opcode::Br.accepts_no_sched());
        assert!(!Opcode::Ld.accepts_no_sched());
        assert!(Opcode::Wdf.forces_deschedule());
        assert!(Opcode::Comment.is_annotation());
    }

    #[test]
    fn opcode_codes_are_unique() {
        use std::collections::BTreeSet;
        let all = [
            Opcode::Mov,
            Opcode::Add,
            Opcode::Mul,
            Opcode::Mad,
            Opcode::Dp3,
            Opcode::Dp4,
            Opcode::Vdp3,
            Opcode::Vdp4,
            Opcode::Rsq,
            Opcode::Rcp,
            Opcode::Exp,
            Opcode::Log,
            Opcode::Max,
            Opcode::Min,
            Opcode::Frc,
            Opcode::Flr,
            Opcode::Efo(EfoMode::Seed),
            Opcode::Efo(EfoMode::Finish),
            Opcode::Efo(EfoMode::FinishReseed),
            Opcode::Test,
            Opcode::F2i,
            Opcode::Iadd,
            Opcode::Imae,
            Opcode::Shl,
            Opcode::Ld,
            Opcode::LdInc,
            Opcode::St,
            Opcode::StInc,
            Opcode::Wdf,
            Opcode::IncrementMode,
            Opcode::Br,
            Opcode::Label,
            Opcode::Nop,
            Opcode::End,
        ];
        let codes = all.iter().map(|op| op.code()).collect::<BTreeSet<_>>();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
    }
}
