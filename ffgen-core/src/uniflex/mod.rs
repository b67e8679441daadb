//! The portable instruction form consumed by a downstream shader compiler.
//!
//! Registers are vec4 rows rather than words: a word offset `w` becomes row `w / 4`, component
//! `w % 4`. Sources carry a swizzle and destinations a write mask.

mod lowering;

pub use lowering::to_uniflex;

use crate::{
    asm_lang::{Predicate, TestCondition},
    register_allocation::IndexRegister,
};

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UfOpcode {
    Mov,
    Add,
    Mul,
    Mad,
    Dp3,
    Dp4,
    Rsq,
    Rcp,
    Exp,
    Log,
    Max,
    Min,
    Frc,
    Flr,
    Setp,
    F2i,
    Iadd,
    Imad,
    Shl,
    Ld,
    St,
    Br,
    Label,
    Nop,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UfRegType {
    Temp,
    Const,
    VertexInput,
    VertexOutput,
    Immediate,
    Predicate,
    Label,
    Index,
}

impl UfRegType {
    fn prefix(self) -> &'static str {
        match self {
            UfRegType::Temp => "r",
            UfRegType::Const => "c",
            UfRegType::VertexInput => "v",
            UfRegType::VertexOutput => "o",
            UfRegType::Immediate => "#",
            UfRegType::Predicate => "p",
            UfRegType::Label => "L",
            UfRegType::Index => "a",
        }
    }
}

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

pub const IDENTITY_SWIZZLE: [u8; 4] = [0, 1, 2, 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UfSource {
    pub ty: UfRegType,
    /// Row number, immediate value or label id.
    pub number: u32,
    /// Source component read by each destination component.
    pub swizzle: [u8; 4],
    pub negate: bool,
    pub absolute: bool,
    pub index: Option<IndexRegister>,
}

impl UfSource {
    pub fn immediate(value: u32) -> Self {
        UfSource::plain(UfRegType::Immediate, value)
    }

    pub fn plain(ty: UfRegType, number: u32) -> Self {
        UfSource {
            ty,
            number,
            swizzle: IDENTITY_SWIZZLE,
            negate: false,
            absolute: false,
            index: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UfDest {
    pub ty: UfRegType,
    pub number: u32,
    /// Components written, bit 0 is x.
    pub mask: u8,
    pub index: Option<IndexRegister>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UfInstruction {
    pub opcode: UfOpcode,
    pub dest: Option<UfDest>,
    pub sources: Vec<UfSource>,
    pub predicate: Option<Predicate>,
    pub test: Option<TestCondition>,
    pub comment: String,
}

impl UfInstruction {
    pub fn new(opcode: UfOpcode) -> Self {
        UfInstruction {
            opcode,
            dest: None,
            sources: Vec::new(),
            predicate: None,
            test: None,
            comment: String::new(),
        }
    }

    pub fn dest(self, dest: UfDest) -> Self {
        UfInstruction {
            dest: Some(dest),
            ..self
        }
    }

    pub fn source(mut self, source: UfSource) -> Self {
        self.sources.push(source);
        self
    }
}

fn fmt_register(
    f: &mut fmt::Formatter<'_>,
    ty: UfRegType,
    number: u32,
    index: Option<IndexRegister>,
) -> fmt::Result {
    match ty {
        UfRegType::Immediate => write!(f, "#{}", number as i32),
        _ => match index {
            Some(IndexRegister::Low) => write!(f, "{}[a0+{number}]", ty.prefix()),
            Some(IndexRegister::High) => write!(f, "{}[a1+{number}]", ty.prefix()),
            None => write!(f, "{}{number}", ty.prefix()),
        },
    }
}

impl fmt::Display for UfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "-")?;
        }
        if self.absolute {
            write!(f, "|")?;
        }
        fmt_register(f, self.ty, self.number, self.index)?;
        if matches!(
            self.ty,
            UfRegType::Temp | UfRegType::Const | UfRegType::VertexInput | UfRegType::VertexOutput
        ) && self.swizzle != IDENTITY_SWIZZLE
        {
            write!(f, ".")?;
            for c in self.swizzle {
                write!(f, "{}", COMPONENTS[c as usize & 3])?;
            }
        }
        if self.absolute {
            write!(f, "|")?;
        }
        Ok(())
    }
}

impl fmt::Display for UfDest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_register(f, self.ty, self.number, self.index)?;
        if self.mask != 0xf && self.ty != UfRegType::Predicate && self.ty != UfRegType::Index {
            write!(f, ".")?;
            for (c, name) in COMPONENTS.iter().enumerate() {
                if self.mask & (1 << c) != 0 {
                    write!(f, "{name}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for UfInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode == UfOpcode::Label {
            if let Some(label) = self.sources.first() {
                write!(f, "L{}:", label.number)?;
            }
            return Ok(());
        }
        write!(f, "    ")?;
        if let Some(predicate) = &self.predicate {
            write!(f, "({predicate}) ")?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(test) = &self.test {
            write!(f, ".{test}")?;
        }
        let mut sep = " ";
        if let Some(dest) = &self.dest {
            write!(f, "{sep}{dest}")?;
            sep = ", ";
        }
        for source in &self.sources {
            write!(f, "{sep}{source}")?;
            sep = ", ";
        }
        if !self.comment.is_empty() {
            write!(f, " ; {}", self.comment)?;
        }
        Ok(())
    }
}
