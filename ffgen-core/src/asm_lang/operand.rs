use crate::register_allocation::{IndexRegister, Register};

use std::fmt;

/// Source modifiers applied to a register operand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OperandFlags {
    pub negate: bool,
    pub absolute: bool,
}

impl OperandFlags {
    fn fmt_around(&self, f: &mut fmt::Formatter<'_>, inner: &dyn fmt::Display) -> fmt::Result {
        if self.negate {
            write!(f, "-")?;
        }
        if self.absolute {
            write!(f, "|{inner}|")
        } else {
            write!(f, "{inner}")
        }
    }
}

/// A label allocated from the session's label table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Immediate {
    Int(i32),
    Label(LabelId),
    /// Word address of an indexable allocation, rewritten when the indexable window is compacted.
    IndexableBase(u32),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(value) => write!(f, "#{value}"),
            Immediate::Label(label) => write!(f, "{label}"),
            Immediate::IndexableBase(base) => write!(f, "#sabase({base})"),
        }
    }
}

/// Registers outside the four allocated spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialReg {
    /// EFO internal accumulator.
    Internal(u8),
    Predicate(u8),
    Index(IndexRegister),
    /// Data-ready channel of an outstanding memory fetch.
    Drc(u8),
}

impl fmt::Display for SpecialReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialReg::Internal(n) => write!(f, "i{n}"),
            SpecialReg::Predicate(n) => write!(f, "p{n}"),
            SpecialReg::Index(IndexRegister::Low) => write!(f, "il"),
            SpecialReg::Index(IndexRegister::High) => write!(f, "ih"),
            SpecialReg::Drc(n) => write!(f, "drc{n}"),
        }
    }
}

/// An instruction operand as built by the passes, before final register numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Register, OperandFlags),
    Imm(Immediate),
    Special(SpecialReg),
}

impl Operand {
    pub fn imm(value: i32) -> Operand {
        Operand::Imm(Immediate::Int(value))
    }

    pub fn register(&self) -> Option<&Register> {
        match self {
            Operand::Reg(reg, _) => Some(reg),
            _ => None,
        }
    }

    pub fn negated(self) -> Operand {
        match self {
            Operand::Reg(reg, flags) => Operand::Reg(
                reg,
                OperandFlags {
                    negate: !flags.negate,
                    ..flags
                },
            ),
            other => other,
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg, OperandFlags::default())
    }
}

impl From<SpecialReg> for Operand {
    fn from(reg: SpecialReg) -> Self {
        Operand::Special(reg)
    }
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Operand::Imm(imm)
    }
}

impl Register {
    /// This register as a negated source.
    pub fn neg(self) -> Operand {
        Operand::from(self).negated()
    }

    /// This register as an absolute-value source.
    pub fn abs(self) -> Operand {
        Operand::Reg(
            self,
            OperandFlags {
                absolute: true,
                ..Default::default()
            },
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg, flags) => flags.fmt_around(f, reg),
            Operand::Imm(imm) => write!(f, "{imm}"),
            Operand::Special(reg) => write!(f, "{reg}"),
        }
    }
}

/// Register banks of the hardware encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum HwBank {
    Temp,
    PrimaryAttribute,
    SecondaryAttribute,
    Output,
    Immediate,
    Internal,
    Predicate,
    Index,
    Label,
    Drc,
}

impl HwBank {
    /// Four bit bank selector of the reference encoding.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// An operand with its final register number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HwOperand {
    pub bank: HwBank,
    /// Register number, immediate value (as two's complement) or label id.
    pub number: u32,
    pub index: Option<IndexRegister>,
    pub flags: OperandFlags,
}

impl HwOperand {
    pub fn new(bank: HwBank, number: u32) -> Self {
        HwOperand {
            bank,
            number,
            index: None,
            flags: OperandFlags::default(),
        }
    }
}

impl fmt::Display for HwOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Plain<'a>(&'a HwOperand);
        impl fmt::Display for Plain<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let op = self.0;
                let prefix = match op.bank {
                    HwBank::Temp => "r",
                    HwBank::PrimaryAttribute => "pa",
                    HwBank::SecondaryAttribute => "sa",
                    HwBank::Output => "o",
                    HwBank::Immediate => return write!(f, "#{}", op.number as i32),
                    HwBank::Internal => "i",
                    HwBank::Predicate => "p",
                    HwBank::Index => {
                        return match op.number {
                            0 => write!(f, "il"),
                            _ => write!(f, "ih"),
                        }
                    }
                    HwBank::Label => "L",
                    HwBank::Drc => "drc",
                };
                match op.index {
                    Some(IndexRegister::Low) => write!(f, "{prefix}[il+{}]", op.number),
                    Some(IndexRegister::High) => write!(f, "{prefix}[ih+{}]", op.number),
                    None => write!(f, "{prefix}{}", op.number),
                }
            }
        }
        self.flags.fmt_around(f, &Plain(self))
    }
}
