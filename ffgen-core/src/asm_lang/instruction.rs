use super::{
    EfoMode, HwOperand, Immediate, InstFlags, LabelId, Opcode, Operand, Predicate, SpecialReg,
    TestCondition,
};
use crate::register_allocation::Register;

use smallvec::SmallVec;

use std::fmt::{self, Write};

const COMMENT_START_COLUMN: usize = 40;

/// Most operands an instruction can carry.
pub const MAX_OPERANDS: usize = 7;

/// One micro-instruction.
///
/// `O` is the operand representation: [`Operand`] while the program is being built and
/// [`HwOperand`] once registers have their final numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction<O = Operand> {
    pub opcode: Opcode,
    pub operands: SmallVec<[O; 4]>,
    /// Number of words processed, each operand wider than one word advances by one per repeat.
    pub repeat: u8,
    pub predicate: Option<Predicate>,
    pub test: Option<TestCondition>,
    pub flags: InstFlags,
    pub comment: String,
}

/// An instruction ready for the hardware encoder.
pub type HwInstruction = Instruction<HwOperand>;

impl<O> Instruction<O> {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            operands: SmallVec::new(),
            repeat: 1,
            predicate: None,
            test: None,
            flags: InstFlags::default(),
            comment: String::new(),
        }
    }

    pub fn nop() -> Self {
        Instruction::new(Opcode::Nop)
    }

    pub fn end() -> Self {
        Instruction::new(Opcode::End)
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Instruction::new(Opcode::Comment).with_comment(text)
    }

    pub fn block(name: impl Into<String>) -> Self {
        Instruction::new(Opcode::Block).with_comment(name)
    }

    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        Instruction {
            comment: comment.into(),
            ..self
        }
    }

    pub fn with_repeat(self, repeat: u8) -> Self {
        Instruction { repeat, ..self }
    }

    pub fn with_predicate(self, predicate: Predicate) -> Self {
        Instruction {
            predicate: Some(predicate),
            ..self
        }
    }

    pub fn no_sched(self) -> Self {
        Instruction {
            flags: InstFlags { no_sched: true },
            ..self
        }
    }

    /// Converts every operand, keeping everything else.
    pub fn try_map_operands<P, E>(
        &self,
        mut f: impl FnMut(&O) -> Result<P, E>,
    ) -> Result<Instruction<P>, E> {
        Ok(Instruction {
            opcode: self.opcode,
            operands: self
                .operands
                .iter()
                .map(&mut f)
                .collect::<Result<SmallVec<_>, E>>()?,
            repeat: self.repeat,
            predicate: self.predicate,
            test: self.test,
            flags: self.flags,
            comment: self.comment.clone(),
        })
    }
}

impl Instruction<Operand> {
    pub fn with_operand(mut self, operand: impl Into<Operand>) -> Self {
        debug_assert!(self.operands.len() < MAX_OPERANDS);
        self.operands.push(operand.into());
        self
    }

    /// An arithmetic instruction writing `dst`. Componentwise operations repeat over every word
    /// of the destination.
    pub fn alu<S: Into<Operand>>(
        opcode: Opcode,
        dst: Register,
        srcs: impl IntoIterator<Item = S>,
    ) -> Self {
        let repeat = if opcode.is_componentwise() {
            dst.size.max(1) as u8
        } else {
            1
        };
        srcs.into_iter()
            .fold(Instruction::new(opcode).with_operand(dst), |inst, src| {
                inst.with_operand(src)
            })
            .with_repeat(repeat)
    }

    pub fn mov(dst: Register, src: impl Into<Operand>) -> Self {
        Instruction::alu(Opcode::Mov, dst, [src.into()])
    }

    /// Sets predicate `reg` to `condition(src)`.
    pub fn test(reg: u8, src: impl Into<Operand>, condition: TestCondition) -> Self {
        Instruction {
            test: Some(condition),
            ..Instruction::new(Opcode::Test)
                .with_operand(SpecialReg::Predicate(reg))
                .with_operand(src)
        }
    }

    pub fn label(label: LabelId) -> Self {
        Instruction::new(Opcode::Label).with_operand(Immediate::Label(label))
    }

    pub fn branch(label: LabelId) -> Self {
        Instruction::new(Opcode::Br).with_operand(Immediate::Label(label))
    }

    pub fn increment_mode(enabled: bool) -> Self {
        Instruction::new(Opcode::IncrementMode).with_operand(Operand::imm(i32::from(enabled)))
    }

    pub fn efo(mode: EfoMode) -> Self {
        Instruction::new(Opcode::Efo(mode))
    }

    /// Register operands, destination included.
    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.operands.iter().filter_map(|op| op.register())
    }

    /// The label a branch or label instruction refers to.
    pub fn label_operand(&self) -> Option<LabelId> {
        self.operands.iter().find_map(|op| match op {
            Operand::Imm(Immediate::Label(label)) => Some(*label),
            _ => None,
        })
    }
}

impl<O: fmt::Display> fmt::Display for Instruction<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::Comment => return write!(f, "; {}", self.comment),
            Opcode::Block => return write!(f, "; ---- {} ----", self.comment),
            Opcode::Label => {
                let mut label = String::new();
                for op in &self.operands {
                    write!(label, "{op}")?;
                }
                label.push(':');
                if !self.comment.is_empty() {
                    while label.len() < COMMENT_START_COLUMN {
                        label.push(' ');
                    }
                    write!(label, "; {}", self.comment)?;
                }
                return write!(f, "{label}");
            }
            _ => (),
        }

        let mut op_and_comment = String::from("    ");
        if let Some(predicate) = &self.predicate {
            write!(op_and_comment, "({predicate}) ")?;
        }
        write!(op_and_comment, "{}", self.opcode)?;
        if let Some(test) = &self.test {
            write!(op_and_comment, ".{test}")?;
        }
        if self.repeat > 1 {
            write!(op_and_comment, ".r{}", self.repeat)?;
        }
        if self.flags.no_sched {
            write!(op_and_comment, ".nosched")?;
        }
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(op_and_comment, "{sep}{op}")?;
        }
        if !self.comment.is_empty() {
            op_and_comment.push(' ');
            while op_and_comment.len() < COMMENT_START_COLUMN {
                op_and_comment.push(' ');
            }
            write!(op_and_comment, "; {}", self.comment)?;
        }
        write!(f, "{op_and_comment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_allocation::RegisterSpace;
    use ffgen_types::BindingTag;

    fn temp(offset: u32, size: u32) -> Register {
        Register::new(RegisterSpace::Temp, offset, size, BindingTag::Temp)
    }

    #[test]
    fn componentwise_ops_repeat_over_destination() {
        let inst = Instruction::alu(Opcode::Mad, temp(0, 4), [temp(4, 1), temp(8, 4), temp(0, 4)]);
        assert_eq!(inst.repeat, 4);
        assert_eq!(inst.operands.len(), 4);

        let inst = Instruction::alu(Opcode::Dp4, temp(0, 1), [temp(4, 4), temp(8, 4)]);
        assert_eq!(inst.repeat, 1);
    }

    #[test]
    fn listing() {
        let inst = Instruction::alu(Opcode::Add, temp(0, 3), [temp(4, 3).neg(), temp(8, 3).into()])
            .with_predicate(Predicate::new(1).negated())
            .no_sched()
            .with_comment("L = P - V");
        assert_eq!(
            inst.to_string(),
            "    (!p1) add.r3.nosched r0:3, -r4:3, r8:3 ; L = P - V"
        );

        let test = Instruction::test(0, temp(2, 1), TestCondition::Gt);
        assert_eq!(test.to_string(), "    test.gt p0, r2");

        let label = Instruction::label(LabelId(3)).with_comment("EndOfLight0");
        assert!(label.to_string().starts_with("L3:"));
        assert!(label.to_string().ends_with("; EndOfLight0"));
    }

    #[test]
    fn operand_mapping_keeps_flags() {
        let inst = Instruction::mov(temp(0, 4), temp(4, 4)).no_sched();
        let mapped = inst
            .try_map_operands(|op| Ok::<_, ()>(op.register().map(|r| r.offset)))
            .unwrap();
        assert_eq!(mapped.operands.as_slice(), &[Some(0), Some(4)]);
        assert!(mapped.flags.no_sched);
        assert_eq!(mapped.repeat, 4);
    }
}
