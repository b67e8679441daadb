use super::control_flow::LabelResolver;
use crate::{
    asm_lang::{HwBank, HwInstruction, LabelId, Opcode},
    register_allocation::IndexRegister,
};

use ffgen_error::error::CompileError;
use ffgen_types::Capabilities;

/// Output of an [`Assembler`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledCode {
    pub words: Vec<u32>,
    pub instruction_count: u32,
}

/// Turns the final instruction list into machine words.
///
/// Labels belong to the session. The assembler records where each one lands and looks them up
/// again to resolve branches.
pub trait Assembler {
    fn assemble(
        &mut self,
        program: &[HwInstruction],
        caps: &Capabilities,
        labels: &mut dyn LabelResolver,
    ) -> Result<AssembledCode, CompileError>;
}

/// A simple, stable encoding with one header word per instruction and one word per operand.
///
/// Header: opcode in bits 0..8, repeat count minus one in 8..12, operand count in 12..15, no-reschedule in bit
/// 15, predicate in 16..20 (bit 19 marks a predicated instruction, bit 18 negates) and test
/// condition in 20..24.
///
/// Operand: bank in 28..32, index register in 26..28, negate in bit 25, absolute in bit 24 and
/// the register number below. Immediates and labels carry their value in a trailing word.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceAssembler;

const OPERAND_NUMBER_MASK: u32 = (1 << 24) - 1;

impl ReferenceAssembler {
    fn header(inst: &HwInstruction) -> u32 {
        let predicate = inst
            .predicate
            .map(|p| 0x8 | (p.negate as u32) << 2 | (p.reg as u32 & 0x3))
            .unwrap_or(0);
        let test = inst.test.map(|t| t.code() + 1).unwrap_or(0);
        inst.opcode.code()
            | (inst.repeat.saturating_sub(1) as u32 & 0xf) << 8
            | ((inst.operands.len() as u32) & 0x7) << 12
            | (inst.flags.no_sched as u32) << 15
            | predicate << 16
            | (test & 0xf) << 20
    }
}

impl Assembler for ReferenceAssembler {
    fn assemble(
        &mut self,
        program: &[HwInstruction],
        _caps: &Capabilities,
        labels: &mut dyn LabelResolver,
    ) -> Result<AssembledCode, CompileError> {
        let encoded = program
            .iter()
            .filter(|inst| !inst.opcode.is_annotation());

        let mut address = 0;
        for inst in encoded.clone() {
            if inst.opcode == Opcode::Label {
                if let Some(label) = inst.operands.first() {
                    labels.set_label_address(LabelId(label.number), address);
                }
            } else {
                address += 1;
            }
        }

        let mut words = Vec::new();
        let mut instruction_count = 0;
        for inst in encoded.filter(|inst| inst.opcode != Opcode::Label) {
            words.push(Self::header(inst));
            let mut trailing = Vec::new();
            for op in &inst.operands {
                if op.number > OPERAND_NUMBER_MASK && !matches!(op.bank, HwBank::Immediate) {
                    return Err(CompileError::Assembler(format!(
                        "register number {} does not fit in `{inst}`",
                        op.number
                    )));
                }
                let index = match op.index {
                    None => 0,
                    Some(IndexRegister::Low) => 1,
                    Some(IndexRegister::High) => 2,
                };
                let number = match op.bank {
                    HwBank::Immediate => {
                        trailing.push(op.number);
                        0
                    }
                    HwBank::Label => {
                        let label = LabelId(op.number);
                        let target = labels.get_label_address(label).ok_or_else(|| {
                            tracing::error!("branch to unplaced label {label}");
                            CompileError::UndefinedLabel { label: op.number }
                        })?;
                        trailing.push(target);
                        0
                    }
                    _ => op.number,
                };
                words.push(
                    op.bank.code() << 28
                        | index << 26
                        | (op.flags.negate as u32) << 25
                        | (op.flags.absolute as u32) << 24
                        | number,
                );
            }
            words.extend(trailing);
            instruction_count += 1;
        }
        tracing::debug!("assembled {instruction_count} instructions into {} words", words.len());
        Ok(AssembledCode {
            words,
            instruction_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asm_generation::LabelTable,
        asm_lang::{HwOperand, Instruction, Predicate},
    };
    use ffgen_types::Target;

    fn caps() -> Capabilities {
        Capabilities::for_target(Target::Sgx535)
    }

    #[test]
    fn labels_resolve_to_instruction_addresses() {
        let mut labels = LabelTable::default();
        let skip = labels.alloc("skip").unwrap();
        let label_op = HwOperand::new(HwBank::Label, skip.0);
        let mut branch = HwInstruction::new(Opcode::Br).with_predicate(Predicate::new(0).negated());
        branch.operands.push(label_op);
        let mut label = HwInstruction::new(Opcode::Label);
        label.operands.push(label_op);
        let program = vec![
            Instruction::block("b"),
            branch,
            HwInstruction::nop(),
            HwInstruction::nop(),
            label,
            HwInstruction::end(),
        ];
        let code = ReferenceAssembler
            .assemble(&program, &caps(), &mut labels)
            .unwrap();
        assert_eq!(code.instruction_count, 4);
        assert_eq!(labels.get_label_address(skip), Some(3));
        // Branch header, label operand, resolved address, then three one-word instructions.
        assert_eq!(code.words.len(), 6);
        assert_eq!(code.words[2], 3);
        assert_eq!(code.words[0] & 0xff, Opcode::Br.code());
        assert_eq!(code.words[3] & 0xff, Opcode::Nop.code());
    }

    #[test]
    fn unplaced_labels_fail() {
        let mut labels = LabelTable::default();
        let nowhere = labels.alloc("nowhere").unwrap();
        let mut branch = HwInstruction::new(Opcode::Br);
        branch.operands.push(HwOperand::new(HwBank::Label, nowhere.0));
        assert!(matches!(
            ReferenceAssembler.assemble(&[branch], &caps(), &mut labels),
            Err(CompileError::UndefinedLabel { label: 0 })
        ));
    }

    #[test]
    fn operand_words_carry_bank_and_modifiers() {
        let mut labels = LabelTable::default();
        let mut mov = HwInstruction::new(Opcode::Mov).with_repeat(4).no_sched();
        mov.operands.push(HwOperand::new(HwBank::Output, 4));
        let mut src = HwOperand::new(HwBank::SecondaryAttribute, 12);
        src.flags.negate = true;
        mov.operands.push(src);
        mov.operands.push(HwOperand::new(HwBank::Immediate, -2i32 as u32));
        let code = ReferenceAssembler
            .assemble(&[mov], &caps(), &mut labels)
            .unwrap();
        assert_eq!(code.words.len(), 5);
        let header = code.words[0];
        assert_eq!((header >> 8) & 0xf, 3);
        assert_eq!((header >> 12) & 0x7, 3);
        assert_eq!((header >> 15) & 1, 1);
        assert_eq!(code.words[1], HwBank::Output.code() << 28 | 4);
        assert_eq!(code.words[2], HwBank::SecondaryAttribute.code() << 28 | 1 << 25 | 12);
        assert_eq!(code.words[4], -2i32 as u32);
    }
}
