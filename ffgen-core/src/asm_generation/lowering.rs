use crate::{
    asm_lang::{
        HwBank, HwInstruction, HwOperand, Immediate, Instruction, OperandFlags, Operand,
        SpecialReg, MAX_OPERANDS,
    },
    register_allocation::{IndexRegister, Relocation, RegisterSpace},
};

use ffgen_error::error::CompileError;

fn invalid(inst: &Instruction, reason: &'static str) -> CompileError {
    tracing::error!("invalid operand in `{inst}`: {reason}");
    CompileError::InvalidOperand {
        opcode: inst.opcode.to_string(),
        reason,
    }
}

pub(crate) fn lower_operand(operand: &Operand, relocation: &Relocation) -> HwOperand {
    match operand {
        Operand::Reg(reg, flags) => HwOperand {
            bank: match reg.space {
                RegisterSpace::Temp => HwBank::Temp,
                RegisterSpace::Input => HwBank::PrimaryAttribute,
                RegisterSpace::Constant => HwBank::SecondaryAttribute,
                RegisterSpace::Output => HwBank::Output,
            },
            number: relocation.register_offset(reg),
            index: reg.index,
            flags: *flags,
        },
        Operand::Imm(Immediate::Int(value)) => HwOperand::new(HwBank::Immediate, *value as u32),
        Operand::Imm(Immediate::Label(label)) => HwOperand::new(HwBank::Label, label.0),
        Operand::Imm(Immediate::IndexableBase(base)) => {
            HwOperand::new(HwBank::Immediate, relocation.indexable_base(*base))
        }
        Operand::Special(special) => {
            let (bank, number) = match special {
                SpecialReg::Internal(n) => (HwBank::Internal, *n as u32),
                SpecialReg::Predicate(n) => (HwBank::Predicate, *n as u32),
                SpecialReg::Index(IndexRegister::Low) => (HwBank::Index, 0),
                SpecialReg::Index(IndexRegister::High) => (HwBank::Index, 1),
                SpecialReg::Drc(n) => (HwBank::Drc, *n as u32),
            };
            HwOperand {
                bank,
                number,
                index: None,
                flags: OperandFlags::default(),
            }
        }
    }
}

/// Gives every operand of `inst` its final hardware number.
pub fn lower_instruction(
    inst: &Instruction,
    relocation: &Relocation,
) -> Result<HwInstruction, CompileError> {
    if inst.operands.len() > MAX_OPERANDS {
        return Err(invalid(inst, "too many operands"));
    }
    if inst.opcode.has_destination() && inst.opcode.is_componentwise() {
        match inst.operands.first() {
            Some(Operand::Reg(dst, _)) => {
                if matches!(dst.space, RegisterSpace::Input | RegisterSpace::Constant) {
                    return Err(invalid(inst, "destination is read-only"));
                }
            }
            _ => return Err(invalid(inst, "destination is not a register")),
        }
    }
    inst.try_map_operands(|op| Ok(lower_operand(op, relocation)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asm_lang::Opcode,
        register_allocation::{Register, RegisterAllocator},
    };
    use ffgen_types::{BindingTag, Capabilities, SecondaryBudget, Target};

    #[test]
    fn banks_and_numbers() {
        let t = Register::new(RegisterSpace::Temp, 3, 1, BindingTag::Temp);
        let c = Register::new(RegisterSpace::Constant, 12, 4, BindingTag::ClipPlane(0));
        let o = Register::new(RegisterSpace::Output, 8, 1, BindingTag::OutputClipDistance(0));
        let inst = Instruction::alu(Opcode::Dp4, o, [t.neg(), c.into()]);
        let hw = lower_instruction(&inst, &Relocation::identity()).unwrap();
        assert_eq!(hw.operands[0].bank, HwBank::Output);
        assert_eq!(hw.operands[1].bank, HwBank::Temp);
        assert!(hw.operands[1].flags.negate);
        assert_eq!(hw.operands[2].bank, HwBank::SecondaryAttribute);
        assert_eq!(hw.operands[2].number, 12);
        assert_eq!(hw.to_string(), "    dp4 o8, -r3, sa12");
    }

    #[test]
    fn writes_to_constants_are_rejected() {
        let c = Register::new(RegisterSpace::Constant, 12, 4, BindingTag::FogParams);
        let inst = Instruction::mov(c, c);
        assert!(matches!(
            lower_instruction(&inst, &Relocation::identity()),
            Err(CompileError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn relocation_moves_indexable_operands() {
        let budget = SecondaryBudget::default();
        let mut regs =
            RegisterAllocator::new(&budget, &Capabilities::for_target(Target::Sgx535)).unwrap();
        regs.place_constant(BindingTag::ModelViewProjection, 16).unwrap();
        let palette = regs
            .place_constant(BindingTag::MatrixPalette(1), 16)
            .unwrap()
            .register()
            .unwrap();
        let t = Register::new(RegisterSpace::Temp, 0, 4, BindingTag::Temp);
        let inst = Instruction::mov(t, palette.sub(4, 4))
            .with_operand(Immediate::IndexableBase(palette.offset));
        let relocation = regs.patch_indexable_secondaries();
        let hw = lower_instruction(&inst, &relocation).unwrap();
        assert_eq!(hw.operands[1].number, 20 + 4);
        assert_eq!(hw.operands[2].number, 20);
    }
}
