use super::{UfDest, UfInstruction, UfOpcode, UfRegType, UfSource, IDENTITY_SWIZZLE};
use crate::{
    asm_lang::{Immediate, Instruction, Opcode, Operand, OperandFlags, SpecialReg},
    register_allocation::{IndexRegister, Register, RegisterSpace, Relocation},
};

use ffgen_error::error::CompileError;

fn invalid(inst: &Instruction, reason: &'static str) -> CompileError {
    tracing::error!("cannot translate `{inst}`: {reason}");
    CompileError::InvalidOperand {
        opcode: inst.opcode.to_string(),
        reason,
    }
}

fn reg_type(space: RegisterSpace) -> UfRegType {
    match space {
        RegisterSpace::Temp => UfRegType::Temp,
        RegisterSpace::Input => UfRegType::VertexInput,
        RegisterSpace::Constant => UfRegType::Const,
        RegisterSpace::Output => UfRegType::VertexOutput,
    }
}

fn index_number(register: IndexRegister) -> u32 {
    match register {
        IndexRegister::Low => 0,
        IndexRegister::High => 1,
    }
}

/// Whether `count` words from `offset` sit in one vec4 row.
fn fits_row(offset: u32, count: u32) -> bool {
    count == 0 || offset / 4 == (offset + count - 1) / 4
}

/// Pieces of `reg` that each sit in one row, as `(first word, count)`.
fn row_pieces(offset: u32, size: u32) -> Vec<(u32, u32)> {
    let mut pieces = Vec::new();
    let mut word = 0;
    while word < size {
        let abs = offset + word;
        let count = (4 - abs % 4).min(size - word);
        pieces.push((word, count));
        word += count;
    }
    pieces
}

/// Translates single instructions for one relocation.
struct Translator<'a> {
    inst: &'a Instruction,
    relocation: &'a Relocation,
}

impl Translator<'_> {
    fn offset(&self, reg: &Register) -> u32 {
        self.relocation.register_offset(reg)
    }

    fn reg(&self, i: usize) -> Result<(Register, OperandFlags), CompileError> {
        match self.inst.operands.get(i) {
            Some(Operand::Reg(reg, flags)) => Ok((*reg, *flags)),
            _ => Err(invalid(self.inst, "register operand expected")),
        }
    }

    fn imm(&self, i: usize) -> Result<i32, CompileError> {
        match self.inst.operands.get(i) {
            Some(Operand::Imm(Immediate::Int(value))) => Ok(*value),
            _ => Err(invalid(self.inst, "immediate operand expected")),
        }
    }

    /// A register source whose destination component `lane` reads word `word` of `reg`.
    fn reg_source(
        &self,
        reg: &Register,
        flags: OperandFlags,
        lanes: &[(usize, u32)],
    ) -> UfSource {
        let base = self.offset(reg);
        let first = lanes.first().map(|(_, w)| base + w).unwrap_or(base);
        let mut swizzle = IDENTITY_SWIZZLE;
        for (lane, word) in lanes {
            swizzle[*lane & 3] = ((base + word) % 4) as u8;
        }
        UfSource {
            ty: reg_type(reg.space),
            number: first / 4,
            swizzle,
            negate: flags.negate,
            absolute: flags.absolute,
            index: reg.index,
        }
    }

    fn dest(&self, reg: &Register, first: u32, count: u32) -> UfDest {
        let base = self.offset(reg) + first;
        let mask = (0..count).fold(0u8, |mask, i| mask | 1 << ((base + i) % 4));
        UfDest {
            ty: reg_type(reg.space),
            number: base / 4,
            mask,
            index: reg.index,
        }
    }

    /// Any non-register operand.
    fn other_source(&self, op: &Operand, scale: u32) -> Result<UfSource, CompileError> {
        Ok(match op {
            Operand::Imm(Immediate::Int(value)) => {
                UfSource::immediate((*value / scale as i32) as u32)
            }
            Operand::Imm(Immediate::IndexableBase(base)) => {
                UfSource::immediate(self.relocation.indexable_base(*base) / scale)
            }
            Operand::Imm(Immediate::Label(label)) => UfSource::plain(UfRegType::Label, label.0),
            Operand::Special(SpecialReg::Predicate(p)) => {
                UfSource::plain(UfRegType::Predicate, *p as u32)
            }
            Operand::Special(SpecialReg::Index(register)) => {
                UfSource::plain(UfRegType::Index, index_number(*register))
            }
            Operand::Special(_) | Operand::Reg(..) => {
                return Err(invalid(self.inst, "operand has no portable form"))
            }
        })
    }

    fn finish(&self, opcode: UfOpcode) -> UfInstruction {
        UfInstruction {
            predicate: self.inst.predicate,
            test: self.inst.test,
            ..UfInstruction::new(opcode)
        }
    }

    /// Destination words `first..first + count` of a componentwise operation.
    fn componentwise(
        &self,
        opcode: UfOpcode,
        dst: &Register,
        first: u32,
        count: u32,
    ) -> Result<UfInstruction, CompileError> {
        let dst_base = self.offset(dst);
        let mut inst = self.finish(opcode).dest(self.dest(dst, first, count));
        for op in &self.inst.operands[1..] {
            let source = match op {
                Operand::Reg(reg, flags) => {
                    let lanes = (first..first + count)
                        .map(|i| {
                            let word = if reg.size == 1 { 0 } else { i };
                            (((dst_base + i) % 4) as usize, word)
                        })
                        .collect::<Vec<_>>();
                    self.reg_source(reg, *flags, &lanes)
                }
                other => self.other_source(other, 1)?,
            };
            inst = inst.source(source);
        }
        Ok(inst)
    }

    fn lower_componentwise(&self, opcode: UfOpcode) -> Result<Vec<UfInstruction>, CompileError> {
        let (dst, _) = self.reg(0)?;
        let count = dst.size;
        let vector = fits_row(self.offset(&dst), count)
            && self.inst.operands[1..].iter().all(|op| match op {
                Operand::Reg(reg, _) => reg.size == 1 || fits_row(self.offset(reg), count),
                _ => true,
            });
        if vector {
            return Ok(vec![self.componentwise(opcode, &dst, 0, count)?]);
        }
        (0..count)
            .map(|i| self.componentwise(opcode, &dst, i, 1))
            .collect()
    }

    fn lower_dot(&self, opcode: UfOpcode, n: u32) -> Result<Vec<UfInstruction>, CompileError> {
        let (dst, _) = self.reg(0)?;
        let (a, a_flags) = self.reg(1)?;
        let (b, b_flags) = self.reg(2)?;
        let dest = self.dest(&dst, 0, 1);
        let lane = (self.offset(&dst) % 4) as usize;
        if fits_row(self.offset(&a), n) && fits_row(self.offset(&b), n) {
            let lanes = (0..n).map(|k| (k as usize, k)).collect::<Vec<_>>();
            return Ok(vec![self
                .finish(opcode)
                .dest(dest)
                .source(self.reg_source(&a, a_flags, &lanes))
                .source(self.reg_source(&b, b_flags, &lanes))]);
        }
        // Expand into a multiply followed by multiply-adds accumulating in the destination.
        let acc = UfSource {
            swizzle: [lane as u8; 4],
            index: dest.index,
            ..UfSource::plain(dest.ty, dest.number)
        };
        let mut out = Vec::new();
        for k in 0..n {
            let lanes = [(lane, k)];
            let mut inst = self
                .finish(if k == 0 { UfOpcode::Mul } else { UfOpcode::Mad })
                .dest(dest)
                .source(self.reg_source(&a, a_flags, &lanes))
                .source(self.reg_source(&b, b_flags, &lanes));
            if k > 0 {
                inst = inst.source(acc);
            }
            out.push(inst);
        }
        Ok(out)
    }

    /// Integer and address arithmetic on single words.
    fn lower_scalar(&self, opcode: UfOpcode) -> Result<Vec<UfInstruction>, CompileError> {
        let (dest, scale) = match self.inst.operands.first() {
            Some(Operand::Reg(reg, _)) => (self.dest(reg, 0, 1), 1),
            Some(Operand::Special(SpecialReg::Index(register))) => (
                UfDest {
                    ty: UfRegType::Index,
                    number: index_number(*register),
                    mask: 1,
                    index: None,
                },
                // Index registers count rows.
                4,
            ),
            _ => return Err(invalid(self.inst, "destination is not a register")),
        };
        let lane = dest.mask.trailing_zeros() as usize;
        let mut inst = self.finish(opcode).dest(dest);
        for op in &self.inst.operands[1..] {
            inst = inst.source(match op {
                Operand::Reg(reg, flags) => self.reg_source(reg, *flags, &[(lane, 0)]),
                other => self.other_source(other, scale)?,
            });
        }
        Ok(vec![inst])
    }

    /// Memory access of `reg` at `base + byte_offset`, split by rows. Increments `base` past the
    /// data afterwards when `increment` is set.
    fn lower_memory(
        &self,
        load: bool,
        reg: (Register, OperandFlags),
        base: (Register, OperandFlags),
        byte_offset: i32,
        increment: bool,
    ) -> Vec<UfInstruction> {
        let (reg, flags) = reg;
        let base_source = self.reg_source(&base.0, base.1, &[(0, 0)]);
        let mut out = Vec::new();
        for (word, count) in row_pieces(self.offset(&reg), reg.size) {
            let offset = UfSource::immediate((byte_offset + word as i32 * 4) as u32);
            let inst = if load {
                self.finish(UfOpcode::Ld)
                    .dest(self.dest(&reg, word, count))
                    .source(base_source)
                    .source(offset)
            } else {
                let lanes = (word..word + count)
                    .map(|w| (((self.offset(&reg) + w) % 4) as usize, w))
                    .collect::<Vec<_>>();
                self.finish(UfOpcode::St)
                    .source(base_source)
                    .source(offset)
                    .source(self.reg_source(&reg, flags, &lanes))
            };
            out.push(inst);
        }
        if increment {
            out.push(
                self.finish(UfOpcode::Iadd)
                    .dest(self.dest(&base.0, 0, 1))
                    .source(base_source)
                    .source(UfSource::immediate(reg.size * 4)),
            );
        }
        out
    }

    fn lower(&self) -> Result<Vec<UfInstruction>, CompileError> {
        use Opcode::*;
        let simple = |opcode| self.lower_componentwise(opcode);
        let mut out = match self.inst.opcode {
            Comment | Block | Wdf | IncrementMode => return Ok(Vec::new()),
            Efo(_) | Vdp3 | Vdp4 => {
                tracing::error!("`{}` has no portable form", self.inst.opcode);
                return Err(CompileError::UnsupportedUniflexOpcode {
                    opcode: self.inst.opcode.to_string(),
                });
            }
            Mov => simple(UfOpcode::Mov)?,
            Add => simple(UfOpcode::Add)?,
            Mul => simple(UfOpcode::Mul)?,
            Mad => simple(UfOpcode::Mad)?,
            Rsq => simple(UfOpcode::Rsq)?,
            Rcp => simple(UfOpcode::Rcp)?,
            Exp => simple(UfOpcode::Exp)?,
            Log => simple(UfOpcode::Log)?,
            Max => simple(UfOpcode::Max)?,
            Min => simple(UfOpcode::Min)?,
            Frc => simple(UfOpcode::Frc)?,
            Flr => simple(UfOpcode::Flr)?,
            F2i => simple(UfOpcode::F2i)?,
            Dp3 => self.lower_dot(UfOpcode::Dp3, 3)?,
            Dp4 => self.lower_dot(UfOpcode::Dp4, 4)?,
            Test => {
                let p = match self.inst.operands.first() {
                    Some(Operand::Special(SpecialReg::Predicate(p))) => *p as u32,
                    _ => return Err(invalid(self.inst, "test must write a predicate")),
                };
                let (src, flags) = self.reg(1)?;
                vec![self
                    .finish(UfOpcode::Setp)
                    .dest(UfDest {
                        ty: UfRegType::Predicate,
                        number: p,
                        mask: 1,
                        index: None,
                    })
                    .source(self.reg_source(&src, flags, &[(0, 0)]))]
            }
            Iadd => self.lower_scalar(UfOpcode::Iadd)?,
            Imae => self.lower_scalar(UfOpcode::Imad)?,
            Shl => self.lower_scalar(UfOpcode::Shl)?,
            Ld => self.lower_memory(true, self.reg(0)?, self.reg(1)?, self.imm(2)?, false),
            LdInc => self.lower_memory(true, self.reg(0)?, self.reg(1)?, 0, true),
            St => self.lower_memory(false, self.reg(2)?, self.reg(0)?, self.imm(1)?, false),
            StInc => self.lower_memory(false, self.reg(1)?, self.reg(0)?, 0, true),
            Br | Label => {
                let label = self
                    .inst
                    .label_operand()
                    .ok_or_else(|| invalid(self.inst, "label operand expected"))?;
                let opcode = if self.inst.opcode == Br {
                    UfOpcode::Br
                } else {
                    UfOpcode::Label
                };
                vec![self
                    .finish(opcode)
                    .source(UfSource::plain(UfRegType::Label, label.0))]
            }
            Nop => vec![self.finish(UfOpcode::Nop)],
            End => vec![self.finish(UfOpcode::End)],
        };
        if let Some(first) = out.first_mut() {
            first.comment.clone_from(&self.inst.comment);
        }
        Ok(out)
    }
}

/// Translates one instruction into the portable form.
///
/// A componentwise operation stays one instruction when its destination and every source fit
/// in single rows, and splits into one instruction per word otherwise. Dot products over
/// sources that straddle rows expand into a multiply and multiply-adds. Fetch waits and
/// increment mode switches have no portable counterpart and vanish.
pub fn to_uniflex(
    inst: &Instruction,
    relocation: &Relocation,
) -> Result<Vec<UfInstruction>, CompileError> {
    Translator { inst, relocation }.lower()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm_lang::{EfoMode, Predicate, TestCondition};
    use ffgen_types::BindingTag;
    use pretty_assertions::assert_eq;

    fn reg(space: RegisterSpace, offset: u32, size: u32) -> Register {
        Register::new(space, offset, size, BindingTag::Temp)
    }

    fn listing(inst: &Instruction) -> Vec<String> {
        to_uniflex(inst, &Relocation::identity())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn aligned_vector_stays_whole() {
        let inst = Instruction::alu(
            Opcode::Mad,
            reg(RegisterSpace::Temp, 4, 4),
            [
                reg(RegisterSpace::Constant, 8, 4),
                reg(RegisterSpace::Input, 0, 1),
                reg(RegisterSpace::Temp, 4, 4),
            ],
        );
        assert_eq!(listing(&inst), vec!["    mad r1, c2, v0.xxxx, r1"]);
    }

    #[test]
    fn straddling_vector_splits_per_channel() {
        let inst = Instruction::mov(
            reg(RegisterSpace::Output, 2, 3),
            reg(RegisterSpace::Temp, 0, 3).neg(),
        );
        assert_eq!(
            listing(&inst),
            vec![
                "    mov o0.z, -r0.xyxw",
                "    mov o0.w, -r0.xyzy",
                "    mov o1.x, -r0.zyzw",
            ]
        );
    }

    #[test]
    fn misaligned_scalar_in_one_row_uses_swizzle() {
        let inst = Instruction::alu(
            Opcode::Rsq,
            reg(RegisterSpace::Temp, 3, 1),
            [reg(RegisterSpace::Temp, 6, 1)],
        );
        assert_eq!(listing(&inst), vec!["    rsq r0.w, r1.xyzz"]);
    }

    #[test]
    fn dot_products() {
        let aligned = Instruction::alu(
            Opcode::Dp4,
            reg(RegisterSpace::Output, 1, 1),
            [reg(RegisterSpace::Constant, 4, 4), reg(RegisterSpace::Input, 0, 4)],
        );
        assert_eq!(listing(&aligned), vec!["    dp4 o0.y, c1, v0"]);

        let straddling = Instruction::alu(
            Opcode::Dp3,
            reg(RegisterSpace::Temp, 0, 1),
            [reg(RegisterSpace::Temp, 2, 3), reg(RegisterSpace::Constant, 4, 3)],
        );
        let out = to_uniflex(&straddling, &Relocation::identity()).unwrap();
        assert_eq!(
            out.iter().map(|i| i.opcode).collect::<Vec<_>>(),
            vec![UfOpcode::Mul, UfOpcode::Mad, UfOpcode::Mad]
        );
        assert_eq!(out[2].sources.len(), 3);
    }

    #[test]
    fn loads_split_by_row_and_advance_the_address() {
        let dst = reg(RegisterSpace::Temp, 2, 6);
        let addr = reg(RegisterSpace::Temp, 12, 1);
        let inst = Instruction::new(Opcode::LdInc)
            .with_operand(dst)
            .with_operand(addr)
            .with_operand(SpecialReg::Drc(0));
        assert_eq!(
            listing(&inst),
            vec![
                "    ld r0.zw, r3, #0",
                "    ld r1, r3, #8",
                "    iadd r3.x, r3, #24",
            ]
        );
    }

    #[test]
    fn control_flow_and_tests() {
        let test = Instruction::test(1, reg(RegisterSpace::Temp, 5, 1), TestCondition::Gt);
        assert_eq!(listing(&test), vec!["    setp.gt p1, r1.yyzw"]);

        let branch = Instruction::branch(crate::asm_lang::LabelId(4))
            .with_predicate(Predicate::new(1).negated());
        assert_eq!(listing(&branch), vec!["    (!p1) br L4"]);

        assert!(listing(&Instruction::annotation("note")).is_empty());
        assert!(listing(&Instruction::new(Opcode::Wdf)).is_empty());
        assert!(listing(&Instruction::increment_mode(false)).is_empty());
    }

    #[test]
    fn index_setup_counts_rows() {
        let value = reg(RegisterSpace::Temp, 0, 1);
        let inst = Instruction::new(Opcode::Imae)
            .with_operand(SpecialReg::Index(IndexRegister::High))
            .with_operand(value)
            .with_operand(Operand::imm(16))
            .with_operand(Immediate::IndexableBase(128));
        assert_eq!(listing(&inst), vec!["    imad a1, r0, #4, #32"]);
    }

    #[test]
    fn efo_is_rejected() {
        assert!(matches!(
            to_uniflex(&Instruction::efo(EfoMode::Seed), &Relocation::identity()),
            Err(CompileError::UnsupportedUniflexOpcode { .. })
        ));
    }
}
