//! Acquiring bindings and moving constants between memory and registers.

use super::{ConstantPlacement, IndexRegister, Register, RegisterSpace, Storage};
use crate::{
    asm_lang::{Immediate, Instruction, Opcode, Operand, SpecialReg},
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::BindingTag;

/// Largest immediate an integer add can carry.
const MAX_ADD_IMMEDIATE: i64 = 0xffff;

/// A runtime index into a palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedBy {
    /// Integer entry number, one word.
    pub value: Register,
    /// Words per entry.
    pub stride: u32,
    pub register: IndexRegister,
}

/// Data-ready channels of outstanding memory fetches.
///
/// Channels are handed out round robin. A channel still waited on must be drained before it is
/// reused.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataReadyChannels {
    count: u32,
    next: u32,
    outstanding: u32,
}

impl DataReadyChannels {
    pub fn new(count: u32) -> Self {
        DataReadyChannels {
            count: count.clamp(1, 32),
            next: 0,
            outstanding: 0,
        }
    }

    /// The channel for the next fetch, and whether it has to be waited on first.
    fn claim(&mut self) -> (u8, bool) {
        let channel = self.next;
        self.next = (self.next + 1) % self.count;
        let busy = self.outstanding & (1 << channel) != 0;
        self.outstanding |= 1 << channel;
        (channel as u8, busy)
    }

    fn drain(&mut self) -> impl Iterator<Item = u8> {
        let outstanding = std::mem::take(&mut self.outstanding);
        (0..32u8).filter(move |ch| outstanding & (1 << ch) != 0)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }
}

fn check_add_immediate(value: i64) -> Result<i32, CompileError> {
    if value.abs() > MAX_ADD_IMMEDIATE {
        tracing::error!("address offset {value} out of range");
        return Err(CompileError::ImmediateOutOfRange {
            value,
            limit: MAX_ADD_IMMEDIATE as u32,
        });
    }
    Ok(value as i32)
}

impl CompilationSession<'_> {
    /// Finds or allocates `size` words at `load_offset` of `binding`.
    ///
    /// Re-acquiring a binding yields a view of the storage allocated the first time. Constants
    /// placed in memory are loaded into a fresh temporary on every call; the caller owns it and
    /// releases it like any other temporary.
    pub(crate) fn get_or_alloc(
        &mut self,
        space: RegisterSpace,
        binding: BindingTag,
        load_offset: u32,
        size: u32,
        index: Option<IndexedBy>,
    ) -> Result<Register, CompileError> {
        self.fetch_constant(space, binding, load_offset, size, index, false)
    }

    /// [`Self::get_or_alloc`], optionally leaving a memory fetch outstanding until the next
    /// [`Self::wait_for_loads`].
    pub(crate) fn fetch_constant(
        &mut self,
        space: RegisterSpace,
        binding: BindingTag,
        load_offset: u32,
        size: u32,
        index: Option<IndexedBy>,
        defer_wait: bool,
    ) -> Result<Register, CompileError> {
        if size == 0 {
            tracing::error!("zero size request for {binding}");
            return Err(CompileError::ZeroSizeAllocation { binding });
        }
        let mismatch = |existing: u32| {
            tracing::error!(
                "{binding} re-acquired at {load_offset}+{size}, it has {existing} words"
            );
            CompileError::BindingSizeMismatch {
                binding,
                existing,
                offset: load_offset,
                requested: size,
            }
        };

        match space {
            RegisterSpace::Temp => self.registers.alloc_temp(size),
            RegisterSpace::Input | RegisterSpace::Output => {
                let reg = self
                    .registers
                    .io_register(space, binding, load_offset + size)?;
                if load_offset + size > reg.size {
                    return Err(mismatch(reg.size));
                }
                Ok(reg.sub(load_offset, size))
            }
            RegisterSpace::Constant => {
                let full = binding.constant_size().unwrap_or(load_offset + size);
                let entry = self.registers.place_constant(binding, full)?;
                let extent = match index {
                    Some(index) => index.stride,
                    None => entry.size,
                };
                if load_offset + size > extent {
                    return Err(mismatch(extent));
                }
                if binding.is_palette() && index.is_none() {
                    tracing::error!("{binding} accessed without an index");
                    return Err(CompileError::MissingIndex { binding });
                }
                match (entry.placement, entry.register(), index) {
                    (ConstantPlacement::Indexable, Some(palette), Some(index)) => {
                        let entry = self.relative_address(palette, index)?;
                        Ok(entry.sub(load_offset, size))
                    }
                    (ConstantPlacement::Memory, _, _) => {
                        let dst = self.registers.alloc_temp(size)?;
                        let byte_offset = (entry.offset as i64 + load_offset as i64) * 4
                            - self.registers.memory_base_adjust() as i64;
                        let base = self.registers.memory_base();
                        self.load_constant(dst, base, byte_offset, index, defer_wait)?;
                        Ok(dst)
                    }
                    (_, Some(reg), _) => Ok(reg.sub(load_offset, size)),
                    (_, None, _) => Err(CompileError::Internal(
                        "register placement without a register",
                    )),
                }
            }
        }
    }

    /// Reserves storage for `binding` without loading anything into it.
    pub(crate) fn alloc_space(
        &mut self,
        space: RegisterSpace,
        binding: BindingTag,
        size: u32,
        indexable: bool,
    ) -> Result<Storage, CompileError> {
        let storage = self.registers.alloc_space(space, binding, size, indexable)?;
        tracing::trace!("reserved {binding}: {storage:?}");
        Ok(storage)
    }

    /// Points `index.register` at entry `index.value` of `palette` and returns the entry.
    ///
    /// The palette base is emitted as an [`Immediate::IndexableBase`] so it follows the palette
    /// when the indexable window is compacted.
    pub(crate) fn relative_address(
        &mut self,
        palette: Register,
        index: IndexedBy,
    ) -> Result<Register, CompileError> {
        self.emit(
            Instruction::new(Opcode::Imae)
                .with_operand(SpecialReg::Index(index.register))
                .with_operand(index.value)
                .with_operand(Operand::imm(index.stride as i32))
                .with_operand(Immediate::IndexableBase(palette.offset))
                .with_comment(format!("{} entry", palette.binding)),
        )?;
        Ok(Register {
            offset: 0,
            size: index.stride,
            index: Some(index.register),
            indexable: true,
            ..palette
        })
    }

    /// Computes `base + byte_offset (+ index * stride)` into a fresh one word temporary.
    fn address_register(
        &mut self,
        base: Register,
        byte_offset: i64,
        index: Option<IndexedBy>,
    ) -> Result<Register, CompileError> {
        let addr = self.registers.alloc_temp(1)?;
        match index {
            Some(index) => {
                let stride_bytes = index.stride * 4;
                if stride_bytes.is_power_of_two() {
                    self.emit(
                        Instruction::new(Opcode::Shl)
                            .with_operand(addr)
                            .with_operand(index.value)
                            .with_operand(Operand::imm(stride_bytes.trailing_zeros() as i32)),
                    )?;
                    self.emit(
                        Instruction::new(Opcode::Iadd)
                            .with_operand(addr)
                            .with_operand(addr)
                            .with_operand(base),
                    )?;
                } else {
                    self.emit(
                        Instruction::new(Opcode::Imae)
                            .with_operand(addr)
                            .with_operand(index.value)
                            .with_operand(Operand::imm(stride_bytes as i32))
                            .with_operand(base),
                    )?;
                }
                if byte_offset != 0 {
                    let offset = check_add_immediate(byte_offset)?;
                    self.emit(
                        Instruction::new(Opcode::Iadd)
                            .with_operand(addr)
                            .with_operand(addr)
                            .with_operand(Operand::imm(offset)),
                    )?;
                }
            }
            None => {
                let offset = check_add_immediate(byte_offset)?;
                self.emit(
                    Instruction::new(Opcode::Iadd)
                        .with_operand(addr)
                        .with_operand(base)
                        .with_operand(Operand::imm(offset)),
                )?;
            }
        }
        Ok(addr)
    }

    fn claim_drc(&mut self) -> Result<u8, CompileError> {
        let (channel, busy) = self.drc.claim();
        if busy {
            self.emit(Instruction::new(Opcode::Wdf).with_operand(SpecialReg::Drc(channel)))?;
        }
        Ok(channel)
    }

    /// Fills `dst` from memory at `base + byte_offset`.
    ///
    /// A small, unindexed fetch is one load with an immediate offset. Anything else computes the
    /// address into a temporary and fetches in post-incrementing bursts.
    pub(crate) fn load_constant(
        &mut self,
        dst: Register,
        base: Register,
        byte_offset: i64,
        index: Option<IndexedBy>,
        defer_wait: bool,
    ) -> Result<(), CompileError> {
        let reach = self.caps.load_immediate_bytes as i64;
        let burst = self.caps.fetch_burst_words.max(1);
        if index.is_none() && byte_offset.abs() <= reach && dst.size <= burst {
            let channel = self.claim_drc()?;
            self.emit(
                Instruction::new(Opcode::Ld)
                    .with_operand(dst)
                    .with_operand(base)
                    .with_operand(Operand::imm(byte_offset as i32))
                    .with_operand(SpecialReg::Drc(channel))
                    .with_repeat(dst.size as u8)
                    .with_comment(format!("load {}", dst.binding)),
            )?;
        } else {
            let addr = self.address_register(base, byte_offset, index)?;
            let mut word = 0;
            while word < dst.size {
                let count = burst.min(dst.size - word);
                let channel = self.claim_drc()?;
                self.emit(
                    Instruction::new(Opcode::LdInc)
                        .with_operand(dst.sub(word, count))
                        .with_operand(addr)
                        .with_operand(SpecialReg::Drc(channel))
                        .with_repeat(count as u8),
                )?;
                word += count;
            }
            self.registers.release_temp(addr);
        }
        if !defer_wait {
            self.wait_for_loads()?;
        }
        Ok(())
    }

    /// Writes `src` to memory at `base + byte_offset`.
    pub(crate) fn store_constant(
        &mut self,
        src: Register,
        base: Register,
        byte_offset: i64,
    ) -> Result<(), CompileError> {
        let reach = self.caps.load_immediate_bytes as i64;
        let burst = self.caps.fetch_burst_words.max(1);
        if byte_offset.abs() <= reach && src.size <= burst {
            return self.emit(
                Instruction::new(Opcode::St)
                    .with_operand(base)
                    .with_operand(Operand::imm(byte_offset as i32))
                    .with_operand(src)
                    .with_repeat(src.size as u8)
                    .with_comment(format!("store {}", src.binding)),
            );
        }
        let addr = self.address_register(base, byte_offset, None)?;
        let mut word = 0;
        while word < src.size {
            let count = burst.min(src.size - word);
            self.emit(
                Instruction::new(Opcode::StInc)
                    .with_operand(addr)
                    .with_operand(src.sub(word, count))
                    .with_repeat(count as u8),
            )?;
            word += count;
        }
        self.registers.release_temp(addr);
        Ok(())
    }

    /// Waits on every outstanding fetch.
    pub(crate) fn wait_for_loads(&mut self) -> Result<(), CompileError> {
        let channels = self.drc.drain().collect::<Vec<_>>();
        for channel in channels {
            self.emit(Instruction::new(Opcode::Wdf).with_operand(SpecialReg::Drc(channel)))?;
        }
        Ok(())
    }
}
