use super::{free_list::TempFreeList, IndexRegister, Register, RegisterSpace};

use ffgen_error::error::CompileError;
use ffgen_types::{BindingTag, Capabilities, IndexableWindow, SecondaryBudget};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a constant binding lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum ConstantPlacement {
    /// Directly addressed secondary attributes.
    Secondary,
    /// The runtime-indexable part of the secondary attribute bank.
    Indexable,
    /// Memory, fetched into temporaries with explicit loads.
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantEntry {
    pub binding: BindingTag,
    pub placement: ConstantPlacement,
    /// Secondary attribute number, or word offset into the memory-constant buffer.
    pub offset: u32,
    pub size: u32,
}

impl ConstantEntry {
    /// The secondary attributes holding the constant. `None` for memory constants.
    pub fn register(&self) -> Option<Register> {
        match self.placement {
            ConstantPlacement::Memory => None,
            placement => Some(Register {
                indexable: placement == ConstantPlacement::Indexable,
                ..Register::new(RegisterSpace::Constant, self.offset, self.size, self.binding)
            }),
        }
    }
}

/// Storage reserved for a binding by [`RegisterAllocator::alloc_space`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Register(Register),
    Memory { offset: u32, size: u32 },
}

/// One input or output of the generated program, as reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterUsage {
    pub binding: BindingTag,
    pub offset: u32,
    pub size: u32,
}

/// One constant of the generated program, as reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantUsage {
    pub binding: BindingTag,
    pub placement: ConstantPlacement,
    pub offset: u32,
    pub size: u32,
}

/// How register offsets change between allocation time and final encoding.
///
/// Only the indexable secondary window moves, and only in two-pass generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Relocation {
    indexable_from: u32,
    indexable_to: u32,
}

impl Relocation {
    pub fn identity() -> Self {
        Relocation::default()
    }

    pub fn is_identity(&self) -> bool {
        self.indexable_from == self.indexable_to
    }

    /// The final offset of a register operand.
    pub fn register_offset(&self, reg: &Register) -> u32 {
        if reg.indexable && reg.index.is_none() {
            reg.offset - self.indexable_from + self.indexable_to
        } else {
            reg.offset
        }
    }

    /// The final value of an indexable base address immediate.
    pub fn indexable_base(&self, base: u32) -> u32 {
        base - self.indexable_from + self.indexable_to
    }
}

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

fn aligned(offset: u32, size: u32) -> u32 {
    if size > 1 {
        align4(offset)
    } else {
        offset
    }
}

/// Inputs or outputs, laid out in first-request order.
#[derive(Clone, Debug)]
struct RegisterList {
    space: RegisterSpace,
    entries: IndexMap<BindingTag, Register>,
    next: u32,
}

impl RegisterList {
    fn new(space: RegisterSpace) -> Self {
        RegisterList {
            space,
            entries: IndexMap::new(),
            next: 0,
        }
    }

    fn get(&self, binding: BindingTag) -> Option<Register> {
        self.entries.get(&binding).copied()
    }

    fn alloc(&mut self, binding: BindingTag, size: u32) -> Register {
        let offset = aligned(self.next, size);
        let reg = Register::new(self.space, offset, size, binding);
        self.next = offset + size;
        self.entries.insert(binding, reg);
        reg
    }

    fn usage(&self) -> Vec<RegisterUsage> {
        self.entries
            .values()
            .map(|reg| RegisterUsage {
                binding: reg.binding,
                offset: reg.offset,
                size: reg.size,
            })
            .collect()
    }
}

/// Constant bindings and the state of the three constant banks.
#[derive(Clone, Debug)]
struct ConstantList {
    entries: IndexMap<BindingTag, ConstantEntry>,
    sa_start: u32,
    sa_limit: u32,
    sa_next: u32,
    window: Option<IndexableWindow>,
    indexable_next: u32,
    memory_next: u32,
    base_address: u32,
}

impl ConstantList {
    fn new(budget: &SecondaryBudget, caps: &Capabilities) -> Self {
        let mut sa_limit = budget.end.min(caps.max_secondary_attributes);
        if let Some(window) = caps.indexable {
            sa_limit = sa_limit.min(window.base);
        }
        ConstantList {
            entries: IndexMap::new(),
            sa_start: budget.start,
            sa_limit,
            sa_next: budget.start,
            window: caps.indexable,
            indexable_next: caps.indexable.map(|w| w.base).unwrap_or(0),
            memory_next: 0,
            base_address: budget.base_address,
        }
    }

    fn try_secondary(&mut self, binding: BindingTag, size: u32) -> Option<ConstantEntry> {
        let offset = aligned(self.sa_next, size);
        (offset + size <= self.sa_limit).then(|| {
            self.sa_next = offset + size;
            ConstantEntry {
                binding,
                placement: ConstantPlacement::Secondary,
                offset,
                size,
            }
        })
    }

    fn try_indexable(&mut self, binding: BindingTag, size: u32) -> Option<ConstantEntry> {
        let window = self.window?;
        let offset = aligned(self.indexable_next, size);
        (offset + size <= window.base + window.words).then(|| {
            self.indexable_next = offset + size;
            ConstantEntry {
                binding,
                placement: ConstantPlacement::Indexable,
                offset,
                size,
            }
        })
    }

    fn memory(&mut self, binding: BindingTag, size: u32) -> ConstantEntry {
        let offset = aligned(self.memory_next, size);
        self.memory_next = offset + size;
        ConstantEntry {
            binding,
            placement: ConstantPlacement::Memory,
            offset,
            size,
        }
    }

    fn indexable_size(&self) -> u32 {
        self.window
            .map(|window| self.indexable_next - window.base)
            .unwrap_or(0)
    }
}

/// Owns the four register spaces of one program.
#[derive(Clone, Debug)]
pub struct RegisterAllocator {
    temps: TempFreeList,
    max_temporaries: u32,
    load_immediate_bytes: u32,
    inputs: RegisterList,
    outputs: RegisterList,
    constants: ConstantList,
    compacted: bool,
}

impl RegisterAllocator {
    pub fn new(budget: &SecondaryBudget, caps: &Capabilities) -> Result<Self, CompileError> {
        if budget.end > caps.max_secondary_attributes {
            tracing::error!(
                "secondary attribute budget ends at {}, the core has {}",
                budget.end,
                caps.max_secondary_attributes
            );
            return Err(CompileError::SecondaryAttributesExhausted {
                binding: BindingTag::MemoryConstantBase,
                requested: budget.end,
                available: caps.max_secondary_attributes,
            });
        }
        Ok(RegisterAllocator {
            temps: TempFreeList::default(),
            max_temporaries: caps.max_temporaries,
            load_immediate_bytes: caps.load_immediate_bytes,
            inputs: RegisterList::new(RegisterSpace::Input),
            outputs: RegisterList::new(RegisterSpace::Output),
            constants: ConstantList::new(budget, caps),
            compacted: false,
        })
    }

    pub fn alloc_temp(&mut self, size: u32) -> Result<Register, CompileError> {
        if size == 0 {
            return Err(CompileError::ZeroSizeAllocation {
                binding: BindingTag::Temp,
            });
        }
        let growth = self.temps.growth_for(size);
        if self.temps.current_size() + growth > self.max_temporaries {
            tracing::error!(
                "temporaries exhausted allocating {size} words, {} in use",
                self.temps.current_size()
            );
            return Err(CompileError::TemporariesExhausted {
                requested: size,
                in_use: self.temps.current_size(),
                limit: self.max_temporaries,
            });
        }
        let offset = self.temps.alloc(size);
        Ok(Register::new(
            RegisterSpace::Temp,
            offset,
            size,
            BindingTag::Temp,
        ))
    }

    /// Returns a temporary to the free list. Registers of the other spaces live as long as the
    /// program and are left alone.
    pub fn release_temp(&mut self, reg: Register) {
        if reg.is_temp() {
            self.temps.release(reg.offset, reg.size);
        }
    }

    pub fn current_temp_size(&self) -> u32 {
        self.temps.current_size()
    }

    pub fn temp_count(&self) -> u32 {
        self.temps.max_size()
    }

    /// The registered input or output for `binding`, allocating `size` words on first request.
    pub fn io_register(
        &mut self,
        space: RegisterSpace,
        binding: BindingTag,
        size: u32,
    ) -> Result<Register, CompileError> {
        let list = match space {
            RegisterSpace::Input => &mut self.inputs,
            RegisterSpace::Output => &mut self.outputs,
            _ => return Err(CompileError::Internal("io_register on a non-io space")),
        };
        if size == 0 {
            return Err(CompileError::ZeroSizeAllocation { binding });
        }
        Ok(match list.get(binding) {
            Some(reg) => reg,
            None => list.alloc(binding, size),
        })
    }

    pub fn lookup(&self, space: RegisterSpace, binding: BindingTag) -> Option<Register> {
        match space {
            RegisterSpace::Input => self.inputs.get(binding),
            RegisterSpace::Output => self.outputs.get(binding),
            RegisterSpace::Constant => self
                .constants
                .entries
                .get(&binding)
                .and_then(|entry| entry.register()),
            RegisterSpace::Temp => None,
        }
    }

    pub fn constant_entry(&self, binding: BindingTag) -> Option<ConstantEntry> {
        self.constants.entries.get(&binding).copied()
    }

    /// Finds or places a constant binding.
    ///
    /// Palettes are addressed through an index register so they go to the indexable window, or
    /// to memory when it cannot hold them. Everything else prefers the directly addressed
    /// secondary attributes, then the indexable window, then memory.
    pub fn place_constant(
        &mut self,
        binding: BindingTag,
        size: u32,
    ) -> Result<ConstantEntry, CompileError> {
        if let Some(entry) = self.constants.entries.get(&binding) {
            return Ok(*entry);
        }
        if size == 0 {
            return Err(CompileError::ZeroSizeAllocation { binding });
        }
        let list = &mut self.constants;
        let entry = if binding.is_palette() {
            list.try_indexable(binding, size)
                .unwrap_or_else(|| list.memory(binding, size))
        } else {
            list.try_secondary(binding, size)
                .or_else(|| list.try_indexable(binding, size))
                .unwrap_or_else(|| list.memory(binding, size))
        };
        tracing::trace!(
            "placed {binding} ({size} words) in {} at {}",
            entry.placement,
            entry.offset
        );
        list.entries.insert(binding, entry);
        Ok(entry)
    }

    /// Reserves storage for `binding` without loading it.
    ///
    /// With `indexable` set the binding must land in the indexable window.
    pub fn alloc_space(
        &mut self,
        space: RegisterSpace,
        binding: BindingTag,
        size: u32,
        indexable: bool,
    ) -> Result<Storage, CompileError> {
        match space {
            RegisterSpace::Temp => self.alloc_temp(size).map(Storage::Register),
            RegisterSpace::Input | RegisterSpace::Output => {
                self.io_register(space, binding, size).map(Storage::Register)
            }
            RegisterSpace::Constant => {
                if size == 0 {
                    return Err(CompileError::ZeroSizeAllocation { binding });
                }
                let entry = match self.constants.entries.get(&binding) {
                    Some(entry) => *entry,
                    None if indexable => {
                        let entry = self.constants.try_indexable(binding, size).ok_or_else(|| {
                            tracing::error!("indexable window cannot hold {binding}");
                            CompileError::IndexableWindowExhausted {
                                binding,
                                requested: size,
                            }
                        })?;
                        self.constants.entries.insert(binding, entry);
                        entry
                    }
                    None => self.place_constant(binding, size)?,
                };
                if indexable && entry.placement != ConstantPlacement::Indexable {
                    return Err(CompileError::IndexableWindowExhausted {
                        binding,
                        requested: size,
                    });
                }
                Ok(match entry.register() {
                    Some(reg) => Storage::Register(reg),
                    None => Storage::Memory {
                        offset: entry.offset,
                        size: entry.size,
                    },
                })
            }
        }
    }

    /// The host-owned secondary attribute holding the memory-constant buffer address.
    pub fn memory_base(&mut self) -> Register {
        let base = self.constants.base_address;
        let entry = *self
            .constants
            .entries
            .entry(BindingTag::MemoryConstantBase)
            .or_insert(ConstantEntry {
                binding: BindingTag::MemoryConstantBase,
                placement: ConstantPlacement::Secondary,
                offset: base,
                size: 1,
            });
        Register::new(RegisterSpace::Constant, entry.offset, 1, entry.binding)
    }

    /// Bytes the host adds to the memory-constant buffer address before writing it to the base
    /// register, so signed load offsets reach the whole first immediate range.
    pub fn memory_base_adjust(&self) -> i32 {
        if self.constants.memory_next > 0 {
            self.load_immediate_bytes as i32
        } else {
            0
        }
    }

    /// Moves the indexable allocations down to sit right after the directly addressed secondary
    /// attributes and returns the relocation every operand must go through.
    pub fn patch_indexable_secondaries(&mut self) -> Relocation {
        let Some(window) = self.constants.window else {
            return Relocation::identity();
        };
        if self.compacted || self.constants.indexable_size() == 0 {
            return Relocation::identity();
        }
        let new_base = align4(self.constants.sa_next);
        let relocation = Relocation {
            indexable_from: window.base,
            indexable_to: new_base,
        };
        for entry in self.constants.entries.values_mut() {
            if entry.placement == ConstantPlacement::Indexable {
                entry.offset = entry.offset - window.base + new_base;
            }
        }
        tracing::debug!(
            "compacted {} indexable words from sa{} to sa{new_base}",
            self.constants.indexable_size(),
            window.base
        );
        self.constants.indexable_next = self.constants.indexable_next - window.base + new_base;
        self.constants.window = Some(IndexableWindow {
            base: new_base,
            words: window.words,
        });
        self.compacted = true;
        relocation
    }

    pub fn input_usage(&self) -> Vec<RegisterUsage> {
        self.inputs.usage()
    }

    pub fn output_usage(&self) -> Vec<RegisterUsage> {
        self.outputs.usage()
    }

    pub fn constant_usage(&self) -> Vec<ConstantUsage> {
        self.constants
            .entries
            .values()
            .map(|entry| ConstantUsage {
                binding: entry.binding,
                placement: entry.placement,
                offset: entry.offset,
                size: entry.size,
            })
            .collect()
    }

    /// Words of the secondary attribute bank from the start of the budget to the last one used.
    pub fn secondary_attribute_size(&self) -> u32 {
        let list = &self.constants;
        let end = match list.window {
            Some(_) if list.indexable_size() > 0 => list.indexable_next,
            _ => list.sa_next,
        };
        end - list.sa_start
    }

    pub fn memory_constant_size(&self) -> u32 {
        self.constants.memory_next
    }

    pub fn output_size(&self) -> u32 {
        self.outputs.next
    }

    /// Index register used for the `n`th concurrently indexed palette.
    pub fn index_register(n: usize) -> IndexRegister {
        if n % 2 == 0 {
            IndexRegister::Low
        } else {
            IndexRegister::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffgen_types::Target;

    fn allocator(target: Target, end: u32) -> RegisterAllocator {
        let budget = SecondaryBudget {
            start: 4,
            end,
            base_address: 0,
        };
        RegisterAllocator::new(&budget, &Capabilities::for_target(target)).unwrap()
    }

    #[test]
    fn constants_fill_secondaries_then_window_then_memory() {
        let mut regs = allocator(Target::Sgx535, 40);
        let mvp = regs.place_constant(BindingTag::ModelViewProjection, 16).unwrap();
        assert_eq!(mvp.placement, ConstantPlacement::Secondary);
        assert_eq!(mvp.offset, 4);
        let mv = regs.place_constant(BindingTag::ModelView, 16).unwrap();
        assert_eq!(mv.offset, 20);
        // 36..40 is too small for another matrix.
        let proj = regs.place_constant(BindingTag::Projection, 16).unwrap();
        assert_eq!(proj.placement, ConstantPlacement::Indexable);
        assert_eq!(proj.offset, 128);

        let palette = regs.place_constant(BindingTag::MatrixPalette(9), 144).unwrap();
        assert_eq!(palette.placement, ConstantPlacement::Memory);
        assert_eq!(palette.offset, 0);
        assert_eq!(regs.memory_constant_size(), 144);
        assert_eq!(regs.memory_base_adjust(), 252);
    }

    #[test]
    fn placement_is_stable_on_reacquire() {
        let mut regs = allocator(Target::Sgx535, 128);
        let first = regs.place_constant(BindingTag::FogParams, 4).unwrap();
        let again = regs.place_constant(BindingTag::FogParams, 4).unwrap();
        assert_eq!(first, again);
        assert_eq!(
            regs.lookup(RegisterSpace::Constant, BindingTag::FogParams),
            first.register()
        );
    }

    #[test]
    fn io_registers_are_vec4_aligned() {
        let mut regs = allocator(Target::Sgx535, 128);
        let fog = regs
            .io_register(RegisterSpace::Output, BindingTag::OutputFog, 1)
            .unwrap();
        let pos = regs
            .io_register(RegisterSpace::Output, BindingTag::OutputPosition, 4)
            .unwrap();
        let psize = regs
            .io_register(RegisterSpace::Output, BindingTag::OutputPointSize, 1)
            .unwrap();
        assert_eq!((fog.offset, pos.offset, psize.offset), (0, 4, 8));
        assert_eq!(regs.output_size(), 9);
    }

    #[test]
    fn temp_limit_is_enforced() {
        let mut regs = allocator(Target::Sgx530, 128);
        let a = regs.alloc_temp(60).unwrap();
        assert!(matches!(
            regs.alloc_temp(8),
            Err(CompileError::TemporariesExhausted { .. })
        ));
        regs.release_temp(a);
        assert_eq!(regs.current_temp_size(), 0);
        assert_eq!(regs.temp_count(), 60);
        assert!(matches!(
            regs.alloc_temp(0),
            Err(CompileError::ZeroSizeAllocation { .. })
        ));
    }

    #[test]
    fn strict_indexable_space() {
        let mut regs = allocator(Target::Sgx530, 128);
        assert!(matches!(
            regs.alloc_space(RegisterSpace::Constant, BindingTag::MatrixPalette(2), 32, true),
            Err(CompileError::IndexableWindowExhausted { .. })
        ));

        let mut regs = allocator(Target::Sgx540, 128);
        let storage = regs
            .alloc_space(RegisterSpace::Constant, BindingTag::MatrixPalette(2), 32, true)
            .unwrap();
        assert!(matches!(storage, Storage::Register(reg) if reg.indexable && reg.offset == 128));
    }

    #[test]
    fn compaction_relocates_indexable_operands() {
        let mut regs = allocator(Target::Sgx540, 128);
        regs.place_constant(BindingTag::ModelViewProjection, 16).unwrap();
        regs.place_constant(BindingTag::FogParams, 4).unwrap();
        let palette = regs
            .place_constant(BindingTag::MatrixPalette(2), 32)
            .unwrap()
            .register()
            .unwrap();
        assert_eq!(palette.offset, 128);

        let relocation = regs.patch_indexable_secondaries();
        assert_eq!(relocation.register_offset(&palette.at(5)), 24 + 5);
        assert_eq!(relocation.indexable_base(128), 24);
        let indexed = Register {
            index: Some(IndexRegister::Low),
            offset: 4,
            ..palette
        };
        assert_eq!(relocation.register_offset(&indexed), 4);
        assert_eq!(
            regs.constant_entry(BindingTag::MatrixPalette(2)).unwrap().offset,
            24
        );
        assert_eq!(regs.secondary_attribute_size(), 24 + 32 - 4);

        // A second patch is a no-op.
        assert!(regs.patch_indexable_secondaries().is_identity());
    }

    #[test]
    fn budget_beyond_hardware_is_rejected() {
        let budget = SecondaryBudget {
            start: 4,
            end: 200,
            base_address: 0,
        };
        assert!(matches!(
            RegisterAllocator::new(&budget, &Capabilities::for_target(Target::Sgx530)),
            Err(CompileError::SecondaryAttributesExhausted { .. })
        ));
    }
}
