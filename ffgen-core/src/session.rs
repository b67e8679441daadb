use crate::{
    asm_generation::{
        Assembler, AsmBuilder, GeneratedProgram, LabelResolver, LoweredProgram, ProgramCode,
    },
    asm_lang::{Instruction, Operand},
    build_config::{BuildConfig, CodegenMode, OutputKind},
    register_allocation::{
        DataReadyChannels, Register, RegisterAllocator, RegisterSpace, Relocation,
    },
};

use ffgen_error::{error::CompileError, handler::Handler, warning::Warning};
use ffgen_types::{BindingTag, Capabilities, Feature, Features, PipelineDescriptor};

/// Values computed by one pass and reused by later ones.
///
/// | value | produced by | consumed by |
/// |---|---|---|
/// | `eye_position` | transform | clip, fog, eye vector, point size, lighting, texturing |
/// | `eye_normal` | transform | lighting, texturing |
/// | `eye_vector`, `eye_distance` | eye vector | fog, point size, lighting, texturing |
/// | `reflection_vector` | texturing | texturing |
///
/// Whatever is still held when the last pass finishes is released by the driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct CarriedValues {
    pub eye_position: Option<Register>,
    pub eye_normal: Option<Register>,
    /// Normalised vertex-to-eye vector.
    pub eye_vector: Option<Register>,
    /// Distance from the eye to the vertex.
    pub eye_distance: Option<Register>,
    pub reflection_vector: Option<Register>,
}

impl CarriedValues {
    fn take_all(&mut self) -> impl Iterator<Item = Register> {
        [
            self.eye_position.take(),
            self.eye_normal.take(),
            self.eye_vector.take(),
            self.eye_distance.take(),
            self.reflection_vector.take(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Everything needed to generate one program.
pub struct CompilationSession<'a> {
    pub(crate) desc: &'a PipelineDescriptor,
    pub(crate) config: &'a BuildConfig,
    pub(crate) caps: Capabilities,
    pub(crate) registers: RegisterAllocator,
    pub(crate) asm: AsmBuilder,
    pub(crate) carried: CarriedValues,
    /// Enabled features not yet handled by a pass.
    pub(crate) features: Features,
    pub(crate) handler: Handler,
    pub(crate) drc: DataReadyChannels,
    /// Name of the running pass, attached to warnings.
    pub(crate) pass: &'static str,
}

impl<'a> CompilationSession<'a> {
    pub fn new(
        desc: &'a PipelineDescriptor,
        config: &'a BuildConfig,
    ) -> Result<Self, CompileError> {
        let caps = config.caps().clone();
        Ok(CompilationSession {
            desc,
            config,
            registers: RegisterAllocator::new(&desc.secondary, &caps)?,
            asm: AsmBuilder::new(config.codegen_mode(), config.output_kind())
                .print_intermediate_asm(config.print_intermediate_asm),
            drc: DataReadyChannels::new(caps.data_ready_channels),
            caps,
            carried: CarriedValues::default(),
            features: desc.features.clone(),
            handler: Handler::default(),
            pass: "",
        })
    }

    /// Marks `feature` as handled, returning whether it was enabled.
    pub(crate) fn consume(&mut self, feature: Feature) -> bool {
        self.features.remove(feature)
    }

    pub(crate) fn consume_all(&mut self, features: &[Feature]) {
        for feature in features {
            self.features.remove(*feature);
        }
    }

    /// Reports a malformed descriptor condition.
    pub(crate) fn warn(&mut self, warning: Warning) {
        tracing::warn!(pass = self.pass, "{warning}");
        self.handler.emit_warn(self.pass, warning);
    }

    pub(crate) fn emit(&mut self, mut inst: Instruction) -> Result<(), CompileError> {
        let scratch = self.fixup_operand_zero_register(&mut inst)?;
        self.asm.push(inst)?;
        if let Some(scratch) = scratch {
            self.registers.release_temp(scratch);
        }
        Ok(())
    }

    /// Multiply, add and multiply-add can only read their first source from a temporary or a
    /// primary attribute. Anything else is copied to a temporary first; the copy is returned so
    /// it can be released once the instruction is emitted.
    fn fixup_operand_zero_register(
        &mut self,
        inst: &mut Instruction,
    ) -> Result<Option<Register>, CompileError> {
        if self.config.output_kind() != OutputKind::Hardware || !inst.opcode.requires_temp_src0()
        {
            return Ok(None);
        }
        let Some(Operand::Reg(src0, flags)) = inst.operands.get(1).copied() else {
            return Ok(None);
        };
        if matches!(src0.space, RegisterSpace::Temp | RegisterSpace::Input) {
            return Ok(None);
        }
        let scratch = self.registers.alloc_temp(src0.size)?;
        self.asm.push(Instruction::mov(scratch, src0))?;
        inst.operands[1] = Operand::Reg(scratch, flags);
        Ok(Some(scratch))
    }

    pub(crate) fn comment(&mut self, text: impl Into<String>) -> Result<(), CompileError> {
        self.emit(Instruction::annotation(text))
    }

    pub(crate) fn new_block(&mut self, name: impl Into<String>) -> Result<(), CompileError> {
        self.emit(Instruction::block(name))
    }

    pub(crate) fn setup_no_sched(&mut self) -> u32 {
        let padded = self.asm.setup_no_sched(&self.caps);
        if padded > 0 {
            tracing::trace!("padded {padded} no-reschedule nops");
        }
        padded
    }

    pub(crate) fn alloc_temp(&mut self, size: u32) -> Result<Register, CompileError> {
        self.registers.alloc_temp(size)
    }

    /// Releases a register obtained from a pass helper. Only temporaries are affected.
    pub(crate) fn release(&mut self, reg: Register) {
        self.registers.release_temp(reg);
    }

    pub(crate) fn release_all(&mut self, regs: impl IntoIterator<Item = Register>) {
        for reg in regs {
            self.release(reg);
        }
    }

    pub(crate) fn input(&mut self, binding: BindingTag, size: u32) -> Result<Register, CompileError> {
        self.get_or_alloc(RegisterSpace::Input, binding, 0, size, None)
    }

    /// An output assigned by the output layout pass.
    pub(crate) fn output(&self, binding: BindingTag) -> Result<Register, CompileError> {
        self.registers
            .lookup(RegisterSpace::Output, binding)
            .ok_or(CompileError::Internal("output register was never assigned"))
    }

    /// A whole constant binding. Release the result when done with it.
    pub(crate) fn constant(&mut self, binding: BindingTag) -> Result<Register, CompileError> {
        let size = binding
            .constant_size()
            .ok_or(CompileError::Internal("constant requested for a non-constant binding"))?;
        self.get_or_alloc(RegisterSpace::Constant, binding, 0, size, None)
    }

    /// Part of a constant binding. Release the result when done with it.
    pub(crate) fn constant_view(
        &mut self,
        binding: BindingTag,
        word: u32,
        size: u32,
    ) -> Result<Register, CompileError> {
        self.get_or_alloc(RegisterSpace::Constant, binding, word, size, None)
    }

    /// One of the well-known values of [`BindingTag::FixedValues`].
    pub(crate) fn fixed(&mut self, word: u32) -> Result<Register, CompileError> {
        self.constant_view(BindingTag::FixedValues, word, 1)
    }

    pub(crate) fn has(&self, feature: Feature) -> bool {
        self.desc.has(feature)
    }

    pub(crate) fn release_carried(&mut self) {
        let carried = self.carried.take_all().collect::<Vec<_>>();
        self.release_all(carried);
    }

    /// Encodes the program and collects the register usage tables.
    pub(crate) fn finish(
        mut self,
        assembler: &mut dyn Assembler,
    ) -> Result<GeneratedProgram, CompileError> {
        self.release_carried();
        if !self.features.is_empty() {
            let features = self.features.iter().collect::<Vec<_>>();
            if self.config.verify_feature_coverage {
                tracing::error!("features left unhandled: {}", self.features);
                return Err(CompileError::UnconsumedFeatures { features });
            }
            tracing::warn!("features left unhandled: {}", self.features);
        }
        if self.registers.current_temp_size() != 0 {
            tracing::debug!(
                "{} temporary words still live at the end of generation",
                self.registers.current_temp_size()
            );
        }

        let relocation = match self.config.codegen_mode() {
            CodegenMode::TwoPass => self.registers.patch_indexable_secondaries(),
            CodegenMode::OnePass => Relocation::identity(),
        };
        let (program, mut labels) = self.asm.finish(&relocation)?;
        let code = match program {
            LoweredProgram::Hardware(instructions) => {
                let labels: &mut dyn LabelResolver = &mut labels;
                let assembled = assembler.assemble(&instructions, &self.caps, labels)?;
                ProgramCode::Hardware {
                    words: assembled.words,
                    instruction_count: assembled.instruction_count,
                    instructions,
                }
            }
            LoweredProgram::Uniflex(instructions) => ProgramCode::Uniflex(instructions),
        };

        let program = GeneratedProgram {
            code,
            labels: labels.names().to_vec(),
            inputs: self.registers.input_usage(),
            outputs: self.registers.output_usage(),
            constants: self.registers.constant_usage(),
            temp_count: self.registers.temp_count(),
            secondary_attribute_size: self.registers.secondary_attribute_size(),
            memory_constant_size: self.registers.memory_constant_size(),
            memory_constant_base_adjust: self.registers.memory_base_adjust(),
            warnings: self.handler.consume(),
        };
        if self.config.print_finalized_asm {
            tracing::info!("{program}");
        }
        Ok(program)
    }
}
