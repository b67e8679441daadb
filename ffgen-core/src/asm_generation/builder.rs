use super::{
    control_flow::{BranchFrame, LabelTable},
    lowering::lower_instruction,
    scheduling::setup_no_sched,
};
use crate::{
    asm_lang::{HwInstruction, Instruction, Opcode},
    build_config::{CodegenMode, OutputKind},
    register_allocation::Relocation,
    uniflex::{to_uniflex, UfInstruction},
};

use ffgen_error::error::CompileError;
use ffgen_types::Capabilities;

/// The lowered program, in whichever form was asked for.
#[derive(Clone, Debug, PartialEq)]
pub enum LoweredProgram {
    Hardware(Vec<HwInstruction>),
    Uniflex(Vec<UfInstruction>),
}

/// The instruction buffer.
///
/// In one-pass mode every instruction is lowered as it is emitted. In two-pass mode the
/// instructions are stored with their operands as they were at emission and lowered by
/// [`AsmBuilder::finish`] once register placement is final.
#[derive(Debug)]
pub struct AsmBuilder {
    mode: CodegenMode,
    output: OutputKind,
    stored: Vec<Instruction>,
    lowered: Vec<HwInstruction>,
    uniflex: Vec<UfInstruction>,
    pub(crate) labels: LabelTable,
    pub(crate) branches: Vec<BranchFrame>,
    print_intermediate_asm: bool,
}

impl AsmBuilder {
    pub fn new(mode: CodegenMode, output: OutputKind) -> Self {
        AsmBuilder {
            mode,
            output,
            stored: Vec::new(),
            lowered: Vec::new(),
            uniflex: Vec::new(),
            labels: LabelTable::default(),
            branches: Vec::new(),
            print_intermediate_asm: false,
        }
    }

    pub(crate) fn print_intermediate_asm(self, a: bool) -> Self {
        Self {
            print_intermediate_asm: a,
            ..self
        }
    }

    pub fn mode(&self) -> CodegenMode {
        self.mode
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Appends one instruction to the program.
    pub fn push(&mut self, inst: Instruction) -> Result<(), CompileError> {
        tracing::trace!("{inst}");
        if self.print_intermediate_asm && self.mode == CodegenMode::OnePass {
            tracing::info!("{inst}");
        }
        match (self.mode, self.output) {
            (CodegenMode::TwoPass, _) => self.stored.push(inst),
            (CodegenMode::OnePass, OutputKind::Hardware) => self
                .lowered
                .push(lower_instruction(&inst, &Relocation::identity())?),
            (CodegenMode::OnePass, OutputKind::Uniflex) => self
                .uniflex
                .extend(to_uniflex(&inst, &Relocation::identity())?),
        }
        Ok(())
    }

    /// Pins the thread before the next instruction. See [`setup_no_sched`].
    ///
    /// The portable form has no scheduler hazards, so nothing is done for it.
    pub fn setup_no_sched(&mut self, caps: &Capabilities) -> u32 {
        let (lookback, padding) = (caps.no_sched_lookback, caps.no_sched_padding);
        match (self.mode, self.output) {
            (_, OutputKind::Uniflex) => 0,
            (CodegenMode::TwoPass, _) => setup_no_sched(&mut self.stored, lookback, padding),
            (CodegenMode::OnePass, _) => setup_no_sched(&mut self.lowered, lookback, padding),
        }
    }

    /// Opcodes emitted so far, annotations excluded.
    pub fn opcodes(&self) -> Vec<Opcode> {
        match (self.mode, self.output) {
            (CodegenMode::TwoPass, _) => self.stored.iter().map(|i| i.opcode).collect(),
            (CodegenMode::OnePass, OutputKind::Hardware) => {
                self.lowered.iter().map(|i| i.opcode).collect()
            }
            (CodegenMode::OnePass, OutputKind::Uniflex) => Vec::new(),
        }
        .into_iter()
        .filter(|op| !op.is_annotation())
        .collect()
    }

    /// Number of instructions emitted so far, annotations included.
    pub fn len(&self) -> usize {
        match (self.mode, self.output) {
            (CodegenMode::TwoPass, _) => self.stored.len(),
            (CodegenMode::OnePass, OutputKind::Hardware) => self.lowered.len(),
            (CodegenMode::OnePass, OutputKind::Uniflex) => self.uniflex.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn hw_stream(&self) -> Option<&[HwInstruction]> {
        match (self.mode, self.output) {
            (CodegenMode::OnePass, OutputKind::Hardware) => Some(&self.lowered),
            _ => None,
        }
    }

    /// The stored instructions of a two-pass build.
    pub fn stored(&self) -> &[Instruction] {
        &self.stored
    }

    /// Lowers whatever is left and hands back the finished program.
    ///
    /// Replay is a pure function of the stored list and `relocation`, so a two-pass build emits
    /// exactly the instructions a one-pass build would, differing only in operand numbers.
    pub fn finish(
        self,
        relocation: &Relocation,
    ) -> Result<(LoweredProgram, LabelTable), CompileError> {
        if !self.branches.is_empty() {
            return Err(CompileError::UnterminatedBranch);
        }
        if self.print_intermediate_asm && self.mode == CodegenMode::TwoPass {
            tracing::info!(";; --- intermediate instructions ---");
            for inst in &self.stored {
                tracing::info!("{inst}");
            }
        }
        let program = match (self.mode, self.output) {
            (CodegenMode::OnePass, OutputKind::Hardware) => LoweredProgram::Hardware(self.lowered),
            (CodegenMode::OnePass, OutputKind::Uniflex) => LoweredProgram::Uniflex(self.uniflex),
            (CodegenMode::TwoPass, OutputKind::Hardware) => LoweredProgram::Hardware(
                self.stored
                    .iter()
                    .map(|inst| lower_instruction(inst, relocation))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (CodegenMode::TwoPass, OutputKind::Uniflex) => {
                let mut code = Vec::new();
                for inst in &self.stored {
                    code.extend(to_uniflex(inst, relocation)?);
                }
                LoweredProgram::Uniflex(code)
            }
        };
        Ok((program, self.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_allocation::{Register, RegisterSpace};
    use ffgen_types::BindingTag;

    fn sample() -> Vec<Instruction> {
        let t = Register::new(RegisterSpace::Temp, 0, 4, BindingTag::Temp);
        let c = Register::new(RegisterSpace::Constant, 8, 4, BindingTag::FogParams);
        vec![
            Instruction::block("sample"),
            Instruction::mov(t, c),
            Instruction::alu(Opcode::Mul, t, [t, c]),
            Instruction::end(),
        ]
    }

    #[test]
    fn one_and_two_pass_agree() {
        let mut one = AsmBuilder::new(CodegenMode::OnePass, OutputKind::Hardware);
        let mut two = AsmBuilder::new(CodegenMode::TwoPass, OutputKind::Hardware);
        for inst in sample() {
            one.push(inst.clone()).unwrap();
            two.push(inst).unwrap();
        }
        assert_eq!(one.opcodes(), two.opcodes());
        assert_eq!(two.stored().len(), 4);
        let (one, _) = one.finish(&Relocation::identity()).unwrap();
        let (two, _) = two.finish(&Relocation::identity()).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn open_blocks_fail_finish() {
        let mut builder = AsmBuilder::new(CodegenMode::OnePass, OutputKind::Hardware);
        let label = builder.labels.alloc("skip").unwrap();
        builder.branches.push(BranchFrame::open(label));
        assert!(matches!(
            builder.finish(&Relocation::identity()),
            Err(CompileError::UnterminatedBranch)
        ));
    }
}
