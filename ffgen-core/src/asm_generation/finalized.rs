use crate::{
    asm_lang::HwInstruction,
    register_allocation::{ConstantUsage, RegisterUsage},
    uniflex::UfInstruction,
};

use ffgen_error::warning::CompileWarning;

use std::fmt;

/// The code of a generated program.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgramCode {
    Hardware {
        words: Vec<u32>,
        instruction_count: u32,
        /// The instructions the words were assembled from, kept for listings.
        instructions: Vec<HwInstruction>,
    },
    Uniflex(Vec<UfInstruction>),
}

impl ProgramCode {
    /// Number of executable instructions.
    pub fn instruction_count(&self) -> usize {
        match self {
            ProgramCode::Hardware {
                instruction_count, ..
            } => *instruction_count as usize,
            ProgramCode::Uniflex(code) => code.len(),
        }
    }
}

/// A compiled pipeline and everything the host needs to bind state to it.
#[derive(Clone, Debug)]
pub struct GeneratedProgram {
    pub code: ProgramCode,
    /// Label names, indexed by label id.
    pub labels: Vec<String>,
    pub inputs: Vec<RegisterUsage>,
    pub outputs: Vec<RegisterUsage>,
    pub constants: Vec<ConstantUsage>,
    /// Temporary registers the program needs.
    pub temp_count: u32,
    pub secondary_attribute_size: u32,
    pub memory_constant_size: u32,
    /// Bytes the host adds to the memory-constant buffer address before binding it.
    pub memory_constant_base_adjust: i32,
    pub warnings: Vec<CompileWarning>,
}

impl GeneratedProgram {
    /// Hardware instructions, annotations included. Empty for portable output.
    pub fn hw_instructions(&self) -> &[HwInstruction] {
        match &self.code {
            ProgramCode::Hardware { instructions, .. } => instructions,
            ProgramCode::Uniflex(_) => &[],
        }
    }

    pub fn words(&self) -> &[u32] {
        match &self.code {
            ProgramCode::Hardware { words, .. } => words,
            ProgramCode::Uniflex(_) => &[],
        }
    }
}

impl fmt::Display for GeneratedProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, ";; inputs")?;
        for usage in &self.inputs {
            writeln!(f, ";;   pa{:<4} {:<24} {} words", usage.offset, usage.binding, usage.size)?;
        }
        writeln!(f, ";; outputs")?;
        for usage in &self.outputs {
            writeln!(f, ";;   o{:<5} {:<24} {} words", usage.offset, usage.binding, usage.size)?;
        }
        writeln!(f, ";; constants")?;
        for usage in &self.constants {
            writeln!(
                f,
                ";;   {:<10} {:<6} {:<24} {} words",
                usage.placement, usage.offset, usage.binding, usage.size
            )?;
        }
        writeln!(
            f,
            ";; temporaries: {}, secondary attributes: {}, memory constants: {} (base adjust {})",
            self.temp_count,
            self.secondary_attribute_size,
            self.memory_constant_size,
            self.memory_constant_base_adjust
        )?;
        match &self.code {
            ProgramCode::Hardware {
                instructions,
                instruction_count,
                words,
            } => {
                writeln!(
                    f,
                    ";; {instruction_count} instructions, {} words",
                    words.len()
                )?;
                for inst in instructions {
                    writeln!(f, "{inst}")?;
                }
            }
            ProgramCode::Uniflex(code) => {
                writeln!(f, ";; {} portable instructions", code.len())?;
                for inst in code {
                    writeln!(f, "{inst}")?;
                }
            }
        }
        for warning in &self.warnings {
            writeln!(f, ";; warning: {warning}")?;
        }
        Ok(())
    }
}
