//! Output redirection and the end of the program.

use crate::{
    asm_lang::Instruction,
    register_allocation::{Register, RegisterSpace},
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::{BindingTag, Feature};

/// Writes every output to the redirect buffer when redirection is enabled, then ends the
/// program.
pub(super) fn finish_program(s: &mut CompilationSession) -> Result<(), CompileError> {
    if s.consume(Feature::OutputRedirection) {
        let base = s.constant(BindingTag::RedirectAddress)?;
        for usage in s.registers.output_usage() {
            let output = Register::new(
                RegisterSpace::Output,
                usage.offset,
                usage.size,
                usage.binding,
            );
            s.store_constant(output, base, i64::from(usage.offset) * 4)?;
        }
        s.release(base);
    }
    s.wait_for_loads()?;
    s.emit(Instruction::end())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, listing, opcodes};
    use crate::asm_lang::Opcode;
    use ffgen_types::{BindingTag, Feature, PipelineDescriptor, Target};

    #[test]
    fn redirected_outputs_are_stored() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::OutputRedirection)
            .with_feature(Feature::PassthroughColour0);
        let program = compile(&desc, Target::Sgx535);
        assert_eq!(
            opcodes(&program),
            vec![Opcode::Mov, Opcode::Mov, Opcode::St, Opcode::St, Opcode::End]
        );
        let lines = listing(&program);
        assert!(lines[2].starts_with("    st.r4 sa4, #0, o0"));
        assert!(lines[3].starts_with("    st.r4 sa4, #16, o4"));
        assert!(program
            .constants
            .iter()
            .any(|usage| usage.binding == BindingTag::RedirectAddress));
    }

    #[test]
    fn every_program_ends() {
        let program = compile(&PipelineDescriptor::default(), Target::Sgx545);
        assert_eq!(opcodes(&program).last(), Some(&Opcode::End));
    }
}
