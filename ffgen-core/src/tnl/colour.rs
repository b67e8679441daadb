//! Vertex colours copied through when lighting does not compute them.

use crate::{asm_lang::Instruction, session::CompilationSession};

use ffgen_error::error::CompileError;
use ffgen_types::{BindingTag, Feature};

pub(super) fn colour(s: &mut CompilationSession) -> Result<(), CompileError> {
    let copies = [
        (
            Feature::PassthroughColour0,
            BindingTag::InputColour0,
            BindingTag::OutputFrontColour0,
        ),
        (
            Feature::PassthroughColour1,
            BindingTag::InputColour1,
            BindingTag::OutputFrontColour1,
        ),
    ];
    for (feature, input, output) in copies {
        if s.consume(feature) {
            let colour = s.input(input, 4)?;
            let out = s.output(output)?;
            s.emit(Instruction::mov(out, colour))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, listing};
    use ffgen_types::{Feature, PipelineDescriptor, Target};

    #[test]
    fn both_colours_are_copied() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::PassthroughColour0)
            .with_feature(Feature::PassthroughColour1);
        let program = compile(&desc, Target::Sgx530);
        // The first line moves the untransformed position.
        assert_eq!(
            listing(&program)[1..],
            [
                "    mov.r4 o4, pa4",
                "    mov.r4 o8, pa8",
                "    end",
            ]
        );
    }
}
