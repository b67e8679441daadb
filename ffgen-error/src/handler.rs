use crate::warning::{CompileWarning, Warning};

/// Collects the warnings raised while generating one program.
#[derive(Default, Debug)]
pub struct Handler {
    warnings: Vec<CompileWarning>,
}

impl Handler {
    /// Records a warning, repeated warnings from the same pass are kept once.
    pub fn emit_warn(&mut self, pass: &'static str, warning_content: Warning) {
        let warning = CompileWarning {
            pass,
            warning_content,
        };
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    /// Extracts all the warnings from this handler.
    pub fn consume(self) -> Vec<CompileWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_warnings_are_kept_once() {
        let mut handler = Handler::default();
        handler.emit_warn("clip", Warning::EmptyClipPlaneMask);
        handler.emit_warn("clip", Warning::EmptyClipPlaneMask);
        handler.emit_warn("fog", Warning::MissingFogCoordinateSource);
        let warnings = handler.consume();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].pass, "clip");
        assert!(warnings[1].to_string().starts_with("fog: Fog is enabled"));
    }
}
