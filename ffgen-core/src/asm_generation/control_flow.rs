//! Labels and the single-entry single-exit predicated blocks the passes are built from.

use crate::{
    asm_lang::{Instruction, LabelId, Predicate},
    session::CompilationSession,
};

use ffgen_error::error::CompileError;

pub const MAX_LABELS: usize = 256;
pub const MAX_BRANCH_NESTING: usize = 2;

/// Resolves labels to instruction addresses while a program is encoded.
pub trait LabelResolver {
    fn get_label_address(&self, label: LabelId) -> Option<u32>;
    fn set_label_address(&mut self, label: LabelId, address: u32);
}

/// The labels of one program. Owned by the session and consulted by the assembler.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    names: Vec<String>,
    addresses: Vec<Option<u32>>,
}

impl LabelTable {
    pub fn alloc(&mut self, name: impl Into<String>) -> Result<LabelId, CompileError> {
        if self.names.len() >= MAX_LABELS {
            tracing::error!("label table full");
            return Err(CompileError::LabelTableFull { limit: MAX_LABELS });
        }
        self.names.push(name.into());
        self.addresses.push(None);
        Ok(LabelId(self.names.len() as u32 - 1))
    }

    pub fn name(&self, label: LabelId) -> Option<&str> {
        self.names.get(label.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl LabelResolver for LabelTable {
    fn get_label_address(&self, label: LabelId) -> Option<u32> {
        self.addresses.get(label.0 as usize).copied().flatten()
    }

    fn set_label_address(&mut self, label: LabelId, address: u32) {
        if let Some(slot) = self.addresses.get_mut(label.0 as usize) {
            *slot = Some(address);
        }
    }
}

/// An open predicated block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BranchFrame {
    /// Where control goes when the predicate is false.
    skip: LabelId,
    /// Set once the block has an else part.
    end: Option<LabelId>,
}

impl BranchFrame {
    pub(crate) fn open(skip: LabelId) -> Self {
        BranchFrame { skip, end: None }
    }
}

impl CompilationSession<'_> {
    /// Allocates a label without placing it.
    pub(crate) fn new_label(&mut self, name: impl Into<String>) -> Result<LabelId, CompileError> {
        self.asm.labels.alloc(name)
    }

    pub(crate) fn place_label(&mut self, label: LabelId) -> Result<(), CompileError> {
        let name = self.asm.labels.name(label).unwrap_or_default().to_string();
        self.emit(Instruction::label(label).with_comment(name))
    }

    /// Opens a block executed only when predicate `reg` is set.
    pub(crate) fn if_pred(&mut self, reg: u8) -> Result<(), CompileError> {
        if self.asm.branches.len() >= MAX_BRANCH_NESTING {
            tracing::error!("predicated blocks nested deeper than {MAX_BRANCH_NESTING}");
            return Err(CompileError::BranchNestingTooDeep {
                max: MAX_BRANCH_NESTING,
            });
        }
        let skip = self.new_label(format!("IfNotP{reg}"))?;
        self.emit(Instruction::branch(skip).with_predicate(Predicate::new(reg).negated()))?;
        self.asm.branches.push(BranchFrame::open(skip));
        Ok(())
    }

    /// Starts the part of the innermost block run when its predicate is clear.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn else_pred(&mut self) -> Result<(), CompileError> {
        let frame = match self.asm.branches.last().copied() {
            Some(frame) if frame.end.is_none() => frame,
            _ => return Err(CompileError::UnbalancedBranch { what: "else" }),
        };
        let end = self.new_label("EndIf")?;
        self.emit(Instruction::branch(end))?;
        self.place_label(frame.skip)?;
        if let Some(top) = self.asm.branches.last_mut() {
            top.end = Some(end);
        }
        Ok(())
    }

    pub(crate) fn end_pred(&mut self) -> Result<(), CompileError> {
        let frame = self
            .asm
            .branches
            .pop()
            .ok_or(CompileError::UnbalancedBranch { what: "end" })?;
        self.place_label(frame.end.unwrap_or(frame.skip))
    }
}
