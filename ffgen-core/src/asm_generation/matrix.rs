//! Matrix-vector products, lowered according to the core's arithmetic units.

use crate::{
    asm_lang::{EfoMode, Instruction, Opcode, SpecialReg},
    build_config::OutputKind,
    register_allocation::{Register, RegisterSpace},
    session::CompilationSession,
};

use ffgen_error::error::CompileError;
use ffgen_types::MatrixLowering;

/// Rows of an EFO chain that are seeded before the first finish.
const EFO_SEEDED_ROWS: u32 = 3;

impl CompilationSession<'_> {
    /// `dst[r] = dot(matrix row r, src)` for the leading `rows` rows and `cols` columns.
    ///
    /// Matrix rows are four words apart whatever `cols` is. `src` may alias `dst`, in which case
    /// it is copied aside first.
    pub(crate) fn matrix_transform(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
        rows: u32,
        cols: u32,
    ) -> Result<(), CompileError> {
        if dst.size < rows || src.size < cols || matrix.size < (rows - 1) * 4 + cols {
            return Err(CompileError::Internal("matrix operand too small"));
        }
        let copy = if src.overlaps(&dst) {
            let copy = self.alloc_temp(cols)?;
            self.emit(Instruction::mov(copy, src.first(cols)).with_comment("source aliases dest"))?;
            Some(copy)
        } else {
            None
        };
        let src = copy.unwrap_or(src);

        let lowering = match self.config.output_kind() {
            OutputKind::Uniflex => MatrixLowering::Dot,
            OutputKind::Hardware => self.caps.matrix_lowering(rows, cols),
        };
        match lowering {
            MatrixLowering::Vector => self.matrix_vector(dst, src, matrix, rows, cols)?,
            MatrixLowering::Efo => self.matrix_efo(dst, src, matrix, rows)?,
            MatrixLowering::Dot => self.matrix_dot(dst, src, matrix, rows, cols)?,
        }

        if let Some(copy) = copy {
            self.release(copy);
        }
        Ok(())
    }

    pub(crate) fn m4x4(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
    ) -> Result<(), CompileError> {
        self.matrix_transform(dst, src, matrix, 4, 4)
    }

    pub(crate) fn m4x3(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
    ) -> Result<(), CompileError> {
        self.matrix_transform(dst, src, matrix, 3, 4)
    }

    pub(crate) fn m3x3(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
    ) -> Result<(), CompileError> {
        self.matrix_transform(dst, src, matrix, 3, 3)
    }

    fn matrix_dot(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
        rows: u32,
        cols: u32,
    ) -> Result<(), CompileError> {
        let opcode = if cols == 4 { Opcode::Dp4 } else { Opcode::Dp3 };
        let pinned = self.dot_destination_aliases(dst);
        if pinned {
            self.emit(
                Instruction::increment_mode(false).with_comment("destination aliases dot channel"),
            )?;
        }
        for row in 0..rows {
            self.emit(Instruction::alu(
                opcode,
                dst.at(row),
                [matrix.sub(row * 4, cols), src.first(cols)],
            ))?;
        }
        if pinned {
            self.emit(Instruction::increment_mode(true))?;
        }
        Ok(())
    }

    /// Whether `dst` sits in the low temporaries a hardware dot product accumulates through.
    fn dot_destination_aliases(&self, dst: Register) -> bool {
        self.config.output_kind() == OutputKind::Hardware
            && dst.space == RegisterSpace::Temp
            && self
                .caps
                .dot_alias_limit
                .is_some_and(|limit| dst.offset < limit)
    }

    fn matrix_vector(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
        rows: u32,
        cols: u32,
    ) -> Result<(), CompileError> {
        let opcode = if cols == 4 { Opcode::Vdp4 } else { Opcode::Vdp3 };
        self.emit(
            Instruction::alu(
                opcode,
                dst.first(rows),
                [matrix.sub(0, (rows - 1) * 4 + cols), src.first(cols)],
            )
            .with_repeat(rows as u8),
        )
    }

    /// Pairs of fused multiply-accumulates forwarding partial sums through the internal
    /// registers. The chain must run without the thread being descheduled, so the instruction
    /// before it is pinned and every instruction but the last is flagged.
    fn matrix_efo(
        &mut self,
        dst: Register,
        src: Register,
        matrix: Register,
        rows: u32,
    ) -> Result<(), CompileError> {
        self.setup_no_sched();

        let seeded = rows.min(EFO_SEEDED_ROWS);
        let mut chain = Vec::new();
        for row in 0..seeded {
            chain.push(
                Instruction::efo(EfoMode::Seed)
                    .with_operand(SpecialReg::Internal(row as u8))
                    .with_operand(matrix.sub(row * 4, 2))
                    .with_operand(src.first(2)),
            );
        }
        for row in 0..seeded {
            let mode = if row == 0 && rows == 4 {
                EfoMode::FinishReseed
            } else {
                EfoMode::Finish
            };
            let mut finish = Instruction::efo(mode)
                .with_operand(dst.at(row))
                .with_operand(SpecialReg::Internal(row as u8))
                .with_operand(matrix.sub(row * 4 + 2, 2))
                .with_operand(src.sub(2, 2));
            if mode == EfoMode::FinishReseed {
                // Internal 0 is free again, start the fourth row in it.
                finish = finish
                    .with_operand(matrix.sub(12, 2))
                    .with_operand(src.first(2));
            }
            chain.push(finish);
        }
        if rows == 4 {
            chain.push(
                Instruction::efo(EfoMode::Finish)
                    .with_operand(dst.at(3))
                    .with_operand(SpecialReg::Internal(0))
                    .with_operand(matrix.sub(14, 2))
                    .with_operand(src.sub(2, 2)),
            );
        }

        let last = chain.len().saturating_sub(1);
        for (i, inst) in chain.into_iter().enumerate() {
            self.emit(if i < last { inst.no_sched() } else { inst })?;
        }
        Ok(())
    }
}
