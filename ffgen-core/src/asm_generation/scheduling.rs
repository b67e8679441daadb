use crate::asm_lang::Instruction;

/// Makes sure the thread cannot be descheduled right before the next instruction appended to
/// `stream`.
///
/// Walks back over at most `lookback` real instructions looking for one that can carry the
/// no-reschedule flag. Labels, branches and data fence waits always deschedule, so reaching one
/// ends the search. When nothing suitable is found `padding` flagged no-ops are appended instead.
///
/// Returns the number of padding instructions inserted.
pub fn setup_no_sched<O>(stream: &mut Vec<Instruction<O>>, lookback: u32, padding: u32) -> u32 {
    let mut examined = 0;
    for inst in stream.iter_mut().rev() {
        if inst.opcode.is_annotation() {
            continue;
        }
        if inst.opcode.forces_deschedule() || examined >= lookback {
            break;
        }
        if inst.flags.no_sched {
            return 0;
        }
        if inst.opcode.accepts_no_sched() {
            inst.flags.no_sched = true;
            return 0;
        }
        examined += 1;
    }
    for _ in 0..padding {
        stream.push(Instruction::nop().no_sched());
    }
    padding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm_lang::{Instruction, LabelId, Opcode};

    type Stream = Vec<Instruction<u32>>;

    fn op(opcode: Opcode) -> Instruction<u32> {
        Instruction::new(opcode)
    }

    #[test]
    fn flags_previous_alu_instruction() {
        let mut stream: Stream = vec![op(Opcode::Mov), op(Opcode::Comment)];
        assert_eq!(setup_no_sched(&mut stream, 1, 2), 0);
        assert!(stream[0].flags.no_sched);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn already_flagged_needs_nothing() {
        let mut stream: Stream = vec![op(Opcode::Nop).no_sched()];
        assert_eq!(setup_no_sched(&mut stream, 1, 2), 0);
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn lookback_window_limits_search() {
        let mut stream: Stream = vec![op(Opcode::Mov), op(Opcode::Ld), op(Opcode::Iadd)];
        assert_eq!(setup_no_sched(&mut stream, 1, 2), 2);
        assert!(!stream[0].flags.no_sched);
        assert_eq!(stream.len(), 5);
        assert!(stream[3..].iter().all(|i| i.opcode == Opcode::Nop && i.flags.no_sched));

        let mut stream: Stream = vec![op(Opcode::Mov), op(Opcode::Ld), op(Opcode::Iadd)];
        assert_eq!(setup_no_sched(&mut stream, 3, 1), 0);
        assert!(stream[0].flags.no_sched);
    }

    #[test]
    fn deschedule_points_stop_the_search() {
        let mut label = op(Opcode::Label);
        label.operands.push(LabelId(0).0);
        let mut stream: Stream = vec![op(Opcode::Mov), label];
        assert_eq!(setup_no_sched(&mut stream, 3, 1), 1);
        assert!(!stream[0].flags.no_sched);

        let mut stream: Stream = vec![op(Opcode::Mov), op(Opcode::Wdf)];
        assert_eq!(setup_no_sched(&mut stream, 3, 2), 2);
    }

    #[test]
    fn empty_stream_is_padded() {
        let mut stream: Stream = vec![op(Opcode::Block)];
        assert_eq!(setup_no_sched(&mut stream, 3, 1), 1);
        assert_eq!(stream.len(), 2);
    }
}
