//! Stack depth simulation over symbolic instruction streams
//!
//! Rewritten method bodies need fresh `max_stack`/`max_locals` values, and computing them doubles
//! as a structural sanity check: a body that underflows the stack, merges two control flow edges
//! at different depths, or falls off its own end would be rejected by the JVM anyway, so it is
//! reported here with a reason instead of producing a class the VM refuses to load.

use crate::jvm::code::{opcodes, Label, LoadableConstant, Op};
use crate::jvm::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::jvm::errors::VerifierErrorKind;
use crate::util::Width;
use std::collections::{HashMap, HashSet};

/// Limits for the `Code` attribute of one method
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CodeLimits {
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Simulate stack depths across every reachable path and derive code limits
///
/// Only operand slot counts are tracked, not types. Exception handlers start at depth 1 (the
/// thrown reference). Subroutine calls are assumed to consume their return address, so the
/// instruction after a `jsr` continues at the depth before it.
pub fn compute_limits(
    ops: &[Op],
    descriptor: &MethodDescriptor,
    is_static: bool,
) -> Result<CodeLimits, VerifierErrorKind> {
    let mut label_positions: HashMap<Label, usize> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        if let Op::Label(label) = op {
            if label_positions.insert(*label, index).is_some() {
                return Err(VerifierErrorKind::DuplicateLabel(*label));
            }
        }
    }

    let mut state = Simulation {
        label_positions,
        label_depths: HashMap::new(),
        worklist: vec![],
        enqueued: HashSet::new(),
        max_stack: 0,
        max_locals: descriptor.parameter_length(!is_static) as u32,
    };

    // Handler entry depth is the single thrown reference
    for op in ops {
        if let Op::TryCatch { handler, .. } = op {
            state.merge(*handler, 1)?;
        }
    }
    state.worklist.push((0, 0));

    while let Some((start, depth)) = state.worklist.pop() {
        state.run_segment(ops, start, depth)?;
    }

    if state.max_locals > u16::MAX as u32 {
        return Err(VerifierErrorKind::LocalsOverflow);
    }
    Ok(CodeLimits {
        max_stack: state.max_stack,
        max_locals: state.max_locals as u16,
    })
}

struct Simulation {
    label_positions: HashMap<Label, usize>,
    label_depths: HashMap<Label, u16>,
    worklist: Vec<(usize, u16)>,
    enqueued: HashSet<Label>,
    max_stack: u16,
    max_locals: u32,
}

impl Simulation {
    /// Record the depth flowing into a label, scheduling its segment on first sight
    fn merge(&mut self, label: Label, depth: u16) -> Result<(), VerifierErrorKind> {
        match self.label_depths.get(&label) {
            Some(&known) if known != depth => Err(VerifierErrorKind::IncompatibleStackDepths {
                label,
                first: known,
                second: depth,
            }),
            Some(_) => Ok(()),
            None => {
                self.label_depths.insert(label, depth);
                let position = *self
                    .label_positions
                    .get(&label)
                    .ok_or(VerifierErrorKind::UnplacedLabel(label))?;
                if self.enqueued.insert(label) {
                    self.worklist.push((position + 1, depth));
                }
                Ok(())
            }
        }
    }

    fn track_local(&mut self, index: u16, wide: bool) {
        let top = index as u32 + if wide { 2 } else { 1 };
        self.max_locals = self.max_locals.max(top);
    }

    /// Simulate from `start` until the segment merges into a label or terminates
    fn run_segment(
        &mut self,
        ops: &[Op],
        start: usize,
        mut depth: u16,
    ) -> Result<(), VerifierErrorKind> {
        for (at, op) in ops.iter().enumerate().skip(start) {
            match op {
                Op::Label(label) => {
                    return self.merge(*label, depth);
                }

                Op::TryCatch { .. }
                | Op::LineNumber { .. }
                | Op::LocalVariable { .. }
                | Op::StackLimits { .. } => continue,

                Op::Var { opcode, index } => {
                    self.track_local(*index, opcodes::var_is_wide(*opcode));
                    if *opcode == opcodes::RET {
                        return Ok(());
                    }
                }

                Op::Iinc { index, .. } => {
                    self.track_local(*index, false);
                }

                Op::Jump { opcode, target } => match *opcode {
                    opcodes::GOTO | opcodes::GOTO_W => {
                        return self.merge(*target, depth);
                    }
                    opcodes::JSR | opcodes::JSR_W => {
                        let inside = depth
                            .checked_add(1)
                            .ok_or(VerifierErrorKind::StackOverflow)?;
                        self.max_stack = self.max_stack.max(inside);
                        self.merge(*target, inside)?;
                        continue;
                    }
                    _ => {
                        depth = self.apply(op, at, depth)?;
                        self.merge(*target, depth)?;
                        continue;
                    }
                },

                Op::TableSwitch {
                    default, targets, ..
                } => {
                    depth = self.apply(op, at, depth)?;
                    self.merge(*default, depth)?;
                    for target in targets {
                        self.merge(*target, depth)?;
                    }
                    return Ok(());
                }

                Op::LookupSwitch { default, pairs } => {
                    depth = self.apply(op, at, depth)?;
                    self.merge(*default, depth)?;
                    for (_, target) in pairs {
                        self.merge(*target, depth)?;
                    }
                    return Ok(());
                }

                _ => (),
            }

            let terminates = matches!(op, Op::Insn(opcode) if opcodes::is_return(*opcode) || *opcode == opcodes::ATHROW);
            depth = self.apply(op, at, depth)?;
            if terminates {
                return Ok(());
            }
        }
        Err(VerifierErrorKind::FallsOffEnd)
    }

    /// Apply one instruction's slot effect to the depth
    fn apply(&mut self, op: &Op, at: usize, depth: u16) -> Result<u16, VerifierErrorKind> {
        let (pops, pushes) = slot_effect(op)?;
        let remaining = depth
            .checked_sub(pops)
            .ok_or(VerifierErrorKind::StackUnderflow { at })?;
        let depth = (remaining as u32 + pushes as u32)
            .try_into()
            .map_err(|_| VerifierErrorKind::StackOverflow)?;
        self.max_stack = self.max_stack.max(depth);
        Ok(depth)
    }
}

/// Slots an instruction pops and pushes
fn slot_effect(op: &Op) -> Result<(u16, u16), VerifierErrorKind> {
    use opcodes::*;
    let effect = match op {
        Op::Label(_)
        | Op::TryCatch { .. }
        | Op::LineNumber { .. }
        | Op::LocalVariable { .. }
        | Op::StackLimits { .. }
        | Op::Iinc { .. } => (0, 0),

        Op::IntOperand { opcode, .. } => match *opcode {
            NEWARRAY => (1, 1),
            _ => (0, 1),
        },

        Op::Var { opcode, .. } => match *opcode {
            ILOAD | FLOAD | ALOAD => (0, 1),
            LLOAD | DLOAD => (0, 2),
            ISTORE | FSTORE | ASTORE => (1, 0),
            LSTORE | DSTORE => (2, 0),
            _ => (0, 0), // ret
        },

        Op::Ldc(constant) => match constant {
            LoadableConstant::Long(_) | LoadableConstant::Double(_) => (0, 2),
            _ => (0, 1),
        },

        Op::Jump { opcode, .. } => match *opcode {
            IFEQ..=IFLE | IFNULL | IFNONNULL => (1, 0),
            IF_ICMPEQ..=IF_ACMPNE => (2, 0),
            _ => (0, 0), // goto family; jsr is handled by the caller
        },

        Op::TableSwitch { .. } | Op::LookupSwitch { .. } => (1, 0),

        Op::Type { opcode, .. } => match *opcode {
            NEW => (0, 1),
            _ => (1, 1), // checkcast, instanceof, anewarray
        },

        Op::MultiANewArray { dimensions, .. } => (*dimensions as u16, 1),

        Op::Field {
            opcode, descriptor, ..
        } => {
            let width = FieldType::parse(descriptor)
                .map_err(|_| VerifierErrorKind::BadDescriptor(descriptor.clone()))?
                .width() as u16;
            match *opcode {
                GETSTATIC => (0, width),
                PUTSTATIC => (width, 0),
                GETFIELD => (1, width),
                _ => (1 + width, 0), // putfield
            }
        }

        Op::Invoke {
            opcode, descriptor, ..
        } => {
            let parsed = MethodDescriptor::parse(descriptor)
                .map_err(|_| VerifierErrorKind::BadDescriptor(descriptor.clone()))?;
            let has_receiver = *opcode != INVOKESTATIC;
            let pops = parsed.parameter_length(has_receiver) as u16;
            let pushes = parsed.return_type.as_ref().map_or(0, Width::width) as u16;
            (pops, pushes)
        }

        Op::Insn(opcode) => match *opcode {
            NOP => (0, 0),
            ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => (0, 1),
            LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => (0, 2),
            IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => (2, 1),
            LALOAD | DALOAD => (2, 2),
            IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => (3, 0),
            LASTORE | DASTORE => (4, 0),
            POP => (1, 0),
            POP2 => (2, 0),
            DUP => (1, 2),
            DUP_X1 => (2, 3),
            DUP_X2 => (3, 4),
            DUP2 => (2, 4),
            DUP2_X1 => (3, 5),
            DUP2_X2 => (4, 6),
            SWAP => (2, 2),
            IADD | ISUB | IMUL | IDIV | IREM | FADD | FSUB | FMUL | FDIV | FREM => (2, 1),
            LADD | LSUB | LMUL | LDIV | LREM | DADD | DSUB | DMUL | DDIV | DREM => (4, 2),
            INEG | FNEG => (1, 1),
            LNEG | DNEG => (2, 2),
            ISHL | ISHR | IUSHR => (2, 1),
            LSHL | LSHR | LUSHR => (3, 2),
            IAND | IOR | IXOR => (2, 1),
            LAND | LOR | LXOR => (4, 2),
            I2F | F2I | I2B | I2C | I2S => (1, 1),
            I2L | I2D | F2L | F2D => (1, 2),
            L2I | L2F | D2I | D2F => (2, 1),
            L2D | D2L => (2, 2),
            LCMP | DCMPL | DCMPG => (4, 1),
            FCMPL | FCMPG => (2, 1),
            IRETURN | FRETURN | ARETURN => (1, 0),
            LRETURN | DRETURN => (2, 0),
            RETURN => (0, 0),
            ARRAYLENGTH => (1, 1),
            ATHROW => (1, 0),
            MONITORENTER | MONITOREXIT => (1, 0),
            _ => (0, 0),
        },
    };
    Ok(effect)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    fn void_descriptor() -> MethodDescriptor {
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        }
    }

    #[test]
    fn straight_line_limits() {
        let ops = [
            Op::Insn(ICONST_1),
            Op::Insn(ICONST_2),
            Op::Insn(IADD),
            Op::Var {
                opcode: ISTORE,
                index: 3,
            },
            Op::Insn(RETURN),
        ];
        let limits = compute_limits(&ops, &void_descriptor(), true).unwrap();
        assert_eq!(
            limits,
            CodeLimits {
                max_stack: 2,
                max_locals: 4
            }
        );
    }

    #[test]
    fn parameters_reserve_locals() {
        let descriptor = MethodDescriptor::parse("(JD)V").unwrap();
        let limits = compute_limits(&[Op::Insn(RETURN)], &descriptor, false).unwrap();
        // this + two wide parameters
        assert_eq!(limits.max_locals, 5);
    }

    #[test]
    fn branch_depths_must_agree() {
        let ops = [
            Op::Insn(ICONST_0),
            Op::Jump {
                opcode: IFEQ,
                target: Label(0),
            },
            Op::Insn(ICONST_1),
            Op::Label(Label(0)),
            Op::Insn(RETURN),
        ];
        let err = compute_limits(&ops, &void_descriptor(), true).unwrap_err();
        assert!(matches!(
            err,
            VerifierErrorKind::IncompatibleStackDepths {
                label: Label(0),
                ..
            }
        ));
    }

    #[test]
    fn underflow_is_reported_at_the_offending_op() {
        let ops = [Op::Insn(IADD), Op::Insn(RETURN)];
        let err = compute_limits(&ops, &void_descriptor(), true).unwrap_err();
        assert!(matches!(err, VerifierErrorKind::StackUnderflow { at: 0 }));
    }

    #[test]
    fn missing_return_is_rejected() {
        let ops = [Op::Insn(ICONST_0), Op::Insn(POP)];
        let err = compute_limits(&ops, &void_descriptor(), true).unwrap_err();
        assert!(matches!(err, VerifierErrorKind::FallsOffEnd));
    }

    #[test]
    fn handler_paths_are_simulated() {
        let ops = [
            Op::TryCatch {
                start: Label(0),
                end: Label(1),
                handler: Label(2),
                catch_type: None,
            },
            Op::Label(Label(0)),
            Op::Insn(NOP),
            Op::Label(Label(1)),
            Op::Insn(RETURN),
            Op::Label(Label(2)),
            Op::Insn(ATHROW),
        ];
        let limits = compute_limits(&ops, &void_descriptor(), true).unwrap();
        assert_eq!(limits.max_stack, 1);
    }

    #[test]
    fn invoke_effects_come_from_the_descriptor() {
        let ops = [
            Op::Insn(LCONST_0),
            Op::Insn(DCONST_0),
            Op::Invoke {
                opcode: INVOKESTATIC,
                owner: "Probe".to_string(),
                name: "f".to_string(),
                descriptor: "(JD)I".to_string(),
                interface: false,
            },
            Op::Insn(IRETURN),
        ];
        let descriptor = MethodDescriptor::parse("()I").unwrap();
        let limits = compute_limits(&ops, &descriptor, true).unwrap();
        assert_eq!(limits.max_stack, 4);
    }

    #[test]
    fn loop_converges() {
        let ops = [
            Op::Label(Label(0)),
            Op::Iinc { index: 1, delta: 1 },
            Op::Var {
                opcode: ILOAD,
                index: 1,
            },
            Op::Jump {
                opcode: IFNE,
                target: Label(0),
            },
            Op::Insn(RETURN),
        ];
        let limits = compute_limits(&ops, &void_descriptor(), true).unwrap();
        assert_eq!(limits.max_stack, 1);
        assert_eq!(limits.max_locals, 2);
    }
}
