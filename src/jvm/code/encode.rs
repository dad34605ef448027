use crate::jvm::class_file::{
    Code, ConstantPool, ExceptionHandler, LineNumber, LineNumberTable, LocalVariable,
    LocalVariableTable,
};
use crate::jvm::code::{opcodes, Label, LoadableConstant, Op};
use crate::jvm::Error;
use std::collections::HashMap;

/// Assemble an op list back into a `Code` attribute
///
/// Two passes: the first lays out instruction sizes and pins down every label's offset, the
/// second emits bytes with branches resolved. Compact load/store forms and `wide` prefixes are
/// re-selected from operand magnitudes, and switch padding is recomputed from final offsets.
/// Referenced constants are interned into the pool as a side effect.
///
/// Branches are encoded with 16-bit offsets (except an explicit `goto_w`/`jsr_w`); a branch
/// that cannot reach its target is an error rather than a silent rewrite.
pub fn encode_code(
    ops: &[Op],
    constants: &mut ConstantPool,
    max_stack: u16,
    max_locals: u16,
) -> Result<Code, Error> {
    // Layout pass
    let mut placed: HashMap<Label, usize> = HashMap::new();
    let mut offset = 0usize;
    for op in ops {
        if let Op::Label(label) = op {
            if placed.insert(*label, offset).is_some() {
                return Err(Error::DuplicateLabel(*label));
            }
            continue;
        }
        offset += instruction_size(op, offset, constants)?;
    }
    let code_length = offset;
    if code_length > u16::MAX as usize {
        return Err(Error::MethodCodeOverflow(code_length));
    }

    let resolve = |label: Label| -> Result<usize, Error> {
        placed.get(&label).copied().ok_or(Error::UnplacedLabel(label))
    };

    // Emission pass
    let mut bytecode: Vec<u8> = Vec::with_capacity(code_length);
    let mut exception_table: Vec<ExceptionHandler> = vec![];
    let mut line_numbers: Vec<LineNumber> = vec![];
    let mut local_variables: Vec<LocalVariable> = vec![];

    for op in ops {
        let pc = bytecode.len();
        match op {
            Op::Label(_) | Op::StackLimits { .. } => (),

            Op::Insn(opcode) => bytecode.push(*opcode),

            Op::IntOperand { opcode, operand } => {
                bytecode.push(*opcode);
                match *opcode {
                    opcodes::SIPUSH => {
                        bytecode.extend_from_slice(&(*operand as i16).to_be_bytes())
                    }
                    _ => bytecode.push(*operand as u8),
                }
            }

            Op::Var { opcode, index } => {
                if let Some(compact) = opcodes::compact_var_form(*opcode, *index) {
                    bytecode.push(compact);
                } else if *index <= u8::MAX as u16 {
                    bytecode.push(*opcode);
                    bytecode.push(*index as u8);
                } else {
                    bytecode.push(opcodes::WIDE);
                    bytecode.push(*opcode);
                    bytecode.extend_from_slice(&index.to_be_bytes());
                }
            }

            Op::Iinc { index, delta } => {
                if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                    bytecode.push(opcodes::IINC);
                    bytecode.push(*index as u8);
                    bytecode.push(*delta as u8);
                } else {
                    bytecode.push(opcodes::WIDE);
                    bytecode.push(opcodes::IINC);
                    bytecode.extend_from_slice(&index.to_be_bytes());
                    bytecode.extend_from_slice(&delta.to_be_bytes());
                }
            }

            Op::Type { opcode, class } => {
                let index = constants.get_class(class)?;
                bytecode.push(*opcode);
                bytecode.extend_from_slice(&index.to_be_bytes());
            }

            Op::Field {
                opcode,
                owner,
                name,
                descriptor,
            } => {
                let index = constants.get_fieldref(owner, name, descriptor)?;
                bytecode.push(*opcode);
                bytecode.extend_from_slice(&index.to_be_bytes());
            }

            Op::Invoke {
                opcode,
                owner,
                name,
                descriptor,
                interface,
            } => {
                let index = constants.get_methodref(owner, name, descriptor, *interface)?;
                bytecode.push(*opcode);
                bytecode.extend_from_slice(&index.to_be_bytes());
                if *opcode == opcodes::INVOKEINTERFACE {
                    bytecode.push(interface_invoke_count(descriptor));
                    bytecode.push(0);
                }
            }

            Op::Ldc(constant) => {
                let index = intern_loadable(constant, constants)?;
                match constant {
                    LoadableConstant::Long(_) | LoadableConstant::Double(_) => {
                        bytecode.push(opcodes::LDC2_W);
                        bytecode.extend_from_slice(&index.to_be_bytes());
                    }
                    _ if index <= u8::MAX as u16 => {
                        bytecode.push(opcodes::LDC);
                        bytecode.push(index as u8);
                    }
                    _ => {
                        bytecode.push(opcodes::LDC_W);
                        bytecode.extend_from_slice(&index.to_be_bytes());
                    }
                }
            }

            Op::Jump { opcode, target } => {
                let relative = resolve(*target)? as isize - pc as isize;
                bytecode.push(*opcode);
                if matches!(*opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                    bytecode.extend_from_slice(&(relative as i32).to_be_bytes());
                } else {
                    let relative = i16::try_from(relative).map_err(|_| {
                        Error::BranchTargetOutOfRange {
                            opcode: *opcode,
                            offset: relative,
                        }
                    })?;
                    bytecode.extend_from_slice(&relative.to_be_bytes());
                }
            }

            Op::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                bytecode.push(opcodes::TABLESWITCH);
                for _ in 0..switch_padding(pc) {
                    bytecode.push(0);
                }
                let default = (resolve(*default)? as isize - pc as isize) as i32;
                bytecode.extend_from_slice(&default.to_be_bytes());
                bytecode.extend_from_slice(&low.to_be_bytes());
                bytecode.extend_from_slice(&high.to_be_bytes());
                for target in targets {
                    let target = (resolve(*target)? as isize - pc as isize) as i32;
                    bytecode.extend_from_slice(&target.to_be_bytes());
                }
            }

            Op::LookupSwitch { default, pairs } => {
                bytecode.push(opcodes::LOOKUPSWITCH);
                for _ in 0..switch_padding(pc) {
                    bytecode.push(0);
                }
                let default = (resolve(*default)? as isize - pc as isize) as i32;
                bytecode.extend_from_slice(&default.to_be_bytes());
                bytecode.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (matched, target) in pairs {
                    let target = (resolve(*target)? as isize - pc as isize) as i32;
                    bytecode.extend_from_slice(&matched.to_be_bytes());
                    bytecode.extend_from_slice(&target.to_be_bytes());
                }
            }

            Op::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                let index = constants.get_class(descriptor)?;
                bytecode.push(opcodes::MULTIANEWARRAY);
                bytecode.extend_from_slice(&index.to_be_bytes());
                bytecode.push(*dimensions);
            }

            Op::TryCatch {
                start,
                end,
                handler,
                catch_type,
            } => {
                let catch_type = match catch_type {
                    None => 0,
                    Some(class) => constants.get_class(class)?,
                };
                exception_table.push(ExceptionHandler {
                    start_pc: resolve(*start)? as u16,
                    end_pc: resolve(*end)? as u16,
                    handler_pc: resolve(*handler)? as u16,
                    catch_type,
                });
            }

            Op::LineNumber { line, start } => {
                line_numbers.push(LineNumber {
                    start_pc: resolve(*start)? as u16,
                    line_number: *line,
                });
            }

            Op::LocalVariable {
                name,
                descriptor,
                start,
                end,
                index,
            } => {
                let start_pc = resolve(*start)? as u16;
                let end_pc = resolve(*end)? as u16;
                local_variables.push(LocalVariable {
                    start_pc,
                    length: end_pc.saturating_sub(start_pc),
                    name_index: constants.get_utf8(name)?,
                    descriptor_index: constants.get_utf8(descriptor)?,
                    index: *index,
                });
            }
        }
    }

    debug_assert_eq!(bytecode.len(), code_length);

    let mut attributes = vec![];
    if !line_numbers.is_empty() {
        attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
    }
    if !local_variables.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTable(local_variables))?);
    }

    Ok(Code {
        max_stack,
        max_locals,
        bytecode,
        exception_table,
        attributes,
    })
}

/// Padding bytes between a switch opcode at `pc` and its 4-byte-aligned operands
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

/// `invokeinterface` redundantly encodes the argument slot count (including the receiver)
fn interface_invoke_count(descriptor: &str) -> u8 {
    use crate::jvm::descriptors::{MethodDescriptor, ParseDescriptor};
    match MethodDescriptor::parse(descriptor) {
        Ok(parsed) => parsed.parameter_length(true) as u8,
        Err(_) => 1,
    }
}

fn intern_loadable(
    constant: &LoadableConstant,
    constants: &mut ConstantPool,
) -> Result<u16, Error> {
    match constant {
        LoadableConstant::Integer(value) => constants.get_integer(*value),
        LoadableConstant::Float(value) => constants.get_float(*value),
        LoadableConstant::Long(value) => constants.get_long(*value),
        LoadableConstant::Double(value) => constants.get_double(*value),
        LoadableConstant::String(value) => constants.get_string(value),
        LoadableConstant::Class(name) => constants.get_class(name),
    }
}

fn instruction_size(op: &Op, pc: usize, constants: &mut ConstantPool) -> Result<usize, Error> {
    let size = match op {
        Op::Label(_) | Op::StackLimits { .. } => 0,
        Op::TryCatch { .. } | Op::LineNumber { .. } | Op::LocalVariable { .. } => 0,

        Op::Insn(_) => 1,

        Op::IntOperand { opcode, .. } => match *opcode {
            opcodes::SIPUSH => 3,
            _ => 2,
        },

        Op::Var { opcode, index } => {
            if opcodes::compact_var_form(*opcode, *index).is_some() {
                1
            } else if *index <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }

        Op::Iinc { index, delta } => {
            if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }

        Op::Type { .. } | Op::Field { .. } => 3,

        Op::Invoke { opcode, .. } => {
            if *opcode == opcodes::INVOKEINTERFACE {
                5
            } else {
                3
            }
        }

        // Interning during layout pins the pool index this constant will get, so the
        // `ldc`/`ldc_w` choice cannot shift between passes
        Op::Ldc(constant) => match constant {
            LoadableConstant::Long(_) | LoadableConstant::Double(_) => 3,
            _ => {
                if intern_loadable(constant, constants)? <= u8::MAX as u16 {
                    2
                } else {
                    3
                }
            }
        },

        Op::Jump { opcode, .. } => {
            if matches!(*opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                5
            } else {
                3
            }
        }

        Op::TableSwitch { targets, .. } => 1 + switch_padding(pc) + 12 + 4 * targets.len(),

        Op::LookupSwitch { pairs, .. } => 1 + switch_padding(pc) + 8 + 8 * pairs.len(),

        Op::MultiANewArray { .. } => 4,
    };
    Ok(size)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    fn encode(ops: &[Op]) -> Vec<u8> {
        let mut constants = ConstantPool::new();
        encode_code(ops, &mut constants, 0, 0).unwrap().bytecode
    }

    #[test]
    fn compact_forms_are_reselected() {
        let bytes = encode(&[
            Op::Var {
                opcode: ILOAD,
                index: 0,
            },
            Op::Var {
                opcode: ILOAD,
                index: 200,
            },
            Op::Var {
                opcode: ILOAD,
                index: 300,
            },
            Op::Insn(RETURN),
        ]);
        assert_eq!(bytes, vec![0x1a, ILOAD, 200, WIDE, ILOAD, 0x01, 0x2c, RETURN]);
    }

    #[test]
    fn backward_and_forward_branches() {
        let bytes = encode(&[
            Op::Label(Label(0)),
            Op::Insn(NOP),
            Op::Jump {
                opcode: GOTO,
                target: Label(0),
            },
            Op::Jump {
                opcode: GOTO,
                target: Label(1),
            },
            Op::Label(Label(1)),
            Op::Insn(RETURN),
        ]);
        // goto at 1 jumps back 1 byte; goto at 4 jumps forward 3 bytes
        assert_eq!(
            bytes,
            vec![NOP, GOTO, 0xff, 0xff, GOTO, 0x00, 0x03, RETURN]
        );
    }

    #[test]
    fn switch_operands_are_aligned() {
        let bytes = encode(&[
            Op::Label(Label(0)),
            Op::Insn(ICONST_0),
            Op::TableSwitch {
                low: 0,
                high: 1,
                default: Label(0),
                targets: vec![Label(0), Label(0)],
            },
        ]);
        // opcode at 1, then 2 padding bytes so operands start at 4
        assert_eq!(bytes[1], TABLESWITCH);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(bytes.len(), 4 + 12 + 8);
        // default offset is relative to the switch opcode at pc 1
        assert_eq!(&bytes[4..8], &(-1i32).to_be_bytes());
    }

    #[test]
    fn unplaced_label_is_an_error() {
        let mut constants = ConstantPool::new();
        let err = encode_code(
            &[Op::Jump {
                opcode: GOTO,
                target: Label(9),
            }],
            &mut constants,
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnplacedLabel(Label(9))));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut constants = ConstantPool::new();
        let err = encode_code(
            &[Op::Label(Label(3)), Op::Label(Label(3))],
            &mut constants,
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel(Label(3))));
    }
}
