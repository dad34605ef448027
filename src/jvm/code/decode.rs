use crate::jvm::class_file::{
    Attribute, AttributeLike, Code, Constant, ConstantPool, LineNumberTable, LocalVariableTable,
};
use crate::jvm::code::{opcodes, CodeSink, Label, LoadableConstant, Op};
use crate::jvm::{DecodeError, Error};
use std::collections::{BTreeSet, HashMap};

/// Replay a compiled `Code` attribute as symbolic events against a sink
///
/// Event order is fixed: protected regions first, then labels, line numbers and instructions in
/// bytecode order, then local variable metadata, and finally the declared stack/local limits.
/// Bytecode offsets never escape: every position of interest becomes a `Label`.
///
/// Compact load/store forms are normalized to their generic form on the way out, so a recorded
/// sequence never depends on which encoding the source compiler picked.
pub fn decode_code(
    code: &Code,
    constants: &ConstantPool,
    sink: &mut dyn CodeSink,
) -> Result<(), Error> {
    let bytes = &code.bytecode;

    // First pass: instruction boundaries, plus each instruction as an op whose labels
    // temporarily hold raw bytecode offsets
    let mut decoded: Vec<(usize, Op)> = vec![];
    let mut boundaries = BTreeSet::new();
    let mut pc = 0;
    while pc < bytes.len() {
        boundaries.insert(pc);
        let (op, size) = decode_one(bytes, pc, constants)?;
        decoded.push((pc, op));
        pc += size;
    }

    // Offsets that need a label
    let mut label_offsets: BTreeSet<usize> = BTreeSet::new();
    for (_, op) in &decoded {
        collect_target_offsets(op, &mut label_offsets);
    }
    for handler in &code.exception_table {
        label_offsets.insert(handler.start_pc as usize);
        label_offsets.insert(handler.end_pc as usize);
        label_offsets.insert(handler.handler_pc as usize);
    }

    let line_numbers = parse_line_numbers(&code.attributes, constants)?;
    for line_number in &line_numbers {
        label_offsets.insert(line_number.start_pc as usize);
    }

    let local_variables = parse_local_variables(&code.attributes, constants)?;
    for local_variable in &local_variables {
        label_offsets.insert(local_variable.start_pc as usize);
        label_offsets.insert(local_variable.start_pc as usize + local_variable.length as usize);
    }

    // A label may sit at the very end of the bytecode (eg. the exclusive end of a protected
    // range); anywhere else it must coincide with an instruction boundary
    for offset in &label_offsets {
        if *offset != bytes.len() && !boundaries.contains(offset) {
            return Err(Error::Decode(DecodeError::InvalidCodeOffset(*offset)));
        }
    }

    let labels: HashMap<u32, Label> = label_offsets
        .iter()
        .enumerate()
        .map(|(id, offset)| (*offset as u32, Label(id as u32)))
        .collect();
    let label_at = |offset: usize| labels[&(offset as u32)];

    for handler in &code.exception_table {
        let catch_type = if handler.catch_type == 0 {
            None
        } else {
            Some(constants.class_name_at(handler.catch_type)?)
        };
        sink.try_catch(
            label_at(handler.start_pc as usize),
            label_at(handler.end_pc as usize),
            label_at(handler.handler_pc as usize),
            catch_type,
        )?;
    }

    let mut lines_by_offset: HashMap<usize, Vec<u16>> = HashMap::new();
    for line_number in &line_numbers {
        lines_by_offset
            .entry(line_number.start_pc as usize)
            .or_default()
            .push(line_number.line_number);
    }

    for (pc, op) in decoded {
        if label_offsets.contains(&pc) {
            sink.label(label_at(pc))?;
        }
        if let Some(lines) = lines_by_offset.get(&pc) {
            for line in lines {
                sink.line_number(*line, label_at(pc))?;
            }
        }
        let mut op = op;
        op.map_labels(|raw| labels[&raw.0]);
        crate::jvm::code::replay_op(&op, sink)?;
    }
    if label_offsets.contains(&bytes.len()) {
        sink.label(label_at(bytes.len()))?;
    }

    for local_variable in &local_variables {
        let start = local_variable.start_pc as usize;
        let end = start + local_variable.length as usize;
        sink.local_variable(
            constants.utf8_at(local_variable.name_index)?,
            constants.utf8_at(local_variable.descriptor_index)?,
            label_at(start),
            label_at(end),
            local_variable.index,
        )?;
    }

    sink.stack_limits(code.max_stack, code.max_locals)?;
    Ok(())
}

fn parse_line_numbers(
    attributes: &[Attribute],
    constants: &ConstantPool,
) -> Result<Vec<crate::jvm::class_file::LineNumber>, Error> {
    let mut entries = vec![];
    for attribute in attributes_named(attributes, constants, LineNumberTable::NAME) {
        let mut reader: &[u8] = &attribute.info;
        let table = <LineNumberTable as crate::jvm::binary_format::Deserialize>::deserialize(
            &mut reader,
        )?;
        entries.extend(table.0);
    }
    Ok(entries)
}

fn parse_local_variables(
    attributes: &[Attribute],
    constants: &ConstantPool,
) -> Result<Vec<crate::jvm::class_file::LocalVariable>, Error> {
    let mut entries = vec![];
    for attribute in attributes_named(attributes, constants, LocalVariableTable::NAME) {
        let mut reader: &[u8] = &attribute.info;
        let table = <LocalVariableTable as crate::jvm::binary_format::Deserialize>::deserialize(
            &mut reader,
        )?;
        entries.extend(table.0);
    }
    Ok(entries)
}

fn attributes_named<'a>(
    attributes: &'a [Attribute],
    constants: &'a ConstantPool,
    name: &'a str,
) -> impl Iterator<Item = &'a Attribute> {
    attributes.iter().filter(move |attribute| {
        constants
            .utf8_at(attribute.name_index)
            .map(|attribute_name| attribute_name == name)
            .unwrap_or(false)
    })
}

fn collect_target_offsets(op: &Op, offsets: &mut BTreeSet<usize>) {
    match op {
        Op::Jump { target, .. } => {
            offsets.insert(target.0 as usize);
        }
        Op::TableSwitch {
            default, targets, ..
        } => {
            offsets.insert(default.0 as usize);
            for target in targets {
                offsets.insert(target.0 as usize);
            }
        }
        Op::LookupSwitch { default, pairs } => {
            offsets.insert(default.0 as usize);
            for (_, target) in pairs {
                offsets.insert(target.0 as usize);
            }
        }
        _ => (),
    }
}

fn u8_at(bytes: &[u8], pc: usize) -> Result<u8, DecodeError> {
    bytes.get(pc).copied().ok_or(DecodeError::UnexpectedEof)
}

fn i8_at(bytes: &[u8], pc: usize) -> Result<i8, DecodeError> {
    Ok(u8_at(bytes, pc)? as i8)
}

fn u16_at(bytes: &[u8], pc: usize) -> Result<u16, DecodeError> {
    Ok(((u8_at(bytes, pc)? as u16) << 8) | u8_at(bytes, pc + 1)? as u16)
}

fn i16_at(bytes: &[u8], pc: usize) -> Result<i16, DecodeError> {
    Ok(u16_at(bytes, pc)? as i16)
}

fn i32_at(bytes: &[u8], pc: usize) -> Result<i32, DecodeError> {
    Ok(((u16_at(bytes, pc)? as u32) << 16 | u16_at(bytes, pc + 2)? as u32) as i32)
}

fn branch_target(pc: usize, offset: i32) -> Result<Label, DecodeError> {
    let target = pc as i64 + offset as i64;
    if target < 0 || target > u32::MAX as i64 {
        return Err(DecodeError::InvalidCodeOffset(pc));
    }
    Ok(Label(target as u32))
}

/// Decode the instruction at `pc` into `(op, encoded size)`
///
/// Branch targets come back as labels holding the raw target offset; the caller renumbers them.
fn decode_one(
    bytes: &[u8],
    pc: usize,
    constants: &ConstantPool,
) -> Result<(Op, usize), Error> {
    use crate::jvm::code::opcodes::*;

    let opcode = u8_at(bytes, pc)?;

    // Compact load/store forms lose their special encoding here
    if let Some((generic, index)) = generic_var_form(opcode) {
        return Ok((
            Op::Var {
                opcode: generic,
                index,
            },
            1,
        ));
    }

    let result = match opcode {
        NOP..=DCONST_1
        | IALOAD..=SALOAD
        | IASTORE..=SASTORE
        | POP..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => (Op::Insn(opcode), 1),

        BIPUSH => (
            Op::IntOperand {
                opcode,
                operand: i8_at(bytes, pc + 1)? as i32,
            },
            2,
        ),
        SIPUSH => (
            Op::IntOperand {
                opcode,
                operand: i16_at(bytes, pc + 1)? as i32,
            },
            3,
        ),
        NEWARRAY => (
            Op::IntOperand {
                opcode,
                operand: u8_at(bytes, pc + 1)? as i32,
            },
            2,
        ),

        LDC => (
            Op::Ldc(loadable_at(constants, u8_at(bytes, pc + 1)? as u16, opcode)?),
            2,
        ),
        LDC_W | LDC2_W => (
            Op::Ldc(loadable_at(constants, u16_at(bytes, pc + 1)?, opcode)?),
            3,
        ),

        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => (
            Op::Var {
                opcode,
                index: u8_at(bytes, pc + 1)? as u16,
            },
            2,
        ),

        IINC => (
            Op::Iinc {
                index: u8_at(bytes, pc + 1)? as u16,
                delta: i8_at(bytes, pc + 2)? as i16,
            },
            3,
        ),

        WIDE => {
            let widened = u8_at(bytes, pc + 1)?;
            match widened {
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => (
                    Op::Var {
                        opcode: widened,
                        index: u16_at(bytes, pc + 2)?,
                    },
                    4,
                ),
                IINC => (
                    Op::Iinc {
                        index: u16_at(bytes, pc + 2)?,
                        delta: i16_at(bytes, pc + 4)?,
                    },
                    6,
                ),
                other => return Err(Error::Decode(DecodeError::UnrecognizedInstruction(other))),
            }
        }

        IFEQ..=JSR | IFNULL | IFNONNULL => (
            Op::Jump {
                opcode,
                target: branch_target(pc, i16_at(bytes, pc + 1)? as i32)?,
            },
            3,
        ),
        GOTO_W | JSR_W => (
            Op::Jump {
                opcode,
                target: branch_target(pc, i32_at(bytes, pc + 1)?)?,
            },
            5,
        ),

        TABLESWITCH => {
            let mut cursor = pc + 1 + ((4 - (pc + 1) % 4) % 4);
            let default = branch_target(pc, i32_at(bytes, cursor)?)?;
            let low = i32_at(bytes, cursor + 4)?;
            let high = i32_at(bytes, cursor + 8)?;
            cursor += 12;
            if high < low {
                return Err(Error::Decode(DecodeError::InvalidCodeOffset(pc)));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(branch_target(pc, i32_at(bytes, cursor)?)?);
                cursor += 4;
            }
            (
                Op::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                },
                cursor - pc,
            )
        }

        LOOKUPSWITCH => {
            let mut cursor = pc + 1 + ((4 - (pc + 1) % 4) % 4);
            let default = branch_target(pc, i32_at(bytes, cursor)?)?;
            let npairs = i32_at(bytes, cursor + 4)?;
            cursor += 8;
            if npairs < 0 {
                return Err(Error::Decode(DecodeError::InvalidCodeOffset(pc)));
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let matched = i32_at(bytes, cursor)?;
                let target = branch_target(pc, i32_at(bytes, cursor + 4)?)?;
                pairs.push((matched, target));
                cursor += 8;
            }
            (Op::LookupSwitch { default, pairs }, cursor - pc)
        }

        GETSTATIC..=PUTFIELD => {
            let (owner, name, descriptor) = constants.fieldref_at(u16_at(bytes, pc + 1)?)?;
            (
                Op::Field {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                },
                3,
            )
        }

        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => {
            let (owner, name, descriptor, interface) =
                constants.methodref_at(u16_at(bytes, pc + 1)?)?;
            (
                Op::Invoke {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    interface,
                },
                3,
            )
        }
        INVOKEINTERFACE => {
            let (owner, name, descriptor, _) = constants.methodref_at(u16_at(bytes, pc + 1)?)?;
            (
                Op::Invoke {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    interface: true,
                },
                5,
            )
        }

        // Rewriting a method that builds dynamic call sites would require rebuilding its
        // `BootstrapMethods` attribute, which is out of scope
        INVOKEDYNAMIC => {
            return Err(Error::Decode(DecodeError::UnsupportedInstruction(opcode)))
        }

        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => (
            Op::Type {
                opcode,
                class: constants.class_name_at(u16_at(bytes, pc + 1)?)?.to_string(),
            },
            3,
        ),

        MULTIANEWARRAY => (
            Op::MultiANewArray {
                descriptor: constants.class_name_at(u16_at(bytes, pc + 1)?)?.to_string(),
                dimensions: u8_at(bytes, pc + 3)?,
            },
            4,
        ),

        other => return Err(Error::Decode(DecodeError::UnrecognizedInstruction(other))),
    };
    Ok(result)
}

fn loadable_at(
    constants: &ConstantPool,
    index: u16,
    opcode: u8,
) -> Result<LoadableConstant, DecodeError> {
    let constant = match constants.get(index)? {
        Constant::Integer(value) => LoadableConstant::Integer(*value),
        Constant::Float(value) => LoadableConstant::Float(*value),
        Constant::Long(value) => LoadableConstant::Long(*value),
        Constant::Double(value) => LoadableConstant::Double(*value),
        Constant::String(utf8) => LoadableConstant::String(constants.utf8_at(*utf8)?.to_string()),
        Constant::Class(name) => LoadableConstant::Class(constants.utf8_at(*name)?.to_string()),
        // Method handles, method types and dynamic constants would need bootstrap machinery
        // on re-encode
        _ => return Err(DecodeError::UnsupportedInstruction(opcode)),
    };
    Ok(constant)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;
    use crate::jvm::code::{encode_code, InstructionSequence};

    fn round_trip(ops: &[Op]) -> (Code, Vec<Op>) {
        let mut constants = ConstantPool::new();
        let code = encode_code(ops, &mut constants, 2, 2).unwrap();
        let mut decoded = InstructionSequence::new();
        decode_code(&code, &constants, &mut decoded).unwrap();
        (code, decoded.ops().to_vec())
    }

    /// The decoded stream is the input plus the declared limits replayed at the end
    fn with_limits(ops: &[Op]) -> Vec<Op> {
        let mut expected = ops.to_vec();
        expected.push(Op::StackLimits {
            stack: 2,
            locals: 2,
        });
        expected
    }

    #[test]
    fn tableswitch_targets_become_labels() {
        let ops = vec![
            Op::Var {
                opcode: ILOAD,
                index: 0,
            },
            Op::TableSwitch {
                low: 0,
                high: 1,
                default: Label(2),
                targets: vec![Label(0), Label(1)],
            },
            Op::Label(Label(0)),
            Op::Insn(RETURN),
            Op::Label(Label(1)),
            Op::Insn(RETURN),
            Op::Label(Label(2)),
            Op::Insn(RETURN),
        ];
        let (code, decoded) = round_trip(&ops);
        // iload_0, then the switch with 2 padding bytes, 12 header bytes and 2 targets
        assert_eq!(code.bytecode.len(), 1 + 1 + 2 + 12 + 8 + 3);
        assert_eq!(decoded, with_limits(&ops));
    }

    #[test]
    fn lookupswitch_pairs_survive() {
        let ops = vec![
            Op::Var {
                opcode: ILOAD,
                index: 0,
            },
            Op::LookupSwitch {
                default: Label(1),
                pairs: vec![(-1, Label(0)), (10, Label(1))],
            },
            Op::Label(Label(0)),
            Op::Insn(RETURN),
            Op::Label(Label(1)),
            Op::Insn(RETURN),
        ];
        let (_, decoded) = round_trip(&ops);
        assert_eq!(decoded, with_limits(&ops));
    }

    #[test]
    fn wide_forms_are_normalized() {
        let ops = vec![
            Op::IntOperand {
                opcode: SIPUSH,
                operand: 300,
            },
            Op::Var {
                opcode: ISTORE,
                index: 300,
            },
            Op::Var {
                opcode: ILOAD,
                index: 300,
            },
            Op::Iinc {
                index: 300,
                delta: 200,
            },
            Op::Insn(RETURN),
        ];
        let (code, decoded) = round_trip(&ops);
        assert_eq!(
            code.bytecode,
            vec![
                SIPUSH, 0x01, 0x2c, //
                WIDE, ISTORE, 0x01, 0x2c, //
                WIDE, ILOAD, 0x01, 0x2c, //
                WIDE, IINC, 0x01, 0x2c, 0x00, 0xc8, //
                RETURN,
            ]
        );
        assert_eq!(decoded, with_limits(&ops));
    }

    #[test]
    fn protected_regions_round_trip() {
        let ops = vec![
            Op::TryCatch {
                start: Label(0),
                end: Label(1),
                handler: Label(1),
                catch_type: Some("java/lang/Exception".to_string()),
            },
            Op::TryCatch {
                start: Label(0),
                end: Label(1),
                handler: Label(1),
                catch_type: None,
            },
            Op::Label(Label(0)),
            Op::Insn(NOP),
            Op::Label(Label(1)),
            Op::Insn(ATHROW),
        ];
        let (code, decoded) = round_trip(&ops);

        assert_eq!(code.exception_table.len(), 2);
        assert_eq!(code.exception_table[0].start_pc, 0);
        assert_eq!(code.exception_table[0].end_pc, 1);
        assert_eq!(code.exception_table[0].handler_pc, 1);
        assert_ne!(code.exception_table[0].catch_type, 0);
        // a catch-all entry encodes its type as index 0
        assert_eq!(code.exception_table[1].catch_type, 0);

        assert_eq!(decoded, with_limits(&ops));
    }
}
