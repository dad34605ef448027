use crate::jvm::code::{CodeSink, Label, LoadableConstant, Op};
use crate::jvm::model::MethodShape;
use crate::jvm::Error;

/// A recorded method body: the deferred, replayable form of a stream of [`CodeSink`] events
///
/// The sequence is append only. Feeding it events (it is itself a `CodeSink`) records them;
/// [`InstructionSequence::replay`] reproduces the recorded events against any other sink in the
/// original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionSequence {
    ops: Vec<Op>,
    shape: Option<MethodShape>,
}

impl InstructionSequence {
    pub fn new() -> InstructionSequence {
        InstructionSequence {
            ops: vec![],
            shape: None,
        }
    }

    /// A sequence tagged with the shape of the method it was recorded from
    pub fn with_shape(shape: MethodShape) -> InstructionSequence {
        InstructionSequence {
            ops: vec![],
            shape: Some(shape),
        }
    }

    /// Shape of the originating method, when known
    pub fn shape(&self) -> Option<&MethodShape> {
        self.shape.as_ref()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Replay every recorded event, in order, against another sink
    pub fn replay(&self, sink: &mut dyn CodeSink) -> Result<(), Error> {
        for op in &self.ops {
            replay_op(op, sink)?;
        }
        Ok(())
    }

    /// Smallest label id strictly greater than every label in the sequence
    pub fn label_bound(&self) -> u32 {
        self.ops
            .iter()
            .filter_map(Op::max_label)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Renumber every label upward, making room to merge with another sequence
    pub fn shift_labels(&mut self, by: u32) {
        for op in &mut self.ops {
            op.map_labels(|label| Label(label.0 + by));
        }
    }
}

/// Dispatch a single op to the corresponding sink event
pub fn replay_op(op: &Op, sink: &mut dyn CodeSink) -> Result<(), Error> {
    match op {
        Op::Insn(opcode) => sink.insn(*opcode),
        Op::IntOperand { opcode, operand } => sink.int_operand(*opcode, *operand),
        Op::Var { opcode, index } => sink.var(*opcode, *index),
        Op::Iinc { index, delta } => sink.iinc(*index, *delta),
        Op::Type { opcode, class } => sink.type_insn(*opcode, class),
        Op::Field {
            opcode,
            owner,
            name,
            descriptor,
        } => sink.field(*opcode, owner, name, descriptor),
        Op::Invoke {
            opcode,
            owner,
            name,
            descriptor,
            interface,
        } => sink.invoke(*opcode, owner, name, descriptor, *interface),
        Op::Ldc(constant) => sink.ldc(constant),
        Op::Label(label) => sink.label(*label),
        Op::Jump { opcode, target } => sink.jump(*opcode, *target),
        Op::TableSwitch {
            low,
            high,
            default,
            targets,
        } => sink.table_switch(*low, *high, *default, targets),
        Op::LookupSwitch { default, pairs } => sink.lookup_switch(*default, pairs),
        Op::MultiANewArray {
            descriptor,
            dimensions,
        } => sink.multi_new_array(descriptor, *dimensions),
        Op::TryCatch {
            start,
            end,
            handler,
            catch_type,
        } => sink.try_catch(*start, *end, *handler, catch_type.as_deref()),
        Op::LineNumber { line, start } => sink.line_number(*line, *start),
        Op::LocalVariable {
            name,
            descriptor,
            start,
            end,
            index,
        } => sink.local_variable(name, descriptor, *start, *end, *index),
        Op::StackLimits { stack, locals } => sink.stack_limits(*stack, *locals),
    }
}

impl CodeSink for InstructionSequence {
    fn insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.ops.push(Op::Insn(opcode));
        Ok(())
    }

    fn int_operand(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.ops.push(Op::IntOperand { opcode, operand });
        Ok(())
    }

    fn var(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        self.ops.push(Op::Var { opcode, index });
        Ok(())
    }

    fn iinc(&mut self, index: u16, delta: i16) -> Result<(), Error> {
        self.ops.push(Op::Iinc { index, delta });
        Ok(())
    }

    fn type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        self.ops.push(Op::Type {
            opcode,
            class: class.to_string(),
        });
        Ok(())
    }

    fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<(), Error> {
        self.ops.push(Op::Field {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        Ok(())
    }

    fn invoke(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<(), Error> {
        self.ops.push(Op::Invoke {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        });
        Ok(())
    }

    fn ldc(&mut self, constant: &LoadableConstant) -> Result<(), Error> {
        self.ops.push(Op::Ldc(constant.clone()));
        Ok(())
    }

    fn label(&mut self, label: Label) -> Result<(), Error> {
        self.ops.push(Op::Label(label));
        Ok(())
    }

    fn jump(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        self.ops.push(Op::Jump { opcode, target });
        Ok(())
    }

    fn table_switch(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.ops.push(Op::TableSwitch {
            low,
            high,
            default,
            targets: targets.to_vec(),
        });
        Ok(())
    }

    fn lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) -> Result<(), Error> {
        self.ops.push(Op::LookupSwitch {
            default,
            pairs: pairs.to_vec(),
        });
        Ok(())
    }

    fn multi_new_array(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        self.ops.push(Op::MultiANewArray {
            descriptor: descriptor.to_string(),
            dimensions,
        });
        Ok(())
    }

    fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        self.ops.push(Op::TryCatch {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        Ok(())
    }

    fn line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.ops.push(Op::LineNumber { line, start });
        Ok(())
    }

    fn local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        self.ops.push(Op::LocalVariable {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            start,
            end,
            index,
        });
        Ok(())
    }

    fn stack_limits(&mut self, stack: u16, locals: u16) -> Result<(), Error> {
        self.ops.push(Op::StackLimits { stack, locals });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes;

    #[test]
    fn recording_and_replaying_match() {
        let mut original = InstructionSequence::new();
        original.insn(opcodes::ICONST_0).unwrap();
        original.var(opcodes::ISTORE, 1).unwrap();
        original.label(Label(0)).unwrap();
        original.jump(opcodes::GOTO, Label(0)).unwrap();

        let mut copy = InstructionSequence::new();
        original.replay(&mut copy).unwrap();
        assert_eq!(original.ops(), copy.ops());
    }

    #[test]
    fn label_bound_and_shift() {
        let mut seq = InstructionSequence::new();
        assert_eq!(seq.label_bound(), 0);
        seq.label(Label(2)).unwrap();
        seq.jump(opcodes::GOTO, Label(5)).unwrap();
        assert_eq!(seq.label_bound(), 6);

        seq.shift_labels(10);
        assert_eq!(
            seq.ops(),
            &[
                Op::Label(Label(12)),
                Op::Jump {
                    opcode: opcodes::GOTO,
                    target: Label(15)
                }
            ]
        );
    }
}
