use crate::jvm::class_file::{AttributeLike, ClassFile, Code};
use crate::jvm::code::{decode_code, opcodes, InstructionSequence, Op};
use crate::jvm::model::{MethodShape, MethodSignature};
use crate::jvm::names::{Name, UnqualifiedName};
use crate::jvm::verifier::compute_limits;
use crate::jvm::Error;
use log::{debug, trace};

/// Where injected instructions land relative to the target method's own body
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SplicePolicy {
    /// Run the injected fragment once, before the first original instruction
    Prepend,
    /// Run the injected fragment immediately before every return of the method, so it executes
    /// exactly once per invocation no matter which exit is taken
    AppendBeforeEveryExit,
}

/// Rewrites one method inside an existing class by splicing a fragment into its body
///
/// Only the targeted method is rebuilt. Sibling methods keep their attribute bytes untouched,
/// and the constant pool only ever grows, so their indices stay valid.
#[derive(Debug, Clone)]
pub struct MethodSplicer {
    method_name: String,
    descriptor: Option<String>,
}

impl MethodSplicer {
    pub fn new(method_name: impl Into<String>) -> MethodSplicer {
        MethodSplicer {
            method_name: method_name.into(),
            descriptor: None,
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> MethodSplicer {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Splice `injected` into the targeted method and re-emit the class
    ///
    /// `Ok(None)` when no method matches, or the match has no body to splice into. The injected
    /// fragment's labels are renumbered on each insertion, so a fragment with internal control
    /// flow can be planted at several exits of the same method.
    pub fn splice(
        &self,
        class_bytes: &[u8],
        injected: &InstructionSequence,
        policy: SplicePolicy,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut class = ClassFile::parse(class_bytes)?;
        let position = match class.find_method(&self.method_name, self.descriptor.as_deref())? {
            None => return Ok(None),
            Some(position) => position,
        };
        let method = &class.methods[position];
        let code_attribute = match method.attribute_named(&class.constants, Code::NAME) {
            None => return Ok(None),
            Some(attribute) => attribute,
        };
        let code = match method.code(&class.constants)? {
            None => return Ok(None),
            Some(code) => code,
        };

        let name = class.constants.utf8_at(method.name_index)?.to_string();
        let descriptor = class.constants.utf8_at(method.descriptor_index)?.to_string();
        debug!(
            "splicing {} ops into {}{} ({:?})",
            injected.len(),
            name,
            descriptor,
            policy
        );

        let shape = MethodShape::new(
            method.access_flags,
            UnqualifiedName::from_string(name).map_err(Error::InvalidName)?,
            MethodSignature::Raw(descriptor),
        );

        let mut target = InstructionSequence::new();
        decode_code(&code, &class.constants, &mut target)?;

        let ops = weave_ops(target.ops(), injected, policy, target.label_bound());
        if log::log_enabled!(log::Level::Trace) {
            for op in &ops {
                trace!("{}", op);
            }
        }

        let limits = compute_limits(&ops, &shape.parsed_descriptor()?, shape.is_static()).map_err(
            |kind| Error::VerificationFailure {
                method: shape.name.as_str().to_string(),
                kind,
            },
        )?;
        let rebuilt = encode(&ops, &mut class, limits.max_stack, limits.max_locals)?;

        class.methods[position].attributes[code_attribute] = rebuilt;
        Ok(Some(class.encode()?))
    }
}

fn encode(
    ops: &[Op],
    class: &mut ClassFile,
    max_stack: u16,
    max_locals: u16,
) -> Result<crate::jvm::class_file::Attribute, Error> {
    let code = crate::jvm::code::encode_code(ops, &mut class.constants, max_stack, max_locals)?;
    class.constants.get_attribute(code)
}

/// Interleave the injected fragment with the target's ops according to the policy
///
/// Every opcode in the `ireturn..=return` range counts as an exit, not just the one the target's
/// own return category implies, so a fragment lands before each return even in a body whose
/// returns disagree with the declared descriptor.
fn weave_ops(
    target: &[Op],
    injected: &InstructionSequence,
    policy: SplicePolicy,
    label_base: u32,
) -> Vec<Op> {
    let injected_span = injected.label_bound();
    let mut insertions = 0u32;
    let mut fresh_copy = |ops: &mut Vec<Op>| {
        let mut copy = injected.clone();
        copy.shift_labels(label_base + insertions * injected_span);
        insertions += 1;
        ops.extend_from_slice(copy.ops());
    };

    let mut ops = Vec::with_capacity(target.len() + injected.len());
    match policy {
        SplicePolicy::Prepend => {
            fresh_copy(&mut ops);
            ops.extend_from_slice(target);
        }
        SplicePolicy::AppendBeforeEveryExit => {
            for op in target {
                if matches!(op, Op::Insn(opcode) if (opcodes::IRETURN..=opcodes::RETURN).contains(opcode)) {
                    fresh_copy(&mut ops);
                }
                ops.push(op.clone());
            }
        }
    }
    ops
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Label;

    fn exit_heavy_target() -> Vec<Op> {
        vec![
            Op::Var {
                opcode: opcodes::ILOAD,
                index: 0,
            },
            Op::Jump {
                opcode: opcodes::IFEQ,
                target: Label(0),
            },
            Op::Insn(opcodes::RETURN),
            Op::Label(Label(0)),
            Op::Insn(opcodes::RETURN),
        ]
    }

    #[test]
    fn append_duplicates_fragment_at_each_exit() {
        let mut injected = InstructionSequence::new();
        injected.push(Op::Label(Label(0)));
        injected.push(Op::Insn(opcodes::NOP));

        let ops = weave_ops(
            &exit_heavy_target(),
            &injected,
            SplicePolicy::AppendBeforeEveryExit,
            1,
        );
        // copies get disjoint labels: base 1, then base 2
        assert_eq!(
            ops,
            vec![
                Op::Var {
                    opcode: opcodes::ILOAD,
                    index: 0
                },
                Op::Jump {
                    opcode: opcodes::IFEQ,
                    target: Label(0)
                },
                Op::Label(Label(1)),
                Op::Insn(opcodes::NOP),
                Op::Insn(opcodes::RETURN),
                Op::Label(Label(0)),
                Op::Label(Label(2)),
                Op::Insn(opcodes::NOP),
                Op::Insn(opcodes::RETURN),
            ]
        );
    }

    #[test]
    fn prepend_runs_before_the_original_entry() {
        let mut injected = InstructionSequence::new();
        injected.push(Op::Insn(opcodes::NOP));

        let ops = weave_ops(
            &[Op::Insn(opcodes::RETURN)],
            &injected,
            SplicePolicy::Prepend,
            0,
        );
        assert_eq!(
            ops,
            vec![Op::Insn(opcodes::NOP), Op::Insn(opcodes::RETURN)]
        );
    }

    #[test]
    fn every_return_category_counts_as_an_exit() {
        let mut injected = InstructionSequence::new();
        injected.push(Op::Insn(opcodes::NOP));

        let target = vec![
            Op::Insn(opcodes::ICONST_0),
            Op::Insn(opcodes::IRETURN),
            Op::Insn(opcodes::ACONST_NULL),
            Op::Insn(opcodes::ARETURN),
            Op::Insn(opcodes::DCONST_0),
            Op::Insn(opcodes::DRETURN),
            Op::Insn(opcodes::ATHROW),
        ];
        let ops = weave_ops(&target, &injected, SplicePolicy::AppendBeforeEveryExit, 0);

        let insertions = ops
            .iter()
            .zip(ops.iter().skip(1))
            .filter(|(op, next)| {
                **op == Op::Insn(opcodes::NOP)
                    && matches!(
                        next,
                        Op::Insn(opcode) if (opcodes::IRETURN..=opcodes::RETURN).contains(opcode)
                    )
            })
            .count();
        assert_eq!(insertions, 3);
        // throwing out of the method is not a return
        assert_eq!(
            &ops[ops.len() - 1..],
            &[Op::Insn(opcodes::ATHROW)]
        );
    }
}
