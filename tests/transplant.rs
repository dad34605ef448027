use classweave::jvm::class_file::ClassFile;
use classweave::jvm::code::{decode_code, opcodes, CodeSink, InstructionSequence, Op};
use classweave::jvm::model::{ClassShape, MethodShape, MethodSignature};
use classweave::jvm::names::{Name, QualifiedName, UnqualifiedName};
use classweave::jvm::{Error, MethodAccessFlags};
use classweave::weave::{
    emit_print_line, ClassGenerator, ClassResolver, ClassSubstitutor, MethodExtractor,
    MethodSplicer, MethodTemplate, SplicePolicy,
};
use std::collections::HashMap;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn class_shape(name: &str) -> ClassShape {
    ClassShape::new(QualifiedName::from_string(name.to_string()).unwrap())
}

fn static_shape(name: &str, descriptor: &str) -> MethodShape {
    MethodShape::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        UnqualifiedName::from_string(name.to_string()).unwrap(),
        MethodSignature::Raw(descriptor.to_string()),
    )
}

/// A class whose `probe(I)V` method returns from two places
fn multi_exit_class() -> Vec<u8> {
    use classweave::jvm::code::Label;
    let mut generator = ClassGenerator::new(class_shape("demo.MultiExit"));
    generator.add_method(MethodTemplate::default_constructor());
    generator.add_method(MethodTemplate::new(
        static_shape("probe", "(I)V"),
        |sink: &mut dyn CodeSink| {
            sink.var(opcodes::ILOAD, 0)?;
            sink.jump(opcodes::IFEQ, Label(0))?;
            sink.insn(opcodes::RETURN)?;
            sink.label(Label(0))
        },
    ));
    generator.generate().unwrap()
}

fn decode_method(class_bytes: &[u8], name: &str) -> InstructionSequence {
    let class = ClassFile::parse(class_bytes).unwrap();
    let position = class.find_method(name, None).unwrap().unwrap();
    let code = class.methods[position]
        .code(&class.constants)
        .unwrap()
        .unwrap();
    let mut sequence = InstructionSequence::new();
    decode_code(&code, &class.constants, &mut sequence).unwrap();
    sequence
}

fn println_fragment() -> InstructionSequence {
    let mut fragment = InstructionSequence::new();
    emit_print_line(&mut fragment, "visited").unwrap();
    fragment
}

fn is_println(op: &Op) -> bool {
    matches!(op, Op::Invoke { name, .. } if name == "println")
}

#[test]
fn extracted_body_survives_regeneration() {
    init_logging();

    let mut donor = ClassGenerator::new(class_shape("demo.Donor"));
    donor.add_method(MethodTemplate::new(
        static_shape("compute", "(I)I"),
        |sink: &mut dyn CodeSink| {
            sink.var(opcodes::ILOAD, 0)?;
            sink.int_operand(opcodes::BIPUSH, 42)?;
            sink.insn(opcodes::IADD)
        },
    ));
    let donor_bytes = donor.generate().unwrap();

    let captured = MethodExtractor::new("compute")
        .extract(&donor_bytes)
        .unwrap()
        .unwrap();
    let shape = captured.shape().unwrap();
    assert_eq!(shape.descriptor(), "(I)I");
    // the method's own ireturn is not part of the capture
    assert!(!captured
        .ops()
        .iter()
        .any(|op| matches!(op, Op::Insn(opcode) if opcodes::is_return(*opcode))));

    let mut host = ClassGenerator::new(class_shape("demo.Host"));
    host.add_method(MethodTemplate::from_sequence(captured.clone()).unwrap());
    let host_bytes = host.generate().unwrap();

    let recaptured = MethodExtractor::new("compute")
        .extract(&host_bytes)
        .unwrap()
        .unwrap();
    assert_eq!(captured.ops(), recaptured.ops());
}

#[test]
fn extractor_misses_return_none() {
    init_logging();
    let bytes = multi_exit_class();
    assert!(MethodExtractor::new("absent").extract(&bytes).unwrap().is_none());
    assert!(MethodExtractor::new("probe")
        .with_descriptor("(J)V")
        .extract(&bytes)
        .unwrap()
        .is_none());
}

#[test]
fn append_splice_runs_once_per_exit() {
    init_logging();
    let original = multi_exit_class();

    let spliced = MethodSplicer::new("probe")
        .splice(&original, &println_fragment(), SplicePolicy::AppendBeforeEveryExit)
        .unwrap()
        .unwrap();

    let sequence = decode_method(&spliced, "probe");
    let println_count = sequence.ops().iter().filter(|op| is_println(op)).count();
    assert_eq!(println_count, 2);

    // walking back from each return (skipping labels and line metadata) lands on the fragment
    for (position, op) in sequence.ops().iter().enumerate() {
        if !matches!(op, Op::Insn(opcode) if opcodes::is_return(*opcode)) {
            continue;
        }
        let preceding = sequence.ops()[..position]
            .iter()
            .rev()
            .find(|op| !matches!(op, Op::Label(_) | Op::LineNumber { .. }));
        assert!(preceding.map_or(false, is_println));
    }
}

#[test]
fn prepend_splice_runs_before_the_original_body() {
    init_logging();
    let original = multi_exit_class();

    let spliced = MethodSplicer::new("probe")
        .splice(&original, &println_fragment(), SplicePolicy::Prepend)
        .unwrap()
        .unwrap();

    let sequence = decode_method(&spliced, "probe");
    let first_load = sequence
        .ops()
        .iter()
        .position(|op| matches!(op, Op::Var { opcode, .. } if *opcode == opcodes::ILOAD));
    let println_at = sequence.ops().iter().position(is_println);
    assert!(println_at.unwrap() < first_load.unwrap());
    assert_eq!(
        sequence.ops().iter().filter(|op| is_println(op)).count(),
        1
    );
}

#[test]
fn splicing_leaves_sibling_methods_byte_identical() {
    init_logging();
    let original = multi_exit_class();

    let spliced = MethodSplicer::new("probe")
        .splice(&original, &println_fragment(), SplicePolicy::AppendBeforeEveryExit)
        .unwrap()
        .unwrap();

    let before = ClassFile::parse(&original).unwrap();
    let after = ClassFile::parse(&spliced).unwrap();
    let constructor_before = before.find_method("<init>", None).unwrap().unwrap();
    let constructor_after = after.find_method("<init>", None).unwrap().unwrap();
    assert_eq!(
        before.methods[constructor_before].attributes[0].info,
        after.methods[constructor_after].attributes[0].info,
    );
}

#[test]
fn splicer_misses_return_none() {
    init_logging();
    let bytes = multi_exit_class();
    let result = MethodSplicer::new("absent")
        .splice(&bytes, &println_fragment(), SplicePolicy::Prepend)
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn overloads_are_disambiguated_by_descriptor() {
    init_logging();

    let mut generator = ClassGenerator::new(class_shape("demo.Overloads"));
    generator.add_method(MethodTemplate::new(
        static_shape("f", "()I"),
        |sink: &mut dyn CodeSink| sink.insn(opcodes::ICONST_1),
    ));
    generator.add_method(MethodTemplate::new(
        static_shape("f", "()J"),
        |sink: &mut dyn CodeSink| sink.insn(opcodes::LCONST_1),
    ));
    let bytes = generator.generate().unwrap();

    let wide = MethodExtractor::new("f")
        .with_descriptor("()J")
        .extract(&bytes)
        .unwrap()
        .unwrap();
    assert_eq!(wide.ops(), &[Op::Insn(opcodes::LCONST_1)]);

    // without a descriptor the first declaration wins
    let first = MethodExtractor::new("f").extract(&bytes).unwrap().unwrap();
    assert_eq!(first.ops(), &[Op::Insn(opcodes::ICONST_1)]);
}

#[test]
fn exit_instructions_follow_the_return_category() {
    init_logging();

    let cases: &[(&str, &str, fn(&mut dyn CodeSink) -> Result<(), Error>, u8)] = &[
        ("v", "()V", |_| Ok(()), opcodes::RETURN),
        ("i", "()I", |s| s.insn(opcodes::ICONST_0), opcodes::IRETURN),
        ("z", "()Z", |s| s.insn(opcodes::ICONST_0), opcodes::IRETURN),
        ("j", "()J", |s| s.insn(opcodes::LCONST_0), opcodes::LRETURN),
        ("f", "()F", |s| s.insn(opcodes::FCONST_0), opcodes::FRETURN),
        ("d", "()D", |s| s.insn(opcodes::DCONST_0), opcodes::DRETURN),
        (
            "a",
            "()Ljava/lang/Object;",
            |s| s.insn(opcodes::ACONST_NULL),
            opcodes::ARETURN,
        ),
        (
            "arr",
            "()[I",
            |s| s.insn(opcodes::ACONST_NULL),
            opcodes::ARETURN,
        ),
    ];

    let mut generator = ClassGenerator::new(class_shape("demo.Exits"));
    for (name, descriptor, body, _) in cases {
        generator.add_method(MethodTemplate::new(static_shape(name, descriptor), *body));
    }
    let bytes = generator.generate().unwrap();
    let class = ClassFile::parse(&bytes).unwrap();

    for (name, _, _, expected_exit) in cases {
        let position = class.find_method(name, None).unwrap().unwrap();
        let code = class.methods[position]
            .code(&class.constants)
            .unwrap()
            .unwrap();
        assert_eq!(code.bytecode.last(), Some(expected_exit), "{}", name);
    }
}

#[test]
fn parse_then_encode_is_byte_identical() {
    init_logging();
    let bytes = multi_exit_class();
    let reencoded = ClassFile::parse(&bytes).unwrap().encode().unwrap();
    assert_eq!(bytes, reencoded);
}

#[test]
fn substitution_defines_each_class_at_most_once() {
    init_logging();

    let mut generator = ClassGenerator::new(class_shape("demo.Sub"));
    generator.add_method(MethodTemplate::default_constructor());
    let sub_bytes = generator.generate().unwrap();

    let mut replacements = HashMap::new();
    replacements.insert("demo.Sub".to_string(), sub_bytes.clone());
    let substitutor = ClassSubstitutor::standalone(&replacements).unwrap();

    let first = substitutor.resolve("demo.Sub").unwrap();
    let second = substitutor.resolve("demo.Sub").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.name.as_str(), "demo.Sub");
    assert_eq!(first.bytes, sub_bytes);
    assert_eq!(first.super_name.as_deref(), Some("java/lang/Object"));
    assert!(first
        .methods
        .iter()
        .any(|shape| shape.name.as_str() == "<init>"));

    // names outside the table fall through to the resolver chain
    let missing = substitutor.resolve("demo.Unmapped").unwrap_err();
    assert!(matches!(missing, Error::ClassNotFound(name) if name == "demo.Unmapped"));
}

#[test]
fn substituted_bytes_must_declare_the_mapped_name() {
    init_logging();

    let mut generator = ClassGenerator::new(class_shape("demo.Sub"));
    generator.add_method(MethodTemplate::default_constructor());
    let sub_bytes = generator.generate().unwrap();

    let mut replacements = HashMap::new();
    replacements.insert("demo.Other".to_string(), sub_bytes);
    let substitutor = ClassSubstitutor::standalone(&replacements).unwrap();

    let err = substitutor.resolve("demo.Other").unwrap_err();
    match err {
        Error::DefinitionFailure { name, cause } => {
            assert_eq!(name, "demo.Other");
            assert!(matches!(
                *cause,
                Error::NameMismatch { expected, actual }
                    if expected == "demo.Other" && actual == "demo.Sub"
            ));
        }
        other => panic!("expected definition failure, got {:?}", other),
    }
}

#[test]
fn fragment_with_control_flow_can_be_planted_at_every_exit() {
    init_logging();
    use classweave::jvm::code::Label;

    // fragment with its own label; planting it twice forces label renumbering
    let mut fragment = InstructionSequence::new();
    fragment.push(Op::Var {
        opcode: opcodes::ILOAD,
        index: 0,
    });
    fragment.push(Op::Jump {
        opcode: opcodes::IFEQ,
        target: Label(0),
    });
    fragment.push(Op::Insn(opcodes::NOP));
    fragment.push(Op::Label(Label(0)));

    let spliced = MethodSplicer::new("probe")
        .splice(&multi_exit_class(), &fragment, SplicePolicy::AppendBeforeEveryExit)
        .unwrap()
        .unwrap();

    // the result still parses and the rewritten method carries both copies
    let sequence = decode_method(&spliced, "probe");
    let branch_count = sequence
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::Jump { opcode, .. } if *opcode == opcodes::IFEQ))
        .count();
    assert_eq!(branch_count, 3);
}
