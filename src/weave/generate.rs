use crate::jvm::class_file::{ClassFile, ConstantPool, Method};
use crate::jvm::code::{encode_code, CodeSink, InstructionSequence, LoadableConstant};
use crate::jvm::descriptors::{FieldType, MethodDescriptor, RenderDescriptor};
use crate::jvm::model::{ClassShape, MethodShape, MethodSignature};
use crate::jvm::names::{BinaryName, Name, UnqualifiedName};
use crate::jvm::verifier::compute_limits;
use crate::jvm::{Error, MethodAccessFlags};
use log::{debug, trace};

/// Source of a method body's instruction events
///
/// Implemented by closures that drive a sink directly and by previously captured sequences, so
/// hand-written and transplanted bodies go through the same machinery.
pub trait BodyWriter {
    fn write_body(&self, sink: &mut dyn CodeSink) -> Result<(), Error>;
}

impl<F> BodyWriter for F
where
    F: Fn(&mut dyn CodeSink) -> Result<(), Error>,
{
    fn write_body(&self, sink: &mut dyn CodeSink) -> Result<(), Error> {
        self(sink)
    }
}

impl BodyWriter for InstructionSequence {
    fn write_body(&self, sink: &mut dyn CodeSink) -> Result<(), Error> {
        self.replay(sink)
    }
}

/// One method to synthesize: a shape plus a body
///
/// The body is open ended. A single exit instruction matching the method's return category is
/// appended during generation, so writers never emit their own final return (internal early
/// returns are fine).
pub struct MethodTemplate {
    pub shape: MethodShape,
    body: Box<dyn BodyWriter>,
}

impl MethodTemplate {
    pub fn new(shape: MethodShape, body: impl BodyWriter + 'static) -> MethodTemplate {
        MethodTemplate {
            shape,
            body: Box::new(body),
        }
    }

    /// Turn a captured sequence into a template using the shape it was recorded with
    pub fn from_sequence(sequence: InstructionSequence) -> Result<MethodTemplate, Error> {
        let shape = sequence.shape().cloned().ok_or(Error::MissingMethodShape)?;
        Ok(MethodTemplate::new(shape, sequence))
    }

    /// The conventional no-argument constructor deferring to `java.lang.Object`
    pub fn default_constructor() -> MethodTemplate {
        let shape = MethodShape::new(
            MethodAccessFlags::PUBLIC,
            UnqualifiedName::INIT,
            MethodSignature::Typed(MethodDescriptor {
                parameters: vec![],
                return_type: None,
            }),
        );
        MethodTemplate::new(shape, |sink: &mut dyn CodeSink| {
            sink.var(crate::jvm::code::opcodes::ALOAD, 0)?;
            sink.invoke(
                crate::jvm::code::opcodes::INVOKESPECIAL,
                BinaryName::OBJECT.as_str(),
                UnqualifiedName::INIT.as_str(),
                "()V",
                false,
            )
        })
    }
}

/// Emit instructions printing a constant line to standard out
pub fn emit_print_line(sink: &mut dyn CodeSink, message: &str) -> Result<(), Error> {
    use crate::jvm::code::opcodes;
    let stream_descriptor = FieldType::object(BinaryName::PRINTSTREAM).render();
    sink.field(
        opcodes::GETSTATIC,
        BinaryName::SYSTEM.as_str(),
        UnqualifiedName::OUT.as_str(),
        &stream_descriptor,
    )?;
    sink.ldc(&LoadableConstant::String(message.to_string()))?;
    sink.invoke(
        opcodes::INVOKEVIRTUAL,
        BinaryName::PRINTSTREAM.as_str(),
        UnqualifiedName::PRINTLN.as_str(),
        "(Ljava/lang/String;)V",
        false,
    )
}

/// Builds a complete class file from a declarative shape and a list of method templates
pub struct ClassGenerator {
    shape: ClassShape,
    methods: Vec<MethodTemplate>,
}

impl ClassGenerator {
    pub fn new(shape: ClassShape) -> ClassGenerator {
        ClassGenerator {
            shape,
            methods: vec![],
        }
    }

    pub fn add_method(&mut self, template: MethodTemplate) -> &mut ClassGenerator {
        self.methods.push(template);
        self
    }

    /// Produce the finished class file bytes
    ///
    /// Every method body is recorded, checked, and given freshly computed stack and local
    /// limits. A body whose instructions cannot be verified fails the whole generation, naming
    /// the offending method.
    pub fn generate(&self) -> Result<Vec<u8>, Error> {
        debug!(
            "generating class {} with {} methods",
            self.shape.name.as_str(),
            self.methods.len()
        );

        let mut constants = ConstantPool::new();
        let this_class = constants.get_class(self.shape.name.internal().as_str())?;
        let super_class = constants.get_class(self.shape.super_name.internal().as_str())?;
        let interfaces = self
            .shape
            .interfaces
            .iter()
            .map(|interface| constants.get_class(interface.internal().as_str()))
            .collect::<Result<Vec<u16>, Error>>()?;

        let mut methods = vec![];
        for template in &self.methods {
            methods.push(Self::generate_method(template, &mut constants)?);
        }

        let class = ClassFile {
            version: self.shape.version,
            constants,
            access_flags: self.shape.access_flags,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods,
            attributes: vec![],
        };
        class.encode()
    }

    fn generate_method(
        template: &MethodTemplate,
        constants: &mut ConstantPool,
    ) -> Result<Method, Error> {
        let shape = &template.shape;

        let mut sequence = InstructionSequence::new();
        template.body.write_body(&mut sequence)?;
        sequence.insn(shape.return_kind()?.exit_opcode())?;

        if log::log_enabled!(log::Level::Trace) {
            for op in sequence.ops() {
                trace!("{}{}  {}", shape.name.as_str(), shape.descriptor(), op);
            }
        }

        let limits = compute_limits(
            sequence.ops(),
            &shape.parsed_descriptor()?,
            shape.is_static(),
        )
        .map_err(|kind| Error::VerificationFailure {
            method: shape.name.as_str().to_string(),
            kind,
        })?;

        let code = encode_code(
            sequence.ops(),
            constants,
            limits.max_stack,
            limits.max_locals,
        )?;

        Ok(Method {
            access_flags: shape.access_flags,
            name_index: constants.get_utf8(shape.name.as_str())?,
            descriptor_index: constants.get_utf8(&shape.descriptor())?,
            attributes: vec![constants.get_attribute(code)?],
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::model::ReturnKind;
    use crate::jvm::names::QualifiedName;

    fn probe_shape() -> ClassShape {
        ClassShape::new(QualifiedName::from_string("com.example.Probe".to_string()).unwrap())
    }

    #[test]
    fn generated_class_parses_back() {
        let mut generator = ClassGenerator::new(probe_shape());
        generator.add_method(MethodTemplate::default_constructor());
        generator.add_method(MethodTemplate::new(
            MethodShape::new(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                UnqualifiedName::MAIN,
                MethodSignature::Raw("([Ljava/lang/String;)V".to_string()),
            ),
            |sink: &mut dyn CodeSink| emit_print_line(sink, "hello"),
        ));

        let bytes = generator.generate().unwrap();
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class_name().unwrap(), "com/example/Probe");
        assert_eq!(
            class.super_class_name().unwrap(),
            Some("java/lang/Object")
        );
        assert_eq!(class.methods.len(), 2);

        let main = class.find_method("main", None).unwrap().unwrap();
        let code = class.methods[main].code(&class.constants).unwrap().unwrap();
        assert_eq!(code.max_stack, 2);
        // one reference parameter, no this
        assert_eq!(code.max_locals, 1);
        assert_eq!(
            code.bytecode.last(),
            Some(&ReturnKind::Void.exit_opcode())
        );
    }

    #[test]
    fn underflowing_body_names_the_method() {
        let mut generator = ClassGenerator::new(probe_shape());
        generator.add_method(MethodTemplate::new(
            MethodShape::new(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                UnqualifiedName::from_string("bad".to_string()).unwrap(),
                MethodSignature::Raw("()I".to_string()),
            ),
            // nothing pushed, but the appended ireturn pops
            |_sink: &mut dyn CodeSink| Ok(()),
        ));

        match generator.generate() {
            Err(Error::VerificationFailure { method, .. }) => assert_eq!(method, "bad"),
            other => panic!("expected verification failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn sequence_without_shape_is_rejected() {
        let sequence = InstructionSequence::new();
        assert!(matches!(
            MethodTemplate::from_sequence(sequence),
            Err(Error::MissingMethodShape)
        ));
    }
}
