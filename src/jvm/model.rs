use crate::jvm::class_file::Version;
use crate::jvm::code::opcodes;
use crate::jvm::descriptors::{
    BaseType, FieldType, MethodDescriptor, ParseDescriptor, RenderDescriptor,
};
use crate::jvm::names::{Name, QualifiedName, UnqualifiedName};
use crate::jvm::{ClassAccessFlags, Error, MethodAccessFlags};

/// Declarative description of a class to synthesize
///
/// Names are in Java source (dotted) form; the slash separated internal renditions are derived
/// when the class file is emitted. Generic signatures are out of scope: a shape only ever
/// describes erased types.
#[derive(Debug, Clone)]
pub struct ClassShape {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub name: QualifiedName,
    pub super_name: QualifiedName,
    pub interfaces: Vec<QualifiedName>,
}

impl ClassShape {
    /// A public class extending `java.lang.Object` with no interfaces, at the default version
    pub fn new(name: QualifiedName) -> ClassShape {
        let object = match QualifiedName::from_string("java.lang.Object".to_string()) {
            Ok(object) => object,
            Err(_) => unreachable!("'java.lang.Object' is a valid qualified name"),
        };
        ClassShape {
            version: Version::default(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name,
            super_name: object,
            interfaces: vec![],
        }
    }
}

/// Declarative description of one method: flags, name, and a signature
#[derive(Debug, Clone, PartialEq)]
pub struct MethodShape {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub signature: MethodSignature,
}

/// The two mutually exclusive ways a method signature is supplied
///
/// `Typed` builds the descriptor from structured types; `Raw` carries a pre-rendered descriptor
/// string through unchanged. A malformed `Raw` descriptor only fails when something actually
/// needs to interpret it.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodSignature {
    Typed(MethodDescriptor),
    Raw(String),
}

/// Category a method returns, which determines its exit instruction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ReturnKind {
    /// The `*return` opcode terminating a method of this category
    pub fn exit_opcode(&self) -> u8 {
        match self {
            ReturnKind::Void => opcodes::RETURN,
            ReturnKind::Int => opcodes::IRETURN,
            ReturnKind::Long => opcodes::LRETURN,
            ReturnKind::Float => opcodes::FRETURN,
            ReturnKind::Double => opcodes::DRETURN,
            ReturnKind::Reference => opcodes::ARETURN,
        }
    }

    fn of_field_type(return_type: &Option<FieldType>) -> ReturnKind {
        match return_type {
            None => ReturnKind::Void,
            Some(FieldType::Base(BaseType::Long)) => ReturnKind::Long,
            Some(FieldType::Base(BaseType::Float)) => ReturnKind::Float,
            Some(FieldType::Base(BaseType::Double)) => ReturnKind::Double,
            Some(FieldType::Base(_)) => ReturnKind::Int,
            Some(FieldType::Object(_) | FieldType::Array(_)) => ReturnKind::Reference,
        }
    }
}

impl MethodShape {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        signature: MethodSignature,
    ) -> MethodShape {
        MethodShape {
            access_flags,
            name,
            signature,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// The rendered descriptor string
    pub fn descriptor(&self) -> String {
        match &self.signature {
            MethodSignature::Typed(descriptor) => descriptor.render(),
            MethodSignature::Raw(descriptor) => descriptor.clone(),
        }
    }

    /// Structured view of the signature, parsing the raw form if necessary
    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor, Error> {
        match &self.signature {
            MethodSignature::Typed(descriptor) => Ok(descriptor.clone()),
            MethodSignature::Raw(descriptor) => MethodDescriptor::parse(descriptor)
                .map_err(|_| Error::BadDescriptor(descriptor.clone())),
        }
    }

    /// Category of the return type
    ///
    /// A raw signature whose return type cannot be categorized is a hard error, not a silent
    /// fallback to `Void`.
    pub fn return_kind(&self) -> Result<ReturnKind, Error> {
        match &self.signature {
            MethodSignature::Typed(descriptor) => {
                Ok(ReturnKind::of_field_type(&descriptor.return_type))
            }
            MethodSignature::Raw(descriptor) => {
                let return_part = descriptor
                    .rsplit_once(')')
                    .map(|(_, ret)| ret)
                    .ok_or_else(|| Error::BadDescriptor(descriptor.clone()))?;
                match return_part.chars().next() {
                    Some('V') => Ok(ReturnKind::Void),
                    Some('I' | 'Z' | 'B' | 'C' | 'S') => Ok(ReturnKind::Int),
                    Some('J') => Ok(ReturnKind::Long),
                    Some('F') => Ok(ReturnKind::Float),
                    Some('D') => Ok(ReturnKind::Double),
                    Some('L' | '[') => Ok(ReturnKind::Reference),
                    _ => Err(Error::BadDescriptor(descriptor.clone())),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::names::BinaryName;

    fn shape(signature: MethodSignature) -> MethodShape {
        MethodShape::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            UnqualifiedName::from_string("probe".to_string()).unwrap(),
            signature,
        )
    }

    #[test]
    fn typed_and_raw_descriptors_agree() {
        let typed = shape(MethodSignature::Typed(MethodDescriptor {
            parameters: vec![FieldType::INT, FieldType::object(BinaryName::STRING)],
            return_type: Some(FieldType::object(BinaryName::STRING)),
        }));
        let raw = shape(MethodSignature::Raw(
            "(ILjava/lang/String;)Ljava/lang/String;".to_string(),
        ));
        assert_eq!(typed.descriptor(), raw.descriptor());
        assert_eq!(typed.return_kind().unwrap(), ReturnKind::Reference);
        assert_eq!(raw.return_kind().unwrap(), ReturnKind::Reference);
    }

    #[test]
    fn exit_opcodes_cover_every_category() {
        let cases: &[(&str, u8)] = &[
            ("()V", opcodes::RETURN),
            ("()I", opcodes::IRETURN),
            ("()Z", opcodes::IRETURN),
            ("()B", opcodes::IRETURN),
            ("()C", opcodes::IRETURN),
            ("()S", opcodes::IRETURN),
            ("()J", opcodes::LRETURN),
            ("()F", opcodes::FRETURN),
            ("()D", opcodes::DRETURN),
            ("()Ljava/lang/Object;", opcodes::ARETURN),
            ("()[I", opcodes::ARETURN),
        ];
        for (descriptor, expected) in cases {
            let shape = shape(MethodSignature::Raw(descriptor.to_string()));
            assert_eq!(
                shape.return_kind().unwrap().exit_opcode(),
                *expected,
                "{}",
                descriptor
            );
        }
    }

    #[test]
    fn unknown_return_category_fails_loudly() {
        let shape = shape(MethodSignature::Raw("()Q".to_string()));
        assert!(matches!(shape.return_kind(), Err(Error::BadDescriptor(_))));
    }
}
