use crate::jvm::binary_format::{Deserialize, Serialize};
use crate::jvm::class_file::{Attribute, AttributeLike, Code, ConstantPool, Version};
use crate::jvm::{ClassAccessFlags, DecodeError, Error, FieldAccessFlags, MethodAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Read;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file, rejecting trailing bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, DecodeError> {
        let mut reader: &[u8] = bytes;

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| DecodeError::UnexpectedEof)?;
        if magic != ClassFile::MAGIC {
            return Err(DecodeError::InvalidMagic);
        }

        let version = Version::deserialize(&mut reader)?;
        let constants = ConstantPool::parse(&mut reader)?;
        let access_flags = ClassAccessFlags::deserialize(&mut reader)?;
        let this_class = u16::deserialize(&mut reader)?;
        let super_class = u16::deserialize(&mut reader)?;
        let interfaces = Vec::<u16>::deserialize(&mut reader)?;
        let fields = Vec::<Field>::deserialize(&mut reader)?;
        let methods = Vec::<Method>::deserialize(&mut reader)?;
        let attributes = Vec::<Attribute>::deserialize(&mut reader)?;

        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize back out to a byte vector
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes).map_err(Error::IoError)?;
        Ok(bytes)
    }

    /// Internal (slash separated) name of this class
    pub fn this_class_name(&self) -> Result<&str, DecodeError> {
        self.constants.class_name_at(self.this_class)
    }

    /// Internal name of the superclass; `None` only for `java/lang/Object` itself
    pub fn super_class_name(&self) -> Result<Option<&str>, DecodeError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            self.constants.class_name_at(self.super_class).map(Some)
        }
    }

    /// Position of the first method matching a name and (optionally) a descriptor
    ///
    /// The class file format tolerates several same-named methods. When no descriptor is given
    /// and several candidates match, the first one in declaration order wins.
    pub fn find_method(
        &self,
        name: &str,
        descriptor: Option<&str>,
    ) -> Result<Option<usize>, DecodeError> {
        for (position, method) in self.methods.iter().enumerate() {
            if self.constants.utf8_at(method.name_index)? != name {
                continue;
            }
            match descriptor {
                Some(descriptor)
                    if self.constants.utf8_at(method.descriptor_index)? != descriptor =>
                {
                    continue
                }
                _ => return Ok(Some(position)),
            }
        }
        Ok(None)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Field {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Field {
            access_flags: FieldAccessFlags::deserialize(reader)?,
            name_index: u16::deserialize(reader)?,
            descriptor_index: u16::deserialize(reader)?,
            attributes: Vec::<Attribute>::deserialize(reader)?,
        })
    }
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Method {
    /// Find an attribute by name
    pub fn attribute_named(&self, constants: &ConstantPool, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attribute| {
            constants
                .utf8_at(attribute.name_index)
                .map(|attribute_name| attribute_name == name)
                .unwrap_or(false)
        })
    }

    /// Parse this method's `Code` attribute, if it has one (`abstract` and `native` methods
    /// don't)
    pub fn code(&self, constants: &ConstantPool) -> Result<Option<Code>, DecodeError> {
        match self.attribute_named(constants, Code::NAME) {
            None => Ok(None),
            Some(position) => {
                let mut reader: &[u8] = &self.attributes[position].info;
                let code = Code::deserialize(&mut reader)?;
                if !reader.is_empty() {
                    return Err(DecodeError::TrailingBytes);
                }
                Ok(Some(code))
            }
        }
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: u16::deserialize(reader)?,
            descriptor_index: u16::deserialize(reader)?,
            attributes: Vec::<Attribute>::deserialize(reader)?,
        })
    }
}
