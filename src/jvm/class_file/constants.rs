use crate::jvm::binary_format::{read_bytes, Deserialize, Serialize};
use crate::jvm::class_file::{Attribute, AttributeLike};
use crate::jvm::{DecodeError, Error};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// Class file constant pool
///
/// The pool is append only: parsing fills it with the entries already present in a class file,
/// and the `get_*` accessors insert new entries (with deduplication) without ever disturbing
/// existing indices. Rewriting one method of a parsed class consequently never invalidates the
/// constant references of its untouched siblings.
pub struct ConstantPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, u16>,
    classes: HashMap<u16, u16>,
    strings: HashMap<u16, u16>,
    name_and_types: HashMap<(u16, u16), u16>,
    fieldrefs: HashMap<(u16, u16), u16>,
    methodrefs: HashMap<(u16, u16, bool), u16>,
    integers: HashMap<i32, u16>,
    floats: HashMap<[u8; 4], u16>,
    longs: HashMap<i64, u16>,
    doubles: HashMap<[u8; 8], u16>,
}

impl ConstantPool {
    /// Make a fresh empty constant pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
        }
    }

    /// Read the `constant_pool_count` and all entries
    pub fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantPool, DecodeError> {
        let count = u16::deserialize(reader)?;
        let mut pool = ConstantPool::new();
        while (pool.constants.offset_len().0 as u16) < count {
            let constant = Constant::deserialize(reader)?;
            pool.constants.push(constant);
        }
        pool.rebuild_dedup_maps();
        Ok(pool)
    }

    /// Entries can forward-reference each other, so the lookup maps can only be derived once
    /// every entry is in
    fn rebuild_dedup_maps(&mut self) {
        for (offset, _, constant) in self.constants.iter() {
            let index = offset.0 as u16;
            match constant {
                Constant::Utf8(string) => {
                    self.utf8s.entry(string.clone()).or_insert(index);
                }
                Constant::Class(name) => {
                    self.classes.entry(*name).or_insert(index);
                }
                Constant::String(utf8) => {
                    self.strings.entry(*utf8).or_insert(index);
                }
                Constant::NameAndType { name, descriptor } => {
                    self.name_and_types
                        .entry((*name, *descriptor))
                        .or_insert(index);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    self.fieldrefs
                        .entry((*class, *name_and_type))
                        .or_insert(index);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface,
                } => {
                    self.methodrefs
                        .entry((*class, *name_and_type, *is_interface))
                        .or_insert(index);
                }
                Constant::Integer(value) => {
                    self.integers.entry(*value).or_insert(index);
                }
                Constant::Float(value) => {
                    self.floats.entry(value.to_be_bytes()).or_insert(index);
                }
                Constant::Long(value) => {
                    self.longs.entry(*value).or_insert(index);
                }
                Constant::Double(value) => {
                    self.doubles.entry(value.to_be_bytes()).or_insert(index);
                }
                _ => (),
            }
        }
    }

    /// Push a constant into the pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<u16, Error> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize + 1 {
            return Err(Error::ConstantPoolOverflow { offset });
        }
        self.constants.push(constant);
        Ok(offset as u16)
    }

    /// Look up an entry; index 0, out-of-range indices, and the unusable tail slot of a
    /// `long`/`double` are all errors
    pub fn get(&self, index: u16) -> Result<&Constant, DecodeError> {
        self.constants
            .get_offset(Offset(index as usize))
            .ok_or(DecodeError::ConstantPoolIndexOutOfBounds(index))
    }

    pub fn utf8_at(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name_at(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8_at(*name),
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Class",
            }),
        }
    }

    pub fn string_at(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::String(utf8) => self.utf8_at(*utf8),
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "String",
            }),
        }
    }

    pub fn name_and_type_at(&self, index: u16) -> Result<(&str, &str), DecodeError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8_at(*name)?, self.utf8_at(*descriptor)?))
            }
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a `Fieldref` into `(owner, name, descriptor)`
    pub fn fieldref_at(&self, index: u16) -> Result<(&str, &str, &str), DecodeError> {
        match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                let owner = self.class_name_at(*class)?;
                let (name, descriptor) = self.name_and_type_at(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Fieldref",
            }),
        }
    }

    /// Resolve a `Methodref` or `InterfaceMethodref` into `(owner, name, descriptor, interface)`
    pub fn methodref_at(&self, index: u16) -> Result<(&str, &str, &str, bool), DecodeError> {
        match self.get(index)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let owner = self.class_name_at(*class)?;
                let (name, descriptor) = self.name_and_type_at(*name_and_type)?;
                Ok((owner, name, descriptor, *is_interface))
            }
            _ => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Methodref",
            }),
        }
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8(&mut self, utf8: &str) -> Result<u16, Error> {
        if let Some(index) = self.utf8s.get(utf8) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Utf8(utf8.to_string()))?;
            self.utf8s.insert(utf8.to_string(), index);
            Ok(index)
        }
    }

    /// Get or insert a class constant from its internal (slash separated) name
    pub fn get_class(&mut self, name: &str) -> Result<u16, Error> {
        let name_index = self.get_utf8(name)?;
        if let Some(index) = self.classes.get(&name_index) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Class(name_index))?;
            self.classes.insert(name_index, index);
            Ok(index)
        }
    }

    /// Get or insert a string constant
    pub fn get_string(&mut self, value: &str) -> Result<u16, Error> {
        let utf8_index = self.get_utf8(value)?;
        if let Some(index) = self.strings.get(&utf8_index) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::String(utf8_index))?;
            self.strings.insert(utf8_index, index);
            Ok(index)
        }
    }

    pub fn get_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, Error> {
        let key = (self.get_utf8(name)?, self.get_utf8(descriptor)?);
        if let Some(index) = self.name_and_types.get(&key) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::NameAndType {
                name: key.0,
                descriptor: key.1,
            })?;
            self.name_and_types.insert(key, index);
            Ok(index)
        }
    }

    pub fn get_fieldref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16, Error> {
        let key = (self.get_class(owner)?, self.get_name_and_type(name, descriptor)?);
        if let Some(index) = self.fieldrefs.get(&key) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::FieldRef {
                class: key.0,
                name_and_type: key.1,
            })?;
            self.fieldrefs.insert(key, index);
            Ok(index)
        }
    }

    pub fn get_methodref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<u16, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        let key = (class, name_and_type, is_interface);
        if let Some(index) = self.methodrefs.get(&key) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            })?;
            self.methodrefs.insert(key, index);
            Ok(index)
        }
    }

    pub fn get_integer(&mut self, value: i32) -> Result<u16, Error> {
        if let Some(index) = self.integers.get(&value) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Integer(value))?;
            self.integers.insert(value, index);
            Ok(index)
        }
    }

    pub fn get_float(&mut self, value: f32) -> Result<u16, Error> {
        let key = value.to_be_bytes();
        if let Some(index) = self.floats.get(&key) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Float(value))?;
            self.floats.insert(key, index);
            Ok(index)
        }
    }

    pub fn get_long(&mut self, value: i64) -> Result<u16, Error> {
        if let Some(index) = self.longs.get(&value) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Long(value))?;
            self.longs.insert(value, index);
            Ok(index)
        }
    }

    pub fn get_double(&mut self, value: f64) -> Result<u16, Error> {
        let key = value.to_be_bytes();
        if let Some(index) = self.doubles.get(&key) {
            Ok(*index)
        } else {
            let index = self.push_constant(Constant::Double(value))?;
            self.doubles.insert(key, index);
            Ok(index)
        }
    }

    /// Serialize an attribute body and intern its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info).map_err(Error::IoError)?;
        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.constants.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Constants as in the constant pool
///
/// All the tags defined through Java 16 parse, even the ones (like `Module`) that the insertion
/// API never produces.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Class or an interface
    Class(u16),

    /// Constant object of type `java.lang.String`
    String(u16),

    /// Field
    FieldRef { class: u16, name_and_type: u16 },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: u16,
        name_and_type: u16,
        is_interface: bool,
    },

    /// Name and a type (eg. for a field or a method)
    NameAndType { name: u16, descriptor: u16 },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle { handle_kind: u8, member: u16 },

    /// Method type
    MethodType { descriptor: u16 },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: u16,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: u16,
    },

    /// Module declaration
    Module(u16),

    /// Package exported or opened by a module
    Package(u16),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, DecodeError> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let buffer = read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&buffer)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(u16::deserialize(reader)?),
            8 => Constant::String(u16::deserialize(reader)?),
            9 => Constant::FieldRef {
                class: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            tag @ (10 | 11) => Constant::MethodRef {
                class: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: u16::deserialize(reader)?,
                descriptor: u16::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: u8::deserialize(reader)?,
                member: u16::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: u16::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: u16::deserialize(reader)?,
            },
            19 => Constant::Module(u16::deserialize(reader)?),
            20 => Constant::Package(u16::deserialize(reader)?),
            tag => return Err(DecodeError::UnrecognizedConstantPoolTag(tag)),
        };
        Ok(constant)
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the spec:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of `encode_modified_utf8`
///
/// Decoding goes through UTF-16 code units: surrogate halves then pair up exactly the way the
/// format intends, without special-casing supplementary characters.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut units: Vec<u16> = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0b1000_0000 == 0 {
            if b0 == 0 {
                return Err(DecodeError::InvalidUtf8);
            }
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let b1 = *bytes.get(i + 1).ok_or(DecodeError::InvalidUtf8)?;
            if b1 & 0b1100_0000 != 0b1000_0000 {
                return Err(DecodeError::InvalidUtf8);
            }
            units.push(((b0 as u16 & 0x1F) << 6) | (b1 as u16 & 0x3F));
            i += 2;
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let b1 = *bytes.get(i + 1).ok_or(DecodeError::InvalidUtf8)?;
            let b2 = *bytes.get(i + 2).ok_or(DecodeError::InvalidUtf8)?;
            if b1 & 0b1100_0000 != 0b1000_0000 || b2 & 0b1100_0000 != 0b1000_0000 {
                return Err(DecodeError::InvalidUtf8);
            }
            units.push(((b0 as u16 & 0x0F) << 12) | ((b1 as u16 & 0x3F) << 6) | (b2 as u16 & 0x3F));
            i += 3;
        } else {
            return Err(DecodeError::InvalidUtf8);
        }
    }
    String::from_utf16(&units).map_err(|_| DecodeError::InvalidUtf8)
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"foo").unwrap(), "foo");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let encoded = encode_modified_utf8("ĄǍǞ\u{0905}");
        assert_eq!(
            encoded,
            vec![196, 132, 199, 141, 199, 158, 224, 164, 133]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "ĄǍǞ\u{0905}");
    }

    #[test]
    fn supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{10000}\u{10FFFF}");
    }

    #[test]
    fn embedded_raw_null_is_rejected() {
        assert!(decode_modified_utf8(&[97, 0, 97]).is_err());
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.get_utf8("println").unwrap();
        let b = pool.get_class("java/io/PrintStream").unwrap();
        assert_eq!(pool.get_utf8("println").unwrap(), a);
        assert_eq!(pool.get_class("java/io/PrintStream").unwrap(), b);

        let m1 = pool
            .get_methodref("java/io/PrintStream", "println", "(Ljava/lang/String;)V", false)
            .unwrap();
        let m2 = pool
            .get_methodref("java/io/PrintStream", "println", "(Ljava/lang/String;)V", false)
            .unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long_index = pool.get_long(42).unwrap();
        let next = pool.get_integer(7).unwrap();
        assert_eq!(next, long_index + 2);
    }

    #[test]
    fn overflowing_the_pool_is_an_error() {
        let mut pool = ConstantPool::new();

        // indices run from 1 to 65535; 32767 distinct longs fill slots 1 through 65534
        for value in 0..32767i64 {
            pool.get_long(value).unwrap();
        }
        assert!(matches!(
            pool.get_long(99999),
            Err(Error::ConstantPoolOverflow { .. })
        ));

        // one single-slot entry still fits, at the last valid index
        assert_eq!(pool.get_integer(7).unwrap(), u16::MAX);
        assert!(matches!(
            pool.get_integer(8),
            Err(Error::ConstantPoolOverflow { .. })
        ));
    }

    #[test]
    fn round_trips_through_serialization() {
        let mut pool = ConstantPool::new();
        pool.get_long(i64::MIN).unwrap();
        let string = pool.get_string("hello").unwrap();
        let class = pool.get_class("com/example/Probe").unwrap();

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let reparsed = ConstantPool::parse(&mut &bytes[..]).unwrap();
        assert_eq!(reparsed.class_name_at(class).unwrap(), "com/example/Probe");
        assert_eq!(reparsed.string_at(string).unwrap(), "hello");
        assert!(reparsed.get(2).is_err());
    }
}
