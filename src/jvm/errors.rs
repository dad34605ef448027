use crate::jvm::code::Label;
use std::fmt;

/// Errors surfaced by class synthesis, splicing and substitution
///
/// "Method not found" conditions are deliberately *not* represented here: lookups that can
/// legitimately miss return `Option` instead, and only genuine defects (unparsable input,
/// malformed instruction streams, illegal names) become errors.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The input bytes could not be parsed as a class file
    Decode(DecodeError),

    /// A field or method descriptor string does not follow the descriptor grammar
    BadDescriptor(String),

    /// The constant pool ran out of slots (largest valid index is 65535)
    ConstantPoolOverflow { offset: usize },

    /// Method bytecode grew past the `u16` program-counter range
    MethodCodeOverflow(usize),

    /// A branch instruction cannot reach its target with a 16-bit offset
    BranchTargetOutOfRange { opcode: u8, offset: isize },

    /// Two `label` events placed the same label (indicates a bug in the caller)
    DuplicateLabel(Label),

    /// A label was referred to but never placed
    UnplacedLabel(Label),

    /// A sequence without a method shape was used where one is required
    MissingMethodShape,

    /// Emitted instructions violate stack or control-flow rules; names the offending method
    VerificationFailure {
        method: String,
        kind: VerifierErrorKind,
    },

    /// A field, method, or class name breaks the naming rules
    InvalidName(String),

    /// A substitution-table key is not a legal fully qualified class name
    InvalidClassName(String),

    /// No resolver in the chain knows the requested class
    ClassNotFound(String),

    /// A class file declares a different name than the one it was keyed under
    NameMismatch { expected: String, actual: String },

    /// The bytes mapped for substitution could not be defined as a class
    DefinitionFailure { name: String, cause: Box<Error> },
}

/// Low-level failures while reading the binary class-file container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidMagic,
    ConstantPoolIndexOutOfBounds(u16),
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
    },
    UnrecognizedConstantPoolTag(u8),
    UnrecognizedInstruction(u8),
    /// A recognized instruction this crate refuses to re-encode (eg. `invokedynamic`)
    UnsupportedInstruction(u8),
    InvalidCodeOffset(usize),
    InvalidUtf8,
    TrailingBytes,
}

/// What exactly the verifying pass rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    /// An instruction pops more values than the operand stack holds
    StackUnderflow { at: usize },
    StackOverflow,
    LocalsOverflow,
    /// A label is reached with two different operand-stack depths
    IncompatibleStackDepths { label: Label, first: u16, second: u16 },
    /// Executable flow runs past the last instruction
    FallsOffEnd,
    DuplicateLabel(Label),
    UnplacedLabel(Label),
    BadDescriptor(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "io error: {}", err),
            Error::Decode(err) => write!(f, "malformed class file: {}", err),
            Error::BadDescriptor(desc) => write!(f, "bad descriptor '{}'", desc),
            Error::ConstantPoolOverflow { offset } => {
                write!(f, "constant pool overflow at slot {}", offset)
            }
            Error::MethodCodeOverflow(len) => {
                write!(f, "method bytecode too long ({} bytes)", len)
            }
            Error::BranchTargetOutOfRange { opcode, offset } => write!(
                f,
                "branch (opcode {:#04x}) target offset {} out of range",
                opcode, offset
            ),
            Error::DuplicateLabel(label) => write!(f, "label {:?} placed twice", label),
            Error::UnplacedLabel(label) => write!(f, "label {:?} never placed", label),
            Error::MissingMethodShape => {
                write!(f, "instruction sequence carries no method shape")
            }
            Error::VerificationFailure { method, kind } => {
                write!(f, "verification of method '{}' failed: {}", method, kind)
            }
            Error::InvalidName(message) => write!(f, "{}", message),
            Error::InvalidClassName(name) => write!(f, "'{}' is an invalid class name", name),
            Error::ClassNotFound(name) => write!(f, "class '{}' not found", name),
            Error::NameMismatch { expected, actual } => write!(
                f,
                "class file for '{}' actually declares '{}'",
                expected, actual
            ),
            Error::DefinitionFailure { name, cause } => write!(
                f,
                "could not define substituted class '{}': {}",
                name, cause
            ),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of input"),
            DecodeError::InvalidMagic => write!(f, "missing 0xCAFEBABE magic"),
            DecodeError::ConstantPoolIndexOutOfBounds(index) => {
                write!(f, "constant pool index {} out of bounds", index)
            }
            DecodeError::ConstantPoolTypeMismatch { index, expected } => {
                write!(f, "constant pool entry {} is not a {}", index, expected)
            }
            DecodeError::UnrecognizedConstantPoolTag(tag) => {
                write!(f, "unrecognized constant pool tag {}", tag)
            }
            DecodeError::UnrecognizedInstruction(opcode) => {
                write!(f, "unrecognized opcode {:#04x}", opcode)
            }
            DecodeError::UnsupportedInstruction(opcode) => {
                write!(f, "unsupported opcode {:#04x}", opcode)
            }
            DecodeError::InvalidCodeOffset(offset) => {
                write!(f, "offset {} is not an instruction boundary", offset)
            }
            DecodeError::InvalidUtf8 => write!(f, "invalid modified UTF-8"),
            DecodeError::TrailingBytes => write!(f, "trailing bytes after class file"),
        }
    }
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::StackUnderflow { at } => {
                write!(f, "operand stack underflow at instruction {}", at)
            }
            VerifierErrorKind::StackOverflow => write!(f, "operand stack deeper than 65535"),
            VerifierErrorKind::LocalsOverflow => write!(f, "more than 65535 local slots"),
            VerifierErrorKind::IncompatibleStackDepths {
                label,
                first,
                second,
            } => write!(
                f,
                "label {:?} reached with stack depths {} and {}",
                label, first, second
            ),
            VerifierErrorKind::FallsOffEnd => {
                write!(f, "execution can run past the last instruction")
            }
            VerifierErrorKind::DuplicateLabel(label) => {
                write!(f, "label {:?} placed twice", label)
            }
            VerifierErrorKind::UnplacedLabel(label) => {
                write!(f, "label {:?} never placed", label)
            }
            VerifierErrorKind::BadDescriptor(desc) => write!(f, "bad descriptor '{}'", desc),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::DefinitionFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::Decode(err)
    }
}
