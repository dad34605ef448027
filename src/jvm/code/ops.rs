use crate::jvm::code::opcodes;
use std::fmt;

/// Opaque identifier for a position in an instruction stream
///
/// Labels replace absolute bytecode offsets in the symbolic representation, so instruction
/// sequences stay valid when they are replayed into a method with a completely different layout.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Constant that can be pushed with `ldc`
///
/// The value is stored directly, never as a constant pool index, so a load transplants cleanly
/// into a class with a different pool.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal name of the referenced class
    Class(String),
}

impl LoadableConstant {
    /// Number of operand stack slots the loaded value takes
    pub fn width(&self) -> u16 {
        match self {
            LoadableConstant::Long(_) | LoadableConstant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// One structural event of a method body
///
/// A decoded method body is a flat `Vec<Op>`; replaying the vector against a [`CodeSink`] in
/// order reproduces the body. All operands are symbolic (names, labels, immediate values), which
/// is what makes a sequence meaningful outside the class it came from.
///
/// [`CodeSink`]: crate::jvm::code::CodeSink
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Instruction with no operands
    Insn(u8),

    /// `bipush`, `sipush`, or `newarray` (whose operand picks the element type)
    IntOperand { opcode: u8, operand: i32 },

    /// Local variable load/store in its generic form
    Var { opcode: u8, index: u16 },

    Iinc { index: u16, delta: i16 },

    /// `new`, `checkcast`, `instanceof`, `anewarray`; the operand is an internal class name
    /// (or an array descriptor for the latter three)
    Type { opcode: u8, class: String },

    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },

    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },

    Ldc(LoadableConstant),

    /// Marks this point in the stream as the position of the label
    Label(Label),

    Jump { opcode: u8, target: Label },

    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },

    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },

    MultiANewArray { descriptor: String, dimensions: u8 },

    /// Protected region; `catch_type` is an internal class name, `None` catches everything
    TryCatch {
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<String>,
    },

    LineNumber { line: u16, start: Label },

    /// Debug metadata for one local variable slot
    LocalVariable {
        name: String,
        descriptor: String,
        start: Label,
        end: Label,
        index: u16,
    },

    /// Declared stack/local limits of the source method; a hint only, recomputed on encode
    StackLimits { stack: u16, locals: u16 },
}

impl Op {
    /// Renumber every label in this op
    pub fn map_labels(&mut self, f: impl Fn(Label) -> Label) {
        match self {
            Op::Label(label) => *label = f(*label),
            Op::Jump { target, .. } => *target = f(*target),
            Op::TableSwitch {
                default, targets, ..
            } => {
                *default = f(*default);
                for target in targets {
                    *target = f(*target);
                }
            }
            Op::LookupSwitch { default, pairs } => {
                *default = f(*default);
                for (_, target) in pairs {
                    *target = f(*target);
                }
            }
            Op::TryCatch {
                start,
                end,
                handler,
                ..
            } => {
                *start = f(*start);
                *end = f(*end);
                *handler = f(*handler);
            }
            Op::LineNumber { start, .. } => *start = f(*start),
            Op::LocalVariable { start, end, .. } => {
                *start = f(*start);
                *end = f(*end);
            }
            _ => (),
        }
    }

    /// Largest label id mentioned by this op, if it mentions any
    pub fn max_label(&self) -> Option<u32> {
        let mut max: Option<u32> = None;
        let mut see = |label: &Label| {
            max = Some(max.map_or(label.0, |m: u32| m.max(label.0)));
        };
        match self {
            Op::Label(label) => see(label),
            Op::Jump { target, .. } => see(target),
            Op::TableSwitch {
                default, targets, ..
            } => {
                see(default);
                targets.iter().for_each(see);
            }
            Op::LookupSwitch { default, pairs } => {
                see(default);
                pairs.iter().for_each(|(_, target)| see(target));
            }
            Op::TryCatch {
                start,
                end,
                handler,
                ..
            } => {
                see(start);
                see(end);
                see(handler);
            }
            Op::LineNumber { start, .. } => see(start),
            Op::LocalVariable { start, end, .. } => {
                see(start);
                see(end);
            }
            _ => (),
        }
        max
    }
}

/// Disassembly-style rendering, one op per line
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Insn(opcode) => write!(f, "{}", opcodes::mnemonic(*opcode)),
            Op::IntOperand { opcode, operand } => {
                write!(f, "{} {}", opcodes::mnemonic(*opcode), operand)
            }
            Op::Var { opcode, index } => write!(f, "{} {}", opcodes::mnemonic(*opcode), index),
            Op::Iinc { index, delta } => write!(f, "iinc {} {}", index, delta),
            Op::Type { opcode, class } => write!(f, "{} {}", opcodes::mnemonic(*opcode), class),
            Op::Field {
                opcode,
                owner,
                name,
                descriptor,
            } => write!(
                f,
                "{} {}.{}:{}",
                opcodes::mnemonic(*opcode),
                owner,
                name,
                descriptor
            ),
            Op::Invoke {
                opcode,
                owner,
                name,
                descriptor,
                ..
            } => write!(
                f,
                "{} {}.{}{}",
                opcodes::mnemonic(*opcode),
                owner,
                name,
                descriptor
            ),
            Op::Ldc(constant) => write!(f, "ldc {:?}", constant),
            Op::Label(label) => write!(f, "{:?}:", label),
            Op::Jump { opcode, target } => {
                write!(f, "{} {:?}", opcodes::mnemonic(*opcode), target)
            }
            Op::TableSwitch {
                low,
                high,
                default,
                targets,
            } => write!(
                f,
                "tableswitch [{}..{}] {:?} default {:?}",
                low, high, targets, default
            ),
            Op::LookupSwitch { default, pairs } => {
                write!(f, "lookupswitch {:?} default {:?}", pairs, default)
            }
            Op::MultiANewArray {
                descriptor,
                dimensions,
            } => write!(f, "multianewarray {} dims {}", descriptor, dimensions),
            Op::TryCatch {
                start,
                end,
                handler,
                catch_type,
            } => write!(
                f,
                ".catch {} [{:?}, {:?}) -> {:?}",
                catch_type.as_deref().unwrap_or("<any>"),
                start,
                end,
                handler
            ),
            Op::LineNumber { line, start } => write!(f, ".line {} at {:?}", line, start),
            Op::LocalVariable {
                name,
                descriptor,
                start,
                end,
                index,
            } => write!(
                f,
                ".local {} {}:{} [{:?}, {:?})",
                index, name, descriptor, start, end
            ),
            Op::StackLimits { stack, locals } => {
                write!(f, ".limits stack {} locals {}", stack, locals)
            }
        }
    }
}
