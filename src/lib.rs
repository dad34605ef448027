//! Bytecode-level method transplantation for JVM class files
//!
//! The pieces compose around one idea: a method body is a replayable stream of symbolic
//! instruction events whose operands are names and labels, never constant pool indices. A body
//! lifted out of one class can therefore be replayed into a brand new class or spliced into an
//! existing method, with constants re-resolved against the destination pool and stack limits
//! recomputed.
//!
//! - [`weave::MethodExtractor`] captures a compiled method's body as an
//!   [`jvm::code::InstructionSequence`]
//! - [`weave::ClassGenerator`] synthesizes whole class files from declarative shapes
//! - [`weave::MethodSplicer`] injects a fragment at a method's entry or before each of its exits
//! - [`weave::ClassSubstitutor`] swaps in replacement class bytes at name-resolution time,
//!   defining each substituted class at most once
//!
//! ```
//! use classweave::jvm::code::CodeSink;
//! use classweave::jvm::model::{ClassShape, MethodShape, MethodSignature};
//! use classweave::jvm::names::{Name, QualifiedName, UnqualifiedName};
//! use classweave::jvm::MethodAccessFlags;
//! use classweave::weave::{emit_print_line, ClassGenerator, MethodTemplate};
//!
//! # fn main() -> Result<(), classweave::jvm::Error> {
//! let name = QualifiedName::from_string("demo.Hello".to_string()).unwrap();
//! let mut generator = ClassGenerator::new(ClassShape::new(name));
//! generator.add_method(MethodTemplate::default_constructor());
//! generator.add_method(MethodTemplate::new(
//!     MethodShape::new(
//!         MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!         UnqualifiedName::MAIN,
//!         MethodSignature::Raw("([Ljava/lang/String;)V".to_string()),
//!     ),
//!     |sink: &mut dyn CodeSink| emit_print_line(sink, "hello"),
//! ));
//!
//! let class_bytes = generator.generate()?;
//! assert_eq!(&class_bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
//! # Ok(())
//! # }
//! ```

pub mod jvm;
pub mod util;
pub mod weave;
