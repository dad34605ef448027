//! JVM class file representation and bytecode manipulation

pub mod access_flags;
pub mod binary_format;
pub mod class_file;
pub mod code;
pub mod descriptors;
pub mod errors;
pub mod model;
pub mod names;
pub mod verifier;

pub use access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use errors::{DecodeError, Error, VerifierErrorKind};
