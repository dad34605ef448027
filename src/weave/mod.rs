//! Method transplantation: extraction, synthesis, splicing, and class substitution

mod extract;
mod generate;
mod splice;
mod substitute;

pub use extract::MethodExtractor;
pub use generate::{emit_print_line, BodyWriter, ClassGenerator, MethodTemplate};
pub use splice::{MethodSplicer, SplicePolicy};
pub use substitute::{BootstrapResolver, ClassResolver, ClassSubstitutor, ResolvedClass};
