use crate::jvm::class_file::ClassFile;
use crate::jvm::code::{decode_code, CodeSink, InstructionSequence, Label, LoadableConstant};
use crate::jvm::model::{MethodShape, MethodSignature};
use crate::jvm::names::{Name, UnqualifiedName};
use crate::jvm::Error;
use log::{debug, trace};

/// Pulls one method's body out of a compiled class as a replayable sequence
///
/// The capture stops at the first exit instruction matching the method's return category and
/// drops it, so the result is an open-ended fragment suitable for splicing into another method
/// (which supplies its own exits) or for rebuilding into a standalone method (which appends a
/// fresh one).
#[derive(Debug, Clone)]
pub struct MethodExtractor {
    method_name: String,
    descriptor: Option<String>,
}

impl MethodExtractor {
    /// Target the first method with this name, regardless of signature
    pub fn new(method_name: impl Into<String>) -> MethodExtractor {
        MethodExtractor {
            method_name: method_name.into(),
            descriptor: None,
        }
    }

    /// Disambiguate overloads by requiring an exact descriptor match
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> MethodExtractor {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Extract the targeted method's body
    ///
    /// `Ok(None)` when the class has no matching method, or the match is `abstract`/`native`
    /// and so has no body to extract.
    pub fn extract(&self, class_bytes: &[u8]) -> Result<Option<InstructionSequence>, Error> {
        let class = ClassFile::parse(class_bytes)?;
        let position = match class.find_method(&self.method_name, self.descriptor.as_deref())? {
            None => return Ok(None),
            Some(position) => position,
        };
        let method = &class.methods[position];
        let code = match method.code(&class.constants)? {
            None => return Ok(None),
            Some(code) => code,
        };

        let name = class.constants.utf8_at(method.name_index)?.to_string();
        let descriptor = class.constants.utf8_at(method.descriptor_index)?.to_string();
        debug!(
            "extracting {}{} from {}",
            name,
            descriptor,
            class.this_class_name()?
        );

        let shape = MethodShape::new(
            method.access_flags,
            UnqualifiedName::from_string(name).map_err(Error::InvalidName)?,
            MethodSignature::Raw(descriptor),
        );
        let exit_opcode = shape.return_kind()?.exit_opcode();

        let mut capture = CapturingSink {
            sequence: InstructionSequence::with_shape(shape),
            exit_opcode,
            stopped: false,
        };
        decode_code(&code, &class.constants, &mut capture)?;

        for op in capture.sequence.ops() {
            trace!("captured {}", op);
        }
        Ok(Some(capture.sequence))
    }
}

/// Records events until the method's own exit instruction, which is discarded along with
/// everything after it
struct CapturingSink {
    sequence: InstructionSequence,
    exit_opcode: u8,
    stopped: bool,
}

impl CodeSink for CapturingSink {
    fn insn(&mut self, opcode: u8) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        if opcode == self.exit_opcode {
            self.stopped = true;
            return Ok(());
        }
        self.sequence.insn(opcode)
    }

    fn int_operand(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.int_operand(opcode, operand)
    }

    fn var(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.var(opcode, index)
    }

    fn iinc(&mut self, index: u16, delta: i16) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.iinc(index, delta)
    }

    fn type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.type_insn(opcode, class)
    }

    fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.field(opcode, owner, name, descriptor)
    }

    fn invoke(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.invoke(opcode, owner, name, descriptor, interface)
    }

    fn ldc(&mut self, constant: &LoadableConstant) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.ldc(constant)
    }

    fn label(&mut self, label: Label) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.label(label)
    }

    fn jump(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.jump(opcode, target)
    }

    fn table_switch(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.table_switch(low, high, default, targets)
    }

    fn lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.lookup_switch(default, pairs)
    }

    fn multi_new_array(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.multi_new_array(descriptor, dimensions)
    }

    fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.try_catch(start, end, handler, catch_type)
    }

    fn line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence.line_number(line, start)
    }

    fn local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        if self.stopped {
            return Ok(());
        }
        self.sequence
            .local_variable(name, descriptor, start, end, index)
    }

    // Limits of the donor method do not transfer to a spliced or regenerated body
    fn stack_limits(&mut self, _stack: u16, _locals: u16) -> Result<(), Error> {
        Ok(())
    }
}
