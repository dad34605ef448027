use crate::jvm::code::{Label, LoadableConstant};
use crate::jvm::Error;

/// Receiver for the structural events of a method body
///
/// Both directions of the crate speak this trait: decoding a compiled method drives a sink with
/// its events, and the encoder is itself a sink. Every method defaults to doing nothing, so an
/// implementation only needs to claim the events it cares about.
#[allow(unused_variables)]
pub trait CodeSink {
    /// Instruction with no operands
    fn insn(&mut self, opcode: u8) -> Result<(), Error> {
        Ok(())
    }

    /// `bipush`, `sipush`, or `newarray`
    fn int_operand(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        Ok(())
    }

    /// Local variable load or store (generic form)
    fn var(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        Ok(())
    }

    fn iinc(&mut self, index: u16, delta: i16) -> Result<(), Error> {
        Ok(())
    }

    /// `new`, `checkcast`, `instanceof`, `anewarray`
    fn type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        Ok(())
    }

    fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<(), Error> {
        Ok(())
    }

    fn invoke(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn ldc(&mut self, constant: &LoadableConstant) -> Result<(), Error> {
        Ok(())
    }

    /// Place a label at the current position
    fn label(&mut self, label: Label) -> Result<(), Error> {
        Ok(())
    }

    fn jump(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        Ok(())
    }

    fn table_switch(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) -> Result<(), Error> {
        Ok(())
    }

    fn multi_new_array(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        Ok(())
    }

    fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        Ok(())
    }

    fn local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Stack/local limits declared by the source; receivers are free to ignore the hint
    fn stack_limits(&mut self, stack: u16, locals: u16) -> Result<(), Error> {
        Ok(())
    }
}
