use super::{CodegenError, Symbols, DATA_LABEL};

use crate::{
    ast::{Arg, Call, Function, Node, Statement},
    lex::Identifier,
    slots::{Slot, SLOT_SIZE},
};

use std::{fmt, io::Write};

type Emit = Result<(), CodegenError>;

pub(super) fn emit_function<W: Write>(
    output: &mut W,
    symbols: &Symbols<'_>,
    function: &Function,
) -> Emit {
    let x86_function = X86Function {
        output,
        symbols,
        function,
        calls: 0,
    };

    x86_function.write_asm()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
}

impl Reg {
    /* La ABI indica que se coloquen los primeros 6 argumentos en los registros rdi, rsi, rdx, rcx,
     * r8 y r9. Si hay más se ponen en el stack en orden inverso.
     */
    pub const MAX_ARGS: usize = 6;

    pub fn argument_sequence() -> impl Iterator<Item = Reg> {
        use Reg::*;

        std::iter::successors(Some(Rdi), |last| match last {
            Rdi => Some(Rsi),
            Rsi => Some(Rdx),
            Rdx => Some(Rcx),
            Rcx => Some(R8),
            R8 => Some(R9),
            _ => None,
        })
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Reg::*;

        let name = match self {
            Rax => "rax",
            Rcx => "rcx",
            Rdx => "rdx",
            Rsi => "rsi",
            Rdi => "rdi",
            R8 => "r8",
            R9 => "r9",
        };

        formatter.write_str(name)
    }
}

struct X86Function<'a, W> {
    output: &'a mut W,
    symbols: &'a Symbols<'a>,
    function: &'a Function,
    calls: u32,
}

impl<W: Write> X86Function<'_, W> {
    fn write_asm(mut self) -> Emit {
        let function = self.function;
        let name = &function.name;

        writeln!(self.output)?;
        writeln!(self.output, "; --- {} ---", name)?;
        writeln!(self.output, "public {}", name)?;
        writeln!(self.output, "{}:", name)?;

        // Prólogo, crea un stack frame
        emit!(self, "push", "rbp")?;
        emit!(self, "mov", "rbp, rsp")?;

        let frame = function.slots.frame_size();
        if frame > 0 {
            emit!(self, "sub", "rsp, 0x{:x}", frame)?;
        }

        // Se copian argumentos de registros y del stack del llamador a sus slots
        let parameters = function.slots.parameters() as usize;
        let mut registers = Reg::argument_sequence();
        for index in 0..parameters {
            let slot = Slot(index as u32);
            match registers.next() {
                Some(register) => self.register_to_slot(register, slot)?,
                None => {
                    emit!(self, "mov", "rax, {}", stack_parameter_address(index))?;
                    self.register_to_slot(Reg::Rax, slot)?;
                }
            }
        }

        for statement in &function.body {
            self.put_statement(statement)?;
        }

        let returns = matches!(
            function.body.last(),
            Some(Statement {
                node: Node::Return { .. },
                ..
            })
        );

        if !returns {
            emit!(self, "xor", "eax, eax")?;
            self.epilogue()?;
        }

        Ok(())
    }

    fn put_statement(&mut self, statement: &Statement) -> Emit {
        writeln!(self.output, "\t; {}", statement.position)?;

        match &statement.node {
            Node::Exit { arg, .. } => {
                match arg {
                    Arg::Bogus => emit!(self, "xor", "edi, edi")?,
                    arg => self.load(arg, Reg::Rdi)?,
                }

                emit!(self, "mov", "rax, 60")?;
                emit!(self, "syscall")?;
            }

            Node::Return { arg, .. } => {
                self.load(arg, Reg::Rax)?;
                self.epilogue()?;
            }

            Node::FunctionCall(call) => self.call(call, None)?,

            Node::FunctionCallAssign { var, call, .. } => {
                let output = self.named_slot(var)?;
                self.call(call, Some(output))?;
            }

            Node::VariableDef { name, arg, .. } | Node::VariableAssign { name, arg, .. } => {
                let slot = self.named_slot(name)?;
                self.load(arg, Reg::Rax)?;
                self.register_to_slot(Reg::Rax, slot)?;
            }

            Node::MultiVariableDef { names, .. } => {
                for name in names {
                    let address = self.slot_address(self.named_slot(name)?)?;
                    emit!(self, "mov", "qword {}, 0", address)?;
                }
            }

            // Los externs se importan a nivel de módulo y las funciones
            // anidadas se emiten como bloques propios
            Node::Extern { names } => {
                let names: Vec<_> = names.iter().map(Identifier::as_ref).collect();
                writeln!(self.output, "\t; extern {}", names.join(", "))?;
            }

            Node::Function(nested) => {
                writeln!(self.output, "\t; func {}", nested.name)?;
            }
        }

        Ok(())
    }

    fn call(&mut self, call: &Call, output: Option<Slot>) -> Emit {
        let target = self.call_target(call)?;
        let result = self.next_call_result()?;

        // Argumentos del séptimo en adelante se colocan en stack en orden inverso,
        // precedidos por relleno si su cantidad rompe el alineamiento de 16 bytes
        let pushed = call.args.len().saturating_sub(Reg::MAX_ARGS);
        let padding = alignment_for(pushed);
        if padding > 0 {
            self.move_rsp(-(padding as i32))?;
        }

        for arg in call.args.iter().skip(Reg::MAX_ARGS).rev() {
            self.load(arg, Reg::Rax)?;
            emit!(self, "push", "rax")?;
        }

        // Los primeros seis argumentos se colocan en registros específicos
        for (arg, register) in call.args.iter().zip(Reg::argument_sequence()) {
            self.load(arg, register)?;
        }

        // Cantidad de registros vectoriales usados, para funciones variádicas
        emit!(self, "xor", "eax, eax")?;
        emit!(self, "call", "{}", target)?;

        // Se reclama memoria que fue usada para argumentos
        let reclaimed = pushed + padding;
        if reclaimed > 0 {
            self.move_rsp(reclaimed as i32)?;
        }

        self.register_to_slot(Reg::Rax, result)?;
        if let Some(output) = output {
            self.register_to_slot(Reg::Rax, output)?;
        }

        Ok(())
    }

    fn next_call_result(&mut self) -> Result<Slot, CodegenError> {
        let call = self.calls;
        self.calls += 1;

        self.function
            .slots
            .call_result_of(call)
            .ok_or_else(|| self.unknown_slot(format!("<call #{}>", call)))
    }

    /// Operando de `call`: un símbolo para llamadas directas o el
    /// contenido de un slot para llamadas indirectas.
    fn call_target(&self, call: &Call) -> Result<String, CodegenError> {
        if self.symbols.is_direct(&call.name) {
            return Ok(call.name.to_string());
        }

        match self.function.slots.resolve(call.name.as_ref()) {
            Some(slot) => Ok(format!("qword {}", self.slot_address(slot)?)),
            None => Err(CodegenError::UnknownCallee {
                function: self.function.name.clone(),
                name: call.name.clone(),
            }),
        }
    }

    fn load(&mut self, arg: &Arg, register: Reg) -> Emit {
        match arg {
            Arg::Literal(value) => emit!(self, "mov", "{}, {}", register, value)?,

            Arg::AutoVar(slot) => {
                let address = self.slot_address(*slot)?;
                emit!(self, "mov", "{}, {}", register, address)?;
            }

            Arg::RefAutoVar(slot) => {
                let address = self.slot_address(*slot)?;
                emit!(self, "lea", "{}, {}", register, address)?;
            }

            Arg::Deref(slot) => {
                let address = self.slot_address(*slot)?;
                emit!(self, "mov", "{}, {}", register, address)?;
                emit!(self, "mov", "{}, [{}]", register, register)?;
            }

            Arg::External(name) => emit!(self, "mov", "{}, [{}]", register, name)?,
            Arg::RefExternal(name) => emit!(self, "lea", "{}, [{}]", register, name)?,

            Arg::DataOffset(offset) => {
                emit!(self, "lea", "{}, [{}+{}]", register, DATA_LABEL, offset)?;
            }

            Arg::Bogus => (),
        }

        Ok(())
    }

    fn register_to_slot(&mut self, register: Reg, slot: Slot) -> Emit {
        let address = self.slot_address(slot)?;
        emit!(self, "mov", "{}, {}", address, register)?;
        Ok(())
    }

    fn epilogue(&mut self) -> Emit {
        // Revierte al estado justo antes de la llamada
        emit!(self, "mov", "rsp, rbp")?;
        emit!(self, "pop", "rbp")?;
        emit!(self, "ret")?;
        Ok(())
    }

    fn move_rsp(&mut self, offset: i32) -> Emit {
        let instruction = if offset < 0 { "sub" } else { "add" };
        let offset = offset.abs() * SLOT_SIZE as i32;
        emit!(self, instruction, "rsp, 0x{:x}", offset)?;
        Ok(())
    }

    fn named_slot(&self, name: &Identifier) -> Result<Slot, CodegenError> {
        self.function
            .slots
            .resolve(name.as_ref())
            .ok_or_else(|| self.unknown_slot(name.to_string()))
    }

    fn slot_address(&self, slot: Slot) -> Result<String, CodegenError> {
        if !self.function.slots.contains(slot) {
            return Err(self.unknown_slot(format!("#{}", slot.0)));
        }

        let Slot(index) = slot;
        Ok(format!("[rbp-0x{:x}]", (index + 1) * SLOT_SIZE))
    }

    fn unknown_slot(&self, name: String) -> CodegenError {
        CodegenError::UnknownSlot {
            function: self.function.name.clone(),
            name,
        }
    }
}

/// Dirección de un parámetro que el llamador colocó en stack, a partir
/// del séptimo. Sobre `rbp` quedan el `rbp` anterior y la dirección de retorno.
fn stack_parameter_address(index: usize) -> String {
    let offset = 2 * SLOT_SIZE as usize + (index - Reg::MAX_ARGS) * SLOT_SIZE as usize;
    format!("[rbp+0x{:x}]", offset)
}

fn alignment_for(pushed: usize) -> usize {
    // Cada valor es de 64 bits (8 bytes), y la frontera de alineamiento es de 16 bytes
    pushed % 2
}
