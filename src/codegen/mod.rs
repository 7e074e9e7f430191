//! Emisión de código ensamblador.
//!
//! La salida es un listado para `fasm`: una declaración de formato,
//! una directiva `extrn` por cada símbolo importado, una sección de
//! código con un bloque `public` por función y, si el módulo contiene
//! cadenas, una sección de datos. El listado completo se genera en
//! memoria, de forma que un error nunca deja salida parcial.

use std::{
    collections::HashSet,
    io::{self, Write},
};

use thiserror::Error;

use crate::{
    ast::{Ast, Function},
    error::ErrorClass,
    lex::Identifier,
    source::Position,
};

mod x86_64;

/// Etiqueta de la región de datos estáticos.
pub const DATA_LABEL: &str = "__data";

/// Nombre de la función de entrada.
pub const ENTRY_POINT: &str = "main";

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Extern `{0}` was already declared")]
    DuplicateExtern(Identifier, Position),

    #[error("Entry point not found, define a function named `main`")]
    MissingEntryPoint,

    #[error("`{name}` has no stack slot in function `{function}`")]
    UnknownSlot { function: Identifier, name: String },

    #[error("Call target `{name}` in function `{function}` is not defined")]
    UnknownCallee {
        function: Identifier,
        name: Identifier,
    },
}

impl CodegenError {
    pub fn class(&self) -> ErrorClass {
        use CodegenError::*;

        match self {
            DuplicateExtern(..) => ErrorClass::Definition,
            MissingEntryPoint => ErrorClass::MissingEntryPoint,
            Io(_) | UnknownSlot { .. } | UnknownCallee { .. } => ErrorClass::Internal,
        }
    }

    /// Posición en el código fuente a la que se atribuye el error, si existe.
    pub fn position(&self) -> Option<Position> {
        match self {
            CodegenError::DuplicateExtern(_, position) => Some(*position),
            _ => None,
        }
    }
}

/// Genera el listado completo de un módulo.
pub fn generate(ast: &Ast) -> Result<String, CodegenError> {
    let mut output = Vec::new();
    write_module(ast, &mut output)?;

    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Escribe el listado de un módulo en `output`.
///
/// El listado se genera por completo antes de escribirse, por lo cual
/// ante un error no se escribe nada.
pub fn emit<W: Write>(ast: &Ast, output: &mut W) -> Result<(), CodegenError> {
    let listing = generate(ast)?;
    output.write_all(listing.as_bytes())?;

    Ok(())
}

fn write_module<W: Write>(ast: &Ast, output: &mut W) -> Result<(), CodegenError> {
    let imports = Imports::collect(ast)?;
    let functions: Vec<&Function> = ast.functions().collect();

    if !functions.iter().any(|function| function.name.as_ref() == ENTRY_POINT) {
        return Err(CodegenError::MissingEntryPoint);
    }

    let symbols = Symbols {
        imports: &imports,
        functions: functions.iter().map(|function| &function.name).collect(),
    };

    writeln!(output, "format ELF64")?;
    if !imports.names.is_empty() {
        writeln!(output)?;
        for name in &imports.names {
            writeln!(output, "extrn {}", name)?;
        }
    }

    writeln!(output)?;
    writeln!(output, "section '.text' executable")?;

    for function in functions.iter().copied() {
        x86_64::emit_function(output, &symbols, function)?;
    }

    emit_data(output, ast.data())?;
    Ok(())
}

/// Tabla de símbolos importados, en orden de aparición.
struct Imports {
    names: Vec<Identifier>,
    set: HashSet<Identifier>,
}

impl Imports {
    fn collect(ast: &Ast) -> Result<Self, CodegenError> {
        let mut imports = Imports {
            names: Vec::new(),
            set: HashSet::new(),
        };

        for (position, names) in ast.externs() {
            for name in names {
                if !imports.set.insert(name.clone()) {
                    return Err(CodegenError::DuplicateExtern(name.clone(), position));
                }

                imports.names.push(name.clone());
            }
        }

        Ok(imports)
    }
}

/// Nombres a los que una llamada directa puede referirse.
struct Symbols<'a> {
    imports: &'a Imports,
    functions: HashSet<&'a Identifier>,
}

impl Symbols<'_> {
    fn is_direct(&self, name: &Identifier) -> bool {
        self.imports.set.contains(name) || self.functions.contains(name)
    }
}

fn emit_data<W: Write>(output: &mut W, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    writeln!(output)?;
    writeln!(output, "section '.data' writeable")?;
    writeln!(output)?;
    writeln!(output, "{}:", DATA_LABEL)?;

    for chunk in data.chunks(16) {
        let bytes: Vec<_> = chunk.iter().map(u8::to_string).collect();
        writeln!(output, "\t{:8}{}", "db", bytes.join(", "))?;
    }

    Ok(())
}
