//! Compilador para el lenguaje Ray.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST ([`ast`]) por medio de análisis sintáctico en
//! [`parse`]. Durante este mismo recorrido se resuelven nombres y se
//! asigna a cada parámetro y local un slot en el stack frame de su
//! función ([`slots`]).
//!
//! # Back end
//! El árbol se traduce a un listado de ensamblador x86-64 en sintaxis
//! de `fasm` ([`codegen`]), siguiendo la convención de llamadas
//! System V. Ensamblado y enlazado quedan a cargo de herramientas
//! externas.

#[macro_use]
mod macros;

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lex;
pub mod parse;
pub mod slots;
pub mod source;

use std::rc::Rc;

use thiserror::Error;

use crate::{
    codegen::CodegenError,
    error::{Diagnostics, ErrorClass},
    lex::{Lexer, LexerError},
    parse::ParserError,
    source::{Located, Location, Source},
};

/// Primer error encontrado por alguna de las fases.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lexical(#[from] Located<LexerError>),

    #[error(transparent)]
    Parse(#[from] Located<ParserError>),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CompileError::Lexical(_) => ErrorClass::Lexical,
            CompileError::Parse(error) => error.val().class(),
            CompileError::Codegen(error) => error.class(),
        }
    }

    /// Construye el reporte a mostrar al usuario. Los errores de
    /// generación de código sin posición se ubican al final del archivo.
    pub fn into_diagnostics(self, source: &Rc<Source>) -> Diagnostics {
        let kind = self.class().as_str();
        let diagnostics = match self {
            CompileError::Lexical(error) => Diagnostics::from(error),
            CompileError::Parse(error) => Diagnostics::from(error),
            CompileError::Codegen(error) => {
                let location = match error.position() {
                    Some(position) => Location::at(source, position),
                    None => Location::eof(source),
                };

                Diagnostics::from(Located::at(error, location))
            }
        };

        diagnostics.kind(kind)
    }
}

/// Compila un archivo fuente completo a un listado de ensamblador.
pub fn compile(source: &Rc<Source>) -> Result<String, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let ast = parse::parse(&tokens)?;

    Ok(codegen::generate(&ast)?)
}
