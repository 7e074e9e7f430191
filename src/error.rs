//! Clasificación y presentación de errores.
//!
//! Toda compilación termina en el primer error. Cada error pertenece a
//! una [`ErrorClass`], la cual encabeza su diagnóstico.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

/// Categoría de un error de compilación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Carácter o literal inválido.
    Lexical,

    /// Secuencia de tokens mal formada.
    Syntax,

    /// Función o extern duplicado, llamada a un nombre desconocido.
    Definition,

    /// Identificador que no resuelve a parámetro, local ni símbolo externo.
    Name,

    /// Redeclaración de una variable en la misma función.
    VariableDefinition,

    /// No existe función `main`.
    MissingEntryPoint,

    /// Inconsistencia interna del compilador.
    Internal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        use ErrorClass::*;

        match self {
            Lexical => "Lexical error",
            Syntax => "Syntax error",
            Definition => "Definition error",
            Name => "Name error",
            VariableDefinition => "Variable definition error",
            MissingEntryPoint => "Missing entry point",
            Internal => "Internal compiler error",
        }
    }
}

impl Display for ErrorClass {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn error(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Reporte de un error ubicado, con un extracto del código fuente.
pub struct Diagnostics {
    kind: &'static str,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            kind: "error",
            error: Box::new(error),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, error } = self;
        writeln!(fmt, "{}: {}", kind, error.error())?;

        let location = error.location();
        writeln!(fmt, " --> {}", location)?;

        let (start, end) = (location.start(), location.end());
        let digits = end.line().to_string().chars().count();
        writeln!(fmt, "{:digits$} |", "", digits = digits)?;

        location.source().with_line(start.line(), |line| {
            writeln!(fmt, "{:>digits$} | {}", start.line(), line, digits = digits)
        })?;

        // Solo se resalta la primera línea del rango
        let skip = (start.column() - 1) as usize;
        let highlight = if end.line() == start.line() && end.column() > start.column() {
            (end.column() - start.column()) as usize
        } else {
            1
        };

        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = skip,
            highlight = highlight
        )?;

        writeln!(fmt)?;
        writeln!(fmt, "Build failed with 1 error")
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn error(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Position, Source};

    #[derive(thiserror::Error, Debug)]
    #[error("Something broke")]
    struct Broken;

    #[test]
    fn renders_source_excerpt() {
        let source = Source::new("demo.ray", "func main() {\n    oops(1)\n}");
        let start = Position::new(18, 2, 5);
        let end = Position::new(22, 2, 9);
        let error = Located::at(Broken, Location::range(&source, start..end));

        let rendered = Diagnostics::from(error).kind("Definition error").to_string();
        let lines: Vec<_> = rendered.lines().collect();

        assert_eq!(lines[0], "Definition error: Something broke");
        assert_eq!(lines[1], " --> demo.ray:2:5");
        assert_eq!(lines[3], "2 |     oops(1)");
        assert_eq!(lines[4], "  |     ^^^^");
        assert_eq!(lines.last(), Some(&"Build failed with 1 error"));
    }
}
