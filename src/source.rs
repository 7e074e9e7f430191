//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el código fuente original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.location, self.value)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Located<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.value)
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Ubicación de un único carácter.
    pub fn at(from: &Rc<Source>, position: Position) -> Self {
        Location {
            from: Rc::clone(from),
            position: position..position.advance(0),
        }
    }

    /// Ubicación que cubre un rango de posiciones.
    pub fn range(from: &Rc<Source>, position: Range<Position>) -> Self {
        Location {
            from: Rc::clone(from),
            position,
        }
    }

    /// Ubicación inmediatamente posterior al último carácter del origen.
    pub fn eof(from: &Rc<Source>) -> Self {
        Location::at(from, from.end())
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin (exclusiva).
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el código fuente de origen.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.from.name(), self.position.start)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición en un archivo: desplazamiento en bytes y par línea-columna.
///
/// Líneas y columnas inician en 1. Las columnas se cuentan por carácter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    offset: usize,
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición arbitraria.
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Position {
            offset,
            line,
            column,
        }
    }

    /// Obtiene el desplazamiento en bytes desde el inicio del archivo.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Avanza una columna tras consumir un carácter de `width` bytes.
    pub fn advance(self, width: usize) -> Position {
        Position {
            offset: self.offset + width,
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Consume `'\n'`, incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            offset: self.offset + 1,
            line: self.line + 1,
            column: 1,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y texto completo de un archivo fuente.
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Crea un origen compartido.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Rc::new(Source {
            name: name.into(),
            text: text.into(),
        })
    }

    /// Obtiene el nombre del origen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtiene el texto completo.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Posición que sigue al último carácter.
    pub fn end(&self) -> Position {
        self.text.chars().fold(Position::default(), |position, c| match c {
            '\n' => position.newline(),
            c => position.advance(c.len_utf8()),
        })
    }

    /// Invoca a `f` con el contenido de una línea, o con `""` si no existe.
    pub fn with_line<F, R>(&self, line: u32, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).saturating_sub(1);
        f(self.text.lines().nth(index).unwrap_or(""))
    }
}

impl Debug for Source {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Source").field("name", &self.name).finish()
    }
}
