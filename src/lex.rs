//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. A diferencia de
//! otros lenguajes, los fines de línea y los comentarios **no** se
//! descartan: el parser los necesita para delimitar sentencias y cuerpos
//! de función en forma de flecha (`=>`). Cada token emitido esta asociado
//! a una ubicación en el código fuente original.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores, cadenas y texto
//! de comentarios sí incluyen su lexema original. Las constantes enteras
//! se resuelven a sus valores.
//!
//! # Comentarios
//! - `//` produce [`Token::Comment`], seguido del texto restante de la línea.
//! - `/*` y `/**` producen [`Token::OpenComment`], seguido de una entrada
//!   [`Token::Text`] por línea no vacía del comentario y un
//!   [`Token::LineEnd`] entre líneas. El cierre `*/` no produce token.
//!
//! # Errores
//! El primer error léxico aborta el análisis.

use crate::source::{Located, Location, Position, Source};
use std::{
    collections::VecDeque,
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::{CharIndices, FromStr},
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", i64::MAX)]
    IntOverflow,

    /// Cadena sin `"` de cierre.
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// Comentario de bloque sin `*/` de cierre.
    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl std::borrow::Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Estilo de apertura de un comentario de bloque.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommentStyle {
    /// `/*`
    Block,

    /// `/**`
    Doc,
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    Number(i64),

    /// Literal de cadena, sin comillas.
    Str(Rc<str>),

    /// Texto de un comentario. El indicador señala si proviene
    /// de un comentario de bloque.
    Text { text: Rc<str>, multi_line: bool },

    /// `//`
    Comment,

    /// `/*` o `/**`
    OpenComment(CommentStyle),

    /// Fin de línea.
    LineEnd,

    /// Fin de la entrada. Siempre es el último token.
    Eof,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `=`
    Assign,

    /// `==`
    Equal,

    /// `=>`
    Arrow,

    /// `&`
    Ampersand,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `:`
    Colon,

    /// `?`
    Question,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Number(integer) => write!(fmt, "literal `{}`", integer),
            Str(string) => write!(fmt, "string {:?}", string),
            Text { .. } => fmt.write_str("comment text"),
            Comment => fmt.write_str("`//`"),
            OpenComment(CommentStyle::Block) => fmt.write_str("`/*`"),
            OpenComment(CommentStyle::Doc) => fmt.write_str("`/**`"),
            LineEnd => fmt.write_str("end of line"),
            Eof => fmt.write_str("end of input"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            Assign => fmt.write_str("`=`"),
            Equal => fmt.write_str("`==`"),
            Arrow => fmt.write_str("`=>`"),
            Ampersand => fmt.write_str("`&`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            Semicolon => fmt.write_str("`;`"),
            Comma => fmt.write_str("`,`"),
            Colon => fmt.write_str("`:`"),
            Question => fmt.write_str("`?`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Func,
    Var,
    Return,
    Extern,
    Exit,
    Import,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Func   => "func",
            Var    => "var",
            Return => "return",
            Extern => "extern",
            Exit   => "exit",
            Import => "import",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("func",   Func),
            ("var",    Var),
            ("return", Return),
            ("extern", Extern),
            ("exit",   Exit),
            ("import", Import),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Escáner de un archivo fuente completo.
pub struct Lexer<'a> {
    source: &'a Rc<Source>,
    chars: Peekable<CharIndices<'a>>,
    next: Position,
    queue: VecDeque<Located<Token>>,
    done: bool,
}

type Lex<T> = Result<T, Located<LexerError>>;

impl<'a> Lexer<'a> {
    /// Crea un lexer posicionado al inicio del archivo.
    pub fn new(source: &'a Rc<Source>) -> Self {
        Lexer {
            source,
            chars: source.text().char_indices().peekable(),
            next: Position::default(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens terminada
    /// en [`Token::Eof`], o al primer error encontrado.
    pub fn tokenize(self) -> Lex<Vec<Located<Token>>> {
        self.collect()
    }

    /// Intenta construir un siguiente token. Un mismo lexema puede
    /// producir varios tokens (comentarios), por lo cual todos se
    /// encolan en orden.
    fn lex(&mut self) -> Lex<()> {
        use Token::*;

        loop {
            let start = self.next;
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    self.push(Eof, start);
                    self.done = true;
                    return Ok(());
                }
            };

            let token = match c {
                // Espacios en blanco, excepto fines de línea
                '\n' => {
                    self.bump();
                    LineEnd
                }

                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }

                // Comentarios y división comparten prefijo
                '/' => {
                    self.bump();
                    match self.peek() {
                        Some('/') => {
                            self.bump();
                            self.push(Comment, start);
                            self.line_comment();
                            return Ok(());
                        }

                        Some('*') => {
                            self.bump();
                            let style = if self.peek() == Some('*') && !self.at_close() {
                                self.bump();
                                CommentStyle::Doc
                            } else {
                                CommentStyle::Block
                            };

                            self.push(OpenComment(style), start);
                            return self.block_comment(start);
                        }

                        _ => Slash,
                    }
                }

                '"' => {
                    self.bump();
                    self.string(start)?
                }

                // Operadores de uno o dos caracteres, por coincidencia más larga
                '=' => {
                    self.bump();
                    match self.peek() {
                        Some('=') => {
                            self.bump();
                            Equal
                        }

                        Some('>') => {
                            self.bump();
                            Arrow
                        }

                        _ => Assign,
                    }
                }

                c => {
                    let single = match c {
                        '+' => Some(Plus),
                        '-' => Some(Minus),
                        '*' => Some(Times),
                        '&' => Some(Ampersand),
                        '(' => Some(OpenParen),
                        ')' => Some(CloseParen),
                        '{' => Some(OpenCurly),
                        '}' => Some(CloseCurly),
                        ';' => Some(Semicolon),
                        ',' => Some(Comma),
                        ':' => Some(Colon),
                        '?' => Some(Question),
                        _ => None,
                    };

                    match single {
                        Some(token) => {
                            self.bump();
                            token
                        }

                        None if c.is_ascii_alphabetic() => self.word(),
                        None if c.is_ascii_digit() => self.integer(start)?,
                        None => return Err(self.error(LexerError::BadChar(c), start)),
                    }
                }
            };

            self.push(token, start);
            return Ok(());
        }
    }

    /// Texto de un comentario `//`. El fin de línea se deja en la entrada.
    fn line_comment(&mut self) {
        let start = self.next;
        let mut text = String::new();
        while let Some(c) = self.peek().filter(|&c| c != '\n') {
            text.push(c);
            self.bump();
        }

        if !text.is_empty() {
            let token = Token::Text {
                text: Rc::from(text),
                multi_line: false,
            };

            self.push(token, start);
        }
    }

    /// Cuerpo de un comentario de bloque, hasta `*/` inclusive.
    fn block_comment(&mut self, open: Position) -> Lex<()> {
        let mut start = self.next;
        let mut text = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error(LexerError::UnterminatedComment, open)),

                Some('*') if self.at_close() => {
                    self.bump();
                    self.bump();
                    self.flush_text(&mut text, start);

                    return Ok(());
                }

                Some('\n') => {
                    self.flush_text(&mut text, start);

                    let line_end = self.next;
                    self.bump();
                    self.push(Token::LineEnd, line_end);

                    start = self.next;
                }

                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn flush_text(&mut self, text: &mut String, start: Position) {
        if !text.is_empty() {
            let token = Token::Text {
                text: Rc::from(std::mem::take(text)),
                multi_line: true,
            };

            self.push(token, start);
        }
    }

    fn string(&mut self, open: Position) -> Lex<Token> {
        let mut literal = String::new();
        loop {
            match self.bump() {
                None => break Err(self.error(LexerError::UnterminatedString, open)),
                Some('"') => break Ok(Token::Str(Rc::from(literal))),
                Some(c) => literal.push(c),
            }
        }
    }

    /// Término que puede ser un identificador o una palabra clave.
    fn word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(c) = self.peek().filter(|&c| is_word_char(c)) {
            word.push(c);
            self.bump();
        }

        match Keyword::from_str(&word) {
            Ok(keyword) => Token::Keyword(keyword),
            Err(()) => Token::Id(Identifier(Rc::from(word))),
        }
    }

    /// Acumulación dígito por dígito de constantes enteras.
    fn integer(&mut self, start: Position) -> Lex<Token> {
        let mut accumulated: i64 = 0;
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            self.bump();

            accumulated = accumulated
                .checked_mul(10)
                .and_then(|n| n.checked_add(digit as i64))
                .ok_or_else(|| self.error(LexerError::IntOverflow, start))?;
        }

        Ok(Token::Number(accumulated))
    }

    /// Determina si la entrada continúa con `*/`.
    fn at_close(&self) -> bool {
        let mut lookahead = self.chars.clone();
        matches!(
            (lookahead.next(), lookahead.next()),
            (Some((_, '*')), Some((_, '/')))
        )
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        self.next = match c {
            '\n' => self.next.newline(),
            c => self.next.advance(c.len_utf8()),
        };

        Some(c)
    }

    fn push(&mut self, token: Token, start: Position) {
        let token = self.located(token, start);
        self.queue.push_back(token);
    }

    fn located<T>(&self, value: T, start: Position) -> Located<T> {
        let end = if self.next == start {
            start.advance(0)
        } else {
            self.next
        };

        Located::at(value, Location::range(self.source, start..end))
    }

    fn error(&self, error: LexerError, at: Position) -> Located<LexerError> {
        Located::at(error, Location::at(self.source, at))
    }
}

/// Emite tokens uno a uno. Tras el primer error o tras [`Token::Eof`]
/// el iterador termina.
impl Iterator for Lexer<'_> {
    type Item = Lex<Located<Token>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.queue.pop_front() {
            return Some(Ok(token));
        } else if self.done {
            return None;
        }

        match self.lex() {
            Ok(()) => self.queue.pop_front().map(Ok),
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let source = Source::new("<test>", text);
        Lexer::new(&source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier::from(name))
    }

    #[test]
    fn function_header() {
        assert_eq!(
            tokens("func main() {\n}"),
            vec![
                Token::Keyword(Keyword::Func),
                id("main"),
                Token::OpenParen,
                Token::CloseParen,
                Token::OpenCurly,
                Token::LineEnd,
                Token::CloseCurly,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn operators_take_longest_match() {
        assert_eq!(
            tokens("= == => + - * / &"),
            vec![
                Token::Assign,
                Token::Equal,
                Token::Arrow,
                Token::Plus,
                Token::Minus,
                Token::Times,
                Token::Slash,
                Token::Ampersand,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            tokens("extern Extern import"),
            vec![
                Token::Keyword(Keyword::Extern),
                id("Extern"),
                Token::Keyword(Keyword::Import),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn line_comment_keeps_text_and_line_end() {
        assert_eq!(
            tokens("exit(0) // bye\nx"),
            vec![
                Token::Keyword(Keyword::Exit),
                Token::OpenParen,
                Token::Number(0),
                Token::CloseParen,
                Token::Comment,
                Token::Text {
                    text: Rc::from(" bye"),
                    multi_line: false,
                },
                Token::LineEnd,
                id("x"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn block_comments_split_by_line() {
        assert_eq!(
            tokens("/** doc\n */ a /**/"),
            vec![
                Token::OpenComment(CommentStyle::Doc),
                Token::Text {
                    text: Rc::from(" doc"),
                    multi_line: true,
                },
                Token::LineEnd,
                Token::Text {
                    text: Rc::from(" "),
                    multi_line: true,
                },
                id("a"),
                Token::OpenComment(CommentStyle::Block),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_numbers() {
        assert_eq!(
            tokens("puts(\"hi there\", 42)"),
            vec![
                id("puts"),
                Token::OpenParen,
                Token::Str(Rc::from("hi there")),
                Token::Comma,
                Token::Number(42),
                Token::CloseParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let source = Source::new("<test>", "func\n  main");
        let tokens = Lexer::new(&source).tokenize().unwrap();

        let main = tokens[2].location().start();
        assert_eq!((main.line(), main.column(), main.offset()), (2, 3, 7));

        let eof = tokens.last().unwrap();
        assert_eq!(eof.val(), &Token::Eof);
        assert_eq!(eof.location().start().offset(), 11);
    }

    #[test]
    fn first_error_aborts() {
        let source = Source::new("<test>", "var x\n  @");
        let error = Lexer::new(&source).tokenize().unwrap_err();

        assert!(matches!(error.val(), LexerError::BadChar('@')));
        assert_eq!(error.location().start().line(), 2);
        assert_eq!(error.location().start().column(), 3);
    }

    #[test]
    fn unterminated_constructs() {
        let source = Source::new("<test>", "\"open");
        let error = Lexer::new(&source).tokenize().unwrap_err();
        assert!(matches!(error.val(), LexerError::UnterminatedString));

        let source = Source::new("<test>", "/* open");
        let error = Lexer::new(&source).tokenize().unwrap_err();
        assert!(matches!(error.val(), LexerError::UnterminatedComment));
    }

    #[test]
    fn integer_overflow() {
        let source = Source::new("<test>", "99999999999999999999");
        let error = Lexer::new(&source).tokenize().unwrap_err();
        assert!(matches!(error.val(), LexerError::IntOverflow));
    }
}
