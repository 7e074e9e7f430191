//! Análisis sintáctico.
//!
//! # Resolución en dos pasadas
//! Antes del análisis estructural se recorre la lista completa de tokens
//! y se recolectan todos los nombres introducidos por `func` y `extern`.
//! Este conjunto es inmutable durante el resto del análisis, lo cual
//! permite referencias adelantadas: una función puede llamar a otra que
//! se define más adelante en el archivo.
//!
//! # Resolución de identificadores
//! Todo identificador usado como operando se resuelve en el momento,
//! en este orden: parámetro, local, símbolo externo, función. El árbol
//! resultante nunca contiene nombres sin resolver. Cada función acumula
//! su propia [`SlotTable`], la cual termina formando parte del nodo
//! [`Function`].
//!
//! # Errores
//! El primer error aborta el análisis. No hay recuperación.

use std::{collections::HashSet, iter::Peekable, slice};
use thiserror::Error;

use crate::{
    ast::{Arg, Ast, Call, Function, Node, Statement},
    error::ErrorClass,
    lex::{Identifier, Keyword, Token},
    slots::SlotTable,
    source::{Located, Position},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Expected, Token),

    #[error("Expected a line break, comment or `;` after {0}, found {1} instead")]
    MissingTerminator(&'static str, Token),

    #[error("Expected `extern` or `func` at top level, found {0} instead")]
    ExpectedItem(Token),

    #[error("Expected any of `extern`, `func`, `return`, `exit`, `var`, a call or an assignment, found {0} instead")]
    ExpectedStatement(Token),

    #[error("Expected a literal or an identifier, found {0} instead")]
    ExpectedArgument(Token),

    #[error("Only one variable may be initialized per `var` declaration")]
    MultipleInitialization,

    #[error("Function `{0}` is defined more than once")]
    DuplicateFunction(Identifier),

    #[error("Function `{0}` clashes with an extern of the same name")]
    ExternClash(Identifier),

    #[error("Function `{0}` is not defined")]
    UndefinedFunction(Identifier),

    #[error("Too many arguments for `{construct}`, at most {max} allowed")]
    TooManyArguments { construct: &'static str, max: usize },

    #[error("`{0}` is not a parameter, local variable or extern")]
    Unresolved(Identifier),

    #[error("`{0}` is already defined in this function")]
    Redefinition(Identifier),
}

impl ParserError {
    pub fn class(&self) -> ErrorClass {
        use ParserError::*;

        match self {
            UnexpectedToken(..)
            | MissingTerminator(..)
            | ExpectedItem(_)
            | ExpectedStatement(_)
            | ExpectedArgument(_)
            | MultipleInitialization => ErrorClass::Syntax,

            DuplicateFunction(_)
            | ExternClash(_)
            | UndefinedFunction(_)
            | TooManyArguments { .. } => ErrorClass::Definition,

            Unresolved(_) => ErrorClass::Name,
            Redefinition(_) => ErrorClass::VariableDefinition,
        }
    }
}

/// Lo que se esperaba encontrar ante un token inesperado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Token(Token),
    Identifier,
    FunctionBody,
}

impl std::fmt::Display for Expected {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Token(token) => write!(fmt, "{}", token),
            Expected::Identifier => fmt.write_str("identifier"),
            Expected::FunctionBody => fmt.write_str("`{` or `=>`"),
        }
    }
}

/// Construye el árbol sintáctico de un módulo a partir de su lista de tokens.
///
/// Se espera que la lista termine en [`Token::Eof`], tal como la produce
/// [`crate::lex::Lexer::tokenize()`].
pub fn parse(tokens: &[Located<Token>]) -> Result<Ast, Located<ParserError>> {
    let eof = match tokens.last() {
        Some(eof) => eof,
        None => return Ok(Ast::default()),
    };

    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
        eof,
        known: KnownNames::scan(tokens),
        defined: HashSet::new(),
        data: Vec::new(),
    };

    parser.program()
}

/// Nombres de funciones y externs, recolectados antes del análisis.
#[derive(Debug, Default)]
struct KnownNames {
    functions: HashSet<Identifier>,
    externs: HashSet<Identifier>,
}

impl KnownNames {
    fn scan(tokens: &[Located<Token>]) -> Self {
        let mut known = KnownNames::default();
        let mut tokens = tokens.iter().map(Located::val).peekable();

        while let Some(token) = tokens.next() {
            match token {
                Token::Keyword(Keyword::Func) => {
                    if let Some(Token::Id(name)) = tokens.peek() {
                        known.functions.insert(name.clone());
                    }
                }

                // Lista separada por comas hasta el primer token ajeno
                Token::Keyword(Keyword::Extern) => {
                    while let Some(Token::Id(name)) = tokens.peek() {
                        known.externs.insert(name.clone());
                        tokens.next();

                        if tokens.peek() != Some(&&Token::Comma) {
                            break;
                        }

                        tokens.next();
                    }
                }

                _ => (),
            }
        }

        known
    }

    fn contains(&self, name: &str) -> bool {
        self.functions.contains(name) || self.externs.contains(name)
    }
}

/// Contexto de la función en análisis.
struct Scope {
    function: Identifier,
    slots: SlotTable,
}

struct Parser<'a> {
    tokens: Peekable<slice::Iter<'a, Located<Token>>>,
    eof: &'a Located<Token>,
    known: KnownNames,
    defined: HashSet<Identifier>,
    data: Vec<u8>,
}

type Parse<T> = Result<T, Located<ParserError>>;

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parse<Ast> {
        let mut nodes = Vec::new();
        loop {
            self.skip_trivia();

            let position = self.position();
            let node = match self.peek() {
                Token::Eof => break,
                Token::Keyword(Keyword::Extern) => self.extern_list()?,
                Token::Keyword(Keyword::Func) => self.function()?,
                token => return self.fail(ParserError::ExpectedItem(token.clone())),
            };

            nodes.push(Statement { position, node });
        }

        Ok(Ast::new(nodes, std::mem::take(&mut self.data)))
    }

    fn extern_list(&mut self) -> Parse<Node> {
        self.keyword(Keyword::Extern)?;

        let mut names = vec![self.id()?.into_inner()];
        while self.accept(&Token::Comma) {
            names.push(self.id()?.into_inner());
        }

        self.end_of_statement("extern declaration")?;
        Ok(Node::Extern { names })
    }

    fn function(&mut self) -> Parse<Node> {
        self.keyword(Keyword::Func)?;
        let (location, name) = self.id()?.split();

        self.expect(Token::OpenParen)?;
        let mut params = Vec::new();
        if !self.accept(&Token::CloseParen) {
            params.push(self.id()?.into_inner());
            while self.accept(&Token::Comma) {
                params.push(self.id()?.into_inner());
            }

            self.expect(Token::CloseParen)?;
        }

        let slots = match SlotTable::with_parameters(&params) {
            Ok(slots) => slots,
            Err(repeated) => return self.fail(ParserError::Redefinition(repeated)),
        };

        let mut scope = Scope {
            function: name.clone(),
            slots,
        };

        let body = match self.peek() {
            Token::OpenCurly => self.block_body(&mut scope)?,
            Token::Arrow => self.arrow_body(&mut scope)?,
            token => {
                return self.fail(ParserError::UnexpectedToken(
                    Expected::FunctionBody,
                    token.clone(),
                ))
            }
        };

        // El nombre se registra solo tras analizar el cuerpo completo
        let error = if self.known.externs.contains(&name) {
            Some(ParserError::ExternClash(name.clone()))
        } else if !self.defined.insert(name.clone()) {
            Some(ParserError::DuplicateFunction(name.clone()))
        } else {
            None
        };

        if let Some(error) = error {
            return Err(Located::at(error, location));
        }

        Ok(Node::Function(Function {
            name,
            params,
            body,
            slots: scope.slots,
        }))
    }

    /// `{ sentencias }`
    fn block_body(&mut self, scope: &mut Scope) -> Parse<Vec<Statement>> {
        self.expect(Token::OpenCurly)?;

        let mut body = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Token::CloseCurly => {
                    self.next();
                    break Ok(body);
                }

                Token::Eof => break self.fail(ParserError::UnexpectedToken(
                    Expected::Token(Token::CloseCurly),
                    Token::Eof,
                )),

                _ => body.push(self.statement(scope)?),
            }
        }
    }

    /// `=> sentencia; sentencia; ...` hasta el fin de línea.
    fn arrow_body(&mut self, scope: &mut Scope) -> Parse<Vec<Statement>> {
        self.expect(Token::Arrow)?;

        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::LineEnd | Token::Comment | Token::OpenComment(_) | Token::Eof => {
                    break Ok(body)
                }

                Token::Semicolon => {
                    self.next();
                }

                _ => body.push(self.statement(scope)?),
            }
        }
    }

    fn statement(&mut self, scope: &mut Scope) -> Parse<Statement> {
        let position = self.position();
        let node = match self.peek() {
            Token::Keyword(Keyword::Extern) => self.extern_list()?,
            Token::Keyword(Keyword::Func) => self.function()?,
            Token::Keyword(Keyword::Return) => {
                self.next();
                let arg = self.single_argument(scope, "return")?;
                Node::Return {
                    scope: scope.function.clone(),
                    arg,
                }
            }

            Token::Keyword(Keyword::Exit) => {
                self.next();
                let arg = self.single_argument(scope, "exit")?;
                Node::Exit {
                    scope: scope.function.clone(),
                    arg,
                }
            }

            Token::Keyword(Keyword::Var) => self.var(scope)?,

            Token::Id(_) => {
                if self.lookahead(1) == &Token::Assign {
                    self.assignment(scope)?
                } else {
                    let call = self.call(scope)?;
                    scope.slots.call_result();

                    Node::FunctionCall(call)
                }
            }

            token => return self.fail(ParserError::ExpectedStatement(token.clone())),
        };

        Ok(Statement { position, node })
    }

    /// `var a, b, c` o `var a = valor`
    fn var(&mut self, scope: &mut Scope) -> Parse<Node> {
        self.keyword(Keyword::Var)?;

        let mut names = vec![self.id()?];
        while self.accept(&Token::Comma) {
            names.push(self.id()?);
        }

        if self.peek() != &Token::Assign {
            self.end_of_statement("variable declaration")?;

            let mut declared = Vec::with_capacity(names.len());
            for name in names {
                let (location, name) = name.split();
                if let Err(repeated) = scope.slots.declare(name.clone()) {
                    return Err(Located::at(ParserError::Redefinition(repeated), location));
                }

                declared.push(name);
            }

            return Ok(Node::MultiVariableDef {
                scope: scope.function.clone(),
                names: declared,
            });
        }

        if names.len() > 1 {
            return self.fail(ParserError::MultipleInitialization);
        }

        self.expect(Token::Assign)?;

        // El valor se resuelve antes de declarar, `var x = x` no es válido
        let value = self.value(scope)?;
        self.end_of_statement("variable declaration")?;

        let (location, name) = names.remove(0).split();
        if let Err(repeated) = scope.slots.declare(name.clone()) {
            return Err(Located::at(ParserError::Redefinition(repeated), location));
        }

        Ok(assign_node(scope, name, value, true))
    }

    /// `nombre = valor`
    fn assignment(&mut self, scope: &mut Scope) -> Parse<Node> {
        let (location, name) = self.id()?.split();
        if scope.slots.resolve(name.as_ref()).is_none() {
            return Err(Located::at(ParserError::Unresolved(name), location));
        }

        self.expect(Token::Assign)?;
        let value = self.value(scope)?;
        self.end_of_statement("assignment")?;

        Ok(assign_node(scope, name, value, false))
    }

    /// Lado derecho de una asignación: una llamada o un operando.
    fn value(&mut self, scope: &Scope) -> Parse<Value> {
        match (self.peek(), self.lookahead(1)) {
            (Token::Id(_), Token::OpenParen) => self.call(scope).map(Value::Call),
            _ => self.argument(scope).map(Value::Arg),
        }
    }

    /// `nombre(argumentos)`, tanto directa como indirecta a través de un slot.
    fn call(&mut self, scope: &Scope) -> Parse<Call> {
        let (location, name) = self.id()?.split();
        let callable =
            self.known.contains(name.as_ref()) || scope.slots.resolve(name.as_ref()).is_some();

        if !callable {
            return Err(Located::at(ParserError::UndefinedFunction(name), location));
        }

        let args = self.arguments(scope, None, "function call")?;
        Ok(Call {
            name,
            scope: scope.function.clone(),
            args,
        })
    }

    /// Argumento de `return` o `exit`. Una lista vacía resulta en [`Arg::Bogus`].
    fn single_argument(&mut self, scope: &Scope, construct: &'static str) -> Parse<Arg> {
        let mut args = self.arguments(scope, Some(1), construct)?;
        Ok(args.pop().unwrap_or(Arg::Bogus))
    }

    /// `(arg, arg, ...)`, seguido de un terminador de sentencia.
    fn arguments(
        &mut self,
        scope: &Scope,
        max: Option<usize>,
        construct: &'static str,
    ) -> Parse<Vec<Arg>> {
        self.expect(Token::OpenParen)?;

        let mut args = Vec::new();
        if !self.accept(&Token::CloseParen) {
            args.push(self.argument(scope)?);
            while self.accept(&Token::Comma) {
                args.push(self.argument(scope)?);
            }

            self.expect(Token::CloseParen)?;
        }

        match max {
            Some(max) if args.len() > max => {
                return self.fail(ParserError::TooManyArguments { construct, max })
            }

            _ => (),
        }

        self.end_of_statement(construct)?;
        Ok(args)
    }

    /// Un operando: literal, cadena, identificador, `*local` o `&nombre`.
    fn argument(&mut self, scope: &Scope) -> Parse<Arg> {
        let (location, token) = self.next().clone().split();
        let arg = match token {
            Token::Number(value) => Arg::Literal(value),
            Token::Str(string) => Arg::DataOffset(self.intern(&string)),

            Token::Id(name) => match scope.slots.resolve(name.as_ref()) {
                Some(slot) => Arg::AutoVar(slot),
                None if self.known.externs.contains(&name) => Arg::External(name),
                None if self.known.functions.contains(&name) => Arg::RefExternal(name),
                None => return Err(Located::at(ParserError::Unresolved(name), location)),
            },

            Token::Times => {
                let (location, name) = self.id()?.split();
                match scope.slots.resolve(name.as_ref()) {
                    Some(slot) => Arg::Deref(slot),
                    None => return Err(Located::at(ParserError::Unresolved(name), location)),
                }
            }

            Token::Ampersand => {
                let (location, name) = self.id()?.split();
                match scope.slots.resolve(name.as_ref()) {
                    Some(slot) => Arg::RefAutoVar(slot),
                    None if self.known.contains(name.as_ref()) => Arg::RefExternal(name),
                    None => return Err(Located::at(ParserError::Unresolved(name), location)),
                }
            }

            token => return Err(Located::at(ParserError::ExpectedArgument(token), location)),
        };

        Ok(arg)
    }

    /// Agrega una cadena terminada en nulo a la región de datos estáticos.
    fn intern(&mut self, string: &str) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(string.as_bytes());
        self.data.push(0);

        offset
    }

    /// Verifica, sin consumir, que la sentencia termina aquí.
    fn end_of_statement(&mut self, construct: &'static str) -> Parse<()> {
        match self.peek() {
            Token::LineEnd
            | Token::Comment
            | Token::OpenComment(_)
            | Token::Semicolon
            | Token::CloseCurly
            | Token::Eof => Ok(()),

            token => self.fail(ParserError::MissingTerminator(construct, token.clone())),
        }
    }

    /// Descarta fines de línea, comentarios y `;` entre sentencias.
    fn skip_trivia(&mut self) {
        while let Token::LineEnd
        | Token::Comment
        | Token::OpenComment(_)
        | Token::Text { .. }
        | Token::Semicolon = self.peek()
        {
            self.next();
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        match self.peek() {
            Token::Id(id) => {
                let location = self.next().location().clone();
                Ok(Located::at(id.clone(), location))
            }

            token => self.fail(ParserError::UnexpectedToken(Expected::Identifier, token.clone())),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        if self.accept(&token) {
            Ok(())
        } else {
            let found = self.peek().clone();
            self.fail(ParserError::UnexpectedToken(Expected::Token(token), found))
        }
    }

    fn accept(&mut self, token: &Token) -> bool {
        let found = self.peek() == token;
        if found {
            self.next();
        }

        found
    }

    fn lookahead(&self, distance: usize) -> &'a Token {
        self.tokens
            .clone()
            .nth(distance)
            .unwrap_or(self.eof)
            .val()
    }

    fn peek(&mut self) -> &'a Token {
        self.tokens.peek().copied().unwrap_or(self.eof).val()
    }

    fn position(&mut self) -> Position {
        self.tokens
            .peek()
            .copied()
            .unwrap_or(self.eof)
            .location()
            .start()
    }

    /// Consume un token. Al final de la lista se repite [`Token::Eof`].
    fn next(&mut self) -> &'a Located<Token> {
        self.tokens.next().unwrap_or(self.eof)
    }

    /// Falla en la posición del token actual.
    fn fail<T>(&mut self, error: ParserError) -> Parse<T> {
        let location = self.tokens.peek().copied().unwrap_or(self.eof).location();
        Err(Located::at(error, location.clone()))
    }
}

/// Lado derecho de una declaración o asignación.
enum Value {
    Call(Call),
    Arg(Arg),
}

/// Nodo resultante de `var x = valor` (`def`) o `x = valor`.
fn assign_node(scope: &mut Scope, name: Identifier, value: Value, def: bool) -> Node {
    let function = scope.function.clone();
    match value {
        Value::Call(call) => {
            scope.slots.call_result();
            Node::FunctionCallAssign {
                scope: function,
                var: name,
                call,
            }
        }

        Value::Arg(arg) if def => Node::VariableDef {
            scope: function,
            name,
            arg,
        },

        Value::Arg(arg) => Node::VariableAssign {
            scope: function,
            name,
            arg,
        },
    }
}
