//! Árbol sintáctico.
//!
//! El parser resuelve todo identificador al construir el árbol, por lo
//! cual los operandos ([`Arg`]) solo contienen slots ya asignados o
//! referencias a símbolos externos. Los nombres que sí se preservan son
//! los declarados o asignados, los de funciones y los de alcance.

use std::ops::Deref;

use crate::{
    lex::Identifier,
    slots::{Slot, SlotTable},
    source::Position,
};

/// Módulo completo: nodos de nivel superior y región de datos estáticos.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Ast {
    nodes: Vec<Statement>,
    data: Vec<u8>,
}

impl Ast {
    pub fn new(nodes: Vec<Statement>, data: Vec<u8>) -> Self {
        Ast { nodes, data }
    }

    /// Contenido de la región de datos estáticos, direccionada por [`Arg::DataOffset`].
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Recorre todas las funciones del módulo, incluyendo las anidadas,
    /// en orden de aparición.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        let mut functions = Vec::new();
        visit(&self.nodes, &mut |statement| {
            if let Node::Function(function) = &statement.node {
                functions.push(function);
            }
        });

        functions.into_iter()
    }

    /// Recorre todas las declaraciones `extern` del módulo, incluyendo
    /// las anidadas en funciones, en orden de aparición.
    pub fn externs(&self) -> impl Iterator<Item = (Position, &[Identifier])> {
        let mut externs = Vec::new();
        visit(&self.nodes, &mut |statement| {
            if let Node::Extern { names } = &statement.node {
                externs.push((statement.position, names.as_slice()));
            }
        });

        externs.into_iter()
    }
}

impl Deref for Ast {
    type Target = [Statement];

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

/// Recorrido en preorden, descendiendo en cuerpos de funciones.
fn visit<'a, F>(statements: &'a [Statement], f: &mut F)
where
    F: FnMut(&'a Statement),
{
    for statement in statements {
        f(statement);
        if let Node::Function(function) = &statement.node {
            visit(&function.body, f);
        }
    }
}

/// Un nodo junto a la posición donde inicia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub position: Position,
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `extern a, b, c`
    Extern { names: Vec<Identifier> },

    /// `func name(params) { ... }` o `func name(params) => ...`
    Function(Function),

    /// `var name = arg`
    VariableDef {
        scope: Identifier,
        name: Identifier,
        arg: Arg,
    },

    /// `var a, b, c`, inicializadas en cero.
    MultiVariableDef {
        scope: Identifier,
        names: Vec<Identifier>,
    },

    /// `name = arg`
    VariableAssign {
        scope: Identifier,
        name: Identifier,
        arg: Arg,
    },

    /// Llamada cuyo resultado se descarta.
    FunctionCall(Call),

    /// `var name = f(...)` o `name = f(...)`
    FunctionCallAssign {
        scope: Identifier,
        var: Identifier,
        call: Call,
    },

    /// `return(arg)`
    Return { scope: Identifier, arg: Arg },

    /// `exit(arg)`
    Exit { scope: Identifier, arg: Arg },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: Identifier,
    pub params: Vec<Identifier>,
    pub body: Vec<Statement>,
    pub slots: SlotTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: Identifier,
    pub scope: Identifier,
    pub args: Vec<Arg>,
}

/// Un operando.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Constante entera.
    Literal(i64),

    /// Valor de un parámetro o local.
    AutoVar(Slot),

    /// Dirección de un parámetro o local.
    RefAutoVar(Slot),

    /// Valor apuntado por el puntero que contiene un slot.
    Deref(Slot),

    /// Valor de un símbolo importado.
    External(Identifier),

    /// Dirección de un símbolo importado o de una función.
    RefExternal(Identifier),

    /// Dirección dentro de la región de datos estáticos.
    DataOffset(u32),

    /// Ausencia explícita de valor, como en `return()`.
    Bogus,
}
