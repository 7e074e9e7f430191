//! Tabla de slots de una función.
//!
//! Cada parámetro y cada local de una función ocupa un slot de 8 bytes
//! en su stack frame. El orden es determinista: primero los parámetros
//! en orden de declaración, luego las locales en orden de aparición,
//! incluyendo un slot sintético por cada llamada en posición de sentencia.
//!
//! El parser construye la tabla mientras resuelve identificadores y la
//! deja en [`crate::ast::Function`]; el generador de código la consulta
//! para disponer el frame. No existe una segunda reconstrucción.

use crate::lex::Identifier;

/// Tamaño de un slot, en bytes.
pub const SLOT_SIZE: u32 = 8;

/// Alineamiento del stack frame, en bytes.
pub const FRAME_ALIGNMENT: u32 = 16;

/// Índice de un slot dentro de su función.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot(pub u32);

/// Ocupante de un slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotName {
    /// Parámetro o local con nombre.
    Named(Identifier),

    /// Resultado de la n-ésima llamada de la función.
    CallResult(u32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotTable {
    parameters: u32,
    calls: u32,
    slots: Vec<SlotName>,
}

impl SlotTable {
    /// Inicia una tabla con los parámetros de la función.
    ///
    /// Falla con el primer nombre de parámetro repetido.
    pub fn with_parameters<'a, I>(parameters: I) -> Result<Self, Identifier>
    where
        I: IntoIterator<Item = &'a Identifier>,
    {
        let mut table = SlotTable::default();
        for parameter in parameters {
            table.declare(parameter.clone())?;
            table.parameters += 1;
        }

        Ok(table)
    }

    /// Registra una local nueva.
    ///
    /// Falla si el nombre ya existe entre parámetros o locales.
    pub fn declare(&mut self, name: Identifier) -> Result<Slot, Identifier> {
        if self.resolve(name.as_ref()).is_some() {
            return Err(name);
        }

        Ok(self.push(SlotName::Named(name)))
    }

    /// Reserva el slot sintético de una llamada.
    pub fn call_result(&mut self) -> Slot {
        let call = self.calls;
        self.calls += 1;

        self.push(SlotName::CallResult(call))
    }

    /// Busca un nombre, primero entre parámetros y luego entre locales.
    pub fn resolve(&self, name: &str) -> Option<Slot> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, SlotName::Named(named) if named.as_ref() == name))
            .map(|index| Slot(index as u32))
    }

    /// Slot sintético de la n-ésima llamada de la función.
    pub fn call_result_of(&self, call: u32) -> Option<Slot> {
        self.slots
            .iter()
            .position(|slot| *slot == SlotName::CallResult(call))
            .map(|index| Slot(index as u32))
    }

    /// Determina si un slot pertenece a esta tabla.
    pub fn contains(&self, Slot(slot): Slot) -> bool {
        (slot as usize) < self.slots.len()
    }

    /// Cantidad de parámetros.
    pub fn parameters(&self) -> u32 {
        self.parameters
    }

    /// Cantidad total de slots.
    pub(crate) fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Tamaño del stack frame: el menor múltiplo de 16 que contiene a todos los slots.
    pub fn frame_size(&self) -> u32 {
        let bytes = self.len() * SLOT_SIZE;
        (bytes + FRAME_ALIGNMENT - 1) / FRAME_ALIGNMENT * FRAME_ALIGNMENT
    }

    fn push(&mut self, name: SlotName) -> Slot {
        let slot = Slot(self.len());
        self.slots.push(name);

        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Identifier> {
        names.iter().copied().map(Identifier::from).collect()
    }

    #[test]
    fn parameters_come_first() {
        let params = ids(&["a", "b"]);
        let mut table = SlotTable::with_parameters(&params).unwrap();

        assert_eq!(table.declare(Identifier::from("x")), Ok(Slot(2)));
        assert_eq!(table.call_result(), Slot(3));
        assert_eq!(table.declare(Identifier::from("y")), Ok(Slot(4)));

        assert_eq!(table.resolve("a"), Some(Slot(0)));
        assert_eq!(table.resolve("b"), Some(Slot(1)));
        assert_eq!(table.resolve("y"), Some(Slot(4)));
        assert_eq!(table.resolve("z"), None);
        assert_eq!(table.parameters(), 2);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn redeclaration_is_rejected() {
        let params = ids(&["a"]);
        let mut table = SlotTable::with_parameters(&params).unwrap();

        assert_eq!(table.declare(Identifier::from("a")), Err(Identifier::from("a")));
        assert!(table.declare(Identifier::from("b")).is_ok());
        assert_eq!(table.declare(Identifier::from("b")), Err(Identifier::from("b")));

        let repeated = ids(&["p", "p"]);
        assert_eq!(
            SlotTable::with_parameters(&repeated),
            Err(Identifier::from("p"))
        );
    }

    #[test]
    fn frame_size_rounds_up_to_sixteen() {
        let mut table = SlotTable::default();
        assert_eq!(table.frame_size(), 0);

        let expected = [16, 16, 32, 32, 48];
        for size in expected {
            table.call_result();
            assert_eq!(table.frame_size(), size);
        }
    }

    #[test]
    fn call_results_are_not_resolvable() {
        let mut table = SlotTable::default();
        let slot = table.call_result();

        assert!(table.contains(slot));
        assert!(!table.contains(Slot(1)));
        assert_eq!(table.call_result_of(0), Some(Slot(0)));
        assert_eq!(table.resolve("<call #0>"), None);

        table.declare(Identifier::from("x")).unwrap();
        let second = table.call_result();
        assert_eq!(table.call_result_of(1), Some(second));
        assert_eq!(table.call_result_of(2), None);
    }
}
