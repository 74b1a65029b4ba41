use hashbrown::HashMap;

use crate::{frontend::intern::InternedSymbol, middle::ir::Operand};

/// What a local name refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// An SSA value, used directly
    Value(Operand),
    /// A stack slot holding the value, for names targeted by `set!`
    Slot(Operand),
}

/// Local names visible while compiling one function. Each lambda or `let`
/// body gets its own frame, as does each arm of a conditional; lookups walk
/// frames from innermost to outermost
/// and a later binding in the same frame shadows an earlier one.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    frames: Vec<HashMap<InternedSymbol, Binding>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_scope(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Drops the innermost frame. The outermost frame is never removed.
    pub fn pop_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn bind(&mut self, name: InternedSymbol, binding: Binding) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, binding);
        }
    }

    /// Replaces the binding in the innermost frame that already has `name`.
    /// Returns false if no frame binds it.
    pub fn rebind(&mut self, name: InternedSymbol, binding: Binding) -> bool {
        match self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(&name))
        {
            Some(existing) => {
                *existing = binding;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, name: InternedSymbol) -> Option<&Binding> {
        self.frames.iter().rev().find_map(|frame| frame.get(&name))
    }
}

/// How a top level name is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    /// A word sized global variable
    Variable,
    /// A function taking `arity` words
    Function { arity: usize },
}

/// Top level names known when a function body is compiled
pub type GlobalEnvironment = HashMap<InternedSymbol, GlobalKind>;
