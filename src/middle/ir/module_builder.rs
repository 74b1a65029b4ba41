use hashbrown::HashMap;
use tracing::trace;

use super::{BasicBlock, Definition, FunctionDefinition, Module, Parameter, Type};
use crate::{frontend::intern::InternedSymbol, middle::codegen::CodegenError};

/// Accumulates the top level definitions of a compilation unit in insertion
/// order. Inserting a definition that is structurally equal to one already
/// present is a no-op, so callers may declare the same runtime function or
/// type as often as they need it.
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    definitions: Vec<Definition>,
    /// Positions of the definitions carrying each name, ascending. Only
    /// these need to be compared when checking for duplicates.
    name_index: HashMap<InternedSymbol, Vec<usize>>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
            name_index: HashMap::new(),
        }
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn contains(&self, definition: &Definition) -> bool {
        self.name_index
            .get(&definition.name())
            .is_some_and(|positions| {
                positions
                    .iter()
                    .any(|position| self.definitions[*position] == *definition)
            })
    }

    pub fn function(&self, name: InternedSymbol) -> Option<&FunctionDefinition> {
        self.name_index
            .get(&name)?
            .iter()
            .find_map(|position| match &self.definitions[*position] {
                Definition::Function(function) => Some(function),
                _ => None,
            })
    }

    /// Appends the definition unless an identical one exists. Returns whether
    /// it was inserted.
    pub fn add_definition(&mut self, definition: Definition) -> bool {
        if self.contains(&definition) {
            trace!(name = %definition.name(), "skipping duplicate definition");
            return false;
        }

        let position = self.definitions.len();
        self.name_index
            .entry(definition.name())
            .or_default()
            .push(position);
        self.definitions.push(definition);

        true
    }

    /// Removes the first function definition with the given name
    pub fn remove_function(
        &mut self,
        name: InternedSymbol,
    ) -> Result<FunctionDefinition, CodegenError> {
        let position = self
            .name_index
            .get(&name)
            .and_then(|positions| {
                positions
                    .iter()
                    .copied()
                    .find(|p| matches!(self.definitions[*p], Definition::Function(_)))
            })
            .ok_or(CodegenError::UnknownFunction(name))?;

        let Definition::Function(function) = self.definitions.remove(position) else {
            unreachable!("position was selected because it holds a function");
        };

        // Everything after the removed definition moved down by one
        self.name_index.retain(|_, positions| {
            positions.retain(|p| *p != position);
            for p in positions.iter_mut() {
                if *p > position {
                    *p -= 1;
                }
            }
            !positions.is_empty()
        });

        Ok(function)
    }

    /// A zero initialized global holding one runtime value
    pub fn define_global_variable(&mut self, name: InternedSymbol) -> bool {
        self.add_definition(Definition::GlobalVariable {
            name,
            ty: Type::WORD,
            zero_initialized: true,
        })
    }

    pub fn declare_external(
        &mut self,
        name: InternedSymbol,
        return_type: Type,
        parameter_types: Vec<Type>,
    ) -> bool {
        self.add_definition(Definition::ExternalDeclaration {
            name,
            return_type,
            parameter_types,
        })
    }

    pub fn define_function(
        &mut self,
        name: InternedSymbol,
        return_type: Type,
        parameters: Vec<Parameter>,
        blocks: Vec<BasicBlock>,
    ) -> bool {
        self.add_definition(Definition::Function(FunctionDefinition {
            name,
            return_type,
            parameters,
            blocks,
        }))
    }

    pub fn define_type_alias(&mut self, name: InternedSymbol, ty: Type) -> bool {
        self.add_definition(Definition::TypeAlias { name, ty })
    }

    pub fn define_string_constant(&mut self, name: InternedSymbol, bytes: Vec<u8>) -> bool {
        self.add_definition(Definition::StringConstant { name, bytes })
    }

    pub fn finish(self) -> Module {
        Module {
            name: self.name,
            definitions: self.definitions,
        }
    }
}
