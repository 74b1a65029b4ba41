use std::{collections::VecDeque, rc::Rc};

use hashbrown::{HashMap, HashSet};
use tracing::trace;

use super::{
    CodegenError,
    names::NameSupply,
    scope::{Binding, GlobalEnvironment, SymbolTable},
};
use crate::{
    frontend::{ast::Lambda, intern::InternedSymbol},
    index::{Index, IndexVec, simple_index},
    middle::ir::{
        BasicBlock, FunctionDefinition, Instruction, Operand, Parameter, RegisterId, Statement,
        Terminator, Type,
    },
};

simple_index! {
    /// Identifies a block within the function being built. Blocks are
    /// emitted in the order of their ids.
    pub struct BlockId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

#[derive(Debug)]
struct BlockState {
    label: InternedSymbol,
    statements: Vec<Statement>,
    terminator: Option<Terminator>,
}

/// A lambda body waiting to be compiled as its own top level function
#[derive(Debug, Clone)]
pub struct PendingLambda {
    pub name: InternedSymbol,
    pub lambda: Rc<Lambda>,
    /// Top level names visible when the lambda was encountered
    pub globals: Rc<GlobalEnvironment>,
}

/// Output of [`FunctionBuilder::finalize`]
#[derive(Debug)]
pub struct FinalizedFunction {
    pub definition: FunctionDefinition,
    /// Lambdas encountered in the body, in the order they were found
    pub pending_lambdas: VecDeque<PendingLambda>,
}

/// Every compiled function takes and returns words
pub fn word_parameters(names: &[InternedSymbol]) -> Vec<Parameter> {
    names
        .iter()
        .map(|name| Parameter {
            name: *name,
            ty: Type::WORD,
        })
        .collect()
}

/// Incrementally builds the blocks of one function. Instructions are always
/// appended to the current block; switching blocks is explicit and never
/// inserts a branch.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: InternedSymbol,
    parameters: Vec<Parameter>,

    current_block: BlockId,
    blocks: IndexVec<BlockId, BlockState>,
    block_names: NameSupply,

    next_register: u32,

    symbols: SymbolTable,
    globals: Rc<GlobalEnvironment>,
    pending_lambdas: VecDeque<PendingLambda>,
}

impl FunctionBuilder {
    /// Starts a function with an empty `entry` block as the current block.
    /// Parameters are bound in their own scope frame.
    pub fn new(
        name: InternedSymbol,
        parameters: &[InternedSymbol],
        globals: Rc<GlobalEnvironment>,
    ) -> Self {
        let mut builder = Self {
            name,
            parameters: word_parameters(parameters),
            current_block: BlockId::ENTRY,
            blocks: IndexVec::new(),
            block_names: NameSupply::new(),
            next_register: 0,
            symbols: SymbolTable::new(),
            globals,
            pending_lambdas: VecDeque::new(),
        };

        let entry = builder.add_block("entry");
        builder.current_block = entry;

        builder.symbols.push_scope();
        for name in parameters {
            builder
                .symbols
                .bind(*name, Binding::Value(Operand::Parameter(*name, Type::WORD)));
        }

        builder
    }

    pub fn name(&self) -> InternedSymbol {
        self.name
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn globals(&self) -> &Rc<GlobalEnvironment> {
        &self.globals
    }

    pub fn fresh_register(&mut self) -> RegisterId {
        self.next_register += 1;
        RegisterId::new(self.next_register as usize)
    }

    fn append(&mut self, destination: Option<RegisterId>, instruction: Instruction) {
        let block = &mut self.blocks[self.current_block];

        // code after a terminator never runs
        if block.terminator.is_some() {
            trace!(function = %self.name, block = %block.label, "dropping dead instruction");
            return;
        }

        block.statements.push(Statement {
            destination,
            instruction,
        });
    }

    /// Appends `instruction` to the current block, assigning its result to a
    /// fresh register
    pub fn emit_instruction(&mut self, instruction: Instruction) -> Operand {
        let ty = instruction.result_type();
        let destination = self.fresh_register();

        self.append(Some(destination), instruction);

        Operand::Register(destination, ty)
    }

    /// Appends an instruction executed only for its side effect
    pub fn emit_effect(&mut self, instruction: Instruction) {
        self.append(None, instruction);
    }

    pub fn set_terminator(&mut self, terminator: Terminator) -> Result<(), CodegenError> {
        let block = &mut self.blocks[self.current_block];

        if block.terminator.is_some() {
            return Err(CodegenError::DoubleTerminator(block.label));
        }

        block.terminator = Some(terminator);
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block].terminator.is_some()
    }

    /// Creates a new block labelled after `base_name` without switching to it
    pub fn add_block(&mut self, base_name: &str) -> BlockId {
        let label = self.block_names.unique_name(base_name);
        trace!(function = %self.name, %label, "adding block");

        self.blocks.push(BlockState {
            label,
            statements: Vec::new(),
            terminator: None,
        })
    }

    pub fn set_current_block(&mut self, block: BlockId) -> Result<(), CodegenError> {
        if self.blocks.get(block).is_none() {
            return Err(CodegenError::InvalidBlock(block.index()));
        }

        self.current_block = block;
        Ok(())
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn label(&self, block: BlockId) -> InternedSymbol {
        self.blocks[block].label
    }

    pub fn enqueue_lambda(&mut self, pending: PendingLambda) {
        self.pending_lambdas.push_back(pending);
    }

    /// Blocks no branch can reach, apart from the entry block and blocks
    /// explicitly terminated with `unreachable`
    fn unreachable_blocks(&self) -> Vec<InternedSymbol> {
        let by_label: HashMap<InternedSymbol, BlockId> = self
            .blocks
            .enumerate()
            .map(|(id, block)| (block.label, id))
            .collect();

        let mut visited = HashSet::new();
        let mut worklist = vec![BlockId::ENTRY];

        while let Some(id) = worklist.pop() {
            if !visited.insert(id) {
                continue;
            }

            if let Some(terminator) = &self.blocks[id].terminator {
                worklist.extend(
                    terminator
                        .successors()
                        .into_iter()
                        .filter_map(|label| by_label.get(&label).copied()),
                );
            }
        }

        self.blocks
            .enumerate()
            .filter(|(id, block)| {
                !visited.contains(id) && block.terminator != Some(Terminator::Unreachable)
            })
            .map(|(_, block)| block.label)
            .collect()
    }

    /// Consumes the builder, producing the function's blocks in creation
    /// order. Every block must be terminated and reachable.
    pub fn finalize(self) -> Result<FinalizedFunction, CodegenError> {
        let unreachable = self.unreachable_blocks();

        let blocks = self
            .blocks
            .into_iter()
            .map(|block| {
                Ok(BasicBlock {
                    label: block.label,
                    statements: block.statements,
                    terminator: block
                        .terminator
                        .ok_or(CodegenError::TerminatorMissing(block.label))?,
                })
            })
            .collect::<Result<_, CodegenError>>()?;

        if let Some(label) = unreachable.into_iter().next() {
            return Err(CodegenError::UnreachableBlock(label));
        }

        Ok(FinalizedFunction {
            definition: FunctionDefinition {
                name: self.name,
                return_type: Type::WORD,
                parameters: self.parameters,
                blocks,
            },
            pending_lambdas: self.pending_lambdas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{BinaryOpcode, Constant};

    fn builder() -> FunctionBuilder {
        FunctionBuilder::new(InternedSymbol::new("f"), &[], Rc::default())
    }

    fn add_one() -> Instruction {
        Instruction::Binary {
            opcode: BinaryOpcode::Add,
            lhs: Operand::word(1),
            rhs: Operand::word(1),
        }
    }

    #[test]
    fn registers_count_up_from_one() {
        let mut builder = builder();

        let numbers = (0..4)
            .map(|_| builder.fresh_register().number())
            .collect::<Vec<_>>();

        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn emitted_instructions_get_typed_registers() {
        let mut builder = builder();

        let result = builder.emit_instruction(add_one());
        assert_eq!(result, Operand::Register(RegisterId::new(1), Type::WORD));

        builder.set_terminator(Terminator::Return(result)).unwrap();
        let finalized = builder.finalize().unwrap();

        let entry = &finalized.definition.blocks[0];
        assert_eq!(entry.statements.len(), 1);
        assert_eq!(entry.statements[0].destination, Some(RegisterId::new(1)));
    }

    #[test]
    fn add_block_does_not_switch() {
        let mut builder = builder();

        let other = builder.add_block("if.then");
        assert_eq!(builder.current_block(), BlockId::ENTRY);

        builder.set_current_block(other).unwrap();
        assert_eq!(builder.current_block(), other);
        assert_eq!(builder.label(other).value(), "if.then");
    }

    #[test]
    fn blocks_are_finalized_in_creation_order() {
        let mut builder = builder();

        let first = builder.add_block("next");
        let second = builder.add_block("next");

        builder.set_terminator(Terminator::Branch(builder.label(second))).unwrap();
        builder.set_current_block(second).unwrap();
        builder.set_terminator(Terminator::Branch(builder.label(first))).unwrap();
        builder.set_current_block(first).unwrap();
        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();

        let labels = builder
            .finalize()
            .unwrap()
            .definition
            .blocks
            .iter()
            .map(|b| b.label.value())
            .collect::<Vec<_>>();

        assert_eq!(labels, vec!["entry", "next", "next1"]);
    }

    #[test]
    fn double_termination_is_rejected() {
        let mut builder = builder();

        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();
        let error = builder
            .set_terminator(Terminator::Return(Operand::word(1)))
            .unwrap_err();

        assert_eq!(error, CodegenError::DoubleTerminator(InternedSymbol::new("entry")));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut builder = builder();
        builder.add_block("dangling");
        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();

        let error = builder.finalize().unwrap_err();
        assert_eq!(error, CodegenError::TerminatorMissing(InternedSymbol::new("dangling")));
    }

    #[test]
    fn unreachable_blocks_are_rejected_unless_marked() {
        let mut builder = builder();
        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();

        let dead = builder.add_block("dead");
        builder.set_current_block(dead).unwrap();
        builder
            .set_terminator(Terminator::Return(Operand::word(1)))
            .unwrap();

        let error = builder.finalize().unwrap_err();
        assert_eq!(error, CodegenError::UnreachableBlock(InternedSymbol::new("dead")));

        let mut builder = self::builder();
        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();
        let dead = builder.add_block("dead");
        builder.set_current_block(dead).unwrap();
        builder.set_terminator(Terminator::Unreachable).unwrap();

        assert_eq!(builder.finalize().unwrap().definition.blocks.len(), 2);
    }

    #[test]
    fn instructions_after_a_terminator_are_dropped() {
        let mut builder = builder();

        builder
            .set_terminator(Terminator::Return(Operand::word(0)))
            .unwrap();
        builder.emit_instruction(add_one());

        let function = builder.finalize().unwrap().definition;
        assert!(function.blocks[0].statements.is_empty());
    }

    #[test]
    fn unknown_block_ids_are_rejected() {
        let mut builder = builder();

        assert_eq!(
            builder.set_current_block(BlockId::new(7)),
            Err(CodegenError::InvalidBlock(7))
        );
    }

    #[test]
    fn parameters_are_bound() {
        let x = InternedSymbol::new("x");
        let builder = FunctionBuilder::new(InternedSymbol::new("id"), &[x], Rc::default());

        assert_eq!(
            builder.symbols().lookup(x),
            Some(&Binding::Value(Operand::Parameter(x, Type::WORD)))
        );
        assert!(matches!(
            Operand::word(0),
            Operand::Constant(Constant::Integer { value: 0, .. })
        ));
    }
}
