//! The low level SSA IR produced by code generation. Functions are made of
//! labelled basic blocks, each an ordered list of instructions writing to
//! virtual registers and ending in exactly one terminator. The shape follows
//! what an LLVM-style toolchain expects to assemble, verify and link.

use std::rc::Rc;

use strum::Display;

use crate::{frontend::intern::InternedSymbol, index::simple_index};

pub mod module_builder;
pub mod pretty_print;

pub use module_builder::ModuleBuilder;
pub use pretty_print::render;

/// A finished compilation unit handed to the emission stage
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub definitions: Vec<Definition>,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions().find(|f| f.name.value() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    GlobalVariable {
        name: InternedSymbol,
        ty: Type,
        zero_initialized: bool,
    },
    Function(FunctionDefinition),
    ExternalDeclaration {
        name: InternedSymbol,
        return_type: Type,
        parameter_types: Vec<Type>,
    },
    TypeAlias {
        name: InternedSymbol,
        ty: Type,
    },
    /// Private, NUL terminated bytes backing a string literal
    StringConstant {
        name: InternedSymbol,
        bytes: Vec<u8>,
    },
}

impl Definition {
    pub fn name(&self) -> InternedSymbol {
        match self {
            Definition::GlobalVariable { name, .. }
            | Definition::ExternalDeclaration { name, .. }
            | Definition::TypeAlias { name, .. }
            | Definition::StringConstant { name, .. } => *name,
            Definition::Function(function) => function.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: InternedSymbol,
    pub return_type: Type,
    pub parameters: Vec<Parameter>,
    /// Empty for placeholders, which are emitted as declarations
    pub blocks: Vec<BasicBlock>,
}

impl FunctionDefinition {
    pub fn is_placeholder(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label.value() == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: InternedSymbol,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

/// One instruction and the register it defines (if it produces a value)
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub destination: Option<RegisterId>,
    pub instruction: Instruction,
}

simple_index! {
    /// Identifies a virtual register, assigned exactly once per function
    pub struct RegisterId;
}

impl RegisterId {
    pub fn number(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Integer(IntegerWidth),
    Double,
    /// An opaque pointer
    Pointer,
    Array(Rc<Type>, u64),
    /// Refers to a [`Definition::TypeAlias`]
    Named(InternedSymbol),
    Function {
        return_type: Rc<Type>,
        parameters: Vec<Type>,
    },
    Void,
}

impl Type {
    /// Every runtime value fits in one machine word
    pub const WORD: Type = Type::Integer(IntegerWidth::I64);
    pub const BOOL: Type = Type::Integer(IntegerWidth::I1);

    /// The signature shared by every compiled function: words in, word out
    pub fn word_function(arity: usize) -> Type {
        Type::Function {
            return_type: Rc::new(Type::WORD),
            parameters: vec![Type::WORD; arity],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerWidth {
    I1,
    I8,
    I64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer { width: IntegerWidth, value: i64 },
    Double(f64),
}

impl Constant {
    pub fn word(value: i64) -> Self {
        Self::Integer {
            width: IntegerWidth::I64,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The result of an instruction
    Register(RegisterId, Type),
    Constant(Constant),
    /// Address of a global variable or function
    Global(InternedSymbol, Type),
    Parameter(InternedSymbol, Type),
}

impl Operand {
    pub fn word(value: i64) -> Self {
        Self::Constant(Constant::word(value))
    }

    pub fn ty(&self) -> Type {
        match self {
            Operand::Register(_, ty) | Operand::Parameter(_, ty) => ty.clone(),
            Operand::Constant(Constant::Integer { width, .. }) => Type::Integer(*width),
            Operand::Constant(Constant::Double(_)) => Type::Double,
            Operand::Global(..) => Type::Pointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FloatPredicate {
    Oeq,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOpcode {
    Add,
    Sub,
    Mul,
    SDiv,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Shl,
    LShr,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CastOpcode {
    SIToFP,
    IntToPtr,
    PtrToInt,
    ZExt,
    BitCast,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Binary {
        opcode: BinaryOpcode,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        predicate: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        predicate: FloatPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Alloca {
        ty: Type,
    },
    Load {
        ty: Type,
        pointer: Operand,
    },
    Store {
        value: Operand,
        pointer: Operand,
    },
    /// `&base[0][index]` over an aggregate of type `ty`
    GetElementPtr {
        ty: Type,
        base: Operand,
        index: Operand,
    },
    Cast {
        opcode: CastOpcode,
        operand: Operand,
        to: Type,
    },
    Call {
        return_type: Type,
        callee: Operand,
        arguments: Vec<Operand>,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Operand, InternedSymbol)>,
    },
}

impl Instruction {
    /// Type of the value this instruction defines
    pub fn result_type(&self) -> Type {
        match self {
            Instruction::Binary { opcode, lhs, .. } => match opcode {
                BinaryOpcode::FAdd
                | BinaryOpcode::FSub
                | BinaryOpcode::FMul
                | BinaryOpcode::FDiv => Type::Double,
                _ => lhs.ty(),
            },
            Instruction::ICmp { .. } | Instruction::FCmp { .. } => Type::BOOL,
            Instruction::Alloca { .. } | Instruction::GetElementPtr { .. } => Type::Pointer,
            Instruction::Load { ty, .. } | Instruction::Phi { ty, .. } => ty.clone(),
            Instruction::Cast { to, .. } => to.clone(),
            Instruction::Call { return_type, .. } => return_type.clone(),
            Instruction::Store { .. } => Type::Void,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Branch(InternedSymbol),
    ConditionalBranch {
        condition: Operand,
        positive: InternedSymbol,
        negative: InternedSymbol,
    },
    Return(Operand),
    /// Marks a block that control can never reach
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<InternedSymbol> {
        match self {
            Terminator::Branch(target) => vec![*target],
            Terminator::ConditionalBranch {
                positive, negative, ..
            } => vec![*positive, *negative],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_produce_booleans() {
        let instruction = Instruction::ICmp {
            predicate: IntPredicate::Slt,
            lhs: Operand::word(1),
            rhs: Operand::word(2),
        };

        assert_eq!(instruction.result_type(), Type::BOOL);
        assert_eq!(IntPredicate::Slt.to_string(), "slt");
        assert_eq!(CastOpcode::PtrToInt.to_string(), "ptrtoint");
    }

    #[test]
    fn terminator_successors() {
        let then = InternedSymbol::new("if.then");
        let otherwise = InternedSymbol::new("if.else");

        let branch = Terminator::ConditionalBranch {
            condition: Operand::Constant(Constant::Integer {
                width: IntegerWidth::I1,
                value: 1,
            }),
            positive: then,
            negative: otherwise,
        };

        assert_eq!(branch.successors(), vec![then, otherwise]);
        assert!(Terminator::Unreachable.successors().is_empty());
    }
}
