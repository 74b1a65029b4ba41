//! Typed constructors for every instruction the code generator emits. Value
//! producing constructors allocate a register and return a reference to it;
//! none of them validate operand types.

use super::{
    CodegenError,
    builder::{BlockId, FunctionBuilder},
};
use crate::middle::ir::{
    BinaryOpcode, CastOpcode, FloatPredicate, Instruction, IntPredicate, Operand, Terminator, Type,
};

impl FunctionBuilder {
    fn binary(&mut self, opcode: BinaryOpcode, lhs: Operand, rhs: Operand) -> Operand {
        self.emit_instruction(Instruction::Binary { opcode, lhs, rhs })
    }

    fn cast(&mut self, opcode: CastOpcode, operand: Operand, to: Type) -> Operand {
        self.emit_instruction(Instruction::Cast { opcode, operand, to })
    }

    /* Integer arithmetic */

    pub fn add(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::Mul, lhs, rhs)
    }

    pub fn sdiv(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::SDiv, lhs, rhs)
    }

    pub fn icmp(&mut self, predicate: IntPredicate, lhs: Operand, rhs: Operand) -> Operand {
        self.emit_instruction(Instruction::ICmp {
            predicate,
            lhs,
            rhs,
        })
    }

    /* Floating point arithmetic */

    pub fn fadd(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::FAdd, lhs, rhs)
    }

    pub fn fsub(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::FSub, lhs, rhs)
    }

    pub fn fmul(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::FMul, lhs, rhs)
    }

    pub fn fdiv(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::FDiv, lhs, rhs)
    }

    pub fn fcmp(&mut self, predicate: FloatPredicate, lhs: Operand, rhs: Operand) -> Operand {
        self.emit_instruction(Instruction::FCmp {
            predicate,
            lhs,
            rhs,
        })
    }

    /* Memory */

    pub fn alloca(&mut self, ty: Type) -> Operand {
        self.emit_instruction(Instruction::Alloca { ty })
    }

    pub fn load(&mut self, ty: Type, pointer: Operand) -> Operand {
        self.emit_instruction(Instruction::Load { ty, pointer })
    }

    pub fn store(&mut self, pointer: Operand, value: Operand) {
        self.emit_effect(Instruction::Store { value, pointer })
    }

    /// Address of element `index` of the aggregate `ty` that `base` points to
    pub fn element_pointer(&mut self, ty: Type, base: Operand, index: Operand) -> Operand {
        self.emit_instruction(Instruction::GetElementPtr { ty, base, index })
    }

    /* Conversions */

    pub fn sitofp(&mut self, operand: Operand) -> Operand {
        self.cast(CastOpcode::SIToFP, operand, Type::Double)
    }

    pub fn inttoptr(&mut self, operand: Operand) -> Operand {
        self.cast(CastOpcode::IntToPtr, operand, Type::Pointer)
    }

    pub fn ptrtoint(&mut self, operand: Operand) -> Operand {
        self.cast(CastOpcode::PtrToInt, operand, Type::WORD)
    }

    pub fn zext(&mut self, operand: Operand, to: Type) -> Operand {
        self.cast(CastOpcode::ZExt, operand, to)
    }

    pub fn bitcast(&mut self, operand: Operand, to: Type) -> Operand {
        self.cast(CastOpcode::BitCast, operand, to)
    }

    /* Bitwise */

    pub fn shl(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::Shl, lhs, rhs)
    }

    pub fn lshr(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::LShr, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinaryOpcode::Or, lhs, rhs)
    }

    /* Calls */

    /// Calls a function returning one word. `callee` is either a global
    /// function reference (direct) or a pointer value (indirect).
    pub fn call(&mut self, callee: Operand, arguments: Vec<Operand>) -> Operand {
        self.emit_instruction(Instruction::Call {
            return_type: Type::WORD,
            callee,
            arguments,
        })
    }

    /* Control flow */

    pub fn branch(&mut self, target: BlockId) -> Result<(), CodegenError> {
        let target = self.label(target);
        self.set_terminator(Terminator::Branch(target))
    }

    pub fn conditional_branch(
        &mut self,
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    ) -> Result<(), CodegenError> {
        let positive = self.label(positive);
        let negative = self.label(negative);

        self.set_terminator(Terminator::ConditionalBranch {
            condition,
            positive,
            negative,
        })
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(Operand, BlockId)>) -> Operand {
        let incoming = incoming
            .into_iter()
            .map(|(value, block)| (value, self.label(block)))
            .collect();

        self.emit_instruction(Instruction::Phi { ty, incoming })
    }

    pub fn ret(&mut self, value: Operand) -> Result<(), CodegenError> {
        self.set_terminator(Terminator::Return(value))
    }

    pub fn unreachable(&mut self) -> Result<(), CodegenError> {
        self.set_terminator(Terminator::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::index::Index;
    use crate::{
        frontend::intern::InternedSymbol,
        middle::ir::{Constant, IntegerWidth, RegisterId, Statement},
    };

    fn builder() -> FunctionBuilder {
        FunctionBuilder::new(InternedSymbol::new("prims"), &[], Rc::default())
    }

    #[test]
    fn comparisons_and_conversions_are_typed() {
        let mut builder = builder();

        let flag = builder.icmp(IntPredicate::Slt, Operand::word(1), Operand::word(2));
        assert_eq!(flag.ty(), Type::BOOL);

        let word = builder.zext(flag, Type::WORD);
        assert_eq!(word.ty(), Type::WORD);

        let double = builder.sitofp(word.clone());
        assert_eq!(double.ty(), Type::Double);
        assert_eq!(builder.fadd(double.clone(), double).ty(), Type::Double);

        assert_eq!(builder.inttoptr(word).ty(), Type::Pointer);
    }

    #[test]
    fn store_has_no_destination() {
        let mut builder = builder();

        let slot = builder.alloca(Type::WORD);
        builder.store(slot.clone(), Operand::word(9));
        let loaded = builder.load(Type::WORD, slot);

        builder.ret(loaded).unwrap();
        let function = builder.finalize().unwrap().definition;
        let statements = &function.blocks[0].statements;

        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].destination, Some(RegisterId::new(1)));
        assert_eq!(
            statements[1],
            Statement {
                destination: None,
                instruction: Instruction::Store {
                    value: Operand::word(9),
                    pointer: Operand::Register(RegisterId::new(1), Type::Pointer),
                },
            }
        );
        // the store did not consume a register
        assert_eq!(statements[2].destination, Some(RegisterId::new(2)));
    }

    #[test]
    fn phi_refers_to_block_labels() {
        let mut builder = builder();
        let merge = builder.add_block("merge");

        builder.branch(merge).unwrap();
        builder.set_current_block(merge).unwrap();
        let value = builder.phi(Type::WORD, vec![(Operand::word(10), BlockId::ENTRY)]);

        let Operand::Register(id, _) = value else {
            panic!("phi should define a register");
        };
        assert_eq!(id.number(), 1);

        builder
            .ret(Operand::Constant(Constant::Integer {
                width: IntegerWidth::I64,
                value: 0,
            }))
            .unwrap();
        let function = builder.finalize().unwrap().definition;

        assert_eq!(
            function.blocks[1].statements[0].instruction,
            Instruction::Phi {
                ty: Type::WORD,
                incoming: vec![(Operand::word(10), InternedSymbol::new("entry"))],
            }
        );
    }
}
