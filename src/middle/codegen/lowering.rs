//! Lowers AST expressions into instructions of the function being built.
//! Every lowered expression yields one word; conditionals become branches
//! joined by a phi in a merge block and lambdas are lifted into top level
//! functions compiled later from the worklist.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{
    CodegenError,
    builder::{BlockId, FinalizedFunction, FunctionBuilder, PendingLambda, word_parameters},
    names::NameSupply,
    scope::{Binding, GlobalEnvironment, GlobalKind},
};
use crate::{
    frontend::{
        ast::{
            BinaryOperator, CondClause, CondPredicate, Expression, Lambda, Literal,
            PrimitiveOperator,
        },
        intern::InternedSymbol,
    },
    middle::{
        ir::{
            Constant, FloatPredicate, IntPredicate, IntegerWidth, Module, ModuleBuilder, Operand,
            Type,
        },
        runtime::{self, PrimitiveLowering},
    },
};

/// State shared by every function of one compilation unit
#[derive(Debug)]
pub struct CompilationUnit {
    module: ModuleBuilder,
    entry_name: InternedSymbol,
    lambda_names: NameSupply,
    string_names: NameSupply,
    strings: HashMap<String, InternedSymbol>,
    /// Lambdas lifted by the function being compiled
    lifted: Vec<InternedSymbol>,
}

impl CompilationUnit {
    pub fn new(module_name: &str, entry_name: InternedSymbol) -> Self {
        Self {
            module: ModuleBuilder::new(module_name),
            entry_name,
            lambda_names: NameSupply::new(),
            string_names: NameSupply::new(),
            strings: HashMap::new(),
            lifted: Vec::new(),
        }
    }

    pub fn entry_name(&self) -> InternedSymbol {
        self.entry_name
    }

    pub fn module_mut(&mut self) -> &mut ModuleBuilder {
        &mut self.module
    }

    pub fn finish(self) -> Module {
        self.module.finish()
    }

    /// Removes the placeholders of lambdas lifted by a function that failed
    /// to compile. Their bodies were never queued.
    pub fn discard_lifted(&mut self) -> Vec<InternedSymbol> {
        let lifted = std::mem::take(&mut self.lifted);

        for name in &lifted {
            if let Err(error) = self.module.remove_function(*name) {
                debug!(%error, "lifted lambda has no placeholder");
            }
        }

        lifted
    }

    /// A module unique name for a lifted lambda
    fn fresh_lambda_name(&mut self, globals: &GlobalEnvironment) -> InternedSymbol {
        loop {
            let name = self.lambda_names.unique_name("lambda");

            if name != self.entry_name && !globals.contains_key(&name) {
                return name;
            }
        }
    }

    /// The constant holding `value`, shared between identical literals
    fn string_constant(&mut self, value: &str) -> (InternedSymbol, Type) {
        let ty = Type::Array(
            Rc::new(Type::Integer(IntegerWidth::I8)),
            value.len() as u64 + 1,
        );

        if let Some(name) = self.strings.get(value) {
            return (*name, ty);
        }

        let name = self.string_names.unique_name(".str");
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);

        self.module.define_string_constant(name, bytes);
        self.strings.insert(value.to_string(), name);

        (name, ty)
    }

    /// `%array.N = type [N x i64]`
    fn array_type(&mut self, length: usize) -> Type {
        let name = InternedSymbol::new(&format!("array.{length}"));

        self.module
            .define_type_alias(name, Type::Array(Rc::new(Type::WORD), length as u64));

        Type::Named(name)
    }

    fn runtime_function(&mut self, symbol: &'static str, arity: usize) -> Operand {
        let name = InternedSymbol::new(symbol);

        self.module
            .declare_external(name, Type::WORD, vec![Type::WORD; arity]);

        Operand::Global(name, Type::word_function(arity))
    }
}

/// Names assigned with `set!` in `expression`. Lambda and `let` bodies are
/// compiled as separate functions and are not searched.
fn collect_assigned(expression: &Expression, assigned: &mut HashSet<InternedSymbol>) {
    match expression {
        Expression::Literal(_) | Expression::Variable(_) | Expression::Lambda(_) => {}
        Expression::Set { name, value } => {
            assigned.insert(*name);
            collect_assigned(value, assigned);
        }
        Expression::Binary { lhs, rhs, .. } => {
            collect_assigned(lhs, assigned);
            collect_assigned(rhs, assigned);
        }
        Expression::If {
            condition,
            positive,
            negative,
        } => {
            collect_assigned(condition, assigned);
            collect_assigned(positive, assigned);
            collect_assigned(negative, assigned);
        }
        Expression::Cond(clauses) => {
            for clause in clauses {
                if let CondPredicate::Test(predicate) = &clause.predicate {
                    collect_assigned(predicate, assigned);
                }
                collect_assigned(&clause.body, assigned);
            }
        }
        Expression::Let { bindings, .. } => {
            for (_, value) in bindings {
                collect_assigned(value, assigned);
            }
        }
        Expression::Define { value, .. } | Expression::Not(value) | Expression::Return(value) => {
            collect_assigned(value, assigned)
        }
        Expression::Call { target, arguments } => {
            collect_assigned(target, assigned);
            for argument in arguments {
                collect_assigned(argument, assigned);
            }
        }
        Expression::Primitive {
            arguments: operands,
            ..
        }
        | Expression::And(operands)
        | Expression::Or(operands)
        | Expression::Array(operands)
        | Expression::Begin(operands) => {
            for operand in operands {
                collect_assigned(operand, assigned);
            }
        }
    }
}

fn int_predicate(operator: BinaryOperator) -> Option<IntPredicate> {
    match operator {
        BinaryOperator::Equals => Some(IntPredicate::Eq),
        BinaryOperator::LessThan => Some(IntPredicate::Slt),
        BinaryOperator::LessThanOrEqualTo => Some(IntPredicate::Sle),
        BinaryOperator::GreaterThan => Some(IntPredicate::Sgt),
        BinaryOperator::GreaterThanOrEqualTo => Some(IntPredicate::Sge),
        _ => None,
    }
}

fn float_predicate(operator: BinaryOperator) -> Option<FloatPredicate> {
    match operator {
        BinaryOperator::FloatEquals => Some(FloatPredicate::Oeq),
        BinaryOperator::FloatLessThan => Some(FloatPredicate::Olt),
        BinaryOperator::FloatLessThanOrEqualTo => Some(FloatPredicate::Ole),
        BinaryOperator::FloatGreaterThan => Some(FloatPredicate::Ogt),
        BinaryOperator::FloatGreaterThanOrEqualTo => Some(FloatPredicate::Oge),
        _ => None,
    }
}

struct BodyLoweringContext<'u> {
    unit: &'u mut CompilationUnit,
    builder: FunctionBuilder,
    /// Locals targeted by `set!`, which live in stack slots
    assigned: HashSet<InternedSymbol>,
}

impl<'u> BodyLoweringContext<'u> {
    fn new(unit: &'u mut CompilationUnit, builder: FunctionBuilder, body: &[Expression]) -> Self {
        unit.lifted.clear();

        let mut assigned = HashSet::new();
        for expression in body {
            collect_assigned(expression, &mut assigned);
        }

        Self {
            unit,
            builder,
            assigned,
        }
    }

    fn finish(mut self, value: Operand) -> Result<FinalizedFunction, CodegenError> {
        if !self.builder.is_terminated() {
            self.builder.ret(value)?;
        }

        self.builder.finalize()
    }

    /// Converts any value the lowering produces into its word encoding
    fn to_word(&mut self, operand: Operand) -> Operand {
        match operand.ty() {
            Type::Integer(IntegerWidth::I64) => operand,
            Type::Integer(_) => self.builder.zext(operand, Type::WORD),
            Type::Double => self.builder.bitcast(operand, Type::WORD),
            Type::Pointer => self.builder.ptrtoint(operand),
            _ => operand,
        }
    }

    /// Moves parameters that are assigned somewhere in the body into slots
    fn spill_assigned_parameters(&mut self, parameters: &[InternedSymbol]) {
        for parameter in parameters {
            if !self.assigned.contains(parameter) {
                continue;
            }

            let slot = self.builder.alloca(Type::WORD);
            self.builder
                .store(slot.clone(), Operand::Parameter(*parameter, Type::WORD));
            self.builder
                .symbols_mut()
                .rebind(*parameter, Binding::Slot(slot));
        }
    }

    fn bind_local(&mut self, name: InternedSymbol, value: Operand) {
        let binding = if self.assigned.contains(&name) {
            let value = self.to_word(value);
            let slot = self.builder.alloca(Type::WORD);
            self.builder.store(slot.clone(), value);
            Binding::Slot(slot)
        } else {
            Binding::Value(value)
        };

        self.builder.symbols_mut().bind(name, binding);
    }

    fn lower_sequence(&mut self, expressions: &[Expression]) -> Result<Operand, CodegenError> {
        let mut value = Operand::word(0);

        for expression in expressions {
            value = self.lower_expression(expression)?;

            if self.builder.is_terminated() {
                break;
            }
        }

        Ok(value)
    }

    fn lower_expression(&mut self, expression: &Expression) -> Result<Operand, CodegenError> {
        match expression {
            Expression::Literal(literal) => Ok(self.lower_literal(literal)),
            Expression::Variable(name) => self.lower_variable(*name),
            Expression::Binary { operator, lhs, rhs } => self.lower_binary(*operator, lhs, rhs),
            Expression::Primitive {
                operator,
                arguments,
            } => self.lower_primitive(*operator, arguments),
            Expression::If {
                condition,
                positive,
                negative,
            } => {
                let condition = self.lower_expression(condition)?;
                self.lower_branches(
                    condition,
                    "if",
                    |ctx| ctx.lower_expression(positive),
                    |ctx| ctx.lower_expression(negative),
                )
            }
            Expression::Cond(clauses) => self.lower_cond(clauses),
            Expression::And(operands) => self.lower_and(operands),
            Expression::Or(operands) => self.lower_or(operands),
            Expression::Not(operand) => {
                let value = self.lower_expression(operand)?;
                self.lower_branches(
                    value,
                    "not",
                    |_| Ok(Operand::word(0)),
                    |_| Ok(Operand::word(1)),
                )
            }
            Expression::Let { bindings, body } => self.lower_let(bindings, body),
            Expression::Define { name, value } => {
                let value = match &**value {
                    Expression::Lambda(lambda) => self.lift_lambda(lambda.clone()),
                    value => self.lower_expression(value)?,
                };
                self.bind_local(*name, value);

                Ok(Operand::word(0))
            }
            Expression::Lambda(lambda) => {
                let function = self.lift_lambda(lambda.clone());
                Ok(self.to_word(function))
            }
            Expression::Call { target, arguments } => self.lower_call(target, arguments),
            Expression::Array(elements) => self.lower_array(elements),
            Expression::Set { name, value } => {
                let value = self.lower_expression(value)?;
                self.lower_assignment(*name, value)?;

                Ok(Operand::word(0))
            }
            Expression::Begin(expressions) => self.lower_sequence(expressions),
            Expression::Return(value) => {
                let value = self.lower_expression(value)?;
                if !self.builder.is_terminated() {
                    self.builder.ret(value)?;
                }

                Ok(Operand::word(0))
            }
        }
    }

    fn lower_literal(&mut self, literal: &Literal) -> Operand {
        match literal {
            Literal::Integer(value) => Operand::word(*value),
            Literal::Char(value) => Operand::word(*value as i64),
            Literal::Boolean(value) => Operand::word(*value as i64),
            Literal::Empty => Operand::word(0),
            Literal::Float(value) => self
                .builder
                .bitcast(Operand::Constant(Constant::Double(*value)), Type::WORD),
            Literal::String(value) => {
                let (name, ty) = self.unit.string_constant(value);
                let address = self.builder.element_pointer(
                    ty.clone(),
                    Operand::Global(name, ty),
                    Operand::word(0),
                );

                self.builder.ptrtoint(address)
            }
        }
    }

    fn lower_variable(&mut self, name: InternedSymbol) -> Result<Operand, CodegenError> {
        if let Some(binding) = self.builder.symbols().lookup(name).cloned() {
            return Ok(match binding {
                Binding::Value(value) => self.to_word(value),
                Binding::Slot(slot) => self.builder.load(Type::WORD, slot),
            });
        }

        match self.builder.globals().get(&name).copied() {
            Some(GlobalKind::Variable) => Ok(self
                .builder
                .load(Type::WORD, Operand::Global(name, Type::WORD))),
            Some(GlobalKind::Function { arity }) => {
                Ok(self.to_word(Operand::Global(name, Type::word_function(arity))))
            }
            None => Err(CodegenError::UnresolvedSymbol(name)),
        }
    }

    fn lower_assignment(
        &mut self,
        name: InternedSymbol,
        value: Operand,
    ) -> Result<(), CodegenError> {
        match self.builder.symbols().lookup(name).cloned() {
            Some(Binding::Slot(slot)) => {
                self.builder.store(slot, value);
                return Ok(());
            }
            Some(Binding::Value(_)) => {
                self.builder
                    .symbols_mut()
                    .rebind(name, Binding::Value(value));
                return Ok(());
            }
            None => {}
        }

        match self.builder.globals().get(&name).copied() {
            Some(GlobalKind::Variable) => {
                self.builder
                    .store(Operand::Global(name, Type::WORD), value);
                Ok(())
            }
            Some(GlobalKind::Function { .. }) => Err(CodegenError::NotAssignable(name)),
            None => Err(CodegenError::UnresolvedSymbol(name)),
        }
    }

    fn lower_binary(
        &mut self,
        operator: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Operand, CodegenError> {
        let lhs = self.lower_expression(lhs)?;
        let rhs = self.lower_expression(rhs)?;

        if let Some(predicate) = int_predicate(operator) {
            let flag = self.builder.icmp(predicate, lhs, rhs);
            return Ok(self.builder.zext(flag, Type::WORD));
        }

        let value = match operator {
            BinaryOperator::Add => self.builder.add(lhs, rhs),
            BinaryOperator::Subtract => self.builder.sub(lhs, rhs),
            BinaryOperator::Multiply => self.builder.mul(lhs, rhs),
            BinaryOperator::Divide => self.builder.sdiv(lhs, rhs),
            BinaryOperator::ShiftLeft => self.builder.shl(lhs, rhs),
            BinaryOperator::ShiftRight => self.builder.lshr(lhs, rhs),
            BinaryOperator::BitwiseOr => self.builder.or(lhs, rhs),
            float => {
                let lhs = self.builder.bitcast(lhs, Type::Double);
                let rhs = self.builder.bitcast(rhs, Type::Double);

                let result = match (float, float_predicate(float)) {
                    (_, Some(predicate)) => self.builder.fcmp(predicate, lhs, rhs),
                    (BinaryOperator::FloatAdd, _) => self.builder.fadd(lhs, rhs),
                    (BinaryOperator::FloatSubtract, _) => self.builder.fsub(lhs, rhs),
                    (BinaryOperator::FloatMultiply, _) => self.builder.fmul(lhs, rhs),
                    (_, _) => self.builder.fdiv(lhs, rhs),
                };

                // doubles are bit cast back, flags widened
                self.to_word(result)
            }
        };

        Ok(value)
    }

    fn lower_primitive(
        &mut self,
        operator: PrimitiveOperator,
        arguments: &[Expression],
    ) -> Result<Operand, CodegenError> {
        let lowering = runtime::lowering_of(operator);

        if arguments.len() != lowering.arity() {
            return Err(CodegenError::WrongArgumentCount {
                callee: operator.to_string(),
                expected: lowering.arity(),
                actual: arguments.len(),
            });
        }

        let values = arguments
            .iter()
            .map(|argument| self.lower_expression(argument))
            .collect::<Result<Vec<_>, _>>()?;

        if let PrimitiveLowering::Runtime { symbol, arity } = lowering {
            let callee = self.unit.runtime_function(symbol, arity);
            return Ok(self.builder.call(callee, values));
        }

        match (operator, values.as_slice()) {
            (PrimitiveOperator::ExactToInexact, [value]) => {
                let double = self.builder.sitofp(value.clone());
                Ok(self.builder.bitcast(double, Type::WORD))
            }
            (PrimitiveOperator::VectorRef, [vector, index]) => {
                let base = self.builder.inttoptr(vector.clone());
                let element = self.builder.element_pointer(
                    Type::Array(Rc::new(Type::WORD), 0),
                    base,
                    index.clone(),
                );

                Ok(self.builder.load(Type::WORD, element))
            }
            (operator, _) => unreachable!("`{operator}` has no inline lowering"),
        }
    }

    /// Branches on `condition` (a word, true when non-zero) to two arms and
    /// joins their values in a merge block, which becomes the current block.
    /// Arms that terminate themselves contribute no incoming value.
    fn lower_branches(
        &mut self,
        condition: Operand,
        prefix: &str,
        positive: impl FnOnce(&mut Self) -> Result<Operand, CodegenError>,
        negative: impl FnOnce(&mut Self) -> Result<Operand, CodegenError>,
    ) -> Result<Operand, CodegenError> {
        if self.builder.is_terminated() {
            return Ok(Operand::word(0));
        }

        let flag = self
            .builder
            .icmp(IntPredicate::Ne, condition, Operand::word(0));

        let then_block = self.builder.add_block(&format!("{prefix}.then"));
        let else_block = self.builder.add_block(&format!("{prefix}.else"));
        let merge_block = self.builder.add_block(&format!("{prefix}.merge"));

        self.builder
            .conditional_branch(flag, then_block, else_block)?;

        let mut incoming = Vec::with_capacity(2);
        self.lower_arm(then_block, merge_block, positive, &mut incoming)?;
        self.lower_arm(else_block, merge_block, negative, &mut incoming)?;

        self.builder.set_current_block(merge_block)?;

        if incoming.is_empty() {
            self.builder.unreachable()?;
            return Ok(Operand::word(0));
        }

        Ok(self.builder.phi(Type::WORD, incoming))
    }

    fn lower_arm(
        &mut self,
        block: BlockId,
        merge: BlockId,
        arm: impl FnOnce(&mut Self) -> Result<Operand, CodegenError>,
        incoming: &mut Vec<(Operand, BlockId)>,
    ) -> Result<(), CodegenError> {
        self.builder.set_current_block(block)?;

        // definitions made in an arm do not outlive it
        self.builder.symbols_mut().push_scope();
        let value = arm(self)?;
        self.builder.symbols_mut().pop_scope();

        if !self.builder.is_terminated() {
            // the arm may have ended in a nested merge block
            incoming.push((value, self.builder.current_block()));
            self.builder.branch(merge)?;
        }

        Ok(())
    }

    fn lower_cond(&mut self, clauses: &[CondClause]) -> Result<Operand, CodegenError> {
        let Some((clause, rest)) = clauses.split_first() else {
            return Ok(Operand::word(0));
        };

        let condition = match &clause.predicate {
            CondPredicate::Else => Operand::word(1),
            CondPredicate::Test(predicate) => self.lower_expression(predicate)?,
        };

        self.lower_branches(
            condition,
            "cond",
            |ctx| ctx.lower_expression(&clause.body),
            |ctx| ctx.lower_cond(rest),
        )
    }

    fn lower_and(&mut self, operands: &[Expression]) -> Result<Operand, CodegenError> {
        match operands {
            [] => Ok(Operand::word(1)),
            [operand] => self.lower_expression(operand),
            [first, rest @ ..] => {
                let condition = self.lower_expression(first)?;
                self.lower_branches(
                    condition,
                    "and",
                    |ctx| ctx.lower_and(rest),
                    |_| Ok(Operand::word(0)),
                )
            }
        }
    }

    fn lower_or(&mut self, operands: &[Expression]) -> Result<Operand, CodegenError> {
        match operands {
            [] => Ok(Operand::word(0)),
            [operand] => self.lower_expression(operand),
            [first, rest @ ..] => {
                let value = self.lower_expression(first)?;
                self.lower_branches(
                    value.clone(),
                    "or",
                    move |_| Ok(value),
                    |ctx| ctx.lower_or(rest),
                )
            }
        }
    }

    fn lower_let(
        &mut self,
        bindings: &[(InternedSymbol, Expression)],
        body: &[Expression],
    ) -> Result<Operand, CodegenError> {
        let lambda = Rc::new(Lambda {
            parameters: bindings.iter().map(|(name, _)| *name).collect(),
            body: body.to_vec(),
        });

        let callee = self.lift_lambda(lambda);
        let arguments = bindings
            .iter()
            .map(|(_, value)| self.lower_expression(value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.builder.call(callee, arguments))
    }

    /// Queues `lambda` for compilation as its own function and returns a
    /// reference to it. A placeholder stands in until the body is compiled.
    fn lift_lambda(&mut self, lambda: Rc<Lambda>) -> Operand {
        let name = self.unit.fresh_lambda_name(self.builder.globals());
        let arity = lambda.parameters.len();

        self.unit.module.define_function(
            name,
            Type::WORD,
            word_parameters(&lambda.parameters),
            Vec::new(),
        );
        self.unit.lifted.push(name);

        debug!(enclosing = %self.builder.name(), lambda = %name, "lambda enqueued");
        self.builder.enqueue_lambda(PendingLambda {
            name,
            lambda,
            globals: self.builder.globals().clone(),
        });

        Operand::Global(name, Type::word_function(arity))
    }

    /// Lowers the target of a call. Known functions are returned as global
    /// references so they can be called directly.
    fn lower_callee(&mut self, target: &Expression) -> Result<Operand, CodegenError> {
        match target {
            Expression::Lambda(lambda) => Ok(self.lift_lambda(lambda.clone())),
            Expression::Variable(name) => {
                match self.builder.symbols().lookup(*name).cloned() {
                    Some(Binding::Value(function @ Operand::Global(_, Type::Function { .. }))) => {
                        return Ok(function);
                    }
                    Some(_) => return self.lower_variable(*name),
                    None => {}
                }

                match self.builder.globals().get(name).copied() {
                    Some(GlobalKind::Function { arity }) => {
                        Ok(Operand::Global(*name, Type::word_function(arity)))
                    }
                    _ => self.lower_variable(*name),
                }
            }
            target => self.lower_expression(target),
        }
    }

    fn lower_call(
        &mut self,
        target: &Expression,
        arguments: &[Expression],
    ) -> Result<Operand, CodegenError> {
        let callee = self.lower_callee(target)?;
        let arguments = arguments
            .iter()
            .map(|argument| self.lower_expression(argument))
            .collect::<Result<Vec<_>, _>>()?;

        let signature = match &callee {
            Operand::Global(name, Type::Function { parameters, .. }) => {
                Some((*name, parameters.len()))
            }
            _ => None,
        };

        let callee = match signature {
            Some((name, expected)) if expected != arguments.len() => {
                return Err(CodegenError::WrongArgumentCount {
                    callee: name.to_string(),
                    expected,
                    actual: arguments.len(),
                });
            }
            Some(_) => callee,
            None => self.builder.inttoptr(callee),
        };

        Ok(self.builder.call(callee, arguments))
    }

    fn lower_array(&mut self, elements: &[Expression]) -> Result<Operand, CodegenError> {
        let values = elements
            .iter()
            .map(|element| self.lower_expression(element))
            .collect::<Result<Vec<_>, _>>()?;

        let ty = self.unit.array_type(values.len());
        let array = self.builder.alloca(ty.clone());

        for (index, value) in values.into_iter().enumerate() {
            let element = self.builder.element_pointer(
                ty.clone(),
                array.clone(),
                Operand::word(index as i64),
            );
            self.builder.store(element, value);
        }

        Ok(self.builder.ptrtoint(array))
    }

    /// A top level `define` that is not the first definition of a function:
    /// assigns the global registered for `name`
    fn lower_global_definition(
        &mut self,
        name: InternedSymbol,
        value: &Expression,
    ) -> Result<Operand, CodegenError> {
        let value = self.lower_expression(value)?;

        match self.builder.globals().get(&name).copied() {
            Some(GlobalKind::Variable) => {
                self.builder
                    .store(Operand::Global(name, Type::WORD), value);
                Ok(Operand::word(0))
            }
            Some(GlobalKind::Function { .. }) => Err(CodegenError::NotAssignable(name)),
            None => Err(CodegenError::UnresolvedSymbol(name)),
        }
    }
}

/// Compiles the entry function from the top level forms. Forms listed in
/// `function_forms` define functions compiled separately and are skipped.
pub fn lower_entry(
    unit: &mut CompilationUnit,
    forms: &[Expression],
    function_forms: &[usize],
    globals: Rc<GlobalEnvironment>,
) -> Result<FinalizedFunction, CodegenError> {
    let builder = FunctionBuilder::new(unit.entry_name, &[], globals);
    let mut ctx = BodyLoweringContext::new(unit, builder, forms);

    let mut value = Operand::word(0);
    for (index, form) in forms.iter().enumerate() {
        if function_forms.contains(&index) {
            continue;
        }

        value = match form {
            Expression::Define {
                name,
                value: definition,
            } => ctx.lower_global_definition(*name, definition)?,
            form => ctx.lower_expression(form)?,
        };

        if ctx.builder.is_terminated() {
            break;
        }
    }

    ctx.finish(value)
}

/// Compiles a lifted lambda as a function of its parameters
pub fn lower_lambda(
    unit: &mut CompilationUnit,
    pending: &PendingLambda,
) -> Result<FinalizedFunction, CodegenError> {
    let lambda = &pending.lambda;

    let builder = FunctionBuilder::new(pending.name, &lambda.parameters, pending.globals.clone());
    let mut ctx = BodyLoweringContext::new(unit, builder, &lambda.body);

    ctx.spill_assigned_parameters(&lambda.parameters);

    ctx.builder.symbols_mut().push_scope();
    let value = ctx.lower_sequence(&lambda.body)?;
    ctx.builder.symbols_mut().pop_scope();

    ctx.finish(value)
}
