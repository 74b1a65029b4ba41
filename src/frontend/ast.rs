use std::rc::Rc;

use strum::{EnumIter, EnumString};

use super::intern::InternedSymbol;

/// A whole compilation unit: the top level forms of one source file in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub forms: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable(InternedSymbol),
    /// Operators lowered directly to machine instructions
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// Operators implemented by the runtime library (or lowered inline when
    /// the runtime table says so)
    Primitive {
        operator: PrimitiveOperator,
        arguments: Vec<Expression>,
    },
    If {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Box<Expression>,
    },
    Cond(Vec<CondClause>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Let {
        bindings: Vec<(InternedSymbol, Expression)>,
        body: Vec<Expression>,
    },
    Define {
        name: InternedSymbol,
        value: Box<Expression>,
    },
    Lambda(Rc<Lambda>),
    Call {
        target: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Array(Vec<Expression>),
    Set {
        name: InternedSymbol,
        value: Box<Expression>,
    },
    Begin(Vec<Expression>),
    /// Early exit from the enclosing function
    Return(Box<Expression>),
}

impl Expression {
    pub fn variable(name: &str) -> Self {
        Self::Variable(InternedSymbol::new(name))
    }

    pub fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Boolean(value))
    }

    pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        Self::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_else(condition: Expression, positive: Expression, negative: Expression) -> Self {
        Self::If {
            condition: Box::new(condition),
            positive: Box::new(positive),
            negative: Box::new(negative),
        }
    }

    pub fn lambda(parameters: &[&str], body: Vec<Expression>) -> Self {
        Self::Lambda(Rc::new(Lambda {
            parameters: parameters.iter().map(|p| InternedSymbol::new(p)).collect(),
            body,
        }))
    }

    pub fn call(target: Expression, arguments: Vec<Expression>) -> Self {
        Self::Call {
            target: Box::new(target),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Char(char),
    Boolean(bool),
    String(String),
    /// The empty list `'()`, which doubles as the unit value
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<InternedSymbol>,
    pub body: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondClause {
    pub predicate: CondPredicate,
    pub body: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondPredicate {
    Else,
    Test(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "fl+")]
    FloatAdd,
    #[strum(serialize = "fl-")]
    FloatSubtract,
    #[strum(serialize = "fl*")]
    FloatMultiply,
    #[strum(serialize = "fl/")]
    FloatDivide,
    #[strum(serialize = "fl=")]
    FloatEquals,
    #[strum(serialize = "fl<")]
    FloatLessThan,
    #[strum(serialize = "fl<=")]
    FloatLessThanOrEqualTo,
    #[strum(serialize = "fl>")]
    FloatGreaterThan,
    #[strum(serialize = "fl>=")]
    FloatGreaterThanOrEqualTo,
    #[strum(serialize = "shl")]
    ShiftLeft,
    #[strum(serialize = "shr")]
    ShiftRight,
    #[strum(serialize = "bitor")]
    BitwiseOr,
}

impl BinaryOperator {
    /// Operators that may be chained left-associatively: `(+ a b c)`
    pub fn is_foldable(&self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Subtract
                | Self::Multiply
                | Self::Divide
                | Self::FloatAdd
                | Self::FloatSubtract
                | Self::FloatMultiply
                | Self::FloatDivide
                | Self::BitwiseOr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PrimitiveOperator {
    Cons,
    Car,
    Cdr,
    #[strum(serialize = "set-car!")]
    SetCar,
    #[strum(serialize = "set-cdr!")]
    SetCdr,
    #[strum(serialize = "null?")]
    IsNull,
    #[strum(serialize = "pair?")]
    IsPair,
    #[strum(serialize = "eq?")]
    IsEq,
    Display,
    Newline,
    MakeVector,
    VectorRef,
    #[strum(serialize = "exact->inexact")]
    ExactToInexact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_from_surface_names() {
        assert_eq!("<=".parse(), Ok(BinaryOperator::LessThanOrEqualTo));
        assert_eq!("fl*".parse(), Ok(BinaryOperator::FloatMultiply));
        assert_eq!("vector-ref".parse(), Ok(PrimitiveOperator::VectorRef));
        assert_eq!("null?".parse(), Ok(PrimitiveOperator::IsNull));
        assert_eq!(PrimitiveOperator::MakeVector.to_string(), "make-vector");
        assert!("lambda".parse::<PrimitiveOperator>().is_err());
    }
}
