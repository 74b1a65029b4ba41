//! Runtime library contract. The runtime itself lives outside this crate;
//! code generation only needs to know which symbol implements each primitive
//! operator and how many words it takes.

use strum::IntoEnumIterator;

use crate::frontend::{ast::PrimitiveOperator, intern::InternedSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveLowering {
    /// Call into the runtime library
    Runtime { symbol: &'static str, arity: usize },
    /// Expanded to instructions at the use site
    Inline { arity: usize },
}

impl PrimitiveLowering {
    pub fn arity(&self) -> usize {
        match self {
            PrimitiveLowering::Runtime { arity, .. } | PrimitiveLowering::Inline { arity } => {
                *arity
            }
        }
    }

    pub fn runtime_symbol(&self) -> Option<InternedSymbol> {
        match self {
            PrimitiveLowering::Runtime { symbol, .. } => Some(InternedSymbol::new(symbol)),
            PrimitiveLowering::Inline { .. } => None,
        }
    }
}

pub fn lowering_of(operator: PrimitiveOperator) -> PrimitiveLowering {
    use PrimitiveLowering::{Inline, Runtime};

    match operator {
        PrimitiveOperator::Cons => Runtime {
            symbol: "scm_cons",
            arity: 2,
        },
        PrimitiveOperator::Car => Runtime {
            symbol: "scm_car",
            arity: 1,
        },
        PrimitiveOperator::Cdr => Runtime {
            symbol: "scm_cdr",
            arity: 1,
        },
        PrimitiveOperator::SetCar => Runtime {
            symbol: "scm_set_car",
            arity: 2,
        },
        PrimitiveOperator::SetCdr => Runtime {
            symbol: "scm_set_cdr",
            arity: 2,
        },
        PrimitiveOperator::IsNull => Runtime {
            symbol: "scm_is_null",
            arity: 1,
        },
        PrimitiveOperator::IsPair => Runtime {
            symbol: "scm_is_pair",
            arity: 1,
        },
        PrimitiveOperator::IsEq => Runtime {
            symbol: "scm_is_eq",
            arity: 2,
        },
        PrimitiveOperator::Display => Runtime {
            symbol: "scm_display",
            arity: 1,
        },
        PrimitiveOperator::Newline => Runtime {
            symbol: "scm_newline",
            arity: 0,
        },
        PrimitiveOperator::MakeVector => Runtime {
            symbol: "scm_make_vector",
            arity: 2,
        },
        PrimitiveOperator::VectorRef => Inline { arity: 2 },
        PrimitiveOperator::ExactToInexact => Inline { arity: 1 },
    }
}

/// Whether `name` is claimed by a runtime function. User definitions may not
/// reuse these names since the declarations share one namespace.
pub fn is_runtime_symbol(name: InternedSymbol) -> bool {
    PrimitiveOperator::iter().any(|op| lowering_of(op).runtime_symbol() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_symbols_are_unique() {
        let symbols = PrimitiveOperator::iter()
            .filter_map(|op| lowering_of(op).runtime_symbol())
            .collect::<Vec<_>>();

        let mut deduped = symbols.clone();
        deduped.sort();
        deduped.dedup();

        assert_eq!(symbols.len(), deduped.len());
        assert_eq!(lowering_of(PrimitiveOperator::Newline).arity(), 0);
    }

    #[test]
    fn runtime_symbols_are_recognized() {
        assert!(is_runtime_symbol(InternedSymbol::new("scm_cons")));
        assert!(!is_runtime_symbol(InternedSymbol::new("cons")));
        assert!(!is_runtime_symbol(InternedSymbol::new("vector-ref")));
    }
}
