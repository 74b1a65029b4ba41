use hashbrown::HashMap;

use crate::frontend::intern::InternedSymbol;

/// Hands out unique names derived from a base name. The first request for a
/// base gets the base itself, later ones get the base with a counter
/// appended: `if.then`, `if.then1`, `if.then2`, ...
#[derive(Debug, Clone, Default)]
pub struct NameSupply {
    next_suffix: HashMap<InternedSymbol, u32>,
}

impl NameSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique_name(&mut self, base: &str) -> InternedSymbol {
        let base = InternedSymbol::new(base);
        let suffix = self.next_suffix.entry(base).or_insert(0);

        let name = match *suffix {
            0 => base,
            n => InternedSymbol::new(&format!("{base}{n}")),
        };
        *suffix += 1;

        name
    }

    /// Next suffix that will be appended for `base`, if it was ever used
    pub fn next_suffix(&self, base: &str) -> Option<u32> {
        self.next_suffix.get(&InternedSymbol::new(base)).copied()
    }
}
