use std::sync::RwLock;

use hashbrown::HashMap;
use once_cell::sync::Lazy;

#[derive(Debug, Default)]
struct InterningTable {
    strings: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

static INTERNING_TABLE: Lazy<RwLock<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    fn get(&self, index: u32) -> Option<&'static str> {
        self.strings.get(index as usize).copied()
    }

    fn insert_if_absent(&mut self, string: &str) -> u32 {
        if let Some(index) = self.indices.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = self.strings.len() as u32;

        self.strings.push(leaked);
        self.indices.insert(leaked, index);

        index
    }
}

/// An identifier interned for the lifetime of the process. Comparing two
/// symbols is an integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        if let Some(index) = INTERNING_TABLE
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .indices
            .get(value)
        {
            return Self(*index);
        }

        let index = INTERNING_TABLE
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert_if_absent(value);

        Self(index)
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(self.0)
            .expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }
}

impl From<&str> for InternedSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::InternedSymbol;

    #[test]
    fn interning_is_stable() {
        let a = InternedSymbol::new("car");
        let b = InternedSymbol::new("car");
        let c = InternedSymbol::new("cdr");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.value(), "cdr");
    }
}
