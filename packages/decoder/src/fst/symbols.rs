//! Bidirectional label ↔ symbol map. Label 0 is always `<eps>`.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::constants::{EPSILON, EPSILON_SYMBOL};

use super::Label;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SymbolTable {
    symbols: Vec<Arc<str>>,
    index: HashMap<Arc<str>, Label>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let eps: Arc<str> = Arc::from(EPSILON_SYMBOL);
        Self {
            symbols: vec![eps.clone()],
            index: HashMap::from([(eps, EPSILON)]),
        }
    }

    /// Label of `symbol`, interning it if unseen.
    pub fn intern(&mut self, symbol: &str) -> Label {
        if let Some(&label) = self.index.get(symbol) {
            return label;
        }
        let label = self.symbols.len() as Label;
        let sym: Arc<str> = Arc::from(symbol);
        self.symbols.push(sym.clone());
        self.index.insert(sym, label);
        label
    }

    pub fn label(&self, symbol: &str) -> Option<Label> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, label: Label) -> Option<&str> {
        self.symbols.get(label as usize).map(|s| &**s)
    }

    /// Shared handle to the symbol string (cheap clone for search labels).
    pub fn shared(&self, label: Label) -> Option<Arc<str>> {
        self.symbols.get(label as usize).cloned()
    }

    /// Number of symbols including `<eps>`.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() <= 1
    }

    /// `(label, symbol)` pairs in label order, `<eps>` included.
    pub fn iter(&self) -> impl Iterator<Item = (Label, &str)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (i as Label, &**s))
    }
}

impl From<Vec<String>> for SymbolTable {
    fn from(symbols: Vec<String>) -> Self {
        let mut table = Self::new();
        for sym in symbols.iter().skip(1) {
            table.intern(sym);
        }
        table
    }
}

impl From<SymbolTable> for Vec<String> {
    fn from(table: SymbolTable) -> Self {
        table.symbols.iter().map(|s| s.to_string()).collect()
    }
}
