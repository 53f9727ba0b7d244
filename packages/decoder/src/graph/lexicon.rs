//! Pronunciation and HMM-topology collaborators.
//!
//! The decoder only needs lookups; file parsing lives elsewhere. The
//! in-memory implementations here are enough for grammars assembled in code.

use std::{collections::HashMap, sync::Arc};

use crate::{constants::DEFAULT_SELF_LOOP_PROBABILITY, error::GraphError};

/// Units of one pronunciation, in order.
pub type Pronunciation = Vec<Arc<str>>;

pub trait Dictionary: Send + Sync {
    /// All pronunciations of `word`; `None` when the word is unknown.
    fn pronunciations(&self, word: &str) -> Option<&[Pronunciation]>;
}

pub trait UnitInventory: Send + Sync {
    fn hmm(&self, unit: &str) -> Option<&Hmm>;
}

/* --------------------------------------------------------------------- */
/*  HMM topology                                                         */

/// `N` emitting states with an `N × (N+1)` transition matrix of linear
/// probabilities. Column `N` is the exit. Entry is always state 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Hmm {
    unit: Arc<str>,
    senones: Vec<u32>,
    transitions: Vec<Vec<f32>>,
}

impl Hmm {
    pub fn new(
        unit: impl Into<Arc<str>>,
        senones: Vec<u32>,
        transitions: Vec<Vec<f32>>,
    ) -> Result<Self, GraphError> {
        let unit = unit.into();
        let invalid = |reason: String| GraphError::InvalidHmm {
            unit: unit.to_string(),
            reason,
        };
        let n = senones.len();
        if n == 0 {
            return Err(invalid("no emitting states".into()));
        }
        if transitions.len() != n {
            return Err(invalid(format!("{} transition rows for {n} states", transitions.len())));
        }
        for (i, row) in transitions.iter().enumerate() {
            if row.len() != n + 1 {
                return Err(invalid(format!("row {i} has {} columns, expected {}", row.len(), n + 1)));
            }
            if let Some(p) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                return Err(invalid(format!("row {i} holds probability {p}")));
            }
        }
        if transitions.iter().all(|row| row[n] == 0.0) {
            return Err(invalid("no state reaches the exit".into()));
        }
        Ok(Self {
            unit,
            senones,
            transitions,
        })
    }

    /// Bakis topology: every state loops with `self_loop` and advances
    /// otherwise; the last state advances into the exit.
    pub fn left_to_right(
        unit: impl Into<Arc<str>>,
        senones: Vec<u32>,
        self_loop: f32,
    ) -> Result<Self, GraphError> {
        let n = senones.len();
        let transitions = (0..n)
            .map(|i| {
                let mut row = vec![0.0; n + 1];
                row[i] = self_loop;
                row[i + 1] = 1.0 - self_loop;
                row
            })
            .collect();
        Self::new(unit, senones, transitions)
    }

    pub fn unit(&self) -> &Arc<str> {
        &self.unit
    }

    pub fn num_states(&self) -> usize {
        self.senones.len()
    }

    pub fn senone(&self, index: usize) -> Option<u32> {
        self.senones.get(index).copied()
    }

    /// Probability of `from → to`; `to == num_states()` is the exit.
    pub fn transition(&self, from: usize, to: usize) -> f32 {
        self.transitions
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }
}

/* --------------------------------------------------------------------- */
/*  In-memory implementations                                            */

#[derive(Debug, Clone, Default)]
pub struct MemoryDictionary {
    words: HashMap<String, Vec<Pronunciation>>,
}

impl MemoryDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pronunciation of `word` (a word may have several).
    pub fn add<I, S>(&mut self, word: &str, units: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pron = units.into_iter().map(|u| Arc::from(u.as_ref())).collect();
        self.words.entry(word.to_owned()).or_default().push(pron);
    }

    pub fn with_word<I, S>(mut self, word: &str, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add(word, units);
        self
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Dictionary for MemoryDictionary {
    fn pronunciations(&self, word: &str) -> Option<&[Pronunciation]> {
        self.words
            .get(word)
            .map(Vec::as_slice)
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUnitInventory {
    units: HashMap<Arc<str>, Hmm>,
}

impl MemoryUnitInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hmm: Hmm) {
        self.units.insert(hmm.unit.clone(), hmm);
    }

    pub fn with_hmm(mut self, hmm: Hmm) -> Self {
        self.insert(hmm);
        self
    }

    /// One single-state unit per senone, looping with the default probability.
    pub fn single_state<'a>(
        units: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Result<Self, GraphError> {
        let mut inv = Self::new();
        for (unit, senone) in units {
            inv.insert(Hmm::left_to_right(
                unit,
                vec![senone],
                DEFAULT_SELF_LOOP_PROBABILITY,
            )?);
        }
        Ok(inv)
    }
}

impl UnitInventory for MemoryUnitInventory {
    fn hmm(&self, unit: &str) -> Option<&Hmm> {
        self.units.get(unit)
    }
}
