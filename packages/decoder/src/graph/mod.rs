//! Search-state graph.
//!
//! A virtual graph over grammar, unit, HMM, word and final positions. Nodes are
//! created lazily by [`SearchGraph::successors`] and cached by identity, so
//! repeated expansion of a state yields the very same successor slice.
//!
//! Only [`StateLabel::Hmm`] states are emitting; everything else is expanded
//! through within the current frame.

use std::{fmt, sync::Arc};

use crate::{
    error::GraphError,
    fst::StateId,
    semiring::{Semiring, SemiringKind},
};

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod fst_graph;
pub mod lexicon;

pub use fst_graph::{FstSearchGraph, GraphConfig};
pub use lexicon::{Dictionary, Hmm, MemoryDictionary, MemoryUnitInventory, Pronunciation, UnitInventory};

/* ───────────────────────────── identity ──────────────────────────────── */

/// Interned id, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchStateId(pub u32);

impl fmt::Display for SearchStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A grammar arc taken with one of its word's pronunciations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArcRef {
    pub node: StateId,
    pub arc: u32,
    pub pron: u32,
}

/// Structural identity of a search state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Grammar(StateId),
    Unit { at: ArcRef, position: u32 },
    Hmm { at: ArcRef, position: u32, index: u32 },
    /// End of a word, after its last unit.
    Word { at: ArcRef },
    /// Accepting sink reached through a grammar final weight.
    Final(StateId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLabel {
    Grammar,
    Unit(Arc<str>),
    Hmm { unit: Arc<str>, senone: u32 },
    Word(Arc<str>),
    Final,
}

/* ───────────────────────────── states ────────────────────────────────── */

/// Node of the search graph. Never mutated after creation.
#[derive(Debug, PartialEq, Eq)]
pub struct SearchState {
    pub id: SearchStateId,
    pub key: StateKey,
    pub label: StateLabel,
}

impl SearchState {
    /// Consumes an acoustic frame.
    #[inline]
    pub fn is_emitting(&self) -> bool {
        matches!(self.label, StateLabel::Hmm { .. })
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self.label, StateLabel::Final)
    }

    /// Word whose end this state marks.
    pub fn word(&self) -> Option<&Arc<str>> {
        match &self.label {
            StateLabel::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn is_word(&self) -> bool {
        self.word().is_some()
    }

    pub fn is_grammar(&self) -> bool {
        matches!(self.label, StateLabel::Grammar)
    }

    /// Output distribution consulted by the observation model.
    pub fn senone(&self) -> Option<u32> {
        match self.label {
            StateLabel::Hmm { senone, .. } => Some(senone),
            _ => None,
        }
    }
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.label, &self.key) {
            (StateLabel::Grammar, StateKey::Grammar(g)) => write!(f, "G{g}{}", self.id),
            (StateLabel::Unit(u), _) => write!(f, "U[{u}]{}", self.id),
            (StateLabel::Hmm { unit, senone }, StateKey::Hmm { index, .. }) => {
                write!(f, "H[{unit}.{index} s{senone}]{}", self.id)
            }
            (StateLabel::Word(w), _) => write!(f, "W[{w}]{}", self.id),
            (StateLabel::Final, _) => write!(f, "F{}", self.id),
            _ => write!(f, "?{}", self.id),
        }
    }
}

/// Outgoing edge of a search state with its static weights.
#[derive(Debug, Clone)]
pub struct SearchStateArc {
    pub state: Arc<SearchState>,
    /// Grammar weight raised to the language weight.
    pub language: f32,
    /// Word insertion penalty (`one()` except on word entries).
    pub insertion: f32,
    /// HMM transition weight.
    pub transition: f32,
}

impl SearchStateArc {
    /// Combined static weight.
    pub fn weight(&self, s: SemiringKind) -> f32 {
        s.times(s.times(self.language, self.insertion), self.transition)
    }

    /// Non-language part, accumulated into a token's acoustic weight.
    pub fn acoustic(&self, s: SemiringKind) -> f32 {
        s.times(self.insertion, self.transition)
    }
}

/* ───────────────────────────── contract ──────────────────────────────── */

/// Successor expansion.
///
/// Implementations are shared between concurrent decodes and must make
/// expansion idempotent.
pub trait SearchGraph: Send + Sync {
    fn semiring(&self) -> SemiringKind;

    /// Where every decode starts.
    fn initial_state(&self) -> Result<Arc<SearchState>, GraphError>;

    fn successors(&self, state: &SearchState) -> Result<Arc<[SearchStateArc]>, GraphError>;

    /// Number of states materialised so far.
    fn num_states(&self) -> usize;

    /// Weighting options the graph was built with, if it takes any.
    fn options(&self) -> Option<GraphConfig> {
        None
    }
}
