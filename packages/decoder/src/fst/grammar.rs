//! Compile small word grammars into acceptors.
//!
//! ```
//! use fluent_voice_decoder::{fst::GrammarExpr, semiring::SemiringKind};
//!
//! let g = GrammarExpr::sequence([
//!     GrammarExpr::word("CALL"),
//!     GrammarExpr::alternatives(["ALICE", "BOB"].map(GrammarExpr::word)),
//! ]);
//! let fst = g.compile(SemiringKind::Tropical).unwrap();
//! assert_eq!(fst.reachable_words().len(), 3);
//! ```

use tracing::debug;

use super::{ArcSort, Fst, StateId};
use crate::{constants::EPSILON, error::FstError, semiring::Semiring};

#[derive(Debug, Clone, PartialEq)]
pub enum GrammarExpr {
    Word(String),
    /// Items in order; empty sequence matches nothing (epsilon).
    Sequence(Vec<GrammarExpr>),
    /// Equally likely branches.
    Alternatives(Vec<GrammarExpr>),
    /// Zero or one occurrence, each with probability ½.
    Optional(Box<GrammarExpr>),
    /// One or more occurrences; repeating costs nothing.
    Repeat(Box<GrammarExpr>),
}

impl GrammarExpr {
    pub fn word(w: impl Into<String>) -> Self {
        Self::Word(w.into())
    }

    pub fn sequence(items: impl IntoIterator<Item = GrammarExpr>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    pub fn alternatives(items: impl IntoIterator<Item = GrammarExpr>) -> Self {
        Self::Alternatives(items.into_iter().collect())
    }

    pub fn optional(inner: GrammarExpr) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn repeat(inner: GrammarExpr) -> Self {
        Self::Repeat(Box::new(inner))
    }

    /// Build an input-sorted acceptor (word labels on both tapes).
    pub fn compile(&self, semiring: crate::semiring::SemiringKind) -> Result<Fst, FstError> {
        let mut fst = Fst::new(semiring);
        let start = fst.add_state();
        let end = fst.add_state();
        fst.set_start(start)?;
        fst.set_final(end, semiring.one())?;
        build(&mut fst, self, start, end, semiring.one())?;
        fst.arc_sort(ArcSort::Input);
        debug!(
            states = fst.num_states(),
            arcs = fst.num_arcs(),
            "compiled grammar"
        );
        Ok(fst)
    }
}

/// Connect `from` to `to` with `expr`; `weight` lands on the first arc.
fn build(
    fst: &mut Fst,
    expr: &GrammarExpr,
    from: StateId,
    to: StateId,
    weight: f32,
) -> Result<(), FstError> {
    let s = fst.semiring();
    match expr {
        GrammarExpr::Word(w) => fst.add_symbol_arc(from, w, w, weight, to),
        GrammarExpr::Sequence(items) => {
            let Some((last, init)) = items.split_last() else {
                return fst.add_arc(from, EPSILON, EPSILON, weight, to);
            };
            let mut cur = from;
            let mut w = weight;
            for item in init {
                let next = fst.add_state();
                build(fst, item, cur, next, w)?;
                cur = next;
                w = s.one();
            }
            build(fst, last, cur, to, w)
        }
        GrammarExpr::Alternatives(items) => {
            if items.is_empty() {
                return Err(FstError::structural("alternatives without branches"));
            }
            let branch = s.times(weight, s.from_probability(1.0 / items.len() as f32));
            for item in items {
                build(fst, item, from, to, branch)?;
            }
            Ok(())
        }
        GrammarExpr::Optional(inner) => {
            let half = s.times(weight, s.from_probability(0.5));
            fst.add_arc(from, EPSILON, EPSILON, half, to)?;
            build(fst, inner, from, to, half)
        }
        GrammarExpr::Repeat(inner) => {
            let head = fst.add_state();
            let tail = fst.add_state();
            fst.add_arc(from, EPSILON, EPSILON, weight, head)?;
            build(fst, inner, head, tail, s.one())?;
            fst.add_arc(tail, EPSILON, EPSILON, s.one(), head)?;
            fst.add_arc(tail, EPSILON, EPSILON, s.one(), to)
        }
    }
}
