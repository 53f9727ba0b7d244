//! One frame's frontier: at most one token per search state.
//!
//! Replacement rule: a candidate replaces the resident token only when it is
//! strictly better under the semiring's natural order. On an exact tie the
//! token inserted first stays. The resulting state → score mapping does not
//! depend on insertion order.

use indexmap::{IndexMap, map::Entry};

use super::token::Token;
use crate::{
    graph::SearchStateId,
    semiring::{Semiring, SemiringKind},
};

/// Outcome of [`ActiveList::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The state had no token yet.
    Inserted,
    /// The candidate beat the resident token, which was dropped.
    Replaced,
    /// The resident token was at least as good; the candidate was dropped.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ActiveList {
    semiring: SemiringKind,
    frame: usize,
    tokens: IndexMap<SearchStateId, Token>,
}

impl ActiveList {
    pub fn new(semiring: SemiringKind, frame: usize) -> Self {
        Self {
            semiring,
            frame,
            tokens: IndexMap::new(),
        }
    }

    pub fn with_capacity(semiring: SemiringKind, frame: usize, cap: usize) -> Self {
        Self {
            semiring,
            frame,
            tokens: IndexMap::with_capacity(cap),
        }
    }

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, state: SearchStateId) -> Option<&Token> {
        self.tokens.get(&state)
    }

    pub fn contains(&self, state: SearchStateId) -> bool {
        self.tokens.contains_key(&state)
    }

    pub fn insert(&mut self, token: Token) -> Insertion {
        match self.tokens.entry(token.state().id) {
            Entry::Vacant(v) => {
                v.insert(token);
                Insertion::Inserted
            }
            Entry::Occupied(mut o) => {
                if self.semiring.better(token.score(), o.get().score()) {
                    o.insert(token);
                    Insertion::Replaced
                } else {
                    Insertion::Rejected
                }
            }
        }
    }

    /// Insert every token of `other`, in its order, under the same rule.
    pub fn merge(&mut self, other: ActiveList) {
        for token in other.into_tokens() {
            self.insert(token);
        }
    }

    /// Best token; among exact ties the earliest in list order.
    pub fn best(&self) -> Option<&Token> {
        let s = self.semiring;
        self.tokens.values().fold(None, |best, t| match best {
            Some(b) if !s.better(t.score(), b.score()) => Some(b),
            _ => Some(t),
        })
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best().map(Token::score)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Token> {
        self.tokens.values_mut()
    }

    /// Data-parallel access for scorers.
    #[cfg(feature = "rayon")]
    pub fn par_iter_mut(&mut self) -> impl rayon::iter::ParallelIterator<Item = &mut Token> {
        self.tokens.par_values_mut()
    }

    /// Keep tokens for which `keep` holds; order of survivors is preserved.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Token) -> bool,
    {
        self.tokens.retain(|_, t| keep(t));
    }

    pub fn into_tokens(self) -> impl Iterator<Item = Token> {
        self.tokens.into_values()
    }
}
