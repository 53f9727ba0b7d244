//! Hypothesis records.
//!
//! A token is one path ending at a search state. Ancestry is shared through
//! `Arc`, so a token pruned from its frame stays alive as long as any
//! survivor descends from it. Dropping is iterative: releasing a long chain
//! never recurses once per frame.

use std::{fmt, sync::Arc};

use crate::{
    graph::SearchState,
    semiring::{Semiring, SemiringKind},
};

#[derive(Debug, Clone)]
pub struct Token {
    id: u64,
    state: Arc<SearchState>,
    score: f32,
    acoustic: f32,
    language: f32,
    frame: usize,
    predecessor: Option<Arc<Token>>,
}

impl Token {
    /// Start of every path: all weights `one()`, frame 0, no predecessor.
    pub fn root(id: u64, state: Arc<SearchState>, semiring: SemiringKind) -> Self {
        let one = semiring.one();
        Self {
            id,
            state,
            score: one,
            acoustic: one,
            language: one,
            frame: 0,
            predecessor: None,
        }
    }

    /// `acoustic` and `language` are cumulative totals; `score` is their
    /// product unless the scorer normalised it.
    pub fn new(
        id: u64,
        state: Arc<SearchState>,
        score: f32,
        acoustic: f32,
        language: f32,
        frame: usize,
        predecessor: Option<Arc<Token>>,
    ) -> Self {
        Self {
            id,
            state,
            score,
            acoustic,
            language,
            frame,
            predecessor,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &Arc<SearchState> {
        &self.state
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn acoustic(&self) -> f32 {
        self.acoustic
    }

    pub fn language(&self) -> f32 {
        self.language
    }

    /// Frames consumed when this token was created.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn predecessor(&self) -> Option<&Arc<Token>> {
        self.predecessor.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.predecessor.is_none()
    }

    pub fn is_word(&self) -> bool {
        self.state.is_word()
    }

    pub fn is_emitting(&self) -> bool {
        self.state.is_emitting()
    }

    pub fn is_final(&self) -> bool {
        self.state.is_final()
    }

    /// Attach one frame's observation weight.
    pub fn add_acoustic(&mut self, semiring: SemiringKind, w: f32) {
        self.score = semiring.times(self.score, w);
        self.acoustic = semiring.times(self.acoustic, w);
    }

    /// Rescale the score only (acoustic and language totals are untouched).
    pub fn normalize(&mut self, semiring: SemiringKind, by: f32) {
        self.score = semiring.divide(self.score, by);
    }

    /// Closest strict ancestor that ends a word.
    pub fn word_predecessor(&self) -> Option<&Arc<Token>> {
        let mut cur = self.predecessor.as_ref();
        while let Some(t) = cur {
            if t.is_word() {
                return Some(t);
            }
            cur = t.predecessor.as_ref();
        }
        None
    }

    /// Oldest ancestor (the root token of the decode).
    pub fn root_ancestor(&self) -> &Token {
        let mut cur = self;
        while let Some(p) = cur.predecessor.as_deref() {
            cur = p;
        }
        cur
    }

    /// `self`, then each predecessor back to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = &Token> {
        std::iter::successors(Some(self), |t| t.predecessor.as_deref())
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        let mut next = self.predecessor.take();
        while let Some(arc) = next {
            match Arc::try_unwrap(arc) {
                Ok(mut tok) => next = tok.predecessor.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{}@{} {} score={} ac={} lm={}",
            self.id, self.frame, self.state, self.score, self.acoustic, self.language
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{SearchStateId, StateKey, StateLabel};

    fn state(id: u32) -> Arc<SearchState> {
        Arc::new(SearchState {
            id: SearchStateId(id),
            key: StateKey::Grammar(id as usize),
            label: StateLabel::Grammar,
        })
    }

    #[test]
    fn long_chains_drop_without_recursion() {
        let s = SemiringKind::Tropical;
        let st = state(0);
        let mut tip = Arc::new(Token::root(0, st.clone(), s));
        for i in 1..200_000u64 {
            tip = Arc::new(Token::new(i, st.clone(), 0.0, 0.0, 0.0, i as usize, Some(tip)));
        }
        assert_eq!(tip.ancestry().count(), 200_000);
        assert_eq!(tip.root_ancestor().id(), 0);
        drop(tip);
    }

    #[test]
    fn shared_ancestors_survive_partial_drop() {
        let s = SemiringKind::Tropical;
        let root = Arc::new(Token::root(0, state(0), s));
        let a = Token::new(1, state(1), 1.0, 1.0, 0.0, 1, Some(root.clone()));
        let b = Token::new(2, state(2), 2.0, 2.0, 0.0, 1, Some(root.clone()));
        drop(a);
        assert_eq!(Arc::strong_count(&root), 2);
        assert_eq!(b.predecessor().map(|p| p.id()), Some(0));
    }

    #[test]
    fn acoustic_updates_score_and_total() {
        let s = SemiringKind::Log;
        let mut t = Token::root(0, state(0), s);
        t.add_acoustic(s, 2.5);
        t.normalize(s, 1.0);
        assert_eq!(t.acoustic(), 2.5);
        assert_eq!(t.score(), 1.5);
    }
}
