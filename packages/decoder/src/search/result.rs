//! Outcome of a decode.

use std::{collections::HashMap, sync::Arc};

use super::{SearchStatus, Token};
use crate::{
    error::LatticeError,
    lattice::{Lattice, PosteriorOptions},
    semiring::{Semiring, SemiringKind},
};

/// One word of the best path.
#[derive(Debug, Clone, PartialEq)]
pub struct WordHypothesis {
    pub word: Arc<str>,
    /// Frames consumed before the word started.
    pub start_frame: usize,
    /// Frames consumed when the word ended.
    pub end_frame: usize,
    /// Accumulated path score at the word end.
    pub score: f32,
    /// Acoustic weight of this word alone.
    pub acoustic: f32,
    /// Language weight of this word alone.
    pub language: f32,
}

#[derive(Debug, Clone)]
pub struct DecodeResult {
    status: SearchStatus,
    semiring: SemiringKind,
    frames: usize,
    best: Option<Arc<Token>>,
    is_final: bool,
    final_tokens: Vec<Arc<Token>>,
    alternates: HashMap<u64, Vec<Arc<Token>>>,
}

impl DecodeResult {
    pub(crate) fn new(
        status: SearchStatus,
        semiring: SemiringKind,
        frames: usize,
        final_tokens: Vec<Arc<Token>>,
        fallback: Option<Arc<Token>>,
        alternates: HashMap<u64, Vec<Arc<Token>>>,
    ) -> Self {
        let best_final = final_tokens.iter().fold(None::<&Arc<Token>>, |best, t| match best {
            Some(b) if !semiring.better(t.score(), b.score()) => Some(b),
            _ => Some(t),
        });
        let (best, is_final) = match best_final {
            Some(b) => (Some(b.clone()), true),
            None => (fallback, false),
        };
        Self {
            status,
            semiring,
            frames,
            best,
            is_final,
            final_tokens,
            alternates,
        }
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    /// Frames consumed by the search.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Best final token, or the best active token when no path reached a
    /// final state.
    pub fn best_token(&self) -> Option<&Arc<Token>> {
        self.best.as_ref()
    }

    /// Whether [`DecodeResult::best_token`] reached a final state.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn final_tokens(&self) -> &[Arc<Token>] {
        &self.final_tokens
    }

    /// Hypotheses that lost against token `id` at a boundary state.
    pub fn alternates_of(&self, id: u64) -> &[Arc<Token>] {
        self.alternates.get(&id).map_or(&[][..], Vec::as_slice)
    }

    pub fn score(&self) -> Option<f32> {
        self.best.as_ref().map(|t| t.score())
    }

    /// Words of the best path, in order.
    pub fn words(&self) -> Vec<WordHypothesis> {
        let s = self.semiring;
        let Some(best) = &self.best else {
            return Vec::new();
        };
        let mut words: Vec<WordHypothesis> = best
            .ancestry()
            .filter(|t| t.is_word())
            .filter_map(|t| {
                let word = t.state().word()?.clone();
                let prev = t.word_predecessor();
                let (start_frame, ac0, lm0) = match prev {
                    Some(p) => (p.frame(), p.acoustic(), p.language()),
                    None => (0, s.one(), s.one()),
                };
                Some(WordHypothesis {
                    word,
                    start_frame,
                    end_frame: t.frame(),
                    score: t.score(),
                    acoustic: s.divide(t.acoustic(), ac0),
                    language: s.divide(t.language(), lm0),
                })
            })
            .collect();
        words.reverse();
        words
    }

    /// Word sequence of the best path.
    pub fn best_path(&self) -> Vec<Arc<str>> {
        self.words().into_iter().map(|w| w.word).collect()
    }

    /// Best path joined with spaces.
    pub fn text(&self) -> String {
        self.best_path().join(" ")
    }

    /// Word lattice built from the kept tokens and alternates.
    pub fn lattice(&self) -> Result<Lattice, LatticeError> {
        Lattice::from_result(self)
    }

    /// [`DecodeResult::lattice`] with posteriors already computed.
    pub fn lattice_with_posteriors(
        &self,
        opts: &PosteriorOptions,
    ) -> Result<Lattice, LatticeError> {
        let mut lattice = Lattice::from_result(self)?;
        lattice.compute_posteriors(opts)?;
        Ok(lattice)
    }
}
