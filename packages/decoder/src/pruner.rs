//! Active-list pruning.
//!
//! Pruners only decide membership: tokens are never mutated, and a pruned
//! token stays alive as long as a survivor descends from it.

use tracing::trace;

use crate::{
    error::PruneError,
    search::{ActiveList, Token},
    semiring::{Semiring, SemiringKind},
};

pub trait Pruner: Send {
    fn start(&mut self) {}

    fn prune(&mut self, list: ActiveList) -> Result<ActiveList, PruneError>;

    fn stop(&mut self) {}
}

/// Pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPruner;

impl Pruner for NullPruner {
    fn prune(&mut self, list: ActiveList) -> Result<ActiveList, PruneError> {
        Ok(list)
    }
}

/// Relative beam plus an optional absolute cap.
///
/// A token survives when its score is not worse than `best ⊗ beam`. A beam of
/// `one()` therefore keeps exactly the best token; a `zero()` beam (an
/// infinitely wide one) keeps everything.
#[derive(Debug, Clone, Copy)]
pub struct BeamPruner {
    beam: f32,
    max_active: Option<usize>,
}

impl BeamPruner {
    /// `beam` is a semiring weight.
    pub fn new(semiring: SemiringKind, beam: f32) -> Result<Self, PruneError> {
        if !semiring.is_member(beam) {
            return Err(PruneError::InvalidBeam(beam));
        }
        Ok(Self {
            beam,
            max_active: None,
        })
    }

    /// Beam given as a cost (`-ln` of the relative probability floor).
    /// `f32::INFINITY` disables it, `0.0` keeps only the best token.
    pub fn from_cost(semiring: SemiringKind, cost: f32) -> Result<Self, PruneError> {
        if cost.is_nan() || cost < 0.0 {
            return Err(PruneError::InvalidBeam(cost));
        }
        Self::new(semiring, semiring.from_ln_probability(-cost))
    }

    /// Keep at most `n` tokens (ties by list order).
    pub fn with_max_active(mut self, n: Option<usize>) -> Self {
        self.max_active = n;
        self
    }

    pub fn beam(&self) -> f32 {
        self.beam
    }
}

impl Pruner for BeamPruner {
    fn prune(&mut self, mut list: ActiveList) -> Result<ActiveList, PruneError> {
        let s = list.semiring();
        let Some((best_state, best)) = list.best().map(|t| (t.state().id, t.score())) else {
            return Ok(list);
        };
        if let Some(bad) = list.iter().map(Token::score).find(|w| !s.is_member(*w)) {
            return Err(PruneError::InvalidScore {
                score: bad,
                semiring: s.to_string(),
            });
        }
        let before = list.len();

        if self.beam == s.one() {
            // exact ties with the best would survive the comparison below
            list.retain(|t| t.state().id == best_state);
        } else if self.beam != s.zero() {
            let threshold = s.times(best, self.beam);
            list.retain(|t| t.score() == best || !s.better(threshold, t.score()));
        }

        if let Some(cap) = self.max_active.filter(|&n| list.len() > n) {
            // rank by score, list order breaks ties
            let mut ranked: Vec<(usize, f32)> =
                list.iter().map(Token::score).enumerate().collect();
            ranked.sort_by(|a, b| {
                if s.better(a.1, b.1) {
                    std::cmp::Ordering::Less
                } else if s.better(b.1, a.1) {
                    std::cmp::Ordering::Greater
                } else {
                    a.0.cmp(&b.0)
                }
            });
            let mut keep = vec![false; ranked.len()];
            for &(i, _) in ranked.iter().take(cap.max(1)) {
                keep[i] = true;
            }
            let mut i = 0;
            list.retain(|_| {
                let k = keep[i];
                i += 1;
                k
            });
        }

        trace!(before, after = list.len(), frame = list.frame(), "pruned");
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::{SearchState, SearchStateId, StateKey, StateLabel};

    fn list(semiring: SemiringKind, scores: &[f32]) -> ActiveList {
        let mut l = ActiveList::new(semiring, 0);
        for (i, &sc) in scores.iter().enumerate() {
            let st = Arc::new(SearchState {
                id: SearchStateId(i as u32),
                key: StateKey::Grammar(i),
                label: StateLabel::Grammar,
            });
            l.insert(Token::new(i as u64, st, sc, sc, 0.0, 0, None));
        }
        l
    }

    fn ids(l: &ActiveList) -> Vec<u64> {
        l.iter().map(Token::id).collect()
    }

    #[test]
    fn null_pruner_is_identity() {
        let l = NullPruner
            .prune(list(SemiringKind::Tropical, &[3.0, 1.0, 2.0]))
            .unwrap();
        assert_eq!(ids(&l), [0, 1, 2]);
    }

    #[test]
    fn relative_beam_keeps_tokens_within_margin() {
        let s = SemiringKind::Tropical;
        let mut p = BeamPruner::from_cost(s, 1.5).unwrap();
        let l = p.prune(list(s, &[3.0, 1.0, 2.5, 2.6])).unwrap();
        assert_eq!(ids(&l), [1, 2]);
    }

    #[test]
    fn zero_width_beam_keeps_only_best() {
        for s in [
            SemiringKind::Tropical,
            SemiringKind::Log,
            SemiringKind::Probability,
        ] {
            let scores: Vec<f32> = [0.5f32, 0.2, 0.7, 0.2]
                .iter()
                .map(|p| s.from_probability(*p))
                .collect();
            let l = BeamPruner::from_cost(s, 0.0)
                .unwrap()
                .prune(list(s, &scores))
                .unwrap();
            assert_eq!(ids(&l), [2], "{s}");
        }
    }

    #[test]
    fn zero_width_beam_breaks_ties_by_list_order() {
        let s = SemiringKind::Tropical;
        let l = BeamPruner::from_cost(s, 0.0)
            .unwrap()
            .prune(list(s, &[2.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(ids(&l), [1]);
    }

    #[test]
    fn infinite_beam_is_a_no_op() {
        let s = SemiringKind::Log;
        let l = BeamPruner::from_cost(s, f32::INFINITY)
            .unwrap()
            .prune(list(s, &[9.0, 1.0, 500.0]))
            .unwrap();
        assert_eq!(ids(&l), [0, 1, 2]);
    }

    #[test]
    fn max_active_ranks_with_list_order_ties() {
        let s = SemiringKind::Tropical;
        let l = BeamPruner::from_cost(s, f32::INFINITY)
            .unwrap()
            .with_max_active(Some(2))
            .prune(list(s, &[4.0, 2.0, 3.0, 2.0]))
            .unwrap();
        assert_eq!(ids(&l), [1, 3]);
    }

    #[test]
    fn rejects_invalid_beams() {
        assert!(BeamPruner::from_cost(SemiringKind::Tropical, -1.0).is_err());
        assert!(BeamPruner::new(SemiringKind::Probability, -0.5).is_err());
    }
}
