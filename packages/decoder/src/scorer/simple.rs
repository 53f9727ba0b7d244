//! Sequential scorer.

use std::sync::Arc;

use tracing::trace;

use super::{
    AcousticScorer, FeatureSource, ObservationModel, ScoreOutcome, finish_frame, score_token,
};
use crate::{error::ScoringError, search::ActiveList};

pub struct SimpleAcousticScorer {
    model: Arc<dyn ObservationModel>,
    normalize: bool,
}

impl SimpleAcousticScorer {
    pub fn new(model: Arc<dyn ObservationModel>) -> Self {
        Self {
            model,
            normalize: false,
        }
    }

    /// Divide every score by the frame's best after scoring.
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

impl AcousticScorer for SimpleAcousticScorer {
    fn calculate_scores(
        &mut self,
        list: &mut ActiveList,
        source: &mut dyn FeatureSource,
    ) -> Result<ScoreOutcome, ScoringError> {
        let Some(frame) = source.next_frame()? else {
            return Ok(ScoreOutcome::EndOfInput);
        };
        let s = list.semiring();
        for token in list.iter_mut() {
            score_token(&*self.model, s, token, &frame)?;
        }
        let best = finish_frame(list, self.normalize);
        trace!(frame = frame.index, tokens = list.len(), ?best, "scored");
        Ok(ScoreOutcome::Scored {
            frame: frame.index,
            best,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{SearchState, SearchStateId, StateKey, StateLabel},
        scorer::{DiagonalGaussian, GaussianObservationModel, VecFeatureSource},
        search::Token,
        semiring::SemiringKind,
    };

    fn hmm_token(id: u64, senone: u32) -> Token {
        let at = crate::graph::ArcRef {
            node: 0,
            arc: 0,
            pron: 0,
        };
        let st = Arc::new(SearchState {
            id: SearchStateId(senone),
            key: StateKey::Hmm {
                at,
                position: 0,
                index: senone,
            },
            label: StateLabel::Hmm {
                unit: Arc::from("X"),
                senone,
            },
        });
        Token::new(id, st, 0.0, 0.0, 0.0, 0, None)
    }

    fn model() -> Arc<dyn ObservationModel> {
        Arc::new(GaussianObservationModel::new(vec![
            DiagonalGaussian::unit(vec![0.0]),
            DiagonalGaussian::unit(vec![3.0]),
        ]))
    }

    #[test]
    fn scores_and_reports_best() {
        let mut list = ActiveList::new(SemiringKind::Tropical, 0);
        list.insert(hmm_token(1, 0));
        list.insert(hmm_token(2, 1));
        let mut src = VecFeatureSource::new(vec![vec![2.9]]);
        let mut scorer = SimpleAcousticScorer::new(model());

        let out = scorer.calculate_scores(&mut list, &mut src).unwrap();
        assert_eq!(
            out,
            ScoreOutcome::Scored {
                frame: 0,
                best: Some(SearchStateId(1))
            }
        );
        assert!(list.iter().all(|t| t.score() > 0.0));
        assert_eq!(
            scorer.calculate_scores(&mut list, &mut src).unwrap(),
            ScoreOutcome::EndOfInput
        );
    }

    #[test]
    fn empty_list_has_no_best() {
        let mut list = ActiveList::new(SemiringKind::Log, 0);
        let mut src = VecFeatureSource::new(vec![vec![0.0]]);
        let out = SimpleAcousticScorer::new(model())
            .calculate_scores(&mut list, &mut src)
            .unwrap();
        assert_eq!(out, ScoreOutcome::Scored { frame: 0, best: None });
    }

    #[test]
    fn normalization_makes_best_one() {
        let mut list = ActiveList::new(SemiringKind::Tropical, 0);
        list.insert(hmm_token(1, 0));
        list.insert(hmm_token(2, 1));
        let mut src = VecFeatureSource::new(vec![vec![0.1]]);
        SimpleAcousticScorer::new(model())
            .with_normalization(true)
            .calculate_scores(&mut list, &mut src)
            .unwrap();
        assert_eq!(list.best_score(), Some(0.0));
    }
}
