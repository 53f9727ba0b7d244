//! Rayon-parallel scorer.
//!
//! Tokens are scored data-parallel (each worker only writes its own tokens);
//! the best token is then picked sequentially in list order, so the result is
//! identical to [`super::SimpleAcousticScorer`] under every tie.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tracing::{debug, trace};

use super::{
    AcousticScorer, FeatureSource, ObservationModel, ScoreOutcome, finish_frame, score_token,
};
use crate::{
    constants::DEFAULT_MIN_TOKENS_PER_THREAD, error::ScoringError, search::ActiveList,
};

pub struct ParallelAcousticScorer {
    model: Arc<dyn ObservationModel>,
    normalize: bool,
    min_tokens_per_thread: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl ParallelAcousticScorer {
    /// Scores on the global rayon pool.
    pub fn new(model: Arc<dyn ObservationModel>) -> Self {
        Self {
            model,
            normalize: false,
            min_tokens_per_thread: DEFAULT_MIN_TOKENS_PER_THREAD,
            pool: None,
        }
    }

    /// Scores on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, ScoringError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("decoder-score-{i}"))
            .build()
            .map_err(|e| ScoringError::ThreadPool(e.to_string()))?;
        debug!(threads = pool.current_num_threads(), "scoring pool ready");
        self.pool = Some(Arc::new(pool));
        Ok(self)
    }

    /// Share an existing pool.
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Below `n` tokens per worker the frame is scored sequentially.
    pub fn with_min_tokens_per_thread(mut self, n: usize) -> Self {
        self.min_tokens_per_thread = n.max(1);
        self
    }

    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
    }
}

impl AcousticScorer for ParallelAcousticScorer {
    fn calculate_scores(
        &mut self,
        list: &mut ActiveList,
        source: &mut dyn FeatureSource,
    ) -> Result<ScoreOutcome, ScoringError> {
        let Some(frame) = source.next_frame()? else {
            return Ok(ScoreOutcome::EndOfInput);
        };
        let s = list.semiring();
        let model = &*self.model;

        if list.len() < self.min_tokens_per_thread.saturating_mul(self.threads().max(2)) {
            for token in list.iter_mut() {
                score_token(model, s, token, &frame)?;
            }
        } else {
            let frame = &frame;
            let run = |list: &mut ActiveList| {
                list.par_iter_mut()
                    .try_for_each(|token| score_token(model, s, token, frame))
            };
            match &self.pool {
                Some(pool) => pool.install(|| run(list))?,
                None => run(list)?,
            }
        }

        let best = finish_frame(list, self.normalize);
        trace!(frame = frame.index, tokens = list.len(), ?best, "scored (parallel)");
        Ok(ScoreOutcome::Scored {
            frame: frame.index,
            best,
        })
    }
}
