//! Acoustic scoring.
//!
//! A scorer pulls exactly one frame from a [`FeatureSource`] per call,
//! attaches each emitting token's observation weight, and reports the best
//! token. Strategies are interchangeable: the search loop only sees
//! [`AcousticScorer`].

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::{
    error::ScoringError,
    graph::SearchStateId,
    search::{ActiveList, Token},
    semiring::{Semiring, SemiringKind},
};

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod density;
#[cfg(feature = "rayon")]
pub mod parallel;
pub mod simple;

pub use density::{DiagonalGaussian, GaussianObservationModel};
#[cfg(feature = "rayon")]
pub use parallel::ParallelAcousticScorer;
pub use simple::SimpleAcousticScorer;

/* ───────────────────────────── frames ────────────────────────────────── */

/// One feature vector and its position in the utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub features: Vec<f32>,
}

/// Pull-based, forward-only frame supply. `Ok(None)` means no more frames.
pub trait FeatureSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, ScoringError>;
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecFeatureSource {
    frames: std::vec::IntoIter<Vec<f32>>,
    next_index: usize,
}

impl VecFeatureSource {
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        Self {
            frames: frames.into_iter(),
            next_index: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FeatureSource for VecFeatureSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, ScoringError> {
        Ok(self.frames.next().map(|features| {
            let index = self.next_index;
            self.next_index += 1;
            Frame { index, features }
        }))
    }
}

/// Frames pushed by another thread (the front-end).
///
/// A disconnected sender ends the input. With a timeout, a pull that waits
/// longer than the timeout also ends the input.
#[derive(Debug)]
pub struct ChannelFeatureSource {
    rx: Receiver<Vec<f32>>,
    timeout: Option<Duration>,
    next_index: usize,
}

impl ChannelFeatureSource {
    pub fn new(rx: Receiver<Vec<f32>>) -> Self {
        Self {
            rx,
            timeout: None,
            next_index: 0,
        }
    }

    /// Bounded channel (`None` = unbounded) plus the source reading it.
    pub fn channel(capacity: Option<usize>) -> (Sender<Vec<f32>>, Self) {
        let (tx, rx) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        (tx, Self::new(rx))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl FeatureSource for ChannelFeatureSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, ScoringError> {
        let features = match self.timeout {
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(f) => f,
                Err(RecvTimeoutError::Timeout) => {
                    debug!(frame = self.next_index, ?t, "feature pull timed out");
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            },
            None => match self.rx.recv() {
                Ok(f) => f,
                Err(_) => return Ok(None),
            },
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, features }))
    }
}

/* ──────────────────────────── contracts ──────────────────────────────── */

/// Per-senone observation likelihoods.
pub trait ObservationModel: Send + Sync {
    /// Natural-log likelihood of `frame` under `senone`.
    fn log_likelihood(&self, senone: u32, frame: &Frame) -> Result<f32, ScoringError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// The source had no frame left; nothing was scored.
    EndOfInput,
    /// Frame `frame` was scored; `best` is `None` for an empty list.
    Scored {
        frame: usize,
        best: Option<SearchStateId>,
    },
}

pub trait AcousticScorer: Send {
    /// Called once before the first frame of an utterance.
    fn start(&mut self) {}

    fn calculate_scores(
        &mut self,
        list: &mut ActiveList,
        source: &mut dyn FeatureSource,
    ) -> Result<ScoreOutcome, ScoringError>;

    /// Called once after the last frame.
    fn stop(&mut self) {}
}

/* ───────────────────────── shared helpers ────────────────────────────── */

/// Add `frame`'s observation weight to `token` (non-emitting tokens are left
/// alone).
pub(crate) fn score_token(
    model: &dyn ObservationModel,
    semiring: SemiringKind,
    token: &mut Token,
    frame: &Frame,
) -> Result<(), ScoringError> {
    let Some(senone) = token.state().senone() else {
        return Ok(());
    };
    let ll = model.log_likelihood(senone, frame)?;
    if ll.is_nan() || ll == f32::INFINITY {
        return Err(ScoringError::InvalidLikelihood {
            senone,
            frame: frame.index,
            value: ll,
        });
    }
    token.add_acoustic(semiring, semiring.from_ln_probability(ll));
    Ok(())
}

/// Divide every score by the best one and report the best state.
pub(crate) fn finish_frame(list: &mut ActiveList, normalize: bool) -> Option<SearchStateId> {
    let best = list.best().map(|t| (t.state().id, t.score()))?;
    let s = list.semiring();
    if normalize && best.1 != s.zero() {
        for t in list.iter_mut() {
            t.normalize(s, best.1);
        }
    }
    Some(best.0)
}
