//! Token-passing search.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod active_list;
pub mod manager;
pub mod result;
pub mod token;

pub use active_list::{ActiveList, Insertion};
pub use manager::{SearchManager, SearchStats};
pub use result::{DecodeResult, WordHypothesis};
pub use token::Token;

/// Lifecycle of one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    NotStarted,
    Running,
    /// Stopped on request at a frame boundary.
    Stopped,
    /// The feature source ran dry.
    Completed,
}

impl SearchStatus {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Cooperative cancellation, honoured at the next frame boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}
