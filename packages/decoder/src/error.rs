//! Error taxonomy.
//!
//! Load-time errors ([`FstError`], [`GraphError`], [`ConfigError`]) abort
//! construction. Per-frame errors ([`ScoringError`], [`PruneError`]) abort the
//! whole utterance and surface as a single [`DecodeFailure`].

use thiserror::Error;

/* --------------------------------------------------------------------- */
/*  Automaton                                                            */

#[derive(Debug, Error)]
pub enum FstError {
    /// Malformed line in the text format (1-based line number).
    #[error("format error on line {line}: {reason}")]
    Format { line: usize, reason: String },
    /// Dangling reference, missing start/final state, unsorted arcs, …
    #[error("structural error: {0}")]
    Structural(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cbor: {0}")]
    Cbor(String),
    #[error("unsupported automaton format version {found} (expected {expected})")]
    Version { found: u8, expected: u8 },
}

impl FstError {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }
}

/* --------------------------------------------------------------------- */
/*  Search graph                                                         */

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("word `{0}` has no pronunciation")]
    UnknownWord(String),
    #[error("unit `{0}` has no HMM")]
    UnknownUnit(String),
    #[error("grammar state {0} does not exist")]
    UnknownState(usize),
    #[error("invalid HMM for unit `{unit}`: {reason}")]
    InvalidHmm { unit: String, reason: String },
    #[error("grammar has no start state")]
    NoStart,
    #[error(transparent)]
    Fst(#[from] FstError),
}

/* --------------------------------------------------------------------- */
/*  Per-frame                                                            */

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("observation model failed for senone {senone} at frame {frame}: {reason}")]
    Observation {
        senone: u32,
        frame: usize,
        reason: String,
    },
    #[error("invalid likelihood {value} for senone {senone} at frame {frame}")]
    InvalidLikelihood { senone: u32, frame: usize, value: f32 },
    #[error("feature source failed: {0}")]
    Source(String),
    #[error("scoring thread pool: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Error)]
pub enum PruneError {
    #[error("invalid beam {0}")]
    InvalidBeam(f32),
    #[error("token score {score} is not a member of the {semiring} semiring")]
    InvalidScore { score: f32, semiring: String },
}

/* --------------------------------------------------------------------- */
/*  Decode                                                               */

/// The single typed failure a decode can return.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    #[error("scoring failed at frame {frame}: {source}")]
    Scoring {
        frame: usize,
        #[source]
        source: ScoringError,
    },
    #[error("pruning failed at frame {frame}: {source}")]
    Pruning {
        frame: usize,
        #[source]
        source: PruneError,
    },
    #[error("graph expansion failed at frame {frame}: {source}")]
    Graph {
        frame: usize,
        #[source]
        source: GraphError,
    },
    #[error("search has not been started")]
    NotStarted,
    #[error("decode aborted by an earlier failure")]
    Aborted,
}

/* --------------------------------------------------------------------- */
/*  Lattice                                                              */

#[derive(Debug, Error)]
pub enum LatticeError {
    #[error("lattice contains a cycle")]
    Cyclic,
    #[error("lattice node {0} does not exist")]
    MissingNode(usize),
    #[error("edge {edge} references missing node {node}")]
    DanglingEdge { edge: usize, node: usize },
    #[error("lattice has no complete path")]
    Empty,
    #[error("posteriors have not been computed")]
    NoPosteriors,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/* --------------------------------------------------------------------- */
/*  Configuration                                                        */

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("toml: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
