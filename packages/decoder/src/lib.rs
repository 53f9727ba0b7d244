//! Fluent-Voice Decoder – public crate root
//! =======================================
//! Frame-synchronous **token-passing Viterbi search** for speech recognition.
//!
//! * Grammars are weighted automata ([`Fst`]) over a pluggable [`Semiring`];
//!   they load from text or CBOR, compose, and compile from [`GrammarExpr`].
//! * [`FstSearchGraph`] expands grammar × pronunciation × HMM states lazily.
//! * [`SearchManager`] drives scoring, pruning and growth one frame at a time
//!   and hands back a [`DecodeResult`], from which a [`Lattice`] with
//!   forward-backward posteriors and n-best paths can be built.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fluent_voice_decoder::{
//!     DecoderConfig, DiagonalGaussian, FstSearchGraph, GaussianObservationModel, GrammarExpr,
//!     GraphConfig, MemoryDictionary, MemoryUnitInventory, SearchManager, VecFeatureSource,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DecoderConfig::default();
//! let grammar = GrammarExpr::alternatives(["YES", "NO"].map(GrammarExpr::word))
//!     .compile(config.search.semiring)?;
//! let dictionary = MemoryDictionary::new().with_word("YES", ["Y"]).with_word("NO", ["N"]);
//! let units = MemoryUnitInventory::single_state([("Y", 0), ("N", 1)])?;
//! let graph = FstSearchGraph::new(
//!     Arc::new(grammar),
//!     Arc::new(dictionary),
//!     Arc::new(units),
//!     GraphConfig::default(),
//! )?;
//! let model = GaussianObservationModel::new(vec![
//!     DiagonalGaussian::unit(vec![1.0]),
//!     DiagonalGaussian::unit(vec![-1.0]),
//! ]);
//!
//! let mut search = SearchManager::from_config(Arc::new(graph), Arc::new(model), &config)?;
//! let result = search.decode(&mut VecFeatureSource::new(vec![vec![0.8]; 5]))?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```
//
//  ───────────────────────────────────────────────────────────────────────────
//  lints: no unsafe anywhere; rayon is the only source of threads.
//  ───────────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod config;
pub mod constants;
pub mod error;
pub mod fst;
pub mod graph;
pub mod lattice;
pub mod pruner;
pub mod scorer;
pub mod search;
pub mod semiring;

/* ───────────────────── public façade & re-exports ────────────────────── */
pub use config::{DecoderConfig, PruningConfig, ScoringConfig, SearchConfig};
pub use error::{
    ConfigError, DecodeFailure, FstError, GraphError, LatticeError, PruneError, ScoringError,
};
pub use fst::{ArcSort, Fst, FstArc, GrammarExpr, SymbolTable, compose};
pub use graph::{
    Dictionary, FstSearchGraph, GraphConfig, Hmm, MemoryDictionary, MemoryUnitInventory,
    SearchGraph, SearchState, SearchStateId, UnitInventory,
};
pub use lattice::{Lattice, LatticeEdge, LatticeNode, NBestPath, PosteriorOptions};
pub use pruner::{BeamPruner, NullPruner, Pruner};
#[cfg(feature = "rayon")]
pub use scorer::ParallelAcousticScorer;
pub use scorer::{
    AcousticScorer, ChannelFeatureSource, DiagonalGaussian, FeatureSource, Frame,
    GaussianObservationModel, ObservationModel, ScoreOutcome, SimpleAcousticScorer,
    VecFeatureSource,
};
pub use search::{
    ActiveList, DecodeResult, SearchManager, SearchStats, SearchStatus, StopHandle, Token,
    WordHypothesis,
};
pub use semiring::{LogSemiring, ProbabilitySemiring, Semiring, SemiringKind, TropicalSemiring};
