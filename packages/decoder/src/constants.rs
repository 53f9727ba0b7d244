//! Core constants for the decoder.
//!
//!  * All values are `pub` unless they’re strictly an implementation detail
//!    (then they stay `pub(crate)`).
//!  * Beam widths are expressed as **costs** (negative natural-log
//!    probabilities) and converted into the active semiring at run time.

/* --------------------------------------------------------------------- */
/*  Automaton file format                                                */

/// File-format version for serialised automata.
/// Increment **whenever stored layout changes**.
pub const FST_FORMAT_VERSION: u8 = 1;

/// Reserved label for epsilon transitions.
pub const EPSILON: u32 = 0;

/// Symbol printed for [`EPSILON`] in the text format.
pub const EPSILON_SYMBOL: &str = "<eps>";

/* --------------------------------------------------------------------- */
/*  Lattice                                                              */

/// Word label of the lattice initial node.
pub const SENTENCE_START: &str = "<s>";

/// Word label of the lattice terminal node.
pub const SENTENCE_END: &str = "</s>";

/// Silence label, the usual argument to [`crate::Lattice::remove_fillers`].
pub const SILENCE: &str = "<sil>";

/// Tolerance used by the posterior normalisation check and structural
/// equality of automata.
pub const WEIGHT_DELTA: f32 = 1e-4;

/// Frames per second assumed by the SLF writer (10 ms shift).
pub(crate) const SLF_FRAMES_PER_SECOND: f32 = 100.0;

/* --------------------------------------------------------------------- */
/*  Search defaults                                                      */

/// Relative beam width, `-ln(1e-80)`.
pub const DEFAULT_BEAM: f32 = 184.206_8;

/// Upper bound of losing hypotheses remembered per boundary token.
pub const DEFAULT_MAX_ALTERNATES: usize = 16;

/// Below this many tokens per worker the parallel scorer stays sequential.
pub const DEFAULT_MIN_TOKENS_PER_THREAD: usize = 10;

/// Self-loop probability used by [`crate::graph::Hmm::left_to_right`] callers
/// that do not care.
pub const DEFAULT_SELF_LOOP_PROBABILITY: f32 = 0.5;
