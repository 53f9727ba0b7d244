//! Decoder configuration.
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys
//! it changes:
//!
//! ```toml
//! [search]
//! semiring = "log"
//! word_beam = 60.0
//!
//! [pruning]
//! beam = 120.0
//! max_active = 4000
//! ```
//!
//! Beams are costs (`-ln` of a relative probability floor); `inf` disables a
//! beam.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{DEFAULT_BEAM, DEFAULT_MAX_ALTERNATES, DEFAULT_MIN_TOKENS_PER_THREAD},
    error::ConfigError,
    graph::GraphConfig,
    lattice::PosteriorOptions,
    semiring::SemiringKind,
};

/* --------------------------------------------------------------------- */
/*  Sections                                                             */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub semiring: SemiringKind,
    /// Keep every token in the ancestry chain instead of word tokens only.
    pub keep_all_tokens: bool,
    /// Word ends worse than `best ⊗ word_beam` are not expanded (cost).
    pub word_beam: Option<f32>,
    /// Losing hypotheses remembered per boundary token; 0 disables.
    pub max_alternates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semiring: SemiringKind::Tropical,
            keep_all_tokens: false,
            word_beam: None,
            max_alternates: DEFAULT_MAX_ALTERNATES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    /// `false` installs the pass-through pruner.
    pub enabled: bool,
    /// Relative beam (cost).
    pub beam: f32,
    /// Absolute beam.
    pub max_active: Option<usize>,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            beam: DEFAULT_BEAM,
            max_active: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// 1 = sequential, 0 = global rayon pool, n = dedicated pool of n.
    pub threads: usize,
    pub min_tokens_per_thread: usize,
    /// Divide scores by the frame's best after scoring.
    pub normalize: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            min_tokens_per_thread: DEFAULT_MIN_TOKENS_PER_THREAD,
            normalize: false,
        }
    }
}

/* --------------------------------------------------------------------- */
/*  Root                                                                 */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub search: SearchConfig,
    pub pruning: PruningConfig,
    pub scoring: ScoringConfig,
    pub graph: GraphConfig,
    pub lattice: PosteriorOptions,
}

impl DecoderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let cfg = Self::from_toml_str(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), "decoder config loaded");
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_cost("pruning.beam", self.pruning.beam)?;
        if let Some(wb) = self.search.word_beam {
            check_cost("search.word_beam", wb)?;
        }
        if self.pruning.max_active == Some(0) {
            return Err(ConfigError::invalid("pruning.max_active", "must keep at least one token"));
        }
        if self.scoring.min_tokens_per_thread == 0 {
            return Err(ConfigError::invalid(
                "scoring.min_tokens_per_thread",
                "must be at least 1",
            ));
        }
        if !self.graph.language_weight.is_finite() || self.graph.language_weight < 0.0 {
            return Err(ConfigError::invalid(
                "graph.language_weight",
                format!("{} is not a finite non-negative number", self.graph.language_weight),
            ));
        }
        let wip = self.graph.word_insertion_probability;
        if !(wip > 0.0 && wip.is_finite()) {
            return Err(ConfigError::invalid(
                "graph.word_insertion_probability",
                format!("{wip} is not a positive probability"),
            ));
        }
        if !self.lattice.lm_weight.is_finite() || self.lattice.lm_weight < 0.0 {
            return Err(ConfigError::invalid(
                "lattice.lm_weight",
                format!("{} is not a finite non-negative number", self.lattice.lm_weight),
            ));
        }
        if !(self.lattice.scale > 0.0 && self.lattice.scale.is_finite()) {
            return Err(ConfigError::invalid(
                "lattice.scale",
                format!("{} is not positive", self.lattice.scale),
            ));
        }
        Ok(())
    }

    /* ---------- builders ---------- */

    pub fn with_semiring(mut self, semiring: SemiringKind) -> Self {
        self.search.semiring = semiring;
        self
    }

    pub fn with_beam(mut self, beam: f32) -> Self {
        self.pruning.beam = beam;
        self
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.pruning.enabled = enabled;
        self
    }

    pub fn with_max_active(mut self, max_active: Option<usize>) -> Self {
        self.pruning.max_active = max_active;
        self
    }

    pub fn with_word_beam(mut self, word_beam: Option<f32>) -> Self {
        self.search.word_beam = word_beam;
        self
    }

    pub fn with_keep_all_tokens(mut self, keep: bool) -> Self {
        self.search.keep_all_tokens = keep;
        self
    }

    pub fn with_max_alternates(mut self, n: usize) -> Self {
        self.search.max_alternates = n;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.scoring.threads = threads;
        self
    }

    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.scoring.normalize = normalize;
        self
    }

    pub fn with_language_weight(mut self, lw: f32) -> Self {
        self.graph.language_weight = lw;
        self
    }

    pub fn with_word_insertion_probability(mut self, p: f32) -> Self {
        self.graph.word_insertion_probability = p;
        self
    }
}

fn check_cost(field: &'static str, cost: f32) -> Result<(), ConfigError> {
    if cost.is_nan() || cost < 0.0 {
        Err(ConfigError::invalid(field, format!("{cost} is not a non-negative cost")))
    } else {
        Ok(())
    }
}
