//! Lazily expanded search graph over a grammar automaton.
//!
//! ```text
//! Grammar(g) ──word arc──▶ Unit(0) ─▶ Hmm(0) ⇄ … ─exit─▶ Unit(1) … ─▶ Word ─▶ Grammar(g')
//!      │  └──ε arc──▶ Grammar(g')
//!      └──final weight──▶ Final(g)
//! ```

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::{
    ArcRef, Dictionary, SearchGraph, SearchState, SearchStateArc, SearchStateId, StateKey,
    StateLabel, UnitInventory, lexicon::Pronunciation,
};
use crate::{
    config::DecoderConfig,
    constants::EPSILON,
    error::GraphError,
    fst::{Fst, FstArc, StateId},
    semiring::{Semiring, SemiringKind},
};

/* --------------------------------------------------------------------- */
/*  Options                                                              */

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Exponent applied to every grammar weight.
    pub language_weight: f32,
    /// Linear probability charged on every word entry.
    pub word_insertion_probability: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            language_weight: 1.0,
            word_insertion_probability: 1.0,
        }
    }
}

/* --------------------------------------------------------------------- */
/*  Cache                                                                */

#[derive(Default)]
struct Cache {
    ids: HashMap<StateKey, SearchStateId>,
    states: Vec<Arc<SearchState>>,
    successors: HashMap<SearchStateId, Arc<[SearchStateArc]>>,
}

impl Cache {
    fn intern(&mut self, key: StateKey, label: StateLabel) -> Arc<SearchState> {
        if let Some(id) = self.ids.get(&key) {
            return self.states[id.0 as usize].clone();
        }
        let id = SearchStateId(self.states.len() as u32);
        let state = Arc::new(SearchState { id, key, label });
        self.ids.insert(key, id);
        self.states.push(state.clone());
        state
    }
}

/// Successor before interning.
struct Pending {
    key: StateKey,
    label: StateLabel,
    language: f32,
    insertion: f32,
    transition: f32,
}

/* --------------------------------------------------------------------- */
/*  Graph                                                                */

pub struct FstSearchGraph {
    grammar: Arc<Fst>,
    dictionary: Arc<dyn Dictionary>,
    units: Arc<dyn UnitInventory>,
    config: GraphConfig,
    insertion: f32,
    cache: RwLock<Cache>,
}

impl std::fmt::Debug for FstSearchGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FstSearchGraph")
            .field("grammar_states", &self.grammar.num_states())
            .field("config", &self.config)
            .field("cached_states", &self.cache.read().states.len())
            .finish()
    }
}

impl FstSearchGraph {
    /// Checks the grammar up front: valid, every reachable word
    /// pronounceable, every unit backed by an HMM. Arc order is free since
    /// expansion visits every arc of a state.
    #[instrument(level = "debug", skip_all)]
    pub fn new(
        grammar: Arc<Fst>,
        dictionary: Arc<dyn Dictionary>,
        units: Arc<dyn UnitInventory>,
        config: GraphConfig,
    ) -> Result<Self, GraphError> {
        grammar.validate()?;
        let s = grammar.semiring();
        for word in grammar.reachable_words() {
            let prons = dictionary
                .pronunciations(&word)
                .ok_or_else(|| GraphError::UnknownWord(word.clone()))?;
            for unit in prons.iter().flatten() {
                if units.hmm(unit).is_none() {
                    return Err(GraphError::UnknownUnit(unit.to_string()));
                }
            }
        }
        debug!(
            states = grammar.num_states(),
            arcs = grammar.num_arcs(),
            semiring = %s,
            "search graph ready"
        );
        Ok(Self {
            insertion: s.from_probability(config.word_insertion_probability),
            grammar,
            dictionary,
            units,
            config,
            cache: RwLock::new(Cache::default()),
        })
    }

    /// Same as [`FstSearchGraph::new`] with the `[graph]` section of a
    /// decoder config.
    pub fn from_config(
        grammar: Arc<Fst>,
        dictionary: Arc<dyn Dictionary>,
        units: Arc<dyn UnitInventory>,
        config: &DecoderConfig,
    ) -> Result<Self, GraphError> {
        Self::new(grammar, dictionary, units, config.graph)
    }

    pub fn grammar(&self) -> &Arc<Fst> {
        &self.grammar
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Every word the grammar can emit.
    pub fn reachable_words(&self) -> std::collections::BTreeSet<String> {
        self.grammar.reachable_words()
    }

    /* ---------- expansion ---------- */

    fn grammar_arc(&self, at: ArcRef) -> Result<&FstArc, GraphError> {
        self.grammar
            .arcs(at.node)
            .get(at.arc as usize)
            .ok_or(GraphError::UnknownState(at.node))
    }

    fn word_of(&self, arc: &FstArc) -> Result<Arc<str>, GraphError> {
        self.grammar
            .osyms()
            .shared(arc.olabel)
            .ok_or_else(|| GraphError::UnknownWord(format!("label {}", arc.olabel)))
    }

    fn pronunciation(&self, at: ArcRef) -> Result<(Arc<str>, &Pronunciation), GraphError> {
        let word = self.word_of(self.grammar_arc(at)?)?;
        let pron = self
            .dictionary
            .pronunciations(&word)
            .and_then(|p| p.get(at.pron as usize))
            .ok_or_else(|| GraphError::UnknownWord(word.to_string()))?;
        Ok((word, pron))
    }

    /// State entered when `pron` is at `position` (a unit or the word end).
    fn unit_or_word(
        &self,
        at: ArcRef,
        word: &Arc<str>,
        pron: &Pronunciation,
        position: u32,
    ) -> (StateKey, StateLabel) {
        match pron.get(position as usize) {
            Some(unit) => (StateKey::Unit { at, position }, StateLabel::Unit(unit.clone())),
            None => (StateKey::Word { at }, StateLabel::Word(word.clone())),
        }
    }

    fn expand(&self, state: &SearchState) -> Result<Vec<Pending>, GraphError> {
        let s = self.grammar.semiring();
        let one = s.one();
        let mut out = Vec::new();

        match state.key {
            StateKey::Grammar(g) => {
                if g >= self.grammar.num_states() {
                    return Err(GraphError::UnknownState(g));
                }
                for (k, arc) in self.grammar.arcs(g).iter().enumerate() {
                    let language = s.power(arc.weight, self.config.language_weight);
                    if arc.olabel == EPSILON {
                        out.push(Pending {
                            key: StateKey::Grammar(arc.nextstate),
                            label: StateLabel::Grammar,
                            language,
                            insertion: one,
                            transition: one,
                        });
                        continue;
                    }
                    let word = self.word_of(arc)?;
                    let prons = self
                        .dictionary
                        .pronunciations(&word)
                        .ok_or_else(|| GraphError::UnknownWord(word.to_string()))?;
                    for (p, pron) in prons.iter().enumerate() {
                        let at = ArcRef {
                            node: g,
                            arc: k as u32,
                            pron: p as u32,
                        };
                        let (key, label) = self.unit_or_word(at, &word, pron, 0);
                        out.push(Pending {
                            key,
                            label,
                            language,
                            insertion: self.insertion,
                            transition: one,
                        });
                    }
                }
                let fw = self.grammar.final_weight(g);
                if fw != s.zero() {
                    out.push(Pending {
                        key: StateKey::Final(g),
                        label: StateLabel::Final,
                        language: s.power(fw, self.config.language_weight),
                        insertion: one,
                        transition: one,
                    });
                }
            }
            StateKey::Unit { at, position } => {
                let StateLabel::Unit(unit) = &state.label else {
                    return Err(GraphError::UnknownState(at.node));
                };
                let hmm = self
                    .units
                    .hmm(unit)
                    .ok_or_else(|| GraphError::UnknownUnit(unit.to_string()))?;
                let senone = hmm
                    .senone(0)
                    .ok_or_else(|| GraphError::UnknownUnit(unit.to_string()))?;
                out.push(Pending {
                    key: StateKey::Hmm {
                        at,
                        position,
                        index: 0,
                    },
                    label: StateLabel::Hmm {
                        unit: unit.clone(),
                        senone,
                    },
                    language: one,
                    insertion: one,
                    transition: one,
                });
            }
            StateKey::Hmm { at, position, index } => {
                let StateLabel::Hmm { unit, .. } = &state.label else {
                    return Err(GraphError::UnknownState(at.node));
                };
                let hmm = self
                    .units
                    .hmm(unit)
                    .ok_or_else(|| GraphError::UnknownUnit(unit.to_string()))?;
                let from = index as usize;
                let n = hmm.num_states();
                for to in 0..=n {
                    let p = hmm.transition(from, to);
                    if p == 0.0 {
                        continue;
                    }
                    let (key, label) = match hmm.senone(to) {
                        Some(senone) => (
                            StateKey::Hmm {
                                at,
                                position,
                                index: to as u32,
                            },
                            StateLabel::Hmm {
                                unit: unit.clone(),
                                senone,
                            },
                        ),
                        None => {
                            let (word, pron) = self.pronunciation(at)?;
                            self.unit_or_word(at, &word, pron, position + 1)
                        }
                    };
                    out.push(Pending {
                        key,
                        label,
                        language: one,
                        insertion: one,
                        transition: s.from_probability(p),
                    });
                }
            }
            StateKey::Word { at } => {
                let arc = self.grammar_arc(at)?;
                out.push(Pending {
                    key: StateKey::Grammar(arc.nextstate),
                    label: StateLabel::Grammar,
                    language: one,
                    insertion: one,
                    transition: one,
                });
            }
            StateKey::Final(_) => {}
        }
        Ok(out)
    }
}

impl SearchGraph for FstSearchGraph {
    fn semiring(&self) -> SemiringKind {
        self.grammar.semiring()
    }

    fn initial_state(&self) -> Result<Arc<SearchState>, GraphError> {
        let start: StateId = self.grammar.start().ok_or(GraphError::NoStart)?;
        Ok(self
            .cache
            .write()
            .intern(StateKey::Grammar(start), StateLabel::Grammar))
    }

    fn successors(&self, state: &SearchState) -> Result<Arc<[SearchStateArc]>, GraphError> {
        if let Some(hit) = self.cache.read().successors.get(&state.id) {
            return Ok(hit.clone());
        }

        let pending = self.expand(state)?;

        let mut cache = self.cache.write();
        // another decode may have expanded it while we were unlocked
        if let Some(hit) = cache.successors.get(&state.id) {
            return Ok(hit.clone());
        }
        let arcs: Arc<[SearchStateArc]> = pending
            .into_iter()
            .map(|p| SearchStateArc {
                state: cache.intern(p.key, p.label),
                language: p.language,
                insertion: p.insertion,
                transition: p.transition,
            })
            .collect();
        cache.successors.insert(state.id, arcs.clone());
        trace!(state = %state, successors = arcs.len(), "expanded");
        Ok(arcs)
    }

    fn num_states(&self) -> usize {
        self.cache.read().states.len()
    }

    fn options(&self) -> Option<GraphConfig> {
        Some(self.config)
    }
}
