//! Frame-synchronous search loop.
//!
//! ```text
//! NotStarted ──start()──▶ Running ──step()*──▶ Completed   (source ran dry)
//!                                     └──────▶ Stopped     (stop requested)
//! ```
//!
//! Each [`SearchManager::step`] scores the active list against one frame,
//! prunes it, then grows the survivors: emitting successors go to the next
//! frame's list, non-emitting successors are relaxed and expanded at once.
//! Any scorer, pruner or graph error fails the whole utterance.

use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::Arc,
};

use indexmap::IndexMap;
use tracing::{debug, error, info, instrument, trace};

use super::{ActiveList, DecodeResult, SearchStatus, StopHandle, Token};
use crate::{
    config::{DecoderConfig, SearchConfig},
    error::{ConfigError, DecodeFailure, GraphError, LatticeError},
    graph::{SearchGraph, SearchStateId},
    lattice::{Lattice, PosteriorOptions},
    pruner::{BeamPruner, NullPruner, Pruner},
    scorer::{AcousticScorer, FeatureSource, ObservationModel, ScoreOutcome, SimpleAcousticScorer},
    semiring::{Semiring, SemiringKind},
};

/// Counters for one utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub frames: usize,
    pub tokens_created: u64,
    pub expansions: u64,
    /// Largest active list handed to the scorer.
    pub max_active: usize,
    pub word_ends: u64,
    pub word_beam_pruned: u64,
    pub alternates: u64,
}

/// Per-frame growth scratch space.
struct Growth {
    next: ActiveList,
    best: IndexMap<SearchStateId, Arc<Token>>,
    visiting: HashSet<SearchStateId>,
    word_threshold: Option<f32>,
}

pub struct SearchManager {
    graph: Arc<dyn SearchGraph>,
    scorer: Box<dyn AcousticScorer>,
    pruner: Box<dyn Pruner>,
    semiring: SemiringKind,
    keep_all_tokens: bool,
    word_beam: Option<f32>,
    max_alternates: usize,
    lattice_options: PosteriorOptions,

    status: SearchStatus,
    frame: usize,
    active: ActiveList,
    results: IndexMap<SearchStateId, Arc<Token>>,
    alternates: HashMap<u64, Vec<Arc<Token>>>,
    next_token_id: u64,
    stop: StopHandle,
    stats: SearchStats,
    failed: bool,
}

impl SearchManager {
    pub fn new(
        graph: Arc<dyn SearchGraph>,
        scorer: Box<dyn AcousticScorer>,
        pruner: Box<dyn Pruner>,
        config: &SearchConfig,
    ) -> Self {
        let semiring = graph.semiring();
        Self {
            graph,
            scorer,
            pruner,
            semiring,
            keep_all_tokens: config.keep_all_tokens,
            word_beam: config
                .word_beam
                .map(|cost| semiring.from_ln_probability(-cost)),
            max_alternates: config.max_alternates,
            lattice_options: PosteriorOptions::default(),
            status: SearchStatus::NotStarted,
            frame: 0,
            active: ActiveList::new(semiring, 0),
            results: IndexMap::new(),
            alternates: HashMap::new(),
            next_token_id: 0,
            stop: StopHandle::new(),
            stats: SearchStats::default(),
            failed: false,
        }
    }

    /// Wire scorer and pruner from `config`.
    pub fn from_config(
        graph: Arc<dyn SearchGraph>,
        model: Arc<dyn ObservationModel>,
        config: &DecoderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let s = graph.semiring();
        if config.search.semiring != s {
            return Err(ConfigError::invalid(
                "search.semiring",
                format!("graph uses the {s} semiring, config asks for {}", config.search.semiring),
            ));
        }
        match graph.options() {
            Some(built) if built != config.graph => {
                return Err(ConfigError::invalid(
                    "graph",
                    format!("graph was built with {built:?}, config asks for {:?}", config.graph),
                ));
            }
            _ => {}
        }

        let sc = &config.scoring;
        let scorer: Box<dyn AcousticScorer> = match sc.threads {
            1 => Box::new(SimpleAcousticScorer::new(model).with_normalization(sc.normalize)),
            #[cfg(feature = "rayon")]
            0 => Box::new(
                crate::scorer::ParallelAcousticScorer::new(model)
                    .with_min_tokens_per_thread(sc.min_tokens_per_thread)
                    .with_normalization(sc.normalize),
            ),
            #[cfg(feature = "rayon")]
            n => Box::new(
                crate::scorer::ParallelAcousticScorer::new(model)
                    .with_threads(n)
                    .map_err(|e| ConfigError::invalid("scoring.threads", e.to_string()))?
                    .with_min_tokens_per_thread(sc.min_tokens_per_thread)
                    .with_normalization(sc.normalize),
            ),
            #[cfg(not(feature = "rayon"))]
            n => {
                tracing::warn!(threads = n, "built without rayon; scoring sequentially");
                Box::new(SimpleAcousticScorer::new(model).with_normalization(sc.normalize))
            }
        };

        let pruner: Box<dyn Pruner> = if config.pruning.enabled {
            Box::new(
                BeamPruner::from_cost(s, config.pruning.beam)
                    .map_err(|e| ConfigError::invalid("pruning.beam", e.to_string()))?
                    .with_max_active(config.pruning.max_active),
            )
        } else {
            Box::new(NullPruner)
        };

        Ok(Self::new(graph, scorer, pruner, &config.search).with_lattice_options(config.lattice))
    }

    /// Options used by [`SearchManager::lattice`].
    pub fn with_lattice_options(mut self, opts: PosteriorOptions) -> Self {
        self.lattice_options = opts;
        self
    }

    /* ---------- accessors ---------- */

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    /// Frames consumed so far.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active
    }

    pub fn graph(&self) -> &Arc<dyn SearchGraph> {
        &self.graph
    }

    pub fn lattice_options(&self) -> &PosteriorOptions {
        &self.lattice_options
    }

    /// Lattice of `result` with posteriors under the configured options.
    pub fn lattice(&self, result: &DecodeResult) -> Result<Lattice, LatticeError> {
        result.lattice_with_posteriors(&self.lattice_options)
    }

    /// Handle another thread can use to stop this search.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /* ---------- lifecycle ---------- */

    /// Seed the root token and grow its non-emitting closure.
    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self) -> Result<(), DecodeFailure> {
        self.reset();
        self.scorer.start();
        self.pruner.start();

        let initial = match self.graph.initial_state() {
            Ok(st) => st,
            Err(source) => return Err(self.fail(DecodeFailure::Graph { frame: 0, source })),
        };
        let root = Token::root(self.next_id(), initial, self.semiring);
        self.status = SearchStatus::Running;
        match self.grow(vec![root]) {
            Ok(next) => self.active = next,
            Err(source) => return Err(self.fail(DecodeFailure::Graph { frame: 0, source })),
        }
        debug!(active = self.active.len(), "search started");
        Ok(())
    }

    /// Advance by one frame.
    pub fn step(&mut self, source: &mut dyn FeatureSource) -> Result<SearchStatus, DecodeFailure> {
        if self.failed {
            return Err(DecodeFailure::Aborted);
        }
        match self.status {
            SearchStatus::NotStarted => return Err(DecodeFailure::NotStarted),
            SearchStatus::Stopped | SearchStatus::Completed => return Ok(self.status),
            SearchStatus::Running => {}
        }
        if self.stop.is_stop_requested() {
            self.finish(SearchStatus::Stopped);
            return Ok(self.status);
        }

        let mut list = mem::replace(&mut self.active, ActiveList::new(self.semiring, self.frame));
        self.stats.max_active = self.stats.max_active.max(list.len());

        match self.scorer.calculate_scores(&mut list, source) {
            Ok(ScoreOutcome::Scored { .. }) => {}
            Ok(ScoreOutcome::EndOfInput) => {
                self.active = list;
                self.finish(SearchStatus::Completed);
                return Ok(self.status);
            }
            Err(source) => {
                let frame = self.frame;
                return Err(self.fail(DecodeFailure::Scoring { frame, source }));
            }
        }
        self.frame += 1;
        self.stats.frames = self.frame;

        let pruned = match self.pruner.prune(list) {
            Ok(l) => l,
            Err(source) => {
                let frame = self.frame;
                return Err(self.fail(DecodeFailure::Pruning { frame, source }));
            }
        };
        match self.grow(pruned.into_tokens().collect()) {
            Ok(next) => self.active = next,
            Err(source) => {
                let frame = self.frame;
                return Err(self.fail(DecodeFailure::Graph { frame, source }));
            }
        }
        self.drop_dead_alternates();

        #[cfg(feature = "debug")]
        debug!(
            frame = self.frame,
            active = self.active.len(),
            finals = self.results.len(),
            "frame done"
        );
        Ok(self.status)
    }

    /// `start`, then `step` until the source runs dry or a stop is requested.
    #[instrument(level = "debug", skip_all)]
    pub fn decode(&mut self, source: &mut dyn FeatureSource) -> Result<DecodeResult, DecodeFailure> {
        self.start()?;
        while self.step(source)? == SearchStatus::Running {}
        self.result()
    }

    /// Snapshot of the current hypotheses.
    pub fn result(&self) -> Result<DecodeResult, DecodeFailure> {
        if self.failed {
            return Err(DecodeFailure::Aborted);
        }
        if self.status == SearchStatus::NotStarted {
            return Err(DecodeFailure::NotStarted);
        }
        Ok(DecodeResult::new(
            self.status,
            self.semiring,
            self.frame,
            self.results.values().cloned().collect(),
            self.active.best().cloned().map(Arc::new),
            self.alternates.clone(),
        ))
    }

    /* ---------- internals ---------- */

    fn reset(&mut self) {
        self.status = SearchStatus::NotStarted;
        self.frame = 0;
        self.active = ActiveList::new(self.semiring, 0);
        self.results.clear();
        self.alternates.clear();
        self.next_token_id = 0;
        self.stats = SearchStats::default();
        self.failed = false;
        self.stop.clear();
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_token_id;
        self.next_token_id += 1;
        id
    }

    fn fail(&mut self, failure: DecodeFailure) -> DecodeFailure {
        self.failed = true;
        self.scorer.stop();
        self.pruner.stop();
        error!(frame = self.frame, %failure, "decode failed");
        failure
    }

    fn finish(&mut self, status: SearchStatus) {
        self.status = status;
        self.scorer.stop();
        self.pruner.stop();
        info!(
            %status,
            frames = self.frame,
            finals = self.results.len(),
            tokens = self.stats.tokens_created,
            "search finished"
        );
    }

    fn grow(&mut self, sources: Vec<Token>) -> Result<ActiveList, GraphError> {
        let s = self.semiring;
        let word_threshold = self.word_beam.and_then(|beam| {
            sources
                .iter()
                .map(Token::score)
                .reduce(|a, b| if s.better(b, a) { b } else { a })
                .map(|best| s.times(best, beam))
        });
        let mut g = Growth {
            next: ActiveList::new(s, self.frame),
            best: IndexMap::new(),
            visiting: HashSet::new(),
            word_threshold,
        };
        for token in sources {
            self.expand(&Arc::new(token), &mut g)?;
        }
        self.results = g
            .best
            .into_iter()
            .filter(|(_, t)| t.is_final())
            .collect();
        Ok(g.next)
    }

    fn expand(&mut self, token: &Arc<Token>, g: &mut Growth) -> Result<(), GraphError> {
        let s = self.semiring;
        let arcs = self.graph.successors(token.state())?;
        self.stats.expansions += 1;
        g.visiting.insert(token.state().id);

        // compact chains keep the root, word ends and grammar states
        let keep = token.is_root() || token.is_word() || token.state().is_grammar();
        let predecessor = if self.keep_all_tokens || keep {
            Some(token.clone())
        } else {
            token.predecessor().cloned()
        };

        for arc in arcs.iter() {
            let score = s.times(token.score(), arc.weight(s));
            if score == s.zero() {
                continue;
            }
            let next = Token::new(
                self.next_id(),
                arc.state.clone(),
                score,
                s.times(token.acoustic(), arc.acoustic(s)),
                s.times(token.language(), arc.language),
                self.frame,
                predecessor.clone(),
            );
            self.stats.tokens_created += 1;

            if arc.state.is_emitting() {
                g.next.insert(next);
                continue;
            }
            if next.is_word() {
                self.stats.word_ends += 1;
                if g.word_threshold.is_some_and(|th| s.better(th, next.score())) {
                    self.stats.word_beam_pruned += 1;
                    continue;
                }
            }

            let next = Arc::new(next);
            let id = next.state().id;
            if let Some(resident) = g.best.get(&id).cloned() {
                if !s.better(next.score(), resident.score()) {
                    self.record_alternate(&resident, next);
                    continue;
                }
                self.promote(&next, resident);
            }
            g.best.insert(id, next.clone());
            if !g.visiting.contains(&id) {
                self.expand(&next, g)?;
            }
        }

        g.visiting.remove(&token.state().id);
        Ok(())
    }

    /// Remember `loser` as an alternative history of `winner`.
    fn record_alternate(&mut self, winner: &Arc<Token>, loser: Arc<Token>) {
        let boundary = loser.is_word() || loser.state().is_grammar();
        if self.max_alternates == 0 || !boundary {
            return;
        }
        let s = self.semiring;
        let list = self.alternates.entry(winner.id()).or_default();
        list.push(loser);
        if list.len() > self.max_alternates {
            let worst = list
                .iter()
                .enumerate()
                .fold(0, |w, (i, t)| if s.better(list[w].score(), t.score()) { i } else { w });
            list.swap_remove(worst);
        }
        self.stats.alternates += 1;
    }

    /// Forget the alternates of boundary tokens that no surviving
    /// hypothesis descends from.
    fn drop_dead_alternates(&mut self) {
        if self.alternates.is_empty() {
            return;
        }
        let mut live = HashSet::new();
        let mut stack: Vec<&Arc<Token>> = self
            .active
            .iter()
            .filter_map(Token::predecessor)
            .chain(self.results.values())
            .collect();
        while let Some(t) = stack.pop() {
            if !live.insert(t.id()) {
                continue;
            }
            if let Some(losers) = self.alternates.get(&t.id()) {
                stack.extend(losers);
            }
            stack.extend(t.predecessor());
        }
        let before = self.alternates.len();
        self.alternates.retain(|id, _| live.contains(id));
        trace!(
            frame = self.frame,
            dropped = before - self.alternates.len(),
            "alternates swept"
        );
    }

    /// `winner` displaced `resident`: it inherits the resident's alternates
    /// and the resident becomes one of them.
    fn promote(&mut self, winner: &Arc<Token>, resident: Arc<Token>) {
        if let Some(inherited) = self.alternates.remove(&resident.id()) {
            self.alternates
                .entry(winner.id())
                .or_default()
                .extend(inherited);
        }
        self.record_alternate(winner, resident);
    }
}
