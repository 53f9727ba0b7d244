//! End-to-end decodes over small grammars with Gaussian senones.

use std::{sync::Arc, thread};

use anyhow::Result;
use fluent_voice_decoder::{
    ActiveList, BeamPruner, ChannelFeatureSource, DecodeFailure, DecoderConfig,
    DiagonalGaussian, FstSearchGraph, GaussianObservationModel, GrammarExpr, Hmm,
    MemoryDictionary, MemoryUnitInventory, PosteriorOptions, PruneError, Pruner, SearchConfig,
    SearchManager, SearchStatus, Semiring, SemiringKind, SimpleAcousticScorer, VecFeatureSource,
    constants::WEIGHT_DELTA,
};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One single-state unit per word, emitting around the paired mean.
struct Toy {
    graph: Arc<FstSearchGraph>,
    model: Arc<GaussianObservationModel>,
}

fn toy(expr: GrammarExpr, words: &[(&str, f32)], semiring: SemiringKind) -> Result<Toy> {
    let mut dict = MemoryDictionary::new();
    let mut units = MemoryUnitInventory::new();
    let mut model = GaussianObservationModel::default();
    for (word, mean) in words {
        let senone = model.push(DiagonalGaussian::unit(vec![*mean]));
        dict.add(word, [*word]);
        units.insert(Hmm::left_to_right(*word, vec![senone], 0.5)?);
    }
    let graph = FstSearchGraph::new(
        Arc::new(expr.compile(semiring)?),
        Arc::new(dict),
        Arc::new(units),
        Default::default(),
    )?;
    Ok(Toy {
        graph: Arc::new(graph),
        model: Arc::new(model),
    })
}

fn manager(toy: &Toy, config: &DecoderConfig) -> Result<SearchManager> {
    Ok(SearchManager::from_config(
        toy.graph.clone(),
        toy.model.clone(),
        config,
    )?)
}

const NUMBERS: [(&str, f32); 3] = [("ONE", -2.0), ("TWO", 0.0), ("THREE", 2.0)];

fn numbers() -> GrammarExpr {
    GrammarExpr::alternatives(NUMBERS.map(|(w, _)| GrammarExpr::word(w)))
}

#[test]
fn picks_the_branch_the_features_match() -> Result<()> {
    init_tracing();
    let toy = toy(numbers(), &NUMBERS, SemiringKind::Tropical)?;
    let reachable = toy.graph.reachable_words();
    assert!(["ONE", "TWO", "THREE"].iter().all(|w| reachable.contains(*w)));

    let mut search = manager(&toy, &DecoderConfig::default())?;
    let frames = vec![vec![0.1], vec![-0.2], vec![0.05], vec![0.0], vec![0.1]];
    let result = search.decode(&mut VecFeatureSource::new(frames))?;

    assert_eq!(result.status(), SearchStatus::Completed);
    assert!(result.is_final());
    assert_eq!(result.text(), "TWO");
    let words = result.words();
    assert_eq!(words.len(), 1);
    assert_eq!((words[0].start_frame, words[0].end_frame), (0, 5));
    Ok(())
}

#[test]
fn zero_beam_is_greedy_but_completes() -> Result<()> {
    let seq = GrammarExpr::repeat(numbers());
    let toy = toy(seq, &NUMBERS, SemiringKind::Tropical)?;
    let config = DecoderConfig::default().with_beam(0.0);
    let mut search = manager(&toy, &config)?;

    let frames = [-2.0, -2.0, 0.0, 0.0, 2.0, 2.0].map(|x| vec![x]).to_vec();
    let mut source = VecFeatureSource::new(frames);
    search.start()?;
    while search.step(&mut source)? == SearchStatus::Running {
        assert!(search.stats().max_active >= 1);
    }
    assert_eq!(search.status(), SearchStatus::Completed);
    assert_eq!(search.stats().frames, 6);

    let result = search.result()?;
    assert!(result.best_token().is_some());
    assert!(!result.best_path().is_empty());
    Ok(())
}

/// Hands lists through `inner`, recording how many tokens survive.
struct Counting<P> {
    inner: P,
    kept: Arc<Mutex<Vec<usize>>>,
}

impl<P: Pruner> Pruner for Counting<P> {
    fn prune(&mut self, list: ActiveList) -> Result<ActiveList, PruneError> {
        let kept = self.inner.prune(list)?;
        self.kept.lock().push(kept.len());
        Ok(kept)
    }
}

#[test]
fn zero_beam_scores_a_single_token_per_frame() -> Result<()> {
    let toy = toy(GrammarExpr::repeat(numbers()), &NUMBERS, SemiringKind::Tropical)?;
    let kept = Arc::new(Mutex::new(Vec::new()));
    let pruner = Counting {
        inner: BeamPruner::from_cost(SemiringKind::Tropical, 0.0)?,
        kept: kept.clone(),
    };
    let mut search = SearchManager::new(
        toy.graph.clone(),
        Box::new(SimpleAcousticScorer::new(toy.model.clone())),
        Box::new(pruner),
        &SearchConfig::default(),
    );
    search.start()?;
    // the first list holds every entry point
    assert_eq!(search.active_list().len(), 3);

    let frames = [0.0, 0.3, -0.2, 2.1, 1.9, -2.0].map(|x| vec![x]).to_vec();
    let result = search.decode(&mut VecFeatureSource::new(frames))?;
    assert_eq!(*kept.lock(), vec![1; 6]);
    assert!(search.stats().max_active >= 3);
    assert!(!result.best_path().is_empty());
    Ok(())
}

#[test]
fn no_frames_completes_with_an_empty_path() -> Result<()> {
    let toy = toy(numbers(), &NUMBERS, SemiringKind::Tropical)?;
    let mut search = manager(&toy, &DecoderConfig::default())?;
    let result = search.decode(&mut VecFeatureSource::new(Vec::new()))?;
    assert_eq!(result.status(), SearchStatus::Completed);
    assert_eq!(result.frames(), 0);
    assert!(result.best_path().is_empty());
    assert!(!result.is_final());
    Ok(())
}

#[test]
fn stop_from_another_thread_lands_on_a_frame_boundary() -> Result<()> {
    let toy = toy(GrammarExpr::repeat(numbers()), &NUMBERS, SemiringKind::Tropical)?;
    let mut search = manager(&toy, &DecoderConfig::default())?;
    let (tx, mut source) = ChannelFeatureSource::channel(None);
    for _ in 0..3 {
        tx.send(vec![0.0])?;
    }

    search.start()?;
    for _ in 0..3 {
        assert_eq!(search.step(&mut source)?, SearchStatus::Running);
    }
    let handle = search.stop_handle();
    thread::spawn(move || handle.request_stop())
        .join()
        .expect("stop thread panicked");
    tx.send(vec![0.0])?;

    assert_eq!(search.step(&mut source)?, SearchStatus::Stopped);
    assert_eq!(search.frame(), 3);
    // further steps are no-ops
    assert_eq!(search.step(&mut source)?, SearchStatus::Stopped);
    assert_eq!(search.result()?.status(), SearchStatus::Stopped);
    Ok(())
}

#[test]
fn restart_clears_a_previous_stop() -> Result<()> {
    let toy = toy(numbers(), &NUMBERS, SemiringKind::Tropical)?;
    let mut search = manager(&toy, &DecoderConfig::default())?;
    search.stop_handle().request_stop();
    let result = search.decode(&mut VecFeatureSource::new(vec![vec![0.0]; 3]))?;
    assert_eq!(result.status(), SearchStatus::Completed);
    assert_eq!(result.text(), "TWO");
    Ok(())
}

#[test]
fn bad_features_fail_the_whole_decode() -> Result<()> {
    let toy = toy(numbers(), &NUMBERS, SemiringKind::Tropical)?;
    let mut search = manager(&toy, &DecoderConfig::default())?;
    let frames = vec![vec![0.0], vec![0.0, 1.0]];
    match search.decode(&mut VecFeatureSource::new(frames)) {
        Err(DecodeFailure::Scoring { frame, .. }) => assert_eq!(frame, 1),
        other => panic!("expected a scoring failure, got {other:?}"),
    }
    assert!(matches!(search.result(), Err(DecodeFailure::Aborted)));
    Ok(())
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_scoring_matches_sequential() -> Result<()> {
    // many words with three-state units keep the active list large
    let names: Vec<String> = (0..40).map(|i| format!("W{i:02}")).collect();
    let mut dict = MemoryDictionary::new();
    let mut units = MemoryUnitInventory::new();
    let mut model = GaussianObservationModel::default();
    for (i, name) in names.iter().enumerate() {
        let senones = (0..3)
            .map(|k| model.push(DiagonalGaussian::unit(vec![i as f32 * 0.1, k as f32])))
            .collect();
        dict.add(name, [name.as_str()]);
        units.insert(Hmm::left_to_right(name.as_str(), senones, 0.6)?);
    }
    let expr = GrammarExpr::repeat(GrammarExpr::alternatives(
        names.iter().map(|n| GrammarExpr::word(n.as_str())),
    ));
    let graph = Arc::new(FstSearchGraph::new(
        Arc::new(expr.compile(SemiringKind::Tropical)?),
        Arc::new(dict),
        Arc::new(units),
        Default::default(),
    )?);
    let model = Arc::new(model);
    let frames: Vec<Vec<f32>> = (0..30)
        .map(|t| vec![(t % 10) as f32 * 0.35, (t % 3) as f32])
        .collect();

    let decode = |threads: usize| -> Result<_> {
        let config = DecoderConfig::default().with_threads(threads);
        let mut search = SearchManager::from_config(graph.clone(), model.clone(), &config)?;
        let result = search.decode(&mut VecFeatureSource::new(frames.clone()))?;
        Ok((result.text(), result.score(), search.stats()))
    };
    let sequential = decode(1)?;
    let parallel = decode(4)?;
    assert!(sequential.2.max_active > 40);
    assert_eq!(sequential, parallel);
    Ok(())
}

#[test]
fn decoded_lattice_is_normalised_and_agrees_with_the_best_path() -> Result<()> {
    init_tracing();
    let words = [("LEFT", -1.0), ("RIGHT", 1.0)];
    let expr = GrammarExpr::repeat(GrammarExpr::alternatives(
        words.map(|(w, _)| GrammarExpr::word(w)),
    ));
    let toy = toy(expr, &words, SemiringKind::Log)?;
    let config = DecoderConfig::default().with_semiring(SemiringKind::Log);
    let mut search = manager(&toy, &config)?;
    let frames = [-1.0, -0.9, -1.1, 1.0, 0.8, 1.2, -1.0, -1.0]
        .map(|x| vec![x])
        .to_vec();
    let result = search.decode(&mut VecFeatureSource::new(frames))?;
    assert_eq!(result.text(), "LEFT RIGHT LEFT");

    let mut lattice = result.lattice()?;
    assert!(lattice.num_nodes() > 5, "alternates should widen the lattice");
    lattice.compute_posteriors(&PosteriorOptions::default())?;

    let s = lattice.posterior_semiring();
    let (initial, terminal) = (
        lattice.initial().expect("initial"),
        lattice.terminal().expect("terminal"),
    );
    assert!(s.approx_eq(lattice.posterior(initial)?, s.one(), WEIGHT_DELTA));
    assert!(s.approx_eq(lattice.posterior(terminal)?, s.one(), WEIGHT_DELTA));
    for p in lattice.posteriors()? {
        assert!(s.to_ln_probability(p) <= WEIGHT_DELTA);
    }

    let best = lattice.viterbi_path()?;
    assert_eq!(lattice.words_of(&best), result.best_path());
    let first = lattice
        .nbest(&PosteriorOptions::default())?
        .next()
        .expect("at least one path");
    assert_eq!(first.words, result.best_path());
    Ok(())
}

#[test]
fn tropical_decode_gives_probability_posteriors() -> Result<()> {
    let words = [("LEFT", -1.0), ("RIGHT", 1.0)];
    let expr = GrammarExpr::alternatives(words.map(|(w, _)| GrammarExpr::word(w)));
    let toy = toy(expr, &words, SemiringKind::Tropical)?;
    let search = &mut manager(&toy, &DecoderConfig::default())?;
    // halfway between the two means: neither word is preferred
    let result = search.decode(&mut VecFeatureSource::new(vec![vec![0.0]; 4]))?;

    let lattice = search.lattice(&result)?;
    assert_eq!(lattice.semiring(), SemiringKind::Tropical);
    assert_eq!(lattice.posterior_semiring(), SemiringKind::Log);
    let mut total = 0.0;
    for (word, _) in words {
        let node = lattice.find_node(word, 0, 4).expect("word node");
        let p = lattice.posterior_probability(node)?;
        assert!((p - 0.5).abs() < 1e-3, "{word}: {p}");
        total += p;
    }
    assert!((total - 1.0).abs() < 1e-3);
    Ok(())
}

#[test]
fn epsilon_loops_in_the_grammar_still_give_a_lattice() -> Result<()> {
    let words = [("LEFT", -1.0), ("RIGHT", 1.0)];
    // head -ε-> tail -ε-> head: a word-free cycle
    let expr = GrammarExpr::repeat(GrammarExpr::optional(GrammarExpr::alternatives(
        words.map(|(w, _)| GrammarExpr::word(w)),
    )));
    let toy = toy(expr, &words, SemiringKind::Log)?;
    let config = DecoderConfig::default().with_semiring(SemiringKind::Log);
    let mut search = manager(&toy, &config)?;
    let frames = [-1.0, -1.0, 1.0, 1.0].map(|x| vec![x]).to_vec();
    let result = search.decode(&mut VecFeatureSource::new(frames))?;
    assert_eq!(result.text(), "LEFT RIGHT");

    let mut lattice = result.lattice()?;
    lattice.compute_posteriors(&PosteriorOptions::default())?;
    let s = lattice.posterior_semiring();
    let terminal = lattice.terminal().expect("terminal");
    assert!(s.approx_eq(lattice.posterior(terminal)?, s.one(), WEIGHT_DELTA));
    Ok(())
}
