//! Beam pruning properties over random active lists.

use std::sync::Arc;

use anyhow::Result;
use fluent_voice_decoder::{
    ActiveList, BeamPruner, NullPruner, Pruner, SearchState, SearchStateId, Semiring,
    SemiringKind, Token,
    graph::{StateKey, StateLabel},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_list(s: SemiringKind, rng: &mut StdRng, n: u32) -> ActiveList {
    let mut list = ActiveList::new(s, 0);
    for i in 0..n {
        let state = Arc::new(SearchState {
            id: SearchStateId(i),
            key: StateKey::Grammar(i as usize),
            label: StateLabel::Grammar,
        });
        let w = s.from_ln_probability(-rng.random_range(0.0f32..30.0));
        list.insert(Token::new(u64::from(i), state, w, w, s.one(), 0, None));
    }
    list
}

const ALL: [SemiringKind; 3] = [
    SemiringKind::Tropical,
    SemiringKind::Log,
    SemiringKind::Probability,
];

#[test]
fn beam_never_drops_the_best_token() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    for s in ALL {
        for round in 0..50 {
            let list = random_list(s, &mut rng, 1 + round % 20);
            let best = list.best().map(Token::id);
            let cost = rng.random_range(0.0f32..10.0);
            let mut pruner = BeamPruner::from_cost(s, cost)?.with_max_active(Some(3));
            let kept = pruner.prune(list)?;
            assert!(!kept.is_empty());
            assert!(kept.len() <= 3);
            assert_eq!(kept.best().map(Token::id), best, "{s} round {round}");
        }
    }
    Ok(())
}

#[test]
fn infinite_beam_and_null_pruner_keep_everything() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    for s in ALL {
        let list = random_list(s, &mut rng, 25);
        let ids: Vec<u64> = list.iter().map(Token::id).collect();

        let mut beam = BeamPruner::from_cost(s, f32::INFINITY)?;
        let kept = beam.prune(list.clone())?;
        assert_eq!(kept.iter().map(Token::id).collect::<Vec<_>>(), ids);

        let kept = NullPruner.prune(list)?;
        assert_eq!(kept.len(), ids.len());
    }
    Ok(())
}

#[test]
fn zero_beam_collapses_to_one() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(9);
    for s in ALL {
        let list = random_list(s, &mut rng, 40);
        let best = list.best().map(Token::id);
        let kept = BeamPruner::from_cost(s, 0.0)?.prune(list)?;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.best().map(Token::id), best);
    }
    Ok(())
}
