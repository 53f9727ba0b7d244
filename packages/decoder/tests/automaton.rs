//! Semiring laws and weighted-automaton behaviour through the public API.

use anyhow::Result;
use fluent_voice_decoder::{
    ArcSort, Fst, FstError, GrammarExpr, Semiring, SemiringKind, compose, constants::WEIGHT_DELTA,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const ALL: [SemiringKind; 3] = [
    SemiringKind::Tropical,
    SemiringKind::Log,
    SemiringKind::Probability,
];

fn random_weight(s: SemiringKind, rng: &mut StdRng) -> f32 {
    s.from_probability(rng.random_range(0.001f32..1.0))
}

#[test]
fn identities_hold_for_random_weights() {
    let mut rng = StdRng::seed_from_u64(7);
    for s in ALL {
        for _ in 0..500 {
            let x = random_weight(s, &mut rng);
            assert!(s.approx_eq(s.plus(s.zero(), x), x, WEIGHT_DELTA), "{s}: 0 ⊕ {x}");
            assert!(s.approx_eq(s.times(s.one(), x), x, WEIGHT_DELTA), "{s}: 1 ⊗ {x}");
            assert_eq!(s.times(s.zero(), x), s.zero(), "{s}: 0 ⊗ {x}");
            assert!(!s.times(s.zero(), x).is_nan());
        }
    }
}

#[test]
fn plus_and_times_commute_and_associate() {
    let mut rng = StdRng::seed_from_u64(11);
    for s in ALL {
        for _ in 0..200 {
            let (a, b, c) = (
                random_weight(s, &mut rng),
                random_weight(s, &mut rng),
                random_weight(s, &mut rng),
            );
            assert!(s.approx_eq(s.plus(a, b), s.plus(b, a), WEIGHT_DELTA));
            assert!(s.approx_eq(s.times(a, b), s.times(b, a), WEIGHT_DELTA));
            assert!(s.approx_eq(
                s.plus(s.plus(a, b), c),
                s.plus(a, s.plus(b, c)),
                WEIGHT_DELTA
            ));
            // a ⊗ b ⊘ b == a
            assert!(s.approx_eq(s.divide(s.times(a, b), b), a, 1e-3));
        }
    }
}

#[test]
fn better_agrees_with_probability_order() {
    for s in ALL {
        let likely = s.from_probability(0.9);
        let unlikely = s.from_probability(0.1);
        assert!(s.better(likely, unlikely), "{s}");
        assert!(!s.better(unlikely, likely), "{s}");
        assert!(!s.better(likely, likely), "{s}");
    }
}

const HELLO: &str = "\
# greeting grammar
0 1 HELLO HELLO 0.5
1 2 WORLD WORLD
1 2 THERE THERE 1.25
2
";

#[test]
fn text_round_trip_is_structural_identity() -> Result<()> {
    let fst = Fst::from_text(SemiringKind::Tropical, HELLO)?;
    assert_eq!(fst.num_states(), 3);
    assert_eq!(fst.num_arcs(), 3);
    assert_eq!(fst.start(), Some(0));
    assert!(fst.is_final(2));

    let again = Fst::from_text(SemiringKind::Tropical, &fst.to_text()?)?;
    assert!(fst.structurally_eq(&again, WEIGHT_DELTA));
    Ok(())
}

#[test]
fn cbor_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hello.fst");
    let mut fst = Fst::from_text(SemiringKind::Log, HELLO)?;
    fst.arc_sort(ArcSort::Input);
    fst.save_to_file(&path)?;

    let loaded = Fst::load_from_file(&path)?;
    assert!(fst.structurally_eq(&loaded, 0.0));
    assert_eq!(loaded.semiring(), SemiringKind::Log);
    assert_eq!(loaded.arc_sort_order(), Some(ArcSort::Input));
    // no temp file is left behind
    assert!(!path.with_extension("tmp").exists());
    Ok(())
}

#[test]
fn text_errors_carry_line_numbers() {
    let bad_weight = "0 1 A A 0.5\n1 2 B B heavy\n2\n";
    match Fst::from_text(SemiringKind::Tropical, bad_weight) {
        Err(FstError::Format { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a format error, got {other:?}"),
    }

    let bad_arity = "0 1 A\n1\n";
    assert!(matches!(
        Fst::from_text(SemiringKind::Tropical, bad_arity),
        Err(FstError::Format { line: 1, .. })
    ));

    let dangling = "0 1 A A\n0 7 B B\n1\n";
    assert!(matches!(
        Fst::from_text(SemiringKind::Tropical, dangling),
        Err(FstError::Structural(_))
    ));

    let no_final = "0 1 A A\n";
    assert!(matches!(
        Fst::from_text(SemiringKind::Tropical, no_final),
        Err(FstError::Structural(_))
    ));
}

#[test]
fn arc_sort_is_idempotent_and_enables_lookup() -> Result<()> {
    let mut fst = Fst::new(SemiringKind::Tropical);
    let (a, b) = (fst.add_state(), fst.add_state());
    fst.set_start(a)?;
    fst.set_final(b, 0.0)?;
    for w in ["ZULU", "ALPHA", "MIKE", "ALPHA"] {
        fst.add_symbol_arc(a, w, w, 1.0, b)?;
    }
    assert!(fst.find_arcs(a, 1).is_err());

    fst.arc_sort(ArcSort::Input);
    let once = fst.clone();
    fst.arc_sort(ArcSort::Input);
    assert!(once.structurally_eq(&fst, 0.0));
    assert!(fst.is_arc_sorted(ArcSort::Input));

    let alpha = fst.isyms().label("ALPHA").expect("interned");
    assert_eq!(fst.find_arcs(a, alpha)?.len(), 2);

    // adding an arc drops the recorded order
    fst.add_symbol_arc(a, "BRAVO", "BRAVO", 1.0, b)?;
    assert_eq!(fst.arc_sort_order(), None);
    Ok(())
}

#[test]
fn compose_maps_words_through_a_transducer() -> Result<()> {
    let s = SemiringKind::Tropical;
    let grammar = GrammarExpr::sequence(["TURN", "LEFT"].map(GrammarExpr::word)).compile(s)?;
    let mut rewrite = Fst::from_text(s, "0 0 TURN ROTATE 0.5\n0 0 LEFT PORT 0.25\n0\n")?;
    rewrite.arc_sort(ArcSort::Input);

    let out = compose(&grammar, &rewrite)?;
    out.validate()?;
    let words = out.reachable_words();
    assert!(words.contains("ROTATE") && words.contains("PORT"));
    assert_eq!(words.len(), 2);

    // total path weight is the sum of the rewrite weights
    let mut state = out.start().expect("start");
    let mut total = 0.0;
    while let Some(arc) = out.arcs(state).first() {
        total += arc.weight;
        state = arc.nextstate;
    }
    assert!(out.is_final(state));
    assert!((total - 0.75).abs() < 1e-6);
    Ok(())
}
