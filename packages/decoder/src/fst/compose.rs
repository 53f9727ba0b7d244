//! Composition with an epsilon-sequencing filter.
//!
//! Filter state `0`: both automata may move. After `b` moves alone on an
//! input epsilon the filter goes to `1`, which forbids `a` from moving alone
//! on an output epsilon until a matched move resets it. This keeps exactly one
//! path per pair of epsilon interleavings.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::{Fst, Label, StateId};
use crate::{constants::EPSILON, error::FstError, semiring::Semiring};

type Triple = (StateId, StateId, u8);

/// `a ∘ b`. `b` must be input-sorted and both must share a semiring.
///
/// Labels are matched by symbol: `a`'s output symbols against `b`'s input
/// symbols. The result carries `a`'s input and `b`'s output tables and only
/// contains states reachable from the start pair.
pub fn compose(a: &Fst, b: &Fst) -> Result<Fst, FstError> {
    if a.semiring() != b.semiring() {
        return Err(FstError::structural(format!(
            "cannot compose {} with {} automaton",
            a.semiring(),
            b.semiring()
        )));
    }
    let s = a.semiring();
    let (Some(a_start), Some(b_start)) = (a.start(), b.start()) else {
        return Err(FstError::structural("compose operand has no start state"));
    };
    // fails early on an unsorted `b`
    b.find_arcs(b_start, EPSILON)?;

    // a.olabel -> b.ilabel
    let relabel: Vec<Option<Label>> = a
        .osyms()
        .iter()
        .map(|(_, sym)| b.isyms().label(sym))
        .collect();

    let mut out = Fst::new(s);
    out.isyms = a.isyms().clone();
    out.osyms = b.osyms().clone();

    let mut ids: HashMap<Triple, StateId> = HashMap::new();
    let mut queue = VecDeque::new();
    let mut intern = |t: Triple, out: &mut Fst, queue: &mut VecDeque<Triple>| -> StateId {
        *ids.entry(t).or_insert_with(|| {
            queue.push_back(t);
            out.add_state()
        })
    };

    let start = intern((a_start, b_start, 0), &mut out, &mut queue);
    out.set_start(start)?;

    while let Some(t @ (s1, s2, f)) = queue.pop_front() {
        let src = intern(t, &mut out, &mut queue);

        let fw = s.times(a.final_weight(s1), b.final_weight(s2));
        if fw != s.zero() {
            out.set_final(src, fw)?;
        }

        for x in a.arcs(s1) {
            if x.olabel == EPSILON {
                if f == 0 {
                    let dst = intern((x.nextstate, s2, 0), &mut out, &mut queue);
                    out.add_arc(src, x.ilabel, EPSILON, x.weight, dst)?;
                }
                continue;
            }
            let Some(Some(bl)) = relabel.get(x.olabel as usize) else {
                continue;
            };
            if *bl == EPSILON {
                continue;
            }
            for y in b.find_arcs(s2, *bl)? {
                let dst = intern((x.nextstate, y.nextstate, 0), &mut out, &mut queue);
                out.add_arc(src, x.ilabel, y.olabel, s.times(x.weight, y.weight), dst)?;
            }
        }
        for y in b.find_arcs(s2, EPSILON)? {
            let dst = intern((s1, y.nextstate, 1), &mut out, &mut queue);
            out.add_arc(src, EPSILON, y.olabel, y.weight, dst)?;
        }
    }

    debug!(
        states = out.num_states(),
        arcs = out.num_arcs(),
        "composed automata"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fst::ArcSort, semiring::SemiringKind};

    #[test]
    fn transduces_through_both_machines() {
        let a = Fst::from_text(SemiringKind::Tropical, "0 1 a x 1\n1 2 b y 2\n2\n").unwrap();
        let mut b =
            Fst::from_text(SemiringKind::Tropical, "0 1 x X 0.5\n1 2 y Y 0.5\n2 0.25\n").unwrap();
        b.arc_sort(ArcSort::Input);

        let c = compose(&a, &b).unwrap();
        assert_eq!(c.num_states(), 3);
        let s0 = c.start().unwrap();
        let arc = c.arcs(s0)[0];
        assert_eq!(c.isyms().symbol(arc.ilabel), Some("a"));
        assert_eq!(c.osyms().symbol(arc.olabel), Some("X"));
        assert_eq!(arc.weight, 1.5);
        let end = c.arcs(arc.nextstate)[0].nextstate;
        assert_eq!(c.final_weight(end), 0.25);
    }

    #[test]
    fn epsilons_do_not_duplicate_paths() {
        // a emits an output epsilon, b consumes an input epsilon: one
        // successful path, the filter blocks the other interleaving
        let a = Fst::from_text(SemiringKind::Tropical, "0 1 a <eps>\n1\n").unwrap();
        let mut b = Fst::from_text(SemiringKind::Tropical, "0 1 <eps> B\n1\n").unwrap();
        b.arc_sort(ArcSort::Input);

        let c = compose(&a, &b).unwrap();
        let finals = c.states().filter(|(id, _)| c.is_final(*id)).count();
        assert_eq!(finals, 1);
        // the b-first branch dead-ends
        assert_eq!(c.num_states(), 4);
        assert_eq!(c.num_arcs(), 3);
    }

    #[test]
    fn requires_sorted_right_operand() {
        let a = Fst::from_text(SemiringKind::Tropical, "0 1 a x\n1\n").unwrap();
        let b = Fst::from_text(SemiringKind::Tropical, "0 1 x X\n1\n").unwrap();
        assert!(matches!(compose(&a, &b), Err(FstError::Structural(_))));
    }

    #[test]
    fn semirings_must_match() {
        let a = Fst::from_text(SemiringKind::Tropical, "0 1 a x\n1\n").unwrap();
        let mut b = Fst::from_text(SemiringKind::Log, "0 1 x X\n1\n").unwrap();
        b.arc_sort(ArcSort::Input);
        assert!(compose(&a, &b).is_err());
    }
}
