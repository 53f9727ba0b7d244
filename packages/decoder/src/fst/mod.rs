//! Weighted finite-state automaton.
//!
//! States are dense indices into a `Vec`; every arc carries an input label,
//! an output label, a weight in the automaton's semiring and a destination.
//! Arc order is an explicit property ([`Fst::arc_sort_order`]): mutation drops
//! it, [`Fst::arc_sort`] records it, [`Fst::find_arcs`] requires it.

use std::{
    cmp::Ordering,
    collections::{BTreeSet, VecDeque},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::EPSILON,
    error::FstError,
    semiring::{Semiring, SemiringKind},
};

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod compose;
pub mod grammar;
pub mod io;
pub mod symbols;
pub mod text;

pub use compose::compose;
pub use grammar::GrammarExpr;
pub use symbols::SymbolTable;

/* ─────────────────────────── primitives ──────────────────────────────── */

pub type StateId = usize;
pub type Label = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FstArc {
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: f32,
    pub nextstate: StateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FstState {
    arcs: Vec<FstArc>,
    final_weight: f32,
}

impl FstState {
    fn new(zero: f32) -> Self {
        Self {
            arcs: Vec::new(),
            final_weight: zero,
        }
    }

    pub fn arcs(&self) -> &[FstArc] {
        &self.arcs
    }

    pub fn final_weight(&self) -> f32 {
        self.final_weight
    }
}

/// Recorded arc order of every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcSort {
    /// By input label, then output label.
    Input,
    /// By output label, then input label.
    Output,
}

impl ArcSort {
    fn compare(self, a: &FstArc, b: &FstArc) -> Ordering {
        match self {
            Self::Input => (a.ilabel, a.olabel).cmp(&(b.ilabel, b.olabel)),
            Self::Output => (a.olabel, a.ilabel).cmp(&(b.olabel, b.ilabel)),
        }
    }
}

/* ───────────────────────────── automaton ─────────────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fst {
    semiring: SemiringKind,
    start: Option<StateId>,
    states: Vec<FstState>,
    isyms: SymbolTable,
    osyms: SymbolTable,
    sorted: Option<ArcSort>,
}

impl Fst {
    pub fn new(semiring: SemiringKind) -> Self {
        Self {
            semiring,
            start: None,
            states: Vec::new(),
            isyms: SymbolTable::new(),
            osyms: SymbolTable::new(),
            sorted: None,
        }
    }

    /* ---------- accessors ---------- */

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    pub fn state(&self, s: StateId) -> Option<&FstState> {
        self.states.get(s)
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &FstState)> {
        self.states.iter().enumerate()
    }

    /// Outgoing arcs of `s` (empty for unknown states).
    pub fn arcs(&self, s: StateId) -> &[FstArc] {
        self.states.get(s).map_or(&[][..], |st| st.arcs.as_slice())
    }

    /// Final weight of `s`; `zero()` when not accepting or unknown.
    pub fn final_weight(&self, s: StateId) -> f32 {
        self.states
            .get(s)
            .map_or(self.semiring.zero(), |st| st.final_weight)
    }

    pub fn is_final(&self, s: StateId) -> bool {
        self.final_weight(s) != self.semiring.zero()
    }

    pub fn isyms(&self) -> &SymbolTable {
        &self.isyms
    }

    pub fn osyms(&self) -> &SymbolTable {
        &self.osyms
    }

    pub fn isyms_mut(&mut self) -> &mut SymbolTable {
        &mut self.isyms
    }

    pub fn osyms_mut(&mut self) -> &mut SymbolTable {
        &mut self.osyms
    }

    /* ---------- construction ---------- */

    pub fn add_state(&mut self) -> StateId {
        self.states.push(FstState::new(self.semiring.zero()));
        self.states.len() - 1
    }

    pub fn set_start(&mut self, s: StateId) -> Result<(), FstError> {
        self.check_state(s)?;
        self.start = Some(s);
        Ok(())
    }

    pub fn set_final(&mut self, s: StateId, weight: f32) -> Result<(), FstError> {
        self.check_weight(weight)?;
        self.check_state(s)?;
        self.states[s].final_weight = weight;
        Ok(())
    }

    pub fn add_arc(
        &mut self,
        s: StateId,
        ilabel: Label,
        olabel: Label,
        weight: f32,
        nextstate: StateId,
    ) -> Result<(), FstError> {
        self.check_weight(weight)?;
        self.check_state(s)?;
        self.check_state(nextstate)?;
        self.states[s].arcs.push(FstArc {
            ilabel,
            olabel,
            weight,
            nextstate,
        });
        self.sorted = None;
        Ok(())
    }

    /// Add an arc whose labels are given as symbols (interned on the fly).
    pub fn add_symbol_arc(
        &mut self,
        s: StateId,
        isym: &str,
        osym: &str,
        weight: f32,
        nextstate: StateId,
    ) -> Result<(), FstError> {
        let ilabel = self.isyms.intern(isym);
        let olabel = self.osyms.intern(osym);
        self.add_arc(s, ilabel, olabel, weight, nextstate)
    }

    /// Remove `s`, every arc entering it, and renumber the states above it.
    pub fn delete_state(&mut self, s: StateId) -> Result<(), FstError> {
        self.check_state(s)?;
        self.states.remove(s);
        for st in &mut self.states {
            st.arcs.retain(|a| a.nextstate != s);
            for a in &mut st.arcs {
                if a.nextstate > s {
                    a.nextstate -= 1;
                }
            }
        }
        self.start = match self.start {
            Some(st) if st == s => None,
            Some(st) if st > s => Some(st - 1),
            other => other,
        };
        Ok(())
    }

    /* ---------- arc order ---------- */

    /// Stable sort of every state's arcs; records the order.
    pub fn arc_sort(&mut self, order: ArcSort) {
        for st in &mut self.states {
            st.arcs.sort_by(|a, b| order.compare(a, b));
        }
        self.sorted = Some(order);
    }

    /// Stable sort with a caller comparator. No order property is recorded.
    pub fn arc_sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&FstArc, &FstArc) -> Ordering,
    {
        for st in &mut self.states {
            st.arcs.sort_by(&mut cmp);
        }
        self.sorted = None;
    }

    pub fn arc_sort_order(&self) -> Option<ArcSort> {
        self.sorted
    }

    /// Check the arcs really are in `order` (ignores the recorded property).
    pub fn is_arc_sorted(&self, order: ArcSort) -> bool {
        self.states.iter().all(|st| {
            st.arcs
                .windows(2)
                .all(|w| order.compare(&w[0], &w[1]) != Ordering::Greater)
        })
    }

    /// All arcs of `s` with input label `ilabel`, by binary search.
    pub fn find_arcs(&self, s: StateId, ilabel: Label) -> Result<&[FstArc], FstError> {
        if self.sorted != Some(ArcSort::Input) {
            return Err(FstError::structural(
                "find_arcs requires an input-sorted automaton",
            ));
        }
        let arcs = self.arcs(s);
        let lo = arcs.partition_point(|a| a.ilabel < ilabel);
        let hi = lo + arcs[lo..].partition_point(|a| a.ilabel == ilabel);
        Ok(&arcs[lo..hi])
    }

    /* ---------- checks ---------- */

    /// Structural validation run after every load.
    pub fn validate(&self) -> Result<(), FstError> {
        let start = self
            .start
            .ok_or_else(|| FstError::structural("no start state"))?;
        self.check_state(start)?;

        let mut any_final = false;
        for (id, st) in self.states.iter().enumerate() {
            self.check_weight(st.final_weight)?;
            any_final |= st.final_weight != self.semiring.zero();
            for a in &st.arcs {
                self.check_weight(a.weight)?;
                if a.nextstate >= self.states.len() {
                    return Err(FstError::structural(format!(
                        "arc from state {id} targets undefined state {}",
                        a.nextstate
                    )));
                }
            }
        }
        if !any_final {
            return Err(FstError::structural("no final state"));
        }
        if let Some(order) = self.sorted {
            if !self.is_arc_sorted(order) {
                return Err(FstError::structural(format!(
                    "arcs are not sorted by {order:?} as recorded"
                )));
            }
        }
        Ok(())
    }

    /// Same states, same arcs in the same order, weights within `delta`.
    pub fn structurally_eq(&self, other: &Fst, delta: f32) -> bool {
        let s = self.semiring;
        self.semiring == other.semiring
            && self.start == other.start
            && self.sorted == other.sorted
            && self.isyms == other.isyms
            && self.osyms == other.osyms
            && self.states.len() == other.states.len()
            && self.states.iter().zip(&other.states).all(|(a, b)| {
                s.approx_eq(a.final_weight, b.final_weight, delta)
                    && a.arcs.len() == b.arcs.len()
                    && a.arcs.iter().zip(&b.arcs).all(|(x, y)| {
                        x.ilabel == y.ilabel
                            && x.olabel == y.olabel
                            && x.nextstate == y.nextstate
                            && s.approx_eq(x.weight, y.weight, delta)
                    })
            })
    }

    /* ---------- traversal ---------- */

    /// `accessible[s]` is true when `s` is reachable from the start state.
    pub fn accessible_states(&self) -> Vec<bool> {
        let mut seen = vec![false; self.states.len()];
        let Some(start) = self.start.filter(|&s| s < self.states.len()) else {
            return seen;
        };
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        while let Some(s) = queue.pop_front() {
            for a in &self.states[s].arcs {
                if !seen[a.nextstate] {
                    seen[a.nextstate] = true;
                    queue.push_back(a.nextstate);
                }
            }
        }
        seen
    }

    /// Output words on arcs reachable from the start state.
    pub fn reachable_words(&self) -> BTreeSet<String> {
        let seen = self.accessible_states();
        let words: BTreeSet<String> = self
            .states
            .iter()
            .enumerate()
            .filter(|(id, _)| seen[*id])
            .flat_map(|(_, st)| st.arcs.iter())
            .filter(|a| a.olabel != EPSILON)
            .filter_map(|a| self.osyms.symbol(a.olabel).map(str::to_owned))
            .collect();
        debug!(count = words.len(), "collected reachable words");
        words
    }

    /* ---------- helpers ---------- */

    fn check_state(&self, s: StateId) -> Result<(), FstError> {
        if s < self.states.len() {
            Ok(())
        } else {
            Err(FstError::structural(format!("state {s} does not exist")))
        }
    }

    fn check_weight(&self, w: f32) -> Result<(), FstError> {
        if self.semiring.is_member(w) {
            Ok(())
        } else {
            Err(FstError::structural(format!(
                "weight {w} is not a member of the {} semiring",
                self.semiring
            )))
        }
    }
}

/* ───────────────────────────── tests ──────────────────────────────── */
