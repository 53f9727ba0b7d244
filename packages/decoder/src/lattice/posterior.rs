//! Forward-backward over the lattice.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Lattice, LatticeEdge, NodeId};
use crate::{
    error::LatticeError,
    semiring::{Semiring, SemiringKind},
};

/// How edge weights are combined before the two passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosteriorOptions {
    /// Semiring the two passes run in. Edge weights are carried over through
    /// their log probabilities; `log` sums competing paths, `tropical` gives
    /// max-marginals.
    pub semiring: SemiringKind,
    /// Exponent on the language weight.
    pub lm_weight: f32,
    /// Exponent on the combined edge weight; values below 1 flatten the
    /// distribution.
    pub scale: f32,
    /// Ignore language weights entirely.
    pub acoustic_only: bool,
}

impl Default for PosteriorOptions {
    fn default() -> Self {
        Self {
            semiring: SemiringKind::Log,
            lm_weight: 1.0,
            scale: 1.0,
            acoustic_only: false,
        }
    }
}

impl PosteriorOptions {
    pub fn with_semiring(mut self, semiring: SemiringKind) -> Self {
        self.semiring = semiring;
        self
    }

    pub fn with_lm_weight(mut self, lm_weight: f32) -> Self {
        self.lm_weight = lm_weight;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_acoustic_only(mut self, acoustic_only: bool) -> Self {
        self.acoustic_only = acoustic_only;
        self
    }
}

impl Lattice {
    /// Weight of `edge` under `opts`.
    pub fn edge_weight(&self, edge: &LatticeEdge, opts: &PosteriorOptions) -> f32 {
        let s = self.semiring;
        let w = if opts.acoustic_only {
            edge.acoustic
        } else {
            s.times(edge.acoustic, s.power(edge.language, opts.lm_weight))
        };
        s.power(w, opts.scale)
    }

    /// Fill forward, backward and Viterbi scores of every node, in
    /// `opts.semiring`.
    pub fn compute_posteriors(&mut self, opts: &PosteriorOptions) -> Result<(), LatticeError> {
        self.validate()?;
        let (Some(initial), Some(terminal)) = (self.initial, self.terminal) else {
            return Err(LatticeError::Empty);
        };
        let order = self.topological_order()?;
        let (from, s) = (self.semiring, opts.semiring);
        let weights: Vec<f32> = self
            .edges
            .iter()
            .map(|e| convert(from, s, self.edge_weight(e, opts)))
            .collect();

        for n in &mut self.nodes {
            n.forward = s.zero();
            n.backward = s.zero();
            n.viterbi = s.zero();
            n.best_predecessor = None;
        }
        self.nodes[initial].forward = s.one();
        self.nodes[initial].viterbi = s.one();
        self.nodes[terminal].backward = s.one();

        for &n in &order {
            let (fwd, vit) = (self.nodes[n].forward, self.nodes[n].viterbi);
            for i in 0..self.nodes[n].outgoing.len() {
                let e = self.nodes[n].outgoing[i];
                let to = self.edges[e].to;
                let w = weights[e];
                let dst = &mut self.nodes[to];
                dst.forward = s.plus(dst.forward, s.times(fwd, w));
                let cand = s.times(vit, w);
                if s.better(cand, dst.viterbi) {
                    dst.viterbi = cand;
                    dst.best_predecessor = Some(n);
                }
            }
        }

        for &n in order.iter().rev() {
            let mut b = self.nodes[n].backward;
            for &e in &self.nodes[n].outgoing {
                let to = self.edges[e].to;
                b = s.plus(b, s.times(weights[e], self.nodes[to].backward));
            }
            self.nodes[n].backward = b;
        }

        let total = self.nodes[terminal].forward;
        if total == s.zero() {
            return Err(LatticeError::Empty);
        }
        self.posterior_semiring = s;
        self.has_posteriors = true;
        debug!(
            total,
            initial_backward = self.nodes[initial].backward,
            semiring = %s,
            "posteriors computed"
        );
        Ok(())
    }

    /// Semiring of the node scores and posteriors from the last pass.
    pub fn posterior_semiring(&self) -> SemiringKind {
        self.posterior_semiring
    }

    /// Total weight of all complete paths.
    pub fn total_weight(&self) -> Result<f32, LatticeError> {
        let terminal = self.computed_terminal()?;
        Ok(self.nodes[terminal].forward)
    }

    /// `(forward(n) ⊗ backward(n)) ⊘ forward(terminal)`.
    pub fn posterior(&self, node: NodeId) -> Result<f32, LatticeError> {
        let terminal = self.computed_terminal()?;
        let n = self.node(node).ok_or(LatticeError::MissingNode(node))?;
        let s = self.posterior_semiring;
        Ok(s.divide(s.times(n.forward, n.backward), self.nodes[terminal].forward))
    }

    /// Posterior of `node` as a linear probability.
    pub fn posterior_probability(&self, node: NodeId) -> Result<f32, LatticeError> {
        let w = self.posterior(node)?;
        Ok(self.posterior_semiring.to_ln_probability(w).exp())
    }

    /// Posterior of every node, by node id.
    pub fn posteriors(&self) -> Result<Vec<f32>, LatticeError> {
        (0..self.nodes.len()).map(|n| self.posterior(n)).collect()
    }

    /// Best node path from initial to terminal.
    pub fn viterbi_path(&self) -> Result<Vec<NodeId>, LatticeError> {
        let terminal = self.computed_terminal()?;
        let mut path = vec![terminal];
        let mut cur = terminal;
        while let Some(p) = self.nodes[cur].best_predecessor {
            path.push(p);
            cur = p;
        }
        if Some(cur) != self.initial {
            return Err(LatticeError::Empty);
        }
        path.reverse();
        Ok(path)
    }

    fn computed_terminal(&self) -> Result<NodeId, LatticeError> {
        if !self.has_posteriors {
            return Err(LatticeError::NoPosteriors);
        }
        self.terminal.ok_or(LatticeError::Empty)
    }
}

fn convert(from: SemiringKind, to: SemiringKind, w: f32) -> f32 {
    if from == to {
        w
    } else {
        to.from_ln_probability(from.to_ln_probability(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A→B 4, B→D 5, A→C 6, C→B 1, C→D 2.
    fn toy(s: SemiringKind, w: impl Fn(f32) -> f32) -> (Lattice, [NodeId; 4]) {
        let mut l = Lattice::new(s);
        let a = l.add_node("A", 0, 0);
        let b = l.add_node("B", 1, 2);
        let c = l.add_node("C", 0, 1);
        let d = l.add_node("D", 2, 3);
        let one = s.one();
        for (from, to, cost) in [(a, b, 4.0), (b, d, 5.0), (a, c, 6.0), (c, b, 1.0), (c, d, 2.0)] {
            l.add_edge(from, to, w(cost), one).unwrap();
        }
        l.set_initial(a).unwrap();
        l.set_terminal(d).unwrap();
        (l, [a, b, c, d])
    }

    #[test]
    fn posterior_needs_a_pass() {
        let (l, [a, ..]) = toy(SemiringKind::Probability, |c| c);
        assert!(matches!(l.posterior(a), Err(LatticeError::NoPosteriors)));
    }

    #[test]
    fn linear_posterior_matches_hand_count() {
        let s = SemiringKind::Probability;
        let (mut l, [a, b, c, d]) = toy(s, |c| c);
        l.compute_posteriors(&PosteriorOptions::default().with_semiring(s))
            .unwrap();
        // ABD = 20, ACBD = 30, ACD = 12
        assert!((l.total_weight().unwrap() - 62.0).abs() < 1e-3);
        assert!((l.posterior(b).unwrap() - 50.0 / 62.0).abs() < 1e-5);
        assert!((l.posterior(c).unwrap() - 42.0 / 62.0).abs() < 1e-5);
        assert!((l.posterior(a).unwrap() - 1.0).abs() < 1e-5);
        assert!((l.posterior(d).unwrap() - 1.0).abs() < 1e-5);
        // best path maximises the product: A C B D
        assert_eq!(l.viterbi_path().unwrap(), vec![a, c, b, d]);
    }

    #[test]
    fn tropical_viterbi_prefers_the_cheapest_path() {
        let s = SemiringKind::Tropical;
        let (mut l, [a, _b, c, d]) = toy(s, |c| c);
        l.compute_posteriors(&PosteriorOptions::default()).unwrap();
        assert_eq!(l.viterbi_path().unwrap(), vec![a, c, d]);
        assert_eq!(l.nodes()[d].viterbi(), 8.0);
    }

    #[test]
    fn tropical_lattice_sums_in_log_by_default() {
        let s = SemiringKind::Tropical;
        let (mut l, [a, b, c, d]) = toy(s, |c| c);
        l.compute_posteriors(&PosteriorOptions::default()).unwrap();
        assert_eq!(l.posterior_semiring(), SemiringKind::Log);
        let (abd, acbd, acd) = ((-9.0f32).exp(), (-12.0f32).exp(), (-8.0f32).exp());
        let total = abd + acbd + acd;
        assert!((l.posterior_probability(b).unwrap() - (abd + acbd) / total).abs() < 1e-4);
        assert!((l.posterior_probability(c).unwrap() - (acbd + acd) / total).abs() < 1e-4);
        assert!((l.posterior_probability(a).unwrap() - 1.0).abs() < 1e-4);
        assert_eq!(l.viterbi_path().unwrap(), vec![a, c, d]);

        // max-marginals on request: both B and C lie on some path, only C on the best
        l.compute_posteriors(&PosteriorOptions::default().with_semiring(s))
            .unwrap();
        assert_eq!(l.posterior(c).unwrap(), 0.0);
        assert_eq!(l.posterior(b).unwrap(), 1.0);
    }

    #[test]
    fn scale_flattens_log_posteriors() {
        let s = SemiringKind::Log;
        let (mut l, [_, b, ..]) = toy(s, |c| c);
        l.compute_posteriors(&PosteriorOptions::default()).unwrap();
        let sharp = s.to_ln_probability(l.posterior(b).unwrap()).exp();
        l.compute_posteriors(&PosteriorOptions::default().with_scale(0.0)).unwrap();
        let flat = s.to_ln_probability(l.posterior(b).unwrap()).exp();
        // every path weighs one(); B lies on two of three
        assert!((flat - 2.0 / 3.0).abs() < 1e-4);
        assert!(sharp < flat);
    }

    #[test]
    fn language_weight_only_touches_language() {
        let s = SemiringKind::Tropical;
        let mut l = Lattice::new(s);
        let a = l.add_node("A", 0, 0);
        let b = l.add_node("B", 0, 1);
        let e = l.add_edge(a, b, 2.0, 3.0).unwrap();
        let edge = *l.edge(e).unwrap();
        assert_eq!(l.edge_weight(&edge, &PosteriorOptions::default()), 5.0);
        assert_eq!(
            l.edge_weight(&edge, &PosteriorOptions::default().with_lm_weight(2.0)),
            8.0
        );
        assert_eq!(
            l.edge_weight(&edge, &PosteriorOptions::default().with_acoustic_only(true)),
            2.0
        );
    }
}
