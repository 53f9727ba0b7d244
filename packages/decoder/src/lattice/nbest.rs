//! Lazy n-best enumeration.
//!
//! A* over the lattice with the exact cost-to-go as heuristic, so complete
//! paths come out best first and each `next()` only does the work needed
//! for one more path.

use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

use super::{Lattice, NodeId, PosteriorOptions};
use crate::{error::LatticeError, semiring::Semiring};

/// One complete path through the lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct NBestPath {
    /// Node ids from initial to terminal.
    pub nodes: Vec<NodeId>,
    /// Words without the sentence markers.
    pub words: Vec<Arc<str>>,
    /// Path cost (`-ln` of its weight).
    pub cost: f32,
}

impl NBestPath {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

struct Partial {
    estimate: f32,
    cost: f32,
    seq: u64,
    nodes: Vec<NodeId>,
}

impl PartialEq for Partial {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Partial {}

impl PartialOrd for Partial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Partial {
    /// Max-heap order: lowest estimate first, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct NBest<'a> {
    lattice: &'a Lattice,
    costs: Vec<f32>,
    to_go: Vec<f32>,
    terminal: NodeId,
    heap: BinaryHeap<Partial>,
    seq: u64,
}

impl std::fmt::Debug for NBest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NBest")
            .field("pending", &self.heap.len())
            .field("expanded", &self.seq)
            .finish()
    }
}

impl<'a> NBest<'a> {
    fn new(lattice: &'a Lattice, opts: &PosteriorOptions) -> Result<Self, LatticeError> {
        lattice.validate()?;
        let (Some(initial), Some(terminal)) = (lattice.initial, lattice.terminal) else {
            return Err(LatticeError::Empty);
        };
        let s = lattice.semiring;
        let order = lattice.topological_order()?;
        let costs: Vec<f32> = lattice
            .edges
            .iter()
            .map(|e| s.to_cost(lattice.edge_weight(e, opts)))
            .collect();

        let mut to_go = vec![f32::INFINITY; lattice.nodes.len()];
        to_go[terminal] = 0.0;
        for &n in order.iter().rev() {
            for &e in &lattice.nodes[n].outgoing {
                let c = costs[e] + to_go[lattice.edges[e].to];
                if c < to_go[n] {
                    to_go[n] = c;
                }
            }
        }

        let mut heap = BinaryHeap::new();
        if to_go[initial].is_finite() {
            heap.push(Partial {
                estimate: to_go[initial],
                cost: 0.0,
                seq: 0,
                nodes: vec![initial],
            });
        }
        Ok(Self {
            lattice,
            costs,
            to_go,
            terminal,
            heap,
            seq: 1,
        })
    }
}

impl Iterator for NBest<'_> {
    type Item = NBestPath;

    fn next(&mut self) -> Option<NBestPath> {
        while let Some(p) = self.heap.pop() {
            let last = *p.nodes.last()?;
            if last == self.terminal {
                return Some(NBestPath {
                    words: self.lattice.words_of(&p.nodes),
                    nodes: p.nodes,
                    cost: p.cost,
                });
            }
            for &e in &self.lattice.nodes[last].outgoing {
                let to = self.lattice.edges[e].to;
                if !self.to_go[to].is_finite() {
                    continue;
                }
                let cost = p.cost + self.costs[e];
                let mut nodes = p.nodes.clone();
                nodes.push(to);
                self.heap.push(Partial {
                    estimate: cost + self.to_go[to],
                    cost,
                    seq: self.seq,
                    nodes,
                });
                self.seq += 1;
            }
        }
        None
    }
}

impl Lattice {
    /// Complete paths, best first, evaluated lazily.
    pub fn nbest(&self, opts: &PosteriorOptions) -> Result<NBest<'_>, LatticeError> {
        NBest::new(self, opts)
    }
}
