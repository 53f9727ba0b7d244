//! Lattice compaction.
//!
//! [`Lattice::optimize`] folds together word nodes that can stand in for each
//! other, [`Lattice::remove_fillers`] cuts filler words out and bridges their
//! neighbours.

use std::{collections::BTreeSet, mem};

use tracing::debug;

use super::{Lattice, LatticeEdge, NodeId};
use crate::{error::LatticeError, semiring::Semiring};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Siblings with the same word and the same predecessors.
    Forward,
    /// Siblings with the same word and the same successors.
    Backward,
}

impl Lattice {
    /// Merge interchangeable word nodes until nothing changes: first nodes
    /// with the same word entered from the same predecessors, then nodes
    /// with the same word leaving to the same successors. Parallel edges
    /// keep the better weight and the surviving node keeps its own frames.
    ///
    /// Returns the number of nodes merged away.
    pub fn optimize(&mut self) -> Result<usize, LatticeError> {
        self.validate()?;
        let before = self.nodes.len();
        for pass in [Pass::Forward, Pass::Backward] {
            while let Some((keep, gone)) = self.mergeable(pass) {
                self.merge_into(keep, gone)?;
            }
        }
        let merged = before - self.nodes.len();
        debug!(
            merged,
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "lattice optimised"
        );
        Ok(merged)
    }

    /// Remove every node whose word is in `fillers`, connecting each of its
    /// predecessors to each of its successors with the product of the two
    /// edges. Returns the number of nodes removed.
    pub fn remove_fillers<S: AsRef<str>>(&mut self, fillers: &[S]) -> Result<usize, LatticeError> {
        self.validate()?;
        let s = self.semiring;
        let mut removed = 0;
        loop {
            let order = self.topological_order()?;
            let Some(n) = order.into_iter().find(|&n| {
                !self.is_endpoint(n) && fillers.iter().any(|f| f.as_ref() == &*self.nodes[n].word)
            }) else {
                break;
            };

            let mut bridges = Vec::new();
            for &i in &self.nodes[n].incoming {
                for &o in &self.nodes[n].outgoing {
                    let (ein, eout) = (self.edges[i], self.edges[o]);
                    bridges.push((
                        ein.from,
                        eout.to,
                        s.times(ein.acoustic, eout.acoustic),
                        s.times(ein.language, eout.language),
                    ));
                }
            }
            for (from, to, acoustic, language) in bridges {
                self.add_edge(from, to, acoustic, language)?;
            }
            self.remove_node(n);
            removed += 1;
        }
        debug!(removed, nodes = self.nodes.len(), "fillers removed");
        Ok(removed)
    }

    fn is_endpoint(&self, n: NodeId) -> bool {
        Some(n) == self.initial || Some(n) == self.terminal
    }

    fn predecessors(&self, n: NodeId) -> BTreeSet<NodeId> {
        self.nodes[n].incoming.iter().map(|&e| self.edges[e].from).collect()
    }

    fn successors(&self, n: NodeId) -> BTreeSet<NodeId> {
        self.nodes[n].outgoing.iter().map(|&e| self.edges[e].to).collect()
    }

    /// First pair of sibling nodes `pass` may merge, lower id first.
    fn mergeable(&self, pass: Pass) -> Option<(NodeId, NodeId)> {
        for n in 0..self.nodes.len() {
            let siblings: Vec<NodeId> = match pass {
                Pass::Forward => self.successors(n),
                Pass::Backward => self.predecessors(n),
            }
            .into_iter()
            .filter(|&m| !self.is_endpoint(m))
            .collect();

            for (j, &a) in siblings.iter().enumerate() {
                for &b in &siblings[j + 1..] {
                    if self.nodes[a].word != self.nodes[b].word {
                        continue;
                    }
                    let same = match pass {
                        Pass::Forward => self.predecessors(a) == self.predecessors(b),
                        Pass::Backward => self.successors(a) == self.successors(b),
                    };
                    if same {
                        return Some((a, b));
                    }
                }
            }
        }
        None
    }

    /// Move every edge of `gone` onto `keep`, then delete `gone`.
    fn merge_into(&mut self, keep: NodeId, gone: NodeId) -> Result<(), LatticeError> {
        let moved: Vec<LatticeEdge> = self.nodes[gone]
            .incoming
            .iter()
            .chain(&self.nodes[gone].outgoing)
            .map(|&e| self.edges[e])
            .collect();
        for e in moved {
            let from = if e.from == gone { keep } else { e.from };
            let to = if e.to == gone { keep } else { e.to };
            self.add_edge(from, to, e.acoustic, e.language)?;
        }
        self.remove_node(gone);
        Ok(())
    }

    /// Delete `gone` and its edges; higher node and edge ids shift down.
    fn remove_node(&mut self, gone: NodeId) {
        let remap = |n: NodeId| if n > gone { n - 1 } else { n };
        let nodes = mem::take(&mut self.nodes);
        let edges = mem::take(&mut self.edges);
        self.node_index.clear();
        self.edge_index.clear();

        for (id, mut node) in nodes.into_iter().enumerate() {
            if id == gone {
                continue;
            }
            node.incoming.clear();
            node.outgoing.clear();
            self.node_index
                .insert((node.word.clone(), node.start, node.end), self.nodes.len());
            self.nodes.push(node);
        }
        for e in edges {
            if e.from == gone || e.to == gone {
                continue;
            }
            let (from, to) = (remap(e.from), remap(e.to));
            let id = self.edges.len();
            self.edge_index.insert((from, to), id);
            self.nodes[from].outgoing.push(id);
            self.nodes[to].incoming.push(id);
            self.edges.push(LatticeEdge { from, to, ..e });
        }
        self.initial = self.initial.filter(|&n| n != gone).map(remap);
        self.terminal = self.terminal.filter(|&n| n != gone).map(remap);
        self.has_posteriors = false;
    }
}
