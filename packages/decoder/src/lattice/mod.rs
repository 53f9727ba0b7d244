//! Word lattice.
//!
//! A DAG of word hypotheses between a `<s>` initial node and a `</s>`
//! terminal node. Nodes are unique per (word, start frame, end frame);
//! edges are unique per (from, to) and keep the better weight when the same
//! connection is seen twice.
//!
//! ```text
//!          ┌──▶ LEFT(0,3) ──┐
//! <s>(0,0) ┤                ├──▶ RIGHT(3,7) ──▶ </s>(7,7)
//!          └──▶ LIFT(0,3) ──┘
//! ```

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use tracing::{debug, instrument};

use crate::{
    constants::{SENTENCE_END, SENTENCE_START},
    error::LatticeError,
    search::{DecodeResult, Token},
    semiring::{Semiring, SemiringKind},
};

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod nbest;
pub mod optimize;
pub mod posterior;
pub mod slf;

pub use nbest::{NBest, NBestPath};
pub use posterior::PosteriorOptions;

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct LatticeNode {
    word: Arc<str>,
    start: usize,
    end: usize,
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
    forward: f32,
    backward: f32,
    viterbi: f32,
    best_predecessor: Option<NodeId>,
}

impl LatticeNode {
    pub fn word(&self) -> &Arc<str> {
        &self.word
    }

    pub fn start_frame(&self) -> usize {
        self.start
    }

    pub fn end_frame(&self) -> usize {
        self.end
    }

    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    /// Total weight of all paths from the initial node (after
    /// [`Lattice::compute_posteriors`], in [`Lattice::posterior_semiring`]).
    pub fn forward(&self) -> f32 {
        self.forward
    }

    /// Total weight of all paths to the terminal node.
    pub fn backward(&self) -> f32 {
        self.backward
    }

    /// Weight of the best path from the initial node.
    pub fn viterbi(&self) -> f32 {
        self.viterbi
    }

    pub fn best_predecessor(&self) -> Option<NodeId> {
        self.best_predecessor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub acoustic: f32,
    pub language: f32,
}

#[derive(Debug, Clone)]
pub struct Lattice {
    semiring: SemiringKind,
    frames: usize,
    nodes: Vec<LatticeNode>,
    edges: Vec<LatticeEdge>,
    node_index: HashMap<(Arc<str>, usize, usize), NodeId>,
    edge_index: HashMap<(NodeId, NodeId), EdgeId>,
    initial: Option<NodeId>,
    terminal: Option<NodeId>,
    posterior_semiring: SemiringKind,
    has_posteriors: bool,
}

impl Lattice {
    pub fn new(semiring: SemiringKind) -> Self {
        Self {
            semiring,
            frames: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            initial: None,
            terminal: None,
            posterior_semiring: semiring,
            has_posteriors: false,
        }
    }

    /* ---------- accessors ---------- */

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    /// Length of the decoded utterance in frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[LatticeNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[LatticeEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&LatticeNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&LatticeEdge> {
        self.edges.get(id)
    }

    pub fn initial(&self) -> Option<NodeId> {
        self.initial
    }

    pub fn terminal(&self) -> Option<NodeId> {
        self.terminal
    }

    /// Node for `(word, start, end)`, if present.
    pub fn find_node(&self, word: &str, start: usize, end: usize) -> Option<NodeId> {
        self.node_index.get(&(Arc::from(word), start, end)).copied()
    }

    pub fn has_posteriors(&self) -> bool {
        self.has_posteriors
    }

    /* ---------- construction ---------- */

    /// Add a node, or return the existing one with the same key.
    pub fn add_node(&mut self, word: impl Into<Arc<str>>, start: usize, end: usize) -> NodeId {
        let word = word.into();
        if let Some(&id) = self.node_index.get(&(word.clone(), start, end)) {
            return id;
        }
        let zero = self.semiring.zero();
        let id = self.nodes.len();
        self.nodes.push(LatticeNode {
            word: word.clone(),
            start,
            end,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            forward: zero,
            backward: zero,
            viterbi: zero,
            best_predecessor: None,
        });
        self.node_index.insert((word, start, end), id);
        self.frames = self.frames.max(end);
        self.has_posteriors = false;
        id
    }

    /// Add an edge; a second edge between the same nodes only replaces the
    /// first when its combined weight is better.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        acoustic: f32,
        language: f32,
    ) -> Result<EdgeId, LatticeError> {
        for n in [from, to] {
            if n >= self.nodes.len() {
                return Err(LatticeError::MissingNode(n));
            }
        }
        let s = self.semiring;
        self.has_posteriors = false;
        if let Some(&id) = self.edge_index.get(&(from, to)) {
            let e = &mut self.edges[id];
            if s.better(s.times(acoustic, language), s.times(e.acoustic, e.language)) {
                e.acoustic = acoustic;
                e.language = language;
            }
            return Ok(id);
        }
        let id = self.edges.len();
        self.edges.push(LatticeEdge {
            from,
            to,
            acoustic,
            language,
        });
        self.edge_index.insert((from, to), id);
        self.nodes[from].outgoing.push(id);
        self.nodes[to].incoming.push(id);
        Ok(id)
    }

    pub fn set_initial(&mut self, node: NodeId) -> Result<(), LatticeError> {
        self.check_node(node)?;
        self.initial = Some(node);
        self.has_posteriors = false;
        Ok(())
    }

    pub fn set_terminal(&mut self, node: NodeId) -> Result<(), LatticeError> {
        self.check_node(node)?;
        self.terminal = Some(node);
        self.has_posteriors = false;
        Ok(())
    }

    fn check_node(&self, node: NodeId) -> Result<(), LatticeError> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(LatticeError::MissingNode(node))
        }
    }

    /// Collapse the word tokens of a decode (and their alternates) into a
    /// lattice.
    #[instrument(level = "debug", skip_all)]
    pub fn from_result(result: &DecodeResult) -> Result<Self, LatticeError> {
        let tails: Vec<&Arc<Token>> = if result.is_final() {
            result.final_tokens().iter().collect()
        } else {
            result.best_token().into_iter().collect()
        };
        if tails.is_empty() {
            return Err(LatticeError::Empty);
        }

        let frames = result.frames();
        let mut lattice = Lattice::new(result.semiring());
        let initial = lattice.add_node(SENTENCE_START, 0, 0);
        let terminal = lattice.add_node(SENTENCE_END, frames, frames);
        lattice.initial = Some(initial);
        lattice.terminal = Some(terminal);

        let mut builder = Builder {
            result,
            lattice,
            visited: HashSet::new(),
            expanding: HashSet::new(),
        };
        for tail in tails {
            builder.walk(terminal, tail.acoustic(), tail.language(), tail)?;
        }
        let mut lattice = builder.lattice;
        lattice.normalize_endpoints()?;
        debug!(
            nodes = lattice.num_nodes(),
            edges = lattice.num_edges(),
            frames,
            "lattice built"
        );
        Ok(lattice)
    }

    /// Connect every other source from the initial node and every other
    /// sink to the terminal node with `one()` edges. Missing endpoints are
    /// created as `<s>` / `</s>`.
    pub fn normalize_endpoints(&mut self) -> Result<(), LatticeError> {
        if self.nodes.is_empty() {
            return Err(LatticeError::Empty);
        }
        let one = self.semiring.one();
        let initial = match self.initial {
            Some(n) => n,
            None => {
                let n = self.add_node(SENTENCE_START, 0, 0);
                self.initial = Some(n);
                n
            }
        };
        let terminal = match self.terminal {
            Some(n) => n,
            None => {
                let frames = self.frames;
                let n = self.add_node(SENTENCE_END, frames, frames);
                self.terminal = Some(n);
                n
            }
        };

        let sources: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&n| n != initial && n != terminal && self.nodes[n].incoming.is_empty())
            .collect();
        let sinks: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&n| n != initial && n != terminal && self.nodes[n].outgoing.is_empty())
            .collect();
        for n in sources {
            self.add_edge(initial, n, one, one)?;
        }
        for n in sinks {
            self.add_edge(n, terminal, one, one)?;
        }
        Ok(())
    }

    /// Structural check: endpoints set, no dangling edges, no cycles.
    pub fn validate(&self) -> Result<(), LatticeError> {
        let (Some(i), Some(t)) = (self.initial, self.terminal) else {
            return Err(LatticeError::Empty);
        };
        self.check_node(i)?;
        self.check_node(t)?;
        for (id, e) in self.edges.iter().enumerate() {
            for node in [e.from, e.to] {
                if node >= self.nodes.len() {
                    return Err(LatticeError::DanglingEdge { edge: id, node });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm; ties resolved by node id.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, LatticeError> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.incoming.len()).collect();
        let mut queue: VecDeque<NodeId> = (0..self.nodes.len())
            .filter(|&n| indegree[n] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(n) = queue.pop_front() {
            order.push(n);
            for &e in &self.nodes[n].outgoing {
                let to = self.edges[e].to;
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    queue.push_back(to);
                }
            }
        }
        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(LatticeError::Cyclic)
        }
    }

    /// Every complete path from initial to terminal, as node lists.
    /// Exponential in the worst case; use [`Lattice::nbest`] on large
    /// lattices.
    pub fn all_paths(&self) -> Result<Vec<Vec<NodeId>>, LatticeError> {
        self.validate()?;
        let (Some(initial), Some(terminal)) = (self.initial, self.terminal) else {
            return Err(LatticeError::Empty);
        };
        let mut paths = Vec::new();
        let mut stack = vec![vec![initial]];
        while let Some(path) = stack.pop() {
            let Some(&last) = path.last() else { continue };
            if last == terminal {
                paths.push(path);
                continue;
            }
            for &e in self.nodes[last].outgoing.iter().rev() {
                let mut next = path.clone();
                next.push(self.edges[e].to);
                stack.push(next);
            }
        }
        Ok(paths)
    }

    /// Words along a node path, without the sentence markers.
    pub fn words_of(&self, path: &[NodeId]) -> Vec<Arc<str>> {
        path.iter()
            .filter(|&&n| Some(n) != self.initial && Some(n) != self.terminal)
            .filter_map(|&n| self.nodes.get(n).map(|node| node.word.clone()))
            .collect()
    }
}

/* --------------------------------------------------------------------- */
/*  Construction from tokens                                             */

struct Builder<'r> {
    result: &'r DecodeResult,
    lattice: Lattice,
    visited: HashSet<u64>,
    /// Winners whose alternates are being walked; epsilon loops in the
    /// grammar can lead an alternate back to its own winner.
    expanding: HashSet<u64>,
}

impl Builder<'_> {
    /// Follow `from` back to the closest word token (or the root) and link
    /// it to `target`. `ac_end`/`lm_end` are the accumulated weights the
    /// path carries when it reaches `target`.
    fn walk(
        &mut self,
        target: NodeId,
        ac_end: f32,
        lm_end: f32,
        from: &Arc<Token>,
    ) -> Result<(), LatticeError> {
        let s = self.lattice.semiring;
        let mut cur = from;
        loop {
            if cur.is_word() {
                return self.connect(target, ac_end, lm_end, cur);
            }
            self.walk_alternates(target, ac_end, lm_end, cur)?;
            match cur.predecessor() {
                Some(p) => cur = p,
                None => {
                    let initial = self.initial()?;
                    let ac = s.divide(ac_end, cur.acoustic());
                    let lm = s.divide(lm_end, cur.language());
                    self.lattice.add_edge(initial, target, ac, lm)?;
                    return Ok(());
                }
            }
        }
    }

    fn connect(
        &mut self,
        target: NodeId,
        ac_end: f32,
        lm_end: f32,
        word: &Arc<Token>,
    ) -> Result<(), LatticeError> {
        let s = self.lattice.semiring;
        let label = word.state().word().cloned().unwrap_or_else(|| Arc::from(""));
        let start = word.word_predecessor().map_or(0, |p| p.frame());
        let node = self.lattice.add_node(label, start, word.frame());
        self.lattice.add_edge(
            node,
            target,
            s.divide(ac_end, word.acoustic()),
            s.divide(lm_end, word.language()),
        )?;
        self.walk_alternates(target, ac_end, lm_end, word)?;

        if !self.visited.insert(word.id()) {
            return Ok(());
        }
        match word.predecessor() {
            Some(p) => self.walk(node, word.acoustic(), word.language(), p),
            None => {
                let initial = self.initial()?;
                self.lattice
                    .add_edge(initial, node, word.acoustic(), word.language())?;
                Ok(())
            }
        }
    }

    /// Losers at `winner`'s state share its future, so their end weights
    /// are `end ⊘ winner ⊗ loser`.
    fn walk_alternates(
        &mut self,
        target: NodeId,
        ac_end: f32,
        lm_end: f32,
        winner: &Arc<Token>,
    ) -> Result<(), LatticeError> {
        let s = self.lattice.semiring;
        let result = self.result;
        let alternates = result.alternates_of(winner.id());
        if alternates.is_empty() || !self.expanding.insert(winner.id()) {
            return Ok(());
        }
        for alt in alternates {
            let ac = s.times(s.divide(ac_end, winner.acoustic()), alt.acoustic());
            let lm = s.times(s.divide(lm_end, winner.language()), alt.language());
            self.walk(target, ac, lm, alt)?;
        }
        self.expanding.remove(&winner.id());
        Ok(())
    }

    fn initial(&self) -> Result<NodeId, LatticeError> {
        self.lattice.initial.ok_or(LatticeError::Empty)
    }
}
