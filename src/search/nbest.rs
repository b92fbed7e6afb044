use super::hypothesis::Hypothesis;
use crate::core_types::{Phrase, WordId, SURFACE_FACTOR};
use crate::coverage::Span;
use crate::scoring::ScoreVector;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

/// A complete derivation through the recombination lattice: either the
/// back-chain of a final hypothesis, or such a chain with exactly one
/// edge swapped for one of its recorded arcs.
#[derive(Debug, Clone)]
pub struct TrellisPath {
    // Final hypothesis first, seed last
    edges: Vec<Arc<Hypothesis>>,
    prev_edge_changed: Option<usize>,
    total_score: f32,
    scores: ScoreVector,
}

impl TrellisPath {
    pub fn pure(final_hypo: &Arc<Hypothesis>) -> Self {
        let mut edges = Vec::new();
        let mut cur = Some(Arc::clone(final_hypo));
        while let Some(h) = cur {
            cur = h.prev().cloned();
            edges.push(h);
        }
        Self {
            edges,
            prev_edge_changed: None,
            total_score: final_hypo.total_score(),
            scores: final_hypo.scores().clone(),
        }
    }

    /// Copies edges before `edge`, then follows `arc`'s own back-chain.
    fn deviate(&self, edge: usize, arc: &Arc<Hypothesis>) -> Self {
        let replaced = &self.edges[edge];
        let mut edges: Vec<Arc<Hypothesis>> = self.edges[..edge].to_vec();
        let mut cur = Some(Arc::clone(arc));
        while let Some(h) = cur {
            cur = h.prev().cloned();
            edges.push(h);
        }

        let mut scores = self.scores.clone();
        scores.minus_equals(replaced.scores());
        scores.plus_equals(arc.scores());

        Self {
            edges,
            prev_edge_changed: Some(edge),
            total_score: self.total_score - replaced.total_score() + arc.total_score(),
            scores,
        }
    }

    /// Every single-edge deviation not already explored by an ancestor path.
    fn deviants(&self) -> Vec<TrellisPath> {
        let first = self.prev_edge_changed.map_or(0, |e| e + 1);
        let mut out = Vec::new();
        for edge in first..self.edges.len() {
            for arc in self.edges[edge].arc_list() {
                out.push(self.deviate(edge, arc));
            }
        }
        out
    }

    pub fn total_score(&self) -> f32 {
        self.total_score
    }

    pub fn scores(&self) -> &ScoreVector {
        &self.scores
    }

    pub fn edges(&self) -> &[Arc<Hypothesis>] {
        &self.edges
    }

    /// `(source span, target phrase)` per step, in output order.
    pub fn segments(&self) -> Vec<(Span, &Phrase)> {
        self.edges
            .iter()
            .rev()
            .filter_map(|h| h.option().map(|o| (o.span(), o.target())))
            .collect()
    }

    pub fn output_phrase(&self) -> Phrase {
        let mut out = Phrase::empty();
        for (_, target) in self.segments() {
            out.extend_from(target);
        }
        out
    }

    fn surface_key(&self) -> Vec<WordId> {
        self.output_phrase().factor_ids(SURFACE_FACTOR)
    }
}

struct Contender {
    path: TrellisPath,
    seq: usize,
}

impl PartialEq for Contender {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Contender {}

impl PartialOrd for Contender {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Contender {
    // Max-heap: higher score first, then the earlier contender
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .total_score
            .total_cmp(&other.path.total_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Contenders {
    heap: BinaryHeap<Contender>,
    next_seq: usize,
}

impl Contenders {
    fn push(&mut self, path: TrellisPath) {
        self.heap.push(Contender {
            path,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn pop(&mut self) -> Option<TrellisPath> {
        self.heap.pop().map(|c| c.path)
    }

    fn prune(&mut self, keep: usize) {
        if self.heap.len() <= keep {
            return;
        }
        let mut sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        let cut = sorted.len() - keep;
        self.heap = sorted.drain(cut..).collect();
    }
}

/// Ranked derivations over the arc lattice rooted at `finals`.
/// `factor` bounds the work spent per requested path (0 = 1000).
pub fn extract_n_best(
    finals: &[Arc<Hypothesis>],
    count: usize,
    distinct: bool,
    factor: usize,
) -> Vec<TrellisPath> {
    let mut out = Vec::new();
    if count == 0 || finals.is_empty() {
        return out;
    }

    let mut contenders = Contenders::default();
    for h in finals {
        contenders.push(TrellisPath::pure(h));
    }

    let factor = if factor == 0 { 1000 } else { factor };
    let mut seen: HashSet<Vec<WordId>> = HashSet::new();

    let mut iteration = 0;
    while out.len() < count && iteration < count * factor {
        let Some(path) = contenders.pop() else {
            break;
        };
        for deviant in path.deviants() {
            contenders.push(deviant);
        }

        if !distinct || seen.insert(path.surface_key()) {
            out.push(path);
        }

        contenders.prune(if distinct { count * factor } else { count });
        iteration += 1;
    }
    out
}
