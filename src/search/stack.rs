use super::hypothesis::{Hypothesis, RecombinationKey};
use crate::config::SearchParams;
use crate::error::{DecResult, DecoderError};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

/// Result of offering a hypothesis to a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Took a new recombination bucket.
    Added,
    /// Beat the bucket's representative, which became one of its arcs.
    Replaced,
    /// Lost to the bucket's representative.
    Merged,
    /// Below the stack's worst bound; dropped.
    Rejected,
}

impl AddOutcome {
    pub fn is_recombination(&self) -> bool {
        matches!(self, AddOutcome::Replaced | AddOutcome::Merged)
    }
}

/// Better hypotheses sort first; earlier ids win ties.
fn rank(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    b.total_score()
        .total_cmp(&a.total_score())
        .then(a.id().cmp(&b.id()))
}

/// Hypotheses with the same number of covered words.
pub struct HypothesisStack {
    slots: Vec<Option<Hypothesis>>,
    index: BTreeMap<RecombinationKey, usize>,
    live: usize,
    best_score: f32,
    worst_bound: f32,
    beam_threshold: f32,
    max_size: usize,
    max_per_output: usize,
    n_best: bool,
    pruned: usize,
    frozen: Option<Vec<Arc<Hypothesis>>>,
}

impl HypothesisStack {
    pub fn new(params: &SearchParams) -> Self {
        Self {
            slots: Vec::new(),
            index: BTreeMap::new(),
            live: 0,
            best_score: f32::NEG_INFINITY,
            worst_bound: f32::NEG_INFINITY,
            beam_threshold: params.beam_threshold,
            max_size: params.stack_size,
            max_per_output: params.max_per_output,
            n_best: params.n_best_enabled(),
            pruned: 0,
            frozen: None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.frozen {
            Some(frozen) => frozen.len(),
            None => self.live,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn best_score(&self) -> f32 {
        self.best_score
    }

    /// Scores below this are rejected on arrival.
    pub fn worst_bound(&self) -> f32 {
        self.worst_bound
    }

    pub fn pruned(&self) -> usize {
        self.pruned
    }

    pub fn is_sealed(&self) -> bool {
        self.frozen.is_some()
    }

    /// Inserts `hypo`, merging it with an equivalent hypothesis if one is
    /// present.
    pub fn add_recombine(&mut self, mut hypo: Hypothesis) -> DecResult<AddOutcome> {
        if self.frozen.is_some() {
            return Err(DecoderError::Invariant(format!(
                "hypothesis {} offered to a sealed stack",
                hypo.id()
            )));
        }

        if hypo.total_score() < self.worst_bound {
            trace!(
                "Reject {} ({:.3} < {:.3})",
                hypo.id(),
                hypo.total_score(),
                self.worst_bound
            );
            return Ok(AddOutcome::Rejected);
        }

        let key = hypo.recombination_key();
        let Some(&slot) = self.index.get(&key) else {
            let score = hypo.total_score();
            self.index.insert(key, self.slots.len());
            self.slots.push(Some(hypo));
            self.live += 1;

            if score > self.best_score {
                self.best_score = score;
                self.worst_bound = self.worst_bound.max(score + self.beam_threshold);
            }

            // Lazy pruning
            if self.max_size > 0 && self.live > 2 * self.max_size {
                self.prune_to_size(self.max_size);
            }
            return Ok(AddOutcome::Added);
        };

        let existing = self.slots[slot].take().ok_or_else(|| {
            DecoderError::Invariant(format!("recombination bucket {} points at an empty slot", slot))
        })?;

        // The incumbent keeps ties
        let outcome = if hypo.total_score() > existing.total_score() {
            trace!("Recombine: {} replaces {}", hypo.id(), existing.id());
            if self.n_best {
                hypo.add_arc(existing);
            }
            if hypo.total_score() > self.best_score {
                self.best_score = hypo.total_score();
                self.worst_bound = self
                    .worst_bound
                    .max(self.best_score + self.beam_threshold);
            }
            self.slots[slot] = Some(hypo);
            AddOutcome::Replaced
        } else {
            trace!("Recombine: {} absorbed by {}", hypo.id(), existing.id());
            let mut existing = existing;
            if self.n_best {
                existing.add_arc(hypo);
            }
            self.slots[slot] = Some(existing);
            AddOutcome::Merged
        };
        Ok(outcome)
    }

    /// Reduces the stack to at most `n` hypotheses (`n == 0`: no limit).
    /// Nothing below `best + beam_threshold` survives; among the rest the
    /// `n` best are kept. Returns the number removed.
    pub fn prune_to_size(&mut self, n: usize) -> usize {
        if self.frozen.is_some() {
            return 0;
        }
        let before = self.live;

        if self.max_per_output > 0 {
            self.prune_per_output(self.max_per_output);
        }

        if n > 0 && self.live > n {
            let beam_floor = self.best_score + self.beam_threshold;
            let mut ranked: Vec<usize> = self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(i, h)| h.as_ref().map(|_| i))
                .collect();
            ranked.sort_by(|&a, &b| self.rank_slots(a, b));

            let mut kept = 0;
            let mut threshold = f32::NEG_INFINITY;
            for slot in ranked {
                let score = self.score_at(slot);
                if kept < n && score >= beam_floor {
                    kept += 1;
                    threshold = score;
                } else {
                    self.remove(slot);
                }
            }
            self.worst_bound = self.worst_bound.max(threshold);
        }

        let removed = before - self.live;
        self.pruned += removed;
        if removed > 0 {
            self.compact();
            trace!("Pruned {} hypotheses, {} left", removed, self.live);
        }
        removed
    }

    /// Drops the holes left by removals and re-points the buckets.
    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, h) in self.slots.iter().enumerate() {
            if let Some(h) = h {
                self.index.insert(h.recombination_key(), slot);
            }
        }
    }

    /// Slots in use, holes included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn prune_per_output(&mut self, cap: usize) {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, h) in self.slots.iter().enumerate() {
            if let Some(h) = h {
                buckets.entry(h.output_hash()).or_default().push(i);
            }
        }
        let mut doomed = Vec::new();
        for mut members in buckets.into_values() {
            if members.len() > cap {
                members.sort_by(|&a, &b| self.rank_slots(a, b));
                doomed.extend_from_slice(&members[cap..]);
            }
        }
        for slot in doomed {
            self.remove(slot);
        }
    }

    fn rank_slots(&self, a: usize, b: usize) -> Ordering {
        match (&self.slots[a], &self.slots[b]) {
            (Some(x), Some(y)) => rank(x, y),
            _ => Ordering::Equal,
        }
    }

    fn score_at(&self, slot: usize) -> f32 {
        self.slots[slot]
            .as_ref()
            .map_or(f32::NEG_INFINITY, Hypothesis::total_score)
    }

    fn remove(&mut self, slot: usize) {
        if let Some(h) = self.slots[slot].take() {
            self.index.remove(&h.recombination_key());
            self.live -= 1;
        }
    }

    /// Freezes the stack for expansion: survivors are ranked best first,
    /// their arc lists trimmed to `arc_limit`, and shared from then on.
    pub fn seal(&mut self, arc_limit: usize) -> Vec<Arc<Hypothesis>> {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }
        let mut survivors: Vec<Hypothesis> = self.slots.drain(..).flatten().collect();
        survivors.sort_by(rank);
        let frozen: Vec<Arc<Hypothesis>> = survivors
            .into_iter()
            .map(|mut h| {
                h.cleanup_arcs(arc_limit);
                Arc::new(h)
            })
            .collect();
        self.index.clear();
        self.live = 0;
        self.frozen = Some(frozen.clone());
        frozen
    }

    /// Live hypotheses, best first.
    pub fn sorted(&self) -> Vec<&Hypothesis> {
        match &self.frozen {
            Some(frozen) => frozen.iter().map(|h| h.as_ref()).collect(),
            None => {
                let mut all: Vec<&Hypothesis> = self.slots.iter().flatten().collect();
                all.sort_by(|a, b| rank(a, b));
                all
            }
        }
    }

    pub fn best(&self) -> Option<&Hypothesis> {
        self.sorted().into_iter().next()
    }

    pub fn best_shared(&self) -> Option<Arc<Hypothesis>> {
        self.frozen.as_ref().and_then(|f| f.first().cloned())
    }

    pub fn frozen(&self) -> &[Arc<Hypothesis>] {
        self.frozen.as_deref().unwrap_or(&[])
    }
}

/// One stack per covered-word count, `0..=sentence_len`.
pub struct HypothesisStackCollection {
    stacks: Vec<HypothesisStack>,
}

impl HypothesisStackCollection {
    pub fn new(sentence_len: usize, params: &SearchParams) -> Self {
        Self {
            stacks: (0..=sentence_len)
                .map(|_| HypothesisStack::new(params))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn add(&mut self, hypo: Hypothesis) -> DecResult<AddOutcome> {
        let idx = hypo.coverage().stack_signature() as usize;
        let stack = self.stacks.get_mut(idx).ok_or_else(|| {
            DecoderError::Invariant(format!("no stack for coverage signature {}", idx))
        })?;
        stack.add_recombine(hypo)
    }

    pub fn stack(&self, idx: usize) -> Option<&HypothesisStack> {
        self.stacks.get(idx)
    }

    pub fn stack_mut(&mut self, idx: usize) -> Option<&mut HypothesisStack> {
        self.stacks.get_mut(idx)
    }

    pub fn last(&self) -> Option<&HypothesisStack> {
        self.stacks.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HypothesisStack> {
        self.stacks.iter()
    }

    pub fn total_pruned(&self) -> usize {
        self.stacks.iter().map(HypothesisStack::pruned).sum()
    }
}
