use crate::core_types::{WordId, BOS_ID, EOS_ID, SURFACE_FACTOR};
use crate::scoring::LOWEST_SCORE;
use std::collections::HashMap;

/// Continuation context of an n-gram model: the last `order - 1` words.
/// Opaque to the search apart from equality and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LmState(Vec<WordId>);

impl LmState {
    pub fn new(history: Vec<WordId>) -> Self {
        Self(history)
    }

    pub fn words(&self) -> &[WordId] {
        &self.0
    }
}

/// Context scorer over one factor. Only `order`, `ngram_score` are required;
/// phrase-level scoring is derived from them.
pub trait LanguageModel: Send + Sync {
    fn order(&self) -> usize;

    fn factor(&self) -> usize {
        SURFACE_FACTOR
    }

    /// Natural-log score of the last id of `ngram` given the ids before it.
    /// `ngram` is never longer than `order()`.
    fn ngram_score(&self, ngram: &[WordId]) -> f32;

    fn begin_state(&self) -> LmState {
        if self.order() > 1 {
            LmState(vec![BOS_ID])
        } else {
            LmState::default()
        }
    }

    /// Scores every word of `words` after `state`.
    fn score(&self, state: &LmState, words: &[WordId]) -> (f32, LmState) {
        let order = self.order().max(1);
        let mut context = state.0.clone();
        let mut total = 0.0;
        for &w in words {
            context.push(w);
            let from = context.len().saturating_sub(order);
            total += self.ngram_score(&context[from..]);
        }
        (total, truncate_history(self.order(), context))
    }

    /// Scores only the first `order - 1` words of `words`, whose n-grams
    /// straddle the phrase boundary; the rest were counted by
    /// `phrase_scores`. The returned state follows all of `words`.
    fn boundary_score(&self, state: &LmState, words: &[WordId]) -> (f32, LmState) {
        let straddling = words.len().min(self.order().saturating_sub(1));
        let (score, _) = self.score(state, &words[..straddling]);
        let mut context = state.0.clone();
        context.extend_from_slice(words);
        (score, truncate_history(self.order(), context))
    }

    fn end_score(&self, state: &LmState) -> f32 {
        self.score(state, &[EOS_ID]).0
    }

    /// `(internal, estimate)` for a phrase scored without outside context.
    /// `internal` sums the n-grams with full history inside the phrase,
    /// `estimate` additionally counts the leading words with the partial
    /// history available.
    fn phrase_scores(&self, words: &[WordId]) -> (f32, f32) {
        let order = self.order().max(1);
        let mut internal = 0.0;
        let mut estimate = 0.0;
        for i in 0..words.len() {
            let from = (i + 1).saturating_sub(order);
            let s = self.ngram_score(&words[from..=i]);
            if i + 1 >= order {
                internal += s;
            }
            estimate += s;
        }
        (internal, estimate)
    }
}

fn truncate_history(order: usize, mut context: Vec<WordId>) -> LmState {
    let keep = order.saturating_sub(1);
    if context.len() > keep {
        context.drain(..context.len() - keep);
    }
    LmState(context)
}

#[derive(Debug, Clone, Copy)]
struct NgramEntry {
    prob: f32,
    backoff: f32,
}

/// In-memory back-off n-gram model with natural-log scores.
#[derive(Debug, Default)]
pub struct BackoffLm {
    order: usize,
    factor: usize,
    entries: HashMap<Vec<WordId>, NgramEntry>,
}

impl BackoffLm {
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(1),
            factor: SURFACE_FACTOR,
            entries: HashMap::new(),
        }
    }

    pub fn with_factor(mut self, factor: usize) -> Self {
        self.factor = factor;
        self
    }

    /// Adds an n-gram; longer entries than the model order are ignored.
    pub fn insert(&mut self, ngram: Vec<WordId>, prob: f32, backoff: f32) {
        if ngram.is_empty() || ngram.len() > self.order {
            return;
        }
        self.entries.insert(ngram, NgramEntry { prob, backoff });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LanguageModel for BackoffLm {
    fn order(&self) -> usize {
        self.order
    }

    fn factor(&self) -> usize {
        self.factor
    }

    fn ngram_score(&self, ngram: &[WordId]) -> f32 {
        let mut penalty = 0.0;
        for from in 0..ngram.len() {
            let suffix = &ngram[from..];
            if let Some(entry) = self.entries.get(suffix) {
                return entry.prob + penalty;
            }
            // Back off: charge the weight of the context we are dropping
            let context = &ngram[from..ngram.len() - 1];
            if !context.is_empty() {
                if let Some(ctx) = self.entries.get(context) {
                    penalty += ctx.backoff;
                }
            }
        }
        LOWEST_SCORE
    }
}
