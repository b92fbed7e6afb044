use super::hypothesis::Hypothesis;
use super::nbest::{extract_n_best, TrellisPath};
use super::stack::{AddOutcome, HypothesisStackCollection};
use crate::config::SearchParams;
use crate::core_types::Phrase;
use crate::coverage::{distortion_distance, Span};
use crate::error::{DecResult, DecoderError};
use crate::features::FeatureSet;
use crate::options::{FutureCostMatrix, TranslationOptionTable};
use crate::scoring::LabeledScore;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Seeded,
    Expanding(usize),
    Finalizing,
    Done,
}

/// Per-sentence counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub sentence_len: usize,
    pub options: usize,
    pub created: usize,
    pub added: usize,
    /// Rejected on arrival by a stack's worst bound.
    pub rejected: usize,
    pub recombined: usize,
    pub pruned: usize,
    pub not_completable: usize,
    /// Skipped before construction by early discarding.
    pub early_discarded: usize,
    pub invariant_violations: usize,
    pub stacks_expanded: usize,
    pub interrupted: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    pub source: Span,
    pub target: String,
}

/// One ranked, rendered derivation.
#[derive(Debug, Clone, Serialize)]
pub struct Derivation {
    pub output: String,
    pub total_score: f32,
    pub breakdown: Vec<LabeledScore>,
    pub segments: Vec<Segment>,
}

/// Read-only inputs shared by every expansion of one sentence.
struct Expander<'a> {
    features: &'a FeatureSet,
    table: &'a TranslationOptionTable,
    future: &'a FutureCostMatrix,
    distortion_limit: Option<usize>,
    /// Per destination stack: worst bound plus the early-discarding margin,
    /// as it stood when the current stack was sealed.
    discard_bounds: Option<Vec<f32>>,
}

#[derive(Default)]
struct Expansion {
    created: Vec<Hypothesis>,
    not_completable: usize,
    early_discarded: usize,
    violations: Vec<DecoderError>,
}

impl Expander<'_> {
    fn expand(&self, hypo: &Arc<Hypothesis>) -> Expansion {
        let mut out = Expansion::default();
        let coverage = hypo.coverage();
        let Some(first_gap) = coverage.first_gap() else {
            return out;
        };
        let n = coverage.len();
        let covered = coverage.count_covered();
        let max_len = self.table.max_phrase_length();
        let prev = hypo.span();
        let accumulated = hypo.total_score() - hypo.future_score();

        for start in first_gap..n {
            if coverage.is_covered(start) {
                continue;
            }
            if let Some(limit) = self.distortion_limit {
                // The jump onto `start` itself
                if distortion_distance(prev.as_ref(), &Span::single(start)) > limit {
                    continue;
                }
            }
            for end in start..n.min(start + max_len) {
                if coverage.is_covered(end) {
                    break;
                }
                let span = Span::new(start, end);
                if let Some(limit) = self.distortion_limit {
                    // From a non-leftmost span we must still reach the first gap
                    if start != first_gap && span.distortion_distance(&Span::single(first_gap)) > limit {
                        continue;
                    }
                }
                let bound = self
                    .discard_bounds
                    .as_ref()
                    .and_then(|b| b.get(covered + span.len()).copied());
                let expected = bound
                    .and_then(|_| coverage.with_span(&span).ok())
                    .map(|after| accumulated + self.future.remaining_estimate(&after));

                for option in self.table.options(span) {
                    if let (Some(bound), Some(expected)) = (bound, expected) {
                        if expected + option.estimated_score() < bound {
                            out.early_discarded += 1;
                            continue;
                        }
                    }
                    match Hypothesis::extend(hypo, option, self.features, self.future) {
                        Ok(next) if next.future_score() == f32::NEG_INFINITY => {
                            out.not_completable += 1;
                        }
                        Ok(next) => out.created.push(next),
                        Err(e) => out.violations.push(e),
                    }
                }
            }
        }
        out
    }
}

/// Drives one sentence through `Seeded → Expanding(i) → Finalizing → Done`.
pub struct SearchManager<'a> {
    features: &'a FeatureSet,
    params: &'a SearchParams,
    table: TranslationOptionTable,
    future: FutureCostMatrix,
    stacks: HypothesisStackCollection,
    state: SearchState,
    stats: SearchStats,
    next_id: usize,
    pool: Option<&'a ThreadPool>,
    max_time: Option<Duration>,
}

impl<'a> SearchManager<'a> {
    pub fn new(
        features: &'a FeatureSet,
        params: &'a SearchParams,
        table: TranslationOptionTable,
    ) -> DecResult<Self> {
        let future = FutureCostMatrix::build(&table);
        let stacks = HypothesisStackCollection::new(table.sentence_len(), params);
        let stats = SearchStats {
            sentence_len: table.sentence_len(),
            options: table.total_options(),
            ..Default::default()
        };

        let mut manager = Self {
            features,
            params,
            table,
            future,
            stacks,
            state: SearchState::Seeded,
            stats,
            next_id: 0,
            pool: None,
            max_time: (params.max_time_ms > 0).then(|| Duration::from_millis(params.max_time_ms)),
        };

        let seed = Hypothesis::seed(features, &manager.future);
        manager.insert(seed)?;
        Ok(manager)
    }

    /// Replaces the configured wall-clock budget.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.max_time = Some(budget);
        self
    }

    /// Expands each stack's hypotheses on `pool`; insertion stays serial.
    pub fn with_pool(mut self, pool: &'a ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn table(&self) -> &TranslationOptionTable {
        &self.table
    }

    pub fn future_costs(&self) -> &FutureCostMatrix {
        &self.future
    }

    pub fn stacks(&self) -> &HypothesisStackCollection {
        &self.stacks
    }

    fn insert(&mut self, mut hypo: Hypothesis) -> DecResult<AddOutcome> {
        hypo.set_id(self.next_id);
        self.next_id += 1;
        self.stats.created += 1;
        let outcome = self.stacks.add(hypo)?;
        match outcome {
            AddOutcome::Added => self.stats.added += 1,
            AddOutcome::Replaced | AddOutcome::Merged => self.stats.recombined += 1,
            AddOutcome::Rejected => self.stats.rejected += 1,
        }
        Ok(outcome)
    }

    /// Runs the search to `Finalizing`.
    pub fn decode(&mut self) -> DecResult<()> {
        if self.state != SearchState::Seeded {
            return Err(DecoderError::Invariant(format!(
                "decode called in state {:?}",
                self.state
            )));
        }
        let start_time = Instant::now();
        let arc_limit = self.params.arc_limit();

        for idx in 0..self.stacks.len() {
            // Check Time Limit
            if let Some(limit) = self.max_time {
                if start_time.elapsed() >= limit {
                    warn!("Time budget exhausted before stack {}", idx);
                    self.stats.interrupted = true;
                    break;
                }
            }
            self.state = SearchState::Expanding(idx);

            let hypos = match self.stacks.stack_mut(idx) {
                Some(stack) => {
                    stack.prune_to_size(self.params.stack_size);
                    stack.seal(arc_limit)
                }
                None => continue,
            };
            if hypos.is_empty() {
                continue;
            }

            let expander = Expander {
                features: self.features,
                table: &self.table,
                future: &self.future,
                distortion_limit: usize::try_from(self.params.distortion_limit).ok(),
                discard_bounds: self.params.early_discarding.map(|margin| {
                    self.stacks
                        .iter()
                        .map(|stack| stack.worst_bound() + margin)
                        .collect()
                }),
            };

            // A. Expand, in parallel if a pool is attached
            let expansions: Vec<Expansion> = match self.pool {
                Some(pool) => pool.install(|| hypos.par_iter().map(|h| expander.expand(h)).collect()),
                None => hypos.iter().map(|h| expander.expand(h)).collect(),
            };

            // B. Insert serially in hypothesis order
            for expansion in expansions {
                self.stats.not_completable += expansion.not_completable;
                self.stats.early_discarded += expansion.early_discarded;
                for violation in expansion.violations {
                    debug_assert!(false, "{}", violation);
                    warn!("Dropping hypothesis: {}", violation);
                    self.stats.invariant_violations += 1;
                }
                for next in expansion.created {
                    self.insert(next)?;
                }
            }

            self.stats.stacks_expanded += 1;
            debug!(
                "Stack {}: expanded {} hypotheses (created {}, recombined {}, rejected {})",
                idx,
                hypos.len(),
                self.stats.created,
                self.stats.recombined,
                self.stats.rejected
            );
        }

        // Finalizing: the last stack may be unsealed after an interruption
        self.state = SearchState::Finalizing;
        if let Some(last) = self.stacks.stack_mut(self.table.sentence_len()) {
            last.prune_to_size(self.params.stack_size);
            last.seal(arc_limit);
        }
        self.stats.pruned = self.stacks.total_pruned();
        self.stats.elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "Decoded {} words: {} hypotheses, {} final, {} ms",
            self.stats.sentence_len,
            self.stats.created,
            self.final_hypotheses().len(),
            self.stats.elapsed_ms
        );
        Ok(())
    }

    fn final_hypotheses(&self) -> &[Arc<Hypothesis>] {
        match self.state {
            SearchState::Finalizing => self
                .stacks
                .stack(self.table.sentence_len())
                .map(|s| s.frozen())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Highest scoring complete hypothesis; `None` if nothing survived.
    pub fn best_hypothesis(&self) -> Option<Arc<Hypothesis>> {
        self.final_hypotheses().first().cloned()
    }

    pub fn n_best_paths(&self, count: usize, distinct: bool) -> Vec<TrellisPath> {
        extract_n_best(
            self.final_hypotheses(),
            count,
            distinct,
            self.params.n_best_factor,
        )
    }

    /// Ranked derivations, rendered with the feature labels.
    pub fn n_best(&self, count: usize, distinct: bool) -> Vec<Derivation> {
        self.n_best_paths(count, distinct)
            .iter()
            .map(|path| self.render_path(path))
            .collect()
    }

    pub fn render_best(&self) -> Option<Derivation> {
        self.best_hypothesis()
            .map(|best| self.render_path(&TrellisPath::pure(&best)))
    }

    fn render_path(&self, path: &TrellisPath) -> Derivation {
        let vocab = &self.features.vocab;
        Derivation {
            output: path.output_phrase().render(vocab),
            total_score: path.total_score(),
            breakdown: self.features.layout.breakdown(path.scores()),
            segments: path
                .segments()
                .into_iter()
                .map(|(source, target)| Segment {
                    source,
                    target: target.render(vocab),
                })
                .collect(),
        }
    }

    pub fn best_output(&self) -> Option<Phrase> {
        self.best_hypothesis().map(|h| h.output_phrase())
    }

    /// Releases every hypothesis. Terminal.
    pub fn finish(&mut self) -> SearchStats {
        self.stacks = HypothesisStackCollection::new(0, self.params);
        self.state = SearchState::Done;
        self.stats.clone()
    }
}
