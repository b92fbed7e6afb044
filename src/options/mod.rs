pub mod future_cost;

pub use future_cost::FutureCostMatrix;

use crate::config::OptionParams;
use crate::core_types::{Phrase, Sentence, Word};
use crate::coverage::Span;
use crate::features::{FeatureSet, GenerationTable, PhraseCandidate, PhraseTable};
use crate::scoring::{FeatureId, ScoreVector, LOWEST_SCORE};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::{debug, trace};

/// One stage of option construction.
#[derive(Clone)]
pub enum DecodeStep {
    /// Looks the source span up; later translation steps must agree with
    /// what earlier steps produced.
    Translate(Arc<dyn PhraseTable>),
    /// Adds target factors word by word.
    Generate(Arc<dyn GenerationTable>),
}

impl DecodeStep {
    pub fn name(&self) -> &str {
        match self {
            DecodeStep::Translate(t) => t.name(),
            DecodeStep::Generate(g) => g.name(),
        }
    }

    pub fn num_scores(&self) -> usize {
        match self {
            DecodeStep::Translate(t) => t.num_scores(),
            DecodeStep::Generate(g) => g.num_scores(),
        }
    }
}

/// A scored candidate translation of one span. Immutable once built.
#[derive(Debug, Clone)]
pub struct TranslationOption {
    span: Span,
    target: Phrase,
    scores: ScoreVector,
    estimated_score: f32,
    unknown: bool,
}

impl TranslationOption {
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn target(&self) -> &Phrase {
        &self.target
    }

    /// Table scores plus the phrase-internal language model score.
    pub fn partial_scores(&self) -> &ScoreVector {
        &self.scores
    }

    /// Context-free weighted estimate, used for ranking and future cost only.
    pub fn estimated_score(&self) -> f32 {
        self.estimated_score
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }
}

#[derive(Debug, Clone)]
struct PartialOption {
    target: Vec<Word>,
    scores: ScoreVector,
}

impl PartialOption {
    fn merge_translation(&self, cand: &PhraseCandidate, id: FeatureId) -> Option<PartialOption> {
        if cand.target.len() != self.target.len() {
            return None;
        }
        let target = self
            .target
            .iter()
            .zip(cand.target.words())
            .map(|(a, b)| a.merge(b))
            .collect::<Option<Vec<_>>>()?;
        let mut scores = self.scores.clone();
        scores.add(id, &cand.scores);
        Some(PartialOption { target, scores })
    }

    /// Cartesian product over the alternatives of every target word.
    fn generate(&self, table: &dyn GenerationTable, id: FeatureId) -> Vec<PartialOption> {
        let mut out = vec![self.clone()];
        for (pos, word) in self.target.iter().enumerate() {
            let alternatives = table.lookup(word);
            if alternatives.is_empty() {
                return Vec::new();
            }
            let mut next = Vec::with_capacity(out.len() * alternatives.len());
            for partial in &out {
                for (alt, scores) in &alternatives {
                    if let Some(merged) = partial.target[pos].merge(alt) {
                        let mut grown = partial.clone();
                        grown.target[pos] = merged;
                        grown.scores.add(id, scores);
                        next.push(grown);
                    }
                }
            }
            out = next;
        }
        out
    }
}

/// Per-span candidate lists for one sentence.
pub struct TranslationOptionTable {
    sentence_len: usize,
    max_phrase_length: usize,
    cells: Vec<Vec<Arc<TranslationOption>>>,
    unknown_words: usize,
}

impl TranslationOptionTable {
    /// Collects the options of every span. Lookups run on `pool` when one
    /// is given, otherwise on the calling thread.
    pub fn build(
        features: &FeatureSet,
        params: &OptionParams,
        sentence: &Sentence,
        pool: Option<&ThreadPool>,
    ) -> Self {
        let n = sentence.len();
        // No span is longer than the sentence
        let max_len = params.max_phrase_length.clamp(1, n.max(1));

        let spans: Vec<Span> = (0..n)
            .flat_map(|s| (s..n.min(s + max_len)).map(move |e| Span::new(s, e)))
            .collect();

        // Lookups are independent per span; collect keeps span order
        let lookup = |span: &Span| collect_span(features, sentence.slice(*span));
        let collected: Vec<Vec<PartialOption>> = match pool {
            Some(pool) => pool.install(|| spans.par_iter().map(lookup).collect()),
            None => spans.iter().map(lookup).collect(),
        };

        let mut cells = vec![Vec::new(); n * max_len];
        let mut unknown_words = 0;

        for (span, partials) in spans.iter().zip(collected) {
            let mut options: Vec<TranslationOption> = partials
                .into_iter()
                .map(|p| score_option(features, *span, p.target, p.scores, false))
                .collect();

            if options.is_empty() && span.len() == 1 {
                let word = &sentence.words()[span.start()];
                let target = features.unknown.translate(word, &features.vocab);
                let mut scores = features.layout.zeros();
                scores.add_single(features.unknown_id, LOWEST_SCORE);
                trace!("Unknown word at {}", span.start());
                options.push(score_option(features, *span, target.words().to_vec(), scores, true));
                unknown_words += 1;
            }

            prune_span(&mut options, params);
            cells[span.start() * max_len + span.len() - 1] =
                options.into_iter().map(Arc::new).collect();
        }

        let table = Self {
            sentence_len: n,
            max_phrase_length: max_len,
            cells,
            unknown_words,
        };
        debug!(
            "Option table: {} options over {} spans, {} unknown word(s)",
            table.total_options(),
            spans.len(),
            unknown_words
        );
        table
    }

    /// Options translating exactly `span`, best estimate first.
    pub fn options(&self, span: Span) -> &[Arc<TranslationOption>] {
        if span.end() >= self.sentence_len || span.len() > self.max_phrase_length {
            return &[];
        }
        &self.cells[span.start() * self.max_phrase_length + span.len() - 1]
    }

    pub fn sentence_len(&self) -> usize {
        self.sentence_len
    }

    pub fn max_phrase_length(&self) -> usize {
        self.max_phrase_length
    }

    pub fn total_options(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn unknown_words(&self) -> usize {
        self.unknown_words
    }

    /// Every non-empty cell, ordered by start then length.
    pub fn iter(&self) -> impl Iterator<Item = (Span, &[Arc<TranslationOption>])> + '_ {
        let max_len = self.max_phrase_length;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, opts)| !opts.is_empty())
            .map(move |(idx, opts)| {
                let start = idx / max_len;
                let end = start + idx % max_len;
                (Span::new(start, end), opts.as_slice())
            })
    }
}

fn collect_span(features: &FeatureSet, source: &[Word]) -> Vec<PartialOption> {
    let mut partials: Vec<PartialOption> = Vec::new();

    for (step_idx, sf) in features.steps.iter().enumerate() {
        partials = match &sf.step {
            DecodeStep::Translate(table) => {
                let hits = table.lookup(source);
                if step_idx == 0 {
                    hits.into_iter()
                        .map(|c| {
                            let mut scores = features.layout.zeros();
                            scores.add(sf.id, &c.scores);
                            PartialOption {
                                target: c.target.words().to_vec(),
                                scores,
                            }
                        })
                        .collect()
                } else {
                    partials
                        .iter()
                        .flat_map(|p| hits.iter().filter_map(|c| p.merge_translation(c, sf.id)))
                        .collect()
                }
            }
            DecodeStep::Generate(table) => partials
                .iter()
                .flat_map(|p| p.generate(table.as_ref(), sf.id))
                .collect(),
        };
        if partials.is_empty() {
            break;
        }
    }
    partials
}

fn score_option(
    features: &FeatureSet,
    span: Span,
    target: Vec<Word>,
    mut scores: ScoreVector,
    unknown: bool,
) -> TranslationOption {
    let target = Phrase::new(target);
    let layout = &features.layout;

    // Interior n-grams are final; the leading words only get an estimate
    let mut lm_estimate = 0.0;
    for lm in &features.lms {
        let ids = target.factor_ids(lm.model.factor());
        let (internal, estimate) = lm.model.phrase_scores(&ids);
        scores.add_single(lm.id, internal);
        lm_estimate += (estimate - internal) * layout.weight(lm.id);
    }

    let penalty =
        features.word_penalty.score(target.len()) * layout.weight(features.word_penalty_id);
    let estimated_score = layout.weighted(&scores) + lm_estimate + penalty;

    TranslationOption {
        span,
        target,
        scores,
        estimated_score,
        unknown,
    }
}

fn prune_span(options: &mut Vec<TranslationOption>, params: &OptionParams) {
    // Stable: equal estimates keep creation order
    options.sort_by(|a, b| b.estimated_score.total_cmp(&a.estimated_score));
    if params.max_options_per_span > 0 {
        options.truncate(params.max_options_per_span);
    }
    if params.option_threshold < 0.0 {
        if let Some(best) = options.first().map(|o| o.estimated_score) {
            let floor = best + params.option_threshold;
            options.retain(|o| o.estimated_score >= floor);
        }
    }
}
