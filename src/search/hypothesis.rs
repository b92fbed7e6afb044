use crate::core_types::{Phrase, Word};
use crate::coverage::{Coverage, Span};
use crate::error::DecResult;
use crate::features::{FeatureSet, LmState};
use crate::options::{FutureCostMatrix, TranslationOption};
use crate::scoring::ScoreVector;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Two hypotheses with equal keys score every future extension identically.
/// Ordered by language model states first, then coverage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecombinationKey {
    lm_states: Vec<LmState>,
    coverage: Coverage,
}

/// A partial derivation. The back-chain is shared; the struct itself is
/// only mutated while it sits unsealed in a stack (arc bookkeeping).
#[derive(Debug, Clone)]
pub struct Hypothesis {
    id: usize,
    prev: Option<Arc<Hypothesis>>,
    option: Option<Arc<TranslationOption>>,
    coverage: Coverage,
    scores: ScoreVector,
    total_score: f32,
    future_score: f32,
    lm_states: Vec<LmState>,
    target_len: usize,
    output_hash: u64,
    pub(crate) arc_list: Vec<Arc<Hypothesis>>,
}

impl Hypothesis {
    /// The empty derivation every search starts from.
    pub fn seed(features: &FeatureSet, future: &FutureCostMatrix) -> Self {
        let coverage = Coverage::new(future.size());
        let scores = features.layout.zeros();
        let future_score = future.remaining_estimate(&coverage);
        Self {
            id: 0,
            prev: None,
            option: None,
            total_score: features.layout.weighted(&scores) + future_score,
            coverage,
            scores,
            future_score,
            lm_states: features.lms.iter().map(|lm| lm.model.begin_state()).collect(),
            target_len: 0,
            output_hash: 0,
            arc_list: Vec::new(),
        }
    }

    /// Applies `option` to `parent`. Fails without side effects if the
    /// option overlaps what `parent` already covers.
    pub fn extend(
        parent: &Arc<Hypothesis>,
        option: &Arc<TranslationOption>,
        features: &FeatureSet,
        future: &FutureCostMatrix,
    ) -> DecResult<Hypothesis> {
        let span = option.span();
        let coverage = parent.coverage.with_span(&span)?;
        let target = option.target();

        let mut scores = parent.scores.clone();
        scores.plus_equals(option.partial_scores());
        scores.add_single(
            features.distortion_id,
            features.distortion.score(parent.span().as_ref(), &span),
        );
        scores.add_single(
            features.word_penalty_id,
            features.word_penalty.score(target.len()),
        );

        // Only the n-grams crossing into the new phrase are new
        let complete = coverage.is_complete();
        let mut lm_states = Vec::with_capacity(features.lms.len());
        for (lm, state) in features.lms.iter().zip(&parent.lm_states) {
            let ids = target.factor_ids(lm.model.factor());
            let (mut delta, next) = lm.model.boundary_score(state, &ids);
            if complete {
                delta += lm.model.end_score(&next);
            }
            scores.add_single(lm.id, delta);
            lm_states.push(next);
        }

        let future_score = future.remaining_estimate(&coverage);
        let total_score = features.layout.weighted(&scores) + future_score;

        Ok(Hypothesis {
            id: 0,
            prev: Some(Arc::clone(parent)),
            option: Some(Arc::clone(option)),
            coverage,
            scores,
            total_score,
            future_score,
            lm_states,
            target_len: parent.target_len + target.len(),
            output_hash: fold_output_hash(parent.output_hash, target.words()),
            arc_list: Vec::new(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn prev(&self) -> Option<&Arc<Hypothesis>> {
        self.prev.as_ref()
    }

    pub fn option(&self) -> Option<&Arc<TranslationOption>> {
        self.option.as_ref()
    }

    /// The span translated by the last step; `None` for the seed.
    pub fn span(&self) -> Option<Span> {
        self.option.as_ref().map(|o| o.span())
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn scores(&self) -> &ScoreVector {
        &self.scores
    }

    /// Weighted accumulated score plus the future estimate.
    #[inline(always)]
    pub fn total_score(&self) -> f32 {
        self.total_score
    }

    pub fn future_score(&self) -> f32 {
        self.future_score
    }

    pub fn lm_states(&self) -> &[LmState] {
        &self.lm_states
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn output_hash(&self) -> u64 {
        self.output_hash
    }

    pub fn is_seed(&self) -> bool {
        self.prev.is_none()
    }

    pub fn arc_list(&self) -> &[Arc<Hypothesis>] {
        &self.arc_list
    }

    pub fn recombination_key(&self) -> RecombinationKey {
        RecombinationKey {
            lm_states: self.lm_states.clone(),
            coverage: self.coverage.clone(),
        }
    }

    /// Records `loser` as an alternative incoming arc, taking over the
    /// arcs it had collected itself.
    pub(crate) fn add_arc(&mut self, mut loser: Hypothesis) {
        self.arc_list.append(&mut loser.arc_list);
        self.arc_list.push(Arc::new(loser));
    }

    /// Keeps the `limit` best arcs; earlier ids win ties.
    pub(crate) fn cleanup_arcs(&mut self, limit: usize) {
        if self.arc_list.len() <= limit {
            return;
        }
        self.arc_list.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then(a.id.cmp(&b.id))
        });
        self.arc_list.truncate(limit);
    }

    /// Hypotheses from the seed up to and including `self`.
    pub fn chain(self: &Arc<Self>) -> Vec<Arc<Hypothesis>> {
        let mut chain = Vec::new();
        let mut cur = Some(Arc::clone(self));
        while let Some(h) = cur {
            cur = h.prev.clone();
            chain.push(h);
        }
        chain.reverse();
        chain
    }

    /// Target words produced along the back-chain, in output order.
    pub fn output_phrase(&self) -> Phrase {
        let mut pieces: Vec<&Phrase> = Vec::new();
        let mut cur = Some(self);
        while let Some(h) = cur {
            if let Some(opt) = &h.option {
                pieces.push(opt.target());
            }
            cur = h.prev.as_deref();
        }
        let mut out = Phrase::empty();
        for piece in pieces.iter().rev() {
            out.extend_from(piece);
        }
        out
    }
}

fn fold_output_hash(seed: u64, words: &[Word]) -> u64 {
    words.iter().fold(seed, |acc, w| {
        let mut hasher = DefaultHasher::new();
        acc.hash(&mut hasher);
        w.hash(&mut hasher);
        hasher.finish()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Word;

    #[test]
    fn test_output_hash_ignores_segmentation() {
        let (x, y) = (Word::new(10), Word::new(11));
        let joined = fold_output_hash(0, &[x, y]);
        let split = fold_output_hash(fold_output_hash(0, &[x]), &[y]);
        assert_eq!(joined, split);
        assert_ne!(joined, fold_output_hash(0, &[y, x]));
    }
}
