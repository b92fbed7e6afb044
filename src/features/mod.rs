pub mod distortion;
pub mod lm;
pub mod phrase_table;
pub mod unknown;

pub use distortion::{DistortionScorer, LinearDistortion, WordPenalty};
pub use lm::{BackoffLm, LanguageModel, LmState};
pub use phrase_table::{
    GenerationTable, MemoryGenerationTable, MemoryPhraseTable, PhraseCandidate, PhraseTable,
};
pub use unknown::{CopyUnknown, UnknownWordHandler};

use crate::config::FeatureWeights;
use crate::core_types::Vocabulary;
use crate::error::{DecResult, DecoderError};
use crate::options::DecodeStep;
use crate::scoring::{FeatureId, FeatureKind, FeatureLayout};
use std::sync::Arc;
use tracing::{debug, warn};

/// The collaborators a decoder is built from.
#[derive(Clone)]
pub struct Models {
    pub vocab: Arc<Vocabulary>,
    pub steps: Vec<DecodeStep>,
    pub lms: Vec<Arc<dyn LanguageModel>>,
    pub distortion: Arc<dyn DistortionScorer>,
    pub unknown: Arc<dyn UnknownWordHandler>,
}

impl std::fmt::Debug for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Models")
            .field("vocab", &self.vocab)
            .field("steps", &self.steps.len())
            .field("lms", &self.lms.len())
            .finish_non_exhaustive()
    }
}

impl Models {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            steps: Vec::new(),
            lms: Vec::new(),
            distortion: Arc::new(LinearDistortion),
            unknown: Arc::new(CopyUnknown::default()),
        }
    }

    pub fn with_translation(mut self, table: Arc<dyn PhraseTable>) -> Self {
        self.steps.push(DecodeStep::Translate(table));
        self
    }

    pub fn with_generation(mut self, table: Arc<dyn GenerationTable>) -> Self {
        self.steps.push(DecodeStep::Generate(table));
        self
    }

    pub fn with_lm(mut self, lm: Arc<dyn LanguageModel>) -> Self {
        self.lms.push(lm);
        self
    }

    pub fn with_unknown_handler(mut self, handler: Arc<dyn UnknownWordHandler>) -> Self {
        self.unknown = handler;
        self
    }
}

pub struct LmFeature {
    pub model: Arc<dyn LanguageModel>,
    pub id: FeatureId,
}

pub struct StepFeature {
    pub step: DecodeStep,
    pub id: FeatureId,
}

/// Collaborators bound to their slots of the score vector. Built once per
/// decoder and shared read-only by every sentence.
pub struct FeatureSet {
    pub vocab: Arc<Vocabulary>,
    pub layout: FeatureLayout,
    pub steps: Vec<StepFeature>,
    pub lms: Vec<LmFeature>,
    pub distortion: Arc<dyn DistortionScorer>,
    pub distortion_id: FeatureId,
    pub word_penalty: WordPenalty,
    pub word_penalty_id: FeatureId,
    pub unknown: Arc<dyn UnknownWordHandler>,
    pub unknown_id: FeatureId,
}

impl FeatureSet {
    pub fn new(models: Models, weights: &FeatureWeights) -> DecResult<Self> {
        match models.steps.first() {
            Some(DecodeStep::Translate(_)) => {}
            Some(DecodeStep::Generate(_)) => {
                return Err(DecoderError::Config(
                    "the first decode step must be a translation step".to_string(),
                ))
            }
            None => {
                return Err(DecoderError::Config(
                    "at least one phrase table is required".to_string(),
                ))
            }
        }

        let mut layout = FeatureLayout::new();

        // 1. Baseline producers
        let distortion_id =
            layout.register(FeatureKind::Distortion, "distortion", &[weights.weight_d])?;
        let word_penalty_id =
            layout.register(FeatureKind::WordPenalty, "word_penalty", &[weights.weight_w])?;
        let unknown_id =
            layout.register(FeatureKind::UnknownWord, "unknown_word", &[weights.weight_u])?;

        // 2. Language models, one weight each
        let lm_weights = weights.lm_weights()?;
        let mut lm_cursor = WeightCursor::new(&lm_weights, "weight_l");
        let mut lms = Vec::with_capacity(models.lms.len());
        for (i, model) in models.lms.into_iter().enumerate() {
            let w = lm_cursor.take(1, &format!("lm{}", i))?;
            let id = layout.register(FeatureKind::LanguageModel, format!("lm{}", i), w)?;
            lms.push(LmFeature { model, id });
        }
        lm_cursor.finish();

        // 3. Tables, consuming their weight lists consecutively
        let t_weights = weights.translation_weights()?;
        let g_weights = weights.generation_weights()?;
        let mut t_cursor = WeightCursor::new(&t_weights, "weight_t");
        let mut g_cursor = WeightCursor::new(&g_weights, "weight_g");
        let mut steps = Vec::with_capacity(models.steps.len());
        for step in models.steps {
            let id = match &step {
                DecodeStep::Translate(table) => {
                    let w = t_cursor.take(table.num_scores(), table.name())?;
                    layout.register(FeatureKind::Translation, table.name(), w)?
                }
                DecodeStep::Generate(table) => {
                    let w = g_cursor.take(table.num_scores(), table.name())?;
                    layout.register(FeatureKind::Generation, table.name(), w)?
                }
            };
            steps.push(StepFeature { step, id });
        }
        t_cursor.finish();
        g_cursor.finish();

        debug!(
            "Feature layout: {} components over {} producers",
            layout.len(),
            layout.entries().len()
        );

        Ok(Self {
            vocab: models.vocab,
            layout,
            steps,
            lms,
            distortion: models.distortion,
            distortion_id,
            word_penalty: WordPenalty,
            word_penalty_id,
            unknown: models.unknown,
            unknown_id,
        })
    }

    pub fn weights(&self) -> &[f32] {
        self.layout.weights()
    }
}

struct WeightCursor<'a> {
    weights: &'a [f32],
    pos: usize,
    flag: &'static str,
}

impl<'a> WeightCursor<'a> {
    fn new(weights: &'a [f32], flag: &'static str) -> Self {
        Self {
            weights,
            pos: 0,
            flag,
        }
    }

    fn take(&mut self, n: usize, owner: &str) -> DecResult<&'a [f32]> {
        let end = self.pos + n;
        if end > self.weights.len() {
            return Err(DecoderError::Config(format!(
                "--{} has {} values, '{}' needs values {}..{}",
                self.flag,
                self.weights.len(),
                owner,
                self.pos,
                end
            )));
        }
        let slice = &self.weights[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn finish(self) {
        if self.pos < self.weights.len() {
            warn!(
                "--{}: ignoring {} unused weight(s)",
                self.flag,
                self.weights.len() - self.pos
            );
        }
    }
}
