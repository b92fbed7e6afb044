use crate::error::{DecResult, DecoderError};
use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

/// Floor for every externally supplied log score.
pub const LOWEST_SCORE: f32 = -100.0;

#[inline(always)]
pub fn floor_score(score: f32) -> f32 {
    // f32::max returns the other operand for NaN
    score.max(LOWEST_SCORE)
}

/// Probability to floored natural log.
#[inline(always)]
pub fn transform_prob(prob: f32) -> f32 {
    floor_score(prob.ln())
}

#[inline(always)]
pub fn log10_to_ln(score: f32) -> f32 {
    score * std::f32::consts::LN_10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Distortion,
    WordPenalty,
    UnknownWord,
    LanguageModel,
    Translation,
    Generation,
}

/// Slice of the score vector owned by one producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureId {
    start: usize,
    len: usize,
}

impl FeatureId {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureEntry {
    pub name: String,
    pub kind: FeatureKind,
    pub start: usize,
    pub len: usize,
}

/// Registry of producers and their weights. Offsets are assigned in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct FeatureLayout {
    entries: Vec<FeatureEntry>,
    weights: Vec<f32>,
}

impl FeatureLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: FeatureKind,
        name: impl Into<String>,
        weights: &[f32],
    ) -> DecResult<FeatureId> {
        let name = name.into();
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(DecoderError::Config(format!(
                "feature '{}' has a non-finite weight",
                name
            )));
        }
        let id = FeatureId {
            start: self.weights.len(),
            len: weights.len(),
        };
        self.entries.push(FeatureEntry {
            name,
            kind,
            start: id.start,
            len: id.len,
        });
        self.weights.extend_from_slice(weights);
        Ok(id)
    }

    /// Total number of score components.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn entries(&self) -> &[FeatureEntry] {
        &self.entries
    }

    /// Weight of the first component of `id`.
    pub fn weight(&self, id: FeatureId) -> f32 {
        self.weights.get(id.start).copied().unwrap_or(0.0)
    }

    pub fn zeros(&self) -> ScoreVector {
        ScoreVector::zeros(self.len())
    }

    pub fn weighted(&self, scores: &ScoreVector) -> f32 {
        scores.inner_product(&self.weights)
    }

    /// Per-producer scores, labelled.
    pub fn breakdown(&self, scores: &ScoreVector) -> Vec<LabeledScore> {
        self.entries
            .iter()
            .map(|e| {
                let values = scores.as_slice()[e.start..e.start + e.len].to_vec();
                let weighted = values
                    .iter()
                    .zip(&self.weights[e.start..e.start + e.len])
                    .map(|(v, w)| v * w)
                    .sum();
                LabeledScore {
                    name: e.name.clone(),
                    kind: e.kind,
                    values,
                    weighted,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledScore {
    pub name: String,
    pub kind: FeatureKind,
    pub values: Vec<f32>,
    pub weighted: f32,
}

/// Dense feature values. Every producer adds into its own slice.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: FeatureId, offset: usize) -> f32 {
        debug_assert!(offset < id.len);
        self.0[id.start + offset]
    }

    pub fn plus_equals(&mut self, other: &ScoreVector) {
        debug_assert_eq!(self.0.len(), other.0.len());
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a += b;
        }
    }

    pub fn minus_equals(&mut self, other: &ScoreVector) {
        debug_assert_eq!(self.0.len(), other.0.len());
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a -= b;
        }
    }

    /// Adds one value per component of `id`.
    pub fn add(&mut self, id: FeatureId, values: &[f32]) {
        debug_assert_eq!(id.len, values.len());
        for (a, b) in self.0[id.start..id.start + id.len].iter_mut().zip(values) {
            *a += b;
        }
    }

    #[inline(always)]
    pub fn add_single(&mut self, id: FeatureId, value: f32) {
        debug_assert_eq!(id.len, 1);
        self.0[id.start] += value;
    }

    pub fn inner_product(&self, weights: &[f32]) -> f32 {
        self.0.iter().zip(weights).map(|(s, w)| s * w).sum()
    }
}
