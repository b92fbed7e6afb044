use crate::coverage::{distortion_distance, Span};

pub trait DistortionScorer: Send + Sync {
    /// Score for translating `cur` right after `prev` (`None` at sentence start).
    fn score(&self, prev: Option<&Span>, cur: &Span) -> f32;
}

/// Negative jump distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearDistortion;

impl DistortionScorer for LinearDistortion {
    fn score(&self, prev: Option<&Span>, cur: &Span) -> f32 {
        -(distortion_distance(prev, cur) as f32)
    }
}

/// One unit of penalty per target word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordPenalty;

impl WordPenalty {
    #[inline(always)]
    pub fn score(&self, target_len: usize) -> f32 {
        -(target_len as f32)
    }
}
