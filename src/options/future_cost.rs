use super::TranslationOptionTable;
use crate::coverage::{Coverage, Span};

/// Best achievable score for every span, `-inf` where no decomposition
/// into option-covered pieces exists.
#[derive(Debug, Clone)]
pub struct FutureCostMatrix {
    size: usize,
    cells: Vec<f32>,
}

impl FutureCostMatrix {
    pub fn build(table: &TranslationOptionTable) -> Self {
        Self::from_base(table.sentence_len(), |span| {
            table
                .options(span)
                .iter()
                .map(|o| o.estimated_score())
                .reduce(f32::max)
        })
    }

    /// Fills the triangle from per-span base estimates (`None` = no option),
    /// then combines split points in order of increasing width.
    pub fn from_base<F>(size: usize, base: F) -> Self
    where
        F: Fn(Span) -> Option<f32>,
    {
        let mut m = Self {
            size,
            cells: vec![f32::NEG_INFINITY; size * size],
        };

        for start in 0..size {
            for end in start..size {
                if let Some(score) = base(Span::new(start, end)) {
                    m.cells[start * size + end] = score;
                }
            }
        }

        for width in 2..=size {
            for start in 0..=size - width {
                let end = start + width - 1;
                let mut best = m.cells[start * size + end];
                for split in start..end {
                    let combined = m.cells[start * size + split] + m.cells[(split + 1) * size + end];
                    if combined > best {
                        best = combined;
                    }
                }
                m.cells[start * size + end] = best;
            }
        }
        m
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, span: Span) -> f32 {
        if span.end() >= self.size {
            return f32::NEG_INFINITY;
        }
        self.cells[span.start() * self.size + span.end()]
    }

    /// Sum over the maximal uncovered runs; 0 when fully covered.
    pub fn remaining_estimate(&self, coverage: &Coverage) -> f32 {
        coverage.gaps().into_iter().map(|gap| self.get(gap)).sum()
    }
}
