use crate::error::{DecResult, DecoderError};
use serde::Serialize;
use std::fmt;

const WORD_BITS: usize = 64;

/// Closed interval `[start, end]` of source positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {} past end {}", start, end);
        Self { start, end }
    }

    pub fn checked(start: usize, end: usize) -> DecResult<Self> {
        if start > end {
            return Err(DecoderError::Invariant(format!(
                "span start {} past end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    #[inline(always)]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// `|self.end + 1 - next.start|`; 0 for a monotone continuation.
    #[inline(always)]
    pub fn distortion_distance(&self, next: &Span) -> usize {
        (self.end as i64 + 1 - next.start as i64).unsigned_abs() as usize
    }
}

/// Distance from the previously translated span; the sentence start acts
/// as a span ending at position -1.
pub fn distortion_distance(prev: Option<&Span>, cur: &Span) -> usize {
    match prev {
        Some(p) => p.distortion_distance(cur),
        None => cur.start,
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

/// Bitmap of translated source positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coverage {
    bits: Vec<u64>,
    len: usize,
    covered: usize,
}

impl Coverage {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(WORD_BITS)],
            len,
            covered: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_covered(&self, pos: usize) -> bool {
        pos < self.len && (self.bits[pos / WORD_BITS] >> (pos % WORD_BITS)) & 1 == 1
    }

    pub fn overlaps(&self, span: &Span) -> bool {
        (span.start..=span.end.min(self.len.saturating_sub(1))).any(|p| self.is_covered(p))
    }

    /// Marks `span` as translated. The bitmap is untouched on error.
    pub fn set(&mut self, span: &Span) -> DecResult<()> {
        if span.end >= self.len {
            return Err(DecoderError::Invariant(format!(
                "span {} outside sentence of length {}",
                span, self.len
            )));
        }
        if self.overlaps(span) {
            return Err(DecoderError::Invariant(format!(
                "span {} overlaps coverage {}",
                span, self
            )));
        }
        for pos in span.start..=span.end {
            self.bits[pos / WORD_BITS] |= 1 << (pos % WORD_BITS);
        }
        self.covered += span.len();
        Ok(())
    }

    /// Copy-on-extend.
    pub fn with_span(&self, span: &Span) -> DecResult<Coverage> {
        let mut next = self.clone();
        next.set(span)?;
        Ok(next)
    }

    pub fn first_gap(&self) -> Option<usize> {
        for (block_idx, block) in self.bits.iter().enumerate() {
            if *block != u64::MAX {
                let pos = block_idx * WORD_BITS + (!block).trailing_zeros() as usize;
                return (pos < self.len).then_some(pos);
            }
        }
        None
    }

    #[inline(always)]
    pub fn count_covered(&self) -> usize {
        self.covered
    }

    #[inline(always)]
    pub fn is_complete(&self) -> bool {
        self.covered == self.len
    }

    /// Stack index for hypotheses with this coverage.
    pub fn stack_signature(&self) -> u64 {
        self.covered as u64
    }

    /// Packed bitmap blocks, lowest position in the lowest bit.
    pub fn compressed(&self) -> &[u64] {
        &self.bits
    }

    /// Maximal runs of uncovered positions, left to right.
    pub fn gaps(&self) -> Vec<Span> {
        let mut gaps = Vec::new();
        let mut open: Option<usize> = None;
        for pos in 0..self.len {
            match (self.is_covered(pos), open) {
                (false, None) => open = Some(pos),
                (true, Some(start)) => {
                    gaps.push(Span::new(start, pos - 1));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            gaps.push(Span::new(start, self.len - 1));
        }
        gaps
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..self.len {
            write!(f, "{}", if self.is_covered(pos) { '1' } else { '0' })?;
        }
        Ok(())
    }
}
