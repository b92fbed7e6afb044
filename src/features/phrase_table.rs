use crate::core_types::{Phrase, Word, SURFACE_FACTOR};
use crate::scoring::floor_score;
use std::collections::HashMap;

/// One target-side candidate returned by a table lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseCandidate {
    pub target: Phrase,
    /// Log-domain scores, one per table component.
    pub scores: Vec<f32>,
}

pub trait PhraseTable: Send + Sync {
    fn name(&self) -> &str;

    fn num_scores(&self) -> usize;

    /// Source factors forming the lookup key.
    fn input_factors(&self) -> &[usize];

    /// Target factors produced by this table.
    fn output_factors(&self) -> &[usize];

    /// Candidates for exactly `source`, in table order.
    fn lookup(&self, source: &[Word]) -> Vec<PhraseCandidate>;
}

/// Maps one word to alternatives carrying further factors.
pub trait GenerationTable: Send + Sync {
    fn name(&self) -> &str;

    fn num_scores(&self) -> usize;

    fn input_factors(&self) -> &[usize];

    fn output_factors(&self) -> &[usize];

    fn lookup(&self, word: &Word) -> Vec<(Word, Vec<f32>)>;
}

pub struct MemoryPhraseTable {
    name: String,
    num_scores: usize,
    input_factors: Vec<usize>,
    output_factors: Vec<usize>,
    entries: HashMap<Vec<Word>, Vec<PhraseCandidate>>,
}

impl MemoryPhraseTable {
    /// Surface-to-surface table.
    pub fn new(name: impl Into<String>, num_scores: usize) -> Self {
        Self::factored(name, num_scores, vec![SURFACE_FACTOR], vec![SURFACE_FACTOR])
    }

    pub fn factored(
        name: impl Into<String>,
        num_scores: usize,
        input_factors: Vec<usize>,
        output_factors: Vec<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            num_scores,
            input_factors,
            output_factors,
            entries: HashMap::new(),
        }
    }

    /// Adds a log-domain entry. Scores are floored; missing components read 0.
    pub fn insert(&mut self, source: &[Word], target: Phrase, scores: &[f32]) {
        let key = project_all(source, &self.input_factors);
        let target = Phrase::new(
            target
                .words()
                .iter()
                .map(|w| w.project(&self.output_factors))
                .collect(),
        );
        let mut padded: Vec<f32> = scores.iter().map(|s| floor_score(*s)).collect();
        padded.resize(self.num_scores, 0.0);
        self.entries.entry(key).or_default().push(PhraseCandidate {
            target,
            scores: padded,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_source_len(&self) -> usize {
        self.entries.keys().map(Vec::len).max().unwrap_or(0)
    }
}

impl PhraseTable for MemoryPhraseTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        self.num_scores
    }

    fn input_factors(&self) -> &[usize] {
        &self.input_factors
    }

    fn output_factors(&self) -> &[usize] {
        &self.output_factors
    }

    fn lookup(&self, source: &[Word]) -> Vec<PhraseCandidate> {
        let key = project_all(source, &self.input_factors);
        self.entries.get(&key).cloned().unwrap_or_default()
    }
}

pub struct MemoryGenerationTable {
    name: String,
    num_scores: usize,
    input_factors: Vec<usize>,
    output_factors: Vec<usize>,
    entries: HashMap<Word, Vec<(Word, Vec<f32>)>>,
}

impl MemoryGenerationTable {
    pub fn new(
        name: impl Into<String>,
        num_scores: usize,
        input_factors: Vec<usize>,
        output_factors: Vec<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            num_scores,
            input_factors,
            output_factors,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, input: &Word, output: &Word, scores: &[f32]) {
        let key = input.project(&self.input_factors);
        let mut padded: Vec<f32> = scores.iter().map(|s| floor_score(*s)).collect();
        padded.resize(self.num_scores, 0.0);
        self.entries
            .entry(key)
            .or_default()
            .push((output.project(&self.output_factors), padded));
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GenerationTable for MemoryGenerationTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        self.num_scores
    }

    fn input_factors(&self) -> &[usize] {
        &self.input_factors
    }

    fn output_factors(&self) -> &[usize] {
        &self.output_factors
    }

    fn lookup(&self, word: &Word) -> Vec<(Word, Vec<f32>)> {
        self.entries
            .get(&word.project(&self.input_factors))
            .cloned()
            .unwrap_or_default()
    }
}

fn project_all(words: &[Word], factors: &[usize]) -> Vec<Word> {
    words.iter().map(|w| w.project(factors)).collect()
}
