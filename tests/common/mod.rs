#![allow(dead_code)] // Not every test binary uses every fixture

use beamforge::config::Config;
use beamforge::core_types::Vocabulary;
use beamforge::features::{BackoffLm, MemoryGenerationTable, MemoryPhraseTable, Models};
use beamforge::Decoder;
use std::sync::Arc;

/// Builds a surface-to-surface phrase table from `(source, target, log score)`.
pub struct TableBuilder {
    table: MemoryPhraseTable,
}

impl TableBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            table: MemoryPhraseTable::new(name, 1),
        }
    }

    pub fn entry(mut self, vocab: &Vocabulary, source: &str, target: &str, score: f32) -> Self {
        let source: Vec<_> = source
            .split_whitespace()
            .map(|t| vocab.intern_word(t))
            .collect();
        self.table
            .insert(&source, vocab.intern_phrase(target), &[score]);
        self
    }

    pub fn build(self) -> Arc<MemoryPhraseTable> {
        Arc::new(self.table)
    }
}

/// `a b c` with unary entries at -1 and the pair `a b -> XY` at -1.5.
pub fn abc_models() -> Models {
    let vocab = Arc::new(Vocabulary::new());
    let table = TableBuilder::new("tm")
        .entry(&vocab, "a", "X", -1.0)
        .entry(&vocab, "b", "Y", -1.0)
        .entry(&vocab, "c", "Z", -1.0)
        .entry(&vocab, "a b", "XY", -1.5)
        .build();
    Models::new(vocab).with_translation(table)
}

/// Like `abc_models`, but the pair produces the two words `X Y`, so two
/// segmentations share one output string.
pub fn ambiguous_models() -> Models {
    let vocab = Arc::new(Vocabulary::new());
    let table = TableBuilder::new("tm")
        .entry(&vocab, "a", "X", -1.0)
        .entry(&vocab, "b", "Y", -1.0)
        .entry(&vocab, "c", "Z", -1.0)
        .entry(&vocab, "a b", "X Y", -1.5)
        .build();
    Models::new(vocab).with_translation(table)
}

/// Bigram model over `X Y Z` that likes the monotone order.
pub fn xyz_bigram_lm(vocab: &Vocabulary) -> BackoffLm {
    let mut lm = BackoffLm::new(2);
    let id = |s: &str| vocab.intern(s);
    for (w, p) in [("<s>", -99.0), ("</s>", -1.0), ("X", -1.5), ("Y", -1.5), ("Z", -1.5)] {
        lm.insert(vec![id(w)], p, -0.5);
    }
    lm.insert(vec![id("<s>"), id("X")], -0.1, 0.0);
    lm.insert(vec![id("X"), id("Y")], -0.1, 0.0);
    lm.insert(vec![id("Y"), id("Z")], -0.1, 0.0);
    lm.insert(vec![id("Z"), id("</s>")], -0.1, 0.0);
    lm
}

/// `haus` translates to `house` (factor 0), then `house` generates two POS
/// tags into factor 1.
pub fn factored_models() -> Models {
    let vocab = Arc::new(Vocabulary::new());
    let tm = TableBuilder::new("tm")
        .entry(&vocab, "haus", "house", -0.5)
        .build();
    let mut gen = MemoryGenerationTable::new("gen", 1, vec![0], vec![1]);
    let house = vocab.intern_word_into("house", &[0]);
    gen.insert(&house, &vocab.intern_word_into("NN", &[1]), &[-0.2]);
    gen.insert(&house, &vocab.intern_word_into("VB", &[1]), &[-2.0]);
    Models::new(vocab)
        .with_translation(tm)
        .with_generation(Arc::new(gen))
}

pub fn config() -> Config {
    Config::default()
}

pub fn decoder(models: Models, config: Config) -> Decoder {
    Decoder::new(models, config).expect("decoder should build")
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
