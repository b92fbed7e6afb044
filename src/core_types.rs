use crate::coverage::Span;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

pub type WordId = u32;

/// Factor slots carried by a word. Slot 0 is the surface form.
pub const MAX_FACTORS: usize = 4;
pub const SURFACE_FACTOR: usize = 0;

// Reserved vocabulary entries
pub const BOS_ID: WordId = 0;
pub const EOS_ID: WordId = 1;
pub const UNK_ID: WordId = 2;

pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";
pub const UNK: &str = "<unk>";

/// A factored word. Unset factors are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Word {
    factors: [Option<WordId>; MAX_FACTORS],
}

impl Word {
    pub fn new(surface: WordId) -> Self {
        let mut factors = [None; MAX_FACTORS];
        factors[SURFACE_FACTOR] = Some(surface);
        Self { factors }
    }

    pub fn from_factors(ids: &[WordId]) -> Self {
        let mut factors = [None; MAX_FACTORS];
        for (slot, id) in factors.iter_mut().zip(ids) {
            *slot = Some(*id);
        }
        Self { factors }
    }

    #[inline(always)]
    pub fn factor(&self, idx: usize) -> Option<WordId> {
        self.factors.get(idx).copied().flatten()
    }

    /// Id used by scorers reading `idx`; missing factors read as `<unk>`.
    #[inline(always)]
    pub fn factor_or_unk(&self, idx: usize) -> WordId {
        self.factor(idx).unwrap_or(UNK_ID)
    }

    pub fn surface(&self) -> WordId {
        self.factor_or_unk(SURFACE_FACTOR)
    }

    pub fn set_factor(&mut self, idx: usize, id: WordId) {
        if idx < MAX_FACTORS {
            self.factors[idx] = Some(id);
        }
    }

    /// Keeps only the listed factors.
    pub fn project(&self, factors: &[usize]) -> Word {
        let mut out = Word::default();
        for &f in factors {
            if let Some(id) = self.factor(f) {
                out.set_factor(f, id);
            }
        }
        out
    }

    /// Union of both words' factors, or `None` if a factor is set to
    /// different values on each side.
    pub fn merge(&self, other: &Word) -> Option<Word> {
        let mut out = *self;
        for (idx, theirs) in other.factors.iter().enumerate() {
            match (out.factors[idx], theirs) {
                (Some(a), Some(b)) if a != *b => return None,
                (None, Some(b)) => out.factors[idx] = Some(*b),
                _ => {}
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Phrase {
    words: Vec<Word>,
}

impl Phrase {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn word(&self, idx: usize) -> Option<&Word> {
        self.words.get(idx)
    }

    pub fn push(&mut self, word: Word) {
        self.words.push(word);
    }

    pub fn extend_from(&mut self, other: &Phrase) {
        self.words.extend_from_slice(&other.words);
    }

    /// Ids of one factor across the phrase.
    pub fn factor_ids(&self, factor: usize) -> Vec<WordId> {
        self.words.iter().map(|w| w.factor_or_unk(factor)).collect()
    }

    /// Space-joined surface forms.
    pub fn render(&self, vocab: &Vocabulary) -> String {
        self.words
            .iter()
            .map(|w| vocab.resolve(w.surface()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Space-joined words with every set factor, `|`-separated.
    pub fn render_factored(&self, vocab: &Vocabulary) -> String {
        self.words
            .iter()
            .map(|w| vocab.render_word(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<Vec<Word>> for Phrase {
    fn from(words: Vec<Word>) -> Self {
        Self { words }
    }
}

/// The input to a single decode.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    words: Vec<Word>,
}

impl Sentence {
    /// Whitespace-separated tokens, factors within a token separated by `|`.
    pub fn parse(text: &str, vocab: &Vocabulary) -> Self {
        let words = text
            .split_whitespace()
            .map(|tok| vocab.intern_word(tok))
            .collect();
        Self { words }
    }

    pub fn from_words(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn slice(&self, span: Span) -> &[Word] {
        &self.words[span.start()..=span.end()]
    }

    pub fn render(&self, vocab: &Vocabulary) -> String {
        Phrase::new(self.words.clone()).render(vocab)
    }
}

#[derive(Debug, Default)]
struct VocabInner {
    ids: HashMap<String, WordId>,
    strings: Vec<String>,
}

/// Thread-safe string interner shared by every factor.
#[derive(Debug)]
pub struct Vocabulary {
    inner: RwLock<VocabInner>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    pub fn new() -> Self {
        let mut inner = VocabInner::default();
        for reserved in [BOS, EOS, UNK] {
            let id = inner.strings.len() as WordId;
            inner.ids.insert(reserved.to_string(), id);
            inner.strings.push(reserved.to_string());
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn intern(&self, s: &str) -> WordId {
        if let Some(id) = self.get(s) {
            return id;
        }
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have won the race
        if let Some(&id) = guard.ids.get(s) {
            return id;
        }
        let id = guard.strings.len() as WordId;
        guard.ids.insert(s.to_string(), id);
        guard.strings.push(s.to_string());
        id
    }

    pub fn get(&self, s: &str) -> Option<WordId> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.ids.get(s).copied()
    }

    pub fn resolve(&self, id: WordId) -> String {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .strings
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| UNK.to_string())
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Interns `surface|factor1|factor2` into a factored word.
    pub fn intern_word(&self, token: &str) -> Word {
        let ids: Vec<WordId> = token
            .split('|')
            .take(MAX_FACTORS)
            .map(|f| self.intern(f))
            .collect();
        Word::from_factors(&ids)
    }

    /// Interns into the given factor slots, in order.
    pub fn intern_word_into(&self, token: &str, factors: &[usize]) -> Word {
        let mut word = Word::default();
        for (part, &slot) in token.split('|').zip(factors) {
            word.set_factor(slot, self.intern(part));
        }
        word
    }

    pub fn intern_phrase(&self, text: &str) -> Phrase {
        Phrase::new(text.split_whitespace().map(|t| self.intern_word(t)).collect())
    }

    pub fn render_word(&self, word: &Word) -> String {
        (0..MAX_FACTORS)
            .filter_map(|f| word.factor(f))
            .map(|id| self.resolve(id))
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = (0..MAX_FACTORS)
            .filter_map(|i| self.factor(i))
            .map(|id| id.to_string())
            .collect();
        write!(f, "{}", ids.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        let v = Vocabulary::new();
        assert_eq!(v.get(BOS), Some(BOS_ID));
        assert_eq!(v.get(EOS), Some(EOS_ID));
        assert_eq!(v.get(UNK), Some(UNK_ID));
        assert_eq!(v.intern("house"), 3);
        assert_eq!(v.intern("house"), 3);
    }

    #[test]
    fn test_factored_parse() {
        let v = Vocabulary::new();
        let s = Sentence::parse("das|ART haus|NN", &v);
        assert_eq!(s.len(), 2);
        assert_eq!(v.resolve(s.words()[1].factor(1).unwrap()), "NN");
        assert_eq!(v.render_word(&s.words()[0]), "das|ART");
    }

    #[test]
    fn test_merge_conflict() {
        let a = Word::from_factors(&[5, 6]);
        let mut b = Word::default();
        b.set_factor(1, 6);
        b.set_factor(2, 9);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.factor(2), Some(9));

        let mut c = Word::default();
        c.set_factor(1, 7);
        assert!(a.merge(&c).is_none());
    }
}
