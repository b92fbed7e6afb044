use crate::core_types::{Phrase, Vocabulary, Word};

/// Fallback for source words no table can translate.
pub trait UnknownWordHandler: Send + Sync {
    fn translate(&self, word: &Word, vocab: &Vocabulary) -> Phrase;
}

/// Passes the word through unchanged, or drops it when `drop` is set.
/// Words containing a digit are always copied.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyUnknown {
    pub drop: bool,
}

impl UnknownWordHandler for CopyUnknown {
    fn translate(&self, word: &Word, vocab: &Vocabulary) -> Phrase {
        if self.drop && !vocab.resolve(word.surface()).chars().any(|c| c.is_ascii_digit()) {
            return Phrase::empty();
        }
        Phrase::new(vec![*word])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_survive_drop() {
        let v = Vocabulary::new();
        let h = CopyUnknown { drop: true };
        assert!(h.translate(&v.intern_word("xyzzy"), &v).is_empty());
        assert_eq!(h.translate(&v.intern_word("r2d2"), &v).len(), 1);
        let keep = CopyUnknown { drop: false };
        assert_eq!(keep.translate(&v.intern_word("xyzzy"), &v).len(), 1);
    }
}
