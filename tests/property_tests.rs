mod common;

use beamforge::config::SearchParams;
use beamforge::core_types::{Sentence, Vocabulary};
use beamforge::coverage::{Coverage, Span};
use beamforge::features::Models;
use beamforge::options::FutureCostMatrix;
use beamforge::search::{Hypothesis, HypothesisStack};
use common::*;
use proptest::prelude::*;
use std::sync::Arc;

// --- STRATEGIES ---

// Disjoint spans over a sentence of `len` words, in random order
prop_compose! {
    fn arb_segmentation()(len in 1usize..40)(
        len in Just(len),
        cuts in proptest::collection::vec(any::<bool>(), len),
        order in any::<u64>()
    ) -> (usize, Vec<Span>) {
        let mut spans = Vec::new();
        let mut start = 0;
        for pos in 0..len {
            if pos + 1 == len || cuts[pos] {
                spans.push(Span::new(start, pos));
                start = pos + 1;
            }
        }
        let mut rng = fastrand::Rng::with_seed(order);
        rng.shuffle(&mut spans);
        (len, spans)
    }
}

// Per-span base estimates; `None` leaves a cell without options
prop_compose! {
    fn arb_base(size: usize)(
        cells in proptest::collection::vec(proptest::option::weighted(0.7, -10.0..0.0f32), size * size)
    ) -> Vec<Option<f32>> {
        cells
    }
}

// A random phrase table over words w0..w5, with a unary entry for each
prop_compose! {
    fn arb_models()(
        pairs in proptest::collection::vec((0usize..6, 0usize..6, -5.0..-0.1f32), 0..12),
        unary in proptest::collection::vec(-5.0..-0.1f32, 6)
    ) -> Models {
        let vocab = Arc::new(Vocabulary::new());
        let mut builder = TableBuilder::new("tm");
        for (i, score) in unary.iter().enumerate() {
            builder = builder.entry(&vocab, &format!("w{}", i), &format!("t{}", i), *score);
        }
        for (a, b, score) in pairs {
            builder = builder.entry(&vocab, &format!("w{} w{}", a, b), &format!("t{}{}", a, b), score);
        }
        Models::new(vocab).with_translation(builder.build())
    }
}

fn sentence_text(ids: &[usize]) -> String {
    ids.iter()
        .map(|i| format!("w{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_disjoint_spans_complete_coverage((len, spans) in arb_segmentation()) {
        let mut c = Coverage::new(len);
        let mut count = 0;
        for span in &spans {
            prop_assert!(!c.is_complete());
            prop_assert_eq!(c.first_gap().map(|g| c.is_covered(g)), Some(false));
            c.set(span).unwrap();
            count += span.len();
            prop_assert_eq!(c.count_covered(), count);
            // Setting again always overlaps and changes nothing
            let before = c.clone();
            prop_assert!(c.set(span).is_err());
            prop_assert_eq!(&c, &before);
        }
        prop_assert!(c.is_complete());
        prop_assert_eq!(c.first_gap(), None);
        prop_assert!(c.gaps().is_empty());
    }

    #[test]
    fn prop_future_cost_not_below_any_split(size in 1usize..8, seed in any::<u64>()) {
        let mut rng = fastrand::Rng::with_seed(seed);
        let base: Vec<Option<f32>> = (0..size * size)
            .map(|_| (rng.f32() < 0.7).then(|| -10.0 * rng.f32()))
            .collect();
        let m = FutureCostMatrix::from_base(size, |s| base[s.start() * size + s.end()]);

        for start in 0..size {
            for end in start..size {
                let cell = m.get(Span::new(start, end));
                if let Some(b) = base[start * size + end] {
                    prop_assert!(cell >= b);
                }
                for split in start..end {
                    let combined = m.get(Span::new(start, split)) + m.get(Span::new(split + 1, end));
                    prop_assert!(cell >= combined);
                }
            }
        }
    }

    #[test]
    fn prop_full_base_cells_are_finite(size in 1usize..6, cells in arb_base(6)) {
        // Unary cells always present: every span decomposes
        let m = FutureCostMatrix::from_base(size, |s| {
            if s.len() == 1 {
                Some(-1.0)
            } else {
                cells[s.start() * 6 + s.end()]
            }
        });
        for start in 0..size {
            for end in start..size {
                prop_assert!(m.get(Span::new(start, end)).is_finite());
            }
        }
    }

    #[test]
    fn prop_decode_finds_complete_translation(
        models in arb_models(),
        ids in proptest::collection::vec(0usize..6, 0..8)
    ) {
        let dec = decoder(models, config());
        let t = dec.translate(&sentence_text(&ids)).unwrap();
        prop_assert!(t.is_found());
        prop_assert_eq!(t.stats.invariant_violations, 0);

        let best = t.best.unwrap();
        let covered: usize = best.segments.iter().map(|s| s.source.len()).sum();
        prop_assert_eq!(covered, ids.len());
        let sum: f32 = best.breakdown.iter().map(|s| s.weighted).sum();
        prop_assert!(approx(sum, best.total_score));
    }

    #[test]
    fn prop_future_estimate_is_optimistic(
        models in arb_models(),
        ids in proptest::collection::vec(0usize..6, 1..7)
    ) {
        // Without a language model no complete path beats the seed's estimate
        let mut cfg = config();
        cfg.search.distortion_limit = 0;
        let dec = decoder(models, cfg);
        let sentence = Sentence::parse(&sentence_text(&ids), dec.vocab());
        let table = dec.option_table(&sentence);
        let future = FutureCostMatrix::build(&table);
        let seed = Hypothesis::seed(dec.features(), &future);

        let t = dec.translate_sentence(&sentence).unwrap();
        prop_assert!(seed.total_score() + 1e-3 >= t.total_score().unwrap());
    }

    #[test]
    fn prop_prune_respects_size_and_order(
        models in arb_models(),
        ids in proptest::collection::vec(0usize..6, 3..7),
        keep in 1usize..4
    ) {
        let dec = decoder(models, config());
        let sentence = Sentence::parse(&sentence_text(&ids), dec.vocab());
        let table = dec.option_table(&sentence);
        let future = FutureCostMatrix::build(&table);
        let seed = Arc::new(Hypothesis::seed(dec.features(), &future));

        let params = SearchParams { beam_threshold: -1000.0, ..SearchParams::default() };
        let mut stack = HypothesisStack::new(&params);
        let mut offered = Vec::new();
        for start in 0..sentence.len() {
            for option in table.options(Span::single(start)) {
                let h = Hypothesis::extend(&seed, option, dec.features(), &future).unwrap();
                offered.push(h.total_score());
                stack.add_recombine(h).unwrap();
            }
        }

        let before = stack.len();
        let removed = stack.prune_to_size(keep);
        prop_assert!(stack.len() <= keep);
        prop_assert_eq!(before - removed, stack.len());

        // Nothing removed scores above anything kept
        let kept: Vec<f32> = stack.sorted().iter().map(|h| h.total_score()).collect();
        let worst_kept = kept.iter().cloned().fold(f32::INFINITY, f32::min);
        let better_than_worst = offered.iter().filter(|&&s| s > worst_kept).count();
        prop_assert!(better_than_worst < kept.len());
    }
}
