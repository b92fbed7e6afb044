mod common;

use beamforge::config::SearchParams;
use beamforge::core_types::Sentence;
use beamforge::coverage::Span;
use beamforge::options::{FutureCostMatrix, TranslationOptionTable};
use beamforge::search::{AddOutcome, Hypothesis, HypothesisStack, HypothesisStackCollection};
use beamforge::{Decoder, DecoderError};
use common::*;
use std::sync::Arc;

struct Fixture {
    decoder: Decoder,
    table: TranslationOptionTable,
    future: FutureCostMatrix,
}

impl Fixture {
    fn new() -> Self {
        Self::for_sentence("a b c")
    }

    fn for_sentence(text: &str) -> Self {
        let decoder = decoder(abc_models(), config());
        let sentence = Sentence::parse(text, decoder.vocab());
        let table = decoder.option_table(&sentence);
        let future = FutureCostMatrix::build(&table);
        Self {
            decoder,
            table,
            future,
        }
    }

    fn seed(&self) -> Arc<Hypothesis> {
        Arc::new(Hypothesis::seed(self.decoder.features(), &self.future))
    }

    /// Follows the first option of each span in turn.
    fn path(&self, spans: &[Span]) -> Hypothesis {
        let mut cur = self.seed();
        let mut last = None;
        for span in spans {
            let option = &self.table.options(*span)[0];
            let next = Hypothesis::extend(&cur, option, self.decoder.features(), &self.future)
                .expect("spans must not overlap");
            cur = Arc::new(next.clone());
            last = Some(next);
        }
        last.expect("at least one span")
    }
}

fn params(n_best_size: usize, beam_threshold: f32) -> SearchParams {
    SearchParams {
        n_best_size,
        beam_threshold,
        ..SearchParams::default()
    }
}

#[test]
fn test_recombination_keeps_better_incumbent() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));

    let pair = fx.path(&[Span::new(0, 1)]);
    let words = fx.path(&[Span::single(0), Span::single(1)]);
    assert_eq!(pair.recombination_key(), words.recombination_key());
    assert!(pair.total_score() > words.total_score());

    assert_eq!(stack.add_recombine(pair.clone()).unwrap(), AddOutcome::Added);
    assert_eq!(stack.add_recombine(words).unwrap(), AddOutcome::Merged);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.best().unwrap().total_score(), pair.total_score());
    // Arcs are only recorded for n-best extraction
    assert!(stack.best().unwrap().arc_list().is_empty());
}

#[test]
fn test_recombination_replaces_worse_incumbent() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(5, -100.0));

    let pair = fx.path(&[Span::new(0, 1)]);
    let words = fx.path(&[Span::single(0), Span::single(1)]);
    let loser_score = words.total_score();

    assert_eq!(stack.add_recombine(words).unwrap(), AddOutcome::Added);
    let outcome = stack.add_recombine(pair.clone()).unwrap();
    assert_eq!(outcome, AddOutcome::Replaced);
    assert!(outcome.is_recombination());
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.best_score(), pair.total_score());

    let frozen = stack.seal(5);
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].arc_list().len(), 1);
    assert_eq!(frozen[0].arc_list()[0].total_score(), loser_score);
}

#[test]
fn test_equal_score_keeps_incumbent() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    let first = fx.path(&[Span::new(0, 1)]);
    let twin = fx.path(&[Span::new(0, 1)]);

    stack.add_recombine(first).unwrap();
    assert_eq!(stack.add_recombine(twin).unwrap(), AddOutcome::Merged);
}

#[test]
fn test_beam_rejects_on_arrival() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -1.0));

    let best = fx.path(&[Span::new(0, 1)]);
    let far = fx.path(&[Span::single(1), Span::single(2)]);
    assert!(far.total_score() < best.total_score() - 1.0);

    stack.add_recombine(best.clone()).unwrap();
    assert_eq!(stack.worst_bound(), best.total_score() - 1.0);
    assert_eq!(stack.add_recombine(far).unwrap(), AddOutcome::Rejected);
    assert_eq!(stack.len(), 1);
}

#[test]
fn test_prune_to_size_keeps_best() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    let candidates = [
        fx.path(&[Span::new(0, 1)]),
        fx.path(&[Span::single(1), Span::single(2)]),
        fx.path(&[Span::single(0), Span::single(2)]),
    ];
    let top = candidates
        .iter()
        .map(Hypothesis::total_score)
        .fold(f32::NEG_INFINITY, f32::max);
    for h in candidates {
        assert_eq!(stack.add_recombine(h).unwrap(), AddOutcome::Added);
    }

    assert_eq!(stack.prune_to_size(1), 2);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.pruned(), 2);
    assert_eq!(stack.best().unwrap().total_score(), top);
    assert_eq!(stack.worst_bound(), top);
    // Unlimited
    assert_eq!(stack.prune_to_size(0), 0);
}

#[test]
fn test_sealed_stack_refuses_hypotheses() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    stack.add_recombine(fx.path(&[Span::new(0, 1)])).unwrap();

    let frozen = stack.seal(0);
    assert!(stack.is_sealed());
    assert_eq!(frozen.len(), stack.frozen().len());

    let late = fx.path(&[Span::single(1), Span::single(2)]);
    assert!(matches!(
        stack.add_recombine(late),
        Err(DecoderError::Invariant(_))
    ));
}

#[test]
fn test_seal_orders_best_first() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    stack
        .add_recombine(fx.path(&[Span::single(0), Span::single(2)]))
        .unwrap();
    stack.add_recombine(fx.path(&[Span::new(0, 1)])).unwrap();
    stack
        .add_recombine(fx.path(&[Span::single(1), Span::single(2)]))
        .unwrap();

    let frozen = stack.seal(0);
    for pair in frozen.windows(2) {
        assert!(pair[0].total_score() >= pair[1].total_score());
    }
    assert_eq!(stack.best_shared().unwrap().total_score(), frozen[0].total_score());
}

#[test]
fn test_collection_routes_by_covered_count() {
    let fx = Fixture::new();
    let mut stacks = HypothesisStackCollection::new(3, &params(0, -100.0));
    assert_eq!(stacks.len(), 4);

    stacks.add(fx.path(&[Span::new(0, 1)])).unwrap();
    stacks.add(fx.path(&[Span::single(2)])).unwrap();
    assert_eq!(stacks.stack(2).unwrap().len(), 1);
    assert_eq!(stacks.stack(1).unwrap().len(), 1);
    assert!(stacks.stack(0).unwrap().is_empty());
}

#[test]
fn test_overlapping_extension_fails() {
    let fx = Fixture::new();
    let parent = Arc::new(fx.path(&[Span::new(0, 1)]));
    let option = &fx.table.options(Span::single(1))[0];
    let result = Hypothesis::extend(&parent, option, fx.decoder.features(), &fx.future);
    assert!(matches!(result, Err(DecoderError::Invariant(_))));
    assert_eq!(parent.coverage().count_covered(), 2);
}

#[test]
fn test_extension_score_composition() {
    let fx = Fixture::new();
    let seed = fx.seed();
    // Future estimate for the whole sentence is the best full path
    assert!(approx(seed.total_score(), -4.5));

    let z = fx.path(&[Span::single(2)]);
    // -1 table, -1 word, -2 jump, then XY for the rest
    assert!(approx(z.total_score() - z.future_score(), -4.0));
    assert!(approx(z.future_score(), -2.5));
    assert_eq!(z.target_len(), 1);
}

#[test]
fn test_per_output_cap_keeps_best_of_each_output() {
    let fx = Fixture::for_sentence("a a c");
    let params = SearchParams {
        max_per_output: 1,
        ..params(0, -100.0)
    };
    let mut stack = HypothesisStack::new(&params);

    let left = fx.path(&[Span::single(0)]);
    let right = fx.path(&[Span::single(1)]);
    let other = fx.path(&[Span::single(2)]);
    assert_eq!(left.output_hash(), right.output_hash());
    assert_ne!(left.recombination_key(), right.recombination_key());
    // Jumping to the second `a` costs one distortion step
    assert!(left.total_score() > right.total_score());

    let (kept_left, kept_other) = (left.total_score(), other.total_score());
    for h in [right, left, other] {
        assert_eq!(stack.add_recombine(h).unwrap(), AddOutcome::Added);
    }
    assert_eq!(stack.prune_to_size(10), 1);

    let scores: Vec<f32> = stack.sorted().iter().map(|h| h.total_score()).collect();
    assert_eq!(scores.len(), 2);
    assert!(scores.contains(&kept_left));
    assert!(scores.contains(&kept_other));
}

#[test]
fn test_per_output_cap_off_by_default() {
    let fx = Fixture::for_sentence("a a c");
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    stack.add_recombine(fx.path(&[Span::single(0)])).unwrap();
    stack.add_recombine(fx.path(&[Span::single(1)])).unwrap();
    assert_eq!(stack.prune_to_size(10), 0);
    assert_eq!(stack.len(), 2);
}

#[test]
fn test_pruning_compacts_slots() {
    let fx = Fixture::new();
    let mut stack = HypothesisStack::new(&params(0, -100.0));
    stack.add_recombine(fx.path(&[Span::single(1), Span::single(2)])).unwrap();
    stack.add_recombine(fx.path(&[Span::single(0), Span::single(2)])).unwrap();
    stack.add_recombine(fx.path(&[Span::new(0, 1)])).unwrap();
    assert_eq!(stack.slot_count(), 3);

    stack.prune_to_size(1);
    assert_eq!(stack.slot_count(), 1);

    // The survivor's bucket is still found after compaction
    let twin = fx.path(&[Span::new(0, 1)]);
    assert_eq!(stack.add_recombine(twin).unwrap(), AddOutcome::Merged);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.slot_count(), 1);
}

#[test]
fn test_empty_final_stack_seals_to_nothing() {
    let mut stacks = HypothesisStackCollection::new(3, &params(0, -100.0));
    let last = stacks.stack_mut(3).unwrap();
    assert!(last.seal(0).is_empty());
    assert!(last.best_shared().is_none());
    assert!(last.best().is_none());
}
