pub mod hypothesis;
pub mod manager;
pub mod nbest;
pub mod stack;

pub use self::hypothesis::{Hypothesis, RecombinationKey};
pub use self::manager::{Derivation, SearchManager, SearchState, SearchStats, Segment};
pub use self::nbest::{extract_n_best, TrellisPath};
pub use self::stack::{AddOutcome, HypothesisStack, HypothesisStackCollection};
