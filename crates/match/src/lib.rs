pub mod recurring;
pub mod scorer;
pub mod similarity;

pub use recurring::{detect_recurring_pattern, RecurringInterval, RecurringPattern};
pub use scorer::{MatchCandidate, MatchConfig, MatchScorer};
pub use similarity::similarity;
