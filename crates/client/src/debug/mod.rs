mod stats;

pub use stats::{CorrectionStats, CorrectionSummary};
