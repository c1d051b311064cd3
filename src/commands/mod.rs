pub mod check_rules;
pub mod run;
pub mod stats;

// Re-export command functions for convenience
pub use check_rules::check_rules;
pub use run::{run, RunOutcome, RunParams};
pub use stats::stats;
