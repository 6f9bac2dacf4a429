pub mod average;

pub use average::{calculate_results, NO_RANKINGS};
